use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::RngCore;
use zeroize::Zeroize;

const NONCE_LEN: usize = 12;
/// AES-256-GCM ciphertext of a 32-byte DEK (key + 16-byte tag).
const ENCRYPTED_DEK_LEN: usize = 48;
const SEALED_PREFIX: &str = "v1:";

/// Envelope encryption for registry tokens at rest.
///
/// Each value gets a fresh data key (DEK); the DEK is encrypted with the
/// master key (KEK). The sealed form is
/// `v1:` + base64(dek_nonce ‖ encrypted_dek ‖ secret_nonce ‖ encrypted_secret).
pub struct TokenCipher {
    kek: [u8; 32],
}

impl TokenCipher {
    pub fn new(master_key_hex: &str) -> anyhow::Result<Self> {
        let kek = parse_master_key(master_key_hex)?;
        Ok(Self { kek })
    }

    pub fn seal(&self, plaintext: &str) -> anyhow::Result<String> {
        // 1. Generate a random DEK
        let mut dek = [0u8; 32];
        OsRng.fill_bytes(&mut dek);

        // 2. Encrypt the secret with the DEK
        let secret_cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let secret_nonce = generate_nonce();
        let encrypted_secret = secret_cipher
            .encrypt(Nonce::from_slice(&secret_nonce), plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("secret encryption failed: {}", e))?;

        // 3. Encrypt the DEK with the master KEK
        let kek_cipher = Aes256Gcm::new_from_slice(&self.kek)
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let dek_nonce = generate_nonce();
        let encrypted_dek = kek_cipher
            .encrypt(Nonce::from_slice(&dek_nonce), dek.as_ref())
            .map_err(|e| anyhow::anyhow!("DEK encryption failed: {}", e))?;

        dek.zeroize();

        let mut blob = Vec::with_capacity(
            NONCE_LEN * 2 + encrypted_dek.len() + encrypted_secret.len(),
        );
        blob.extend_from_slice(&dek_nonce);
        blob.extend_from_slice(&encrypted_dek);
        blob.extend_from_slice(&secret_nonce);
        blob.extend_from_slice(&encrypted_secret);

        Ok(format!(
            "{}{}",
            SEALED_PREFIX,
            base64::engine::general_purpose::STANDARD.encode(blob)
        ))
    }

    pub fn open(&self, sealed: &str) -> anyhow::Result<String> {
        let encoded = sealed
            .strip_prefix(SEALED_PREFIX)
            .ok_or_else(|| anyhow::anyhow!("unsupported sealed token format"))?;
        let blob = base64::engine::general_purpose::STANDARD.decode(encoded)?;
        if blob.len() < NONCE_LEN * 2 + ENCRYPTED_DEK_LEN {
            anyhow::bail!("sealed token too short: {} bytes", blob.len());
        }

        let (dek_nonce, rest) = blob.split_at(NONCE_LEN);
        let (encrypted_dek, rest) = rest.split_at(ENCRYPTED_DEK_LEN);
        let (secret_nonce, encrypted_secret) = rest.split_at(NONCE_LEN);

        // 1. Decrypt DEK with master KEK
        let kek_cipher = Aes256Gcm::new_from_slice(&self.kek)
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let mut dek = kek_cipher
            .decrypt(Nonce::from_slice(dek_nonce), encrypted_dek)
            .map_err(|e| anyhow::anyhow!("DEK decryption failed: {}", e))?;

        // 2. Decrypt secret with DEK
        let secret_cipher = Aes256Gcm::new_from_slice(&dek)
            .map_err(|e| anyhow::anyhow!("invalid key length: {:?}", e))?;
        let plaintext = secret_cipher
            .decrypt(Nonce::from_slice(secret_nonce), encrypted_secret)
            .map_err(|e| anyhow::anyhow!("secret decryption failed: {}", e));

        dek.zeroize();

        Ok(String::from_utf8(plaintext?)?)
    }

    pub fn seal_opt(&self, plaintext: Option<&str>) -> anyhow::Result<Option<String>> {
        plaintext.map(|p| self.seal(p)).transpose()
    }

    pub fn open_opt(&self, sealed: Option<&str>) -> anyhow::Result<Option<String>> {
        sealed.map(|s| self.open(s)).transpose()
    }
}

impl Drop for TokenCipher {
    fn drop(&mut self) {
        self.kek.zeroize();
    }
}

fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

pub fn parse_master_key(hex: &str) -> anyhow::Result<[u8; 32]> {
    if hex.len() != 64 {
        anyhow::bail!(
            "ORCID_SYNC_MASTER_KEY must be 64 hex chars (32 bytes), got {} chars",
            hex.len()
        );
    }
    let bytes = hex::decode(hex)?;
    let mut key = [0u8; 32];
    key.copy_from_slice(&bytes);
    Ok(key)
}
