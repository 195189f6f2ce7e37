pub mod builtin;

pub use builtin::TokenCipher;
