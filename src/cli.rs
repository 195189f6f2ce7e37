use clap::{Parser, Subcommand};

/// orcid-sync: pushes published articles to contributors' ORCID records
#[derive(Parser, Debug)]
#[command(name = "orcid-sync", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Port to bind
        #[arg(short, long, default_value = "8443")]
        port: u16,
    },

    /// Send one submission to the registry now
    Sync {
        #[arg(long)]
        journal_id: i64,
        #[arg(long)]
        submission_id: i64,
    },

    /// Print the authorization page URL for a journal
    AuthorizeUrl {
        #[arg(long)]
        journal_id: i64,
        #[arg(long)]
        redirect_uri: String,
    },

    /// Inspect or reset contributor credentials
    Credential {
        #[command(subcommand)]
        command: CredentialCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum CredentialCommands {
    /// Show authorization state (never the token itself)
    Show {
        #[arg(long)]
        contributor_id: i64,
    },
    /// Drop the stored access token
    Clear {
        #[arg(long)]
        contributor_id: i64,
    },
}
