//! Command-line bring-up: port, bootstrap peer, and data directory,
//! grounded in the reference launcher's argument handling.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "bond-node", about = "A UTXO blockchain node")]
pub struct Cli {
    /// Port to bind the HTTP server on.
    #[arg(long, default_value_t = 9000)]
    pub port: u16,

    /// Base URL this node advertises to peers (defaults to http://127.0.0.1:<port>).
    #[arg(long)]
    pub public_url: Option<String>,

    /// A peer to connect to on startup, e.g. http://127.0.0.1:9001.
    #[arg(long)]
    pub peer: Option<String>,

    /// Directory for persisted chain/UTXO/mempool/peer state and the wallet key.
    #[arg(long)]
    pub data_dir: Option<String>,

    /// Mine with this node (disable to run as a relay-only peer).
    #[arg(long, default_value_t = true)]
    pub mine: bool,
}

impl Cli {
    #[must_use]
    pub fn resolved_public_url(&self) -> String {
        self.public_url
            .clone()
            .unwrap_or_else(|| format!("http://127.0.0.1:{}", self.port))
    }

    #[must_use]
    pub fn resolved_data_dir(&self) -> std::path::PathBuf {
        match &self.data_dir {
            Some(dir) => std::path::PathBuf::from(dir),
            None => bond_core::storage::default_data_dir(self.port),
        }
    }
}
