//! Command-line surface (spec §6): `server`, `client`, and `key-manager`
//! subcommands.
//!
//! Grounded on the teacher's `clap`-derive `Cli`/`Command` layout in the old
//! `main.rs`, generalized from the archive pack/unpack verbs to the dedup
//! engine's server/client/key-manager roles.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Debug, Parser)]
#[command(name = "debedup", about = "frequency-aware deduplicating backup storage engine")]
pub struct Cli {
    /// Path to the JSON configuration file (spec §6).
    #[arg(short, long, default_value = "debedup.json")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the storage server.
    Server {
        /// Dedup index variant: 0 out-of-enclave, 1 in-enclave, 2 extreme-bin,
        /// 3 sparse, 4 freq (spec §6).
        #[arg(short = 'm', long, default_value_t = 0)]
        mode: u8,
    },
    /// Drive one upload, download, or attestation exchange against a server.
    Client {
        /// u = upload, d = download, a = attest.
        #[arg(short = 't', long, value_enum)]
        op: ClientOp,
        /// File to upload, or the name identifying what to download.
        #[arg(short = 'i', long)]
        input: PathBuf,
    },
    /// Run the standalone key manager (spec §6 `key-manager -m {2|3}`).
    KeyManager {
        /// 2 = extreme-bin champion keys, 3 = sparse champion keys.
        #[arg(short = 'm', long)]
        mode: u8,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClientOp {
    #[value(name = "u")]
    Upload,
    #[value(name = "d")]
    Download,
    #[value(name = "a")]
    Attest,
}
