use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// CLI arguments for the contract onboarding tool
#[derive(Parser, Debug)]
#[command(name = "onboard", about = "Onboard verified contracts and resolve their storage layouts")]
pub struct Cli {
    /// Emit logs as JSON lines instead of human-readable text.
    /// Log level is taken from RUST_LOG (default: info).
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve and print the storage layout of a local source file
    Layout(LayoutArgs),
    /// Onboard a batch of contract addresses
    Batch(BatchArgs),
}

#[derive(Args, Debug)]
pub struct LayoutArgs {
    /// Solidity source file
    pub source: PathBuf,

    /// Contract to lay out when the file declares several.
    /// Defaults to the last concrete contract in the file.
    #[arg(long)]
    pub contract: Option<String>,

    /// Print the layout as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Contract addresses (0x-prefixed hex)
    #[arg(required = true)]
    pub addresses: Vec<String>,

    /// Directory holding `<address>.json` metadata documents
    #[arg(long)]
    pub metadata_dir: PathBuf,

    /// JSON snapshot the store is loaded from and saved to.
    /// Without it the store lives only for this run.
    #[arg(long)]
    pub store: Option<PathBuf>,

    /// Backfill program, invoked as `<program> <backfill-arg>... <id>...`
    #[arg(long, env = "BACKFILL_BIN")]
    pub backfill_bin: Option<PathBuf>,

    /// Fixed argument passed to the backfill program before the ids (repeatable)
    #[arg(long = "backfill-arg", allow_hyphen_values = true)]
    pub backfill_args: Vec<String>,

    /// Skip backfill dispatch even when a program is configured
    #[arg(long)]
    pub no_backfill: bool,

    /// Key callers must present. Leave unset to disable the check.
    #[arg(long, env = "ONBOARD_API_KEY", hide_env_values = true)]
    pub api_key: Option<String>,

    /// Credential presented for this batch
    #[arg(long, env = "ONBOARD_CREDENTIAL", hide_env_values = true)]
    pub credential: Option<String>,

    /// How many times to resubmit addresses rejected for transient reasons
    #[arg(long, default_value = "0")]
    pub retries: u32,

    /// Print the batch summary as JSON
    #[arg(long)]
    pub json: bool,
}

impl BatchArgs {
    /// Backfill program to use, honoring `--no-backfill`.
    pub fn backfill_program(&self) -> Option<&PathBuf> {
        self.backfill_bin.as_ref().filter(|_| !self.no_backfill)
    }
}
