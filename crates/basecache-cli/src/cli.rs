use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "basecache",
    author,
    version,
    about = "Reconcile a shared base-image cache with the instances using it",
    disable_help_subcommand = true
)]
#[allow(clippy::struct_excessive_bools)]
pub struct BasecacheCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still print to stderr)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "PATH",
        env = "BASECACHE_CONFIG",
        help = "Read settings from this TOML file",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(
        about = "Run one reconciliation pass over the base directory.",
        override_usage = "basecache verify --instances <SNAPSHOT.json>"
    )]
    Verify(VerifyArgs),
    #[command(about = "Print the base file name for each image identifier.")]
    Fingerprint(FingerprintArgs),
    #[command(about = "Show the stored digest record of a base file without modifying it.")]
    Record(RecordArgs),
}

#[derive(Args, Debug)]
#[allow(clippy::struct_excessive_bools)]
pub struct VerifyArgs {
    #[arg(
        long,
        value_name = "SNAPSHOT",
        help = "JSON array of instances exported from the inventory"
    )]
    pub instances: PathBuf,
    #[arg(long, value_name = "DIR", help = "Directory holding instance dirs and the base dir")]
    pub instances_path: Option<PathBuf>,
    #[arg(long, help = "Host identity used to split local and remote usage")]
    pub host: Option<String>,
    #[arg(long, conflicts_with = "no_checksum", help = "Verify base file digests")]
    pub checksum: bool,
    #[arg(long, help = "Skip digest verification")]
    pub no_checksum: bool,
    #[arg(long, help = "Report removable files without deleting them")]
    pub no_remove: bool,
}

#[derive(Args, Debug)]
pub struct FingerprintArgs {
    #[arg(value_name = "IMAGE_ID", required = true)]
    pub image_ids: Vec<String>,
}

#[derive(Args, Debug)]
pub struct RecordArgs {
    #[arg(value_name = "BASE_FILE")]
    pub base_file: PathBuf,
}
