use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use crs_types::ContentKind;

#[derive(Parser)]
#[command(
    name = "crs",
    about = "Content-addressed context store with memory and disk tiers",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file (TOML). Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the disk-tier root directory.
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store files and persist them to the disk tier
    Ingest(IngestArgs),
    /// Read and verify a payload from the disk tier
    Get(GetArgs),
    /// Verify every disk payload against its digest
    Fsck,
    /// Show disk-tier usage
    Stats,
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct IngestArgs {
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Content kind. Inferred per file when omitted.
    #[arg(long)]
    pub kind: Option<KindArg>,
}

#[derive(Args)]
pub struct GetArgs {
    /// Hex digest of the payload.
    pub digest: String,

    /// Write the payload here instead of stdout.
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum KindArg {
    Text,
    Binary,
    Structured,
}

impl From<KindArg> for ContentKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Text => ContentKind::Text,
            KindArg::Binary => ContentKind::Binary,
            KindArg::Structured => ContentKind::Structured,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ingest_with_kind() {
        let cli = Cli::try_parse_from(["crs", "ingest", "a.txt", "b.txt", "--kind", "text"]).unwrap();
        match cli.command {
            Command::Ingest(args) => {
                assert_eq!(args.paths.len(), 2);
                assert_eq!(args.kind, Some(KindArg::Text));
            }
            _ => panic!("expected ingest"),
        }
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn global_options_follow_the_subcommand() {
        let cli = Cli::try_parse_from([
            "crs", "get", "ab", "--format", "json", "--root", "/tmp/x", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/x")));
    }

    #[test]
    fn ingest_requires_a_path() {
        assert!(Cli::try_parse_from(["crs", "ingest"]).is_err());
    }
}
