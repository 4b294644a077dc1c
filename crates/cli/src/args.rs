use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use estree::SourceType;

fn parse_source_type(s: &str) -> Result<SourceType, String> {
    s.parse()
}

fn default_workers() -> usize {
    // Half the CPUs; extension analyses are memory-hungry.
    std::thread::available_parallelism().map_or(1, |n| (n.get() / 2).max(1))
}

fn parse_workers(s: &str) -> Result<usize, String> {
    let v: usize = s
        .parse()
        .map_err(|e: std::num::ParseIntError| e.to_string())?;
    if v == 0 {
        Err("parallelize must be greater than 0".into())
    } else {
        Ok(v)
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "crossflow - static detection of renderer-attacker-exploitable data flows in browser extensions",
    long_about = "crossflow builds program dependence graphs over an extension's background \
and content scripts and reports message-channel data flows a web page attacker can abuse: \
privileged-API exfiltration, payload infiltration into privileged or DOM sinks, and \
extension-storage dangers.

Examples:
  crossflow scan ./unpacked-extension             # Analyze one unpacked extension
  crossflow scan ./extensions --batch             # Analyze every extension in a directory
  crossflow scan ./ext --apis ./my-profiles.json  # Extend the API profile tables
  crossflow profiles                              # Print the built-in profile tables",
    subcommand_required = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Analyze unpacked extensions for renderer-attacker data flows
    Scan(ScanArgs),
    /// Print the built-in API profile tables as JSON
    Profiles,
}

#[derive(ClapArgs)]
pub struct ScanArgs {
    /// Unpacked extension directory (or a directory of them with --batch)
    pub path: PathBuf,
    /// Treat PATH as a directory containing one extension per subdirectory
    #[arg(long)]
    pub batch: bool,
    /// Content script path, overriding manifest discovery
    #[arg(long = "content-script", short = 'c')]
    pub cs: Option<PathBuf>,
    /// Background page / service worker path, overriding manifest discovery
    #[arg(long = "background-page", short = 'b')]
    pub bp: Option<PathBuf>,
    /// The background input is a web-accessible resource
    #[arg(long)]
    pub war: bool,
    /// Where to write the analysis JSON (a directory in batch mode).
    /// Default: <extension>/analysis.json
    #[arg(long)]
    pub analysis: Option<PathBuf>,
    /// sourceType option passed to the parser
    #[arg(long, value_parser = parse_source_type, default_value = "module")]
    pub source_type: SourceType,
    /// External AST parser: `espree`, `esprima`, or a command invoked as
    /// `<cmd> <source> <out-json> <source-type>`
    #[arg(long, default_value = "espree")]
    pub parser: String,
    /// JSON file extending the sensitive-API profile tables
    #[arg(long = "apis")]
    pub apis: Option<PathBuf>,
    /// Number of extensions analyzed in parallel
    #[arg(long, default_value_t = default_workers(), value_parser = parse_workers)]
    pub parallelize: usize,
    /// Wall-clock budget per extension, in seconds
    #[arg(long, default_value_t = 600)]
    pub timeout_seconds: u64,
    /// Budget for one parser invocation, in seconds
    #[arg(long, default_value_t = 30)]
    pub parser_timeout_seconds: u64,
    /// In batch mode, analyze smaller extensions first
    #[arg(long)]
    pub sort_by_size_ascending: bool,
    /// Also report unverified listeners without privileged API access
    #[arg(long = "include-31-violations")]
    pub include_31_violations: bool,
    /// Flow enumeration depth bound; 0 disables the bound
    #[arg(long, default_value_t = 0)]
    pub flow_depth_limit: usize,
    /// Enable debug output
    #[arg(long)]
    pub debug: bool,
    /// Suppress non-essential output
    #[arg(long)]
    pub quiet: bool,
}

pub fn parse_cli() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    #[test]
    fn parse_workers_rejects_zero() {
        assert!(super::parse_workers("0").is_err());
        assert_eq!(super::parse_workers("4"), Ok(4));
    }

    #[test]
    fn parse_source_type_accepts_the_three_modes() {
        for mode in ["script", "module", "commonjs"] {
            assert!(super::parse_source_type(mode).is_ok());
        }
        assert!(super::parse_source_type("typescript").is_err());
    }
}
