//! Entry point for the command-line interface.
//! Delegates to dedicated modules for argument handling, scanning and
//! output formatting.

use crossflow::args::{parse_cli, Commands};
use crossflow::scan::run_scan;

fn main() -> anyhow::Result<()> {
    let cli = parse_cli();
    match cli.command {
        Commands::Scan(args) => run_scan(args),
        Commands::Profiles => {
            let tables = profiles::ApiProfiles::defaults();
            println!("{}", serde_json::to_string_pretty(&tables)?);
            Ok(())
        }
    }
}
