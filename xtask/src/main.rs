// Licensed under the Apache-2.0 license

mod cargo;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Cross-compilation target of the firmware images that link this crate.
const EMBEDDED_TARGET: &str = "thumbv7em-none-eabihf";

#[derive(Parser)]
#[command(name = "xtask", about = "noos-ddk development tasks")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the host test suite (unit and functional tests)
    Test {
        /// Only run tests whose name contains this string
        filter: Option<String>,
    },
    /// Build the library for the embedded target
    Build {
        #[arg(short, long)]
        release: bool,
        #[arg(long, default_value = EMBEDDED_TARGET)]
        target: String,
    },
    /// Run clippy for the host and the embedded target
    Clippy,
    /// Check formatting
    Fmt {
        /// Rewrite files instead of only checking them
        #[arg(long)]
        fix: bool,
    },
    /// Run every check CI runs
    Ci,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Test { filter } => cargo::test(filter.as_deref()),
        Commands::Build { release, target } => cargo::build(release, &target),
        Commands::Clippy => cargo::clippy(EMBEDDED_TARGET),
        Commands::Fmt { fix } => cargo::fmt(fix),
        Commands::Ci => {
            cargo::fmt(false)?;
            cargo::clippy(EMBEDDED_TARGET)?;
            cargo::build(true, EMBEDDED_TARGET)?;
            cargo::test(None)
        }
    }
}
