// Licensed under the Apache-2.0 license

use anyhow::{bail, Context, Result};
use std::process::Command;

const LIB_PACKAGE: &str = "noos-ddk";

fn run(mut cmd: Command, what: &str) -> Result<()> {
    println!("Running {what}...");
    let status = cmd
        .status()
        .with_context(|| format!("Failed to spawn cargo for {what}"))?;
    if !status.success() {
        bail!("{what} failed with {status}");
    }
    Ok(())
}

fn cargo() -> Command {
    let mut cmd = Command::new(std::env::var("CARGO").unwrap_or_else(|_| "cargo".into()));
    cmd.args(["--color", "always"]);
    cmd
}

/// Host tests. The functional suites under `src/tests` run here too.
pub fn test(filter: Option<&str>) -> Result<()> {
    let mut cmd = cargo();
    cmd.args(["test", "-p", LIB_PACKAGE]);
    if let Some(filter) = filter {
        cmd.arg(filter);
    }
    run(cmd, "host tests")
}

pub fn build(release: bool, target: &str) -> Result<()> {
    let mut cmd = cargo();
    cmd.args(["build", "-p", LIB_PACKAGE, "--target", target]);
    if release {
        cmd.arg("--release");
    }
    run(cmd, &format!("{target} build"))
}

pub fn clippy(target: &str) -> Result<()> {
    let mut host = cargo();
    host.args(["clippy", "-p", LIB_PACKAGE, "--all-targets", "--", "-D", "warnings"]);
    run(host, "host clippy")?;

    let mut cross = cargo();
    cross.args(["clippy", "-p", LIB_PACKAGE, "--target", target, "--", "-D", "warnings"]);
    run(cross, &format!("{target} clippy"))
}

pub fn fmt(fix: bool) -> Result<()> {
    let mut cmd = cargo();
    cmd.args(["fmt", "--all"]);
    if !fix {
        cmd.arg("--check");
    }
    run(cmd, "rustfmt")
}
