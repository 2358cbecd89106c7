// SPDX-License-Identifier: MIT

//! `netns-watcher` argument parsing. Required: `--netns-path`,
//! `--sandbox-id`, `--runtime-path`. A missing required argument must
//! exit with code `EINVAL` (22) and a usage message on stderr, as
//! specified — clap's own default mismatch exit code (2) is
//! overridden explicitly in `parse_or_exit`.

use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "netns-watcher", version, about = "Watch a network namespace for interface/address/route changes")]
pub struct Cli {
    /// Path of the network namespace to enter and watch.
    #[arg(short = 'n', long = "netns-path")]
    pub netns_path: String,

    /// Identifier of the sandbox this namespace belongs to.
    #[arg(short = 'p', long = "sandbox-id")]
    pub sandbox_id: String,

    /// Path to the external runtime binary invoked on each change.
    #[arg(short = 'r', long = "runtime-path")]
    pub runtime_path: String,

    /// Raise logging verbosity to debug/trace.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}

/// Parse `argv`. `--help`/`--version` print and exit `0` as usual;
/// a missing required argument or other malformed usage exits with
/// `EINVAL` (22), matching the original CLI's `getopt_long`-based
/// behavior.
pub fn parse_or_exit() -> Cli {
    match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            use clap::error::ErrorKind;
            match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => e.exit(),
                _ => {
                    eprintln!("{e}");
                    std::process::exit(libc::EINVAL);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_and_optional_flags() {
        let cli = Cli::try_parse_from([
            "netns-watcher",
            "--netns-path", "/var/run/netns/sbx1",
            "--sandbox-id", "sbx1",
            "--runtime-path", "/usr/bin/kata-runtime",
            "--debug",
        ])
        .unwrap();
        assert_eq!(cli.netns_path, "/var/run/netns/sbx1");
        assert!(cli.debug);
    }

    #[test]
    fn missing_required_argument_fails_to_parse() {
        let result = Cli::try_parse_from(["netns-watcher", "--sandbox-id", "sbx1"]);
        assert!(result.is_err());
    }
}
