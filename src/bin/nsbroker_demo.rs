// SPDX-License-Identifier: MIT

//! `nsbroker-demo`: a thin command-line harness over the broker's
//! public API, for exercising the fork/pipe protocol by hand.
//!
//! Usage: `nsbroker-demo <new|join|remove|fsinfo|close> [path]`
//!
//! `init()` only returns in whatever process is currently the "live"
//! worker — first the process that ran this binary, later a fresh
//! worker forked by the broker on `new`/`join`. Each invocation here is
//! therefore a single one-shot step; run it repeatedly against the
//! same pin directory to walk the protocol forward.

use std::path::PathBuf;

use anyhow::{bail, Context};
use nsbroker::broker;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    broker::init().context("broker startup failed")?;

    let mut args = std::env::args().skip(1);
    let verb = args.next().unwrap_or_else(|| "help".to_string());

    match verb.as_str() {
        "new" => {
            let path = path_arg(args)?;
            let outcome = broker::new_namespaces(&path)?;
            println!("{outcome:?}");
        }
        "join" => {
            let path = path_arg(args)?;
            let outcome = broker::join_namespaces(&path)?;
            println!("{outcome:?}");
        }
        "remove" => {
            let path = path_arg(args)?;
            broker::remove_namespaces(&path)?;
            println!("removed");
        }
        "fsinfo" => {
            let path = path_arg(args)?;
            let info = broker::get_fs_info(&path)?;
            println!("{info:?}");
        }
        "close" => {
            broker::close_channels()?;
            println!("closed");
        }
        other => {
            bail!("unknown subcommand {other:?}; expected one of new, join, remove, fsinfo, close");
        }
    }

    Ok(())
}

fn path_arg(mut args: impl Iterator<Item = String>) -> anyhow::Result<PathBuf> {
    args.next()
        .map(PathBuf::from)
        .context("missing required <path> argument")
}
