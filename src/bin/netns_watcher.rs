// SPDX-License-Identifier: MIT

//! `netns-watcher`: watch a single network namespace and report
//! interface/address/route changes to an external runtime binary.

use nsbroker::monitor;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = monitor::cli::parse_or_exit();

    let level = if cli.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info };
    env_logger::Builder::new().filter_level(level).init();

    monitor::watch(cli).await?;
    Ok(())
}
