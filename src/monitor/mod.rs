// SPDX-License-Identifier: MIT

//! Netns monitor: enters a single network namespace, takes an initial
//! inventory of its interfaces and addresses, then watches a routing
//! netlink socket for further changes and reports each one to an
//! external runtime binary.

pub mod cli;
pub mod error;
pub mod netlink;
pub mod runtime;
pub mod scan;
pub mod table;

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::fcntl::OFlag;
use nix::sched::{setns, CloneFlags};

use crate::monitor::error::MonitorResult;
use crate::monitor::table::InterfaceTable;

/// Join the network namespace at `path`. Passing an empty clone-flag
/// mask makes `setns` accept any namespace type for the given file
/// descriptor, rather than requiring it to already be known as a net
/// namespace — this is the "type `0`" join the original watcher relies
/// on, since the fd it is handed is opened directly from a bind-mounted
/// namespace file with no type metadata attached beforehand.
pub fn enter_netns(path: &Path) -> MonitorResult<()> {
    let file = OpenOptions::new()
        .read(true)
        .custom_flags(OFlag::O_CLOEXEC.bits())
        .open(path)?;
    setns(&file, CloneFlags::empty())?;
    Ok(())
}

/// Drive the whole watcher lifecycle for one namespace: join it, take
/// an initial inventory, then watch forever.
pub async fn watch(cli: cli::Cli) -> MonitorResult<()> {
    enter_netns(Path::new(&cli.netns_path))?;

    let mut table = InterfaceTable::new();
    scan::scan_netns(&mut table)?;
    log::info!("initial scan of {} complete", cli.netns_path);

    let socket = netlink::open_routing_socket()?;
    netlink::monitor_netns(socket, table, cli.sandbox_id, cli.runtime_path).await
}
