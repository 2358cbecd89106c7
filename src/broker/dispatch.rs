// SPDX-License-Identifier: MIT

//! The parent's dispatch loop: read one command at a time from a
//! worker's pipe and act on it. Modeled as a tagged
//! [`DispatchOutcome`] rather than a raw integer, per the "fork-based
//! takeover" design note — a handler that spawns a new worker returns
//! `Takeover` and the loop must never write a reply on the stale pipe.

use std::path::PathBuf;

use crate::broker::children::{ChildTable, ForkOutcome};
use crate::broker::error::BrokerResult;
use crate::broker::namespaces;
use crate::broker::protocol::{
    read_command, read_payload, write_response, Command, PATH_MAX,
};
use crate::broker::{fsinfo, install_child_state};

/// What a single command dispatch resolved to.
pub enum DispatchOutcome {
    /// Write this success/failure byte as the reply.
    Reply(bool),
    /// The handler already wrote its own reply (`get_fs_info`, which
    /// follows the response byte with a payload).
    AlreadyReplied,
    /// This process has become the new worker; `init` must return
    /// immediately without touching the stale pipe any further.
    Takeover,
    /// `close_channels`: fds are closed, end the loop with success and
    /// no reply.
    Closed,
}

/// What finishing one worker's loop (cleanly or not) means for the
/// outer dispatcher.
pub enum LoopResult {
    /// EOF or `close_channels`: this worker's slot is done.
    Done,
    /// A handler spawned a new worker and this process *is* it.
    Takeover,
    /// Unrecoverable broker-internal error.
    Fatal,
}

fn path_from_payload(payload: Vec<u8>) -> BrokerResult<PathBuf> {
    let s = String::from_utf8(payload)
        .map_err(|_| crate::broker::error::BrokerError::Validation("payload is not valid UTF-8"))?;
    Ok(PathBuf::from(s))
}

fn handle_new_ns(table: &mut ChildTable, idx: usize) -> BrokerResult<DispatchOutcome> {
    let read = table.record(idx).read.try_clone()?;
    let path = path_from_payload(read_payload(&read, PATH_MAX)?)?;

    match table.spawn_save_child()? {
        ForkOutcome::Parent(_pid) => Ok(DispatchOutcome::Reply(true)),
        ForkOutcome::Child(channel) => {
            if let Err(e) = run_new_namespaces_sequence(&channel, &path) {
                log::error!("could not create persistent namespaces at {}: {e}", path.display());
                std::process::exit(1);
            }
            install_child_state(channel, path);
            Ok(DispatchOutcome::Takeover)
        }
    }
}

/// The in-namespace sequence a freshly forked worker runs for
/// `new_ns`: isolate the pin directory, join whatever already exists
/// there, unshare the rest, hand the new namespaces back to the parent
/// to pin, then run the per-kind post-join hooks.
fn run_new_namespaces_sequence(
    channel: &crate::broker::children::ChildChannel,
    path: &std::path::Path,
) -> BrokerResult<()> {
    namespaces::isolate_pin_directory(path)?;
    let joined = namespaces::child_join_namespaces(path)?;
    let mask = namespaces::unshare_mask(joined);
    namespaces::unshare_namespaces(mask)?;

    crate::broker::protocol::write_frame(
        &channel.write,
        Command::PersistentNs,
        Some(&crate::broker::protocol::path_payload(path)?),
    )?;
    if !crate::broker::protocol::read_response(&channel.read)? {
        return Err(crate::broker::error::BrokerError::Protocol(
            "parent refused to pin namespaces".into(),
        ));
    }
    namespaces::run_hooks()
}

fn handle_join_ns(table: &mut ChildTable, idx: usize) -> BrokerResult<DispatchOutcome> {
    let read = table.record(idx).read.try_clone()?;
    let path = path_from_payload(read_payload(&read, PATH_MAX)?)?;

    match table.spawn_save_child()? {
        ForkOutcome::Parent(_pid) => Ok(DispatchOutcome::Reply(true)),
        ForkOutcome::Child(channel) => {
            match namespaces::child_join_namespaces(&path) {
                Ok(_joined) => {
                    install_child_state(channel, path);
                    Ok(DispatchOutcome::Takeover)
                }
                Err(e) => {
                    log::error!("could not join namespaces at {}: {e}", path.display());
                    std::process::exit(1);
                }
            }
        }
    }
}

fn handle_remove_ns(table: &mut ChildTable, idx: usize) -> BrokerResult<DispatchOutcome> {
    let read = table.record(idx).read.try_clone()?;
    let path = path_from_payload(read_payload(&read, PATH_MAX)?)?;
    match namespaces::unpin(&path) {
        Ok(()) => Ok(DispatchOutcome::Reply(true)),
        Err(e) => {
            log::error!("could not remove namespaces at {}: {e}", path.display());
            Ok(DispatchOutcome::Reply(false))
        }
    }
}

fn handle_persistent_ns(table: &mut ChildTable, idx: usize) -> BrokerResult<DispatchOutcome> {
    let read = table.record(idx).read.try_clone()?;
    let path = path_from_payload(read_payload(&read, PATH_MAX)?)?;
    let pid = table.record(idx).pid;
    match namespaces::pin_namespaces(pid, &path) {
        Ok(()) => Ok(DispatchOutcome::Reply(true)),
        Err(e) => {
            log::error!("could not pin namespaces for pid {pid} at {}: {e}", path.display());
            Ok(DispatchOutcome::Reply(false))
        }
    }
}

fn handle_get_fs_info(table: &mut ChildTable, idx: usize) -> BrokerResult<DispatchOutcome> {
    let read = table.record(idx).read.try_clone()?;
    let write = table.record(idx).write.try_clone()?;

    let result = (|| -> BrokerResult<crate::broker::protocol::FsInfo> {
        let path = path_from_payload(read_payload(&read, PATH_MAX)?)?;
        let mount_point = fsinfo::resolve_mount_point(&path)?;
        fsinfo::read_fs_info(&mount_point)
    })();

    match result {
        Ok(info) => {
            write_response(&write, true)?;
            let mut w = &write;
            std::io::Write::write_all(&mut w, &info.to_wire())?;
        }
        Err(e) => {
            log::error!("get_fs_info failed: {e}");
            write_response(&write, false)?;
        }
    }
    Ok(DispatchOutcome::AlreadyReplied)
}

fn handle_close_channels(_table: &mut ChildTable, _idx: usize) -> BrokerResult<DispatchOutcome> {
    Ok(DispatchOutcome::Closed)
}

/// Interpret the raw command byte and route it. An unrecognized byte
/// is a per-request protocol failure, not a broker-fatal one: reply
/// `failure` and keep servicing this child's pipe (spec.md §4.1).
fn dispatch(table: &mut ChildTable, idx: usize, cmd_byte: u8) -> BrokerResult<DispatchOutcome> {
    let cmd = match Command::try_from(cmd_byte) {
        Ok(cmd) => cmd,
        Err(bad) => {
            log::error!("child slot {idx} sent unrecognized command byte {bad}");
            return Ok(DispatchOutcome::Reply(false));
        }
    };
    match cmd {
        Command::NewNs => handle_new_ns(table, idx),
        Command::JoinNs => handle_join_ns(table, idx),
        Command::RemoveNs => handle_remove_ns(table, idx),
        Command::PersistentNs => handle_persistent_ns(table, idx),
        Command::GetFsInfo => handle_get_fs_info(table, idx),
        Command::CloseChannels => handle_close_channels(table, idx),
    }
}

/// Run the dispatch loop for one worker's pipe until EOF, a handler
/// takeover, or a fatal error.
fn listen_child(table: &mut ChildTable, idx: usize) -> LoopResult {
    loop {
        let read = match table.record(idx).read.try_clone() {
            Ok(r) => r,
            Err(e) => {
                log::error!("could not clone read fd for child slot {idx}: {e}");
                return LoopResult::Fatal;
            }
        };
        let cmd = match read_command(&read) {
            Ok(None) => return LoopResult::Done,
            Ok(Some(cmd)) => cmd,
            Err(e) => {
                log::error!("could not read command from child slot {idx}: {e}");
                return LoopResult::Fatal;
            }
        };
        let outcome = match dispatch(table, idx, cmd) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("handler for child slot {idx} failed: {e}");
                DispatchOutcome::Reply(false)
            }
        };
        match outcome {
            DispatchOutcome::Reply(ok) => {
                if let Err(e) = write_response(&table.record(idx).write, ok) {
                    log::error!("could not write response to child slot {idx}: {e}");
                    return LoopResult::Fatal;
                }
            }
            DispatchOutcome::AlreadyReplied => {}
            DispatchOutcome::Takeover => return LoopResult::Takeover,
            DispatchOutcome::Closed => return LoopResult::Done,
        }
    }
}

/// Run the parent dispatch loop across every (possibly growing) table
/// entry. Returns `true` if this process became a new worker via
/// takeover (the caller, `init`, should then return normally);
/// otherwise this never returns — the worst child exit code (or 1 on
/// a fatal error) is handed to `std::process::exit`.
pub fn run_dispatcher(mut table: ChildTable) -> bool {
    let mut i = 0;
    while i < table.len() {
        match listen_child(&mut table, i) {
            LoopResult::Takeover => return true,
            LoopResult::Done => i += 1,
            LoopResult::Fatal => {
                table.kill_all();
                table.wait_all();
                std::process::exit(1);
            }
        }
    }
    let code = table.wait_all();
    std::process::exit(code);
}
