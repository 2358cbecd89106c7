// SPDX-License-Identifier: MIT

//! Namespace broker: a privileged parent process that creates,
//! persists, joins and tears down IPC/UTS/mount namespaces on behalf
//! of a worker process, via a fork/pipe request-response protocol.
//!
//! Call [`init`] once at process startup. In the process that returns
//! from it, use [`new_namespaces`], [`join_namespaces`],
//! [`remove_namespaces`], [`get_fs_info`] and [`close_channels`] to
//! drive the broker. `init` never returns in the broker parent itself
//! — it only returns in whichever worker process is currently "live".

pub mod children;
pub mod dispatch;
pub mod error;
pub mod fsinfo;
pub mod namespaces;
pub mod protocol;

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use children::{ChildChannel, ChildState, ChildTable, ForkOutcome};
use error::{BrokerError, BrokerResult};
use protocol::{path_payload, Command, FS_INFO_WIRE_LEN};

static CHILD_STATE: Mutex<Option<ChildState>> = Mutex::new(None);

fn install_child_state(channel: ChildChannel, ns_path: impl Into<Option<PathBuf>>) {
    let mut guard = CHILD_STATE.lock().unwrap();
    *guard = Some(ChildState { channel, ns_path: ns_path.into() });
}

/// Outcome of a `new_namespaces`/`join_namespaces` call, standing in
/// for the C API's `0`/`1` return values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamespaceOutcome {
    Created,
    AlreadyActive,
}

/// Run once during process startup. Forks once: the parent becomes
/// the broker and loops forever (dispatching commands, never
/// returning — the process exits when every worker is gone). The
/// child returns `Ok(())` and continues the caller's normal startup
/// sequence.
///
/// Later, when the live worker asks for a new or joined namespace, the
/// broker parent forks again inside the handler; the new worker
/// becomes "live" and `init` returns a second time, in that new OS
/// process, exactly as it did the first time.
pub fn init() -> BrokerResult<()> {
    let mut table = ChildTable::new();
    match table.spawn_save_child()? {
        ForkOutcome::Child(channel) => {
            install_child_state(channel, None);
            Ok(())
        }
        ForkOutcome::Parent(_pid) => {
            if dispatch::run_dispatcher(table) {
                Ok(())
            } else {
                unreachable!("run_dispatcher only returns true, or calls process::exit")
            }
        }
    }
}

fn with_channel<T>(f: impl FnOnce(&mut ChildState) -> BrokerResult<T>) -> BrokerResult<T> {
    let mut guard = CHILD_STATE.lock().unwrap();
    let state = guard.as_mut().ok_or(BrokerError::Closed)?;
    f(state)
}

fn child_send_cmd(channel: &ChildChannel, cmd: Command, payload: Option<&[u8]>) -> BrokerResult<()> {
    protocol::write_frame(&channel.write, cmd, payload)?;
    if protocol::read_response(&channel.read)? {
        Ok(())
    } else {
        Err(BrokerError::CommandFailed(cmd))
    }
}

/// Create or adopt persistent namespaces at `path`. Returns
/// `AlreadyActive` without talking to the broker if `path` is already
/// the active namespace directory.
pub fn new_namespaces(path: &Path) -> BrokerResult<NamespaceOutcome> {
    with_channel(|state| {
        if state.ns_path.as_deref() == Some(path) {
            return Ok(NamespaceOutcome::AlreadyActive);
        }
        child_send_cmd(&state.channel, Command::NewNs, Some(&path_payload(path)?))?;
        Ok(NamespaceOutcome::Created)
    })
}

/// Move the caller into the persistent namespaces at `path`.
pub fn join_namespaces(path: &Path) -> BrokerResult<NamespaceOutcome> {
    with_channel(|state| {
        if state.ns_path.as_deref() == Some(path) {
            return Ok(NamespaceOutcome::AlreadyActive);
        }
        child_send_cmd(&state.channel, Command::JoinNs, Some(&path_payload(path)?))?;
        Ok(NamespaceOutcome::Created)
    })
}

/// Unpin and delete the persistent namespace files under `path`.
pub fn remove_namespaces(path: &Path) -> BrokerResult<()> {
    with_channel(|state| {
        child_send_cmd(&state.channel, Command::RemoveNs, Some(&path_payload(path)?))
    })
}

/// Resolve `path`'s containing `/proc/mounts` entry via the broker.
pub fn get_fs_info(path: &Path) -> BrokerResult<protocol::FsInfo> {
    with_channel(|state| {
        protocol::write_frame(&state.channel.write, Command::GetFsInfo, Some(&path_payload(path)?))?;
        if !protocol::read_response(&state.channel.read)? {
            return Err(BrokerError::CommandFailed(Command::GetFsInfo));
        }
        let mut buf = vec![0u8; FS_INFO_WIRE_LEN];
        let mut r = &state.channel.read;
        std::io::Read::read_exact(&mut r, &mut buf)?;
        protocol::FsInfo::from_wire(&buf).ok_or(BrokerError::Protocol("malformed fs_info reply".into()))
    })
}

/// Terminate the broker protocol for this worker. Subsequent API
/// calls in this process are undefined (they will see `Closed`).
pub fn close_channels() -> BrokerResult<()> {
    let mut guard = CHILD_STATE.lock().unwrap();
    let state = guard.as_ref().ok_or(BrokerError::Closed)?;
    protocol::write_frame(&state.channel.write, Command::CloseChannels, None)?;
    *guard = None;
    Ok(())
}
