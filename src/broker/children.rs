// SPDX-License-Identifier: MIT

//! The broker's child table: at most two worker processes exist at
//! once (the original worker, plus one new worker spawned inside a
//! namespace handler), each reachable through one pipe pair.

use std::fs::File;
use std::path::PathBuf;

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, pipe, ForkResult, Pid};

use crate::broker::error::{BrokerError, BrokerResult};

pub const CHILD_MAX: usize = 2;

/// The parent's view of one worker: its pid, and the parent's ends of
/// the two pipes connecting to it.
pub struct ChildRecord {
    pub pid: Pid,
    pub read: File,
    pub write: File,
}

/// The result of `spawn_save_child` in whichever process observes it.
pub enum ForkOutcome {
    /// We are the parent; the new worker has pid `Pid`.
    Parent(Pid),
    /// We are the new worker; here are our ends of the pipes back to
    /// the parent.
    Child(ChildChannel),
}

/// A worker's view of its own connection to the broker parent.
pub struct ChildChannel {
    pub read: File,
    pub write: File,
}

/// Parent-side table of worker records, grown by `spawn_save_child`
/// and never shrunk (records are only reaped, in bulk, by
/// `wait_all`).
pub struct ChildTable {
    records: Vec<ChildRecord>,
}

impl ChildTable {
    pub fn new() -> Self {
        Self { records: Vec::with_capacity(CHILD_MAX) }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn record(&self, idx: usize) -> &ChildRecord {
        &self.records[idx]
    }

    /// Fork a new worker process. In the parent, register it as a new
    /// table entry and return its pid. In the child, close every
    /// sibling/parent pipe end inherited from the fork and return our
    /// own channel.
    pub fn spawn_save_child(&mut self) -> BrokerResult<ForkOutcome> {
        if self.records.len() >= CHILD_MAX {
            return Err(BrokerError::TooManyChildren);
        }

        let (child_to_parent_r, child_to_parent_w) = pipe()?;
        let (parent_to_child_r, parent_to_child_w) = pipe()?;

        match unsafe { fork() }.map_err(BrokerError::from)? {
            ForkResult::Parent { child } => {
                // These ends belong to the child; close them here.
                drop(child_to_parent_w);
                drop(parent_to_child_r);
                self.records.push(ChildRecord {
                    pid: child,
                    read: File::from(child_to_parent_r),
                    write: File::from(parent_to_child_w),
                });
                Ok(ForkOutcome::Parent(child))
            }
            ForkResult::Child => {
                // The child sees the table as cleared: drop whatever
                // fds we inherited for siblings we never owned.
                self.records.clear();
                drop(child_to_parent_r);
                drop(parent_to_child_w);
                Ok(ForkOutcome::Child(ChildChannel {
                    read: File::from(parent_to_child_r),
                    write: File::from(child_to_parent_w),
                }))
            }
        }
    }

    pub fn kill_all(&self) {
        for r in &self.records {
            let _ = kill(r.pid, Signal::SIGKILL);
        }
    }

    /// Blocking-wait every registered worker and return the worst
    /// (i.e. first nonzero, or -1 on signal/error) exit code.
    pub fn wait_all(&mut self) -> i32 {
        let mut exit_code = 0;
        for r in self.records.drain(..) {
            // Blocking wait (flag 0), not the nonstandard flag 2 the
            // original implementation passed.
            match waitpid(r.pid, None) {
                Ok(WaitStatus::Exited(_, code)) => {
                    if code != 0 {
                        exit_code = code;
                    }
                }
                Ok(_) | Err(_) => {
                    exit_code = -1;
                }
            }
        }
        exit_code
    }
}

impl Default for ChildTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The worker-side global: this process's single channel to the
/// broker parent, plus the namespace directory it last joined or
/// created (used to short-circuit redundant join/new calls).
pub struct ChildState {
    pub channel: ChildChannel,
    pub ns_path: Option<PathBuf>,
}
