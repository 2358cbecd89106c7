// SPDX-License-Identifier: MIT

use crate::broker::protocol::Command;

pub type BrokerResult<T> = Result<T, BrokerError>;

#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("syscall failed: {0}")]
    Errno(#[from] nix::Error),

    #[error("validation failed: {0}")]
    Validation(&'static str),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("command {0:?} failed")]
    CommandFailed(Command),

    #[error("maximum number of children already spawned")]
    TooManyChildren,

    #[error("broker channel not initialized or already closed")]
    Closed,
}
