// SPDX-License-Identifier: MIT

pub type MonitorResult<T> = Result<T, MonitorError>;

#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("syscall failed: {0}")]
    Errno(#[from] nix::Error),

    #[error("netlink error: {0}")]
    Netlink(String),

    #[error("interface index {0} out of range")]
    InvalidIndex(i32),

    #[error("empty address rejected")]
    EmptyAddress,

    #[error("address not found")]
    NotFound,
}
