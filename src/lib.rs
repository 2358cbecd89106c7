// SPDX-License-Identifier: MIT

//! Namespace broker and network-namespace monitor primitives used by a
//! container runtime to manage the mount/IPC/UTS namespaces of a sandbox
//! and to watch a target network namespace for interface/address/route
//! changes.

pub mod broker;
pub mod monitor;
