// SPDX-License-Identifier: MIT

//! Join/unshare/pin/unpin logic for the fixed set of namespace kinds
//! the broker manages: IPC, UTS, mount. Network, PID, user and cgroup
//! namespaces are explicitly out of scope here (the monitor deals with
//! network namespaces separately, by `setns` alone, never by pinning).

use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use nix::fcntl::OFlag;
use nix::mount::{mount, umount, umount2, MntFlags, MsFlags};
use nix::sched::{unshare, setns, CloneFlags};
use nix::sys::stat::{stat, SFlag};
use nix::unistd::Pid;

use crate::broker::error::{BrokerError, BrokerResult};

/// One entry of the recognized namespace set: its `unshare`/`setns`
/// flag, the file name it occupies under a pin directory, and an
/// optional hook run after the namespace is entered.
pub struct NamespaceKind {
    pub flag: CloneFlags,
    pub name: &'static str,
    pub hook: Option<fn() -> BrokerResult<()>>,
}

pub const SUPPORTED_NAMESPACES: &[NamespaceKind] = &[
    NamespaceKind { flag: CloneFlags::CLONE_NEWIPC, name: "ipc", hook: None },
    NamespaceKind { flag: CloneFlags::CLONE_NEWUTS, name: "uts", hook: None },
    NamespaceKind { flag: CloneFlags::CLONE_NEWNS, name: "mnt", hook: Some(reslave_root) },
];

/// Post-join hook for the mount namespace: re-mount `/` slave+recursive
/// so mounts made inside the new namespace never propagate outward.
fn reslave_root() -> BrokerResult<()> {
    mount(
        None::<&str>,
        "/",
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_SLAVE,
        None::<&str>,
    )
    .map_err(BrokerError::from)
}

/// Join every supported namespace kind that already has a file under
/// `path`. Missing targets are skipped, not an error — joining is
/// best-effort over the recognized set. Returns the bitmask of kinds
/// actually joined.
pub fn child_join_namespaces(path: &Path) -> BrokerResult<CloneFlags> {
    let mut joined = CloneFlags::empty();
    for ns in SUPPORTED_NAMESPACES {
        let ns_path = path.join(ns.name);
        if stat(&ns_path).is_err() {
            continue;
        }
        let file = OpenOptions::new()
            .read(true)
            .custom_flags(OFlag::O_CLOEXEC.bits())
            .open(&ns_path)?;
        setns(&file, ns.flag).map_err(BrokerError::from)?;
        joined |= ns.flag;
    }
    Ok(joined)
}

/// The mandatory first two steps of "new persistent": bind-mount
/// `path` onto itself, then re-mount it slave+recursive. This is a
/// precondition of namespace persistence — without it, a later pin
/// mount inside `path` could leak back out to the host mount table.
pub fn isolate_pin_directory(path: &Path) -> BrokerResult<()> {
    mount(Some(path), path, None::<&str>, MsFlags::MS_BIND, None::<&str>)?;
    mount(
        None::<&str>,
        path,
        None::<&str>,
        MsFlags::MS_REC | MsFlags::MS_SLAVE,
        None::<&str>,
    )?;
    Ok(())
}

/// The unshare mask for "every supported kind not already joined".
pub fn unshare_mask(joined: CloneFlags) -> CloneFlags {
    let all = SUPPORTED_NAMESPACES
        .iter()
        .fold(CloneFlags::empty(), |acc, ns| acc | ns.flag);
    all & !joined
}

pub fn unshare_namespaces(mask: CloneFlags) -> BrokerResult<()> {
    if mask.is_empty() {
        return Ok(());
    }
    unshare(mask).map_err(BrokerError::from)
}

/// Run the post-join hook of every supported kind that has one.
pub fn run_hooks() -> BrokerResult<()> {
    for ns in SUPPORTED_NAMESPACES {
        if let Some(hook) = ns.hook {
            hook()?;
        }
    }
    Ok(())
}

/// Parent-side half of `persistent_ns`: for every supported kind whose
/// target doesn't already exist under `path`, bind-mount
/// `/proc/<pid>/ns/<kind>` onto a freshly created zero-byte regular
/// file at `<path>/<kind>`.
pub fn pin_namespaces(pid: Pid, path: &Path) -> BrokerResult<()> {
    for ns in SUPPORTED_NAMESPACES {
        let target = path.join(ns.name);
        if stat(&target).is_ok() {
            continue;
        }
        let source = PathBuf::from(format!("/proc/{}/ns/{}", pid, ns.name));
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(0o700)
            .open(&target)?;
        mount(Some(&source), &target, None::<&str>, MsFlags::MS_BIND, None::<&str>)?;
    }
    Ok(())
}

/// Parent-side `remove_namespaces`: unpin and delete every persistent
/// namespace file under `path`, then unmount `path` itself.
pub fn unpin(path: &Path) -> BrokerResult<()> {
    let st = stat(path)?;
    if SFlag::from_bits_truncate(st.st_mode & libc::S_IFMT) != SFlag::S_IFDIR {
        return Err(BrokerError::Validation("path is not a directory"));
    }
    for ns in SUPPORTED_NAMESPACES {
        let target = path.join(ns.name);
        let st2 = match stat(&target) {
            Ok(st2) => st2,
            Err(_) => continue,
        };
        if SFlag::from_bits_truncate(st2.st_mode & libc::S_IFMT) != SFlag::S_IFREG {
            continue;
        }
        if let Err(e) = umount2(&target, MntFlags::MNT_DETACH) {
            log::error!("could not unmount {}: {e}", target.display());
        }
        if let Err(e) = std::fs::remove_file(&target) {
            log::error!("could not remove {}: {e}", target.display());
        }
    }
    // Unmounting the pin directory itself is fatal: a failure here
    // means the directory is still in use and the request as a whole
    // has not succeeded.
    umount(path).map_err(BrokerError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unshare_mask_excludes_joined_kinds() {
        let joined = CloneFlags::CLONE_NEWIPC;
        let mask = unshare_mask(joined);
        assert!(!mask.contains(CloneFlags::CLONE_NEWIPC));
        assert!(mask.contains(CloneFlags::CLONE_NEWUTS));
        assert!(mask.contains(CloneFlags::CLONE_NEWNS));
    }

    #[test]
    fn unshare_mask_is_empty_when_everything_joined() {
        let joined = SUPPORTED_NAMESPACES
            .iter()
            .fold(CloneFlags::empty(), |acc, ns| acc | ns.flag);
        assert!(unshare_mask(joined).is_empty());
    }
}
