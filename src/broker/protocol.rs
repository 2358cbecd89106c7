// SPDX-License-Identifier: MIT

//! Wire format shared by every broker pipe: a one-byte command, an
//! optional length-prefixed payload, and a one-byte response. See
//! `fn write_frame`/`read_command` for the exact byte layout.

use std::fs::File;
use std::io::{self, Read, Write};

use crate::broker::error::{BrokerError, BrokerResult};

/// Linux `PATH_MAX`; also the cap on a command payload, which is always
/// a filesystem path in this protocol.
pub const PATH_MAX: usize = 4096;
/// Linux `NAME_MAX`.
pub const NAME_MAX: usize = 255;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    NewNs = 1,
    RemoveNs = 2,
    JoinNs = 3,
    PersistentNs = 4,
    GetFsInfo = 5,
    CloseChannels = 6,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, u8> {
        match value {
            1 => Ok(Command::NewNs),
            2 => Ok(Command::RemoveNs),
            3 => Ok(Command::JoinNs),
            4 => Ok(Command::PersistentNs),
            5 => Ok(Command::GetFsInfo),
            6 => Ok(Command::CloseChannels),
            other => Err(other),
        }
    }
}

/// Write a command frame: one command byte, then (if `payload` is
/// `Some`) an `i32` length followed by the payload bytes.
pub fn write_frame(mut w: &File, cmd: Command, payload: Option<&[u8]>) -> io::Result<()> {
    w.write_all(&[cmd as u8])?;
    if let Some(data) = payload {
        let len = data.len() as i32;
        w.write_all(&len.to_ne_bytes())?;
        w.write_all(data)?;
    }
    Ok(())
}

/// Read one raw command byte. `Ok(None)` means EOF — clean shutdown,
/// not an error. Deliberately does not validate the byte against
/// [`Command`]: an unrecognized command is a per-request protocol
/// failure (reply `failure`, keep servicing the pipe), not an I/O
/// error that should tear down the dispatcher — see
/// `dispatch::dispatch` for where the byte is interpreted.
pub fn read_command(mut r: &File) -> io::Result<Option<u8>> {
    let mut b = [0u8; 1];
    let n = r.read(&mut b)?;
    if n == 0 {
        return Ok(None);
    }
    Ok(Some(b[0]))
}

/// Read a length-prefixed payload, rejecting anything bigger than
/// `max_len` (the broker only ever exchanges bounded path strings).
pub fn read_payload(mut r: &File, max_len: usize) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    r.read_exact(&mut len_buf)?;
    let len = i32::from_ne_bytes(len_buf);
    if len < 0 || len as usize > max_len {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "payload size out of bounds"));
    }
    let mut buf = vec![0u8; len as usize];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub fn write_response(mut w: &File, ok: bool) -> io::Result<()> {
    w.write_all(&[if ok { 0 } else { 1 }])
}

pub fn read_response(mut r: &File) -> io::Result<bool> {
    let mut b = [0u8; 1];
    r.read_exact(&mut b)?;
    Ok(b[0] == 0)
}

/// Encode a path as a command payload, rejecting paths that don't fit
/// in `PATH_MAX` or that aren't valid UTF-8.
pub fn path_payload(path: &std::path::Path) -> BrokerResult<Vec<u8>> {
    let s = path
        .to_str()
        .ok_or(BrokerError::Validation("path is not valid UTF-8"))?;
    if s.len() >= PATH_MAX {
        return Err(BrokerError::Validation("path exceeds PATH_MAX"));
    }
    Ok(s.as_bytes().to_vec())
}

/// `(device, mount_point, type, mount_data)` — four bounded strings
/// mirroring one `/proc/mounts` line, exchanged as a fixed-size raw
/// buffer after a successful `get_fs_info` response.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FsInfo {
    pub device: String,
    pub mount_point: String,
    pub type_: String,
    pub data: String,
}

pub const FS_INFO_WIRE_LEN: usize = PATH_MAX + PATH_MAX + NAME_MAX + PATH_MAX;

impl FsInfo {
    pub fn to_wire(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FS_INFO_WIRE_LEN);
        write_fixed(&mut buf, &self.device, PATH_MAX);
        write_fixed(&mut buf, &self.mount_point, PATH_MAX);
        write_fixed(&mut buf, &self.type_, NAME_MAX);
        write_fixed(&mut buf, &self.data, PATH_MAX);
        buf
    }

    pub fn from_wire(buf: &[u8]) -> Option<Self> {
        if buf.len() != FS_INFO_WIRE_LEN {
            return None;
        }
        let mut offset = 0;
        let device = read_fixed(buf, &mut offset, PATH_MAX)?;
        let mount_point = read_fixed(buf, &mut offset, PATH_MAX)?;
        let type_ = read_fixed(buf, &mut offset, NAME_MAX)?;
        let data = read_fixed(buf, &mut offset, PATH_MAX)?;
        Some(FsInfo { device, mount_point, type_, data })
    }
}

/// Truncate `s` to fit in a `cap`-byte NUL-padded field, matching the
/// C implementation's fixed buffers.
fn write_fixed(buf: &mut Vec<u8>, s: &str, cap: usize) {
    let bytes = s.as_bytes();
    let n = bytes.len().min(cap.saturating_sub(1));
    buf.extend_from_slice(&bytes[..n]);
    buf.resize(buf.len() + (cap - n), 0);
}

fn read_fixed(buf: &[u8], offset: &mut usize, cap: usize) -> Option<String> {
    let field = &buf[*offset..*offset + cap];
    *offset += cap;
    let end = field.iter().position(|&b| b == 0).unwrap_or(field.len());
    String::from_utf8(field[..end].to_vec()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_info_round_trips_through_wire_format() {
        let info = FsInfo {
            device: "/dev/sda1".into(),
            mount_point: "/".into(),
            type_: "ext4".into(),
            data: "rw,relatime".into(),
        };
        let wire = info.to_wire();
        assert_eq!(wire.len(), FS_INFO_WIRE_LEN);
        let back = FsInfo::from_wire(&wire).unwrap();
        assert_eq!(info, back);
    }

    #[test]
    fn write_fixed_truncates_and_nul_terminates() {
        let mut buf = Vec::new();
        write_fixed(&mut buf, "hello", 4);
        assert_eq!(buf, b"hel\0");
    }

    #[test]
    fn command_try_from_rejects_unknown_bytes() {
        assert!(Command::try_from(0).is_err());
        assert!(Command::try_from(7).is_err());
        assert_eq!(Command::try_from(1).unwrap(), Command::NewNs);
    }
}
