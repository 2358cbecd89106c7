// SPDX-License-Identifier: MIT

//! Invoke the external runtime binary for each interface/address/route
//! change. We only specify the command line emitted; the binary
//! itself is an external collaborator.

use tokio::process::Command;

use crate::monitor::error::{MonitorError, MonitorResult};

/// Run `runtime_path <verb> <args...>`, wait for it, and map its exit
/// status to success/failure. Exit code `0` is success; any other
/// exit code, or abnormal termination, is failure — never the
/// inverted reading.
pub async fn invoke(runtime_path: &str, verb: &str, args: &[String]) -> MonitorResult<()> {
    log::debug!("invoking {runtime_path} {verb} {}", args.join(" "));
    let status = Command::new(runtime_path)
        .arg(verb)
        .args(args)
        .status()
        .await?;

    match status.code() {
        Some(0) => Ok(()),
        Some(code) => Err(MonitorError::Netlink(format!("{runtime_path} {verb} exited with status {code}"))),
        None => Err(MonitorError::Netlink(format!("{runtime_path} {verb} terminated by signal"))),
    }
}

pub fn add_net_if(sandbox_id: &str, name: &str, hw_addr: &str, mtu: u32) -> (String, Vec<String>) {
    let _ = sandbox_id;
    (
        "add-net-if".to_string(),
        vec![
            "--name".into(), name.into(),
            "--hw-addr".into(), hw_addr.into(),
            "--mtu".into(), mtu.to_string(),
        ],
    )
}

pub fn del_net_if(name: &str) -> (String, Vec<String>) {
    ("del-net-if".to_string(), vec!["--name".into(), name.into()])
}

pub fn upd_net_if(name: &str, hw_addr: &str, mtu: u32) -> (String, Vec<String>) {
    (
        "upd-net-if".to_string(),
        vec![
            "--name".into(), name.into(),
            "--hw-addr".into(), hw_addr.into(),
            "--mtu".into(), mtu.to_string(),
        ],
    )
}

pub fn add_net_route(src: &str, dst: &str, prefix: u8, gw: &str, dev: &str) -> (String, Vec<String>) {
    (
        "add-net-route".to_string(),
        vec![
            "--src".into(), src.into(),
            "--dst".into(), format!("{dst}/{prefix}"),
            "--gw".into(), gw.into(),
            "--dev".into(), dev.into(),
        ],
    )
}

pub fn del_net_route(src: &str, dst: &str, prefix: u8, gw: &str, dev: &str) -> (String, Vec<String>) {
    (
        "del-net-route".to_string(),
        vec![
            "--src".into(), src.into(),
            "--dst".into(), format!("{dst}/{prefix}"),
            "--gw".into(), gw.into(),
            "--dev".into(), dev.into(),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_net_if_emits_expected_flags() {
        let (verb, args) = add_net_if("sbx1", "eth0", "aa:bb:cc:dd:ee:ff", 1500);
        assert_eq!(verb, "add-net-if");
        assert_eq!(args, vec!["--name", "eth0", "--hw-addr", "aa:bb:cc:dd:ee:ff", "--mtu", "1500"]);
    }

    #[test]
    fn add_net_route_formats_destination_with_prefix() {
        let (verb, args) = add_net_route("0.0.0.0", "10.0.0.0", 24, "10.0.0.1", "eth0");
        assert_eq!(verb, "add-net-route");
        assert_eq!(args[3], "10.0.0.0/24");
    }
}
