use std::env::consts::{ARCH, FAMILY, OS};

use serde::{Deserialize, Serialize};

/// Host platform facts recorded alongside dependency probes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    pub os: String,
    pub family: String,
    pub arch: String,
}

/// Human-facing OS name.
fn display_os(os: &str) -> &str {
    match os {
        "macos" => "Mac OS X",
        "linux" => "Linux",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        other => other,
    }
}

pub fn host_info() -> HostInfo {
    HostInfo {
        os: display_os(OS).to_string(),
        family: FAMILY.to_string(),
        arch: ARCH.to_string(),
    }
}
