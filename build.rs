// SPDX-License-Identifier: GPL-3.0-only

use std::process::Command;

fn main() {
    println!("cargo::rerun-if-changed=.git/HEAD");
    println!("cargo::rerun-if-changed=.git/refs/tags");
    println!("cargo::rerun-if-env-changed=BARCODE_SCANNER_VERSION");

    // Packaged builds set the version explicitly
    let version = match std::env::var("BARCODE_SCANNER_VERSION") {
        Ok(v) => v,
        Err(_) => describe_version(),
    };

    println!("cargo::rustc-env=GIT_VERSION={}", version);
}

/// Version from `git describe`, formatted as `<tag>-<hash>` for a tagged
/// commit and `<tag>-dirty-<hash>` for commits after a tag.
fn describe_version() -> String {
    let described = Command::new("git")
        .args(["describe", "--tags", "--always", "--match", "v*"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string());

    let Some(described) = described else {
        return env_package_version();
    };

    let described = described.strip_prefix('v').unwrap_or(&described);
    let hash = short_hash().unwrap_or_else(|| "unknown".to_string());

    let parts: Vec<&str> = described.rsplitn(3, '-').collect();
    match parts.as_slice() {
        [g_hash, _commits, base] => {
            let hash = g_hash.strip_prefix('g').unwrap_or(g_hash);
            format!("{}-dirty-{}", base, hash)
        }
        _ if described == hash => format!("{}-{}", env_package_version(), hash),
        _ => format!("{}-{}", described, hash),
    }
}

fn short_hash() -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
        .ok()?;

    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn env_package_version() -> String {
    std::env::var("CARGO_PKG_VERSION").unwrap_or_else(|_| "unknown".to_string())
}
