//! Build script for dialtrack-collector
//!
//! Build identification reported at startup and by GET /health:
//! - GIT_HASH: short commit hash, `-dirty` when the tree has local edits
//! - BUILD_TIMESTAMP: RFC 3339, seconds precision
//! - BUILD_PROFILE: cargo profile

use std::process::Command;

/// Trimmed stdout of a successful git invocation
fn git(args: &[&str]) -> Option<String> {
    Command::new("git")
        .args(args)
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|s| s.trim().to_string())
}

fn main() {
    let git_hash = match git(&["rev-parse", "--short=8", "HEAD"]) {
        Some(hash) => {
            let dirty = git(&["status", "--porcelain"]).is_some_and(|s| !s.is_empty());
            if dirty {
                format!("{}-dirty", hash)
            } else {
                hash
            }
        }
        None => "unknown".to_string(),
    };

    let build_timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=GIT_HASH={}", git_hash);
    println!("cargo:rustc-env=BUILD_TIMESTAMP={}", build_timestamp);
    println!("cargo:rustc-env=BUILD_PROFILE={}", profile);
}
