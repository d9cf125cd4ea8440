//! Embeds `GIT_HASH`, `BUILD_TIMESTAMP` and `BUILD_PROFILE` into the binary
//! so a load log can be traced back to the build that produced it.

use std::env;
use std::process::Command;

const UNKNOWN: &str = "unknown";

/// Eight-character commit hash, or `unknown` outside a git checkout
fn git_short_hash() -> String {
    let Ok(output) = Command::new("git").args(["rev-parse", "--short=8", "HEAD"]).output() else {
        return UNKNOWN.to_string();
    };
    if !output.status.success() {
        return UNKNOWN.to_string();
    }
    match String::from_utf8(output.stdout) {
        Ok(hash) if !hash.trim().is_empty() => hash.trim().to_string(),
        _ => UNKNOWN.to_string(),
    }
}

/// UTC build time, RFC 3339 with whole seconds
fn build_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true)
}

fn emit(name: &str, value: &str) {
    println!("cargo:rustc-env={}={}", name, value);
}

fn main() {
    emit("GIT_HASH", &git_short_hash());
    emit("BUILD_TIMESTAMP", &build_timestamp());
    emit(
        "BUILD_PROFILE",
        &env::var("PROFILE").unwrap_or_else(|_| UNKNOWN.to_string()),
    );

    // Cargo reruns a build script with no rerun-if directives on every
    // package change, which keeps the embedded hash current.
}
