//! Embeds the git revision so `almanac --version` can tell release builds
//! (`0.3.0`) from development builds (`dev@1a2b3c4`).

use std::process::Command;

/// Trimmed stdout of a successful git invocation.
fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    output
        .status
        .success()
        .then(|| String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");

    let hash = git(&["rev-parse", "--short", "HEAD"]).unwrap_or_default();
    let on_tag = git(&["describe", "--exact-match", "--tags", "HEAD"]).is_some();

    println!("cargo:rustc-env=ALMANAC_GIT_HASH={hash}");
    println!("cargo:rustc-env=ALMANAC_ON_RELEASE_TAG={on_tag}");
}
