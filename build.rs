// Embed git hash for --version. Optional; no git = "unknown".
fn main() {
    println!("cargo:rerun-if-changed=.git/HEAD");
    let mut hash = String::from("unknown");
    if let Ok(output) = std::process::Command::new("git")
        .args(["rev-parse", "--short", "HEAD"])
        .output()
    {
        if output.status.success() {
            if let Ok(s) = String::from_utf8(output.stdout) {
                hash = s.trim().to_string();
                println!("cargo:rustc-env=LITHOS_GIT_HASH={hash}");
            }
        }
    }
    let version = std::env::var("CARGO_PKG_VERSION").unwrap_or_default();
    println!("cargo:rustc-env=LITHOS_LONG_VERSION={version} ({hash})");
}
