use std::env;
use std::path::PathBuf;

pub const DEFAULT_CONFIG_FILE: &str = "projects.yaml";
pub const DEFAULT_FORMULA_DIR: &str = "Formula";
pub const TOKEN_VAR: &str = "GITHUB_TOKEN";

/// Per-user cache root for the generator (checksum cache lives here).
pub fn default_cache_dir() -> PathBuf {
    let base = match env::consts::OS {
        "windows" => env::var_os("LOCALAPPDATA").map(PathBuf::from),
        "macos" => env::var_os("HOME")
            .map(PathBuf::from)
            .map(|home| home.join("Library").join("Caches")),
        _ => env::var_os("XDG_CACHE_HOME")
            .map(PathBuf::from)
            .or_else(|| env::var_os("HOME").map(|home| PathBuf::from(home).join(".cache"))),
    }
    .unwrap_or_else(|| PathBuf::from("."));

    base.join("tapgen")
}

/// API token from the environment, if set and non-empty.
pub fn github_token() -> Option<String> {
    env::var(TOKEN_VAR)
        .ok()
        .map(|token| token.trim().to_owned())
        .filter(|token| !token.is_empty())
}
