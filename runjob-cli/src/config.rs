//! Configuration module
//!
//! Resolves the kubeconfig path given on the command line or through
//! `KUBECONFIG`.

use std::path::PathBuf;

/// Default kubeconfig location, expanded at runtime
pub const DEFAULT_KUBECONFIG: &str = "$HOME/.kube/config";

/// Turns a kubeconfig argument into a path
///
/// `KUBECONFIG` may hold a list of files; only the first one is used.
/// `$HOME`, `${HOME}` and a leading `~` are expanded. Without a home
/// directory the path is returned as given.
///
/// # Arguments
/// * `raw` - Path as given on the command line or in the environment
/// * `home` - Home directory, if known
pub fn resolve_kubeconfig(raw: &str, home: Option<&str>) -> PathBuf {
    let first = std::env::split_paths(raw)
        .next()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let raw = if first.is_empty() { DEFAULT_KUBECONFIG } else { first.as_str() };

    let Some(home) = home else {
        return PathBuf::from(raw);
    };

    let expanded = raw.replace("${HOME}", home).replace("$HOME", home);
    if expanded == "~" {
        return PathBuf::from(home);
    }
    match expanded.strip_prefix("~/") {
        Some(rest) => PathBuf::from(home).join(rest),
        None => PathBuf::from(expanded),
    }
}

/// Home directory of the current user, from the platform's user database
/// when `HOME` is unset
pub fn home_dir() -> Option<String> {
    dirs::home_dir()
        .map(|p| p.to_string_lossy().into_owned())
        .filter(|h| !h.is_empty())
}
