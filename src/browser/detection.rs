//! Chrome/Chromium binary detection
//!
//! Resolution order: explicit `--chrome-path`, the `CHROME_PATH`
//! environment variable, platform install locations, then `which` over
//! the usual command names. Every candidate gets `~` expansion and an
//! existence check before it wins.

use std::path::{Path, PathBuf};
use std::process::Command;

use tracing::{debug, warn};

use crate::error::{Result, ScrapeError};

/// Command names probed through `which` on Unix-like systems
const BROWSER_COMMANDS: [&str; 5] = [
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// Information about a detected Chrome installation
#[derive(Debug, Clone)]
pub struct ChromeInfo {
    /// Path to the Chrome binary
    pub path: PathBuf,
    /// Chrome version string (e.g., "122.0.6261.94")
    pub version: Option<String>,
    /// Detection method used
    pub detection_method: DetectionMethod,
}

/// How Chrome was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// User provided via CLI --chrome-path
    ManualPath,
    /// Found via CHROME_PATH environment variable
    EnvironmentVariable,
    /// Found in a platform install location
    StandardPath,
    /// Found via `which` command
    WhichCommand,
}

/// Per-platform install locations, most common first
fn platform_paths() -> &'static [&'static str] {
    if cfg!(target_os = "macos") {
        &[
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Google Chrome Canary.app/Contents/MacOS/Google Chrome Canary",
            "~/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "~/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/opt/homebrew/bin/chromium",
            "/usr/local/bin/chromium",
        ]
    } else if cfg!(target_os = "linux") {
        &[
            "/usr/bin/google-chrome",
            "/usr/bin/google-chrome-stable",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/snap/bin/chromium",
            "/opt/google/chrome/chrome",
            "/var/lib/flatpak/exports/bin/org.chromium.Chromium",
        ]
    } else if cfg!(target_os = "windows") {
        &[
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\Chromium\Application\chrome.exe",
        ]
    } else {
        &[]
    }
}

/// Expand a leading `~/` against the user's home directory.
fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(raw),
        },
        None => PathBuf::from(raw),
    }
}

/// Resolve a command name through `which`.
fn resolve_with_which(name: &str) -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        return None;
    }
    let output = Command::new("which").arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let resolved = String::from_utf8_lossy(&output.stdout);
    let resolved = resolved.trim();
    (!resolved.is_empty()).then(|| PathBuf::from(resolved))
}

/// Pick the version token out of `--version` output.
///
/// Output looks like "Google Chrome 122.0.6261.94" or
/// "Chromium 119.0.6045.105 snap"; the version is the first token with a
/// dotted numeric shape.
fn parse_version_token(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find(|token| {
            token.split('.').count() >= 3
                && token
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit())
        })
        .map(str::to_string)
}

fn probe_version(path: &Path) -> Option<String> {
    let output = Command::new(path).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    parse_version_token(&String::from_utf8_lossy(&output.stdout))
}

fn detected(path: PathBuf, detection_method: DetectionMethod) -> ChromeInfo {
    let version = probe_version(&path);
    debug!(
        "Chrome candidate accepted: {} ({:?}, version {:?})",
        path.display(),
        detection_method,
        version
    );
    ChromeInfo {
        path,
        version,
        detection_method,
    }
}

/// Find Chrome using all available methods.
///
/// A manual path is authoritative: if it does not point at a file the
/// search fails instead of falling through to auto-detection.
///
/// # Arguments
/// * `manual_path` - Optional path provided via CLI --chrome-path
///
/// # Returns
/// * `Ok(ChromeInfo)` with path and version if found
/// * `Err(ScrapeError::ChromeNotFound)` if not found
pub fn find_chrome(manual_path: Option<&str>) -> Result<ChromeInfo> {
    if let Some(raw) = manual_path {
        let path = expand_home(raw);
        if !path.is_file() {
            return Err(ScrapeError::BrowserLaunchFailed {
                reason: format!("Chrome binary not found at specified path: {}", raw),
            });
        }
        return Ok(detected(path, DetectionMethod::ManualPath));
    }

    if let Ok(raw) = std::env::var("CHROME_PATH") {
        let path = expand_home(&raw);
        if path.is_file() {
            return Ok(detected(path, DetectionMethod::EnvironmentVariable));
        }
        warn!("CHROME_PATH points to a missing file: {}", raw);
    }

    for raw in platform_paths() {
        let path = expand_home(raw);
        if path.is_file() {
            return Ok(detected(path, DetectionMethod::StandardPath));
        }
    }

    for name in BROWSER_COMMANDS {
        if let Some(path) = resolve_with_which(name) {
            return Ok(detected(path, DetectionMethod::WhichCommand));
        }
    }

    Err(ScrapeError::ChromeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_path_must_point_at_a_file() {
        let err = find_chrome(Some("/nonexistent/path/to/chrome")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/path/to/chrome"));
    }

    #[test]
    fn test_expand_home_leaves_absolute_paths_alone() {
        assert_eq!(
            expand_home("/usr/bin/chromium"),
            PathBuf::from("/usr/bin/chromium")
        );
        assert_eq!(
            expand_home(r"C:\Program Files\chrome.exe"),
            PathBuf::from(r"C:\Program Files\chrome.exe")
        );
    }

    #[test]
    fn test_expand_home_resolves_tilde() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/bin/chrome"), home.join("bin/chrome"));
        }
    }

    #[test]
    fn test_parse_version_token() {
        assert_eq!(
            parse_version_token("Google Chrome 122.0.6261.94"),
            Some("122.0.6261.94".to_string())
        );
        assert_eq!(
            parse_version_token("Chromium 119.0.6045.105 snap"),
            Some("119.0.6045.105".to_string())
        );
        assert_eq!(parse_version_token("no version here"), None);
        assert_eq!(parse_version_token(""), None);
    }

    #[test]
    fn test_platform_paths_are_absolute_or_home_relative() {
        for raw in platform_paths() {
            assert!(
                raw.starts_with('/') || raw.starts_with("~/") || raw.contains(":\\"),
                "unexpected path shape: {}",
                raw
            );
        }
    }
}
