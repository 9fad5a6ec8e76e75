//! Checks for the Spotify desktop application.
//!
//! Service sources only work when the app is installed and running. These probes shell out
//! to the platform tools; any failure to run them counts as "no".

use std::process::{Command, Stdio};

use crate::player::{LaunchCommand, OsFamily};

/// Whether the Spotify app appears to be installed.
pub fn is_installed() -> bool {
    let family = OsFamily::current();
    run_probe(&install_probe(family)).is_some_and(|(ok, _)| ok)
}

/// Whether a Spotify process is running.
pub fn is_running() -> bool {
    let family = OsFamily::current();
    match run_probe(&running_probe(family)) {
        Some((ok, stdout)) => running_from_probe(family, ok, &stdout),
        None => false,
    }
}

fn install_probe(family: Option<OsFamily>) -> LaunchCommand {
    match family {
        Some(OsFamily::Windows) => LaunchCommand::new("where", ["spotify"]),
        Some(OsFamily::MacOs) => LaunchCommand::new("test", ["-d", "/Applications/Spotify.app"]),
        _ => LaunchCommand::new("which", ["spotify"]),
    }
}

fn running_probe(family: Option<OsFamily>) -> LaunchCommand {
    match family {
        Some(OsFamily::Windows) => {
            LaunchCommand::new("tasklist", ["/NH", "/FI", "IMAGENAME eq spotify.exe"])
        }
        Some(OsFamily::MacOs) => LaunchCommand::new(
            "osascript",
            [
                "-e",
                "tell application \"System Events\" to (name of processes) contains \"Spotify\"",
            ],
        ),
        _ => LaunchCommand::new("pgrep", ["-x", "-i", "spotify"]),
    }
}

/// Interpret a running probe. `tasklist` exits 0 even without a match, so Windows looks at
/// the output instead of the status.
fn running_from_probe(family: Option<OsFamily>, success: bool, stdout: &str) -> bool {
    match family {
        Some(OsFamily::Windows) => stdout.to_lowercase().contains("spotify.exe"),
        Some(OsFamily::MacOs) => success && stdout.trim().eq_ignore_ascii_case("true"),
        _ => success,
    }
}

/// Run `probe` to completion. Returns exit success and stdout, or `None` if it could not run.
fn run_probe(probe: &LaunchCommand) -> Option<(bool, String)> {
    let output = Command::new(&probe.program)
        .args(&probe.args)
        .stdin(Stdio::null())
        .output()
        .map_err(|e| tracing::debug!(probe = %probe, "probe failed to run: {e}"))
        .ok()?;
    Some((
        output.status.success(),
        String::from_utf8_lossy(&output.stdout).into_owned(),
    ))
}
