//! External-process player for service sources.
//!
//! Hands the resolved Spotify URI to the desktop application through an OS-specific command.
//! The engine cannot observe when the music ends: a normal return only means the command
//! completed.

use std::fmt;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::{PlaybackError, Result};
use crate::events::{EventSink, PlaybackEvent};
use crate::player::{Player, StopFlag};
use crate::source::{MusicSource, SourceKind};

/// Operating system families with a known launch command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    MacOs,
    Linux,
}

impl OsFamily {
    /// Classify an OS name (`std::env::consts::OS` or similar).
    pub fn detect(os_name: &str) -> Option<Self> {
        let os = os_name.to_ascii_lowercase();
        // "darwin" contains "win".
        if os.contains("mac") || os.contains("darwin") {
            Some(OsFamily::MacOs)
        } else if os.contains("win") {
            Some(OsFamily::Windows)
        } else if os.contains("nux") || os.contains("nix") {
            Some(OsFamily::Linux)
        } else {
            None
        }
    }

    pub fn current() -> Option<Self> {
        Self::detect(std::env::consts::OS)
    }
}

/// Program plus arguments, passed to the OS without a shell.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl LaunchCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// The command that asks the Spotify app on `family` to play `uri`.
    pub fn for_family(family: OsFamily, uri: &str) -> Self {
        match family {
            // `start` takes the first quoted argument as the window title. An empty argument
            // is passed to the OS as `""`.
            OsFamily::Windows => Self::new("cmd", ["/c", "start", "", uri]),
            OsFamily::MacOs => Self::new(
                "osascript",
                [
                    "-e".to_string(),
                    format!("tell application \"Spotify\" to play track \"{uri}\""),
                ],
            ),
            OsFamily::Linux => Self::new(
                "dbus-send",
                [
                    "--print-reply".to_string(),
                    "--dest=org.mpris.MediaPlayer2.spotify".to_string(),
                    "/org/mpris/MediaPlayer2".to_string(),
                    "org.mpris.MediaPlayer2.Player.OpenUri".to_string(),
                    format!("string:{uri}"),
                ],
            ),
        }
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }
}

/// Command line as the OS sees it: empty arguments and arguments with whitespace are quoted.
impl fmt::Display for LaunchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            if arg.is_empty() || arg.contains([' ', '\t']) {
                write!(f, " \"{arg}\"")?;
            } else {
                write!(f, " {arg}")?;
            }
        }
        Ok(())
    }
}

/// Maps a launch target to the command to run; `None` means unsupported platform.
pub type CommandBuilder = Arc<dyn Fn(&str) -> Option<LaunchCommand> + Send + Sync>;

/// Plays service sources by spawning a launch command and tracking the child process.
///
/// `stop` kills the child immediately; killing an already exited process is harmless.
pub struct ProcessPlayer {
    build: CommandBuilder,
    events: Arc<dyn EventSink>,
    poll: Duration,
    child: Mutex<Option<Child>>,
    stop: StopFlag,
}

impl ProcessPlayer {
    /// Player for the OS this process runs on.
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self::for_family(OsFamily::current(), events)
    }

    pub fn for_family(family: Option<OsFamily>, events: Arc<dyn EventSink>) -> Self {
        Self::with_command_builder(
            Arc::new(move |uri: &str| family.map(|f| LaunchCommand::for_family(f, uri))),
            events,
        )
    }

    pub fn with_command_builder(build: CommandBuilder, events: Arc<dyn EventSink>) -> Self {
        Self {
            build,
            events,
            poll: Duration::from_millis(50),
            child: Mutex::new(None),
            stop: StopFlag::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll.max(Duration::from_millis(1));
        self
    }

    fn lock_child(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Poll the stored child until it exits. `Ok(None)` means `stop` took it.
    fn wait_for_exit(&self, command: &LaunchCommand) -> Result<Option<ExitStatus>> {
        loop {
            {
                let mut slot = self.lock_child();
                let Some(child) = slot.as_mut() else {
                    return Ok(None);
                };
                match child.try_wait() {
                    Ok(Some(status)) => {
                        slot.take();
                        return Ok(Some(status));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        if let Some(child) = slot.take() {
                            terminate(child);
                        }
                        return Err(PlaybackError::Process {
                            command: command.to_string(),
                            source: e,
                        });
                    }
                }
            }
            thread::sleep(self.poll);
        }
    }
}

impl Player for ProcessPlayer {
    fn name(&self) -> &'static str {
        "process"
    }

    fn supports(&self, kind: SourceKind) -> bool {
        kind == SourceKind::Service
    }

    fn reports_completion(&self) -> bool {
        false
    }

    fn play(&self, source: &MusicSource, _volume_db: f32) -> Result<bool> {
        let guard = self.stop.arm();

        let uri = source
            .launch_target()
            .ok_or(PlaybackError::Configuration(source.kind()))?;
        let Some(command) = (self.build)(uri) else {
            tracing::warn!(
                os = std::env::consts::OS,
                "no launch command for this platform; skipping {source}"
            );
            return Ok(false);
        };
        if guard.is_requested() {
            return Ok(true);
        }

        let mut child = command
            .to_command()
            .spawn()
            .map_err(|e| PlaybackError::Process {
                command: command.to_string(),
                source: e,
            })?;
        tracing::debug!(pid = child.id(), command = %command, "launch command started");

        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        {
            let mut slot = self.lock_child();
            if guard.is_requested() {
                terminate(child);
            } else {
                *slot = Some(child);
            }
        }

        let status = self.wait_for_exit(&command)?;
        let stopped = guard.is_requested();
        if stopped {
            // Readers finish on their own once the pipes close.
            return Ok(true);
        }

        let stdout = stdout.map(join_reader).unwrap_or_default();
        let stderr = stderr.map(join_reader).unwrap_or_default();

        if let Some(status) = status.filter(|s| !s.success()) {
            self.events.emit(PlaybackEvent::CommandFailed {
                message: failure_message(uri, status.code().unwrap_or(-1), &stdout, &stderr),
            });
        }

        Ok(guard.is_requested())
    }

    fn stop(&self) {
        self.stop.request();
        let child = self.lock_child().take();
        if let Some(child) = child {
            terminate(child);
        }
    }
}

fn terminate(mut child: Child) {
    if let Err(e) = child.kill() {
        tracing::debug!(pid = child.id(), "kill failed: {e}");
    }
    if let Err(e) = child.wait() {
        tracing::debug!(pid = child.id(), "wait after kill failed: {e}");
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Err(e) = pipe.read_to_end(&mut buf) {
            tracing::debug!("pipe read failed: {e}");
        }
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: JoinHandle<String>) -> String {
    handle.join().unwrap_or_default()
}

fn failure_message(uri: &str, code: i32, stdout: &str, stderr: &str) -> String {
    let mut message = format!("Failed to play Spotify URI '{uri}'. Exit code: {code}.");
    if !stderr.trim().is_empty() {
        message.push_str(" Error: ");
        message.push_str(stderr.trim_end());
    }
    if !stdout.trim().is_empty() {
        message.push_str(" Output: ");
        message.push_str(stdout.trim_end());
    }
    message
}
