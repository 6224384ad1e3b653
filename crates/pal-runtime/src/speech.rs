//! Speech output: backends and the single-slot [`SpeechGate`].
//!
//! Two backends reach the robot's speaker:
//!
//! * [`GatewayTts`] asks the gateway's `tts` tool for an audio file
//!   (`MEDIA: <path>` in the reply), copies it to the robot with `scp`, and
//!   plays it through `pal_speak.sh --file`.
//! * [`LocalScript`] runs `pal_speak.sh '<text>'` on the robot over `ssh`
//!   and lets the robot synthesise locally.
//!
//! [`SpeechGate`] rate-limits and deduplicates requests and allows at most one
//! synthesis in flight. A request that arrives while one is running is
//! dropped, never queued.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pal_memory::{GatewayError, ToolGateway};
use serde_json::json;
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Gateway `tts` tool timeout.
pub const TTS_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for `ssh` playback commands.
pub const PLAY_TIMEOUT: Duration = Duration::from_secs(30);
/// Timeout for copying audio to the robot.
pub const COPY_TIMEOUT: Duration = Duration::from_secs(15);
/// Default minimum spacing between utterances.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

const REMOTE_AUDIO_PATH: &str = "/tmp/pal_cognitive_tts.mp3";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SpeechError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("TTS reply carried no MEDIA path")]
    NoMedia,
    #[error("{program} failed: {details}")]
    Command { program: String, details: String },
    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },
}

// ─────────────────────────────────────────────────────────────────────────────
// Backends
// ─────────────────────────────────────────────────────────────────────────────

/// Something that can say a line out loud.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    async fn speak(&self, text: &str) -> Result<(), SpeechError>;

    fn name(&self) -> &'static str;
}

/// SSH destination of the robot that owns the speaker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RobotHost {
    pub user: String,
    pub host: String,
}

impl RobotHost {
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            host: host.into(),
        }
    }

    /// `user@host`.
    pub fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }
}

/// Quote `text` for a single-quoted POSIX shell word.
pub fn shell_quote(text: &str) -> String {
    format!("'{}'", text.replace('\'', r"'\''"))
}

/// Extract the path after `MEDIA:` from a TTS reply.
pub fn media_path(reply: &str) -> Option<&str> {
    let (_, rest) = reply.split_once("MEDIA:")?;
    let path = rest.trim();
    (!path.is_empty()).then_some(path)
}

async fn run_command(program: &str, args: &[String], timeout: Duration) -> Result<(), SpeechError> {
    debug!(program, ?args, "running speech command");
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output();
    match tokio::time::timeout(timeout, output).await {
        Err(_) => Err(SpeechError::Timeout {
            program: program.to_string(),
            timeout,
        }),
        Ok(Err(e)) => Err(SpeechError::Command {
            program: program.to_string(),
            details: e.to_string(),
        }),
        Ok(Ok(out)) if !out.status.success() => Err(SpeechError::Command {
            program: program.to_string(),
            details: String::from_utf8_lossy(&out.stderr).trim().to_string(),
        }),
        Ok(Ok(_)) => Ok(()),
    }
}

fn ssh_args(robot: &RobotHost, remote_command: String) -> Vec<String> {
    vec![
        "-o".to_string(),
        "StrictHostKeyChecking=no".to_string(),
        robot.target(),
        remote_command,
    ]
}

/// Copies an audio file to the robot and plays it there.
#[derive(Debug, Clone)]
pub struct RemotePlayer {
    robot: RobotHost,
}

impl RemotePlayer {
    pub fn new(robot: RobotHost) -> Self {
        Self { robot }
    }

    pub async fn play(&self, local_path: &str) -> Result<(), SpeechError> {
        let copy = vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            local_path.to_string(),
            format!("{}:{REMOTE_AUDIO_PATH}", self.robot.target()),
        ];
        run_command("scp", &copy, COPY_TIMEOUT).await?;

        let play = format!("bash ~/pal_speak.sh --file {}", shell_quote(REMOTE_AUDIO_PATH));
        run_command("ssh", &ssh_args(&self.robot, play), PLAY_TIMEOUT).await
    }
}

/// Gateway TTS followed by playback on the robot.
#[derive(Debug, Clone)]
pub struct GatewayTts {
    gateway: ToolGateway,
    player: RemotePlayer,
}

impl GatewayTts {
    pub fn new(gateway: ToolGateway, player: RemotePlayer) -> Self {
        Self { gateway, player }
    }

    /// Ask the gateway for audio and return the reported media path.
    pub async fn synthesize(&self, text: &str) -> Result<String, SpeechError> {
        let texts = self
            .gateway
            .invoke("tts", json!({ "text": text }), TTS_TIMEOUT)
            .await?;
        texts
            .first()
            .and_then(|t| media_path(t))
            .map(str::to_string)
            .ok_or(SpeechError::NoMedia)
    }
}

#[async_trait]
impl SpeechBackend for GatewayTts {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        let path = self.synthesize(text).await?;
        self.player.play(&path).await
    }

    fn name(&self) -> &'static str {
        "gateway"
    }
}

/// Synthesis by the robot's own `pal_speak.sh`.
#[derive(Debug, Clone)]
pub struct LocalScript {
    robot: RobotHost,
}

impl LocalScript {
    pub fn new(robot: RobotHost) -> Self {
        Self { robot }
    }

    pub fn remote_command(text: &str) -> String {
        format!("bash ~/pal_speak.sh {}", shell_quote(text))
    }
}

#[async_trait]
impl SpeechBackend for LocalScript {
    async fn speak(&self, text: &str) -> Result<(), SpeechError> {
        run_command("ssh", &ssh_args(&self.robot, Self::remote_command(text)), PLAY_TIMEOUT).await
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Gate
// ─────────────────────────────────────────────────────────────────────────────

/// What the gate did with a speak request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakOutcome {
    Disabled,
    Empty,
    CoolingDown,
    Duplicate,
    /// Accepted by the throttle, but a synthesis was already in flight.
    Busy,
    Started,
}

/// Throttle, dedupe and single-slot guard in front of a [`SpeechBackend`].
pub struct SpeechGate {
    backend: Arc<dyn SpeechBackend>,
    enabled: bool,
    cooldown: Duration,
    last_text: Option<String>,
    last_started: Option<Instant>,
    in_flight: Arc<Mutex<()>>,
    task: Option<JoinHandle<()>>,
}

impl SpeechGate {
    pub fn new(backend: Arc<dyn SpeechBackend>, enabled: bool, cooldown: Duration) -> Self {
        Self {
            backend,
            enabled,
            cooldown,
            last_text: None,
            last_started: None,
            in_flight: Arc::new(Mutex::new(())),
            task: None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// When the last accepted utterance was handed to synthesis.
    pub fn last_started(&self) -> Option<Instant> {
        self.last_started
    }

    pub fn speak(&mut self, text: &str) -> SpeakOutcome {
        self.speak_at(text, Instant::now())
    }

    /// Apply the throttle at `now` and, if it passes, start synthesis in a
    /// background task. Must be called from within a Tokio runtime.
    pub fn speak_at(&mut self, text: &str, now: Instant) -> SpeakOutcome {
        if !self.enabled {
            return SpeakOutcome::Disabled;
        }
        if text.is_empty() {
            return SpeakOutcome::Empty;
        }
        if self
            .last_started
            .is_some_and(|t| now.saturating_duration_since(t) < self.cooldown)
        {
            return SpeakOutcome::CoolingDown;
        }
        if self.last_text.as_deref() == Some(text) {
            return SpeakOutcome::Duplicate;
        }

        self.last_text = Some(text.to_string());
        self.last_started = Some(now);

        let Ok(guard) = Arc::clone(&self.in_flight).try_lock_owned() else {
            debug!("speech already in flight, dropping utterance");
            return SpeakOutcome::Busy;
        };

        let backend = Arc::clone(&self.backend);
        let text = text.to_string();
        info!(backend = backend.name(), text = %text, "speaking");
        self.task = Some(tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = backend.speak(&text).await {
                warn!(error = %e, "speech failed");
            }
        }));
        SpeakOutcome::Started
    }

    /// `true` while a synthesis task holds the slot.
    pub fn is_busy(&self) -> bool {
        self.in_flight.try_lock().is_err()
    }

    /// Let go of the in-flight synthesis task without cancelling it.
    ///
    /// The task keeps its slot until the backend returns; process exit may
    /// still cut it short.
    pub fn detach(&mut self) {
        if let Some(task) = self.task.take()
            && !task.is_finished()
        {
            debug!("leaving in-flight speech to finish on its own");
        }
    }
}
