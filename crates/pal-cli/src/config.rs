//! Configuration Vault – reads/writes `~/.pal/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// How the monologue reaches the robot's speaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SpeechMethod {
    /// Synthesise through the gateway's `tts` tool, then play on the robot.
    #[default]
    Gateway,
    /// Run `pal_speak.sh` on the robot and let it synthesise.
    Local,
}

impl std::fmt::Display for SpeechMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpeechMethod::Gateway => write!(f, "gateway"),
            SpeechMethod::Local => write!(f, "local"),
        }
    }
}

/// Persisted settings stored in `~/.pal/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Seconds between cognition cycles.
    #[serde(default = "default_interval")]
    pub interval_secs: f64,

    /// WebSocket URL of the pub/sub broker. Empty keeps all traffic on the
    /// in-process bus.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub transport_endpoint: String,

    /// Base URL of the agent gateway (memory search and TTS).
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,

    /// Bearer token for the gateway.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub gateway_token: String,

    #[serde(default = "default_session_key")]
    pub session_key: String,

    /// Directory holding `MEMORY.md` and `memory/*.md` for offline recall.
    #[serde(default = "default_memory_workspace")]
    pub memory_workspace: String,

    #[serde(default = "default_true")]
    pub speech_enabled: bool,

    #[serde(default)]
    pub speech_method: SpeechMethod,

    /// Minimum seconds between two utterances.
    #[serde(default = "default_speech_cooldown")]
    pub speech_cooldown_secs: u64,

    /// Host that owns the speaker.
    #[serde(default = "default_robot_host")]
    pub robot_host: String,

    #[serde(default = "default_robot_user")]
    pub robot_user: String,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("interval_secs", &self.interval_secs)
            .field("transport_endpoint", &self.transport_endpoint)
            .field("gateway_url", &self.gateway_url)
            .field(
                "gateway_token",
                if self.gateway_token.is_empty() { &"<not set>" } else { &"<redacted>" },
            )
            .field("session_key", &self.session_key)
            .field("memory_workspace", &self.memory_workspace)
            .field("speech_enabled", &self.speech_enabled)
            .field("speech_method", &self.speech_method)
            .field("speech_cooldown_secs", &self.speech_cooldown_secs)
            .field("robot_host", &self.robot_host)
            .field("robot_user", &self.robot_user)
            .finish()
    }
}

fn default_interval() -> f64 {
    2.0
}
fn default_gateway_url() -> String {
    "http://127.0.0.1:18789".to_string()
}
fn default_session_key() -> String {
    "main".to_string()
}
fn default_memory_workspace() -> String {
    PathBuf::from(home_dir())
        .join(".openclaw")
        .join("workspace")
        .to_string_lossy()
        .into_owned()
}
fn default_true() -> bool {
    true
}
fn default_speech_cooldown() -> u64 {
    30
}
fn default_robot_host() -> String {
    "192.168.3.5".to_string()
}
fn default_robot_user() -> String {
    "pal".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            transport_endpoint: String::new(),
            gateway_url: default_gateway_url(),
            gateway_token: String::new(),
            session_key: default_session_key(),
            memory_workspace: default_memory_workspace(),
            speech_enabled: true,
            speech_method: SpeechMethod::default(),
            speech_cooldown_secs: default_speech_cooldown(),
            robot_host: default_robot_host(),
            robot_user: default_robot_user(),
        }
    }
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

/// Return the path to `~/.pal/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pal").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `PAL_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `PAL_GATEWAY_URL` | `gateway_url` |
/// | `PAL_GATEWAY_TOKEN` | `gateway_token` |
/// | `PAL_SESSION_KEY` | `session_key` |
/// | `PAL_ENDPOINT` | `transport_endpoint` |
/// | `PAL_MEMORY_WORKSPACE` | `memory_workspace` |
/// | `PAL_TTS_METHOD` | `speech_method` (`gateway` or `local`) |
/// | `PAL_ROBOT_HOST` | `robot_host` |
/// | `PAL_ROBOT_USER` | `robot_user` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PAL_GATEWAY_URL") {
        cfg.gateway_url = v;
    }
    if let Ok(v) = std::env::var("PAL_GATEWAY_TOKEN") {
        cfg.gateway_token = v;
    }
    if let Ok(v) = std::env::var("PAL_SESSION_KEY") {
        cfg.session_key = v;
    }
    if let Ok(v) = std::env::var("PAL_ENDPOINT") {
        cfg.transport_endpoint = v;
    }
    if let Ok(v) = std::env::var("PAL_MEMORY_WORKSPACE") {
        cfg.memory_workspace = v;
    }
    if let Ok(v) = std::env::var("PAL_TTS_METHOD")
        && let Ok(method) = <SpeechMethod as clap::ValueEnum>::from_str(&v, true) {
            cfg.speech_method = method;
        }
    if let Ok(v) = std::env::var("PAL_ROBOT_HOST") {
        cfg.robot_host = v;
    }
    if let Ok(v) = std::env::var("PAL_ROBOT_USER") {
        cfg.robot_user = v;
    }
}

/// Save the config to disk, creating `~/.pal/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // The token lives here, so the file is rw------- on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_gateway_token() {
        let cfg = Config {
            gateway_token: "gw-super-secret".to_string(),
            ..Config::default()
        };
        let debug_str = format!("{:?}", cfg);
        assert!(!debug_str.contains("gw-super-secret"));
        assert!(debug_str.contains("<redacted>"));
        assert!(format!("{:?}", Config::default()).contains("<not set>"));
    }

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600);
        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700);
    }

    #[test]
    fn roundtrip_keeps_speech_settings() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let cfg = Config {
            speech_method: SpeechMethod::Local,
            speech_cooldown_secs: 45,
            transport_endpoint: "ws://192.168.3.5:9090".to_string(),
            ..Config::default()
        };

        save_to(&cfg, &path).expect("save");
        let raw = std::fs::read_to_string(&path).expect("read back");
        assert!(raw.contains("speech_method = \"local\""));

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.speech_method, SpeechMethod::Local);
        assert_eq!(loaded.speech_cooldown_secs, 45);
        assert_eq!(loaded.transport_endpoint, "ws://192.168.3.5:9090");
        assert_eq!(loaded.session_key, "main");
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "interval_secs = 5.0\nspeech_enabled = false\n").unwrap();

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.interval_secs, 5.0);
        assert!(!loaded.speech_enabled);
        assert_eq!(loaded.session_key, "main");
        assert_eq!(loaded.speech_cooldown_secs, 30);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "interval_secs = \"soon\"\n").unwrap();
        assert!(load_from(&path).is_err());
    }

    #[test]
    fn config_path_points_to_pal_dir() {
        let p = config_path_for_home("/home/pal");
        assert_eq!(p, PathBuf::from("/home/pal/.pal/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn env_overrides_gateway_and_speech_method() {
        // SAFETY: these variables are only touched by this test.
        unsafe {
            std::env::set_var("PAL_GATEWAY_URL", "http://gateway:18789");
            std::env::set_var("PAL_TTS_METHOD", "LOCAL");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.gateway_url, "http://gateway:18789");
        assert_eq!(cfg.speech_method, SpeechMethod::Local);
        unsafe {
            std::env::remove_var("PAL_GATEWAY_URL");
            std::env::remove_var("PAL_TTS_METHOD");
        }
    }

    #[test]
    fn env_override_sets_robot_user() {
        // SAFETY: this variable is only touched by this test.
        unsafe { std::env::set_var("PAL_ROBOT_USER", "jetson") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.robot_user, "jetson");
        unsafe { std::env::remove_var("PAL_ROBOT_USER") };
    }
}
