//! Cell configuration – reads/writes `~/.rivet/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use rivet_kernel::BusyPolicy;
use rivet_runtime::{ProfileSet, ScenarioKind};
use rivet_types::RivetError;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config at {path}: {source}")]
    Write { path: PathBuf, source: std::io::Error },
}

impl From<ConfigError> for RivetError {
    fn from(err: ConfigError) -> Self {
        RivetError::Config(err.to_string())
    }
}

/// Persisted cell configuration stored in `~/.rivet/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Directory holding `rivet.db`, the recording store.
    #[serde(default = "default_recordings_dir")]
    pub recordings_dir: PathBuf,

    /// What the actuator gate does with a motion that arrives while busy.
    #[serde(default)]
    pub busy_policy: BusyPolicy,

    /// Wall-clock time of one simulated motion segment.
    #[serde(default = "default_sim_step_ms")]
    pub sim_step_ms: u64,

    /// Optional TOML file overriding the built-in task profiles.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_file: Option<PathBuf>,

    /// Scenario `/run` uses when none is given.
    #[serde(default)]
    pub default_scenario: ScenarioKind,
}

fn home_dir() -> String {
    std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| ".".to_string())
}

fn default_recordings_dir() -> PathBuf {
    PathBuf::from(home_dir()).join(".rivet").join("recordings")
}
fn default_sim_step_ms() -> u64 {
    200
}

impl Default for Config {
    fn default() -> Self {
        Self {
            recordings_dir: default_recordings_dir(),
            busy_policy: BusyPolicy::default(),
            sim_step_ms: default_sim_step_ms(),
            profile_file: None,
            default_scenario: ScenarioKind::default(),
        }
    }
}

impl Config {
    /// The SQLite file recordings are written to.
    pub fn recordings_db(&self) -> PathBuf {
        self.recordings_dir.join("rivet.db")
    }

    /// Built-in task profiles, overridden by `profile_file` when set.
    pub fn profiles(&self) -> Result<ProfileSet, RivetError> {
        match &self.profile_file {
            Some(path) => ProfileSet::load_from(path),
            None => Ok(ProfileSet::builtin()),
        }
    }
}

/// Return the path to `~/.rivet/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(&home_dir())
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".rivet").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cfg: Config = toml::from_str(&raw)?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `RIVET_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `RIVET_RECORDINGS_DIR` | `recordings_dir` |
/// | `RIVET_BUSY_POLICY` | `busy_policy` (`queue` \| `reject`) |
/// | `RIVET_SIM_STEP_MS` | `sim_step_ms` |
/// | `RIVET_PROFILE_FILE` | `profile_file` |
/// | `RIVET_SCENARIO` | `default_scenario` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("RIVET_RECORDINGS_DIR") {
        cfg.recordings_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("RIVET_BUSY_POLICY")
        && let Ok(policy) = v.parse::<BusyPolicy>() {
            cfg.busy_policy = policy;
        }
    if let Ok(v) = std::env::var("RIVET_SIM_STEP_MS")
        && let Ok(ms) = v.parse::<u64>() {
            cfg.sim_step_ms = ms;
        }
    if let Ok(v) = std::env::var("RIVET_PROFILE_FILE") {
        cfg.profile_file = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("RIVET_SCENARIO")
        && let Ok(kind) = v.parse::<ScenarioKind>() {
            cfg.default_scenario = kind;
        }
}

/// Save the config to disk, creating `~/.rivet/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
        // Owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700)).map_err(write_err)?;
        }
    }
    let raw = toml::to_string_pretty(cfg)?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(write_err)?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(write_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_mode = std::fs::metadata(path.parent().unwrap())
            .expect("dir metadata")
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_custom_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config {
            recordings_dir: dir.path().join("recs"),
            busy_policy: BusyPolicy::Reject,
            sim_step_ms: 20,
            profile_file: Some(dir.path().join("profiles.toml")),
            default_scenario: ScenarioKind::PickAndPlace,
        };
        save_to(&cfg, &path).expect("save");

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("busy_policy = \"reject\""));
        assert!(raw.contains("default_scenario = \"pick-and-place\""));

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.busy_policy, BusyPolicy::Reject);
        assert_eq!(loaded.sim_step_ms, 20);
        assert_eq!(loaded.default_scenario, ScenarioKind::PickAndPlace);
        assert_eq!(loaded.recordings_db(), dir.path().join("recs").join("rivet.db"));
    }

    #[test]
    fn missing_fields_take_defaults() {
        let loaded: Config = toml::from_str("sim_step_ms = 5\n").unwrap();
        assert_eq!(loaded.sim_step_ms, 5);
        assert_eq!(loaded.busy_policy, BusyPolicy::Queue);
        assert_eq!(loaded.default_scenario, ScenarioKind::Compliance);
        assert!(loaded.profile_file.is_none());
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "busy_policy = \"sometimes\"\n").unwrap();

        let err = load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(matches!(RivetError::from(err), RivetError::Config(_)));
    }

    #[test]
    fn config_path_points_to_rivet_dir() {
        let p = config_path_for_home("/home/testuser");
        assert_eq!(p, PathBuf::from("/home/testuser/.rivet/config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn profile_file_overrides_builtin_profiles() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let file = dir.path().join("profiles.toml");
        let mut doc = ProfileSet::builtin().to_toml().unwrap();
        doc = doc.replace("name = \"bubblePop\"", "name = \"bubblePop2\"");
        std::fs::write(&file, doc).unwrap();

        let cfg = Config {
            profile_file: Some(file),
            ..Config::default()
        };
        let set = cfg.profiles().unwrap();
        assert_eq!(set.get(ScenarioKind::Listener).recording.name, "bubblePop2");
    }

    #[test]
    fn missing_profile_file_is_reported() {
        let cfg = Config {
            profile_file: Some(PathBuf::from("/definitely/not/here.toml")),
            ..Config::default()
        };
        assert!(matches!(cfg.profiles(), Err(RivetError::Config(_))));
    }

    // Each env test owns a distinct variable so parallel tests don't race.

    #[test]
    fn apply_env_overrides_changes_busy_policy() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("RIVET_BUSY_POLICY", "reject") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.busy_policy, BusyPolicy::Reject);
        unsafe { std::env::remove_var("RIVET_BUSY_POLICY") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_step_time() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("RIVET_SIM_STEP_MS", "fast") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.sim_step_ms, default_sim_step_ms());
        unsafe { std::env::remove_var("RIVET_SIM_STEP_MS") };
    }

    #[test]
    fn apply_env_overrides_changes_scenario() {
        // SAFETY: no other test touches this variable.
        unsafe { std::env::set_var("RIVET_SCENARIO", "pick_and_place") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.default_scenario, ScenarioKind::PickAndPlace);
        unsafe { std::env::remove_var("RIVET_SCENARIO") };
    }
}
