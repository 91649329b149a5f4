//! Configuration vault – reads/writes `~/.facereach/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use facereach_motion::{FacadeConfig, PlannerConfig};
use facereach_perception::{LocalizerConfig, LockConfig};
use facereach_runtime::{LogFormat, PipelineConfig, ReachConfig};
use facereach_types::{ArmSide, ReachError};
use serde::{Deserialize, Serialize};

/// Persisted settings.  Every field has a default, so a partial file loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_format: LogFormat,
    /// Arm that reaches for detected foreheads.
    pub reach_side: ArmSide,
    /// Height of the commanded end-effector position relative to the
    /// forehead, metres.
    pub approach_z_offset_m: f64,
    /// Reject depth samples older than this at color-frame time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_depth_skew_ms: Option<u64>,
    pub lock: LockConfig,
    pub localizer: LocalizerConfig,
    pub planner: PlannerConfig,
    pub facade: FacadeConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Compact,
            reach_side: ArmSide::Left,
            approach_z_offset_m: -0.1,
            max_depth_skew_ms: None,
            lock: LockConfig::default(),
            localizer: LocalizerConfig::default(),
            planner: PlannerConfig::default(),
            facade: FacadeConfig::default(),
        }
    }
}

impl Config {
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            lock: self.lock,
            localizer: self.localizer.clone(),
            max_depth_skew_ms: self.max_depth_skew_ms,
        }
    }

    pub fn reach_config(&self) -> ReachConfig {
        ReachConfig {
            side: self.reach_side,
            approach_z_offset_m: self.approach_z_offset_m,
            ..ReachConfig::default()
        }
    }
}

/// Return the path to `~/.facereach/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".facereach").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ReachError> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ReachError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| ReachError::Config(format!("failed to read {}: {e}", path.display())))?;
    let mut cfg: Config =
        toml::from_str(&raw).map_err(|e| ReachError::Config(format!("failed to parse {}: {e}", path.display())))?;
    apply_env_overrides(&mut cfg);
    Ok(Some(cfg))
}

/// Apply `FACEREACH_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `FACEREACH_LOG_FORMAT` | `log_format` |
/// | `FACEREACH_REACH_SIDE` | `reach_side` |
/// | `FACEREACH_MAX_RANGE_M` | `localizer.max_range_m` |
/// | `FACEREACH_SCENE_TIMEOUT_MS` | `facade.scene_timeout_ms` |
///
/// Unparseable values are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("FACEREACH_LOG_FORMAT")
        && let Ok(format) = v.parse::<LogFormat>()
    {
        cfg.log_format = format;
    }
    if let Ok(v) = std::env::var("FACEREACH_REACH_SIDE")
        && let Ok(side) = v.parse::<ArmSide>()
    {
        cfg.reach_side = side;
    }
    if let Ok(v) = std::env::var("FACEREACH_MAX_RANGE_M")
        && let Ok(range) = v.parse::<f64>()
        && range.is_finite()
        && range > 0.0
    {
        cfg.localizer.max_range_m = range;
    }
    if let Ok(v) = std::env::var("FACEREACH_SCENE_TIMEOUT_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.facade.scene_timeout_ms = ms;
    }
}

/// Save the config to disk, creating `~/.facereach/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ReachError> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ReachError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ReachError::Config(format!("failed to create config directory: {e}")))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| ReachError::Config(format!("failed to set config directory permissions: {e}")))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| ReachError::Config(format!("failed to serialize config: {e}")))?;
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
            .map_err(|e| ReachError::Config(format!("failed to write {}: {e}", path.display())))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw).map_err(|e| ReachError::Config(format!("failed to write {}: {e}", path.display())))?;
    Ok(())
}
