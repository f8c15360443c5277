//! Scheduler configuration.
//!
//! Loaded from `~/.stackvisor/config.toml` when present. Every field has a
//! default, so a missing file (or a partial one) is never an error.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, StackError};

const DEFAULT_CONFIG_RELATIVE_PATH: &str = ".stackvisor/config.toml";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct TimeoutConfig {
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    #[serde(default = "default_stop_ms")]
    pub stop_ms: u64,
    #[serde(default = "default_destroy_ms")]
    pub destroy_ms: u64,
    #[serde(default = "default_translucent_conversion_ms")]
    pub translucent_conversion_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            pause_ms: default_pause_ms(),
            stop_ms: default_stop_ms(),
            destroy_ms: default_destroy_ms(),
            translucent_conversion_ms: default_translucent_conversion_ms(),
        }
    }
}

impl TimeoutConfig {
    pub fn pause(&self) -> Duration {
        Duration::from_millis(self.pause_ms)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_millis(self.stop_ms)
    }

    pub fn destroy(&self) -> Duration {
        Duration::from_millis(self.destroy_ms)
    }

    pub fn translucent_conversion(&self) -> Duration {
        Duration::from_millis(self.translucent_conversion_ms)
    }
}

/// Policy applied to activities whose process died.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProcessDeathConfig {
    /// Invisible activities launched more often than this inside the window
    /// are considered crash-looping and dropped instead of preserved.
    #[serde(default = "default_crash_loop_launch_count")]
    pub crash_loop_launch_count: u32,
    #[serde(default = "default_crash_loop_window_ms")]
    pub crash_loop_window_ms: u64,
}

impl Default for ProcessDeathConfig {
    fn default() -> Self {
        Self {
            crash_loop_launch_count: default_crash_loop_launch_count(),
            crash_loop_window_ms: default_crash_loop_window_ms(),
        }
    }
}

impl ProcessDeathConfig {
    pub fn crash_loop_window(&self) -> Duration {
        Duration::from_millis(self.crash_loop_window_ms)
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DisplayConfig {
    /// Displays that may show activities over an insecure keyguard.
    #[serde(default)]
    pub can_show_with_insecure_keyguard: bool,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub process_death: ProcessDeathConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

fn default_pause_ms() -> u64 {
    500
}

fn default_stop_ms() -> u64 {
    11_000
}

fn default_destroy_ms() -> u64 {
    10_000
}

fn default_translucent_conversion_ms() -> u64 {
    2_000
}

fn default_crash_loop_launch_count() -> u32 {
    3
}

fn default_crash_loop_window_ms() -> u64 {
    60_000
}

/// Returns `~/.stackvisor/config.toml`.
pub fn default_config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(StackError::HomeDirNotFound)?;
    Ok(home.join(DEFAULT_CONFIG_RELATIVE_PATH))
}

/// Loads the scheduler configuration, returning defaults if the file doesn't exist.
pub fn load_config(path: Option<PathBuf>) -> Result<SchedulerConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(SchedulerConfig::default());
    }

    let content =
        fs_err::read_to_string(&config_path).map_err(|source| StackError::ConfigRead {
            path: config_path.clone(),
            source,
        })?;
    toml::from_str::<SchedulerConfig>(&content).map_err(|err| StackError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_defaults_when_file_missing() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("missing.toml");
        let config = load_config(Some(path)).expect("load config");
        assert_eq!(config, SchedulerConfig::default());
        assert_eq!(config.timeouts.pause(), Duration::from_millis(500));
    }

    #[test]
    fn load_config_parses_partial_tables() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(
            &path,
            r#"
[timeouts]
pause_ms = 250

[process_death]
crash_loop_launch_count = 5

[display]
can_show_with_insecure_keyguard = true
"#,
        )
        .expect("write config");

        let config = load_config(Some(path)).expect("load config");
        assert_eq!(config.timeouts.pause_ms, 250);
        assert_eq!(config.timeouts.stop_ms, 11_000);
        assert_eq!(config.process_death.crash_loop_launch_count, 5);
        assert_eq!(config.process_death.crash_loop_window_ms, 60_000);
        assert!(config.display.can_show_with_insecure_keyguard);
    }

    #[test]
    fn load_config_reports_malformed_file() {
        let temp_dir = tempfile::tempdir().expect("temp dir");
        let path = temp_dir.path().join("config.toml");
        fs_err::write(&path, "[timeouts]\npause_ms = \"soon\"\n").expect("write config");

        let err = load_config(Some(path)).unwrap_err();
        assert!(matches!(err, StackError::ConfigMalformed { .. }));
    }
}
