//! Configuration types for download-engine

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Concurrency, retry budget and bandwidth limits
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum number of tasks transferring at once (default: 3)
    #[serde(default = "default_max_active_downloads")]
    pub max_active_downloads: usize,

    /// Automatic retries allowed per task before it fails for good (default: 5)
    #[serde(default = "default_max_download_retries")]
    pub max_download_retries: u32,

    /// Speed limit in bytes per second shared by all tasks (None = unlimited)
    #[serde(default)]
    pub speed_limit_bps: Option<u64>,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_active_downloads: default_max_active_downloads(),
            max_download_retries: default_max_download_retries(),
            speed_limit_bps: None,
        }
    }
}

/// Network conditions under which downloads are suspended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPolicy {
    /// Suspend all downloads while the connection is metered (default: false)
    #[serde(default)]
    pub unmetered_connections_only: bool,

    /// Suspend all downloads while roaming (default: true)
    #[serde(default = "default_true")]
    pub enable_roaming: bool,
}

impl Default for NetworkPolicy {
    fn default() -> Self {
        Self {
            unmetered_connections_only: false,
            enable_roaming: true,
        }
    }
}

impl NetworkPolicy {
    /// Whether any network condition needs to be watched
    pub fn is_active(&self) -> bool {
        self.unmetered_connections_only || self.enable_roaming
    }
}

/// Power conditions under which downloads are suspended
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerPolicy {
    /// Suspend downloads when the battery reports low (default: false)
    #[serde(default)]
    pub battery_control: bool,

    /// Use `custom_battery_control_value` instead of the system low-battery level
    #[serde(default)]
    pub custom_battery_control: bool,

    /// Battery percentage at or below which downloads are suspended (default: 20)
    #[serde(default = "default_custom_battery_value")]
    pub custom_battery_control_value: u8,

    /// Only download while charging (default: false)
    #[serde(default)]
    pub only_when_charging: bool,
}

impl Default for PowerPolicy {
    fn default() -> Self {
        Self {
            battery_control: false,
            custom_battery_control: false,
            custom_battery_control_value: default_custom_battery_value(),
            only_when_charging: false,
        }
    }
}

impl PowerPolicy {
    /// Whether any power condition needs to be watched
    pub fn is_active(&self) -> bool {
        self.battery_control || self.custom_battery_control || self.only_when_charging
    }
}

/// What happens to a finished download
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessConfig {
    /// Move finished files into `move_after_download_in` (default: false)
    #[serde(default)]
    pub move_after_download: bool,

    /// Target directory for moved files
    #[serde(default)]
    pub move_after_download_in: Option<PathBuf>,

    /// How to handle an existing file at the move destination (default: overwrite)
    #[serde(default)]
    pub file_collision: FileCollisionAction,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            move_after_download: false,
            move_after_download_in: None,
            file_collision: FileCollisionAction::default(),
        }
    }
}

impl PostProcessConfig {
    /// Resolved move target, if moving is enabled
    pub fn move_target(&self) -> Option<&Path> {
        if self.move_after_download {
            self.move_after_download_in.as_deref()
        } else {
            None
        }
    }
}

/// File collision handling strategy
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Append (1), (2), etc. to filename
    Rename,
    /// Overwrite existing file (default)
    #[default]
    Overwrite,
    /// Keep the existing file and fail the move with `MoveAlreadyExists`
    Fail,
}

/// Backoff applied between automatic retries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Initial delay before first retry (default: 1 second)
    #[serde(default = "default_initial_delay", with = "duration_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries (default: 60 seconds)
    #[serde(default = "default_max_delay", with = "duration_serde")]
    pub max_delay: Duration,

    /// Multiplier for exponential backoff (default: 2.0)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,

    /// Add random jitter to delays (default: true)
    #[serde(default = "default_true")]
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            max_delay: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
            jitter: true,
        }
    }
}

/// HTTP transport settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Connect timeout (default: 30 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Timeout for a single body read (default: 60 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Minimum number of bytes between two progress events (default: 256 KiB)
    #[serde(default = "default_progress_interval")]
    pub progress_interval_bytes: u64,

    /// How long shutdown waits for workers to exit (default: 30 seconds)
    #[serde(default = "default_shutdown_timeout", with = "duration_serde")]
    pub shutdown_timeout: Duration,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            user_agent: default_user_agent(),
            progress_interval_bytes: default_progress_interval(),
            shutdown_timeout: default_shutdown_timeout(),
        }
    }
}

/// Main configuration for [`DownloadEngine`](crate::DownloadEngine)
///
/// The flattened sections serialize as one flat object; `retry` and `transfer`
/// stay nested.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Concurrency, retry budget and bandwidth
    #[serde(flatten)]
    pub limits: LimitsConfig,

    /// Network suspension policy
    #[serde(flatten)]
    pub network: NetworkPolicy,

    /// Power suspension policy
    #[serde(flatten)]
    pub power: PowerPolicy,

    /// Post-download handling
    #[serde(flatten)]
    pub post_process: PostProcessConfig,

    /// Backoff between automatic retries
    #[serde(default)]
    pub retry: RetryConfig,

    /// HTTP transport settings
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.limits.max_active_downloads == 0 {
            return Err(Error::Config {
                message: "max_active_downloads must be at least 1".to_string(),
                key: Some("max_active_downloads".to_string()),
            });
        }
        if !(1..=100).contains(&self.power.custom_battery_control_value) {
            return Err(Error::Config {
                message: "custom_battery_control_value must be between 1 and 100".to_string(),
                key: Some("custom_battery_control_value".to_string()),
            });
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(Error::Config {
                message: "backoff_multiplier must be >= 1.0".to_string(),
                key: Some("retry.backoff_multiplier".to_string()),
            });
        }
        if self.post_process.move_after_download
            && self.post_process.move_after_download_in.is_none()
        {
            tracing::warn!(
                "move_after_download is enabled without a target directory, finished files stay in place"
            );
        }
        Ok(())
    }
}

/// Runtime-changeable settings
///
/// Only fields set to `Some` are applied. `speed_limit_bps` and
/// `move_after_download_in` use a nested option so they can be cleared.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsUpdate {
    /// New concurrency cap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_active_downloads: Option<usize>,
    /// New retry budget
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_download_retries: Option<u32>,
    /// New speed limit (Some(None) = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_limit_bps: Option<Option<u64>>,
    /// Toggle metered-network suspension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unmetered_connections_only: Option<bool>,
    /// Toggle roaming suspension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_roaming: Option<bool>,
    /// Toggle low-battery suspension
    #[serde(skip_serializing_if = "Option::is_none")]
    pub battery_control: Option<bool>,
    /// Toggle the custom battery threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_battery_control: Option<bool>,
    /// New custom battery threshold
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_battery_control_value: Option<u8>,
    /// Toggle charging-only mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub only_when_charging: Option<bool>,
    /// Toggle moving finished files
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_after_download: Option<bool>,
    /// New move target (Some(None) clears it)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub move_after_download_in: Option<Option<PathBuf>>,
}

fn default_max_active_downloads() -> usize {
    3
}

fn default_max_download_retries() -> u32 {
    5
}

fn default_custom_battery_value() -> u8 {
    20
}

fn default_true() -> bool {
    true
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_max_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(60)
}

fn default_user_agent() -> String {
    format!("download-engine/{}", env!("CARGO_PKG_VERSION"))
}

fn default_progress_interval() -> u64 {
    256 * 1024
}

fn default_shutdown_timeout() -> Duration {
    Duration::from_secs(30)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.limits.max_active_downloads, 3);
        assert!(config.network.enable_roaming);
        assert!(!config.network.unmetered_connections_only);
        assert_eq!(config.power.custom_battery_control_value, 20);
        assert_eq!(config.post_process.file_collision, FileCollisionAction::Overwrite);
        assert!(config.retry.jitter);
    }

    #[test]
    fn flattened_sections_read_from_top_level_keys() {
        let json = r#"{
            "max_active_downloads": 1,
            "unmetered_connections_only": true,
            "only_when_charging": true,
            "move_after_download": true,
            "move_after_download_in": "/data/done",
            "retry": { "initial_delay": 5, "jitter": false }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.limits.max_active_downloads, 1);
        assert!(config.network.unmetered_connections_only);
        assert!(config.power.only_when_charging);
        assert_eq!(
            config.post_process.move_target(),
            Some(Path::new("/data/done"))
        );
        assert_eq!(config.retry.initial_delay, Duration::from_secs(5));
        assert_eq!(config.retry.max_delay, Duration::from_secs(60));
        assert!(!config.retry.jitter);
    }

    #[test]
    fn move_target_requires_flag() {
        let post = PostProcessConfig {
            move_after_download: false,
            move_after_download_in: Some(PathBuf::from("/data/done")),
            ..Default::default()
        };
        assert_eq!(post.move_target(), None);
    }

    #[test]
    fn policies_report_whether_they_need_watching() {
        let mut network = NetworkPolicy::default();
        assert!(network.is_active(), "roaming suspension is on by default");
        network.enable_roaming = false;
        assert!(!network.is_active());

        let mut power = PowerPolicy::default();
        assert!(!power.is_active());
        power.custom_battery_control = true;
        assert!(power.is_active());
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.limits.max_active_downloads = 0;
        let err = config.validate().unwrap_err();
        assert!(matches!(err, Error::Config { key: Some(ref k), .. } if k == "max_active_downloads"));
    }

    #[test]
    fn validate_rejects_out_of_range_battery_threshold() {
        let mut config = Config::default();
        config.power.custom_battery_control_value = 0;
        assert!(config.validate().is_err());
        config.power.custom_battery_control_value = 101;
        assert!(config.validate().is_err());
        config.power.custom_battery_control_value = 100;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn from_json_file_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        std::fs::write(&path, r#"{"max_active_downloads": 2}"#).unwrap();
        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.limits.max_active_downloads, 2);

        std::fs::write(&path, r#"{"max_active_downloads": 0}"#).unwrap();
        assert!(Config::from_json_file(&path).is_err());

        assert!(Config::from_json_file(&dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn settings_update_none_omits_field_entirely() {
        let update = SettingsUpdate::default();
        let json = serde_json::to_value(&update).unwrap();
        assert!(json.as_object().unwrap().is_empty());
    }

    #[test]
    fn settings_update_some_none_serializes_as_null() {
        let update = SettingsUpdate {
            speed_limit_bps: Some(None),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert!(json["speed_limit_bps"].is_null());
        assert!(json.as_object().unwrap().contains_key("speed_limit_bps"));
    }
}
