use crate::error::{MkanbanError, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Snooze tokens understood by the action service.
pub const SNOOZE_TOKENS: &[&str] = &["10m", "30m", "1h", "3h", "tomorrow", "next_week"];

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// OrphanPolicy
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrphanPolicy {
    #[default]
    AutoDisable,
    AutoDelete,
    WarnOnly,
}

impl OrphanPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            OrphanPolicy::AutoDisable => "auto_disable",
            OrphanPolicy::AutoDelete => "auto_delete",
            OrphanPolicy::WarnOnly => "warn_only",
        }
    }
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NotificationConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemNotificationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub sound: bool,
    #[serde(default = "default_true")]
    pub vibration: bool,
    #[serde(default)]
    pub led: bool,
}

impl Default for SystemNotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: true,
            vibration: true,
            led: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobilePushConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_push_provider")]
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntfy_server: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntfy_topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ntfy_token: Option<String>,
}

fn default_push_provider() -> String {
    "ntfy".to_string()
}

impl Default for MobilePushConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: default_push_provider(),
            ntfy_server: None,
            ntfy_topic: None,
            ntfy_token: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub system: SystemNotificationConfig,
    #[serde(default)]
    pub mobile_push: MobilePushConfig,
}

// ---------------------------------------------------------------------------
// ActionsConfig
// ---------------------------------------------------------------------------

/// Engine settings stored at `.mkanban/config.yaml`. Intervals are seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
    #[serde(default = "default_snooze_options")]
    pub default_snooze_options: Vec<String>,
    /// Declared for compatibility; execution is serial.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_executions: u32,
    /// Not enforced by the engine.
    #[serde(default = "default_execution_timeout")]
    pub execution_timeout: u64,
    #[serde(default = "default_orphan_check_interval")]
    pub orphan_check_interval: u64,
    #[serde(default)]
    pub orphan_action: OrphanPolicy,
    /// Days.
    #[serde(default = "default_missed_retention")]
    pub missed_actions_retention: u32,
    #[serde(default = "default_done_column")]
    pub done_column: String,
    #[serde(default)]
    pub notifications: NotificationConfig,
}

fn default_true() -> bool {
    true
}

fn default_polling_interval() -> u64 {
    30
}

fn default_snooze_options() -> Vec<String> {
    SNOOZE_TOKENS.iter().map(|s| s.to_string()).collect()
}

fn default_max_concurrent() -> u32 {
    5
}

fn default_execution_timeout() -> u64 {
    300
}

fn default_orphan_check_interval() -> u64 {
    3600
}

fn default_missed_retention() -> u32 {
    7
}

fn default_done_column() -> String {
    "done".to_string()
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            polling_interval: default_polling_interval(),
            default_snooze_options: default_snooze_options(),
            max_concurrent_executions: default_max_concurrent(),
            execution_timeout: default_execution_timeout(),
            orphan_check_interval: default_orphan_check_interval(),
            orphan_action: OrphanPolicy::default(),
            missed_actions_retention: default_missed_retention(),
            done_column: default_done_column(),
            notifications: NotificationConfig::default(),
        }
    }
}

impl ActionsConfig {
    /// Missing file yields defaults.
    pub fn load(root: &Path) -> Result<Self> {
        let path = paths::config_path(root);
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(&path)?;
        if data.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(&data)
            .map_err(|e| MkanbanError::Config(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        crate::io::write_yaml(&paths::config_path(root), self)
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval)
    }

    pub fn orphan_check_interval(&self) -> Duration {
        Duration::from_secs(self.orphan_check_interval)
    }

    pub fn missed_retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.missed_actions_retention))
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();

        if self.polling_interval == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "polling_interval must be greater than zero".to_string(),
            });
        }

        if self.orphan_check_interval == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "orphan_check_interval must be greater than zero".to_string(),
            });
        }

        for token in &self.default_snooze_options {
            if !is_snooze_token(token) {
                warnings.push(ConfigWarning {
                    level: WarnLevel::Warning,
                    message: format!(
                        "snooze option '{token}' is not understood and will fall back to 1h"
                    ),
                });
            }
        }

        if self.missed_actions_retention == 0 {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "missed_actions_retention is 0: missed actions are pruned immediately"
                    .to_string(),
            });
        }

        if self.done_column.trim().is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "done_column must not be empty".to_string(),
            });
        }

        let push = &self.notifications.mobile_push;
        if push.enabled && push.ntfy_topic.as_deref().map_or(true, str::is_empty) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "mobile_push is enabled but ntfy_topic is not set".to_string(),
            });
        }

        warnings
    }
}

/// `Nm`, `Nh`, `Nd`, `tomorrow` or `next_week`.
pub fn is_snooze_token(token: &str) -> bool {
    if token == "tomorrow" || token == "next_week" {
        return true;
    }
    let Some(unit) = token.chars().last() else {
        return false;
    };
    let amount = &token[..token.len() - unit.len_utf8()];
    matches!(unit, 'm' | 'h' | 'd') && amount.parse::<u32>().is_ok()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn defaults() {
        let cfg = ActionsConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.polling_interval, 30);
        assert_eq!(cfg.orphan_action, OrphanPolicy::AutoDisable);
        assert_eq!(cfg.missed_actions_retention, 7);
        assert_eq!(cfg.done_column, "done");
        assert_eq!(cfg.default_snooze_options.len(), 6);
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn missing_file_loads_defaults() {
        let dir = TempDir::new().unwrap();
        let cfg = ActionsConfig::load(dir.path()).unwrap();
        assert_eq!(cfg, ActionsConfig::default());
    }

    #[test]
    fn partial_yaml_fills_defaults() {
        let dir = TempDir::new().unwrap();
        let path = paths::config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "polling_interval: 10\norphan_action: warn_only\n").unwrap();
        let cfg = ActionsConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.polling_interval, 10);
        assert_eq!(cfg.orphan_action, OrphanPolicy::WarnOnly);
        assert_eq!(cfg.orphan_check_interval, 3600);
    }

    #[test]
    fn save_then_load() {
        let dir = TempDir::new().unwrap();
        let cfg = ActionsConfig {
            orphan_action: OrphanPolicy::AutoDelete,
            ..Default::default()
        };
        cfg.save(dir.path()).unwrap();
        assert_eq!(ActionsConfig::load(dir.path()).unwrap(), cfg);
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = paths::config_path(dir.path());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "polling_interval: [oops").unwrap();
        assert!(matches!(
            ActionsConfig::load(dir.path()),
            Err(MkanbanError::Config(_))
        ));
    }

    #[test]
    fn validate_flags_problems() {
        let mut cfg = ActionsConfig {
            polling_interval: 0,
            default_snooze_options: vec!["1h".into(), "soon".into()],
            ..Default::default()
        };
        cfg.notifications.mobile_push.enabled = true;
        let warnings = cfg.validate();
        assert_eq!(warnings.len(), 3);
        assert_eq!(warnings[0].level, WarnLevel::Error);
        assert!(warnings[1].message.contains("soon"));
    }

    #[test]
    fn snooze_tokens() {
        for t in ["10m", "2h", "3d", "tomorrow", "next_week"] {
            assert!(is_snooze_token(t), "{t}");
        }
        for t in ["", "h", "1w", "xm"] {
            assert!(!is_snooze_token(t), "{t}");
        }
    }
}
