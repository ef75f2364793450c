//! Configuration loading and defaults for powerwatchd.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Idle timeouts effective for the current power source, in seconds.
/// A value of zero disables the corresponding stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdleTimeouts {
    pub dim: u64,
    pub blank: u64,
    pub suspend: u64,
}

/// Main configuration for powerwatchd.
///
/// An immutable snapshot per load; the cascade never writes back into it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds of idle before dimming on AC power (default: 300).
    pub ac_dim_timeout: u64,

    /// Seconds of idle before blanking on AC power (default: 600).
    pub ac_blank_timeout: u64,

    /// Seconds of idle before dimming on battery (default: 120).
    pub battery_dim_timeout: u64,

    /// Seconds of idle before blanking on battery (default: 300).
    pub battery_blank_timeout: u64,

    /// Seconds of idle before suspend; only applies on battery (default: 900).
    pub suspend_timeout: u64,

    /// Battery percentage for the first low warning (default: 20).
    pub battery_low: f64,

    /// Battery percentage for the critical warning (default: 10).
    pub battery_critical: f64,

    /// Battery percentage that forces hibernate/poweroff (default: 3).
    pub battery_danger: f64,

    /// Action string for lid close while on AC (consumed by the shell).
    pub lid_action_ac: String,

    /// Action string for lid close while on battery.
    pub lid_action_battery: String,

    /// Action string for the power button.
    pub power_button_action: String,

    /// Action taken when the battery reaches the danger threshold.
    pub critical_action: String,

    /// Brightness preset applied on AC, percent (default: 100).
    pub ac_brightness: u32,

    /// Brightness preset applied on battery, percent (default: 60).
    pub battery_brightness: u32,

    /// Lock the screen before suspending (default: true).
    pub lock_on_suspend: bool,

    /// Lock the screen when the lid closes (default: true).
    pub lock_on_lid: bool,

    /// Command spawned to lock the screen.
    pub lock_command: String,

    /// Interval between UPower battery polls in seconds (default: 5).
    pub battery_poll_interval_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ac_dim_timeout: 300,
            ac_blank_timeout: 600,
            battery_dim_timeout: 120,
            battery_blank_timeout: 300,
            suspend_timeout: 900,
            battery_low: 20.0,
            battery_critical: 10.0,
            battery_danger: 3.0,
            lid_action_ac: "lock".to_string(),
            lid_action_battery: "suspend".to_string(),
            power_button_action: "interactive".to_string(),
            critical_action: "hibernate".to_string(),
            ac_brightness: 100,
            battery_brightness: 60,
            lock_on_suspend: true,
            lock_on_lid: true,
            lock_command: "loginctl lock-session".to_string(),
            battery_poll_interval_seconds: 5,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config.validated())
    }

    /// Load configuration from the default path, or return defaults if not found.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(ref p) = Self::default_path() {
            if p.exists() {
                return Self::load(p);
            }
        }

        Ok(Self::default())
    }

    /// Write the configuration to a file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Default config path: `$XDG_CONFIG_HOME/powerwatchd/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("powerwatchd").join("config.toml"))
    }

    /// The dim/blank/suspend timeouts effective for the given power source.
    ///
    /// Suspend is reported for both sources; the cascade only acts on it
    /// while on battery.
    pub fn effective_timeouts(&self, on_battery: bool) -> IdleTimeouts {
        if on_battery {
            IdleTimeouts {
                dim: self.battery_dim_timeout,
                blank: self.battery_blank_timeout,
                suspend: self.suspend_timeout,
            }
        } else {
            IdleTimeouts {
                dim: self.ac_dim_timeout,
                blank: self.ac_blank_timeout,
                suspend: self.suspend_timeout,
            }
        }
    }

    /// Enforce `danger < critical < low`; fall back to default thresholds
    /// when the file violates the ordering.
    fn validated(mut self) -> Self {
        if !(self.battery_danger < self.battery_critical
            && self.battery_critical < self.battery_low)
        {
            warn!(
                "Battery thresholds out of order (danger={}, critical={}, low={}); using defaults",
                self.battery_danger, self.battery_critical, self.battery_low
            );
            let defaults = Config::default();
            self.battery_low = defaults.battery_low;
            self.battery_critical = defaults.battery_critical;
            self.battery_danger = defaults.battery_danger;
        }
        self
    }
}
