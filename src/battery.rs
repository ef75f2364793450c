//! Battery level policy and the UPower poll task.
//!
//! `BatteryMonitor` is pure threshold logic with warning hysteresis; the
//! `UPowerMonitor` task feeds it samples from the system bus.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc::Sender;
use tracing::{debug, info, warn};
use zbus::Connection;

use crate::events::Event;

const UPOWER_SERVICE: &str = "org.freedesktop.UPower";
const UPOWER_PATH: &str = "/org/freedesktop/UPower";
const UPOWER_INTERFACE: &str = "org.freedesktop.UPower";
const DISPLAY_DEVICE_PATH: &str = "/org/freedesktop/UPower/devices/DisplayDevice";
const DEVICE_INTERFACE: &str = "org.freedesktop.UPower.Device";

/// UPower device state: charging.
const STATE_CHARGING: u32 = 1;
/// UPower device state: fully charged.
const STATE_FULLY_CHARGED: u32 = 4;

/// Point-in-time battery reading delivered to the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatterySample {
    pub percentage: f64,
    pub charging: bool,
    pub on_battery: bool,
    pub time_to_empty: i64,
    pub lid_closed: bool,
}

/// What a level check decided. The dispatch loop owns the side effects.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BatteryDecision {
    /// Normal-urgency notification + `BatteryWarning` signal.
    WarnLow(f64),
    /// Critical-urgency notification + `BatteryWarning` signal.
    WarnCritical(f64),
    /// Critical notification + `BatteryCritical` signal + hibernate with
    /// poweroff fallback. Fires on every check while the level holds.
    ForceSleep(f64),
}

/// Threshold checks with one-shot warning hysteresis.
///
/// The danger path is deliberately not behind a hysteresis flag: a battery
/// that keeps draining must keep forcing the safety shutdown.
#[derive(Debug)]
pub struct BatteryMonitor {
    low: f64,
    critical: f64,
    danger: f64,
    warned_low: bool,
    warned_critical: bool,
}

impl BatteryMonitor {
    pub fn new(low: f64, critical: f64, danger: f64) -> Self {
        Self {
            low,
            critical,
            danger,
            warned_low: false,
            warned_critical: false,
        }
    }

    pub fn levels(&self) -> (f64, f64, f64) {
        (self.low, self.critical, self.danger)
    }

    /// Replace thresholds (from `SetBatteryLevels`); ordering is the
    /// caller's responsibility, warnings re-arm.
    pub fn set_levels(&mut self, low: f64, critical: f64, danger: f64) {
        self.low = low;
        self.critical = critical;
        self.danger = danger;
        self.warned_low = false;
        self.warned_critical = false;
    }

    /// Check a battery level. Charging clears both warning flags so the
    /// next discharge can warn again.
    pub fn check_level(&mut self, percentage: f64, charging: bool) -> Option<BatteryDecision> {
        if charging {
            if self.warned_low || self.warned_critical {
                debug!("Charging: clearing battery warning flags");
            }
            self.warned_low = false;
            self.warned_critical = false;
            return None;
        }

        if percentage <= self.danger {
            warn!("Battery at {:.0}%: danger threshold reached", percentage);
            return Some(BatteryDecision::ForceSleep(percentage));
        }

        if percentage <= self.critical && !self.warned_critical {
            self.warned_critical = true;
            // The critical warning subsumes the low one; a battery first
            // seen below critical must not follow up with a weaker alert.
            self.warned_low = true;
            return Some(BatteryDecision::WarnCritical(percentage));
        }

        if percentage <= self.low && !self.warned_low {
            self.warned_low = true;
            return Some(BatteryDecision::WarnLow(percentage));
        }

        None
    }
}

/// Polls UPower for battery, power-source and lid state.
pub struct UPowerMonitor {
    conn: Connection,
}

impl UPowerMonitor {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    /// Read a sample from the display device and the UPower root object.
    pub async fn sample(&self) -> Result<BatterySample> {
        let device = zbus::Proxy::new(
            &self.conn,
            UPOWER_SERVICE,
            DISPLAY_DEVICE_PATH,
            DEVICE_INTERFACE,
        )
        .await
        .context("Failed to create UPower device proxy")?;

        let percentage: f64 = device
            .get_property("Percentage")
            .await
            .context("Failed to get Percentage")?;
        let device_state: u32 = device
            .get_property("State")
            .await
            .context("Failed to get State")?;
        let time_to_empty: i64 = device.get_property("TimeToEmpty").await.unwrap_or(0);

        let upower = zbus::Proxy::new(&self.conn, UPOWER_SERVICE, UPOWER_PATH, UPOWER_INTERFACE)
            .await
            .context("Failed to create UPower proxy")?;
        let on_battery: bool = upower
            .get_property("OnBattery")
            .await
            .context("Failed to get OnBattery")?;
        let lid_closed: bool = upower.get_property("LidIsClosed").await.unwrap_or(false);

        Ok(BatterySample {
            percentage,
            charging: device_state == STATE_CHARGING || device_state == STATE_FULLY_CHARGED,
            on_battery,
            time_to_empty,
            lid_closed,
        })
    }

    /// Spawn the background poll task. Each successful poll is forwarded as
    /// an event; transient failures are logged and retried next interval.
    pub fn spawn(self, tx: Sender<Event>, interval: Duration) {
        tokio::spawn(async move {
            info!("Battery monitor started, polling every {:?}", interval);

            loop {
                match self.sample().await {
                    Ok(sample) => {
                        if tx.send(Event::BatterySample(sample)).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Failed to poll UPower: {}", e);
                    }
                }

                tokio::time::sleep(interval).await;
            }

            debug!("Battery monitor exiting");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> BatteryMonitor {
        BatteryMonitor::new(10.0, 5.0, 2.0)
    }

    #[test]
    fn test_above_thresholds_no_decision() {
        let mut m = monitor();
        assert_eq!(m.check_level(50.0, false), None);
        assert_eq!(m.check_level(11.0, false), None);
    }

    #[test]
    fn test_critical_before_danger() {
        // 5% with danger=2, critical=5: critical warning, not hibernate.
        let mut m = monitor();
        assert_eq!(
            m.check_level(5.0, false),
            Some(BatteryDecision::WarnCritical(5.0))
        );
    }

    #[test]
    fn test_danger_forces_sleep() {
        let mut m = monitor();
        assert_eq!(
            m.check_level(1.0, false),
            Some(BatteryDecision::ForceSleep(1.0))
        );
    }

    #[test]
    fn test_danger_repeats_without_hysteresis() {
        let mut m = monitor();
        for _ in 0..3 {
            assert_eq!(
                m.check_level(1.5, false),
                Some(BatteryDecision::ForceSleep(1.5))
            );
        }
    }

    #[test]
    fn test_warning_hysteresis() {
        let mut m = monitor();
        assert_eq!(m.check_level(9.0, false), Some(BatteryDecision::WarnLow(9.0)));
        // Still below low, already warned: silent.
        assert_eq!(m.check_level(8.0, false), None);
        // Crossing into critical warns once more.
        assert_eq!(
            m.check_level(4.0, false),
            Some(BatteryDecision::WarnCritical(4.0))
        );
        assert_eq!(m.check_level(3.0, false), None);
    }

    #[test]
    fn test_start_below_critical_warns_critical_only() {
        // First reading already below critical: one critical warning, no
        // trailing low warning on later checks.
        let mut m = monitor();
        assert_eq!(
            m.check_level(4.0, false),
            Some(BatteryDecision::WarnCritical(4.0))
        );
        assert_eq!(m.check_level(3.5, false), None);
        // Recovering into the low band without charging stays silent too.
        assert_eq!(m.check_level(8.0, false), None);
    }

    #[test]
    fn test_charging_clears_flags() {
        let mut m = monitor();
        assert!(m.check_level(9.0, false).is_some());
        assert!(m.check_level(4.0, false).is_some());

        // Any charging sample clears both flags and performs nothing.
        assert_eq!(m.check_level(4.0, true), None);
        assert_eq!(m.check_level(60.0, true), None);

        // Discharging again re-warns.
        assert_eq!(m.check_level(9.0, false), Some(BatteryDecision::WarnLow(9.0)));
    }

    #[test]
    fn test_set_levels_rearms_warnings() {
        let mut m = monitor();
        assert!(m.check_level(9.0, false).is_some());

        m.set_levels(20.0, 10.0, 3.0);
        assert_eq!(m.levels(), (20.0, 10.0, 3.0));
        assert_eq!(m.check_level(9.0, false), Some(BatteryDecision::WarnCritical(9.0)));
    }
}
