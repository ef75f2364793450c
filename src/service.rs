//! The D-Bus surface of the daemon.
//!
//! Every method forwards a typed event to the dispatch loop; queries wait
//! on a oneshot reply. The service object itself holds no power state, so
//! the single-writer rule holds even under concurrent method calls.

use tokio::sync::{mpsc, oneshot};
use zbus::fdo;
use zbus::object_server::SignalEmitter;

use crate::events::{Event, PolicyKey, SessionOp};

/// Well-known name and object path for the daemon.
pub const BUS_NAME: &str = "dev.powerwatch.Daemon";
pub const OBJECT_PATH: &str = "/dev/powerwatch/Daemon";

pub struct PowerService {
    tx: mpsc::Sender<Event>,
}

impl PowerService {
    pub fn new(tx: mpsc::Sender<Event>) -> Self {
        Self { tx }
    }

    async fn send(&self, event: Event) -> fdo::Result<()> {
        self.tx
            .send(event)
            .await
            .map_err(|_| fdo::Error::Failed("daemon loop unavailable".to_string()))
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Event,
    ) -> fdo::Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(make(reply_tx)).await?;
        reply_rx
            .await
            .map_err(|_| fdo::Error::Failed("daemon loop dropped the request".to_string()))
    }

    async fn session_op(&self, op: SessionOp) -> fdo::Result<bool> {
        self.request(|reply| Event::Session { op, reply }).await
    }
}

#[zbus::interface(name = "dev.powerwatch.Daemon1")]
impl PowerService {
    // Session-manager primitives.

    async fn shutdown(&self) -> fdo::Result<bool> {
        self.session_op(SessionOp::Shutdown).await
    }

    async fn reboot(&self) -> fdo::Result<bool> {
        self.session_op(SessionOp::Reboot).await
    }

    async fn suspend(&self) -> fdo::Result<bool> {
        self.session_op(SessionOp::Suspend).await
    }

    async fn hibernate(&self) -> fdo::Result<bool> {
        self.session_op(SessionOp::Hibernate).await
    }

    async fn logout(&self) -> fdo::Result<bool> {
        self.session_op(SessionOp::Logout).await
    }

    async fn lock_screen(&self) -> fdo::Result<bool> {
        self.session_op(SessionOp::LockScreen).await
    }

    // Screen backlight.

    async fn get_brightness(&self) -> fdo::Result<u32> {
        self.request(|reply| Event::GetBrightness { reply })
            .await?
            .ok_or_else(|| fdo::Error::Failed("no backlight device".to_string()))
    }

    async fn set_brightness(&self, value: u32) -> fdo::Result<()> {
        self.send(Event::SetBrightness { value }).await
    }

    async fn get_max_brightness(&self) -> fdo::Result<u32> {
        self.request(|reply| Event::GetMaxBrightness { reply })
            .await?
            .ok_or_else(|| fdo::Error::Failed("no backlight device".to_string()))
    }

    // Keyboard backlight.

    async fn get_keyboard_brightness(&self) -> fdo::Result<u32> {
        self.request(|reply| Event::GetKeyboardBrightness { reply })
            .await?
            .ok_or_else(|| fdo::Error::Failed("no keyboard backlight".to_string()))
    }

    async fn set_keyboard_brightness(&self, value: u32) -> fdo::Result<()> {
        self.send(Event::SetKeyboardBrightness { value }).await
    }

    async fn has_keyboard_backlight(&self) -> fdo::Result<bool> {
        self.request(|reply| Event::HasKeyboardBacklight { reply })
            .await
    }

    // Battery.

    async fn get_battery_info(&self) -> fdo::Result<(f64, bool, i64)> {
        self.request(|reply| Event::GetBatteryInfo { reply }).await
    }

    async fn get_battery_levels(&self) -> fdo::Result<(f64, f64, f64)> {
        self.request(|reply| Event::GetBatteryLevels { reply }).await
    }

    async fn set_battery_levels(&self, low: f64, critical: f64, danger: f64) -> fdo::Result<()> {
        if !(danger < critical && critical < low) {
            return Err(fdo::Error::InvalidArgs(
                "thresholds must satisfy danger < critical < low".to_string(),
            ));
        }
        self.send(Event::SetBatteryLevels {
            low,
            critical,
            danger,
        })
        .await
    }

    // Cascade snapshot and tuning.

    async fn get_lid_state(&self) -> fdo::Result<bool> {
        self.request(|reply| Event::GetLidState { reply }).await
    }

    async fn get_idle_state(&self) -> fdo::Result<(bool, bool, bool)> {
        self.request(|reply| Event::GetIdleState { reply }).await
    }

    async fn set_idle_timeouts(&self, dim: u64, blank: u64, suspend: u64) -> fdo::Result<()> {
        self.send(Event::SetIdleTimeouts { dim, blank, suspend })
            .await
    }

    async fn get_idle_timeouts(&self) -> fdo::Result<(u64, u64, u64)> {
        self.request(|reply| Event::GetIdleTimeouts { reply }).await
    }

    async fn simulate_activity(&self) -> fdo::Result<()> {
        self.send(Event::SimulateActivity).await
    }

    // Inhibitor lease lifecycle.

    async fn inhibit(&self, what: &str, who: &str, why: &str) -> fdo::Result<u32> {
        let (what, who, why) = (what.to_string(), who.to_string(), why.to_string());
        self.request(|reply| Event::Inhibit {
            what,
            who,
            why,
            reply,
        })
        .await
    }

    async fn un_inhibit(&self, cookie: u32) -> fdo::Result<()> {
        self.send(Event::UnInhibit { id: cookie }).await
    }

    async fn list_inhibitors(&self) -> fdo::Result<Vec<(u32, String, String, u8)>> {
        self.request(|reply| Event::ListInhibitors { reply }).await
    }

    // Policy strings.

    async fn get_lid_action(&self) -> fdo::Result<String> {
        self.request(|reply| Event::GetPolicy {
            key: PolicyKey::LidAction,
            reply,
        })
        .await
    }

    async fn set_lid_action(&self, action: &str) -> fdo::Result<()> {
        self.send(Event::SetPolicy {
            key: PolicyKey::LidAction,
            value: action.to_string(),
        })
        .await
    }

    async fn get_power_button_action(&self) -> fdo::Result<String> {
        self.request(|reply| Event::GetPolicy {
            key: PolicyKey::PowerButtonAction,
            reply,
        })
        .await
    }

    async fn set_power_button_action(&self, action: &str) -> fdo::Result<()> {
        self.send(Event::SetPolicy {
            key: PolicyKey::PowerButtonAction,
            value: action.to_string(),
        })
        .await
    }

    async fn get_critical_action(&self) -> fdo::Result<String> {
        self.request(|reply| Event::GetPolicy {
            key: PolicyKey::CriticalAction,
            reply,
        })
        .await
    }

    async fn set_critical_action(&self, action: &str) -> fdo::Result<()> {
        self.send(Event::SetPolicy {
            key: PolicyKey::CriticalAction,
            value: action.to_string(),
        })
        .await
    }

    // Config lifecycle.

    async fn save_config(&self) -> fdo::Result<bool> {
        self.request(|reply| Event::SaveConfig { reply }).await
    }

    async fn reload_config(&self) -> fdo::Result<bool> {
        self.request(|reply| Event::ReloadConfig { reply }).await
    }

    async fn reset_config(&self) -> fdo::Result<bool> {
        self.request(|reply| Event::ResetConfig { reply }).await
    }

    // Power profile pass-through.

    async fn get_active_profile(&self) -> fdo::Result<String> {
        self.request(|reply| Event::GetActiveProfile { reply }).await
    }

    async fn set_active_profile(&self, name: &str) -> fdo::Result<bool> {
        let name = name.to_string();
        self.request(|reply| Event::SetActiveProfile { name, reply })
            .await
    }

    async fn get_profiles(&self) -> fdo::Result<Vec<String>> {
        self.request(|reply| Event::GetProfiles { reply }).await
    }

    // Change signals, emitted by the dispatch loop.

    #[zbus(signal)]
    pub async fn battery_warning(emitter: &SignalEmitter<'_>, percentage: f64)
    -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn battery_critical(emitter: &SignalEmitter<'_>, percentage: f64)
    -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn lid_state_changed(emitter: &SignalEmitter<'_>, closed: bool)
    -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn power_source_changed(
        emitter: &SignalEmitter<'_>,
        on_battery: bool,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn screen_dimmed(emitter: &SignalEmitter<'_>, dimmed: bool) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn screen_blanked(emitter: &SignalEmitter<'_>, blanked: bool) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn brightness_changed(emitter: &SignalEmitter<'_>, level: u32)
    -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn idle_timeouts_changed(
        emitter: &SignalEmitter<'_>,
        dim: u64,
        blank: u64,
        suspend: u64,
    ) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn config_changed(emitter: &SignalEmitter<'_>) -> zbus::Result<()>;

    #[zbus(signal)]
    pub async fn profile_changed(emitter: &SignalEmitter<'_>, name: &str) -> zbus::Result<()>;
}
