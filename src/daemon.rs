//! The dispatch loop: single owner of `PowerState`.
//!
//! Everything that mutates state runs here, driven by the 1-second idle
//! tick and the typed event channel. Monitors and the D-Bus surface only
//! ever send events, so cascade-stage transitions can never interleave and
//! an inhibitor added between two ticks is visible to the very next tick.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use zbus::object_server::InterfaceRef;

use crate::battery::{BatteryDecision, BatteryMonitor, BatterySample};
use crate::cascade::{CascadeAction, Hardware, IdleCascade};
use crate::config::Config;
use crate::events::{Event, PolicyKey, SessionOp};
use crate::idle::IdleSource;
use crate::inhibit::InhibitorRegistry;
use crate::notify::{Notifier, Urgency};
use crate::profiles::PowerProfiles;
use crate::service::PowerService;
use crate::session::{SessionControl, SleepPhase};
use crate::state::PowerState;

/// Delay between lid close and the suspend request, giving the lock
/// command time to take effect.
const LID_SUSPEND_DELAY: Duration = Duration::from_secs(2);

pub struct Daemon<S: SessionControl> {
    config: Config,
    config_path: Option<PathBuf>,
    state: PowerState,
    cascade: IdleCascade,
    registry: InhibitorRegistry,
    battery: BatteryMonitor,
    hardware: Hardware,
    idle: Box<dyn IdleSource + Send>,
    session: S,
    notifier: Option<Notifier>,
    profiles: Option<PowerProfiles>,
    phase: SleepPhase,
    signals: Option<InterfaceRef<PowerService>>,
    rx: mpsc::Receiver<Event>,
    tx: mpsc::Sender<Event>,
    /// False once `cancel_timers` ran; no tick fires afterwards.
    ticking: bool,
}

#[allow(clippy::too_many_arguments)]
impl<S: SessionControl> Daemon<S> {
    pub fn new(
        config: Config,
        config_path: Option<PathBuf>,
        hardware: Hardware,
        idle: Box<dyn IdleSource + Send>,
        session: S,
        notifier: Option<Notifier>,
        profiles: Option<PowerProfiles>,
        rx: mpsc::Receiver<Event>,
        tx: mpsc::Sender<Event>,
    ) -> Self {
        let state = PowerState::new(config.effective_timeouts(false));
        let battery = BatteryMonitor::new(
            config.battery_low,
            config.battery_critical,
            config.battery_danger,
        );

        Self {
            config,
            config_path,
            state,
            cascade: IdleCascade::new(),
            registry: InhibitorRegistry::new(),
            battery,
            hardware,
            idle,
            session,
            notifier,
            profiles,
            phase: SleepPhase::default(),
            signals: None,
            rx,
            tx,
            ticking: true,
        }
    }

    /// Attach the registered interface so state changes can be republished
    /// as D-Bus signals.
    pub fn set_signal_interface(&mut self, iface: InterfaceRef<PowerService>) {
        self.signals = Some(iface);
    }

    /// Run until ctrl-c or channel closure. Shutdown always goes through
    /// `cancel_timers` so altered hardware is restored.
    pub async fn run(mut self) {
        let mut tick = tokio::time::interval(Duration::from_secs(1));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        info!("Dispatch loop started");

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.ticking {
                        self.on_tick().await;
                    }
                }
                event = self.rx.recv() => {
                    match event {
                        Some(event) => self.handle_event(event).await,
                        None => break,
                    }
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received ctrl-c, shutting down");
                    break;
                }
            }
        }

        self.cancel_timers().await;
    }

    async fn on_tick(&mut self) {
        let sample = match self.idle.idle_time() {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to sample idle time: {}", e);
                return;
            }
        };

        let actions = self.cascade.tick(
            sample,
            self.state.timeouts,
            self.state.on_battery,
            &self.registry,
        );

        for action in actions {
            match action {
                CascadeAction::Restore => self.restore_with_signals().await,
                CascadeAction::Dim => {
                    self.hardware.dim(&mut self.state);
                    self.emit_screen_dimmed(true).await;
                }
                CascadeAction::Blank => {
                    self.hardware.blank(&mut self.state);
                    self.emit_screen_blanked(true).await;
                }
                CascadeAction::Suspend => {
                    info!("Idle suspend threshold reached");
                    self.do_suspend().await;
                }
            }
        }

        self.state.is_idle = self.cascade.is_idle();
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::SimulateActivity => self.reset_timers().await,

            Event::SetIdleTimeouts { dim, blank, suspend } => {
                self.set_idle_timeouts(dim, blank, suspend).await;
            }

            Event::GetIdleTimeouts { reply } => {
                let t = self.state.timeouts;
                let _ = reply.send((t.dim, t.blank, t.suspend));
            }

            Event::GetIdleState { reply } => {
                let _ = reply.send(self.state.idle_snapshot());
            }

            Event::Inhibit {
                what,
                who,
                why,
                reply,
            } => {
                let id = self.registry.add(&what, &who, &why);
                let _ = reply.send(id);
            }

            Event::UnInhibit { id } => self.registry.remove(id),

            Event::ListInhibitors { reply } => {
                let list = self
                    .registry
                    .list()
                    .iter()
                    .map(|i| {
                        (
                            i.id,
                            i.app_name.clone(),
                            i.reason.clone(),
                            i.kind.bits(),
                        )
                    })
                    .collect();
                let _ = reply.send(list);
            }

            Event::GetBrightness { reply } => {
                let value = self.hardware.screen.as_ref().and_then(|s| s.get().ok());
                let _ = reply.send(value);
            }

            Event::SetBrightness { value } => {
                if let Some(screen) = self.hardware.screen.as_mut() {
                    match screen.set(value) {
                        Ok(()) => self.emit_brightness_changed(value).await,
                        Err(e) => warn!("SetBrightness failed: {}", e),
                    }
                }
            }

            Event::GetMaxBrightness { reply } => {
                let _ = reply.send(self.hardware.screen.as_ref().map(|s| s.max()));
            }

            Event::GetKeyboardBrightness { reply } => {
                let value = self.hardware.keyboard.as_ref().and_then(|k| k.get().ok());
                let _ = reply.send(value);
            }

            Event::SetKeyboardBrightness { value } => {
                if let Some(kb) = self.hardware.keyboard.as_mut() {
                    if let Err(e) = kb.set(value) {
                        warn!("SetKeyboardBrightness failed: {}", e);
                    }
                }
            }

            Event::HasKeyboardBacklight { reply } => {
                let _ = reply.send(self.hardware.has_keyboard_backlight());
            }

            Event::BatterySample(sample) => self.on_battery_sample(sample).await,

            Event::GetBatteryInfo { reply } => {
                let _ = reply.send((
                    self.state.battery_percentage,
                    self.state.charging,
                    self.state.time_to_empty,
                ));
            }

            Event::GetBatteryLevels { reply } => {
                let _ = reply.send(self.battery.levels());
            }

            Event::SetBatteryLevels {
                low,
                critical,
                danger,
            } => {
                self.battery.set_levels(low, critical, danger);
                self.config.battery_low = low;
                self.config.battery_critical = critical;
                self.config.battery_danger = danger;
            }

            Event::GetLidState { reply } => {
                let _ = reply.send(self.state.lid_closed);
            }

            Event::PrepareForSleep(start) => self.on_prepare_for_sleep(start).await,

            Event::DeferredSuspend => {
                // Lid may have reopened or AC attached during the delay.
                if self.state.lid_closed && self.state.on_battery {
                    self.do_suspend().await;
                }
            }

            Event::Session { op, reply } => {
                let ok = self.run_session_op(op).await;
                let _ = reply.send(ok);
            }

            Event::GetPolicy { key, reply } => {
                let _ = reply.send(self.policy(key).to_string());
            }

            Event::SetPolicy { key, value } => self.set_policy(key, value),

            Event::SaveConfig { reply } => {
                let _ = reply.send(self.save_config().await);
            }

            Event::ReloadConfig { reply } => {
                let _ = reply.send(self.reload_config().await);
            }

            Event::ResetConfig { reply } => {
                self.apply_config(Config::default()).await;
                self.emit_config_changed().await;
                let _ = reply.send(true);
            }

            Event::GetActiveProfile { reply } => {
                let name = match &self.profiles {
                    Some(profiles) => profiles.active_profile().await.unwrap_or_else(|e| {
                        debug!("GetActiveProfile failed: {}", e);
                        String::new()
                    }),
                    None => String::new(),
                };
                let _ = reply.send(name);
            }

            Event::SetActiveProfile { name, reply } => {
                let ok = match &self.profiles {
                    Some(profiles) => match profiles.set_active_profile(&name).await {
                        Ok(()) => true,
                        Err(e) => {
                            warn!("SetActiveProfile failed: {}", e);
                            false
                        }
                    },
                    None => false,
                };
                if ok {
                    self.emit_profile_changed(&name).await;
                }
                let _ = reply.send(ok);
            }

            Event::GetProfiles { reply } => {
                let list = match &self.profiles {
                    Some(profiles) => profiles.profiles().await.unwrap_or_else(|e| {
                        debug!("GetProfiles failed: {}", e);
                        Vec::new()
                    }),
                    None => Vec::new(),
                };
                let _ = reply.send(list);
            }
        }
    }

    /// Cancel any pending cascade, restore hardware, restart idle counting.
    async fn reset_timers(&mut self) {
        self.ticking = true;
        if self.cascade.reset() {
            self.restore_with_signals().await;
        }
        self.state.is_idle = false;
    }

    /// Stop the tick and force full restoration. Shutdown path; must leave
    /// no altered hardware behind.
    async fn cancel_timers(&mut self) {
        self.ticking = false;
        self.cascade.reset();
        self.restore_with_signals().await;
        self.state.is_idle = false;
    }

    async fn restore_with_signals(&mut self) {
        let was_dimmed = self.state.screen_dimmed;
        let was_blanked = self.state.screen_blanked;

        self.hardware.restore_all(&mut self.state);

        if was_blanked {
            self.emit_screen_blanked(false).await;
        }
        if was_dimmed {
            self.emit_screen_dimmed(false).await;
        }
    }

    async fn set_idle_timeouts(&mut self, dim: u64, blank: u64, suspend: u64) {
        // Persisted for the power source currently in effect.
        if self.state.on_battery {
            self.config.battery_dim_timeout = dim;
            self.config.battery_blank_timeout = blank;
        } else {
            self.config.ac_dim_timeout = dim;
            self.config.ac_blank_timeout = blank;
        }
        self.config.suspend_timeout = suspend;

        self.state.timeouts = self.config.effective_timeouts(self.state.on_battery);
        self.cascade.rearm();
        info!(
            "Idle timeouts set: dim={}s blank={}s suspend={}s",
            dim, blank, suspend
        );
        self.emit_idle_timeouts_changed(dim, blank, suspend).await;
    }

    async fn on_battery_sample(&mut self, sample: BatterySample) {
        self.state.battery_percentage = sample.percentage;
        self.state.charging = sample.charging;
        self.state.time_to_empty = sample.time_to_empty;

        if sample.on_battery != self.state.on_battery {
            info!(
                "Power source changed: {}",
                if sample.on_battery { "battery" } else { "AC" }
            );
            self.state.on_battery = sample.on_battery;
            self.state.timeouts = self.config.effective_timeouts(sample.on_battery);

            // Thresholds differ per source; restart the cascade cleanly.
            self.reset_timers().await;
            self.apply_brightness_preset().await;
            self.emit_power_source_changed(sample.on_battery).await;
        }

        if sample.lid_closed != self.state.lid_closed {
            self.on_lid_changed(sample.lid_closed).await;
        }

        match self.battery.check_level(sample.percentage, sample.charging) {
            Some(BatteryDecision::WarnLow(pct)) => {
                self.notify_user(
                    "Battery low",
                    &format!("{pct:.0}% of battery remaining"),
                    Urgency::Normal,
                )
                .await;
                self.emit_battery_warning(pct).await;
            }
            Some(BatteryDecision::WarnCritical(pct)) => {
                self.notify_user(
                    "Battery critically low",
                    &format!("{pct:.0}% remaining. Connect power now."),
                    Urgency::Critical,
                )
                .await;
                self.emit_battery_warning(pct).await;
            }
            Some(BatteryDecision::ForceSleep(pct)) => {
                self.notify_user(
                    "Battery empty",
                    "Hibernating to prevent data loss.",
                    Urgency::Critical,
                )
                .await;
                self.emit_battery_critical(pct).await;

                if self.config.critical_action == "poweroff" {
                    self.session.power_off().await;
                } else {
                    self.session.hibernate_or_power_off().await;
                }
            }
            None => {}
        }
    }

    async fn on_lid_changed(&mut self, closed: bool) {
        info!("Lid {}", if closed { "closed" } else { "opened" });
        self.state.lid_closed = closed;
        self.emit_lid_state_changed(closed).await;

        if !closed {
            return;
        }

        if self.config.lock_on_lid {
            self.phase = self.phase.begin_lock();
            self.session.lock_screen();
        }

        // Suspend only on battery, after a short grace period.
        if self.state.on_battery {
            let tx = self.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(LID_SUSPEND_DELAY).await;
                let _ = tx.send(Event::DeferredSuspend).await;
            });
        }
    }

    async fn on_prepare_for_sleep(&mut self, start: bool) {
        if start {
            // Lock must complete before the OS suspends; otherwise the
            // device can resume unlocked.
            if self.config.lock_on_suspend {
                self.phase = self.phase.begin_lock();
                self.session.lock_screen();
            }
            self.phase = self.phase.begin_suspend();
        } else {
            info!("Woke from sleep, restarting idle counting");
            self.phase = self.phase.wake();
            self.reset_timers().await;
        }
    }

    /// The one suspend path: lock first when configured, then ask logind.
    /// Used by the idle cascade, lid close, and the D-Bus method alike.
    /// Returns the session manager's verdict so callers can surface a
    /// refusal.
    async fn do_suspend(&mut self) -> bool {
        if self.config.lock_on_suspend {
            self.phase = self.phase.begin_lock();
            self.session.lock_screen();
        }
        self.phase = self.phase.begin_suspend();

        let ok = self.session.suspend().await;
        if !ok {
            error!("Suspend request refused");
            self.phase = self.phase.wake();
        }
        ok
    }

    async fn run_session_op(&mut self, op: SessionOp) -> bool {
        match op {
            SessionOp::Shutdown => self.session.power_off().await,
            SessionOp::Reboot => self.session.reboot().await,
            SessionOp::Suspend => self.do_suspend().await,
            SessionOp::Hibernate => self.session.hibernate().await,
            SessionOp::Logout => self.session.logout().await,
            SessionOp::LockScreen => self.session.lock_screen(),
        }
    }

    fn policy(&self, key: PolicyKey) -> &str {
        match key {
            PolicyKey::LidAction => {
                if self.state.on_battery {
                    &self.config.lid_action_battery
                } else {
                    &self.config.lid_action_ac
                }
            }
            PolicyKey::PowerButtonAction => &self.config.power_button_action,
            PolicyKey::CriticalAction => &self.config.critical_action,
        }
    }

    fn set_policy(&mut self, key: PolicyKey, value: String) {
        match key {
            PolicyKey::LidAction => {
                if self.state.on_battery {
                    self.config.lid_action_battery = value;
                } else {
                    self.config.lid_action_ac = value;
                }
            }
            PolicyKey::PowerButtonAction => self.config.power_button_action = value,
            PolicyKey::CriticalAction => self.config.critical_action = value,
        }
    }

    async fn save_config(&mut self) -> bool {
        let Some(path) = self.config_path.clone().or_else(Config::default_path) else {
            error!("No config path available");
            return false;
        };

        match self.config.save(&path) {
            Ok(()) => {
                info!("Config saved to {}", path.display());
                self.emit_config_changed().await;
                true
            }
            Err(e) => {
                error!("Failed to save config: {}", e);
                false
            }
        }
    }

    async fn reload_config(&mut self) -> bool {
        match Config::load_or_default(self.config_path.as_deref()) {
            Ok(config) => {
                self.apply_config(config).await;
                self.emit_config_changed().await;
                true
            }
            Err(e) => {
                error!("Failed to reload config: {}", e);
                false
            }
        }
    }

    async fn apply_config(&mut self, config: Config) {
        self.config = config;
        self.battery.set_levels(
            self.config.battery_low,
            self.config.battery_critical,
            self.config.battery_danger,
        );
        self.session
            .set_lock_command(self.config.lock_command.clone());
        self.state.timeouts = self.config.effective_timeouts(self.state.on_battery);
        self.reset_timers().await;
        info!("Configuration applied");
    }

    async fn apply_brightness_preset(&mut self) {
        // While dimmed the saved value would be clobbered; the preset gets
        // picked up on the next restore anyway.
        if self.state.screen_dimmed {
            return;
        }

        let percent = if self.state.on_battery {
            self.config.battery_brightness
        } else {
            self.config.ac_brightness
        };

        if let Some(screen) = self.hardware.screen.as_mut() {
            let raw = (u64::from(screen.max()) * u64::from(percent.min(100)) / 100) as u32;
            match screen.set(raw) {
                Ok(()) => self.emit_brightness_changed(raw).await,
                Err(e) => warn!("Failed to apply brightness preset: {}", e),
            }
        }
    }

    async fn notify_user(&self, summary: &str, body: &str, urgency: Urgency) {
        if let Some(notifier) = &self.notifier {
            notifier.send_or_log(summary, body, urgency).await;
        }
    }

    // Signal emission. All best-effort: a failed emit is logged and never
    // stalls the loop.

    async fn emit_screen_dimmed(&self, dimmed: bool) {
        if let Some(iface) = &self.signals {
            if let Err(e) = PowerService::screen_dimmed(iface.signal_emitter(), dimmed).await {
                debug!("Failed to emit ScreenDimmed: {}", e);
            }
        }
    }

    async fn emit_screen_blanked(&self, blanked: bool) {
        if let Some(iface) = &self.signals {
            if let Err(e) = PowerService::screen_blanked(iface.signal_emitter(), blanked).await {
                debug!("Failed to emit ScreenBlanked: {}", e);
            }
        }
    }

    async fn emit_battery_warning(&self, pct: f64) {
        if let Some(iface) = &self.signals {
            if let Err(e) = PowerService::battery_warning(iface.signal_emitter(), pct).await {
                debug!("Failed to emit BatteryWarning: {}", e);
            }
        }
    }

    async fn emit_battery_critical(&self, pct: f64) {
        if let Some(iface) = &self.signals {
            if let Err(e) = PowerService::battery_critical(iface.signal_emitter(), pct).await {
                debug!("Failed to emit BatteryCritical: {}", e);
            }
        }
    }

    async fn emit_lid_state_changed(&self, closed: bool) {
        if let Some(iface) = &self.signals {
            if let Err(e) =
                PowerService::lid_state_changed(iface.signal_emitter(), closed).await
            {
                debug!("Failed to emit LidStateChanged: {}", e);
            }
        }
    }

    async fn emit_power_source_changed(&self, on_battery: bool) {
        if let Some(iface) = &self.signals {
            if let Err(e) =
                PowerService::power_source_changed(iface.signal_emitter(), on_battery).await
            {
                debug!("Failed to emit PowerSourceChanged: {}", e);
            }
        }
    }

    async fn emit_brightness_changed(&self, level: u32) {
        if let Some(iface) = &self.signals {
            if let Err(e) =
                PowerService::brightness_changed(iface.signal_emitter(), level).await
            {
                debug!("Failed to emit BrightnessChanged: {}", e);
            }
        }
    }

    async fn emit_idle_timeouts_changed(&self, dim: u64, blank: u64, suspend: u64) {
        if let Some(iface) = &self.signals {
            if let Err(e) = PowerService::idle_timeouts_changed(
                iface.signal_emitter(),
                dim,
                blank,
                suspend,
            )
            .await
            {
                debug!("Failed to emit IdleTimeoutsChanged: {}", e);
            }
        }
    }

    async fn emit_config_changed(&self) {
        if let Some(iface) = &self.signals {
            if let Err(e) = PowerService::config_changed(iface.signal_emitter()).await {
                debug!("Failed to emit ConfigChanged: {}", e);
            }
        }
    }

    async fn emit_profile_changed(&self, name: &str) {
        if let Some(iface) = &self.signals {
            if let Err(e) = PowerService::profile_changed(iface.signal_emitter(), name).await {
                debug!("Failed to emit ProfileChanged: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlight::testing::FakeBacklight;
    use crate::idle::testing::FakeIdleSource;
    use crate::session::testing::FakeSession;

    fn test_daemon(config: Config, idle_samples: &[u64]) -> Daemon<FakeSession> {
        let (tx, rx) = mpsc::channel(16);
        let hardware = Hardware::new(Some(Box::new(FakeBacklight::new(80, 100))), None, None);

        Daemon::new(
            config,
            None,
            hardware,
            Box::new(FakeIdleSource::new(idle_samples)),
            FakeSession::new(),
            None,
            None,
            rx,
            tx,
        )
    }

    fn sample(percentage: f64, on_battery: bool) -> BatterySample {
        BatterySample {
            percentage,
            charging: !on_battery,
            on_battery,
            time_to_empty: 0,
            lid_closed: false,
        }
    }

    #[tokio::test]
    async fn test_suspend_refusal_reported_to_caller() {
        let mut daemon = test_daemon(Config::default(), &[0]);
        daemon.session.refuse_suspend = true;

        assert!(!daemon.run_session_op(SessionOp::Suspend).await);
        assert_eq!(daemon.phase, SleepPhase::AwakeUnlocked);
    }

    #[tokio::test]
    async fn test_lock_runs_before_suspend() {
        let mut daemon = test_daemon(Config::default(), &[0]);

        assert!(daemon.run_session_op(SessionOp::Suspend).await);
        assert_eq!(*daemon.session.calls.borrow(), vec!["lock", "suspend"]);
        assert_eq!(daemon.phase, SleepPhase::Suspending);
    }

    #[tokio::test]
    async fn test_suspend_skips_lock_when_disabled() {
        let config = Config {
            lock_on_suspend: false,
            ..Config::default()
        };
        let mut daemon = test_daemon(config, &[0]);

        assert!(daemon.do_suspend().await);
        assert_eq!(*daemon.session.calls.borrow(), vec!["suspend"]);
    }

    #[tokio::test]
    async fn test_deferred_suspend_rechecks_lid_and_power_source() {
        let mut daemon = test_daemon(Config::default(), &[0]);

        // AC attached during the grace period: no suspend.
        daemon.state.lid_closed = true;
        daemon.state.on_battery = false;
        daemon.handle_event(Event::DeferredSuspend).await;
        assert!(daemon.session.calls.borrow().is_empty());

        // Lid reopened during the grace period: no suspend.
        daemon.state.on_battery = true;
        daemon.state.lid_closed = false;
        daemon.handle_event(Event::DeferredSuspend).await;
        assert!(daemon.session.calls.borrow().is_empty());

        // Still closed and on battery: lock, then suspend.
        daemon.state.lid_closed = true;
        daemon.handle_event(Event::DeferredSuspend).await;
        assert_eq!(*daemon.session.calls.borrow(), vec!["lock", "suspend"]);
    }

    #[tokio::test]
    async fn test_idle_suspend_goes_through_lock() {
        // Battery timeouts, idle sample past every threshold.
        let mut daemon = test_daemon(Config::default(), &[1000]);
        daemon.state.on_battery = true;
        daemon.state.timeouts = daemon.config.effective_timeouts(true);

        daemon.on_tick().await;

        assert_eq!(*daemon.session.calls.borrow(), vec!["lock", "suspend"]);
        assert!(daemon.state.screen_dimmed);
        assert!(daemon.state.screen_blanked);
    }

    #[tokio::test]
    async fn test_power_source_transition_resets_cascade() {
        // AC dim threshold is 300 s; the sampler reports 400 s.
        let mut daemon = test_daemon(Config::default(), &[400]);

        daemon.on_tick().await;
        assert!(daemon.state.screen_dimmed);

        daemon.handle_event(Event::BatterySample(sample(80.0, true))).await;

        // Dim reversed, battery thresholds in effect, preset applied.
        assert!(!daemon.state.screen_dimmed);
        assert_eq!(
            daemon.state.timeouts,
            Config::default().effective_timeouts(true)
        );
        assert_eq!(daemon.hardware.screen.as_ref().unwrap().get().unwrap(), 60);
    }

    #[tokio::test]
    async fn test_inhibitor_added_between_ticks_blocks_next_stage() {
        // Two samples past the AC dim threshold.
        let mut daemon = test_daemon(Config::default(), &[400, 401]);

        let (reply, pending) = tokio::sync::oneshot::channel();
        daemon
            .handle_event(Event::Inhibit {
                what: "idle".to_string(),
                who: "player".to_string(),
                why: "video".to_string(),
                reply,
            })
            .await;
        pending.await.unwrap();

        daemon.on_tick().await;
        daemon.on_tick().await;
        assert!(!daemon.state.screen_dimmed);
    }

    #[tokio::test]
    async fn test_danger_level_forces_hibernate() {
        let mut daemon = test_daemon(Config::default(), &[0]);
        daemon.state.on_battery = true;

        let mut reading = sample(2.0, true);
        reading.charging = false;
        daemon.handle_event(Event::BatterySample(reading)).await;

        assert_eq!(*daemon.session.calls.borrow(), vec!["hibernate"]);
    }
}
