//! The idle cascade state machine: Active -> Dimmed -> Blanked -> Suspended.
//!
//! Decisions and hardware side effects are split. `IdleCascade::tick`
//! is pure: it looks at the idle sample, the thresholds, and the inhibitor
//! registry, and emits `CascadeAction`s. `Hardware` applies them, with the
//! save/restore discipline for brightness and keyboard backlight.

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::backlight::{Backlight, DisplayPower};
use crate::config::IdleTimeouts;
use crate::inhibit::{InhibitKind, InhibitorRegistry};
use crate::state::PowerState;

/// Idle samples below this count as user activity even without a decrease;
/// it papers over sampler jitter right after input.
const ACTIVITY_FLOOR: Duration = Duration::from_secs(3);

/// Fraction of the saved brightness used while dimmed.
const DIM_FRACTION: f64 = 0.30;

/// What a tick decided to do. Applied in order by the dispatch loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeAction {
    /// User returned: reverse blank, dim and keyboard-off, clear flags.
    Restore,
    Dim,
    Blank,
    Suspend,
}

/// Per-episode trigger state for the cascade.
///
/// Each stage fires at most once per idle episode; only the restore path
/// clears the fired flags. Thresholds are wall-clock idle time, so blank
/// does not depend on dim having fired.
#[derive(Debug, Default)]
pub struct IdleCascade {
    prev_sample: Option<Duration>,
    is_idle: bool,
    dim_fired: bool,
    blank_fired: bool,
    suspend_fired: bool,
}

impl IdleCascade {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_idle(&self) -> bool {
        self.is_idle
    }

    fn any_fired(&self) -> bool {
        self.dim_fired || self.blank_fired || self.suspend_fired
    }

    /// Evaluate one 1 Hz tick.
    pub fn tick(
        &mut self,
        sample: Duration,
        timeouts: IdleTimeouts,
        on_battery: bool,
        registry: &InhibitorRegistry,
    ) -> Vec<CascadeAction> {
        let mut actions = Vec::new();

        // Activity = the idle counter went backwards, or is near zero.
        let active =
            self.prev_sample.is_some_and(|prev| sample < prev) || sample < ACTIVITY_FLOOR;
        self.prev_sample = Some(sample);

        if active {
            if self.any_fired() || self.is_idle {
                debug!("User activity detected, restoring");
                actions.push(CascadeAction::Restore);
            }
            self.clear();
            return actions;
        }

        self.is_idle = true;
        let idle_secs = sample.as_secs();

        if !self.dim_fired
            && timeouts.dim > 0
            && idle_secs >= timeouts.dim
            && !registry.has(InhibitKind::IDLE)
        {
            self.dim_fired = true;
            actions.push(CascadeAction::Dim);
        }

        // Independent of dim: an inhibitor added after dim fired can still
        // block blank.
        if !self.blank_fired
            && timeouts.blank > 0
            && idle_secs >= timeouts.blank
            && !registry.has(InhibitKind::IDLE)
        {
            self.blank_fired = true;
            actions.push(CascadeAction::Blank);
        }

        if on_battery
            && !self.suspend_fired
            && timeouts.suspend > 0
            && idle_secs >= timeouts.suspend
            && !registry.has(InhibitKind::SUSPEND)
        {
            self.suspend_fired = true;
            actions.push(CascadeAction::Suspend);
        }

        actions
    }

    /// Cancel a pending cascade: clear all trigger state and report whether
    /// the caller must run the restore path.
    pub fn reset(&mut self) -> bool {
        let needs_restore = self.any_fired() || self.is_idle;
        self.clear();
        needs_restore
    }

    /// Re-arm trigger flags after a threshold change, without touching the
    /// activity baseline.
    pub fn rearm(&mut self) {
        self.dim_fired = false;
        self.blank_fired = false;
        self.suspend_fired = false;
    }

    fn clear(&mut self) {
        self.is_idle = false;
        self.dim_fired = false;
        self.blank_fired = false;
        self.suspend_fired = false;
    }
}

/// The reversible hardware surfaces the cascade drives.
///
/// Stage failures are logged and swallowed: the trigger flag stays set so a
/// persistently failing write cannot hot-loop, and restore is attempted
/// best-effort on the way back.
pub struct Hardware {
    pub screen: Option<Box<dyn Backlight + Send>>,
    pub keyboard: Option<Box<dyn Backlight + Send>>,
    pub display: Option<Box<dyn DisplayPower + Send>>,
    keyboard_saved: Option<u32>,
}

impl Hardware {
    pub fn new(
        screen: Option<Box<dyn Backlight + Send>>,
        keyboard: Option<Box<dyn Backlight + Send>>,
        display: Option<Box<dyn DisplayPower + Send>>,
    ) -> Self {
        Self {
            screen,
            keyboard,
            display,
            keyboard_saved: None,
        }
    }

    pub fn has_keyboard_backlight(&self) -> bool {
        self.keyboard.is_some()
    }

    /// Dim the screen to 30% of its current level (floored at 1, never
    /// fully off) and switch the keyboard backlight off. Idempotent: a
    /// second dim while already dimmed is a no-op.
    pub fn dim(&mut self, state: &mut PowerState) {
        if state.screen_dimmed {
            return;
        }
        state.screen_dimmed = true;

        if let Some(screen) = self.screen.as_mut() {
            match screen.get() {
                Ok(current) => {
                    state.original_brightness = Some(current);
                    let dimmed = ((f64::from(current) * DIM_FRACTION) as u32).max(1);
                    info!("Dimming screen: {} -> {}", current, dimmed);
                    if let Err(e) = screen.set(dimmed) {
                        warn!("Failed to dim screen: {}", e);
                    }
                }
                Err(e) => warn!("Failed to read brightness before dim: {}", e),
            }
        }

        self.keyboard_off();
    }

    /// Restore the pre-dim brightness exactly and clear the dimmed flag.
    /// A no-op while not dimmed.
    pub fn undim(&mut self, state: &mut PowerState) {
        if !state.screen_dimmed {
            return;
        }
        state.screen_dimmed = false;

        if let Some(original) = state.original_brightness.take() {
            if let Some(screen) = self.screen.as_mut() {
                info!("Restoring screen brightness to {}", original);
                if let Err(e) = screen.set(original) {
                    warn!("Failed to restore brightness: {}", e);
                }
            }
        }

        self.keyboard_restore();
    }

    /// Turn the display off (DPMS). Blanking while blanked is a no-op.
    pub fn blank(&mut self, state: &mut PowerState) {
        if state.screen_blanked {
            return;
        }
        state.screen_blanked = true;

        if let Some(display) = self.display.as_mut() {
            info!("Blanking display");
            if let Err(e) = display.set_on(false) {
                warn!("Failed to blank display: {}", e);
            }
        }
    }

    pub fn unblank(&mut self, state: &mut PowerState) {
        if !state.screen_blanked {
            return;
        }
        state.screen_blanked = false;

        if let Some(display) = self.display.as_mut() {
            info!("Unblanking display");
            if let Err(e) = display.set_on(true) {
                warn!("Failed to unblank display: {}", e);
            }
        }
    }

    /// Full restore path: reverse blank, then dim, then keyboard.
    pub fn restore_all(&mut self, state: &mut PowerState) {
        self.unblank(state);
        self.undim(state);
        state.is_idle = false;
    }

    fn keyboard_off(&mut self) {
        let Some(kb) = self.keyboard.as_mut() else {
            return;
        };
        if self.keyboard_saved.is_some() {
            return;
        }
        match kb.get() {
            Ok(current) => {
                self.keyboard_saved = Some(current);
                if let Err(e) = kb.set(0) {
                    warn!("Failed to switch keyboard backlight off: {}", e);
                }
            }
            Err(e) => warn!("Failed to read keyboard backlight: {}", e),
        }
    }

    fn keyboard_restore(&mut self) {
        let Some(saved) = self.keyboard_saved.take() else {
            return;
        };
        if let Some(kb) = self.keyboard.as_mut() {
            if let Err(e) = kb.set(saved) {
                warn!("Failed to restore keyboard backlight: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backlight::testing::{FakeBacklight, FakeDisplayPower};
    use crate::state::PowerState;

    const TIMEOUTS: IdleTimeouts = IdleTimeouts {
        dim: 120,
        blank: 300,
        suspend: 900,
    };

    fn tick_secs(
        cascade: &mut IdleCascade,
        secs: u64,
        on_battery: bool,
        registry: &InhibitorRegistry,
    ) -> Vec<CascadeAction> {
        cascade.tick(Duration::from_secs(secs), TIMEOUTS, on_battery, registry)
    }

    #[test]
    fn test_no_stage_below_dim_timeout() {
        let mut cascade = IdleCascade::new();
        let registry = InhibitorRegistry::new();

        for t in [0, 10, 60, 119] {
            let actions = tick_secs(&mut cascade, t, true, &registry);
            assert!(
                actions.is_empty(),
                "no action expected at t={t}, got {actions:?}"
            );
        }
    }

    #[test]
    fn test_dim_fires_once_per_episode() {
        let mut cascade = IdleCascade::new();
        let registry = InhibitorRegistry::new();

        assert_eq!(
            tick_secs(&mut cascade, 120, true, &registry),
            vec![CascadeAction::Dim]
        );
        // Repeated ticks past the threshold are idempotent.
        assert!(tick_secs(&mut cascade, 121, true, &registry).is_empty());
        assert!(tick_secs(&mut cascade, 200, true, &registry).is_empty());
    }

    #[test]
    fn test_full_scenario_dim_blank_restore() {
        // dim=120, blank=300, suspend=900, on battery, no inhibitors.
        let mut cascade = IdleCascade::new();
        let registry = InhibitorRegistry::new();

        let mut fired = Vec::new();
        for t in (0..=310).step_by(10) {
            fired.extend(tick_secs(&mut cascade, t, true, &registry));
        }
        assert_eq!(fired, vec![CascadeAction::Dim, CascadeAction::Blank]);
        assert!(cascade.is_idle());

        // Activity: idle drops to 0, both stages reversed within one tick.
        let actions = tick_secs(&mut cascade, 0, true, &registry);
        assert_eq!(actions, vec![CascadeAction::Restore]);
        assert!(!cascade.is_idle());

        // Flags cleared: the next episode can fire again.
        let again = tick_secs(&mut cascade, 130, true, &registry);
        assert_eq!(again, vec![CascadeAction::Dim]);
    }

    #[test]
    fn test_suspend_only_on_battery() {
        let registry = InhibitorRegistry::new();

        let mut on_ac = IdleCascade::new();
        let actions = tick_secs(&mut on_ac, 1000, false, &registry);
        assert!(!actions.contains(&CascadeAction::Suspend));

        let mut on_battery = IdleCascade::new();
        let actions = tick_secs(&mut on_battery, 1000, true, &registry);
        assert!(actions.contains(&CascadeAction::Suspend));
    }

    #[test]
    fn test_idle_inhibitor_blocks_dim_until_removed() {
        let mut cascade = IdleCascade::new();
        let mut registry = InhibitorRegistry::new();
        let id = registry.add("idle", "player", "video");

        assert!(tick_secs(&mut cascade, 150, true, &registry).is_empty());
        assert!(tick_secs(&mut cascade, 200, true, &registry).is_empty());

        // Threshold already exceeded: removal lets the very next tick dim.
        registry.remove(id);
        assert_eq!(
            tick_secs(&mut cascade, 201, true, &registry),
            vec![CascadeAction::Dim]
        );
    }

    #[test]
    fn test_inhibitor_added_after_dim_blocks_blank() {
        let mut cascade = IdleCascade::new();
        let mut registry = InhibitorRegistry::new();

        assert_eq!(
            tick_secs(&mut cascade, 150, true, &registry),
            vec![CascadeAction::Dim]
        );

        registry.add("idle", "late", "joined after dim");
        assert!(tick_secs(&mut cascade, 400, true, &registry).is_empty());
    }

    #[test]
    fn test_suspend_inhibitor_only_blocks_suspend() {
        let mut cascade = IdleCascade::new();
        let mut registry = InhibitorRegistry::new();
        registry.add("suspend", "updater", "installing");

        let actions = tick_secs(&mut cascade, 1000, true, &registry);
        assert_eq!(actions, vec![CascadeAction::Dim, CascadeAction::Blank]);
    }

    #[test]
    fn test_zero_timeout_disables_stage() {
        let mut cascade = IdleCascade::new();
        let registry = InhibitorRegistry::new();
        let timeouts = IdleTimeouts {
            dim: 0,
            blank: 300,
            suspend: 0,
        };

        let actions = cascade.tick(Duration::from_secs(1000), timeouts, true, &registry);
        assert_eq!(actions, vec![CascadeAction::Blank]);
    }

    #[test]
    fn test_activity_floor_counts_as_active() {
        let mut cascade = IdleCascade::new();
        let registry = InhibitorRegistry::new();

        tick_secs(&mut cascade, 150, true, &registry);
        assert!(cascade.is_idle());

        // Sample did not decrease but is under the floor.
        cascade.prev_sample = Some(Duration::from_secs(1));
        let actions = tick_secs(&mut cascade, 2, true, &registry);
        assert_eq!(actions, vec![CascadeAction::Restore]);
    }

    #[test]
    fn test_reset_reports_restore_need() {
        let mut cascade = IdleCascade::new();
        let registry = InhibitorRegistry::new();

        assert!(!cascade.reset());

        tick_secs(&mut cascade, 150, true, &registry);
        assert!(cascade.reset());
        assert!(!cascade.is_idle());
    }

    #[test]
    fn test_rearm_allows_refire_at_new_threshold() {
        let mut cascade = IdleCascade::new();
        let registry = InhibitorRegistry::new();

        tick_secs(&mut cascade, 150, true, &registry);
        cascade.rearm();

        let shorter = IdleTimeouts {
            dim: 60,
            blank: 300,
            suspend: 900,
        };
        let actions = cascade.tick(Duration::from_secs(151), shorter, true, &registry);
        assert_eq!(actions, vec![CascadeAction::Dim]);
    }

    fn test_hardware(brightness: u32) -> (Hardware, PowerState) {
        let hw = Hardware::new(
            Some(Box::new(FakeBacklight::new(brightness, 100))),
            Some(Box::new(FakeBacklight::new(3, 3))),
            Some(Box::new(FakeDisplayPower::new())),
        );
        let state = PowerState::new(TIMEOUTS);
        (hw, state)
    }

    #[test]
    fn test_dim_restore_round_trip() {
        let (mut hw, mut state) = test_hardware(80);

        hw.dim(&mut state);
        assert!(state.screen_dimmed);
        assert_eq!(state.original_brightness, Some(80));
        assert_eq!(hw.screen.as_ref().unwrap().get().unwrap(), 24);

        hw.undim(&mut state);
        assert!(!state.screen_dimmed);
        assert!(state.original_brightness.is_none());
        assert_eq!(hw.screen.as_ref().unwrap().get().unwrap(), 80);
    }

    #[test]
    fn test_dim_floors_at_one() {
        let (mut hw, mut state) = test_hardware(2);
        hw.dim(&mut state);
        assert_eq!(hw.screen.as_ref().unwrap().get().unwrap(), 1);
    }

    #[test]
    fn test_dim_idempotent() {
        let (mut hw, mut state) = test_hardware(80);

        hw.dim(&mut state);
        // Second dim must not clobber the saved value.
        hw.dim(&mut state);
        assert_eq!(state.original_brightness, Some(80));

        hw.undim(&mut state);
        assert_eq!(hw.screen.as_ref().unwrap().get().unwrap(), 80);
    }

    #[test]
    fn test_undim_while_not_dimmed_is_noop() {
        let (mut hw, mut state) = test_hardware(80);
        hw.undim(&mut state);
        assert_eq!(hw.screen.as_ref().unwrap().get().unwrap(), 80);
    }

    #[test]
    fn test_keyboard_save_restore() {
        let (mut hw, mut state) = test_hardware(80);

        hw.dim(&mut state);
        assert_eq!(hw.keyboard.as_ref().unwrap().get().unwrap(), 0);

        hw.undim(&mut state);
        assert_eq!(hw.keyboard.as_ref().unwrap().get().unwrap(), 3);
    }

    #[test]
    fn test_blank_unblank_idempotent() {
        let (mut hw, mut state) = test_hardware(80);

        hw.blank(&mut state);
        hw.blank(&mut state);
        assert!(state.screen_blanked);

        hw.unblank(&mut state);
        assert!(!state.screen_blanked);

        // Exactly one off and one on transition despite the double blank.
        // Downcast through the trait is unavailable, so assert on state only.
        hw.unblank(&mut state);
        assert!(!state.screen_blanked);
    }

    #[test]
    fn test_restore_all_reverses_both_stages() {
        let (mut hw, mut state) = test_hardware(80);
        state.is_idle = true;

        hw.dim(&mut state);
        hw.blank(&mut state);
        hw.restore_all(&mut state);

        assert!(!state.screen_dimmed);
        assert!(!state.screen_blanked);
        assert!(!state.is_idle);
        assert_eq!(hw.screen.as_ref().unwrap().get().unwrap(), 80);
    }

    #[test]
    fn test_failed_dim_write_still_marks_dimmed() {
        let mut failing = FakeBacklight::new(80, 100);
        failing.fail_writes.push_back(());
        let mut hw = Hardware::new(Some(Box::new(failing)), None, None);
        let mut state = PowerState::new(TIMEOUTS);

        hw.dim(&mut state);
        assert!(state.screen_dimmed);
        // Saved brightness is still captured so restore can run.
        assert_eq!(state.original_brightness, Some(80));
    }
}
