//! Process-wide power state, owned by the dispatch loop.

use crate::config::IdleTimeouts;

/// Mutable daemon state. Single owner: the dispatch loop in `daemon.rs`.
/// Every field is written from that one task, so no locking is needed.
#[derive(Debug, Clone)]
pub struct PowerState {
    /// Effective cascade thresholds for the current power source.
    pub timeouts: IdleTimeouts,

    /// Whether the last tick confirmed the session idle.
    pub is_idle: bool,

    /// Whether the dim stage has altered the screen.
    pub screen_dimmed: bool,

    /// Whether the blank stage has turned the display off.
    pub screen_blanked: bool,

    /// Brightness saved before dimming. Only meaningful while
    /// `screen_dimmed` is true.
    pub original_brightness: Option<u32>,

    /// Last known battery percentage (0-100).
    pub battery_percentage: f64,

    /// Whether the battery is charging or fully charged.
    pub charging: bool,

    /// Whether the machine currently runs on battery.
    pub on_battery: bool,

    /// Seconds until the battery is empty, 0 when unknown or charging.
    pub time_to_empty: i64,

    /// Last known lid state.
    pub lid_closed: bool,
}

impl PowerState {
    pub fn new(timeouts: IdleTimeouts) -> Self {
        Self {
            timeouts,
            is_idle: false,
            screen_dimmed: false,
            screen_blanked: false,
            original_brightness: None,
            battery_percentage: 100.0,
            charging: false,
            on_battery: false,
            time_to_empty: 0,
            lid_closed: false,
        }
    }

    /// Snapshot reported by `GetIdleState`.
    pub fn idle_snapshot(&self) -> (bool, bool, bool) {
        (self.is_idle, self.screen_dimmed, self.screen_blanked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = PowerState::new(IdleTimeouts {
            dim: 120,
            blank: 300,
            suspend: 900,
        });
        assert!(!state.is_idle);
        assert!(!state.screen_dimmed);
        assert!(!state.screen_blanked);
        assert!(state.original_brightness.is_none());
        assert_eq!(state.idle_snapshot(), (false, false, false));
    }
}
