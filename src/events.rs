//! Typed messages consumed by the dispatch loop.
//!
//! Everything that mutates `PowerState` arrives here: D-Bus method calls,
//! monitor samples, and lid/sleep notifications. Queries carry a oneshot
//! reply channel back to the caller.

use tokio::sync::oneshot;

use crate::battery::BatterySample;

pub type Reply<T> = oneshot::Sender<T>;

/// Session-manager primitives exposed over the service boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOp {
    Shutdown,
    Reboot,
    Suspend,
    Hibernate,
    Logout,
    LockScreen,
}

/// Policy strings the shell reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyKey {
    LidAction,
    PowerButtonAction,
    CriticalAction,
}

#[derive(Debug)]
pub enum Event {
    // Cascade tuning and forced reset.
    SimulateActivity,
    SetIdleTimeouts {
        dim: u64,
        blank: u64,
        suspend: u64,
    },
    GetIdleTimeouts {
        reply: Reply<(u64, u64, u64)>,
    },
    GetIdleState {
        reply: Reply<(bool, bool, bool)>,
    },

    // Inhibitor lease lifecycle.
    Inhibit {
        what: String,
        who: String,
        why: String,
        reply: Reply<u32>,
    },
    UnInhibit {
        id: u32,
    },
    ListInhibitors {
        reply: Reply<Vec<(u32, String, String, u8)>>,
    },

    // Screen backlight.
    GetBrightness {
        reply: Reply<Option<u32>>,
    },
    SetBrightness {
        value: u32,
    },
    GetMaxBrightness {
        reply: Reply<Option<u32>>,
    },

    // Keyboard backlight.
    GetKeyboardBrightness {
        reply: Reply<Option<u32>>,
    },
    SetKeyboardBrightness {
        value: u32,
    },
    HasKeyboardBacklight {
        reply: Reply<bool>,
    },

    // Battery.
    BatterySample(BatterySample),
    GetBatteryInfo {
        reply: Reply<(f64, bool, i64)>,
    },
    GetBatteryLevels {
        reply: Reply<(f64, f64, f64)>,
    },
    SetBatteryLevels {
        low: f64,
        critical: f64,
        danger: f64,
    },

    // Lid and sleep orchestration.
    GetLidState {
        reply: Reply<bool>,
    },
    PrepareForSleep(bool),
    /// Delayed lid-close suspend, sent by a timer task.
    DeferredSuspend,

    // Session-manager primitives.
    Session {
        op: SessionOp,
        reply: Reply<bool>,
    },

    // Policy strings.
    GetPolicy {
        key: PolicyKey,
        reply: Reply<String>,
    },
    SetPolicy {
        key: PolicyKey,
        value: String,
    },

    // Config lifecycle.
    SaveConfig {
        reply: Reply<bool>,
    },
    ReloadConfig {
        reply: Reply<bool>,
    },
    ResetConfig {
        reply: Reply<bool>,
    },

    // Power profile pass-through.
    GetActiveProfile {
        reply: Reply<String>,
    },
    SetActiveProfile {
        name: String,
        reply: Reply<bool>,
    },
    GetProfiles {
        reply: Reply<Vec<String>>,
    },
}
