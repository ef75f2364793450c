//! Inhibitor lease registry.
//!
//! Other processes take leases that suppress cascade stages. The cascade
//! only ever asks "is this kind inhibited"; enumeration exists solely for
//! the `ListInhibitors` report.

use tracing::debug;

/// Bitset over the cascade categories an inhibitor suppresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InhibitKind(u8);

impl InhibitKind {
    pub const IDLE: InhibitKind = InhibitKind(0b001);
    pub const SUSPEND: InhibitKind = InhibitKind(0b010);
    pub const SHUTDOWN: InhibitKind = InhibitKind(0b100);

    /// Classify a free-text `what` argument by prefix.
    ///
    /// Unrecognized strings fall back to IDLE|SUSPEND, matching what most
    /// callers of the org.freedesktop-style Inhibit API expect.
    pub fn classify(what: &str) -> Self {
        let what = what.to_ascii_lowercase();
        if what.starts_with("idle") {
            Self::IDLE
        } else if what.starts_with("suspend") || what.starts_with("sleep") {
            Self::SUSPEND
        } else if what.starts_with("shutdown") {
            Self::SHUTDOWN
        } else {
            Self(Self::IDLE.0 | Self::SUSPEND.0)
        }
    }

    pub fn intersects(self, other: InhibitKind) -> bool {
        self.0 & other.0 != 0
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

/// An active "do not do X" lease held by another process.
#[derive(Debug, Clone)]
pub struct Inhibitor {
    pub id: u32,
    pub app_name: String,
    pub reason: String,
    pub kind: InhibitKind,
}

/// In-memory table of active inhibitors.
///
/// Ids are monotonic for the process lifetime and never reused. Removal is
/// owner-less: any caller knowing an id may remove it. That mirrors the
/// behavior shells rely on (e.g. a panel toggling an inhibitor it did not
/// create); see DESIGN.md for the authorization discussion.
#[derive(Debug, Default)]
pub struct InhibitorRegistry {
    inhibitors: Vec<Inhibitor>,
    next_id: u32,
}

impl InhibitorRegistry {
    pub fn new() -> Self {
        Self {
            inhibitors: Vec::new(),
            next_id: 1,
        }
    }

    /// Register a new inhibitor and return its cookie.
    pub fn add(&mut self, what: &str, who: &str, why: &str) -> u32 {
        let id = self.next_id;
        self.next_id += 1;

        let kind = InhibitKind::classify(what);
        debug!("Inhibitor {} added: who={} what={} why={}", id, who, what, why);

        self.inhibitors.push(Inhibitor {
            id,
            app_name: who.to_string(),
            reason: why.to_string(),
            kind,
        });
        id
    }

    /// Remove an inhibitor by cookie. A miss is a silent no-op.
    pub fn remove(&mut self, id: u32) {
        let before = self.inhibitors.len();
        self.inhibitors.retain(|i| i.id != id);
        if self.inhibitors.len() < before {
            debug!("Inhibitor {} removed", id);
        }
    }

    /// Whether any active inhibitor suppresses the given kind.
    pub fn has(&self, kind: InhibitKind) -> bool {
        self.inhibitors.iter().any(|i| i.kind.intersects(kind))
    }

    /// All active inhibitors, for the `ListInhibitors` report.
    pub fn list(&self) -> &[Inhibitor] {
        &self.inhibitors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_prefixes() {
        assert_eq!(InhibitKind::classify("idle"), InhibitKind::IDLE);
        assert_eq!(InhibitKind::classify("idle:dim"), InhibitKind::IDLE);
        assert_eq!(InhibitKind::classify("suspend"), InhibitKind::SUSPEND);
        assert_eq!(InhibitKind::classify("sleep"), InhibitKind::SUSPEND);
        assert_eq!(InhibitKind::classify("shutdown"), InhibitKind::SHUTDOWN);
        assert_eq!(InhibitKind::classify("Idle"), InhibitKind::IDLE);
    }

    #[test]
    fn test_classify_fallback() {
        let kind = InhibitKind::classify("block-everything");
        assert!(kind.intersects(InhibitKind::IDLE));
        assert!(kind.intersects(InhibitKind::SUSPEND));
        assert!(!kind.intersects(InhibitKind::SHUTDOWN));
    }

    #[test]
    fn test_ids_monotonic_and_unique() {
        let mut registry = InhibitorRegistry::new();
        let a = registry.add("idle", "app-a", "presentation");
        let b = registry.add("suspend", "app-b", "download");
        assert!(b > a);

        registry.remove(a);
        let c = registry.add("idle", "app-c", "video");
        // Removed ids are never reused
        assert!(c > b);
    }

    #[test]
    fn test_add_then_list() {
        let mut registry = InhibitorRegistry::new();
        registry.add("idle", "player", "playing video");

        let list = registry.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].app_name, "player");
        assert_eq!(list[0].reason, "playing video");
        assert_eq!(list[0].kind, InhibitKind::IDLE);
    }

    #[test]
    fn test_has_intersection() {
        let mut registry = InhibitorRegistry::new();
        assert!(!registry.has(InhibitKind::IDLE));

        let id = registry.add("unknown", "app", "reason");
        assert!(registry.has(InhibitKind::IDLE));
        assert!(registry.has(InhibitKind::SUSPEND));
        assert!(!registry.has(InhibitKind::SHUTDOWN));

        registry.remove(id);
        assert!(!registry.has(InhibitKind::IDLE));
        assert!(registry.list().is_empty());
    }

    #[test]
    fn test_remove_miss_is_noop() {
        let mut registry = InhibitorRegistry::new();
        let id = registry.add("idle", "app", "reason");
        registry.remove(9999);
        assert_eq!(registry.list().len(), 1);
        registry.remove(id);
        registry.remove(id);
        assert!(registry.list().is_empty());
    }
}
