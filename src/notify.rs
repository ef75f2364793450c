//! User notifications via org.freedesktop.Notifications.

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::{debug, warn};
use zbus::Connection;
use zbus::zvariant::Value;

const NOTIFY_SERVICE: &str = "org.freedesktop.Notifications";
const NOTIFY_PATH: &str = "/org/freedesktop/Notifications";
const NOTIFY_INTERFACE: &str = "org.freedesktop.Notifications";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Urgency {
    Normal,
    Critical,
}

impl Urgency {
    fn hint(self) -> u8 {
        match self {
            Urgency::Normal => 1,
            Urgency::Critical => 2,
        }
    }
}

/// Thin client for the session notification daemon. Failures are logged by
/// the caller and never affect the cascade.
pub struct Notifier {
    conn: Connection,
}

impl Notifier {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub async fn send(&self, summary: &str, body: &str, urgency: Urgency) -> Result<()> {
        let proxy = zbus::Proxy::new(&self.conn, NOTIFY_SERVICE, NOTIFY_PATH, NOTIFY_INTERFACE)
            .await
            .context("Failed to create Notifications proxy")?;

        let mut hints: HashMap<&str, Value<'_>> = HashMap::new();
        hints.insert("urgency", Value::U8(urgency.hint()));

        let id: u32 = proxy
            .call(
                "Notify",
                &(
                    "powerwatchd",
                    0u32,
                    "battery",
                    summary,
                    body,
                    Vec::<&str>::new(),
                    hints,
                    -1i32,
                ),
            )
            .await
            .context("Notify call failed")?;

        debug!("Notification {} sent: {}", id, summary);
        Ok(())
    }

    /// Fire-and-forget variant used by the dispatch loop.
    pub async fn send_or_log(&self, summary: &str, body: &str, urgency: Urgency) {
        if let Err(e) = self.send(summary, body, urgency).await {
            warn!("Failed to send notification '{}': {}", summary, e);
        }
    }
}
