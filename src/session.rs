//! Session-manager integration: suspend/hibernate primitives over
//! systemd-logind, the screen-lock command, and the pre-sleep/wake watcher.

use std::env;

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio::sync::mpsc::Sender;
use tracing::{debug, error, info, warn};
use zbus::Connection;

use crate::events::Event;

const LOGIND_SERVICE: &str = "org.freedesktop.login1";
const LOGIND_PATH: &str = "/org/freedesktop/login1";
const MANAGER_INTERFACE: &str = "org.freedesktop.login1.Manager";

/// Phases of the lid/sleep orchestration.
///
/// AwakeUnlocked -> Locking -> Suspending -> (wake) -> AwakeUnlocked.
/// Tracked for bookkeeping; every transition is driven by the dispatch
/// loop, so the phase can never be mutated concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SleepPhase {
    #[default]
    AwakeUnlocked,
    Locking,
    Suspending,
}

impl SleepPhase {
    /// Lock requested (lid close or pre-sleep).
    pub fn begin_lock(self) -> Self {
        SleepPhase::Locking
    }

    /// Suspend handed to the session manager.
    pub fn begin_suspend(self) -> Self {
        SleepPhase::Suspending
    }

    /// Wake signal: back to a clean slate whatever we were doing.
    pub fn wake(self) -> Self {
        SleepPhase::AwakeUnlocked
    }
}

/// The session-manager primitives the dispatch loop drives.
///
/// Every primitive returns a success boolean: refusals are logged and
/// surfaced to the caller, never escalated into a daemon crash.
#[allow(async_fn_in_trait)]
pub trait SessionControl {
    fn set_lock_command(&mut self, command: String);
    fn lock_screen(&self) -> bool;
    async fn suspend(&self) -> bool;
    async fn hibernate(&self) -> bool;
    async fn power_off(&self) -> bool;
    async fn reboot(&self) -> bool;
    async fn logout(&self) -> bool;

    /// Hibernate, falling back to poweroff. The danger-battery path: data
    /// loss prevention outranks graceful degradation, so the fallback is
    /// unconditional.
    async fn hibernate_or_power_off(&self) -> bool {
        if self.hibernate().await {
            return true;
        }
        warn!("Hibernate failed, falling back to PowerOff");
        self.power_off().await
    }
}

/// Client for logind power primitives plus the configured lock command.
pub struct SessionManager {
    conn: Connection,
    lock_command: String,
    dry_run: bool,
}

impl SessionManager {
    pub fn new(conn: Connection, lock_command: String, dry_run: bool) -> Self {
        Self {
            conn,
            lock_command,
            dry_run,
        }
    }

    async fn manager_call(&self, method: &str) -> bool {
        if self.dry_run {
            info!("[DRY RUN] Would call logind {}", method);
            return true;
        }

        let proxy =
            match zbus::Proxy::new(&self.conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    error!("Failed to create Manager proxy: {}", e);
                    return false;
                }
            };

        // false = no interactive polkit prompt.
        match proxy.call::<_, _, ()>(method, &(false,)).await {
            Ok(()) => {
                info!("logind {} requested", method);
                true
            }
            Err(e) => {
                error!("logind {} failed: {}", method, e);
                false
            }
        }
    }
}

impl SessionControl for SessionManager {
    fn set_lock_command(&mut self, command: String) {
        self.lock_command = command;
    }

    async fn suspend(&self) -> bool {
        self.manager_call("Suspend").await
    }

    async fn hibernate(&self) -> bool {
        self.manager_call("Hibernate").await
    }

    async fn power_off(&self) -> bool {
        self.manager_call("PowerOff").await
    }

    async fn reboot(&self) -> bool {
        self.manager_call("Reboot").await
    }

    /// Terminate the caller's logind session.
    async fn logout(&self) -> bool {
        let Ok(session_id) = env::var("XDG_SESSION_ID") else {
            error!("Cannot logout: XDG_SESSION_ID not set");
            return false;
        };

        if self.dry_run {
            info!("[DRY RUN] Would terminate session {}", session_id);
            return true;
        }

        let proxy =
            match zbus::Proxy::new(&self.conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
                .await
            {
                Ok(p) => p,
                Err(e) => {
                    error!("Failed to create Manager proxy: {}", e);
                    return false;
                }
            };

        match proxy.call::<_, _, ()>("TerminateSession", &(session_id.as_str(),)).await {
            Ok(()) => true,
            Err(e) => {
                error!("TerminateSession failed: {}", e);
                false
            }
        }
    }

    /// Spawn the configured lock command. Returns true if the process
    /// started; completion is not awaited.
    fn lock_screen(&self) -> bool {
        let mut parts = self.lock_command.split_whitespace();
        let Some(program) = parts.next() else {
            warn!("Lock command is empty");
            return false;
        };

        if self.dry_run {
            info!("[DRY RUN] Would run lock command: {}", self.lock_command);
            return true;
        }

        match tokio::process::Command::new(program).args(parts).spawn() {
            Ok(_) => {
                info!("Lock command spawned: {}", self.lock_command);
                true
            }
            Err(e) => {
                error!("Failed to spawn lock command '{}': {}", self.lock_command, e);
                false
            }
        }
    }
}

/// Forwards logind `PrepareForSleep` signals into the event loop.
///
/// `PrepareForSleep(true)` arrives before the OS suspends; `false` on wake.
pub struct SleepWatcher;

impl SleepWatcher {
    pub fn spawn(conn: Connection, tx: Sender<Event>) {
        tokio::spawn(async move {
            if let Err(e) = Self::run(conn, tx).await {
                error!("Sleep watcher failed: {}", e);
            }
        });
    }

    async fn run(conn: Connection, tx: Sender<Event>) -> Result<()> {
        let proxy = zbus::Proxy::new(&conn, LOGIND_SERVICE, LOGIND_PATH, MANAGER_INTERFACE)
            .await
            .context("Failed to create Manager proxy")?;

        let mut stream = proxy
            .receive_signal("PrepareForSleep")
            .await
            .context("Failed to subscribe to PrepareForSleep")?;

        info!("Listening for PrepareForSleep");

        while let Some(msg) = stream.next().await {
            match msg.body().deserialize::<bool>() {
                Ok(start) => {
                    debug!("PrepareForSleep({})", start);
                    if tx.send(Event::PrepareForSleep(start)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Malformed PrepareForSleep signal: {}", e),
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use std::cell::RefCell;

    /// Records session-manager calls in order; can refuse suspend.
    pub struct FakeSession {
        pub calls: RefCell<Vec<&'static str>>,
        pub refuse_suspend: bool,
        pub lock_command: String,
    }

    impl FakeSession {
        pub fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                refuse_suspend: false,
                lock_command: "loginctl lock-session".to_string(),
            }
        }
    }

    impl SessionControl for FakeSession {
        fn set_lock_command(&mut self, command: String) {
            self.lock_command = command;
        }

        fn lock_screen(&self) -> bool {
            self.calls.borrow_mut().push("lock");
            true
        }

        async fn suspend(&self) -> bool {
            self.calls.borrow_mut().push("suspend");
            !self.refuse_suspend
        }

        async fn hibernate(&self) -> bool {
            self.calls.borrow_mut().push("hibernate");
            true
        }

        async fn power_off(&self) -> bool {
            self.calls.borrow_mut().push("poweroff");
            true
        }

        async fn reboot(&self) -> bool {
            self.calls.borrow_mut().push("reboot");
            true
        }

        async fn logout(&self) -> bool {
            self.calls.borrow_mut().push("logout");
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_phase_transitions() {
        let phase = SleepPhase::default();
        assert_eq!(phase, SleepPhase::AwakeUnlocked);

        let phase = phase.begin_lock();
        assert_eq!(phase, SleepPhase::Locking);

        let phase = phase.begin_suspend();
        assert_eq!(phase, SleepPhase::Suspending);

        let phase = phase.wake();
        assert_eq!(phase, SleepPhase::AwakeUnlocked);
    }

    #[test]
    fn test_wake_from_any_phase() {
        assert_eq!(SleepPhase::Locking.wake(), SleepPhase::AwakeUnlocked);
        assert_eq!(SleepPhase::Suspending.wake(), SleepPhase::AwakeUnlocked);
        assert_eq!(SleepPhase::AwakeUnlocked.wake(), SleepPhase::AwakeUnlocked);
    }
}
