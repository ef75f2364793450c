//! Idle-time sampling via the X11 `XScreenSaver` extension.
//!
//! The cascade only needs "elapsed time since last user input"; activity is
//! detected by the sample decreasing, never by an explicit input event.

use std::time::Duration;

use anyhow::{Context, Result};
use x11rb::connection::Connection;
use x11rb::protocol::screensaver::ConnectionExt as ScreensaverConnectionExt;
use x11rb::rust_connection::RustConnection;

/// Source of the elapsed-time-since-input sample.
pub trait IdleSource {
    fn idle_time(&mut self) -> Result<Duration>;
}

/// Idle source backed by `XScreenSaver` `QueryInfo` on the root window.
pub struct X11IdleSource {
    conn: RustConnection,
    root: u32,
}

impl X11IdleSource {
    /// Connect to the X server and verify the extension responds.
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = RustConnection::connect(None)
            .context("Failed to connect to X11 display. Is DISPLAY set?")?;
        let root = conn.setup().roots[screen_num].root;

        conn.screensaver_query_info(root)
            .context("XScreenSaver extension not available")?
            .reply()
            .context("Failed to query XScreenSaver info")?;

        Ok(Self { conn, root })
    }
}

impl IdleSource for X11IdleSource {
    fn idle_time(&mut self) -> Result<Duration> {
        let reply = self
            .conn
            .screensaver_query_info(self.root)
            .context("XScreenSaver query failed")?
            .reply()
            .context("XScreenSaver reply failed")?;

        Ok(Duration::from_millis(u64::from(reply.ms_since_user_input)))
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;

    /// Scripted idle source for cascade tests.
    pub struct FakeIdleSource {
        samples: Vec<Duration>,
        pos: usize,
    }

    impl FakeIdleSource {
        pub fn new(samples_secs: &[u64]) -> Self {
            Self {
                samples: samples_secs
                    .iter()
                    .map(|s| Duration::from_secs(*s))
                    .collect(),
                pos: 0,
            }
        }
    }

    impl IdleSource for FakeIdleSource {
        fn idle_time(&mut self) -> Result<Duration> {
            let sample = self
                .samples
                .get(self.pos)
                .copied()
                .or_else(|| self.samples.last().copied())
                .unwrap_or_default();
            self.pos += 1;
            Ok(sample)
        }
    }

    #[test]
    fn test_fake_source_replays_and_holds_last() {
        let mut source = FakeIdleSource::new(&[1, 2, 3]);
        assert_eq!(source.idle_time().unwrap(), Duration::from_secs(1));
        assert_eq!(source.idle_time().unwrap(), Duration::from_secs(2));
        assert_eq!(source.idle_time().unwrap(), Duration::from_secs(3));
        assert_eq!(source.idle_time().unwrap(), Duration::from_secs(3));
    }
}
