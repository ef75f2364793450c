//! Screen and keyboard backlight hardware I/O.
//!
//! Pure hardware access, no policy: discovery under sysfs, raw reads and
//! writes, and DPMS display power toggling. The dim/restore bookkeeping
//! lives with the cascade executor.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use x11rb::connection::Connection;
use x11rb::protocol::dpms::{ConnectionExt as DpmsConnectionExt, DPMSMode};
use x11rb::rust_connection::RustConnection;

/// Path to the screen backlight class on Linux.
const BACKLIGHT_CLASS: &str = "/sys/class/backlight";

/// Path to the LED class; keyboard backlights register here.
const LEDS_CLASS: &str = "/sys/class/leds";

#[derive(Debug, Error)]
pub enum BacklightError {
    #[error("no backlight device available")]
    NotSupported,
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed sysfs value in {path}")]
    Parse { path: PathBuf },
    #[error("display power control failed: {0}")]
    DisplayPower(String),
}

pub type Result<T, E = BacklightError> = std::result::Result<T, E>;

/// Raw brightness access for one backlight device.
pub trait Backlight {
    fn get(&self) -> Result<u32>;
    fn set(&mut self, raw: u32) -> Result<()>;
    fn max(&self) -> u32;
}

/// Display power (DPMS-style on/off), independent of brightness level.
pub trait DisplayPower {
    fn set_on(&mut self, on: bool) -> Result<()>;
}

/// A sysfs-backed backlight device (screen or keyboard LED).
pub struct SysfsBacklight {
    name: String,
    brightness_path: PathBuf,
    max_brightness: u32,
}

impl SysfsBacklight {
    /// Discover the screen backlight, preferring vendor devices
    /// (intel > amd > acpi > rest).
    pub fn discover_screen() -> Option<Self> {
        let mut devices = list_device_dirs(Path::new(BACKLIGHT_CLASS))?;

        devices.sort_by_key(|p| {
            let name = p
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_lowercase();
            if name.contains("intel") {
                0
            } else if name.contains("amd") {
                1
            } else if name.contains("acpi") {
                2
            } else {
                3
            }
        });

        devices.into_iter().find_map(|d| Self::open(&d))
    }

    /// Discover a keyboard backlight LED, if the hardware has one.
    pub fn discover_keyboard() -> Option<Self> {
        let devices = list_device_dirs(Path::new(LEDS_CLASS))?;

        devices
            .into_iter()
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.contains("kbd_backlight"))
            })
            .find_map(|d| Self::open(&d))
    }

    fn open(dir: &Path) -> Option<Self> {
        let brightness_path = dir.join("brightness");
        let max_path = dir.join("max_brightness");
        if !brightness_path.exists() || !max_path.exists() {
            return None;
        }

        let name = dir
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let max_brightness = match read_u32(&max_path) {
            Ok(v) if v > 0 => v,
            Ok(_) => {
                warn!("max_brightness for {} is zero; skipping", name);
                return None;
            }
            Err(e) => {
                warn!("failed to read max_brightness for {}: {}", name, e);
                return None;
            }
        };

        debug!("Using backlight device: {} (max {})", name, max_brightness);
        Some(Self {
            name,
            brightness_path,
            max_brightness,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Backlight for SysfsBacklight {
    fn get(&self) -> Result<u32> {
        read_u32(&self.brightness_path)
    }

    fn set(&mut self, raw: u32) -> Result<()> {
        let value = raw.min(self.max_brightness);
        fs::write(&self.brightness_path, value.to_string()).map_err(|source| {
            BacklightError::Write {
                path: self.brightness_path.clone(),
                source,
            }
        })
    }

    fn max(&self) -> u32 {
        self.max_brightness
    }
}

/// DPMS-based display power control over the X11 connection.
pub struct X11DisplayPower {
    conn: RustConnection,
}

impl X11DisplayPower {
    pub fn connect() -> Result<Self> {
        let (conn, _) = RustConnection::connect(None)
            .map_err(|e| BacklightError::DisplayPower(e.to_string()))?;

        let capable = conn
            .dpms_capable()
            .map_err(|e| BacklightError::DisplayPower(e.to_string()))?
            .reply()
            .map_err(|e| BacklightError::DisplayPower(e.to_string()))?;
        if !capable.capable {
            return Err(BacklightError::NotSupported);
        }

        conn.dpms_enable()
            .map_err(|e| BacklightError::DisplayPower(e.to_string()))?
            .check()
            .map_err(|e| BacklightError::DisplayPower(e.to_string()))?;

        Ok(Self { conn })
    }
}

impl DisplayPower for X11DisplayPower {
    fn set_on(&mut self, on: bool) -> Result<()> {
        let mode = if on { DPMSMode::ON } else { DPMSMode::OFF };
        self.conn
            .dpms_force_level(mode)
            .map_err(|e| BacklightError::DisplayPower(e.to_string()))?
            .check()
            .map_err(|e| BacklightError::DisplayPower(e.to_string()))?;
        self.conn
            .flush()
            .map_err(|e| BacklightError::DisplayPower(e.to_string()))?;
        Ok(())
    }
}

fn list_device_dirs(class: &Path) -> Option<Vec<PathBuf>> {
    if !class.exists() {
        debug!("{} does not exist", class.display());
        return None;
    }

    let entries = match fs::read_dir(class) {
        Ok(it) => it,
        Err(err) => {
            warn!("failed to read {}: {}", class.display(), err);
            return None;
        }
    };

    let dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_dir() || p.is_symlink())
        .collect();

    if dirs.is_empty() { None } else { Some(dirs) }
}

fn read_u32(path: &Path) -> Result<u32> {
    let content = fs::read_to_string(path).map_err(|source| BacklightError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    content
        .trim()
        .parse::<u32>()
        .map_err(|_| BacklightError::Parse {
            path: path.to_path_buf(),
        })
}
