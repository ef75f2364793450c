//! Pass-through to the external power-profile provider
//! (power-profiles-daemon).

use std::collections::HashMap;

use anyhow::{Context, Result};
use tracing::debug;
use zbus::Connection;
use zbus::zvariant::OwnedValue;

const PPD_SERVICE: &str = "org.freedesktop.UPower.PowerProfiles";
const PPD_PATH: &str = "/org/freedesktop/UPower/PowerProfiles";
const PPD_INTERFACE: &str = "org.freedesktop.UPower.PowerProfiles";

/// Legacy name used by older power-profiles-daemon releases.
const PPD_LEGACY_SERVICE: &str = "net.hadess.PowerProfiles";
const PPD_LEGACY_PATH: &str = "/net/hadess/PowerProfiles";
const PPD_LEGACY_INTERFACE: &str = "net.hadess.PowerProfiles";

/// Client for the profile daemon; the daemon itself holds no profile state.
pub struct PowerProfiles {
    conn: Connection,
}

impl PowerProfiles {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    async fn proxy(&self) -> Result<zbus::Proxy<'_>> {
        if let Ok(proxy) =
            zbus::Proxy::new(&self.conn, PPD_SERVICE, PPD_PATH, PPD_INTERFACE).await
        {
            if proxy.get_property::<String>("ActiveProfile").await.is_ok() {
                return Ok(proxy);
            }
        }

        debug!("Falling back to legacy power-profiles-daemon name");
        zbus::Proxy::new(
            &self.conn,
            PPD_LEGACY_SERVICE,
            PPD_LEGACY_PATH,
            PPD_LEGACY_INTERFACE,
        )
        .await
        .context("Failed to create PowerProfiles proxy")
    }

    pub async fn active_profile(&self) -> Result<String> {
        let proxy = self.proxy().await?;
        proxy
            .get_property("ActiveProfile")
            .await
            .context("Failed to get ActiveProfile")
    }

    pub async fn set_active_profile(&self, name: &str) -> Result<()> {
        let proxy = self.proxy().await?;
        proxy
            .set_property("ActiveProfile", name)
            .await
            .context("Failed to set ActiveProfile")?;
        Ok(())
    }

    /// Names of the profiles the provider advertises.
    pub async fn profiles(&self) -> Result<Vec<String>> {
        let proxy = self.proxy().await?;
        let raw: Vec<HashMap<String, OwnedValue>> = proxy
            .get_property("Profiles")
            .await
            .context("Failed to get Profiles")?;

        Ok(raw
            .into_iter()
            .filter_map(|entry| {
                entry
                    .get("Profile")
                    .and_then(|v| String::try_from(v.clone()).ok())
            })
            .collect())
    }
}
