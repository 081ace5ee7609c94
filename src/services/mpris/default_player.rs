use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

use super::{MediaError, remote::AppLauncher};

/// MIME type whose default handler stands in for "the music player"
pub const DEFAULT_AUDIO_MIME: &str = "audio/x-vorbis+ogg";

/// Synthetic entry shown while no real player is running
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DefaultPlayerInfo {
    /// Desktop id of the application to launch
    pub desktop_id: String,
    /// Display name derived from the desktop id
    pub identity: String,
    /// Icon name, by convention the desktop id without its suffix
    pub icon: String,
}

impl DefaultPlayerInfo {
    /// Describe the application behind a desktop id
    pub fn from_desktop_id(desktop_id: &str) -> Self {
        let icon = desktop_id.trim_end_matches(".desktop").to_string();
        let short = icon.rsplit('.').next().unwrap_or(&icon);
        let mut chars = short.chars();
        let identity = match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
        Self {
            desktop_id: desktop_id.to_string(),
            identity,
            icon,
        }
    }
}

/// Launches applications through the XDG command line tools
#[derive(Debug, Clone, Copy, Default)]
pub struct XdgLauncher;

#[async_trait]
impl AppLauncher for XdgLauncher {
    async fn default_audio_app(&self) -> Option<String> {
        let output = Command::new("xdg-mime")
            .arg("query")
            .arg("default")
            .arg(DEFAULT_AUDIO_MIME)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| debug!("xdg-mime unavailable: {e}"))
            .ok()?;

        if !output.status.success() {
            return None;
        }
        let desktop_id = String::from_utf8_lossy(&output.stdout).trim().to_string();
        (!desktop_id.is_empty()).then_some(desktop_id)
    }

    async fn launch(&self, desktop_id: &str) -> Result<(), MediaError> {
        let status = Command::new("gtk-launch")
            .arg(desktop_id.trim_end_matches(".desktop"))
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;

        if status.success() {
            Ok(())
        } else {
            Err(MediaError::ControlFailed(format!(
                "gtk-launch {desktop_id} exited with {status}"
            )))
        }
    }
}
