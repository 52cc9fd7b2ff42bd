use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use std::time::Duration;
use std::{env, fs};

use super::error::Result;
use crate::DISCOVERY_PORT;

const SETTINGS_PATH: &str = "NetFarm/";
const CLIENT_FILE_NAME: &str = "ClientSettings.json";
const SERVER_FILE_NAME: &str = "ServerSettings.json";
const JOB_DIR: &str = "FarmJobs/";
const RENDER_DIR: &str = "FarmRenders/";

/// Sentinel address meaning "find the master by broadcast".
pub const DEFAULT_ADDRESS: &str = "[default]";

fn config_path(file_name: &str) -> Result<PathBuf> {
    let path = dirs::config_dir()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no user config directory"))?
        .join(SETTINGS_PATH);
    fs::create_dir_all(&path)?;
    Ok(path.join(file_name))
}

/// How a worker or submitting host reaches the master.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSettings {
    /// Master address, or `"[default]"` to discover one by broadcast.
    pub server_address: String,
    pub server_port: u16,
    pub use_ssl: bool,
    /// Transport timeout for a single connection attempt, in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            server_address: DEFAULT_ADDRESS.to_owned(),
            server_port: DISCOVERY_PORT,
            use_ssl: false,
            connect_timeout_secs: 5,
        }
    }
}

impl ClientSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(config_path(CLIENT_FILE_NAME)?, data)?;
        Ok(())
    }

    /// Load from the user's config directory, falling back to (and saving)
    /// defaults when missing or unreadable.
    pub fn load() -> Self {
        let settings = config_path(CLIENT_FILE_NAME)
            .and_then(|path| Ok(fs::read_to_string(path)?))
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok());
        match settings {
            Some(settings) => settings,
            None => {
                let settings = Self::default();
                let _ = settings.save();
                settings
            }
        }
    }
}

/// Master side storage layout: where uploaded job assets and finished
/// renders live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSetting {
    pub job_dir: PathBuf,
    pub render_dir: PathBuf,
}

impl Default for ServerSetting {
    fn default() -> Self {
        // temp dir by default - the farm storage is a working area, not an
        // archive, and renders move to the submitting host when fetched.
        Self {
            job_dir: env::temp_dir().join(JOB_DIR),
            render_dir: env::temp_dir().join(RENDER_DIR),
        }
    }
}

impl ServerSetting {
    /// Make sure both directories exist before the master starts serving.
    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.job_dir)?;
        fs::create_dir_all(&self.render_dir)?;
        Ok(())
    }

    pub fn save(&self) -> Result<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        fs::write(config_path(SERVER_FILE_NAME)?, data)?;
        Ok(())
    }

    pub fn load() -> Self {
        let settings: Option<ServerSetting> = config_path(SERVER_FILE_NAME)
            .and_then(|path| Ok(fs::read_to_string(path)?))
            .ok()
            .and_then(|data| serde_json::from_str(&data).ok());
        match settings {
            Some(settings) if settings.job_dir.exists() && settings.render_dir.exists() => settings,
            _ => {
                let settings = Self::default();
                let _ = settings.prepare();
                let _ = settings.save();
                settings
            }
        }
    }
}
