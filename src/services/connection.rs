use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Read;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

use crate::models::error::{FarmError, Result};
use crate::models::settings::{ClientSettings, DEFAULT_ADDRESS};
use crate::services::discovery;
use crate::services::reporting::Reporter;
use crate::PROTOCOL_VERSION;

/// How long `"[default]"` resolution waits for a master broadcast.
const SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide connect timeout, confined to one injected object instead of
/// a true global. The override guard holds the lock for the whole
/// connection attempt, so one worker's timeout can never leak into
/// another's concurrent attempt, and the previous value comes back on every
/// exit path when the guard drops.
#[derive(Debug)]
pub struct TimeoutPolicy {
    slot: Mutex<Duration>,
}

impl TimeoutPolicy {
    pub fn new(default: Duration) -> Self {
        Self {
            slot: Mutex::new(default),
        }
    }

    pub fn override_for(&self, timeout: Duration) -> TimeoutOverride<'_> {
        let mut guard = self.slot.lock().unwrap_or_else(|e| e.into_inner());
        let previous = *guard;
        *guard = timeout;
        TimeoutOverride { guard, previous }
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

pub struct TimeoutOverride<'a> {
    guard: MutexGuard<'a, Duration>,
    previous: Duration,
}

impl TimeoutOverride<'_> {
    pub fn timeout(&self) -> Duration {
        *self.guard
    }
}

impl Drop for TimeoutOverride<'_> {
    fn drop(&mut self) {
        *self.guard = self.previous;
    }
}

/// A verified transport to a master: base URL plus a blocking agent with
/// the attempt's timeout baked in. Only handed out after the version
/// handshake passed.
#[derive(Debug)]
pub struct Connection {
    agent: ureq::Agent,
    base: String,
}

impl Connection {
    fn open(address: &str, port: u16, use_ssl: bool, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        let scheme = if use_ssl { "https" } else { "http" };
        Self {
            agent,
            base: format!("{scheme}://{address}:{port}"),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    pub fn get_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let response = self.agent.get(&self.url(path)).call()?;
        let mut data = Vec::new();
        response.into_reader().read_to_end(&mut data)?;
        Ok(data)
    }

    pub fn get_string(&self, path: &str) -> Result<String> {
        let response = self.agent.get(&self.url(path)).call()?;
        Ok(response.into_string()?)
    }

    pub fn post_bytes(&self, path: &str, body: &[u8]) -> Result<u16> {
        let response = self.agent.post(&self.url(path)).send_bytes(body)?;
        Ok(response.status())
    }

    pub fn put_bytes(&self, path: &str, body: &[u8]) -> Result<u16> {
        let response = self.agent.put(&self.url(path)).send_bytes(body)?;
        Ok(response.status())
    }

    /// POST a JSON body, expecting either a JSON reply or 204 No Content.
    pub fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Option<R>> {
        let response = self.agent.post(&self.url(path)).send_json(body)?;
        if response.status() == 204 {
            return Ok(None);
        }
        Ok(Some(response.into_json()?))
    }

    /// Version handshake: the master must answer `/version` with success
    /// and a payload byte-for-byte equal to our own protocol version.
    /// Anything else is version drift - fatal for this attempt, never
    /// retried.
    fn verify_version(&self) -> Result<()> {
        let response = match self.agent.get(&self.url("/version")).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => {
                return Err(FarmError::VersionMismatch {
                    expected: PROTOCOL_VERSION.to_owned(),
                    received: format!("HTTP {code}"),
                })
            }
            Err(err) => return Err(err.into()),
        };

        let mut received = Vec::new();
        response.into_reader().read_to_end(&mut received)?;
        if received != PROTOCOL_VERSION.as_bytes() {
            return Err(FarmError::VersionMismatch {
                expected: PROTOCOL_VERSION.to_owned(),
                received: String::from_utf8_lossy(&received).into_owned(),
            });
        }
        Ok(())
    }
}

/// Open a connection to the master named by `settings`, resolving the
/// `"[default]"` address by broadcast scan when `scan` allows it.
///
/// Soft failures come back as `Ok(None)` once the reporter absorbed them
/// (interactive hosts keep running); with `Reporter::Propagate` every
/// failure is raised instead. A `VersionMismatch` always reaches one of the
/// two - it is never silently dropped.
pub fn connect(
    settings: &ClientSettings,
    reporter: &Reporter,
    scan: bool,
    policy: &TimeoutPolicy,
) -> Result<Option<Connection>> {
    let (address, port) = if settings.server_address == DEFAULT_ADDRESS {
        if !scan {
            // caller disabled scanning; fail softly instead of blocking
            return Ok(None);
        }
        match discovery::discover(SCAN_TIMEOUT) {
            Ok((ip, port)) => {
                reporter.info("Master server found");
                (ip.to_string(), port)
            }
            Err(err) => {
                reporter.error(err)?;
                return Ok(None);
            }
        }
    } else {
        (settings.server_address.clone(), settings.server_port)
    };

    debug!(%address, port, "connecting to master");
    let timeout_override = policy.override_for(settings.timeout());
    let conn = Connection::open(&address, port, settings.use_ssl, timeout_override.timeout());
    match conn.verify_version() {
        Ok(()) => Ok(Some(conn)),
        Err(err) => {
            // transport closes when `conn` drops here
            reporter.error(err)?;
            Ok(None)
        }
    }
}
