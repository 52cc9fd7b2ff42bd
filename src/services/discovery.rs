use local_ip_address::local_ip;
use std::io::ErrorKind;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info};

use crate::models::error::{FarmError, Result};
use crate::DISCOVERY_PORT;

/// Wait for the master's broadcast on the well known port. Best effort,
/// single attempt: one datagram carrying the master's HTTP port as ASCII
/// digits, sender address taken as the master address. Callers compose
/// retries with `BackoffTimer`; there is no retry loop in here.
pub fn discover(timeout: Duration) -> Result<(IpAddr, u16)> {
    discover_on(DISCOVERY_PORT, timeout)
}

pub fn discover_on(port: u16, timeout: Duration) -> Result<(IpAddr, u16)> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, port))?;
    socket.set_broadcast(true)?;
    socket.set_read_timeout(Some(timeout))?;

    let mut buf = [0u8; 64];
    match socket.recv_from(&mut buf) {
        Ok((len, sender)) => {
            let payload = std::str::from_utf8(&buf[..len])
                .map_err(|_| FarmError::Connection("broadcast payload is not ASCII".to_owned()))?;
            let master_port = payload.trim().parse::<u16>().map_err(|_| {
                FarmError::Connection(format!("broadcast payload {payload:?} is not a port"))
            })?;
            info!(address = %sender.ip(), port = master_port, "master server found");
            Ok((sender.ip(), master_port))
        }
        Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
            Err(FarmError::NoMasterFound)
        }
        Err(err) => Err(err.into()),
    }
}

/// Master side counterpart: broadcast our HTTP port once per interval so
/// workers with a `"[default]"` address can find us. Stops on drop.
pub struct Announcer {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Announcer {
    pub fn start(master_port: u16, interval: Duration) -> Result<Self> {
        let target = SocketAddr::from((Ipv4Addr::BROADCAST, DISCOVERY_PORT));
        Self::start_with_target(target, master_port, interval)
    }

    /// Announce to an explicit target address. Production use broadcasts;
    /// tests point this at loopback.
    pub fn start_with_target(
        target: SocketAddr,
        master_port: u16,
        interval: Duration,
    ) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.set_broadcast(true)?;

        let advertised = local_ip()
            .map(|ip| ip.to_string())
            .unwrap_or_else(|_| Ipv4Addr::LOCALHOST.to_string());
        info!(address = %advertised, port = master_port, "announcing master on the network");

        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let payload = master_port.to_string();
        let handle = thread::spawn(move || {
            while !flag.load(Ordering::Relaxed) {
                if let Err(err) = socket.send_to(payload.as_bytes(), target) {
                    debug!("announce send failed: {err}");
                }
                thread::sleep(interval);
            }
        });

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }
}

impl Drop for Announcer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::time::Instant;

    #[test]
    fn times_out_with_no_master_found() {
        let start = Instant::now();
        let result = discover_on(41873, Duration::from_millis(200));
        assert_matches!(result, Err(FarmError::NoMasterFound));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn hears_a_loopback_announcer() {
        let port = 41874;
        let target = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let _announcer =
            Announcer::start_with_target(target, 9123, Duration::from_millis(25)).unwrap();

        let (address, master_port) = discover_on(port, Duration::from_secs(5)).unwrap();
        assert_eq!(master_port, 9123);
        assert_eq!(address, IpAddr::V4(Ipv4Addr::LOCALHOST));
    }
}
