pub mod models;
pub mod services;

/// Protocol version exchanged during the `/version` handshake. The master
/// answers the raw bytes of this string and a client only talks to a master
/// whose reply matches byte for byte - anything else is a version drift that
/// requires an upgrade, not a retry.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Well known UDP port workers listen on for the master broadcast.
pub const DISCOVERY_PORT: u16 = 8000;
