//! Handshake constants shared by client and server
//!
//! The host launches the plugin with `MAGIC_COOKIE_KEY=MAGIC_COOKIE_VALUE` in
//! its environment. The plugin answers with a single stdout line
//! `CORE|PROTOCOL|NETWORK|TRANSPORT` before any RPC traffic.

use std::time::Duration;

pub const CORE_PROTOCOL_VERSION: u32 = 1;
pub const PROTOCOL_VERSION: u32 = 1;
pub const MAGIC_COOKIE_KEY: &str = "JSONNET_PLUGIN";
pub const MAGIC_COOKIE_VALUE: &str = "9af0e0b1-a9c4-47ed-a8c2-fc740428f447";

/// Executable base names must carry this prefix; the rest is the plugin name.
pub const PLUGIN_PREFIX: &str = "jsonnet-plugin-";

/// Registered service and its single method
pub const SERVICE: &str = "invoker";
pub const INVOKE_METHOD: &str = "invoker.Invoke";

const NETWORK: &str = "stdio";
const TRANSPORT: &str = "jsonrpc";

/// How long the host waits for the handshake line
pub const START_TIMEOUT: Duration = Duration::from_secs(60);

/// The line a plugin prints once it is ready
pub fn handshake_line() -> String {
    format!("{}|{}|{}|{}", CORE_PROTOCOL_VERSION, PROTOCOL_VERSION, NETWORK, TRANSPORT)
}

/// Validate a handshake line received from a plugin
pub fn check_handshake(line: &str) -> Result<(), String> {
    let parts: Vec<&str> = line.trim().split('|').collect();
    let [core, protocol, network, transport] = parts.as_slice() else {
        return Err(format!("malformed handshake line {:?}", line.trim()));
    };
    if *core != CORE_PROTOCOL_VERSION.to_string() {
        return Err(format!(
            "incompatible core protocol version {}, expected {}",
            core, CORE_PROTOCOL_VERSION
        ));
    }
    if *protocol != PROTOCOL_VERSION.to_string() {
        return Err(format!(
            "incompatible plugin protocol version {}, expected {}",
            protocol, PROTOCOL_VERSION
        ));
    }
    if *network != NETWORK || *transport != TRANSPORT {
        return Err(format!("unsupported transport {}/{}", network, transport));
    }
    Ok(())
}

/// Whether this process was launched by a host
pub fn cookie_present() -> bool {
    std::env::var(MAGIC_COOKIE_KEY).is_ok_and(|v| v == MAGIC_COOKIE_VALUE)
}

/// Logical plugin name for an executable base name
pub fn plugin_name(base: &str) -> Option<&str> {
    base.strip_prefix(PLUGIN_PREFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_line_accepted() {
        assert_eq!(handshake_line(), "1|1|stdio|jsonrpc");
        assert!(check_handshake(&format!("{}\n", handshake_line())).is_ok());
    }

    #[test]
    fn test_protocol_mismatch_rejected() {
        let err = check_handshake("1|2|stdio|jsonrpc").unwrap_err();
        assert!(err.contains("plugin protocol version 2"));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(check_handshake("hello world").is_err());
    }

    #[test]
    fn test_plugin_name() {
        assert_eq!(plugin_name("jsonnet-plugin-math"), Some("math"));
        assert_eq!(plugin_name("math"), None);
    }
}
