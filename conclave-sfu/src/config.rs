//! SFU Configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Address the engine binds transports to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListenIp {
    /// Local address to listen on
    pub ip: String,
    /// Public address advertised in ICE candidates (for NAT/Docker)
    #[serde(default, alias = "announced_ip", skip_serializing_if = "Option::is_none")]
    pub announced_ip: Option<String>,
}

/// Parameters handed to the engine for every new room transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportOptions {
    pub listen_ips: Vec<ListenIp>,
    pub enable_udp: bool,
    pub enable_tcp: bool,
    pub prefer_udp: bool,
    pub rtc_min_port: u16,
    pub rtc_max_port: u16,
}

impl TransportOptions {
    /// Port for the `n`th transport, cycling through the RTC port range
    #[must_use]
    pub fn port_for(&self, n: u64) -> u16 {
        let span = u64::from(self.rtc_max_port.saturating_sub(self.rtc_min_port)) + 1;
        // n % span < span <= u16::MAX + 1, so the offset fits
        let offset = u16::try_from(n % span).unwrap_or(0);
        self.rtc_min_port.saturating_add(offset)
    }
}

/// SFU configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SfuConfig {
    /// Addresses room transports listen on
    pub listen_ips: Vec<ListenIp>,
    /// Enable UDP ICE candidates
    pub enable_udp: bool,
    /// Enable TCP ICE candidates
    pub enable_tcp: bool,
    /// Prefer UDP over TCP when both are available
    pub prefer_udp: bool,
    /// Lowest port handed to room transports
    pub rtc_min_port: u16,
    /// Highest port handed to room transports
    pub rtc_max_port: u16,
    /// Upper bound on any single engine call (milliseconds)
    pub engine_timeout_ms: u64,
    /// Interval of the empty room sweeper (seconds, 0 = disabled)
    pub empty_room_sweep_secs: u64,
}

impl Default for SfuConfig {
    fn default() -> Self {
        Self {
            listen_ips: vec![ListenIp {
                ip: "0.0.0.0".to_string(),
                announced_ip: Some("127.0.0.1".to_string()),
            }],
            enable_udp: true,
            enable_tcp: true,
            prefer_udp: true,
            rtc_min_port: 40000,
            rtc_max_port: 49999,
            engine_timeout_ms: 10_000,
            empty_room_sweep_secs: 0,
        }
    }
}

impl SfuConfig {
    #[must_use]
    pub fn transport_options(&self) -> TransportOptions {
        TransportOptions {
            listen_ips: self.listen_ips.clone(),
            enable_udp: self.enable_udp,
            enable_tcp: self.enable_tcp,
            prefer_udp: self.prefer_udp,
            rtc_min_port: self.rtc_min_port,
            rtc_max_port: self.rtc_max_port,
        }
    }

    #[must_use]
    pub const fn engine_timeout(&self) -> Duration {
        Duration::from_millis(self.engine_timeout_ms)
    }

    /// Sweep interval, `None` when the sweeper is disabled
    #[must_use]
    pub const fn sweep_interval(&self) -> Option<Duration> {
        if self.empty_room_sweep_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.empty_room_sweep_secs))
        }
    }

    /// Collect every configuration problem instead of stopping at the first
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.listen_ips.is_empty() {
            errors.push("sfu.listen_ips must contain at least one address".to_string());
        }
        for listen in &self.listen_ips {
            if listen.ip.parse::<std::net::IpAddr>().is_err() {
                errors.push(format!("sfu.listen_ips: invalid ip '{}'", listen.ip));
            }
        }
        if !self.enable_udp && !self.enable_tcp {
            errors.push("sfu: at least one of enable_udp / enable_tcp must be set".to_string());
        }
        if self.rtc_min_port == 0 || self.rtc_min_port > self.rtc_max_port {
            errors.push(format!(
                "sfu: invalid rtc port range {}-{}",
                self.rtc_min_port, self.rtc_max_port
            ));
        }
        if self.engine_timeout_ms == 0 {
            errors.push("sfu.engine_timeout_ms must be greater than zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = SfuConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.sweep_interval().is_none());

        let options = config.transport_options();
        assert!(options.enable_udp && options.enable_tcp && options.prefer_udp);
        assert_eq!(options.listen_ips.len(), 1);
    }

    #[test]
    fn test_validate_reports_all_errors() {
        let config = SfuConfig {
            listen_ips: vec![ListenIp {
                ip: "not-an-ip".to_string(),
                announced_ip: None,
            }],
            enable_udp: false,
            enable_tcp: false,
            rtc_min_port: 50000,
            rtc_max_port: 40000,
            engine_timeout_ms: 0,
            ..SfuConfig::default()
        };

        let errors = config.validate().unwrap_err();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_ports_cycle_within_range() {
        let options = SfuConfig {
            rtc_min_port: 40000,
            rtc_max_port: 40002,
            ..SfuConfig::default()
        }
        .transport_options();

        let ports: Vec<u16> = (0..5).map(|n| options.port_for(n)).collect();
        assert_eq!(ports, vec![40000, 40001, 40002, 40000, 40001]);
        assert_eq!(options.port_for(u64::MAX), 40000);

        let full = SfuConfig {
            rtc_min_port: 1,
            rtc_max_port: u16::MAX,
            ..SfuConfig::default()
        }
        .transport_options();
        assert_eq!(full.port_for(u64::from(u16::MAX) - 1), u16::MAX);
        assert_eq!(full.port_for(u64::from(u16::MAX)), 1);
    }
}
