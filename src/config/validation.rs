//! Configuration validation

use super::Config;
use crate::protocol::{Ipv4Cidr, MacAddr};
use std::net::Ipv4Addr;

/// Severity of a single finding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Suspicious but runnable; the lock file is still generated
    Warning,
    /// Blocks lock generation
    Error,
}

/// One finding against the configuration
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
}

/// Findings collected by a validation pass, in the order they were made
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, severity: Severity, msg: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            message: msg.into(),
        });
    }

    pub fn warn(&mut self, msg: impl Into<String>) {
        self.push(Severity::Warning, msg);
    }

    pub fn error(&mut self, msg: impl Into<String>) {
        self.push(Severity::Error, msg);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn print_diagnostics(&self) {
        for d in &self.diagnostics {
            let tag = match d.severity {
                Severity::Warning => "WARN",
                Severity::Error => "ERROR",
            };
            eprintln!("[{}] {}", tag, d.message);
        }
    }
}

/// Validate configuration and return warnings/errors
pub fn validate(config: &Config) -> ValidationResult {
    let mut result = ValidationResult::new();

    validate_engine(config, &mut result);
    validate_interfaces(config, &mut result);
    validate_reverse_map(config, &mut result);

    result
}

fn validate_engine(config: &Config, result: &mut ValidationResult) {
    let engine = &config.engine;
    for (field, value) in [
        ("max_cache", engine.max_cache),
        ("max_negative", engine.max_negative),
        ("max_flood", engine.max_flood),
        ("max_pending", engine.max_pending),
    ] {
        if value == 0 {
            result.error(format!("engine.{}: bound must be at least 1", field));
        }
    }

    if engine.flood_max == 0 {
        result.error("engine.flood_max: must be at least 1");
    }
    if engine.flood_window_ms == 0 {
        result.error("engine.flood_window_ms: must be at least 1");
    }
    if engine.probe_num == 0 {
        result.error("engine.probe_num: must be at least 1");
    }
    if engine.announce_num == 0 {
        result.error("engine.announce_num: must be at least 1");
    }
    if engine.retry_interval_ms < 100 {
        result.warn("engine.retry_interval_ms: below 100 ms, retries may flood the segment");
    }
}

fn validate_interfaces(config: &Config, result: &mut ValidationResult) {
    if config.interfaces.is_empty() {
        result.warn("no interfaces configured");
    }

    for (name, iface) in &config.interfaces {
        let subnet = match parse_address(&iface.address) {
            Some((_, subnet)) => Some(subnet),
            None => {
                result.error(format!(
                    "interfaces.{}: address {:?} is not host/prefix CIDR notation",
                    name, iface.address
                ));
                None
            }
        };

        if let Some(mac_str) = &iface.mac {
            match mac_str.parse::<MacAddr>() {
                Ok(mac) if !mac.is_unicast() => {
                    result.error(format!(
                        "interfaces.{}: mac {} is not a unicast address",
                        name, mac
                    ));
                }
                Ok(_) => {}
                Err(_) => {
                    result.error(format!("interfaces.{}: invalid mac {:?}", name, mac_str));
                }
            }
        } else {
            result.warn(format!(
                "interfaces.{}: mac not specified, will be read from the system",
                name
            ));
        }

        if let Some(vid) = iface.vlan {
            if vid == 0 || vid > 4094 {
                result.error(format!(
                    "interfaces.{}: vlan {} is invalid (must be 1-4094)",
                    name, vid
                ));
            }
        }

        if iface.static_entries.len() > config.engine.max_cache {
            result.error(format!(
                "interfaces.{}: {} static entries exceed max_cache ({})",
                name,
                iface.static_entries.len(),
                config.engine.max_cache
            ));
        }

        for (ip_str, mac_str) in &iface.static_entries {
            let ip = match ip_str.parse::<Ipv4Addr>() {
                Ok(ip) => Some(ip),
                Err(_) => {
                    result.error(format!(
                        "interfaces.{}: static entry ip {:?} is invalid",
                        name, ip_str
                    ));
                    None
                }
            };
            match mac_str.parse::<MacAddr>() {
                Ok(mac) if !mac.is_unicast() => {
                    result.error(format!(
                        "interfaces.{}: static entry mac {} is not unicast",
                        name, mac
                    ));
                }
                Ok(_) => {}
                Err(_) => {
                    result.error(format!(
                        "interfaces.{}: static entry mac {:?} is invalid",
                        name, mac_str
                    ));
                }
            }
            if let (Some(ip), Some(subnet)) = (ip, subnet) {
                if !subnet.contains(ip) {
                    result.warn(format!(
                        "interfaces.{}: static entry {} is outside {}",
                        name, ip, subnet
                    ));
                }
            }
        }
    }
}

fn validate_reverse_map(config: &Config, result: &mut ValidationResult) {
    for mac_str in config.reverse_map.keys() {
        match mac_str.parse::<MacAddr>() {
            Ok(mac) if !mac.is_unicast() => {
                result.error(format!("reverse_map: mac {} is not unicast", mac));
            }
            Ok(_) => {}
            Err(_) => {
                result.error(format!("reverse_map: invalid mac {:?}", mac_str));
            }
        }
    }
}

fn parse_address(address: &str) -> Option<(Ipv4Addr, Ipv4Cidr)> {
    let (ip_str, prefix_str) = address.split_once('/')?;
    let ip: Ipv4Addr = ip_str.parse().ok()?;
    let prefix: u8 = prefix_str.parse().ok()?;
    Some((ip, Ipv4Cidr::new(ip, prefix)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterfaceConfig;
    use std::collections::HashMap;

    fn config_with_interface(iface: InterfaceConfig) -> Config {
        Config {
            interfaces: HashMap::from([("lan0".to_string(), iface)]),
            ..Config::default()
        }
    }

    fn valid_interface() -> InterfaceConfig {
        InterfaceConfig {
            mac: Some("02:00:00:00:00:01".to_string()),
            address: "10.0.0.1/24".to_string(),
            vlan: None,
            rarp: false,
            static_entries: HashMap::new(),
        }
    }

    #[test]
    fn test_valid_config_passes() {
        let result = validate(&config_with_interface(valid_interface()));
        assert!(!result.has_errors(), "unexpected findings: {:?}", result);
    }

    #[test]
    fn test_empty_config_warns() {
        let result = validate(&Config::default());
        assert!(!result.has_errors());
        assert!(result.warnings().count() > 0);
    }

    #[test]
    fn test_bad_address_rejected() {
        let mut iface = valid_interface();
        iface.address = "10.0.0.1".to_string();
        let result = validate(&config_with_interface(iface));
        assert!(result.has_errors());
    }

    #[test]
    fn test_bad_prefix_rejected() {
        let mut iface = valid_interface();
        iface.address = "10.0.0.1/40".to_string();
        let result = validate(&config_with_interface(iface));
        assert!(result.has_errors());
    }

    #[test]
    fn test_multicast_mac_rejected() {
        let mut iface = valid_interface();
        iface.mac = Some("01:00:5e:00:00:01".to_string());
        let result = validate(&config_with_interface(iface));
        assert!(result.has_errors());
    }

    #[test]
    fn test_missing_mac_warns() {
        let mut iface = valid_interface();
        iface.mac = None;
        let result = validate(&config_with_interface(iface));
        assert!(!result.has_errors());
        assert!(result.warnings().any(|d| d.message.contains("mac")));
    }

    #[test]
    fn test_vlan_range_checked() {
        let mut iface = valid_interface();
        iface.vlan = Some(4095);
        let result = validate(&config_with_interface(iface));
        assert!(result.has_errors());

        let mut iface = valid_interface();
        iface.vlan = Some(0);
        let result = validate(&config_with_interface(iface));
        assert!(result.has_errors());
    }

    #[test]
    fn test_static_entry_outside_subnet_warns() {
        let mut iface = valid_interface();
        iface.static_entries.insert(
            "192.168.9.9".to_string(),
            "02:00:00:00:00:fe".to_string(),
        );
        let result = validate(&config_with_interface(iface));
        assert!(!result.has_errors());
        assert!(result.warnings().any(|d| d.message.contains("outside")));
    }

    #[test]
    fn test_broadcast_static_mac_rejected() {
        let mut iface = valid_interface();
        iface
            .static_entries
            .insert("10.0.0.9".to_string(), "ff:ff:ff:ff:ff:ff".to_string());
        let result = validate(&config_with_interface(iface));
        assert!(result.has_errors());
    }

    #[test]
    fn test_zero_bounds_rejected() {
        let mut config = config_with_interface(valid_interface());
        config.engine.max_cache = 0;
        let result = validate(&config);
        assert!(result.has_errors());
    }

    #[test]
    fn test_bad_reverse_map_mac_rejected() {
        let mut config = config_with_interface(valid_interface());
        config
            .reverse_map
            .insert("not-a-mac".to_string(), Ipv4Addr::new(10, 0, 0, 42));
        let result = validate(&config);
        assert!(result.has_errors());
    }
}
