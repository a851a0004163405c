//! Configuration types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::Ipv4Addr;

use crate::engine::EngineSettings;

/// User-defined configuration (arpguard.toml)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineTuning,
    #[serde(default)]
    pub interfaces: HashMap<String, InterfaceConfig>,
    /// MAC to IP assignments served by the RARP responder
    #[serde(default)]
    pub reverse_map: HashMap<String, Ipv4Addr>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InterfaceConfig {
    /// Interface MAC; read from the system when omitted
    pub mac: Option<String>,
    /// CIDR address, e.g. "10.0.0.1/24"
    pub address: String,
    /// 802.1Q VLAN ID applied to engine-originated frames
    pub vlan: Option<u16>,
    /// Serve RARP on this interface
    #[serde(default)]
    pub rarp: bool,
    /// Pinned IP to MAC bindings, immune to protocol updates
    #[serde(default)]
    pub static_entries: HashMap<String, String>,
}

/// Engine tunables. The defaults are the hardening profile; raising the
/// bounds trades memory for tolerance of larger segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineTuning {
    pub dynamic_ttl_ms: u64,
    pub negative_ttl_ms: u64,
    pub flood_window_ms: u64,
    pub flood_max: u32,
    pub max_cache: usize,
    pub max_negative: usize,
    pub max_flood: usize,
    pub max_pending: usize,
    pub probe_num: u8,
    pub announce_num: u8,
    pub defend_interval_ms: u64,
    pub retry_interval_ms: u64,
    pub max_attempts: u8,
}

impl Default for EngineTuning {
    fn default() -> Self {
        let defaults = EngineSettings::default();
        Self {
            dynamic_ttl_ms: defaults.dynamic_ttl_ms,
            negative_ttl_ms: defaults.negative_ttl_ms,
            flood_window_ms: defaults.flood_window_ms,
            flood_max: defaults.flood_max,
            max_cache: defaults.max_cache,
            max_negative: defaults.max_negative,
            max_flood: defaults.max_flood,
            max_pending: defaults.max_pending,
            probe_num: defaults.probe_num,
            announce_num: defaults.announce_num,
            defend_interval_ms: defaults.defend_interval_ms,
            retry_interval_ms: defaults.retry_interval_ms,
            max_attempts: defaults.max_attempts,
        }
    }
}

impl EngineTuning {
    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            dynamic_ttl_ms: self.dynamic_ttl_ms,
            negative_ttl_ms: self.negative_ttl_ms,
            flood_window_ms: self.flood_window_ms,
            flood_max: self.flood_max,
            max_cache: self.max_cache,
            max_negative: self.max_negative,
            max_flood: self.max_flood,
            max_pending: self.max_pending,
            probe_num: self.probe_num,
            announce_num: self.announce_num,
            defend_interval_ms: self.defend_interval_ms,
            retry_interval_ms: self.retry_interval_ms,
            max_attempts: self.max_attempts,
        }
    }
}

// ============================================================================
// Lock file types (generated, includes all defaults)
// ============================================================================

/// Generated lock file with all defaults filled in
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigLock {
    pub generated_at: String,
    pub source_hash: String,
    pub engine: EngineTuning,
    pub interfaces: HashMap<String, InterfaceLock>,
    pub reverse_map: HashMap<String, Ipv4Addr>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterfaceLock {
    /// Concrete MAC, or "auto" to read it from the system at startup
    pub mac: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan: Option<u16>,
    pub rarp: bool,
    pub static_entries: HashMap<String, String>,
}

impl ConfigLock {
    pub fn from_config(config: &Config, source_hash: String) -> Self {
        let interfaces = config
            .interfaces
            .iter()
            .map(|(name, iface)| {
                (
                    name.clone(),
                    InterfaceLock {
                        mac: iface.mac.clone().unwrap_or_else(|| "auto".to_string()),
                        address: iface.address.clone(),
                        vlan: iface.vlan,
                        rarp: iface.rarp,
                        static_entries: iface.static_entries.clone(),
                    },
                )
            })
            .collect();

        ConfigLock {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source_hash,
            engine: config.engine.clone(),
            interfaces,
            reverse_map: config.reverse_map.clone(),
        }
    }

    /// Rebuild the runtime view. "auto" MACs come back as unset; the
    /// daemon resolves them from the system before starting the engine.
    pub fn to_config(&self) -> Config {
        let interfaces = self
            .interfaces
            .iter()
            .map(|(name, iface)| {
                (
                    name.clone(),
                    InterfaceConfig {
                        mac: (iface.mac != "auto").then(|| iface.mac.clone()),
                        address: iface.address.clone(),
                        vlan: iface.vlan,
                        rarp: iface.rarp,
                        static_entries: iface.static_entries.clone(),
                    },
                )
            })
            .collect();

        Config {
            engine: self.engine.clone(),
            interfaces,
            reverse_map: self.reverse_map.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> Config {
        let mut interfaces = HashMap::new();
        interfaces.insert(
            "lan0".to_string(),
            InterfaceConfig {
                mac: None,
                address: "10.0.0.1/24".to_string(),
                vlan: Some(100),
                rarp: true,
                static_entries: HashMap::from([(
                    "10.0.0.254".to_string(),
                    "02:00:00:00:00:fe".to_string(),
                )]),
            },
        );
        Config {
            engine: EngineTuning::default(),
            interfaces,
            reverse_map: HashMap::from([(
                "02:00:00:00:00:42".to_string(),
                Ipv4Addr::new(10, 0, 0, 42),
            )]),
        }
    }

    #[test]
    fn test_tuning_defaults_match_engine() {
        let tuning = EngineTuning::default();
        assert_eq!(tuning.dynamic_ttl_ms, 300_000);
        assert_eq!(tuning.negative_ttl_ms, 60_000);
        assert_eq!(tuning.flood_max, 5);
        assert_eq!(tuning.max_cache, 1024);
        assert_eq!(tuning.max_negative, 256);
        assert_eq!(tuning.max_flood, 512);
        assert_eq!(tuning.max_pending, 128);
    }

    #[test]
    fn test_minimal_toml_gets_defaults() {
        let config: Config = toml::from_str(
            r#"
            [interfaces.lan0]
            address = "10.0.0.1/24"
            "#,
        )
        .unwrap();

        assert_eq!(config.engine.max_cache, 1024);
        let lan0 = &config.interfaces["lan0"];
        assert!(lan0.mac.is_none());
        assert!(!lan0.rarp);
        assert!(lan0.static_entries.is_empty());
    }

    #[test]
    fn test_lock_roundtrip() {
        let config = sample_config();
        let lock = ConfigLock::from_config(&config, "cafebabe".to_string());
        assert_eq!(lock.source_hash, "cafebabe");
        assert_eq!(lock.interfaces["lan0"].mac, "auto");

        let back = lock.to_config();
        let lan0 = &back.interfaces["lan0"];
        assert!(lan0.mac.is_none());
        assert_eq!(lan0.address, "10.0.0.1/24");
        assert_eq!(lan0.vlan, Some(100));
        assert!(lan0.rarp);
        assert_eq!(back.reverse_map.len(), 1);
    }

    #[test]
    fn test_lock_serializes_to_toml() {
        let lock = ConfigLock::from_config(&sample_config(), "hash".to_string());
        let toml_str = toml::to_string_pretty(&lock).unwrap();
        let parsed: ConfigLock = toml::from_str(&toml_str).unwrap();
        assert_eq!(parsed.interfaces["lan0"].address, "10.0.0.1/24");
    }
}
