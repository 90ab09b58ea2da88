//! Run configuration (§6, SPEC_FULL §3): encapsulation and per-family IP
//! options, parsed from YAML text and validated before planning starts.
//! Reading the YAML bytes off disk is the driver's job, not the core's.

use ipnet::IpNet;
use serde::{Deserialize, Serialize};

use crate::constants::ETHERNET_HEADER_SIZE;
use crate::error::{FlowError, Result};

/// One layer contributed by an encapsulation variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncapsulationLayer {
    Vlan { id: u16 },
    Mpls { label: u32 },
}

/// A candidate encapsulation: a probability weight plus the ordered layers
/// it contributes to the stack if chosen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncapsulationVariant {
    pub probability: f64,
    pub layers: Vec<EncapsulationLayer>,
}

/// Per-IP-family knobs: candidate address ranges and fragmentation policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpFamilyConfig {
    pub ranges: Vec<IpNet>,
    pub fragmentation_probability: f64,
    pub min_packet_size_to_fragment: usize,
}

impl IpFamilyConfig {
    fn validate(&self, family: &str) -> Result<()> {
        if !(0.0..=1.0).contains(&self.fragmentation_probability) {
            return Err(FlowError::InvalidConfig(format!(
                "{family}.fragmentation_probability must be in [0, 1], got {}",
                self.fragmentation_probability
            )));
        }
        if self.min_packet_size_to_fragment < ETHERNET_HEADER_SIZE {
            return Err(FlowError::InvalidConfig(format!(
                "{family}.min_packet_size_to_fragment ({}) is smaller than the L2 header size",
                self.min_packet_size_to_fragment
            )));
        }
        Ok(())
    }
}

/// Top-level run configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub encapsulation: Vec<EncapsulationVariant>,
    pub ipv4: IpFamilyConfig,
    pub ipv6: IpFamilyConfig,
}

impl Config {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Config =
            serde_yaml::from_str(text).map_err(|e| FlowError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects malformed probability weights and fragmentation thresholds
    /// below the L2 header size (§7 `InvalidConfig`).
    pub fn validate(&self) -> Result<()> {
        for variant in &self.encapsulation {
            if variant.probability < 0.0 {
                return Err(FlowError::InvalidConfig(format!(
                    "encapsulation variant probability must be non-negative, got {}",
                    variant.probability
                )));
            }
        }
        self.ipv4.validate("ipv4")?;
        self.ipv6.validate("ipv6")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_yaml() -> &'static str {
        r#"
encapsulation:
  - probability: 0.3
    layers:
      - vlan:
          id: 100
  - probability: 0.7
    layers:
      - mpls:
          label: 42
ipv4:
  ranges: ["10.0.0.0/8"]
  fragmentation_probability: 0.1
  min_packet_size_to_fragment: 1400
ipv6:
  ranges: ["fd00::/8"]
  fragmentation_probability: 0.05
  min_packet_size_to_fragment: 1400
"#
    }

    #[test]
    fn parses_a_well_formed_config() {
        let config = Config::from_yaml_str(sample_yaml()).unwrap();
        assert_eq!(config.encapsulation.len(), 2);
        assert_eq!(config.ipv4.ranges.len(), 1);
    }

    #[test]
    fn rejects_fragmentation_threshold_below_l2_header() {
        let mut config = Config::from_yaml_str(sample_yaml()).unwrap();
        config.ipv4.min_packet_size_to_fragment = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_fragmentation_probability() {
        let mut config = Config::from_yaml_str(sample_yaml()).unwrap();
        config.ipv6.fragmentation_probability = 1.5;
        assert!(config.validate().is_err());
    }
}
