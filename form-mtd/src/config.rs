use std::{net::Ipv4Addr, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    flow::FlowTimeouts,
    mapper::{FixedSet, DEFAULT_MAX_DRAW_ATTEMPTS},
    prefix::PrefixPool,
};

/// Operator configuration, loaded once at startup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MtdConfig {
    /// Infrastructure addresses that are never mutated.
    pub fixed_addresses: Vec<Ipv4Addr>,
    /// Real addresses of the hosts to protect.
    pub hosts: Vec<Ipv4Addr>,
    /// CIDR blocks virtual addresses are drawn from.
    pub networks: Vec<String>,
    pub flow_timeouts: FlowTimeouts,
    pub max_draw_attempts: usize,
}

impl Default for MtdConfig {
    fn default() -> Self {
        Self {
            fixed_addresses: vec![Ipv4Addr::new(172, 0, 0, 1), Ipv4Addr::new(172, 0, 0, 11)],
            hosts: vec![Ipv4Addr::new(100, 0, 0, 7)],
            networks: vec![
                "140.0.0.0/16".to_string(),
                "150.0.0.0/8".to_string(),
                "160.0.0.0/8".to_string(),
                "170.0.0.0/16".to_string(),
            ],
            flow_timeouts: FlowTimeouts::default(),
            max_draw_attempts: DEFAULT_MAX_DRAW_ATTEMPTS,
        }
    }
}

impl MtdConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        contents.parse()
    }

    /// Parse every network and check the timeouts. The pool is returned so
    /// callers do not parse twice.
    pub fn validate(&self) -> Result<PrefixPool, ConfigError> {
        self.flow_timeouts.validate()?;
        PrefixPool::from_cidrs(&self.networks)
    }

    pub fn fixed_set(&self) -> FixedSet {
        self.fixed_addresses.iter().copied().collect()
    }
}

impl std::str::FromStr for MtdConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(toml::from_str(s)?)
    }
}
