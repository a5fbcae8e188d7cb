use std::{net::Ipv4Addr, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    packet::{BufferId, Ipv4Header, PortId},
};

pub const ETH_TYPE_IPV4: u16 = 0x0800;

/// Where an output action sends a packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputPort {
    /// Every port except the ingress port.
    Flood,
    Port(PortId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Action {
    SetNwSrc(Ipv4Addr),
    SetNwDst(Ipv4Addr),
    Output(OutputPort),
}

/// Header fields a flow rule matches on. `None` is a wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FlowMatch {
    pub eth_type: u16,
    pub nw_src: Option<Ipv4Addr>,
    pub nw_dst: Option<Ipv4Addr>,
    pub nw_proto: Option<u8>,
    pub tp_src: Option<u16>,
    pub tp_dst: Option<u16>,
}

impl FlowMatch {
    /// Match exactly the flow the header belongs to.
    pub fn exact(header: &Ipv4Header) -> Self {
        Self {
            eth_type: ETH_TYPE_IPV4,
            nw_src: Some(header.source),
            nw_dst: Some(header.destination),
            nw_proto: Some(header.protocol),
            tp_src: header.ports.map(|ports| ports.source),
            tp_dst: header.ports.map(|ports| ports.destination),
        }
    }

    /// Match any IPv4 traffic from `source` to `destination`.
    pub fn between(source: Ipv4Addr, destination: Ipv4Addr) -> Self {
        Self {
            eth_type: ETH_TYPE_IPV4,
            nw_src: Some(source),
            nw_dst: Some(destination),
            nw_proto: None,
            tp_src: None,
            tp_dst: None,
        }
    }

    pub fn matches(&self, header: &Ipv4Header) -> bool {
        let field = |want: Option<u16>, got: Option<u16>| want.map_or(true, |w| got == Some(w));
        self.nw_src.map_or(true, |src| src == header.source)
            && self.nw_dst.map_or(true, |dst| dst == header.destination)
            && self.nw_proto.map_or(true, |proto| proto == header.protocol)
            && field(self.tp_src, header.ports.map(|p| p.source))
            && field(self.tp_dst, header.ports.map(|p| p.destination))
    }
}

/// Idle and hard expiry applied to every installed rule, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowTimeouts {
    pub idle_secs: u16,
    pub hard_secs: u16,
}

impl Default for FlowTimeouts {
    fn default() -> Self {
        Self { idle_secs: 10, hard_secs: 10 }
    }
}

impl FlowTimeouts {
    pub fn new(idle_secs: u16, hard_secs: u16) -> Result<Self, ConfigError> {
        let timeouts = Self { idle_secs, hard_secs };
        timeouts.validate()?;
        Ok(timeouts)
    }

    /// A zero timeout means "never expires" to the switch.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.idle_secs == 0 || self.hard_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn idle(&self) -> Duration {
        Duration::from_secs(self.idle_secs as u64)
    }

    pub fn hard(&self) -> Duration {
        Duration::from_secs(self.hard_secs as u64)
    }
}

/// A time-bounded data-plane rule. An empty action list drops matching packets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlowRule {
    pub flow_match: FlowMatch,
    pub actions: Vec<Action>,
    pub timeouts: FlowTimeouts,
    /// Buffered packet the switch applies the rule to on install.
    pub buffer_id: Option<BufferId>,
}

impl FlowRule {
    pub fn is_drop(&self) -> bool {
        self.actions.is_empty()
    }
}

/// One-shot instruction to emit a buffered packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PacketOut {
    pub actions: Vec<Action>,
    pub buffer_id: BufferId,
    pub in_port: PortId,
}
