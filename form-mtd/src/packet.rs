use std::net::Ipv4Addr;

use serde::Serialize;

pub const IP_PROTO_ICMP: u8 = 1;
pub const IP_PROTO_TCP: u8 = 6;
pub const IP_PROTO_UDP: u8 = 17;

/// Switch port a packet arrived on.
pub type PortId = u16;

/// Opaque reference to a packet held in the switch's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct BufferId(pub u32);

/// The parsed network layer of an inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Packet {
    /// ARP or any other non-IPv4 traffic.
    NonIp,
    Ipv4(Ipv4Header),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Header {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub protocol: u8,
    /// Transport ports, present for TCP and UDP.
    pub ports: Option<TransportPorts>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportPorts {
    pub source: u16,
    pub destination: u16,
}

impl Ipv4Header {
    pub fn new(source: Ipv4Addr, destination: Ipv4Addr, protocol: u8) -> Self {
        Self { source, destination, protocol, ports: None }
    }

    pub fn tcp(
        source: Ipv4Addr,
        source_port: u16,
        destination: Ipv4Addr,
        destination_port: u16,
    ) -> Self {
        Self::with_ports(source, source_port, destination, destination_port, IP_PROTO_TCP)
    }

    pub fn udp(
        source: Ipv4Addr,
        source_port: u16,
        destination: Ipv4Addr,
        destination_port: u16,
    ) -> Self {
        Self::with_ports(source, source_port, destination, destination_port, IP_PROTO_UDP)
    }

    fn with_ports(
        source: Ipv4Addr,
        source_port: u16,
        destination: Ipv4Addr,
        destination_port: u16,
        protocol: u8,
    ) -> Self {
        Self {
            source,
            destination,
            protocol,
            ports: Some(TransportPorts { source: source_port, destination: destination_port }),
        }
    }
}

impl Packet {
    pub fn ipv4(&self) -> Option<&Ipv4Header> {
        match self {
            Packet::Ipv4(header) => Some(header),
            Packet::NonIp => None,
        }
    }

    pub fn destination(&self) -> Option<Ipv4Addr> {
        self.ipv4().map(|header| header.destination)
    }
}

/// A packet-arrival event as delivered by the control plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketIn {
    pub packet: Packet,
    pub buffer_id: BufferId,
    pub in_port: PortId,
}

impl PacketIn {
    pub fn new(packet: Packet, buffer_id: BufferId, in_port: PortId) -> Self {
        Self { packet, buffer_id, in_port }
    }
}
