use std::net::Ipv4Addr;

use crate::{
    control::{ControlCommand, ControlPlane},
    error::DispatchError,
    flow::{Action, FlowMatch, FlowRule, FlowTimeouts, OutputPort, PacketOut},
    mapper::{AddressMapping, FixedSet},
    packet::{Packet, PacketIn},
};

/// Outcome of inspecting one inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Non-IPv4 traffic or a fixed destination: emit on all ports, install nothing.
    Flood,
    /// Mapped destination: translate in both directions for the rule lifetime.
    Forward {
        virtual_addr: Ipv4Addr,
        real: Ipv4Addr,
    },
    /// Unknown destination: silently discard the flow until the rule expires.
    Drop,
}

/// Classify a packet against the fixed set and the mapping in effect.
pub fn decide(packet: &Packet, fixed: &FixedSet, mapping: &AddressMapping) -> Decision {
    let header = match packet {
        Packet::Ipv4(header) if !fixed.contains(&header.destination) => header,
        _ => return Decision::Flood,
    };

    match mapping.lookup(&header.destination) {
        Some(real) => Decision::Forward { virtual_addr: header.destination, real },
        None => Decision::Drop,
    }
}

/// Per-packet forwarding decisions. Holds no state across packets.
pub struct FlowDecisionEngine<C> {
    control: C,
    timeouts: FlowTimeouts,
}

impl<C: ControlPlane> FlowDecisionEngine<C> {
    pub fn new(control: C, timeouts: FlowTimeouts) -> Self {
        Self { control, timeouts }
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    pub fn into_control(self) -> C {
        self.control
    }

    pub fn timeouts(&self) -> FlowTimeouts {
        self.timeouts
    }

    /// The control-plane commands that realize `decision` for `event`.
    pub fn commands(&self, event: &PacketIn, decision: &Decision) -> Vec<ControlCommand> {
        let flood = Action::Output(OutputPort::Flood);

        let header = match (decision, event.packet.ipv4()) {
            (Decision::Flood, _) | (_, None) => {
                return vec![ControlCommand::PacketOut(PacketOut {
                    actions: vec![flood],
                    buffer_id: event.buffer_id,
                    in_port: event.in_port,
                })]
            }
            (_, Some(header)) => header,
        };

        match *decision {
            Decision::Forward { virtual_addr, real } => vec![
                ControlCommand::InstallFlow(FlowRule {
                    flow_match: FlowMatch::exact(header),
                    actions: vec![Action::SetNwDst(real), flood],
                    timeouts: self.timeouts,
                    buffer_id: None,
                }),
                ControlCommand::InstallFlow(FlowRule {
                    flow_match: FlowMatch::between(real, header.source),
                    actions: vec![Action::SetNwSrc(virtual_addr), flood],
                    timeouts: self.timeouts,
                    buffer_id: None,
                }),
                ControlCommand::PacketOut(PacketOut {
                    actions: vec![Action::SetNwDst(real), flood],
                    buffer_id: event.buffer_id,
                    in_port: event.in_port,
                }),
            ],
            Decision::Drop => vec![ControlCommand::InstallFlow(FlowRule {
                flow_match: FlowMatch::exact(header),
                actions: vec![],
                timeouts: self.timeouts,
                buffer_id: Some(event.buffer_id),
            })],
            Decision::Flood => vec![],
        }
    }

    /// Decide on `event` and dispatch the resulting commands.
    pub fn handle_packet_in(
        &mut self,
        event: &PacketIn,
        fixed: &FixedSet,
        mapping: &AddressMapping,
    ) -> Result<Decision, DispatchError> {
        let decision = decide(&event.packet, fixed, mapping);

        match (&decision, event.packet.ipv4()) {
            (Decision::Forward { virtual_addr, real }, Some(header)) => {
                log::info!(
                    "Making a connection between {} and {virtual_addr}({real})",
                    header.source
                );
            }
            (Decision::Drop, Some(header)) => {
                log::debug!(
                    "Dropping {} -> {} for {}s",
                    header.source,
                    header.destination,
                    self.timeouts.hard_secs
                );
            }
            _ => log::trace!("Flooding packet from port {}", event.in_port),
        }

        let commands = self.commands(event, &decision);
        self.control.dispatch(commands)?;

        Ok(decision)
    }
}
