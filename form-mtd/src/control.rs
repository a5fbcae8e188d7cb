use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    error::DispatchError,
    flow::{FlowRule, PacketOut},
};

/// The commands the decision engine needs from a switch connection.
///
/// Implementations are expected to be fire-and-forget: a call returns once
/// the command has been handed off, not once the switch has applied it.
pub trait ControlPlane {
    fn send_packet_out(&mut self, packet_out: PacketOut) -> Result<(), DispatchError>;

    fn install_flow_rule(&mut self, rule: FlowRule) -> Result<(), DispatchError>;

    /// Hand off every command produced for one decision, in order.
    ///
    /// The default forwards them one at a time and stops at the first
    /// error. Transports that can fail part way should override this so a
    /// decision is delivered whole or not at all.
    fn dispatch(&mut self, commands: Vec<ControlCommand>) -> Result<(), DispatchError> {
        for command in commands {
            match command {
                ControlCommand::PacketOut(packet_out) => self.send_packet_out(packet_out)?,
                ControlCommand::InstallFlow(rule) => self.install_flow_rule(rule)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ControlCommand {
    PacketOut(PacketOut),
    InstallFlow(FlowRule),
}

/// Keeps every dispatched command in order.
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    commands: Vec<ControlCommand>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn commands(&self) -> &[ControlCommand] {
        &self.commands
    }

    pub fn flow_rules(&self) -> Vec<&FlowRule> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                ControlCommand::InstallFlow(rule) => Some(rule),
                _ => None,
            })
            .collect()
    }

    pub fn packet_outs(&self) -> Vec<&PacketOut> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                ControlCommand::PacketOut(packet_out) => Some(packet_out),
                _ => None,
            })
            .collect()
    }

    pub fn drain(&mut self) -> Vec<ControlCommand> {
        std::mem::take(&mut self.commands)
    }
}

impl ControlPlane for CommandLog {
    fn send_packet_out(&mut self, packet_out: PacketOut) -> Result<(), DispatchError> {
        self.commands.push(ControlCommand::PacketOut(packet_out));
        Ok(())
    }

    fn install_flow_rule(&mut self, rule: FlowRule) -> Result<(), DispatchError> {
        self.commands.push(ControlCommand::InstallFlow(rule));
        Ok(())
    }
}

/// Hands commands to an async switch transport. Each decision travels as
/// one batch, so the transport sees either all of its commands or none.
#[derive(Debug, Clone)]
pub struct ChannelControlPlane {
    tx: mpsc::UnboundedSender<Vec<ControlCommand>>,
}

impl ChannelControlPlane {
    pub fn new(tx: mpsc::UnboundedSender<Vec<ControlCommand>>) -> Self {
        Self { tx }
    }

    /// Builds a control plane and the receiving end the transport drains.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Vec<ControlCommand>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl ControlPlane for ChannelControlPlane {
    fn send_packet_out(&mut self, packet_out: PacketOut) -> Result<(), DispatchError> {
        self.dispatch(vec![ControlCommand::PacketOut(packet_out)])
    }

    fn install_flow_rule(&mut self, rule: FlowRule) -> Result<(), DispatchError> {
        self.dispatch(vec![ControlCommand::InstallFlow(rule)])
    }

    fn dispatch(&mut self, commands: Vec<ControlCommand>) -> Result<(), DispatchError> {
        if commands.is_empty() {
            return Ok(());
        }
        self.tx.send(commands).map_err(|_| DispatchError::ChannelClosed)
    }
}
