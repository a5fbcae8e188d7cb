pub mod prefix;
pub mod mapper;
pub mod packet;
pub mod flow;
pub mod control;
pub mod engine;
pub mod controller;
pub mod config;
pub mod error;

pub use config::MtdConfig;
pub use control::{ChannelControlPlane, CommandLog, ControlCommand, ControlPlane};
pub use controller::MtdController;
pub use engine::{decide, Decision, FlowDecisionEngine};
pub use error::{ConfigError, DispatchError, MtdError, RegenerateError};
pub use mapper::{AddressMapper, AddressMapping, FixedSet};
pub use packet::{BufferId, Ipv4Header, Packet, PacketIn};
pub use prefix::{Prefix, PrefixPool};
