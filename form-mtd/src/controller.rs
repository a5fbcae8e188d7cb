use std::sync::Arc;

use rand::RngCore;

use crate::{
    config::MtdConfig,
    control::ControlPlane,
    engine::{Decision, FlowDecisionEngine},
    error::{DispatchError, MtdError, RegenerateError},
    mapper::{AddressMapper, AddressMapping},
    packet::PacketIn,
};

/// Ties the address mapper to the decision engine for one switch connection.
///
/// Packet-in events are expected one at a time; `flush_assignments` is
/// never run concurrently with itself.
pub struct MtdController<C> {
    mapper: AddressMapper,
    engine: FlowDecisionEngine<C>,
}

impl<C: ControlPlane> MtdController<C> {
    /// Validate `config`, build the initial mapping and start serving.
    pub fn new(config: &MtdConfig, control: C) -> Result<Self, MtdError> {
        let mapper = Self::build_mapper(config)?;
        Self::start(config, mapper, control)
    }

    pub fn with_rng(
        config: &MtdConfig,
        control: C,
        rng: impl RngCore + Send + 'static,
    ) -> Result<Self, MtdError> {
        let mapper = Self::build_mapper(config)?.with_rng(rng);
        Self::start(config, mapper, control)
    }

    fn build_mapper(config: &MtdConfig) -> Result<AddressMapper, MtdError> {
        let pool = config.validate()?;
        Ok(AddressMapper::new(config.hosts.clone(), config.fixed_set(), pool)
            .with_max_draw_attempts(config.max_draw_attempts))
    }

    fn start(config: &MtdConfig, mapper: AddressMapper, control: C) -> Result<Self, MtdError> {
        let mut controller = Self {
            mapper,
            engine: FlowDecisionEngine::new(control, config.flow_timeouts),
        };
        controller.flush_assignments()?;

        log::info!("Enabling MTD Module...");
        Ok(controller)
    }

    /// Re-randomize every virtual address. On failure the previous mapping
    /// stays in effect.
    pub fn flush_assignments(&mut self) -> Result<Arc<AddressMapping>, RegenerateError> {
        self.mapper.regenerate().map_err(|e| {
            log::error!(
                "Unable to regenerate mapping, keeping generation {}: {e}",
                self.mapper.current().generation()
            );
            e
        })
    }

    pub fn handle_packet_in(&mut self, event: &PacketIn) -> Result<Decision, DispatchError> {
        let mapping = self.mapper.current();
        self.engine.handle_packet_in(event, self.mapper.fixed(), &mapping)
    }

    pub fn mapping(&self) -> Arc<AddressMapping> {
        self.mapper.current()
    }

    pub fn mapper(&self) -> &AddressMapper {
        &self.mapper
    }

    pub fn control(&self) -> &C {
        self.engine.control()
    }

    pub fn control_mut(&mut self) -> &mut C {
        self.engine.control_mut()
    }
}
