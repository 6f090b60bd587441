use std::sync::Arc;

use iopmesh_events::{BroadcastTransport, EventStreamHub};
use iopmesh_protocol::{AgentName, Category, Definition, IopResult, Mapping, TransportPort};
use tracing::info;

use crate::agent::Agent;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: AgentName,
    /// Capacity of the outbound broadcast hub created when no transport is given.
    pub event_buffer: usize,
    /// Re-run the resolver when a delivery arrives with a stale value type.
    pub resolve_on_type_mismatch: bool,
    /// Ask each newly subscribed publisher to resend its current value.
    pub request_outputs_from_mapped_agents: bool,
}

impl AgentConfig {
    pub fn new(name: impl Into<AgentName>) -> Self {
        Self {
            name: name.into(),
            event_buffer: 1024,
            resolve_on_type_mismatch: true,
            request_outputs_from_mapped_agents: false,
        }
    }
}

pub struct AgentBuilder {
    config: AgentConfig,
    transport: Option<Arc<dyn TransportPort>>,
    categories: Vec<Arc<Category>>,
    definition: Option<Definition>,
    mapping: Option<Mapping>,
}

impl AgentBuilder {
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            transport: None,
            categories: Vec::new(),
            definition: None,
            mapping: None,
        }
    }

    pub fn event_buffer(mut self, event_buffer: usize) -> Self {
        self.config.event_buffer = event_buffer;
        self
    }

    pub fn resolve_on_type_mismatch(mut self, enabled: bool) -> Self {
        self.config.resolve_on_type_mismatch = enabled;
        self
    }

    pub fn request_outputs_from_mapped_agents(mut self, enabled: bool) -> Self {
        self.config.request_outputs_from_mapped_agents = enabled;
        self
    }

    /// Route side effects to `transport` instead of a private broadcast hub.
    pub fn transport(mut self, transport: Arc<dyn TransportPort>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Register a category template in the local catalog.
    pub fn category(mut self, category: Arc<Category>) -> Self {
        self.categories.push(category);
        self
    }

    pub fn definition(mut self, definition: Definition) -> Self {
        self.definition = Some(definition);
        self
    }

    pub fn mapping(mut self, mapping: Mapping) -> Self {
        self.mapping = Some(mapping);
        self
    }

    pub fn build(self) -> IopResult<Agent> {
        let (transport, hub) = match self.transport {
            Some(transport) => (transport, None),
            None => {
                let hub = EventStreamHub::new(self.config.event_buffer);
                let transport: Arc<dyn TransportPort> =
                    Arc::new(BroadcastTransport::new(self.config.name.clone(), hub.clone()));
                (transport, Some(hub))
            }
        };

        let definition = match self.definition {
            Some(definition) => definition,
            None => Definition::new(self.config.name.as_str())?,
        };

        let mut agent = Agent::assemble(self.config, transport, hub, &definition)?;
        for category in self.categories {
            agent.register_category(category);
        }
        agent.load_definition(definition)?;
        if let Some(mapping) = self.mapping {
            agent.load_mapping(mapping)?;
        }
        info!(
            agent = %agent.name(),
            inputs = agent.iop_count(iopmesh_protocol::IopKind::Input),
            mappings = agent.mapping_count(),
            "agent built"
        );
        Ok(agent)
    }
}
