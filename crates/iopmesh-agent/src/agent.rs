use std::fmt;
use std::sync::Arc;

use iopmesh_events::EventStreamHub;
use iopmesh_protocol::{
    AgentName, Call, Category, Definition, Iop, IopError, IopKind, IopResult, IopTable, IopValue,
    MapState, Mapping, MappingEntry, MappingId, MappingRule, ObserverId, TransportPort, ValueType,
};
use iopmesh_registry::IopRegistry;
use iopmesh_resolver::{
    CategoryCatalog, LinkKey, LinkState, MappingTable, PeerDirectory, ResolveContext,
    SubscriptionChange,
};
use tracing::{debug, info, instrument, trace, warn};

use crate::config::AgentConfig;

/// Outcome of one inbound value: local inputs written, and per-input failures.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeliveryReport {
    pub written: Vec<String>,
    pub failed: Vec<(String, IopError)>,
}

impl DeliveryReport {
    /// No mapping entry routed the value anywhere.
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.failed.is_empty()
    }
}

/// Outcome of a batch of peer changes resolved in one pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerBatchReport {
    pub changes: Vec<SubscriptionChange>,
    /// Peers whose definition was rejected; they are treated as absent.
    pub rejected: Vec<(AgentName, IopError)>,
}

/// Callback for agent-wide mute or freeze transitions, given the new flag.
pub type StatusObserver = Arc<dyn Fn(&mut Agent, bool) + Send + Sync>;

pub struct Agent {
    config: AgentConfig,
    definition: Definition,
    registry: IopRegistry<Agent>,
    mappings: MappingTable,
    peers: PeerDirectory,
    categories: CategoryCatalog,
    transport: Arc<dyn TransportPort>,
    hub: Option<EventStreamHub>,
    state: String,
    muted: bool,
    frozen: bool,
    mute_observers: Vec<(ObserverId, StatusObserver)>,
    freeze_observers: Vec<(ObserverId, StatusObserver)>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.config.name)
            .field("definition", &self.definition.name)
            .field("registry", &self.registry)
            .field("mappings", &self.mappings.len())
            .field("peers", &self.peers.len())
            .field("state", &self.state)
            .field("muted", &self.muted)
            .field("frozen", &self.frozen)
            .finish()
    }
}

impl Agent {
    pub(crate) fn assemble(
        config: AgentConfig,
        transport: Arc<dyn TransportPort>,
        hub: Option<EventStreamHub>,
        definition: &Definition,
    ) -> IopResult<Self> {
        Ok(Self {
            definition: Definition::new(definition.name.clone())?,
            config,
            registry: IopRegistry::new(),
            mappings: MappingTable::new(),
            peers: PeerDirectory::new(),
            categories: CategoryCatalog::new(),
            transport,
            hub,
            state: String::new(),
            muted: false,
            frozen: false,
            mute_observers: Vec::new(),
            freeze_observers: Vec::new(),
        })
    }

    pub fn name(&self) -> &AgentName {
        &self.config.name
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    /// Broadcast hub the agent publishes to, when built without a transport.
    pub fn hub(&self) -> Option<&EventStreamHub> {
        self.hub.as_ref()
    }

    pub fn registry(&self) -> &IopRegistry<Agent> {
        &self.registry
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn peers(&self) -> &PeerDirectory {
        &self.peers
    }

    pub fn categories(&self) -> &CategoryCatalog {
        &self.categories
    }

    fn resolve(&mut self) -> Vec<SubscriptionChange> {
        let ctx = ResolveContext {
            local: self.registry.table(),
            peers: &self.peers,
            categories: &self.categories,
        };
        let changes = self.mappings.resolve(ctx, self.transport.as_ref());
        if self.config.request_outputs_from_mapped_agents {
            for change in changes.iter().filter(|change| change.active) {
                trace!(peer = %change.agent, output = %change.output, "current value requested");
                self.transport.output_requested(&change.agent, &change.output);
            }
        }
        changes
    }

    /// Free-form status string, e.g. a step in a scenario.
    pub fn state(&self) -> &str {
        &self.state
    }

    pub fn set_state(&mut self, state: impl Into<String>) {
        let state = state.into();
        if state != self.state {
            info!(agent = %self.config.name, from = %self.state, to = %state, "agent state changed");
            self.state = state;
        }
    }

    pub fn request_outputs_from_mapped_agents(&self) -> bool {
        self.config.request_outputs_from_mapped_agents
    }

    pub fn set_request_outputs_from_mapped_agents(&mut self, enabled: bool) {
        self.config.request_outputs_from_mapped_agents = enabled;
    }

    // ---- definition ----

    pub fn definition(&self) -> &Definition {
        &self.definition
    }

    /// Replace the local definition. Live values restart from the declared
    /// ones; observers and mapping entries are kept and re-resolved.
    #[instrument(skip_all, fields(agent = %self.config.name, definition = %definition.name))]
    pub fn load_definition(&mut self, definition: Definition) -> IopResult<Vec<SubscriptionChange>> {
        definition.validate()?;
        let table = definition.effective_table()?;
        self.registry.replace_table(table);
        self.definition = definition;
        info!(
            inputs = self.registry.count(IopKind::Input),
            outputs = self.registry.count(IopKind::Output),
            parameters = self.registry.count(IopKind::Parameter),
            "definition loaded"
        );
        Ok(self.resolve())
    }

    pub fn load_definition_json(&mut self, json: &str) -> IopResult<Vec<SubscriptionChange>> {
        self.load_definition(Definition::from_json(json)?)
    }

    /// Drop every IOP and category while keeping the definition name.
    #[instrument(skip_all, fields(agent = %self.config.name))]
    pub fn clear_definition(&mut self) -> IopResult<Vec<SubscriptionChange>> {
        self.definition = Definition::new(self.definition.name.clone())?;
        self.registry.replace_table(IopTable::new());
        info!("definition cleared");
        Ok(self.resolve())
    }

    /// The definition with current values and mute flags of own IOPs.
    pub fn export_definition(&self) -> IopResult<Definition> {
        let mut exported = Definition::new(self.definition.name.clone())?
            .with_description(self.definition.description.clone())
            .with_version(self.definition.version.clone());
        for category in self.definition.categories() {
            exported.add_category(category.clone())?;
        }
        for call in self.definition.calls() {
            exported.add_call(call.clone())?;
        }
        for (kind, declared) in self.definition.own_iops().iter_all() {
            let live = self
                .registry
                .find(kind, declared.name())
                .cloned()
                .unwrap_or_else(|| declared.clone());
            exported.add_iop(kind, live)?;
        }
        Ok(exported)
    }

    pub fn export_definition_json(&self) -> IopResult<String> {
        self.export_definition()?.to_json()
    }

    pub fn set_definition_name(&mut self, name: impl Into<String>) -> IopResult<()> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(IopError::InvalidName(name));
        }
        self.definition.name = name;
        Ok(())
    }

    pub fn set_definition_description(&mut self, description: impl Into<String>) {
        self.definition.description = description.into();
    }

    pub fn set_definition_version(&mut self, version: impl Into<String>) {
        self.definition.version = version.into();
    }

    /// Adopt a category in the local definition; its members become live IOPs.
    #[instrument(skip_all, fields(agent = %self.config.name, category = %category.name))]
    pub fn add_category(&mut self, category: Arc<Category>) -> IopResult<Vec<SubscriptionChange>> {
        self.definition.add_category(category.clone())?;
        for (kind, iop) in category.iops.iter_all() {
            self.registry
                .create(kind, iop.name(), iop.value_type(), Some(iop.value().clone()))?;
        }
        debug!("category adopted");
        Ok(self.resolve())
    }

    /// Make a category template known locally for category mapping entries.
    pub fn register_category(&mut self, category: Arc<Category>) -> Vec<SubscriptionChange> {
        debug!(category = %category.name, "category registered");
        self.categories.register(category);
        self.resolve()
    }

    pub fn unregister_category(&mut self, name: &str) -> Vec<SubscriptionChange> {
        if self.categories.unregister(name).is_none() {
            return Vec::new();
        }
        debug!(category = name, "category unregistered");
        self.resolve()
    }

    // ---- calls ----

    /// Declare a call on the local definition.
    pub fn add_call(&mut self, call: Call) -> IopResult<()> {
        debug!(agent = %self.config.name, call = %call.name, "call declared");
        self.definition.add_call(call)
    }

    pub fn remove_call(&mut self, name: &str) -> IopResult<Call> {
        self.definition.remove_call(name)
    }

    pub fn add_argument_to_call(
        &mut self,
        call: &str,
        argument: &str,
        value_type: ValueType,
    ) -> IopResult<()> {
        self.definition.add_argument_to_call(call, argument, value_type)
    }

    pub fn remove_argument_from_call(&mut self, call: &str, argument: &str) -> IopResult<()> {
        self.definition.remove_argument_from_call(call, argument)
    }

    pub fn call_exists(&self, name: &str) -> bool {
        self.definition.has_call(name)
    }

    pub fn call_count(&self) -> usize {
        self.definition.calls().len()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.definition.call_names()
    }

    // ---- IOPs ----

    /// Declare an own IOP. A new input may complete pending mapping entries;
    /// the resulting subscription changes are returned.
    #[instrument(skip(self, initial), fields(agent = %self.config.name))]
    pub fn create_iop(
        &mut self,
        kind: IopKind,
        name: &str,
        value_type: ValueType,
        initial: Option<IopValue>,
    ) -> IopResult<Vec<SubscriptionChange>> {
        let iop = self.registry.create(kind, name, value_type, initial)?.clone();
        if let Err(err) = self.definition.add_iop(kind, iop) {
            self.registry.remove(kind, name)?;
            return Err(err);
        }
        if kind != IopKind::Input {
            return Ok(Vec::new());
        }
        Ok(self.resolve())
    }

    pub fn create_input(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> IopResult<Vec<SubscriptionChange>> {
        self.create_iop(IopKind::Input, name, value_type, None)
    }

    pub fn create_output(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> IopResult<Vec<SubscriptionChange>> {
        self.create_iop(IopKind::Output, name, value_type, None)
    }

    pub fn create_parameter(
        &mut self,
        name: &str,
        value_type: ValueType,
    ) -> IopResult<Vec<SubscriptionChange>> {
        self.create_iop(IopKind::Parameter, name, value_type, None)
    }

    /// Remove an own IOP. Entries mapped onto a removed input drop to OFF.
    #[instrument(skip(self), fields(agent = %self.config.name))]
    pub fn remove_iop(&mut self, kind: IopKind, name: &str) -> IopResult<Vec<SubscriptionChange>> {
        self.definition.remove_iop(kind, name)?;
        self.registry.remove(kind, name)?;
        if kind != IopKind::Input {
            return Ok(Vec::new());
        }
        Ok(self.resolve())
    }

    pub fn iop_exists(&self, kind: IopKind, name: &str) -> bool {
        self.registry.exists(kind, name)
    }

    pub fn iop_count(&self, kind: IopKind) -> usize {
        self.registry.count(kind)
    }

    pub fn iop_names(&self, kind: IopKind) -> Vec<String> {
        self.registry.names(kind)
    }

    pub fn iop(&self, kind: IopKind, name: &str) -> Option<&Iop> {
        self.registry.find(kind, name)
    }

    pub fn value_type(&self, kind: IopKind, name: &str) -> IopResult<ValueType> {
        self.registry.value_type(kind, name)
    }

    pub fn read(&self, kind: IopKind, name: &str) -> IopResult<&IopValue> {
        self.registry.read(kind, name)
    }

    pub fn read_as_int(&self, kind: IopKind, name: &str) -> IopResult<i64> {
        self.registry.read_as_int(kind, name)
    }

    pub fn read_as_double(&self, kind: IopKind, name: &str) -> IopResult<f64> {
        self.registry.read_as_double(kind, name)
    }

    pub fn read_as_bool(&self, kind: IopKind, name: &str) -> IopResult<bool> {
        self.registry.read_as_bool(kind, name)
    }

    pub fn read_as_string(&self, kind: IopKind, name: &str) -> IopResult<String> {
        self.registry.read_as_string(kind, name)
    }

    pub fn read_as_data(&self, kind: IopKind, name: &str) -> IopResult<Vec<u8>> {
        self.registry.read_as_data(kind, name)
    }

    /// Strict write; publishes when `kind` is an output and nothing mutes it.
    /// Observers run last.
    pub fn write(&mut self, kind: IopKind, name: &str, value: IopValue) -> IopResult<()> {
        self.check_writable(kind)?;
        let pending = self.registry.write(kind, name, value)?;
        self.publish(kind, name);
        pending.fire(self);
        Ok(())
    }

    /// Write after a best-effort conversion into the declared type.
    pub fn write_as(&mut self, kind: IopKind, name: &str, value: IopValue) -> IopResult<()> {
        self.check_writable(kind)?;
        let pending = self.registry.write_as(kind, name, value)?;
        self.publish(kind, name);
        pending.fire(self);
        Ok(())
    }

    pub fn write_as_int(&mut self, kind: IopKind, name: &str, value: i64) -> IopResult<()> {
        self.write_as(kind, name, IopValue::Integer(value))
    }

    pub fn write_as_double(&mut self, kind: IopKind, name: &str, value: f64) -> IopResult<()> {
        self.write_as(kind, name, IopValue::Double(value))
    }

    pub fn write_as_bool(&mut self, kind: IopKind, name: &str, value: bool) -> IopResult<()> {
        self.write_as(kind, name, IopValue::Bool(value))
    }

    pub fn write_as_string(&mut self, kind: IopKind, name: &str, value: &str) -> IopResult<()> {
        self.write_as(kind, name, IopValue::from(value))
    }

    pub fn write_as_impulsion(&mut self, kind: IopKind, name: &str) -> IopResult<()> {
        let declared = self.value_type(kind, name)?;
        self.write(kind, name, IopValue::default_for(declared))
    }

    pub fn write_as_data(&mut self, kind: IopKind, name: &str, value: &[u8]) -> IopResult<()> {
        self.write_as(kind, name, IopValue::Data(value.to_vec()))
    }

    /// Reset a value to the default of its type without notifying anyone.
    pub fn clear_data(&mut self, kind: IopKind, name: &str) -> IopResult<()> {
        self.registry.clear_data(kind, name)
    }

    fn check_writable(&self, kind: IopKind) -> IopResult<()> {
        if self.frozen && kind == IopKind::Input {
            return Err(IopError::Frozen);
        }
        Ok(())
    }

    fn publish(&self, kind: IopKind, name: &str) {
        if kind != IopKind::Output {
            return;
        }
        let Some(iop) = self.registry.find(kind, name) else {
            return;
        };
        if self.muted || iop.is_muted() {
            trace!(output = name, "publish suppressed by mute");
            return;
        }
        self.transport
            .publish_requested(iop.name(), iop.value_type(), &iop.value().to_wire());
    }

    // ---- mute / freeze ----

    pub fn mute_output(&mut self, name: &str) -> IopResult<()> {
        self.registry.set_output_muted(name, true)
    }

    pub fn unmute_output(&mut self, name: &str) -> IopResult<()> {
        self.registry.set_output_muted(name, false)
    }

    pub fn is_output_muted(&self, name: &str) -> IopResult<bool> {
        self.registry.is_output_muted(name)
    }

    /// Suppress every publish while still updating local state.
    pub fn mute(&mut self) {
        self.set_muted(true);
    }

    pub fn unmute(&mut self) {
        self.set_muted(false);
    }

    fn set_muted(&mut self, muted: bool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        info!(agent = %self.config.name, muted, "agent mute changed");
        let observers: Vec<StatusObserver> =
            self.mute_observers.iter().map(|(_, cb)| cb.clone()).collect();
        for observer in observers {
            observer(self, muted);
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Drop inbound deliveries and reject local input writes.
    pub fn freeze(&mut self) {
        self.set_frozen(true);
    }

    pub fn unfreeze(&mut self) {
        self.set_frozen(false);
    }

    fn set_frozen(&mut self, frozen: bool) {
        if self.frozen == frozen {
            return;
        }
        self.frozen = frozen;
        info!(agent = %self.config.name, frozen, "agent freeze changed");
        let observers: Vec<StatusObserver> =
            self.freeze_observers.iter().map(|(_, cb)| cb.clone()).collect();
        for observer in observers {
            observer(self, frozen);
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    // ---- observers ----

    /// Observe one IOP. The callback runs after the write (and its publish)
    /// with the agent itself, so it may read other IOPs or write outputs.
    pub fn observe(
        &mut self,
        kind: IopKind,
        name: &str,
        callback: impl Fn(&mut Agent, IopKind, &Iop) + Send + Sync + 'static,
    ) -> IopResult<ObserverId> {
        self.registry.observe(kind, name, callback)
    }

    pub fn observe_all(
        &mut self,
        callback: impl Fn(&mut Agent, IopKind, &Iop) + Send + Sync + 'static,
    ) -> ObserverId {
        self.registry.observe_all(callback)
    }

    /// Called with the new flag whenever the whole agent is muted or unmuted.
    pub fn observe_mute(
        &mut self,
        callback: impl Fn(&mut Agent, bool) + Send + Sync + 'static,
    ) -> ObserverId {
        let id = self.registry.reserve_observer_id();
        self.mute_observers.push((id, Arc::new(callback)));
        id
    }

    /// Called with the new flag whenever the agent is frozen or unfrozen.
    pub fn observe_freeze(
        &mut self,
        callback: impl Fn(&mut Agent, bool) + Send + Sync + 'static,
    ) -> ObserverId {
        let id = self.registry.reserve_observer_id();
        self.freeze_observers.push((id, Arc::new(callback)));
        id
    }

    /// Unregister any kind of observer.
    pub fn unobserve(&mut self, id: ObserverId) -> bool {
        if self.registry.unobserve(id) {
            return true;
        }
        let before = self.mute_observers.len() + self.freeze_observers.len();
        self.mute_observers.retain(|(slot, _)| *slot != id);
        self.freeze_observers.retain(|(slot, _)| *slot != id);
        before != self.mute_observers.len() + self.freeze_observers.len()
    }

    // ---- mapping ----

    /// Add a rule and resolve it right away. The subscription changes are
    /// logged; read the links back with [`mapping_links`](Self::mapping_links).
    #[instrument(skip_all, fields(agent = %self.config.name, rule = %rule))]
    pub fn add_mapping_entry(&mut self, rule: MappingRule) -> IopResult<MappingId> {
        let id = self.mappings.add(rule, self.registry.table())?;
        let changes = self.resolve();
        debug!(%id, subscriptions = changes.len(), state = ?self.mappings.state(id), "mapping entry resolved");
        Ok(id)
    }

    /// `input` ← `agent`.`output`; `agent` may be `*`.
    pub fn add_mapping(&mut self, input: &str, agent: &str, output: &str) -> IopResult<MappingId> {
        self.add_mapping_entry(MappingRule::output(input, agent, output))
    }

    pub fn add_category_mapping(&mut self, agent: &str, category: &str) -> IopResult<MappingId> {
        self.add_mapping_entry(MappingRule::category(agent, category))
    }

    #[instrument(skip(self), fields(agent = %self.config.name))]
    pub fn remove_mapping_entry(&mut self, id: MappingId) -> IopResult<Vec<SubscriptionChange>> {
        self.mappings.remove(id, self.transport.as_ref())
    }

    #[instrument(skip(self, agent), fields(agent = %self.config.name, peer = agent))]
    pub fn remove_mapping(
        &mut self,
        input: &str,
        agent: &str,
        output: &str,
    ) -> IopResult<Vec<SubscriptionChange>> {
        let (_, changes) =
            self.mappings
                .remove_by_triple(input, agent, output, self.transport.as_ref())?;
        Ok(changes)
    }

    /// Replace every entry and the mapping metadata.
    #[instrument(skip_all, fields(agent = %self.config.name, rules = mapping.rules.len()))]
    pub fn load_mapping(&mut self, mapping: Mapping) -> IopResult<Vec<SubscriptionChange>> {
        let mut changes =
            self.mappings
                .load(mapping, self.registry.table(), self.transport.as_ref())?;
        changes.extend(self.resolve());
        info!(entries = self.mappings.len(), "mapping loaded");
        Ok(changes)
    }

    pub fn load_mapping_json(&mut self, json: &str) -> IopResult<Vec<SubscriptionChange>> {
        self.load_mapping(Mapping::from_json(json)?)
    }

    pub fn clear_mappings(&mut self) -> Vec<SubscriptionChange> {
        let changes = self.mappings.clear(self.transport.as_ref());
        info!(agent = %self.config.name, unsubscribed = changes.len(), "mappings cleared");
        changes
    }

    pub fn export_mapping(&self) -> Mapping {
        self.mappings.to_mapping()
    }

    pub fn export_mapping_json(&self) -> IopResult<String> {
        self.export_mapping().to_json()
    }

    pub fn set_mapping_name(&mut self, name: impl Into<String>) {
        self.mappings.name = name.into();
    }

    pub fn set_mapping_description(&mut self, description: impl Into<String>) {
        self.mappings.description = description.into();
    }

    pub fn set_mapping_version(&mut self, version: impl Into<String>) {
        self.mappings.version = version.into();
    }

    pub fn mapping_count(&self) -> usize {
        self.mappings.len()
    }

    pub fn mapping_exists(&self, id: MappingId) -> bool {
        self.mappings.contains(id)
    }

    pub fn mapping_id(&self, input: &str, agent: &str, output: &str) -> Option<MappingId> {
        self.mappings.find_by_triple(input, agent, output)
    }

    pub fn mapping_entry(&self, id: MappingId) -> Option<MappingEntry> {
        self.mappings.entry(id)
    }

    pub fn mapping_entries(&self) -> Vec<MappingEntry> {
        self.mappings.entries()
    }

    pub fn mapping_state(&self, id: MappingId) -> Option<MapState> {
        self.mappings.state(id)
    }

    pub fn mapping_links(&self, id: MappingId) -> Vec<(LinkKey, LinkState)> {
        self.mappings.links(id)
    }

    pub fn sub_connections(&self, id: MappingId) -> Vec<AgentName> {
        self.mappings.sub_connections(id)
    }

    // ---- peers ----

    /// A peer published a definition, or left when `definition` is `None`.
    /// A rejected definition leaves the peer absent; the resolver still runs.
    #[instrument(
        skip_all,
        fields(agent = %self.config.name, peer = %agent, present = definition.is_some())
    )]
    pub fn on_peer_definition_changed(
        &mut self,
        agent: AgentName,
        definition: Option<Definition>,
    ) -> IopResult<Vec<SubscriptionChange>> {
        let applied = self.peers.apply(agent, definition);
        let changes = self.resolve();
        match applied {
            Ok(changed) => {
                debug!(changed, subscriptions = changes.len(), "peer definition applied");
                Ok(changes)
            }
            Err(err) => {
                warn!(error = %err, "peer definition rejected");
                Err(err)
            }
        }
    }

    /// Same as [`on_peer_definition_changed`](Self::on_peer_definition_changed)
    /// with a JSON payload.
    pub fn on_peer_definition_text(
        &mut self,
        agent: AgentName,
        json: Option<&str>,
    ) -> IopResult<Vec<SubscriptionChange>> {
        let definition = match json.map(Definition::from_json).transpose() {
            Ok(definition) => definition,
            Err(err) => {
                self.peers.remove(&agent);
                let changes = self.resolve();
                warn!(
                    peer = %agent,
                    error = %err,
                    subscriptions = changes.len(),
                    "peer definition payload rejected"
                );
                return Err(match err {
                    IopError::MalformedDefinition(_) => err,
                    other => IopError::MalformedDefinition(other.to_string()),
                });
            }
        };
        self.on_peer_definition_changed(agent, definition)
    }

    /// Apply several peer changes, then resolve once.
    #[instrument(skip_all, fields(agent = %self.config.name))]
    pub fn apply_peer_changes(
        &mut self,
        batch: impl IntoIterator<Item = (AgentName, Option<Definition>)>,
    ) -> PeerBatchReport {
        let mut report = PeerBatchReport::default();
        for (agent, definition) in batch {
            if let Err(err) = self.peers.apply(agent.clone(), definition) {
                warn!(peer = %agent, error = %err, "peer definition rejected");
                report.rejected.push((agent, err));
            }
        }
        report.changes = self.resolve();
        debug!(
            subscriptions = report.changes.len(),
            rejected = report.rejected.len(),
            "peer batch applied"
        );
        report
    }

    // ---- value dispatch ----

    /// Route a value from `agent`.`output` into every local input an ON link
    /// maps it to. Each input succeeds or fails on its own.
    #[instrument(
        skip_all,
        fields(agent = %self.config.name, peer = %agent, output = output, value_type = %value_type)
    )]
    pub fn deliver(
        &mut self,
        agent: &AgentName,
        output: &str,
        value_type: ValueType,
        payload: &[u8],
    ) -> IopResult<DeliveryReport> {
        if self.frozen {
            debug!("delivery dropped while frozen");
            return Err(IopError::Frozen);
        }
        let mut report = DeliveryReport::default();
        let routes = self.mappings.routes(agent, output);
        if routes.is_empty() {
            trace!("no route for delivery");
            return Ok(report);
        }

        let decoded = IopValue::from_wire(value_type, payload);
        let mut stale = false;
        for (entry, input) in routes {
            let expected = match self.registry.value_type(IopKind::Input, &input) {
                Ok(expected) => expected,
                Err(err) => {
                    report.failed.push((input, err));
                    continue;
                }
            };
            if expected != value_type {
                warn!(%entry, input = %input, %expected, "delivery type no longer matches input");
                stale = true;
                report.failed.push((
                    input.clone(),
                    IopError::TypeMismatch {
                        name: input,
                        expected,
                        actual: value_type,
                    },
                ));
                continue;
            }
            let written = decoded
                .clone()
                .and_then(|value| self.registry.write(IopKind::Input, &input, value));
            match written {
                Ok(pending) => {
                    report.written.push(input);
                    pending.fire(self);
                }
                Err(err) => report.failed.push((input, err)),
            }
        }

        if stale && self.config.resolve_on_type_mismatch {
            let changes = self.resolve();
            debug!(subscriptions = changes.len(), "resolved after stale delivery type");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use iopmesh_events::RecordingTransport;
    use iopmesh_protocol::OutboundEvent;
    use parking_lot::Mutex;

    use super::*;
    use crate::config::{AgentBuilder, AgentConfig};

    fn agent(name: &str) -> (Agent, Arc<RecordingTransport>) {
        let recorder = Arc::new(RecordingTransport::new());
        let agent = AgentBuilder::new(AgentConfig::new(name))
            .transport(recorder.clone())
            .build()
            .unwrap();
        (agent, recorder)
    }

    fn engine() -> Definition {
        Definition::new("engine")
            .unwrap()
            .with_iop(IopKind::Output, Iop::new("rpm", ValueType::Double).unwrap())
            .unwrap()
            .with_iop(IopKind::Output, Iop::new("label", ValueType::String).unwrap())
            .unwrap()
    }

    fn dashboard() -> (Agent, Arc<RecordingTransport>) {
        let (mut agent, recorder) = agent("dashboard");
        agent.create_input("speed", ValueType::Double).unwrap();
        agent.create_input("title", ValueType::String).unwrap();
        (agent, recorder)
    }

    #[test]
    fn output_write_publishes_wire_payload() {
        let (mut agent, recorder) = agent("probe");
        agent.create_output("count", ValueType::Integer).unwrap();
        agent.write(IopKind::Output, "count", IopValue::Integer(7)).unwrap();
        assert_eq!(
            recorder.events(),
            vec![OutboundEvent::PublishRequested {
                output: "count".into(),
                value_type: ValueType::Integer,
                payload: 7i64.to_le_bytes().to_vec(),
            }]
        );
    }

    #[test]
    fn muted_output_and_muted_agent_still_update_state() {
        let (mut agent, recorder) = agent("probe");
        agent.create_output("count", ValueType::Integer).unwrap();
        agent.mute_output("count").unwrap();
        agent.write_as_int(IopKind::Output, "count", 1).unwrap();
        assert!(agent.is_output_muted("count").unwrap());
        assert!(recorder.is_empty());

        agent.unmute_output("count").unwrap();
        agent.mute();
        agent.write_as_int(IopKind::Output, "count", 2).unwrap();
        assert!(recorder.is_empty());
        assert_eq!(agent.read_as_int(IopKind::Output, "count").unwrap(), 2);

        agent.unmute();
        agent.write_as_int(IopKind::Output, "count", 3).unwrap();
        assert_eq!(recorder.publications().len(), 1);
    }

    #[test]
    fn strict_write_rejects_wrong_type_but_write_as_converts() {
        let (mut agent, _) = agent("probe");
        agent.create_input("level", ValueType::Integer).unwrap();
        assert!(matches!(
            agent.write(IopKind::Input, "level", IopValue::from("12")),
            Err(IopError::TypeMismatch { .. })
        ));
        agent.write_as_string(IopKind::Input, "level", "12").unwrap();
        assert_eq!(agent.read(IopKind::Input, "level").unwrap(), &IopValue::Integer(12));
        assert_eq!(agent.read_as_string(IopKind::Input, "level").unwrap(), "12");
        assert!(matches!(
            agent.write_as_string(IopKind::Input, "level", "twelve"),
            Err(IopError::Conversion { .. })
        ));

        agent.create_output("pulse", ValueType::Impulsion).unwrap();
        agent.write_as_impulsion(IopKind::Output, "pulse").unwrap();
        agent.write_as_double(IopKind::Output, "pulse", 1.5).unwrap();
        assert_eq!(agent.read(IopKind::Output, "pulse").unwrap(), &IopValue::Impulsion);
    }

    #[test]
    fn clear_data_resets_to_type_default() {
        let (mut agent, _) = agent("probe");
        agent
            .create_iop(IopKind::Parameter, "gain", ValueType::Double, Some(IopValue::Double(2.0)))
            .unwrap();
        agent.clear_data(IopKind::Parameter, "gain").unwrap();
        assert_eq!(agent.read_as_double(IopKind::Parameter, "gain").unwrap(), 0.0);
    }

    #[test]
    fn frozen_agent_rejects_input_writes_and_deliveries() {
        let (mut agent, _) = dashboard();
        agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        agent.create_output("status", ValueType::Bool).unwrap();

        agent.freeze();
        assert!(agent.is_frozen());
        assert_eq!(
            agent.write_as_double(IopKind::Input, "speed", 1.0),
            Err(IopError::Frozen)
        );
        assert_eq!(
            agent.deliver(&"engine".into(), "rpm", ValueType::Double, &1.0f64.to_le_bytes()),
            Err(IopError::Frozen)
        );
        agent.write_as_bool(IopKind::Output, "status", true).unwrap();

        agent.unfreeze();
        let report = agent
            .deliver(&"engine".into(), "rpm", ValueType::Double, &1.0f64.to_le_bytes())
            .unwrap();
        assert_eq!(report.written, vec!["speed".to_owned()]);
    }

    #[test]
    fn values_round_trip_between_agents() {
        let (mut sender, wire) = agent("sender");
        let samples = [
            ("int", IopValue::Integer(i64::MIN)),
            ("double", IopValue::Double(0.1 + 0.2)),
            ("text", IopValue::from("héllo, wörld")),
            ("flag", IopValue::Bool(true)),
            ("pulse", IopValue::Impulsion),
            ("blob", IopValue::Data(vec![0, 255, 1, 254])),
        ];
        let (mut receiver, _) = agent("receiver");
        for (name, value) in &samples {
            sender.create_output(name, value.value_type()).unwrap();
            receiver.create_input(name, value.value_type()).unwrap();
            receiver.add_mapping(name, "sender", name).unwrap();
        }
        receiver
            .on_peer_definition_changed("sender".into(), Some(sender.export_definition().unwrap()))
            .unwrap();
        assert!(
            receiver
                .mapping_entries()
                .iter()
                .all(|entry| entry.state == MapState::On)
        );

        for (name, value) in &samples {
            sender.write(IopKind::Output, name, value.clone()).unwrap();
        }
        for event in wire.take() {
            let OutboundEvent::PublishRequested {
                output,
                value_type,
                payload,
            } = event
            else {
                continue;
            };
            let report = receiver
                .deliver(&"sender".into(), &output, value_type, &payload)
                .unwrap();
            assert_eq!(report.written, vec![output]);
        }
        for (name, value) in &samples {
            assert_eq!(receiver.read(IopKind::Input, name).unwrap(), value);
        }
    }

    #[test]
    fn stale_delivery_type_fails_that_input_only() {
        let (mut agent, _) = dashboard();
        agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent.add_mapping("title", "engine", "label").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();

        let report = agent
            .deliver(&"engine".into(), "rpm", ValueType::Integer, &5i64.to_le_bytes())
            .unwrap();
        assert!(report.written.is_empty());
        assert_eq!(
            report.failed,
            vec![(
                "speed".to_owned(),
                IopError::TypeMismatch {
                    name: "speed".into(),
                    expected: ValueType::Double,
                    actual: ValueType::Integer,
                }
            )]
        );

        let report = agent
            .deliver(&"engine".into(), "label", ValueType::String, b"ok")
            .unwrap();
        assert_eq!(report.written, vec!["title".to_owned()]);
        assert_eq!(agent.read_as_string(IopKind::Input, "title").unwrap(), "ok");
    }

    #[test]
    fn unrouted_delivery_is_empty() {
        let (mut agent, _) = dashboard();
        let report = agent
            .deliver(&"ghost".into(), "rpm", ValueType::Double, &[0; 8])
            .unwrap();
        assert!(report.is_empty());
    }

    #[test]
    fn observers_fire_on_delivery() {
        let (mut agent, _) = dashboard();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        agent
            .observe(IopKind::Input, "speed", move |_, kind, iop| {
                sink.lock().push((kind, iop.value().clone()));
            })
            .unwrap();
        let all = Arc::new(Mutex::new(0usize));
        let counter = all.clone();
        let global = agent.observe_all(move |_, _, _| *counter.lock() += 1);

        agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        agent
            .deliver(&"engine".into(), "rpm", ValueType::Double, &3.5f64.to_le_bytes())
            .unwrap();

        assert_eq!(*seen.lock(), vec![(IopKind::Input, IopValue::Double(3.5))]);
        assert_eq!(*all.lock(), 1);
        assert!(agent.unobserve(global));
        assert!(!agent.unobserve(global));
    }

    #[test]
    fn malformed_peer_text_marks_peer_absent() {
        let (mut agent, recorder) = dashboard();
        let id = agent.add_mapping("speed", "engine", "rpm").unwrap();
        let json = engine().to_json().unwrap();
        agent
            .on_peer_definition_text("engine".into(), Some(&json))
            .unwrap();
        assert_eq!(agent.mapping_state(id), Some(MapState::On));

        let err = agent
            .on_peer_definition_text("engine".into(), Some("{ not json"))
            .unwrap_err();
        assert!(matches!(err, IopError::MalformedDefinition(_)));
        assert!(!agent.peers().contains(&"engine".into()));
        assert_eq!(agent.mapping_state(id), Some(MapState::Off));
        assert_eq!(
            recorder.subscriptions(),
            vec![
                (AgentName::new("engine"), "rpm".to_owned(), true),
                (AgentName::new("engine"), "rpm".to_owned(), false),
            ]
        );
    }

    #[test]
    fn batched_peer_replacement_does_not_flicker() {
        let (mut agent, recorder) = dashboard();
        let id = agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        recorder.take();

        let report = agent.apply_peer_changes([
            (AgentName::new("engine"), None),
            (AgentName::new("engine"), Some(engine().with_version("2"))),
        ]);
        assert!(report.changes.is_empty());
        assert!(report.rejected.is_empty());
        assert!(recorder.is_empty());
        assert_eq!(agent.mapping_state(id), Some(MapState::On));
    }

    #[test]
    fn batch_reports_rejected_peers() {
        let (mut agent, _) = dashboard();
        let mut broken = engine();
        broken.name = String::new();
        let report = agent.apply_peer_changes([
            (AgentName::new("engine"), Some(engine())),
            (AgentName::new("broken"), Some(broken)),
        ]);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(report.rejected[0].0.as_str(), "broken");
        assert_eq!(agent.peers().len(), 1);
    }

    #[test]
    fn removing_mapped_input_unsubscribes() {
        let (mut agent, recorder) = dashboard();
        let id = agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        agent.remove_iop(IopKind::Input, "speed").unwrap();
        assert_eq!(agent.mapping_state(id), Some(MapState::Off));
        assert_eq!(recorder.subscriptions().last().map(|s| s.2), Some(false));
    }

    #[test]
    fn remove_mapping_by_triple_and_id() {
        let (mut agent, recorder) = dashboard();
        let speed = agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent.add_mapping("title", "*", "label").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        recorder.take();

        let changes = agent.remove_mapping("title", "*", "label").unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(agent.mapping_id("speed", "engine", "rpm"), Some(speed));
        agent.remove_mapping_entry(speed).unwrap();
        assert_eq!(agent.mapping_count(), 0);
        assert_eq!(recorder.subscriptions().len(), 2);
        assert!(matches!(
            agent.remove_mapping_entry(speed),
            Err(IopError::UnknownMappingEntry(_))
        ));
    }

    #[test]
    fn category_members_are_live_and_not_removable() {
        let (mut agent, _) = agent("probe");
        let sensors = Arc::new(
            Category::new("Sensors", "1.0")
                .unwrap()
                .with_iop(IopKind::Output, Iop::new("temperature", ValueType::Double).unwrap())
                .unwrap(),
        );
        agent.add_category(sensors.clone()).unwrap();
        assert!(agent.iop_exists(IopKind::Output, "temperature"));
        assert!(matches!(
            agent.remove_iop(IopKind::Output, "temperature"),
            Err(IopError::MalformedDefinition(_))
        ));
        assert_eq!(
            agent.create_output("temperature", ValueType::Double),
            Err(IopError::DuplicateName("temperature".into()))
        );
        assert!(matches!(
            agent.add_category(sensors),
            Err(IopError::DuplicateName(_))
        ));
    }

    #[test]
    fn category_mapping_expands_per_peer() {
        let sensors = Arc::new(
            Category::new("Sensors", "1.0")
                .unwrap()
                .with_iop(IopKind::Output, Iop::new("temperature", ValueType::Double).unwrap())
                .unwrap(),
        );
        let (mut agent, recorder) = agent("monitor");
        agent.create_input("temperature", ValueType::Double).unwrap();
        let id = agent.add_category_mapping("*", "Sensors").unwrap();
        for name in ["probe-a", "probe-b"] {
            let definition = Definition::new(name)
                .unwrap()
                .with_category(sensors.clone())
                .unwrap();
            agent
                .on_peer_definition_changed(name.into(), Some(definition))
                .unwrap();
        }
        assert_eq!(agent.mapping_state(id), Some(MapState::Generic));
        assert_eq!(agent.sub_connections(id).len(), 2);
        assert_eq!(recorder.subscriptions().len(), 2);

        let report = agent
            .deliver(&"probe-b".into(), "temperature", ValueType::Double, &4.0f64.to_le_bytes())
            .unwrap();
        assert_eq!(report.written, vec!["temperature".to_owned()]);
    }

    #[test]
    fn definition_export_carries_live_values() {
        let (mut agent, _) = agent("probe");
        agent.set_definition_description("a probe");
        agent.set_definition_version("1.2");
        agent.create_parameter("gain", ValueType::Double).unwrap();
        agent.write_as_double(IopKind::Parameter, "gain", 2.5).unwrap();

        let json = agent.export_definition_json().unwrap();
        let (mut copy, _) = agent_from_json(&json);
        assert_eq!(copy.definition().version, "1.2");
        assert_eq!(copy.read_as_double(IopKind::Parameter, "gain").unwrap(), 2.5);
        assert!(are_identical_defs(&agent, &copy));

        assert!(copy.set_definition_name("  ").is_err());
        copy.set_definition_name("renamed").unwrap();
        assert_eq!(copy.definition().name, "renamed");
    }

    fn agent_from_json(json: &str) -> (Agent, Arc<RecordingTransport>) {
        let (mut agent, recorder) = agent("copy");
        agent.load_definition_json(json).unwrap();
        (agent, recorder)
    }

    fn are_identical_defs(a: &Agent, b: &Agent) -> bool {
        iopmesh_protocol::are_identical(a.definition(), b.definition())
    }

    #[test]
    fn clear_definition_drops_iops_and_links() {
        let (mut agent, recorder) = dashboard();
        let id = agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        let changes = agent.clear_definition().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(agent.iop_count(IopKind::Input), 0);
        assert_eq!(agent.definition().name, "dashboard");
        assert_eq!(agent.mapping_state(id), Some(MapState::Off));
        assert_eq!(recorder.subscriptions().len(), 2);
    }

    #[test]
    fn mapping_json_round_trip() {
        let (mut agent, _) = dashboard();
        agent.set_mapping_name("dash");
        agent.set_mapping_description("dashboard wiring");
        agent.set_mapping_version("3");
        agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent.add_category_mapping("*", "Sensors").unwrap();
        let json = agent.export_mapping_json().unwrap();

        let (mut other, _) = dashboard();
        other.load_mapping_json(&json).unwrap();
        assert_eq!(other.export_mapping(), agent.export_mapping());
        assert_eq!(other.mapping_count(), 2);

        assert!(other.clear_mappings().is_empty());
        assert_eq!(other.mapping_count(), 0);
    }

    #[test]
    fn input_observer_can_write_an_output() {
        let (mut agent, recorder) = dashboard();
        agent.create_output("kmh", ValueType::Double).unwrap();
        agent
            .observe(IopKind::Input, "speed", |agent, _, iop| {
                let speed = iop.value().as_double().unwrap_or_default();
                agent
                    .write_as_double(IopKind::Output, "kmh", speed * 3.6)
                    .unwrap();
            })
            .unwrap();
        agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        recorder.take();

        agent
            .deliver(&"engine".into(), "rpm", ValueType::Double, &10.0f64.to_le_bytes())
            .unwrap();
        assert_eq!(agent.read_as_double(IopKind::Output, "kmh").unwrap(), 36.0);
        assert_eq!(
            recorder.publications(),
            vec![("kmh".to_owned(), ValueType::Double, 36.0f64.to_le_bytes().to_vec())]
        );

        agent.write_as_double(IopKind::Input, "speed", 20.0).unwrap();
        assert_eq!(agent.read_as_double(IopKind::Output, "kmh").unwrap(), 72.0);
    }

    #[test]
    fn observer_sees_other_iops_through_the_agent() {
        let (mut agent, _) = dashboard();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        agent.observe_all(move |agent, kind, iop| {
            let title = agent.read_as_string(IopKind::Input, "title").unwrap_or_default();
            sink.lock().push(format!("{kind}:{}:{title}", iop.name()));
        });
        agent.write_as_string(IopKind::Input, "title", "dash").unwrap();
        agent.write_as_double(IopKind::Input, "speed", 1.0).unwrap();
        assert_eq!(
            *seen.lock(),
            vec!["input:title:dash".to_owned(), "input:speed:dash".to_owned()]
        );
    }

    #[test]
    fn mute_and_freeze_observers_fire_on_transitions() {
        let (mut agent, _) = agent("relay");
        agent.create_output("status", ValueType::String).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = seen.clone();
        let mute = agent.observe_mute(move |agent, muted| {
            sink.lock().push(format!("mute={muted} frozen={}", agent.is_frozen()));
        });
        let sink = seen.clone();
        agent.observe_freeze(move |agent, frozen| {
            sink.lock().push(format!("freeze={frozen}"));
            agent
                .write_as_string(IopKind::Output, "status", if frozen { "paused" } else { "running" })
                .unwrap();
        });

        agent.mute();
        agent.mute();
        agent.freeze();
        agent.unmute();
        agent.unfreeze();
        assert_eq!(
            *seen.lock(),
            vec![
                "mute=true frozen=false".to_owned(),
                "freeze=true".to_owned(),
                "mute=false frozen=true".to_owned(),
                "freeze=false".to_owned(),
            ]
        );
        assert_eq!(agent.read_as_string(IopKind::Output, "status").unwrap(), "running");

        assert!(agent.unobserve(mute));
        assert!(!agent.unobserve(mute));
        agent.mute();
        assert_eq!(seen.lock().len(), 4);
    }

    #[test]
    fn agent_state_is_kept_locally() {
        let (mut agent, recorder) = agent("relay");
        assert_eq!(agent.state(), "");
        agent.set_state("calibrating");
        agent.set_state("calibrating");
        assert_eq!(agent.state(), "calibrating");
        assert!(recorder.is_empty());
    }

    #[test]
    fn calls_are_exported_with_the_definition() {
        let (mut agent, _) = agent("relay");
        agent
            .add_call(
                Call::new("calibrate")
                    .unwrap()
                    .with_argument("offset", ValueType::Double)
                    .unwrap(),
            )
            .unwrap();
        agent.add_call(Call::new("reset").unwrap()).unwrap();
        agent
            .add_argument_to_call("reset", "hard", ValueType::Bool)
            .unwrap();
        assert!(agent.call_exists("reset"));
        assert_eq!(agent.call_count(), 2);
        assert_eq!(agent.call_names(), vec!["calibrate".to_owned(), "reset".to_owned()]);

        let exported = agent.export_definition().unwrap();
        assert!(iopmesh_protocol::are_identical(&exported, agent.definition()));
        assert_eq!(exported.calls().len(), 2);

        agent.remove_argument_from_call("reset", "hard").unwrap();
        agent.remove_call("calibrate").unwrap();
        assert_eq!(
            agent.remove_call("calibrate").unwrap_err(),
            IopError::UnknownCall("calibrate".into())
        );
        assert_eq!(agent.call_names(), vec!["reset".to_owned()]);
    }

    #[test]
    fn subscribe_requests_current_value_when_enabled() {
        let (mut agent, recorder) = dashboard();
        assert!(!agent.request_outputs_from_mapped_agents());
        agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        assert!(recorder.requests().is_empty());

        agent.set_request_outputs_from_mapped_agents(true);
        agent.add_mapping("title", "engine", "label").unwrap();
        assert_eq!(
            recorder.requests(),
            vec![(AgentName::new("engine"), "label".to_owned())]
        );
        assert_eq!(
            recorder.events().last(),
            Some(&OutboundEvent::OutputRequested {
                agent: AgentName::new("engine"),
                output: "label".into(),
            })
        );
    }

    #[test]
    fn iop_changes_report_subscription_changes() {
        let sensors = Arc::new(
            Category::new("Sensors", "1.0")
                .unwrap()
                .with_iop(IopKind::Output, Iop::new("temperature", ValueType::Double).unwrap())
                .unwrap(),
        );
        let (mut agent, _) = agent("monitor");
        agent.add_category_mapping("probe", "Sensors").unwrap();
        let probe = Definition::new("probe").unwrap().with_category(sensors).unwrap();
        assert!(
            agent
                .on_peer_definition_changed("probe".into(), Some(probe))
                .unwrap()
                .is_empty()
        );

        let changes = agent.create_input("temperature", ValueType::Double).unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].active);
        assert!(agent.create_output("mean", ValueType::Double).unwrap().is_empty());

        let changes = agent.remove_iop(IopKind::Input, "temperature").unwrap();
        assert_eq!(changes.len(), 1);
        assert!(!changes[0].active);
    }

    #[test]
    fn reloading_exported_mapping_is_silent() {
        let (mut agent, recorder) = dashboard();
        let id = agent.add_mapping("speed", "engine", "rpm").unwrap();
        agent
            .on_peer_definition_changed("engine".into(), Some(engine()))
            .unwrap();
        recorder.take();

        let changes = agent.load_mapping(agent.export_mapping()).unwrap();
        assert!(changes.is_empty());
        assert!(recorder.is_empty());
        assert_eq!(agent.mapping_id("speed", "engine", "rpm"), Some(id));
        assert_eq!(agent.mapping_state(id), Some(MapState::On));
    }
}
