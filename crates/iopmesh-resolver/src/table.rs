use std::collections::{BTreeMap, BTreeSet};

use indexmap::IndexMap;
use iopmesh_protocol::{
    AgentName, CategoryScope, IopError, IopKind, IopResult, IopTable, MapState, Mapping,
    MappingEntry, MappingId, MappingRule, MappingTarget, TransportPort, check_category,
};
use tracing::{debug, info, instrument, warn};

use crate::directory::{CategoryCatalog, PeerDirectory};

/// One resolved connection: local `input` fed by `agent`.`output`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkKey {
    pub agent: AgentName,
    pub output: String,
    pub input: String,
}

/// Outcome of a link whose remote output exists. Links to absent outputs are
/// not kept, which is what OFF means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    On,
    Incompatible,
}

/// A subscription side effect: the first ON link to `agent`.`output`
/// appeared (`active`), or the last one went away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionChange {
    pub agent: AgentName,
    pub output: String,
    pub active: bool,
}

/// A remote output some ON link reads from.
type Publisher = (AgentName, String);

/// Snapshot the resolver evaluates against.
#[derive(Debug, Clone, Copy)]
pub struct ResolveContext<'a> {
    /// The local agent's live IOPs; only inputs are consulted.
    pub local: &'a IopTable,
    pub peers: &'a PeerDirectory,
    pub categories: &'a CategoryCatalog,
}

#[derive(Debug, Clone)]
struct EntrySlot {
    rule: MappingRule,
    state: MapState,
    links: BTreeMap<LinkKey, LinkState>,
}

impl EntrySlot {
    fn to_entry(&self, id: MappingId) -> MappingEntry {
        MappingEntry {
            id,
            rule: self.rule.clone(),
            state: self.state,
        }
    }
}

/// The local agent's mapping entries with their live state.
///
/// Resolution is a pure function of (rules, local inputs, peers, catalog).
/// Subscriptions are held per publisher: several entries reading the same
/// remote output share one subscription, which ends with the last of them.
/// Side effects are the difference between the previous and the new
/// publisher sets, so re-running a pass on an unchanged snapshot emits nothing.
#[derive(Debug, Clone)]
pub struct MappingTable {
    pub name: String,
    pub description: String,
    pub version: String,
    entries: IndexMap<MappingId, EntrySlot>,
    subscribed: BTreeSet<Publisher>,
    next_id: MappingId,
}

impl Default for MappingTable {
    fn default() -> Self {
        Self::new()
    }
}

impl MappingTable {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            description: String::new(),
            version: String::new(),
            entries: IndexMap::new(),
            subscribed: BTreeSet::new(),
            next_id: MappingId::new(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MappingId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn entry(&self, id: MappingId) -> Option<MappingEntry> {
        self.entries.get(&id).map(|slot| slot.to_entry(id))
    }

    pub fn entries(&self) -> Vec<MappingEntry> {
        self.entries
            .iter()
            .map(|(id, slot)| slot.to_entry(*id))
            .collect()
    }

    /// Remote outputs currently subscribed to, as (agent, output).
    pub fn subscriptions(&self) -> Vec<(AgentName, String)> {
        self.subscribed.iter().cloned().collect()
    }

    pub fn state(&self, id: MappingId) -> Option<MapState> {
        self.entries.get(&id).map(|slot| slot.state)
    }

    /// Resolved links of an entry, in key order.
    pub fn links(&self, id: MappingId) -> Vec<(LinkKey, LinkState)> {
        self.entries
            .get(&id)
            .map(|slot| {
                slot.links
                    .iter()
                    .map(|(key, state)| (key.clone(), *state))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Remote agents an entry currently resolves against: one sub-connection
    /// per agent for category and wildcard entries.
    pub fn sub_connections(&self, id: MappingId) -> Vec<AgentName> {
        let Some(slot) = self.entries.get(&id) else {
            return Vec::new();
        };
        slot.links
            .keys()
            .map(|key| key.agent.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn find_by_triple(&self, input: &str, agent: &str, output: &str) -> Option<MappingId> {
        self.entries
            .iter()
            .find(|(_, slot)| slot.rule.matches_triple(input, agent, output))
            .map(|(id, _)| *id)
    }

    fn find_rule(&self, rule: &MappingRule) -> Option<MappingId> {
        self.entries
            .iter()
            .find(|(_, slot)| slot.rule == *rule)
            .map(|(id, _)| *id)
    }

    /// Add a rule. Output rules must name an existing local input; the remote
    /// side may be unknown. Adding a rule already present returns its id.
    ///
    /// The new entry starts OFF (GENERIC for category rules) until the next
    /// [`resolve`](Self::resolve) pass.
    pub fn add(&mut self, rule: MappingRule, local: &IopTable) -> IopResult<MappingId> {
        validate_rule(&rule, local)?;
        if let Some(existing) = self.find_rule(&rule) {
            warn!(id = %existing, %rule, "mapping entry already exists");
            return Ok(existing);
        }
        let id = self.next_id;
        self.next_id = id.next();
        debug!(%id, %rule, "mapping entry added");
        self.entries.insert(
            id,
            EntrySlot {
                state: rule.initial_state(),
                rule,
                links: BTreeMap::new(),
            },
        );
        Ok(id)
    }

    /// Remove an entry. Publishers only it was reading from are unsubscribed
    /// before the entry is dropped.
    pub fn remove(
        &mut self,
        id: MappingId,
        transport: &dyn TransportPort,
    ) -> IopResult<Vec<SubscriptionChange>> {
        let slot = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| IopError::UnknownMappingEntry(id.to_string()))?;
        deactivate(slot);
        let changes = self.sync_subscriptions(transport);
        self.entries.shift_remove(&id);
        debug!(%id, unsubscribed = changes.len(), "mapping entry removed");
        Ok(changes)
    }

    pub fn remove_by_triple(
        &mut self,
        input: &str,
        agent: &str,
        output: &str,
        transport: &dyn TransportPort,
    ) -> IopResult<(MappingId, Vec<SubscriptionChange>)> {
        let id = self
            .find_by_triple(input, agent, output)
            .ok_or_else(|| IopError::UnknownMappingEntry(format!("{input} <- {agent}.{output}")))?;
        let changes = self.remove(id, transport)?;
        Ok((id, changes))
    }

    /// Drop every entry, unsubscribing first. Ids keep increasing.
    pub fn clear(&mut self, transport: &dyn TransportPort) -> Vec<SubscriptionChange> {
        self.entries.values_mut().for_each(deactivate);
        let changes = self.sync_subscriptions(transport);
        self.entries.clear();
        changes
    }

    /// Replace the table with a mapping document. Every rule is validated
    /// before anything changes.
    ///
    /// Rules already present keep their id, state and links; only dropped
    /// rules are unsubscribed and removed. New rules start at their initial
    /// state until the next [`resolve`](Self::resolve) pass. Entries follow
    /// the document order.
    pub fn load(
        &mut self,
        mapping: Mapping,
        local: &IopTable,
        transport: &dyn TransportPort,
    ) -> IopResult<Vec<SubscriptionChange>> {
        for rule in &mapping.rules {
            validate_rule(rule, local)?;
        }

        let mut dropped = 0;
        for slot in self.entries.values_mut() {
            if !mapping.rules.contains(&slot.rule) {
                deactivate(slot);
                dropped += 1;
            }
        }
        let changes = self.sync_subscriptions(transport);

        let mut previous = std::mem::take(&mut self.entries);
        let mut added = 0;
        for rule in mapping.rules {
            if self.find_rule(&rule).is_some() {
                warn!(%rule, "duplicate rule in mapping document");
                continue;
            }
            let kept = previous
                .iter()
                .find(|(_, slot)| slot.rule == rule)
                .map(|(id, _)| *id);
            match kept.and_then(|id| previous.shift_remove_entry(&id)) {
                Some((id, slot)) => {
                    self.entries.insert(id, slot);
                }
                None => {
                    let id = self.next_id;
                    self.next_id = id.next();
                    self.entries.insert(
                        id,
                        EntrySlot {
                            state: rule.initial_state(),
                            rule,
                            links: BTreeMap::new(),
                        },
                    );
                    added += 1;
                }
            }
        }
        self.name = mapping.name;
        self.description = mapping.description;
        self.version = mapping.version;
        debug!(dropped, added, entries = self.entries.len(), "mapping document applied");
        Ok(changes)
    }

    /// Export rules and metadata; live state is not part of the document.
    pub fn to_mapping(&self) -> Mapping {
        Mapping {
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            rules: self.entries.values().map(|slot| slot.rule.clone()).collect(),
        }
    }

    /// Re-evaluate every entry against `ctx` in one pass, then emit the
    /// subscription changes implied by the new set of ON links.
    #[instrument(skip_all, fields(entries = self.entries.len(), peers = ctx.peers.len()))]
    pub fn resolve(
        &mut self,
        ctx: ResolveContext<'_>,
        transport: &dyn TransportPort,
    ) -> Vec<SubscriptionChange> {
        for (id, slot) in self.entries.iter_mut() {
            let desired = evaluate(&slot.rule, ctx);
            let state = aggregate(&slot.rule, &desired);
            if state != slot.state {
                info!(%id, rule = %slot.rule, from = %slot.state, to = %state, "mapping state changed");
            }
            slot.state = state;
            slot.links = desired;
        }
        self.sync_subscriptions(transport)
    }

    /// Diff the publishers read by ON links against the subscribed set.
    /// Unsubscribes are emitted before subscribes.
    fn sync_subscriptions(&mut self, transport: &dyn TransportPort) -> Vec<SubscriptionChange> {
        let wanted: BTreeSet<Publisher> = self
            .entries
            .values()
            .flat_map(|slot| {
                slot.links
                    .iter()
                    .filter(|(_, state)| **state == LinkState::On)
                    .map(|(key, _)| (key.agent.clone(), key.output.clone()))
            })
            .collect();
        let mut changes: Vec<SubscriptionChange> = self
            .subscribed
            .difference(&wanted)
            .map(|publisher| emit(publisher, false, transport))
            .collect();
        changes.extend(
            wanted
                .difference(&self.subscribed)
                .map(|publisher| emit(publisher, true, transport)),
        );
        self.subscribed = wanted;
        changes
    }

    /// ON links that carry values from `agent`.`output`, as (entry, local input).
    pub fn routes(&self, agent: &AgentName, output: &str) -> Vec<(MappingId, String)> {
        self.entries
            .iter()
            .flat_map(|(id, slot)| {
                slot.links
                    .iter()
                    .filter(|(key, state)| {
                        **state == LinkState::On && key.agent == *agent && key.output == output
                    })
                    .map(move |(key, _)| (*id, key.input.clone()))
            })
            .collect()
    }
}

fn validate_rule(rule: &MappingRule, local: &IopTable) -> IopResult<()> {
    match &rule.target {
        MappingTarget::Output { input, output } => {
            if output.trim().is_empty() {
                return Err(IopError::InvalidName(output.clone()));
            }
            if !local.contains(IopKind::Input, input) {
                return Err(IopError::UnknownInput(input.clone()));
            }
        }
        MappingTarget::Category { category } => {
            if category.trim().is_empty() {
                return Err(IopError::InvalidName(category.clone()));
            }
        }
    }
    Ok(())
}

/// Desired link set of one rule for a snapshot.
fn evaluate(rule: &MappingRule, ctx: ResolveContext<'_>) -> BTreeMap<LinkKey, LinkState> {
    let mut links = BTreeMap::new();
    match &rule.target {
        MappingTarget::Output { input, output } => {
            let Some(local) = ctx.local.find(IopKind::Input, input) else {
                return links;
            };
            for (agent, definition) in ctx.peers.matching(&rule.agent) {
                let Some(remote) = definition.find_iop(IopKind::Output, output) else {
                    continue;
                };
                let state = if remote.value_type() == local.value_type() {
                    LinkState::On
                } else {
                    LinkState::Incompatible
                };
                links.insert(
                    LinkKey {
                        agent: agent.clone(),
                        output: output.clone(),
                        input: input.clone(),
                    },
                    state,
                );
            }
        }
        MappingTarget::Category { category } => {
            for (agent, definition) in ctx.peers.matching(&rule.agent) {
                let Some(template) = ctx
                    .categories
                    .get(category)
                    .or_else(|| definition.category(category))
                else {
                    continue;
                };
                if !check_category(definition, template, CategoryScope::OutputOnly) {
                    continue;
                }
                for member in template.iops.iter(IopKind::Output) {
                    let Some(local) = ctx.local.find(IopKind::Input, member.name()) else {
                        continue;
                    };
                    let state = if member.value_type() == local.value_type() {
                        LinkState::On
                    } else {
                        LinkState::Incompatible
                    };
                    links.insert(
                        LinkKey {
                            agent: agent.clone(),
                            output: member.name().to_owned(),
                            input: member.name().to_owned(),
                        },
                        state,
                    );
                }
            }
        }
    }
    links
}

fn aggregate(rule: &MappingRule, links: &BTreeMap<LinkKey, LinkState>) -> MapState {
    if rule.is_category() {
        return MapState::Generic;
    }
    if links.values().any(|state| *state == LinkState::On) {
        MapState::On
    } else if links.is_empty() {
        MapState::Off
    } else {
        MapState::Incompatible
    }
}

fn emit(publisher: &Publisher, active: bool, transport: &dyn TransportPort) -> SubscriptionChange {
    let (agent, output) = publisher;
    transport.subscription_changed(agent, output, active);
    debug!(%agent, output = %output, active, "subscription changed");
    SubscriptionChange {
        agent: agent.clone(),
        output: output.clone(),
        active,
    }
}

fn deactivate(slot: &mut EntrySlot) {
    slot.links.clear();
    slot.state = slot.rule.initial_state();
}
