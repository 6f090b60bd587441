use std::collections::BTreeMap;
use std::sync::Arc;

use iopmesh_protocol::{AgentName, AgentSelector, Category, Definition, IopResult};
use tracing::{debug, warn};

/// Remote agents currently known on the network, keyed by identity.
///
/// Only definitions that pass validation are stored; a malformed payload
/// makes the agent absent.
#[derive(Debug, Default, Clone)]
pub struct PeerDirectory {
    peers: BTreeMap<AgentName, Arc<Definition>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new or changed definition. Returns whether the stored
    /// definition actually changed.
    pub fn upsert(&mut self, agent: AgentName, definition: Definition) -> IopResult<bool> {
        if let Err(error) = definition.validate() {
            warn!(%agent, %error, "rejecting malformed peer definition");
            self.peers.remove(&agent);
            return Err(error);
        }
        if self
            .peers
            .get(&agent)
            .is_some_and(|known| **known == definition)
        {
            return Ok(false);
        }
        debug!(%agent, definition = %definition.name, "peer definition stored");
        self.peers.insert(agent, Arc::new(definition));
        Ok(true)
    }

    /// Forget a peer. Returns whether it was known.
    pub fn remove(&mut self, agent: &AgentName) -> bool {
        let removed = self.peers.remove(agent).is_some();
        if removed {
            debug!(%agent, "peer removed");
        }
        removed
    }

    /// Apply one change: `Some` stores a definition, `None` removes the peer.
    pub fn apply(&mut self, agent: AgentName, definition: Option<Definition>) -> IopResult<bool> {
        match definition {
            Some(definition) => self.upsert(agent, definition),
            None => Ok(self.remove(&agent)),
        }
    }

    pub fn get(&self, agent: &AgentName) -> Option<&Arc<Definition>> {
        self.peers.get(agent)
    }

    pub fn contains(&self, agent: &AgentName) -> bool {
        self.peers.contains_key(agent)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&AgentName, &Arc<Definition>)> {
        self.peers.iter()
    }

    /// Peers selected by a mapping rule, in identity order.
    pub fn matching<'a>(
        &'a self,
        selector: &'a AgentSelector,
    ) -> Box<dyn Iterator<Item = (&'a AgentName, &'a Arc<Definition>)> + 'a> {
        match selector {
            AgentSelector::Any => Box::new(self.peers.iter()),
            AgentSelector::Named(name) => Box::new(self.peers.get_key_value(name).into_iter()),
        }
    }
}

/// Category templates registered locally, by name.
#[derive(Debug, Default, Clone)]
pub struct CategoryCatalog {
    categories: BTreeMap<String, Arc<Category>>,
}

impl CategoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a template.
    pub fn register(&mut self, category: Arc<Category>) {
        debug!(category = %category.name, version = %category.version, "category registered");
        self.categories.insert(category.name.clone(), category);
    }

    pub fn unregister(&mut self, name: &str) -> Option<Arc<Category>> {
        self.categories.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Category>> {
        self.categories.get(name)
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use iopmesh_protocol::{Iop, IopError, IopKind, ValueType};

    use super::*;

    fn definition(name: &str) -> Definition {
        Definition::new(name)
            .unwrap()
            .with_iop(IopKind::Output, Iop::new("out", ValueType::Integer).unwrap())
            .unwrap()
    }

    #[test]
    fn upsert_reports_real_changes_only() {
        let mut directory = PeerDirectory::new();
        let agent = AgentName::new("a");
        assert!(directory.upsert(agent.clone(), definition("a")).unwrap());
        assert!(!directory.upsert(agent.clone(), definition("a")).unwrap());
        assert!(
            directory
                .upsert(agent.clone(), definition("a").with_version("2"))
                .unwrap()
        );
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn malformed_definition_makes_peer_absent() {
        let mut directory = PeerDirectory::new();
        let agent = AgentName::new("a");
        directory.upsert(agent.clone(), definition("a")).unwrap();

        let json = r#"{"name": ""}"#;
        let broken: Definition = serde_json::from_str(json).unwrap();
        let err = directory.upsert(agent.clone(), broken).unwrap_err();
        assert!(matches!(err, IopError::MalformedDefinition(_)));
        assert!(!directory.contains(&agent));
    }

    #[test]
    fn matching_honours_selector() {
        let mut directory = PeerDirectory::new();
        for name in ["b", "a", "c"] {
            directory.upsert(name.into(), definition(name)).unwrap();
        }
        let any = AgentSelector::Any;
        let all: Vec<_> = directory.matching(&any).map(|(name, _)| name.as_str()).collect();
        assert_eq!(all, vec!["a", "b", "c"]);

        let one = AgentSelector::from("b");
        assert_eq!(directory.matching(&one).count(), 1);
        let none = AgentSelector::from("z");
        assert_eq!(directory.matching(&none).count(), 0);
    }

    #[test]
    fn apply_none_removes_peer() {
        let mut directory = PeerDirectory::new();
        directory.apply("a".into(), Some(definition("a"))).unwrap();
        assert!(directory.apply("a".into(), None).unwrap());
        assert!(!directory.apply("a".into(), None).unwrap());
        assert!(directory.is_empty());
    }

    #[test]
    fn catalog_replaces_by_name() {
        let mut catalog = CategoryCatalog::new();
        catalog.register(Arc::new(Category::new("Sensors", "1").unwrap()));
        catalog.register(Arc::new(Category::new("Sensors", "2").unwrap()));
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("Sensors").map(|c| c.version.as_str()), Some("2"));
        assert!(catalog.unregister("Sensors").is_some());
        assert!(catalog.is_empty());
    }
}
