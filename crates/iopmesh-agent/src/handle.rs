use std::sync::Arc;

use iopmesh_protocol::{InboundEvent, IopResult};
use iopmesh_resolver::SubscriptionChange;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::agent::{Agent, DeliveryReport};

/// What an inbound event did to the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundOutcome {
    Peer(Vec<SubscriptionChange>),
    Delivery(DeliveryReport),
}

/// Shared, serialized access to one [`Agent`]. Every clone drives the same
/// agent; calls never interleave.
#[derive(Clone)]
pub struct AgentHandle {
    inner: Arc<Mutex<Agent>>,
}

impl AgentHandle {
    pub fn new(agent: Agent) -> Self {
        Self {
            inner: Arc::new(Mutex::new(agent)),
        }
    }

    /// Run `f` with exclusive access to the agent. Observers already run
    /// under this lock with `&mut Agent` and must not call back into the handle.
    pub fn with<R>(&self, f: impl FnOnce(&mut Agent) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Single entry point for transport notifications.
    pub fn handle(&self, event: InboundEvent) -> IopResult<InboundOutcome> {
        let mut agent = self.inner.lock();
        match event {
            InboundEvent::PeerDefinitionChanged { agent: peer, definition } => agent
                .on_peer_definition_changed(peer, definition)
                .map(InboundOutcome::Peer),
            InboundEvent::ValueReceived {
                agent: peer,
                output,
                value_type,
                payload,
            } => agent
                .deliver(&peer, &output, value_type, &payload)
                .map(InboundOutcome::Delivery),
        }
    }

    /// Feed events from `rx` until every sender is dropped. Failures are
    /// logged and do not stop the loop. Returns the number of events handled.
    pub async fn drain(&self, mut rx: mpsc::Receiver<InboundEvent>) -> usize {
        let mut handled = 0;
        while let Some(event) = rx.recv().await {
            let peer = event.agent().clone();
            match self.handle(event) {
                Ok(outcome) => debug!(%peer, ?outcome, "inbound event handled"),
                Err(err) => warn!(%peer, error = %err, "inbound event failed"),
            }
            handled += 1;
        }
        handled
    }
}
