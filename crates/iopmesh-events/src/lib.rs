//! Transport adapters that turn an agent's side effects into records.
//!
//! - [`EventStreamHub`]: broadcast fan-out of [`OutboundRecord`]s
//! - [`BroadcastTransport`]: [`TransportPort`] that stamps and publishes to a hub
//! - [`RecordingTransport`]: in-memory log, mostly for tests and the daemon
//! - [`FanoutTransport`]: forwards each side effect to several transports

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use iopmesh_protocol::{AgentName, OutboundEvent, TransportPort, ValueType};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{debug, trace};

/// An outbound event stamped with its emitter, a per-transport sequence
/// number and the emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundRecord {
    pub agent: AgentName,
    pub sequence: u64,
    pub at: DateTime<Utc>,
    pub event: OutboundEvent,
}

impl OutboundRecord {
    pub fn new(agent: AgentName, sequence: u64, event: OutboundEvent) -> Self {
        Self {
            agent,
            sequence,
            at: Utc::now(),
            event,
        }
    }
}

#[derive(Clone, Debug)]
pub struct EventStreamHub {
    sender: broadcast::Sender<OutboundRecord>,
}

impl EventStreamHub {
    pub fn new(buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self { sender }
    }

    /// Publish to current subscribers. Records are dropped when nobody listens.
    pub fn publish(&self, record: OutboundRecord) {
        let _ = self.sender.send(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OutboundRecord> {
        self.sender.subscribe()
    }

    pub fn subscribe_stream(&self) -> BroadcastStream<OutboundRecord> {
        BroadcastStream::new(self.sender.subscribe())
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Publishes every side effect of one agent to an [`EventStreamHub`].
#[derive(Debug)]
pub struct BroadcastTransport {
    agent: AgentName,
    hub: EventStreamHub,
    sequence: AtomicU64,
}

impl BroadcastTransport {
    pub fn new(agent: impl Into<AgentName>, hub: EventStreamHub) -> Self {
        Self {
            agent: agent.into(),
            hub,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn hub(&self) -> &EventStreamHub {
        &self.hub
    }

    /// Sequence number of the last published record, 0 before the first.
    pub fn latest_sequence(&self) -> u64 {
        self.sequence.load(Ordering::SeqCst)
    }

    fn publish(&self, event: OutboundEvent) {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        trace!(agent = %self.agent, sequence, "outbound event published");
        self.hub
            .publish(OutboundRecord::new(self.agent.clone(), sequence, event));
    }
}

impl TransportPort for BroadcastTransport {
    fn publish_requested(&self, output: &str, value_type: ValueType, payload: &[u8]) {
        self.publish(OutboundEvent::PublishRequested {
            output: output.to_owned(),
            value_type,
            payload: payload.to_vec(),
        });
    }

    fn subscription_changed(&self, agent: &AgentName, output: &str, active: bool) {
        self.publish(OutboundEvent::SubscriptionChanged {
            agent: agent.clone(),
            output: output.to_owned(),
            active,
        });
    }

    fn output_requested(&self, agent: &AgentName, output: &str) {
        self.publish(OutboundEvent::OutputRequested {
            agent: agent.clone(),
            output: output.to_owned(),
        });
    }
}

/// Keeps every side effect in emission order.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    events: Mutex<Vec<OutboundEvent>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().clone()
    }

    /// Drain the log.
    pub fn take(&self) -> Vec<OutboundEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Subscription changes as (agent, output, active).
    pub fn subscriptions(&self) -> Vec<(AgentName, String, bool)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                OutboundEvent::SubscriptionChanged {
                    agent,
                    output,
                    active,
                } => Some((agent.clone(), output.clone(), *active)),
                _ => None,
            })
            .collect()
    }

    /// Publish requests as (output, type, payload).
    pub fn publications(&self) -> Vec<(String, ValueType, Vec<u8>)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                OutboundEvent::PublishRequested {
                    output,
                    value_type,
                    payload,
                } => Some((output.clone(), *value_type, payload.clone())),
                _ => None,
            })
            .collect()
    }

    /// Output requests as (agent, output).
    pub fn requests(&self) -> Vec<(AgentName, String)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                OutboundEvent::OutputRequested { agent, output } => {
                    Some((agent.clone(), output.clone()))
                }
                _ => None,
            })
            .collect()
    }
}

impl TransportPort for RecordingTransport {
    fn publish_requested(&self, output: &str, value_type: ValueType, payload: &[u8]) {
        self.events.lock().push(OutboundEvent::PublishRequested {
            output: output.to_owned(),
            value_type,
            payload: payload.to_vec(),
        });
    }

    fn subscription_changed(&self, agent: &AgentName, output: &str, active: bool) {
        self.events.lock().push(OutboundEvent::SubscriptionChanged {
            agent: agent.clone(),
            output: output.to_owned(),
            active,
        });
    }

    fn output_requested(&self, agent: &AgentName, output: &str) {
        self.events.lock().push(OutboundEvent::OutputRequested {
            agent: agent.clone(),
            output: output.to_owned(),
        });
    }
}

/// Forwards each side effect to every inner transport, in insertion order.
#[derive(Default, Clone)]
pub struct FanoutTransport {
    sinks: Vec<Arc<dyn TransportPort>>,
}

impl FanoutTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn TransportPort>) -> Self {
        self.sinks.push(sink);
        debug!(sinks = self.sinks.len(), "transport added to fan-out");
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl TransportPort for FanoutTransport {
    fn publish_requested(&self, output: &str, value_type: ValueType, payload: &[u8]) {
        for sink in &self.sinks {
            sink.publish_requested(output, value_type, payload);
        }
    }

    fn subscription_changed(&self, agent: &AgentName, output: &str, active: bool) {
        for sink in &self.sinks {
            sink.subscription_changed(agent, output, active);
        }
    }

    fn output_requested(&self, agent: &AgentName, output: &str) {
        for sink in &self.sinks {
            sink.output_requested(agent, output);
        }
    }
}
