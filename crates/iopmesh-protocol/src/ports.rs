//! Boundary towards the transport layer.
//!
//! The core never touches sockets. It reports the side effects the network
//! must act on through [`TransportPort`]; transports feed the core back
//! through [`crate::event::InboundEvent`]s.

use std::sync::Arc;

use crate::event::OutboundEvent;
use crate::ids::AgentName;
use crate::value::ValueType;

/// Sink for the side effects of an agent. Calls happen synchronously inside
/// the agent's serialized event pass and must not block.
pub trait TransportPort: Send + Sync {
    /// An output was written and is not muted.
    fn publish_requested(&self, output: &str, value_type: ValueType, payload: &[u8]);

    /// Subscriptions are per publisher, not per mapping link. `active = true`
    /// arrives when the first ON link reading `agent`.`output` appears and
    /// `false` once the last one is gone; entries sharing a publisher never
    /// produce a second subscribe or an early unsubscribe.
    fn subscription_changed(&self, agent: &AgentName, output: &str, active: bool);

    /// Ask `agent` to send the current value of `output` again. Only emitted
    /// right after a subscribe, when the agent is configured to request the
    /// outputs of mapped agents. Ignored by default.
    fn output_requested(&self, _agent: &AgentName, _output: &str) {}

    /// Dispatch an [`OutboundEvent`] to the matching method.
    fn emit(&self, event: &OutboundEvent) {
        match event {
            OutboundEvent::PublishRequested {
                output,
                value_type,
                payload,
            } => self.publish_requested(output, *value_type, payload),
            OutboundEvent::SubscriptionChanged {
                agent,
                output,
                active,
            } => self.subscription_changed(agent, output, *active),
            OutboundEvent::OutputRequested { agent, output } => self.output_requested(agent, output),
        }
    }
}

impl<T: TransportPort + ?Sized> TransportPort for Arc<T> {
    fn publish_requested(&self, output: &str, value_type: ValueType, payload: &[u8]) {
        (**self).publish_requested(output, value_type, payload);
    }

    fn subscription_changed(&self, agent: &AgentName, output: &str, active: bool) {
        (**self).subscription_changed(agent, output, active);
    }

    fn output_requested(&self, agent: &AgentName, output: &str) {
        (**self).output_requested(agent, output);
    }
}

/// Transport that drops every side effect. Useful for agents without a network.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

impl TransportPort for NullTransport {
    fn publish_requested(&self, _output: &str, _value_type: ValueType, _payload: &[u8]) {}

    fn subscription_changed(&self, _agent: &AgentName, _output: &str, _active: bool) {}
}
