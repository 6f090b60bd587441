//! Events exchanged with the transport collaborator.
//!
//! Inbound events are what the network reports to an agent; outbound events
//! are the side effects an agent asks the network to carry out.

use serde::{Deserialize, Serialize};

use crate::definition::Definition;
use crate::ids::AgentName;
use crate::value::ValueType;

/// Network notifications consumed by an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// A peer published a definition; `None` signals that the peer left.
    PeerDefinitionChanged {
        agent: AgentName,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        definition: Option<Definition>,
    },
    /// A peer's output value arrived.
    ValueReceived {
        agent: AgentName,
        output: String,
        value_type: ValueType,
        payload: Vec<u8>,
    },
}

impl InboundEvent {
    pub fn agent(&self) -> &AgentName {
        match self {
            InboundEvent::PeerDefinitionChanged { agent, .. }
            | InboundEvent::ValueReceived { agent, .. } => agent,
        }
    }
}

/// Side effects an agent emits towards the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    /// A non-muted output changed and must be published.
    PublishRequested {
        output: String,
        value_type: ValueType,
        payload: Vec<u8>,
    },
    /// The first ON link to a publisher appeared (`active`) or the last one
    /// went away.
    SubscriptionChanged {
        agent: AgentName,
        output: String,
        active: bool,
    },
    /// A freshly subscribed publisher should resend its current value.
    OutputRequested { agent: AgentName, output: String },
}
