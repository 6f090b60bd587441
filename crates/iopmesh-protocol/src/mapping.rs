//! Mapping rules: declarative connections from this agent's inputs to remote
//! outputs, either by output name or at category granularity.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IopError, IopResult};
use crate::ids::{AgentName, MappingId};

/// Live verdict of the resolver for one mapping entry.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MapState {
    #[default]
    Off,
    On,
    Incompatible,
    Generic,
}

impl MapState {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapState::Off => "OFF",
            MapState::On => "ON",
            MapState::Incompatible => "INCOMPATIBLE",
            MapState::Generic => "GENERIC",
        }
    }
}

impl fmt::Display for MapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which remote agents a rule applies to. Serialized as the agent name, or `"*"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentSelector {
    Any,
    Named(AgentName),
}

impl AgentSelector {
    pub const WILDCARD: &'static str = "*";

    pub fn matches(&self, agent: &AgentName) -> bool {
        match self {
            AgentSelector::Any => true,
            AgentSelector::Named(name) => name == agent,
        }
    }
}

impl From<String> for AgentSelector {
    fn from(value: String) -> Self {
        if value == Self::WILDCARD {
            AgentSelector::Any
        } else {
            AgentSelector::Named(AgentName::from(value))
        }
    }
}

impl From<&str> for AgentSelector {
    fn from(value: &str) -> Self {
        AgentSelector::from(value.to_owned())
    }
}

impl From<AgentSelector> for String {
    fn from(selector: AgentSelector) -> Self {
        match selector {
            AgentSelector::Any => AgentSelector::WILDCARD.to_owned(),
            AgentSelector::Named(name) => name.as_str().to_owned(),
        }
    }
}

impl fmt::Display for AgentSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentSelector::Any => f.write_str(Self::WILDCARD),
            AgentSelector::Named(name) => write!(f, "{name}"),
        }
    }
}

/// What a rule connects to on the remote side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingTarget {
    /// Local `input` fed by the remote output named `output`.
    Output { input: String, output: String },
    /// Every output member of `category` feeds the local input of the same name.
    Category { category: String },
}

/// A declarative mapping rule, without identity or live state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MappingRule {
    pub agent: AgentSelector,
    #[serde(flatten)]
    pub target: MappingTarget,
}

impl MappingRule {
    /// `input` ← `agent`.`output`
    pub fn output(
        input: impl Into<String>,
        agent: impl Into<AgentSelector>,
        output: impl Into<String>,
    ) -> Self {
        Self {
            agent: agent.into(),
            target: MappingTarget::Output {
                input: input.into(),
                output: output.into(),
            },
        }
    }

    pub fn category(agent: impl Into<AgentSelector>, category: impl Into<String>) -> Self {
        Self {
            agent: agent.into(),
            target: MappingTarget::Category {
                category: category.into(),
            },
        }
    }

    /// Local input named by the rule; category rules name none.
    pub fn input_name(&self) -> Option<&str> {
        match &self.target {
            MappingTarget::Output { input, .. } => Some(input),
            MappingTarget::Category { .. } => None,
        }
    }

    pub fn is_category(&self) -> bool {
        matches!(self.target, MappingTarget::Category { .. })
    }

    pub fn matches_triple(&self, input: &str, agent: &str, output: &str) -> bool {
        match &self.target {
            MappingTarget::Output {
                input: rule_input,
                output: rule_output,
            } => {
                rule_input == input
                    && rule_output == output
                    && String::from(self.agent.clone()) == agent
            }
            MappingTarget::Category { .. } => false,
        }
    }

    /// Initial live state: category rules carry the GENERIC marker for life.
    pub fn initial_state(&self) -> MapState {
        if self.is_category() {
            MapState::Generic
        } else {
            MapState::Off
        }
    }
}

impl fmt::Display for MappingRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            MappingTarget::Output { input, output } => {
                write!(f, "{input} <- {}.{output}", self.agent)
            }
            MappingTarget::Category { category } => {
                write!(f, "* <- {}[{category}]", self.agent)
            }
        }
    }
}

/// A rule owned by a mapping table, with its id and live state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappingEntry {
    pub id: MappingId,
    #[serde(flatten)]
    pub rule: MappingRule,
    pub state: MapState,
}

/// The exchangeable mapping document: metadata plus rules in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub rules: Vec<MappingRule>,
}

impl Mapping {
    pub fn from_json(json: &str) -> IopResult<Self> {
        let mapping: Mapping = serde_json::from_str(json)?;
        for rule in &mapping.rules {
            let empty = match &rule.target {
                MappingTarget::Output { input, output } => {
                    input.trim().is_empty() || output.trim().is_empty()
                }
                MappingTarget::Category { category } => category.trim().is_empty(),
            };
            if empty {
                return Err(IopError::InvalidName(rule.to_string()));
            }
        }
        Ok(mapping)
    }

    pub fn to_json(&self) -> IopResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
