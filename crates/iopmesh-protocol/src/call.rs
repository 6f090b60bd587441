//! Call declarations carried by a definition.
//!
//! A call is a named entry point with typed arguments that other agents may
//! invoke. Only the declaration lives here; sending and dispatching calls is
//! the transport's business.

use serde::{Deserialize, Serialize};

use crate::error::{IopError, IopResult};
use crate::iop::validate_name;
use crate::value::ValueType;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallArgument {
    pub name: String,
    #[serde(rename = "type")]
    pub value_type: ValueType,
}

/// A declared call and its ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    arguments: Vec<CallArgument>,
}

impl Call {
    pub fn new(name: impl Into<String>) -> IopResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            description: String::new(),
            arguments: Vec::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_argument(mut self, name: &str, value_type: ValueType) -> IopResult<Self> {
        self.add_argument(name, value_type)?;
        Ok(self)
    }

    pub fn arguments(&self) -> &[CallArgument] {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&CallArgument> {
        self.arguments.iter().find(|argument| argument.name == name)
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.argument(name).is_some()
    }

    /// Append an argument. Names are unique within a call.
    pub fn add_argument(&mut self, name: &str, value_type: ValueType) -> IopResult<()> {
        validate_name(name)?;
        if self.has_argument(name) {
            return Err(IopError::DuplicateName(name.to_owned()));
        }
        self.arguments.push(CallArgument {
            name: name.to_owned(),
            value_type,
        });
        Ok(())
    }

    pub fn remove_argument(&mut self, name: &str) -> IopResult<CallArgument> {
        let index = self
            .arguments
            .iter()
            .position(|argument| argument.name == name)
            .ok_or_else(|| IopError::UnknownArgument {
                call: self.name.clone(),
                argument: name.to_owned(),
            })?;
        Ok(self.arguments.remove(index))
    }

    /// Argument names and types in declaration order.
    pub fn signature(&self) -> Vec<(&str, ValueType)> {
        self.arguments
            .iter()
            .map(|argument| (argument.name.as_str(), argument.value_type))
            .collect()
    }

    pub(crate) fn validate(&self) -> IopResult<()> {
        validate_name(&self.name)?;
        for (index, argument) in self.arguments.iter().enumerate() {
            validate_name(&argument.name)?;
            if self.arguments[..index]
                .iter()
                .any(|earlier| earlier.name == argument.name)
            {
                return Err(IopError::DuplicateName(argument.name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arguments_keep_declaration_order_and_unique_names() {
        let mut call = Call::new("calibrate")
            .unwrap()
            .with_argument("offset", ValueType::Double)
            .unwrap()
            .with_argument("label", ValueType::String)
            .unwrap();
        assert_eq!(
            call.signature(),
            vec![("offset", ValueType::Double), ("label", ValueType::String)]
        );
        assert_eq!(
            call.add_argument("offset", ValueType::Integer),
            Err(IopError::DuplicateName("offset".into()))
        );
        assert!(call.add_argument(" ", ValueType::Bool).is_err());

        let removed = call.remove_argument("offset").unwrap();
        assert_eq!(removed.value_type, ValueType::Double);
        assert!(!call.has_argument("offset"));
        assert!(matches!(
            call.remove_argument("offset"),
            Err(IopError::UnknownArgument { .. })
        ));
    }

    #[test]
    fn call_serializes_arguments_with_type_key() {
        let call = Call::new("reset")
            .unwrap()
            .with_argument("hard", ValueType::Bool)
            .unwrap();
        let json = serde_json::to_value(&call).unwrap();
        assert_eq!(json["arguments"][0]["type"], "bool");
        assert!(json.get("description").is_none());

        let back: Call = serde_json::from_value(json).unwrap();
        assert_eq!(back, call);

        let duplicated: Call = serde_json::from_str(
            r#"{"name": "x", "arguments": [{"name": "a", "type": "bool"}, {"name": "a", "type": "data"}]}"#,
        )
        .unwrap();
        assert!(duplicated.validate().is_err());
    }
}
