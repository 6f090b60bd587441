//! IOPs (inputs, outputs, parameters) and the per-kind name tables that own them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{IopError, IopResult};
use crate::value::{IopValue, ValueType};

/// The three IOP namespaces. A name is unique within one kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IopKind {
    Input,
    Output,
    Parameter,
}

impl IopKind {
    pub const ALL: [IopKind; 3] = [IopKind::Input, IopKind::Output, IopKind::Parameter];

    pub fn as_str(&self) -> &'static str {
        match self {
            IopKind::Input => "input",
            IopKind::Output => "output",
            IopKind::Parameter => "parameter",
        }
    }
}

impl fmt::Display for IopKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Serialized shape of an [`Iop`]; the value is optional and defaults by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct IopRepr {
    name: String,
    #[serde(rename = "type")]
    value_type: ValueType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<IopValue>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    muted: bool,
}

/// A named, typed data slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "IopRepr", into = "IopRepr")]
pub struct Iop {
    name: String,
    value_type: ValueType,
    value: IopValue,
    muted: bool,
}

impl Iop {
    /// New IOP holding the default value of its type.
    pub fn new(name: impl Into<String>, value_type: ValueType) -> IopResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            value_type,
            value: IopValue::default_for(value_type),
            muted: false,
        })
    }

    /// New IOP whose type is taken from its initial value.
    pub fn with_value(name: impl Into<String>, value: IopValue) -> IopResult<Self> {
        let mut iop = Self::new(name, value.value_type())?;
        iop.value = value;
        Ok(iop)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn value(&self) -> &IopValue {
        &self.value
    }

    /// Size in bytes of the current value.
    pub fn size(&self) -> usize {
        self.value.size()
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Replace the value. The new value must carry the declared type.
    pub fn set_value(&mut self, value: IopValue) -> IopResult<()> {
        if value.value_type() != self.value_type {
            return Err(IopError::TypeMismatch {
                name: self.name.clone(),
                expected: self.value_type,
                actual: value.value_type(),
            });
        }
        self.value = value;
        Ok(())
    }

    /// Reset to the default value of the declared type.
    pub fn clear(&mut self) {
        self.value = IopValue::default_for(self.value_type);
    }
}

impl TryFrom<IopRepr> for Iop {
    type Error = IopError;

    fn try_from(repr: IopRepr) -> Result<Self, Self::Error> {
        let mut iop = Iop::new(repr.name, repr.value_type)?;
        if let Some(value) = repr.value {
            iop.set_value(value)
                .map_err(|err| IopError::MalformedDefinition(err.to_string()))?;
        }
        iop.muted = repr.muted;
        Ok(iop)
    }
}

impl From<Iop> for IopRepr {
    fn from(iop: Iop) -> Self {
        Self {
            name: iop.name,
            value_type: iop.value_type,
            value: Some(iop.value),
            muted: iop.muted,
        }
    }
}

pub(crate) fn validate_name(name: &str) -> IopResult<()> {
    if name.trim().is_empty() {
        return Err(IopError::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// Inputs, outputs and parameters, each keyed by name in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IopTable {
    #[serde(default, skip_serializing_if = "IndexMap::is_empty", with = "iop_list")]
    inputs: IndexMap<String, Iop>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty", with = "iop_list")]
    outputs: IndexMap<String, Iop>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty", with = "iop_list")]
    parameters: IndexMap<String, Iop>,
}

impl IopTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn namespace(&self, kind: IopKind) -> &IndexMap<String, Iop> {
        match kind {
            IopKind::Input => &self.inputs,
            IopKind::Output => &self.outputs,
            IopKind::Parameter => &self.parameters,
        }
    }

    fn namespace_mut(&mut self, kind: IopKind) -> &mut IndexMap<String, Iop> {
        match kind {
            IopKind::Input => &mut self.inputs,
            IopKind::Output => &mut self.outputs,
            IopKind::Parameter => &mut self.parameters,
        }
    }

    pub fn find(&self, kind: IopKind, name: &str) -> Option<&Iop> {
        self.namespace(kind).get(name)
    }

    pub fn find_mut(&mut self, kind: IopKind, name: &str) -> Option<&mut Iop> {
        self.namespace_mut(kind).get_mut(name)
    }

    pub fn contains(&self, kind: IopKind, name: &str) -> bool {
        self.namespace(kind).contains_key(name)
    }

    /// Add an IOP; fails with `DuplicateName` if the name is taken in `kind`.
    pub fn insert(&mut self, kind: IopKind, iop: Iop) -> IopResult<()> {
        let namespace = self.namespace_mut(kind);
        if namespace.contains_key(iop.name()) {
            return Err(IopError::DuplicateName(iop.name().to_owned()));
        }
        namespace.insert(iop.name().to_owned(), iop);
        Ok(())
    }

    pub fn remove(&mut self, kind: IopKind, name: &str) -> IopResult<Iop> {
        self.namespace_mut(kind)
            .shift_remove(name)
            .ok_or_else(|| IopError::unknown(kind, name))
    }

    pub fn iter(&self, kind: IopKind) -> impl Iterator<Item = &Iop> {
        self.namespace(kind).values()
    }

    /// Every IOP with its kind: inputs, then outputs, then parameters.
    pub fn iter_all(&self) -> impl Iterator<Item = (IopKind, &Iop)> {
        IopKind::ALL
            .into_iter()
            .flat_map(move |kind| self.iter(kind).map(move |iop| (kind, iop)))
    }

    pub fn names(&self, kind: IopKind) -> Vec<String> {
        self.namespace(kind).keys().cloned().collect()
    }

    pub fn count(&self, kind: IopKind) -> usize {
        self.namespace(kind).len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty() && self.outputs.is_empty() && self.parameters.is_empty()
    }

    pub fn clear(&mut self) {
        self.inputs.clear();
        self.outputs.clear();
        self.parameters.clear();
    }
}

/// IOP namespaces travel as JSON arrays; duplicates are rejected on load.
mod iop_list {
    use indexmap::IndexMap;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Iop;

    pub fn serialize<S: Serializer>(
        map: &IndexMap<String, Iop>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(map.values())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<IndexMap<String, Iop>, D::Error> {
        let list = Vec::<Iop>::deserialize(deserializer)?;
        let mut map = IndexMap::with_capacity(list.len());
        for iop in list {
            let name = iop.name().to_owned();
            if map.insert(name.clone(), iop).is_some() {
                return Err(D::Error::custom(format!("duplicate name: {name}")));
            }
        }
        Ok(map)
    }
}
