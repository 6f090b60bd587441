//! Categories, definitions, and structural compatibility checks.
//!
//! A [`Definition`] is an agent's full interface. Its *effective* IOP set is
//! the union of its own IOPs and every IOP contributed by its categories;
//! a name appearing twice within one kind is a load-time error.
//!
//! Compatibility policy:
//! - [`check_category`] is structural: same name, same kind, same value type.
//!   Values, mute flags and version strings are ignored.
//! - [`are_identical`] is stricter: definition name and version must match,
//!   along with the full effective IOP set, its value types and the declared
//!   call signatures.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

use crate::call::Call;
use crate::error::{IopError, IopResult};
use crate::iop::{Iop, IopKind, IopTable, validate_name};
use crate::value::ValueType;

/// Which side of a category a compatibility check covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryScope {
    Global,
    OutputOnly,
    InputOnly,
}

impl CategoryScope {
    pub fn kinds(&self) -> &'static [IopKind] {
        match self {
            CategoryScope::Global => &IopKind::ALL,
            CategoryScope::OutputOnly => &[IopKind::Output],
            CategoryScope::InputOnly => &[IopKind::Input],
        }
    }
}

/// A named, versioned, reusable bundle of IOP declarations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(flatten)]
    pub iops: IopTable,
}

impl Category {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> IopResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            version: version.into(),
            iops: IopTable::new(),
        })
    }

    /// Builder-style declaration of one IOP template.
    pub fn with_iop(mut self, kind: IopKind, iop: Iop) -> IopResult<Self> {
        self.iops.insert(kind, iop)?;
        Ok(self)
    }

    pub fn from_json(json: &str) -> IopResult<Self> {
        let category: Category = serde_json::from_str(json)
            .map_err(|err| IopError::MalformedDefinition(err.to_string()))?;
        validate_name(&category.name)?;
        Ok(category)
    }

    pub fn to_json(&self) -> IopResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// An agent's declared interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    categories: Vec<Arc<Category>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    calls: Vec<Call>,
    #[serde(flatten)]
    own: IopTable,
}

impl Definition {
    pub fn new(name: impl Into<String>) -> IopResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        Ok(Self {
            name,
            description: String::new(),
            version: String::new(),
            categories: Vec::new(),
            calls: Vec::new(),
            own: IopTable::new(),
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn with_iop(mut self, kind: IopKind, iop: Iop) -> IopResult<Self> {
        self.add_iop(kind, iop)?;
        Ok(self)
    }

    pub fn with_category(mut self, category: Arc<Category>) -> IopResult<Self> {
        self.add_category(category)?;
        Ok(self)
    }

    pub fn with_call(mut self, call: Call) -> IopResult<Self> {
        self.add_call(call)?;
        Ok(self)
    }

    /// Parse and validate a definition from JSON text.
    pub fn from_json(json: &str) -> IopResult<Self> {
        let definition: Definition = serde_json::from_str(json)
            .map_err(|err| IopError::MalformedDefinition(err.to_string()))?;
        definition.validate()?;
        Ok(definition)
    }

    pub fn to_json(&self) -> IopResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check internal consistency: a valid name, distinct categories and
    /// calls, and no name collision between sources within one kind.
    pub fn validate(&self) -> IopResult<()> {
        validate_name(&self.name)
            .map_err(|_| IopError::MalformedDefinition("definition name is empty".to_owned()))?;
        let mut seen = HashSet::new();
        for category in &self.categories {
            if !seen.insert(category.name.as_str()) {
                return Err(IopError::MalformedDefinition(format!(
                    "category {} referenced twice",
                    category.name
                )));
            }
        }
        let mut calls = HashSet::new();
        for call in &self.calls {
            call.validate()
                .map_err(|err| IopError::MalformedDefinition(format!("call {}: {err}", call.name)))?;
            if !calls.insert(call.name.as_str()) {
                return Err(IopError::MalformedDefinition(format!(
                    "call {} declared twice",
                    call.name
                )));
            }
        }
        self.effective_table().map(|_| ())
    }

    pub fn categories(&self) -> &[Arc<Category>] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&Arc<Category>> {
        self.categories.iter().find(|category| category.name == name)
    }

    pub fn has_category(&self, name: &str) -> bool {
        self.category(name).is_some()
    }

    /// IOPs declared directly by this definition, without category members.
    pub fn own_iops(&self) -> &IopTable {
        &self.own
    }

    /// Name of the category contributing `name` in `kind`, if any.
    pub fn contributing_category(&self, kind: IopKind, name: &str) -> Option<&str> {
        self.categories
            .iter()
            .find(|category| category.iops.contains(kind, name))
            .map(|category| category.name.as_str())
    }

    /// Look up an IOP in the effective set.
    pub fn find_iop(&self, kind: IopKind, name: &str) -> Option<&Iop> {
        self.own.find(kind, name).or_else(|| {
            self.categories
                .iter()
                .find_map(|category| category.iops.find(kind, name))
        })
    }

    pub fn effective_iops(&self, kind: IopKind) -> impl Iterator<Item = &Iop> {
        self.own.iter(kind).chain(
            self.categories
                .iter()
                .flat_map(move |category| category.iops.iter(kind)),
        )
    }

    /// Materialize the effective IOP set; fails on name collisions.
    pub fn effective_table(&self) -> IopResult<IopTable> {
        let mut table = self.own.clone();
        for category in &self.categories {
            for (kind, iop) in category.iops.iter_all() {
                table.insert(kind, iop.clone()).map_err(|_| {
                    IopError::MalformedDefinition(format!(
                        "{kind} {} from category {} collides with another declaration",
                        iop.name(),
                        category.name
                    ))
                })?;
            }
        }
        Ok(table)
    }

    /// Declare an IOP owned by this definition.
    pub fn add_iop(&mut self, kind: IopKind, iop: Iop) -> IopResult<()> {
        if self.contributing_category(kind, iop.name()).is_some() {
            return Err(IopError::DuplicateName(iop.name().to_owned()));
        }
        self.own.insert(kind, iop)
    }

    /// Remove an own IOP. Members contributed by a category cannot be removed
    /// individually since the definition would no longer satisfy it.
    pub fn remove_iop(&mut self, kind: IopKind, name: &str) -> IopResult<Iop> {
        if let Some(category) = self.contributing_category(kind, name) {
            return Err(IopError::MalformedDefinition(format!(
                "{kind} {name} is declared by category {category}"
            )));
        }
        self.own.remove(kind, name)
    }

    /// Adopt a category. Rejected if it is already referenced or if any of its
    /// members collides with an existing effective IOP.
    pub fn add_category(&mut self, category: Arc<Category>) -> IopResult<()> {
        if self.has_category(&category.name) {
            return Err(IopError::DuplicateName(category.name.clone()));
        }
        for (kind, iop) in category.iops.iter_all() {
            if self.find_iop(kind, iop.name()).is_some() {
                return Err(IopError::MalformedDefinition(format!(
                    "{kind} {} from category {} collides with another declaration",
                    iop.name(),
                    category.name
                )));
            }
        }
        self.categories.push(category);
        Ok(())
    }

    // ---- calls ----

    pub fn calls(&self) -> &[Call] {
        &self.calls
    }

    pub fn call(&self, name: &str) -> Option<&Call> {
        self.calls.iter().find(|call| call.name == name)
    }

    pub fn has_call(&self, name: &str) -> bool {
        self.call(name).is_some()
    }

    pub fn call_names(&self) -> Vec<String> {
        self.calls.iter().map(|call| call.name.clone()).collect()
    }

    fn call_mut(&mut self, name: &str) -> IopResult<&mut Call> {
        self.calls
            .iter_mut()
            .find(|call| call.name == name)
            .ok_or_else(|| IopError::UnknownCall(name.to_owned()))
    }

    pub fn add_call(&mut self, call: Call) -> IopResult<()> {
        call.validate()?;
        if self.has_call(&call.name) {
            return Err(IopError::DuplicateName(call.name));
        }
        self.calls.push(call);
        Ok(())
    }

    pub fn remove_call(&mut self, name: &str) -> IopResult<Call> {
        let index = self
            .calls
            .iter()
            .position(|call| call.name == name)
            .ok_or_else(|| IopError::UnknownCall(name.to_owned()))?;
        Ok(self.calls.remove(index))
    }

    pub fn add_argument_to_call(
        &mut self,
        call: &str,
        argument: &str,
        value_type: ValueType,
    ) -> IopResult<()> {
        self.call_mut(call)?.add_argument(argument, value_type)
    }

    pub fn remove_argument_from_call(&mut self, call: &str, argument: &str) -> IopResult<()> {
        self.call_mut(call)?.remove_argument(argument).map(|_| ())
    }
}

/// Structural compatibility of one definition IOP with a category template:
/// names and value types only.
pub fn check_category_iop(definition_iop: &Iop, template: &Iop) -> bool {
    definition_iop.name() == template.name() && definition_iop.value_type() == template.value_type()
}

/// True iff every template of `category` within `scope` has a same-named,
/// same-kind, same-typed counterpart in the effective IOP set of `definition`.
/// Extra IOPs on the definition are allowed.
pub fn check_category(definition: &Definition, category: &Category, scope: CategoryScope) -> bool {
    scope.kinds().iter().all(|&kind| {
        category.iops.iter(kind).all(|template| {
            definition
                .find_iop(kind, template.name())
                .is_some_and(|iop| check_category_iop(iop, template))
        })
    })
}

/// Identity used to decide whether two definitions describe the same logical
/// agent: name, version, the full effective IOP set with value types, and the
/// call signatures.
pub fn are_identical(a: &Definition, b: &Definition) -> bool {
    if a.name != b.name || a.version != b.version {
        return false;
    }
    let calls = |definition: &Definition| -> HashSet<(String, Vec<(String, ValueType)>)> {
        definition
            .calls
            .iter()
            .map(|call| {
                let signature = call
                    .signature()
                    .into_iter()
                    .map(|(name, value_type)| (name.to_owned(), value_type))
                    .collect();
                (call.name.clone(), signature)
            })
            .collect()
    };
    if calls(a) != calls(b) {
        return false;
    }
    IopKind::ALL.into_iter().all(|kind| {
        let left: HashSet<_> = a
            .effective_iops(kind)
            .map(|iop| (iop.name(), iop.value_type()))
            .collect();
        let right: HashSet<_> = b
            .effective_iops(kind)
            .map(|iop| (iop.name(), iop.value_type()))
            .collect();
        left == right
    })
}
