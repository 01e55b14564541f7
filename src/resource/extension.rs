//! Capability declaration and compilation for [`Resource`].
//!
//! Declarations are recorded in two phases: a [`Declarations`] set holds
//! `(name, implementation)` pairs for operations and subresources, and a
//! [`CapabilityTable`] is compiled from them lazily, once per resource,
//! composing the parent resource's table first, then local declarations.
//!
//! An operation is a terminal capability: invoking it yields an
//! [`OperationCall`] (a verb-bearing resource plus an optional payload)
//! ready for the pipeline. A subresource capability yields a child
//! resource with any nested declarations applied; subresources compose
//! but never re-expose the declaration primitives themselves.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::RestError;

use super::Resource;

/// The implementation of a declared operation: transforms a scratch
/// subresource of the receiver using the call's arguments and returns the
/// terminal call descriptor.
pub type OperationFn =
    Arc<dyn Fn(Resource, &[Value]) -> Result<OperationCall, RestError> + Send + Sync>;

/// The implementation of a declared subresource: shapes a scratch
/// subresource of the receiver from the call's arguments.
pub type SubresourceFn =
    Arc<dyn Fn(Resource, &[Value]) -> Result<Resource, RestError> + Send + Sync>;

/// A terminal capability invocation, ready for the operation pipeline.
#[derive(Debug, Clone)]
pub struct OperationCall {
    /// The fully shaped resource, verb included.
    pub resource: Resource,
    /// The caller-supplied payload, if the operation binds one.
    pub payload: Option<Value>,
}

/// An ordered set of recorded capability declarations.
///
/// Within one set a name may not be declared as both an operation and a
/// subresource, in either order; redeclaring the same kind overrides the
/// earlier entry at compile time.
#[derive(Clone, Default)]
pub struct Declarations {
    operations: Vec<(String, OperationFn)>,
    subresources: Vec<(String, SubresourceFn, Option<Declarations>)>,
}

impl Declarations {
    /// Creates an empty declaration set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether anything has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty() && self.subresources.is_empty()
    }

    /// Declares a named operation.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Declaration`] if `name` is already declared
    /// as a subresource.
    pub fn operation(mut self, name: &str, implementation: OperationFn) -> Result<Self, RestError> {
        if self.subresources.iter().any(|(n, _, _)| n == name) {
            return Err(RestError::Declaration {
                name: format!("{name} has already been defined as a subresource"),
            });
        }
        self.operations.push((name.to_string(), implementation));
        Ok(self)
    }

    /// Declares a named subresource, optionally carrying nested
    /// declarations applied to each child it produces.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Declaration`] if `name` is already declared
    /// as an operation.
    pub fn subresource(
        mut self,
        name: &str,
        implementation: SubresourceFn,
        nested: Option<Declarations>,
    ) -> Result<Self, RestError> {
        if self.operations.iter().any(|(n, _)| n == name) {
            return Err(RestError::Declaration {
                name: format!("{name} has already been defined as an operation"),
            });
        }
        self.subresources.push((name.to_string(), implementation, nested));
        Ok(self)
    }

    /// Appends another declaration set after this one, re-checking the
    /// operation/subresource collision rule across the combined set.
    pub(crate) fn merged(mut self, other: Self) -> Result<Self, RestError> {
        for (name, implementation) in other.operations {
            self = self.operation(&name, implementation)?;
        }
        for (name, implementation, nested) in other.subresources {
            self = self.subresource(&name, implementation, nested)?;
        }
        Ok(self)
    }
}

impl fmt::Debug for Declarations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Declarations")
            .field(
                "operations",
                &self.operations.iter().map(|(n, _)| n).collect::<Vec<_>>(),
            )
            .field(
                "subresources",
                &self.subresources.iter().map(|(n, _, _)| n).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// One compiled capability.
#[derive(Clone)]
pub enum Capability {
    /// A terminal operation.
    Operation(OperationFn),
    /// A child-resource producer with optional nested declarations.
    Subresource(SubresourceFn, Option<Declarations>),
}

impl fmt::Debug for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(_) => f.write_str("Operation"),
            Self::Subresource(_, nested) => {
                f.debug_tuple("Subresource").field(nested).finish()
            }
        }
    }
}

/// The immutable name → capability lookup table compiled from a
/// resource's declarations, parent table first.
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    entries: BTreeMap<String, Capability>,
}

impl CapabilityTable {
    /// Compiles a table: parent entries first, then local subresources,
    /// then local operations, later entries overriding earlier ones.
    pub(crate) fn compile(parent: Option<&Self>, declarations: &Declarations) -> Self {
        let mut entries = parent.map(|p| p.entries.clone()).unwrap_or_default();
        for (name, implementation, nested) in &declarations.subresources {
            entries.insert(
                name.clone(),
                Capability::Subresource(implementation.clone(), nested.clone()),
            );
        }
        for (name, implementation) in &declarations.operations {
            entries.insert(name.clone(), Capability::Operation(implementation.clone()));
        }
        Self { entries }
    }

    /// Looks a capability up by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Capability> {
        self.entries.get(name)
    }

    /// Whether a capability with the given name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// The declared capability names, in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

impl Resource {
    /// Appends a declaration set to this resource, returning a new value
    /// with a fresh (uncompiled) capability table.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Declaration`] on an operation/subresource
    /// name collision across the combined declarations.
    pub fn declare(&self, declarations: Declarations) -> Result<Self, RestError> {
        let mut next = self.clone();
        next.declarations = next.declarations.merged(declarations)?;
        next.capabilities = OnceLock::new();
        Ok(next)
    }

    /// The compiled capability table, built once per resource value and
    /// memoized. Composition order: the parent resource's table, then
    /// this resource's own declarations.
    pub fn capabilities(&self) -> Arc<CapabilityTable> {
        self.capabilities
            .get_or_init(|| {
                let parent = self.parent.as_ref().map(|p| p.capabilities());
                Arc::new(CapabilityTable::compile(
                    parent.as_deref(),
                    &self.declarations,
                ))
            })
            .clone()
    }

    /// Whether a capability with the given name is declared.
    #[must_use]
    pub fn capability_defined(&self, name: &str) -> bool {
        self.capabilities().contains(name)
    }

    /// Invokes a declared operation, producing the terminal call
    /// descriptor. The implementation runs against a scratch subresource
    /// of this resource, so nothing it builds persists on the receiver.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::UnknownCapability`] for an undeclared name
    /// and [`RestError::InvalidOperation`] when the name is declared as a
    /// subresource.
    pub fn operation_call(&self, name: &str, args: &[Value]) -> Result<OperationCall, RestError> {
        match self.capabilities().get(name).cloned() {
            Some(Capability::Operation(implementation)) => {
                implementation(Self::subresource_of(self), args)
            }
            Some(Capability::Subresource(..)) => Err(RestError::InvalidOperation(format!(
                "{name} is a subresource, not an operation"
            ))),
            None => Err(RestError::UnknownCapability {
                name: name.to_string(),
            }),
        }
    }

    /// Invokes a declared subresource capability, yielding the shaped
    /// child resource with any nested declarations applied.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::UnknownCapability`] for an undeclared name
    /// and [`RestError::InvalidOperation`] when the name is declared as
    /// an operation.
    pub fn subresource(&self, name: &str, args: &[Value]) -> Result<Self, RestError> {
        match self.capabilities().get(name).cloned() {
            Some(Capability::Subresource(implementation, nested)) => {
                let child = implementation(Self::subresource_of(self), args)?;
                match nested {
                    Some(declarations) if !declarations.is_empty() => child.declare(declarations),
                    _ => Ok(child),
                }
            }
            Some(Capability::Operation(_)) => Err(RestError::InvalidOperation(format!(
                "{name} is an operation, not a subresource"
            ))),
            None => Err(RestError::UnknownCapability {
                name: name.to_string(),
            }),
        }
    }
}

/// Builds a resource with declarations directly atop a base URL or an
/// existing resource.
///
/// When nothing is declared, [`DeclarationBuilder::build`] hands the base
/// back unchanged and no capability table is ever constructed.
#[derive(Debug)]
pub struct DeclarationBuilder {
    base: Resource,
    declarations: Declarations,
}

impl DeclarationBuilder {
    /// Starts from a raw URL, promoting it into a [`Resource`].
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Unresolvable`] if the URL cannot be parsed.
    pub fn from_url(url: &str) -> Result<Self, RestError> {
        Ok(Self::from_resource(Resource::new(url)?))
    }

    /// Starts from an existing resource.
    #[must_use]
    pub fn from_resource(base: Resource) -> Self {
        Self {
            base,
            declarations: Declarations::new(),
        }
    }

    /// Declares an operation on the base.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Declaration`] on a name collision.
    pub fn operation(mut self, name: &str, implementation: OperationFn) -> Result<Self, RestError> {
        self.declarations = self.declarations.operation(name, implementation)?;
        Ok(self)
    }

    /// Declares a subresource on the base.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Declaration`] on a name collision.
    pub fn subresource(
        mut self,
        name: &str,
        implementation: SubresourceFn,
        nested: Option<Declarations>,
    ) -> Result<Self, RestError> {
        self.declarations = self.declarations.subresource(name, implementation, nested)?;
        Ok(self)
    }

    /// Finishes, returning the base untouched when nothing was declared.
    ///
    /// # Errors
    ///
    /// Returns [`RestError::Declaration`] if the new declarations collide
    /// with ones already present on the base.
    pub fn build(self) -> Result<Resource, RestError> {
        if self.declarations.is_empty() {
            Ok(self.base)
        } else {
            self.base.declare(self.declarations)
        }
    }
}
