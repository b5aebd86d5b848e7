//! Capability interfaces for host-provided objects and types.
//!
//! The engine never reflects over host data itself. A host describes each of its
//! types as a list of [`Member`]s and answers reads, writes and invocations for
//! the member the engine selected. Member and overload selection happens in
//! [`super::binder`], so the host only executes what it is asked to.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::errors::{ScriptError, ScriptResult};

use super::types::TypeTag;
use super::value::TypedValue;

/// Parameter and return types of a method, indexer or constructor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<TypeTag>,
    pub returns: TypeTag,
}

impl Signature {
    pub fn new(params: Vec<TypeTag>, returns: TypeTag) -> Self {
        Self { params, returns }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberKind {
    Field { ty: TypeTag, read_only: bool },
    Property { ty: TypeTag, readable: bool, writable: bool },
    Method(Signature),
    /// Default indexer; `params` are the index types, `returns` the element type
    Indexer(Signature),
}

/// A single member exposed by a host type, inherited members included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    /// Name of the type that declares this member
    pub declaring_type: String,
    pub is_static: bool,
    pub kind: MemberKind,
}

impl Member {
    pub fn field(declaring_type: impl Into<String>, name: impl Into<String>, ty: TypeTag) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            is_static: false,
            kind: MemberKind::Field {
                ty,
                read_only: false,
            },
        }
    }

    pub fn property(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        ty: TypeTag,
        writable: bool,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            is_static: false,
            kind: MemberKind::Property {
                ty,
                readable: true,
                writable,
            },
        }
    }

    pub fn method(
        declaring_type: impl Into<String>,
        name: impl Into<String>,
        params: Vec<TypeTag>,
        returns: TypeTag,
    ) -> Self {
        Self {
            name: name.into(),
            declaring_type: declaring_type.into(),
            is_static: false,
            kind: MemberKind::Method(Signature::new(params, returns)),
        }
    }

    pub fn indexer(declaring_type: impl Into<String>, params: Vec<TypeTag>, returns: TypeTag) -> Self {
        Self {
            name: "Item".to_string(),
            declaring_type: declaring_type.into(),
            is_static: false,
            kind: MemberKind::Indexer(Signature::new(params, returns)),
        }
    }

    /// Mark this member as static
    pub fn into_static(mut self) -> Self {
        self.is_static = true;
        self
    }

    pub fn signature(&self) -> Option<&Signature> {
        match &self.kind {
            MemberKind::Method(sig) | MemberKind::Indexer(sig) => Some(sig),
            _ => None,
        }
    }

    pub fn is_method(&self) -> bool {
        matches!(self.kind, MemberKind::Method(_))
    }

    pub fn is_indexer(&self) -> bool {
        matches!(self.kind, MemberKind::Indexer(_))
    }

    /// Declared type of a field or property
    pub fn value_type(&self) -> Option<&TypeTag> {
        match &self.kind {
            MemberKind::Field { ty, .. } | MemberKind::Property { ty, .. } => Some(ty),
            _ => None,
        }
    }

    pub fn is_writable(&self) -> bool {
        match &self.kind {
            MemberKind::Field { read_only, .. } => !read_only,
            MemberKind::Property { writable, .. } => *writable,
            _ => false,
        }
    }
}

/// A host type: its members, constructors and static behavior
pub trait HostType: Send + Sync {
    fn name(&self) -> &str;

    /// Direct base type, if any
    fn base(&self) -> Option<HostTypeRef> {
        None
    }

    /// All members visible on this type, including inherited and static ones
    fn members(&self) -> &[Member];

    fn constructors(&self) -> &[Signature] {
        &[]
    }

    /// Build an instance with the constructor at `index` in [`HostType::constructors`]
    fn construct(&self, index: usize, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
        let _ = (index, args);
        Err(ScriptError::evaluation(format!(
            "type '{}' cannot be constructed",
            self.name()
        )))
    }

    fn get_static(&self, member: &Member) -> ScriptResult<TypedValue> {
        Err(ScriptError::missing_member(self.name(), &member.name))
    }

    fn set_static(&self, member: &Member, value: TypedValue) -> ScriptResult<()> {
        let _ = value;
        Err(ScriptError::missing_member(self.name(), &member.name))
    }

    fn invoke_static(&self, member: &Member, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
        let _ = args;
        Err(ScriptError::missing_member(self.name(), &member.name))
    }
}

/// An instance of a host type
pub trait HostObject: Send + Sync {
    fn host_type(&self) -> HostTypeRef;

    /// Read a field or property selected from [`HostType::members`]
    fn get(&self, member: &Member) -> ScriptResult<TypedValue>;

    fn set(&self, member: &Member, value: TypedValue) -> ScriptResult<()> {
        let _ = value;
        Err(ScriptError::evaluation(format!(
            "member '{}' is read-only",
            member.name
        )))
    }

    fn invoke(&self, member: &Member, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
        let _ = args;
        Err(ScriptError::missing_member(
            self.host_type().name(),
            &member.name,
        ))
    }

    fn get_index(&self, indexer: &Member, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
        let _ = (indexer, args);
        Err(ScriptError::bad_argument(format!(
            "type '{}' has no indexer",
            self.host_type().name()
        )))
    }

    fn set_index(
        &self,
        indexer: &Member,
        args: Vec<TypedValue>,
        value: TypedValue,
    ) -> ScriptResult<()> {
        let _ = (indexer, args, value);
        Err(ScriptError::bad_argument(format!(
            "type '{}' has no writable indexer",
            self.host_type().name()
        )))
    }

    /// Items produced when the object is enumerated by `foreach`
    fn items(&self) -> Option<Vec<TypedValue>> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

pub type HostObjectRef = Arc<dyn HostObject>;

/// Shared handle to a host type; two handles are equal when the type names are
#[derive(Clone)]
pub struct HostTypeRef(pub Arc<dyn HostType>);

impl HostTypeRef {
    pub fn new(ty: impl HostType + 'static) -> Self {
        HostTypeRef(Arc::new(ty))
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    /// Distance from this type to `declaring_type` along the base chain
    pub fn derivation_depth(&self, declaring_type: &str) -> Option<usize> {
        let mut depth = 0;
        let mut current = Some(self.clone());
        while let Some(ty) = current {
            if ty.name() == declaring_type {
                return Some(depth);
            }
            depth += 1;
            current = ty.0.base();
        }
        None
    }

    /// Whether a value of type `other` can be used where `self` is expected
    pub fn is_assignable_from(&self, other: &HostTypeRef) -> bool {
        other.derivation_depth(self.name()).is_some()
    }
}

impl std::ops::Deref for HostTypeRef {
    type Target = dyn HostType;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for HostTypeRef {
    fn eq(&self, other: &Self) -> bool {
        self.name() == other.name()
    }
}

impl Eq for HostTypeRef {}

impl Hash for HostTypeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name().hash(state);
    }
}

impl fmt::Debug for HostTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HostType({})", self.name())
    }
}
