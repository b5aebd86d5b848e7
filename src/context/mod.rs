//! Evaluation contexts
//!
//! A [`Context`] is one scope in a chain. Name lookup goes through:
//! - the scope's own variables
//! - members of its root object, if any
//! - the parent scope
//!
//! Assignment through [`Context::set`] writes to the scope that already owns
//! the name, so a loop body running in a child scope updates the caller's
//! variables. [`Context::set_local`] always writes to the current scope.

mod format;

use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::errors::{ScriptError, ScriptResult};
use crate::evaluator::host::HostTypeRef;
use crate::evaluator::members;
use crate::evaluator::types::TypeTag;
use crate::evaluator::value::{NativeFunction, TypedValue, Value};

pub use format::NumberFormat;

bitflags! {
    /// Truthiness and lookup policy of a context
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct ContextBehavior: u32 {
        const NULL_IS_FALSE = 0x1;
        const NOT_NULL_IS_TRUE = 0x2;
        const ZERO_IS_FALSE = 0x4;
        const NOT_ZERO_IS_TRUE = 0x4;
        const EMPTY_STRING_IS_FALSE = 0x10;
        const NON_EMPTY_STRING_IS_TRUE = 0x20;
        const EMPTY_COLLECTION_IS_FALSE = 0x40;
        const RETURN_NULL_WHEN_NULL_REFERENCE = 0x100;
        const CASE_INSENSITIVE_VARIABLES = 0x8000;

        const FALSY = Self::NULL_IS_FALSE.bits()
            | Self::NOT_NULL_IS_TRUE.bits()
            | Self::ZERO_IS_FALSE.bits()
            | Self::EMPTY_STRING_IS_FALSE.bits()
            | Self::NON_EMPTY_STRING_IS_TRUE.bits()
            | Self::EMPTY_COLLECTION_IS_FALSE.bits();
        const EASY = Self::FALSY.bits() | Self::RETURN_NULL_WHEN_NULL_REFERENCE.bits();
    }
}

bitflags! {
    /// Which assignment targets a script may write
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(transparent)]
    pub struct AssignmentPermissions: u32 {
        const NEW_VARIABLE = 0x1;
        const EXISTING_VARIABLE = 0x2;
        const PROPERTY = 0x4;
        const INDEXER = 0x8;

        const VARIABLE = Self::NEW_VARIABLE.bits() | Self::EXISTING_VARIABLE.bits();
        const ALL = Self::VARIABLE.bits() | Self::PROPERTY.bits() | Self::INDEXER.bits();
    }
}

/// How `==` and `!=` compare strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StringComparison {
    #[default]
    Ordinal,
    OrdinalIgnoreCase,
}

/// Policy shared by a scope and the children created from it
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextSettings {
    pub behavior: ContextBehavior,
    pub assignment: AssignmentPermissions,
    pub string_comparison: StringComparison,
    pub number_format: NumberFormat,
}

impl ContextSettings {
    /// Lenient truthiness, null-tolerant member access and every assignment allowed
    pub fn flexible() -> Self {
        Self {
            behavior: ContextBehavior::EASY,
            assignment: AssignmentPermissions::ALL,
            ..Self::default()
        }
    }
}

struct Scope {
    variables: RwLock<IndexMap<String, TypedValue>>,
    parent: Option<Context>,
    root: Option<TypedValue>,
    settings: ContextSettings,
}

/// A shared handle to one scope of the evaluation environment.
///
/// Cloning the handle does not copy variables. Concurrent reads are safe;
/// concurrent writers to the same scope need host-side coordination if they
/// depend on each other's results.
#[derive(Clone)]
pub struct Context {
    inner: Arc<Scope>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(ContextSettings::default())
    }
}

impl Context {
    pub fn new(settings: ContextSettings) -> Self {
        Self::build(settings, None, None)
    }

    /// A root context whose members are visible as variables
    pub fn with_root(settings: ContextSettings, root: TypedValue) -> Self {
        Self::build(settings, None, Some(root))
    }

    /// A root context using [`ContextSettings::flexible`]
    pub fn flexible() -> Self {
        Self::new(ContextSettings::flexible())
    }

    fn build(settings: ContextSettings, parent: Option<Context>, root: Option<TypedValue>) -> Self {
        Self {
            inner: Arc::new(Scope {
                variables: RwLock::new(IndexMap::new()),
                parent,
                root: root.filter(|r| !r.is_null()),
                settings,
            }),
        }
    }

    /// Push a child scope; it inherits this scope's settings
    pub fn create_local(&self, root: Option<TypedValue>) -> Context {
        Self::build(self.inner.settings.clone(), Some(self.clone()), root)
    }

    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    pub fn root(&self) -> Option<&TypedValue> {
        self.inner.root.as_ref()
    }

    pub fn settings(&self) -> &ContextSettings {
        &self.inner.settings
    }

    pub fn behavior(&self) -> ContextBehavior {
        self.inner.settings.behavior
    }

    pub fn assignment(&self) -> AssignmentPermissions {
        self.inner.settings.assignment
    }

    pub fn string_comparison(&self) -> StringComparison {
        self.inner.settings.string_comparison
    }

    pub fn number_format(&self) -> &NumberFormat {
        &self.inner.settings.number_format
    }

    fn key<'n>(&self, name: &'n str) -> Cow<'n, str> {
        if self
            .behavior()
            .contains(ContextBehavior::CASE_INSENSITIVE_VARIABLES)
        {
            Cow::Owned(name.to_lowercase())
        } else {
            Cow::Borrowed(name)
        }
    }

    /// Look a name up through own variables, root members and the parent chain
    pub fn get(&self, name: &str) -> ScriptResult<Option<TypedValue>> {
        if let Some(value) = self.inner.variables.read().get(self.key(name).as_ref()) {
            return Ok(Some(value.clone()));
        }
        if let Some(root) = &self.inner.root {
            if let Some(value) = members::try_get_member(root, name)? {
                return Ok(Some(value));
            }
        }
        match &self.inner.parent {
            Some(parent) => parent.get(name),
            None => Ok(None),
        }
    }

    /// Whether `name` resolves anywhere in the chain
    pub fn exists(&self, name: &str) -> bool {
        matches!(self.get(name), Ok(Some(_)))
    }

    /// Assign to the scope that owns `name`, or create it here.
    ///
    /// A name that only an ancestor's root object provides is written to that
    /// ancestor as a variable, shadowing the member.
    pub fn set(&self, name: &str, value: TypedValue) {
        let key = self.key(name);
        {
            let mut variables = self.inner.variables.write();
            if let Some(slot) = variables.get_mut(key.as_ref()) {
                *slot = value;
                return;
            }
        }
        if let Some(parent) = &self.inner.parent {
            if parent.exists(name) {
                parent.set(name, value);
                return;
            }
        }
        self.inner
            .variables
            .write()
            .insert(key.into_owned(), value);
    }

    /// Define `name` in this scope, shadowing any ancestor binding
    pub fn set_local(&self, name: &str, value: TypedValue) {
        let key = self.key(name).into_owned();
        self.inner.variables.write().insert(key, value);
    }

    /// Expose a native function as a variable of this scope
    pub fn set_function(&self, function: NativeFunction) {
        let name = function.name.clone();
        self.set_local(&name, function.into_value());
    }

    /// Expose a host type so scripts can use it in `new`, `is`, `as` and static access
    pub fn register_type(&self, ty: HostTypeRef) {
        let name = ty.name().to_string();
        self.set_local(&name, TypedValue::type_value(TypeTag::Host(ty)));
    }

    /// Every variable name visible from this scope, nearest scope first
    pub fn variable_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        let mut current = Some(self);
        while let Some(ctx) = current {
            for key in ctx.inner.variables.read().keys() {
                if !names.contains(key) {
                    names.push(key.clone());
                }
            }
            current = ctx.inner.parent.as_ref();
        }
        names
    }

    /// Convert a value to a boolean under this chain's truthiness policy
    pub fn to_boolean(&self, value: &TypedValue) -> ScriptResult<bool> {
        if let Value::Bool(b) = value.value {
            return Ok(b);
        }
        let mut current = Some(self);
        while let Some(ctx) = current {
            if let Some(truth) = ctx.policy_truth(value) {
                return Ok(truth);
            }
            current = ctx.inner.parent.as_ref();
        }
        if value.is_null() {
            Err(ScriptError::null_reference(
                "null cannot be evaluated as boolean",
            ))
        } else {
            Err(ScriptError::argument(format!(
                "type '{}' cannot be evaluated as boolean",
                value.ty
            )))
        }
    }

    fn policy_truth(&self, value: &TypedValue) -> Option<bool> {
        let behavior = self.behavior();
        if value.is_null() {
            return behavior
                .contains(ContextBehavior::NULL_IS_FALSE)
                .then_some(false);
        }
        if behavior.contains(ContextBehavior::ZERO_IS_FALSE) {
            if let Some(zero) = value.value.is_zero() {
                return Some(!zero);
            }
        }
        if behavior.contains(ContextBehavior::EMPTY_COLLECTION_IS_FALSE) {
            if let Some(len) = value.value.collection_len() {
                return Some(len > 0);
            }
        }
        if let Some(s) = value.value.as_str() {
            if behavior.contains(ContextBehavior::NON_EMPTY_STRING_IS_TRUE) && !s.is_empty() {
                return Some(true);
            }
            if behavior.contains(ContextBehavior::EMPTY_STRING_IS_FALSE) && s.is_empty() {
                return Some(false);
            }
        }
        behavior
            .contains(ContextBehavior::NOT_NULL_IS_TRUE)
            .then_some(true)
    }

    /// Composite formatting: `{index[,alignment][:spec]}` with `{{`/`}}` escapes
    pub fn format(&self, template: &str, args: &[TypedValue]) -> ScriptResult<String> {
        format::format(self.number_format(), template, args)
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.inner.variables.read().keys().cloned().collect();
        f.debug_struct("Context")
            .field("variables", &names)
            .field("has_root", &self.inner.root.is_some())
            .field("settings", &self.inner.settings)
            .field("parent", &self.inner.parent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::dynamic::DynamicValue;
    use serde_json::json;

    fn with_behavior(behavior: ContextBehavior) -> Context {
        Context::new(ContextSettings {
            behavior,
            ..ContextSettings::default()
        })
    }

    #[test]
    fn test_set_local_shadows_parent() {
        let parent = Context::default();
        parent.set("x", TypedValue::from(1));
        let child = parent.create_local(None);
        child.set_local("x", TypedValue::from(2));
        assert!(matches!(parent.get("x").unwrap().unwrap().value, Value::Int(1)));
        assert!(matches!(child.get("x").unwrap().unwrap().value, Value::Int(2)));
    }

    #[test]
    fn test_set_writes_through_to_owner() {
        let parent = Context::default();
        parent.set("x", TypedValue::from(1));
        let child = parent.create_local(None).create_local(None);
        child.set("x", TypedValue::from(5));
        child.set("y", TypedValue::from(6));
        assert!(matches!(parent.get("x").unwrap().unwrap().value, Value::Int(5)));
        assert!(parent.get("y").unwrap().is_none());
        assert!(child.exists("y"));
    }

    #[test]
    fn test_root_members_sit_between_variables_and_parent() {
        let parent = Context::default();
        parent.set("name", TypedValue::from("parent"));
        parent.set("other", TypedValue::from("parent"));
        let root = TypedValue::from(DynamicValue::from(json!({"name": "root"})));
        let child = parent.create_local(Some(root));
        assert_eq!(child.get("name").unwrap().unwrap().value.as_str(), Some("root"));
        assert_eq!(child.get("other").unwrap().unwrap().value.as_str(), Some("parent"));
        child.set_local("name", TypedValue::from("own"));
        assert_eq!(child.get("name").unwrap().unwrap().value.as_str(), Some("own"));
    }

    #[test]
    fn test_set_forwards_names_from_ancestor_root() {
        let root = TypedValue::from(DynamicValue::from(json!({"title": "draft"})));
        let parent = Context::with_root(ContextSettings::default(), root);
        let child = parent.create_local(None);
        child.set("title", TypedValue::from("final"));

        assert!(child.inner.variables.read().is_empty());
        assert_eq!(parent.get("title").unwrap().unwrap().value.as_str(), Some("final"));
        let sibling = parent.create_local(None);
        assert_eq!(sibling.get("title").unwrap().unwrap().value.as_str(), Some("final"));
    }

    #[test]
    fn test_case_insensitive_variables() {
        let ctx = with_behavior(ContextBehavior::CASE_INSENSITIVE_VARIABLES);
        ctx.set("Total", TypedValue::from(3));
        assert!(ctx.exists("TOTAL"));
        assert!(!Context::default().exists("TOTAL"));
    }

    #[test]
    fn test_strict_truthiness() {
        let ctx = Context::default();
        assert!(ctx.to_boolean(&TypedValue::from(true)).unwrap());
        assert!(matches!(
            ctx.to_boolean(&TypedValue::from("")).unwrap_err(),
            ScriptError::Argument { .. }
        ));
        assert!(matches!(
            ctx.to_boolean(&TypedValue::null()).unwrap_err(),
            ScriptError::NullReference { .. }
        ));
    }

    #[test]
    fn test_truthiness_flags() {
        let ctx = with_behavior(ContextBehavior::FALSY);
        assert!(!ctx.to_boolean(&TypedValue::null()).unwrap());
        assert!(!ctx.to_boolean(&TypedValue::from(0)).unwrap());
        assert!(ctx.to_boolean(&TypedValue::from(2.5)).unwrap());
        assert!(!ctx.to_boolean(&TypedValue::from("")).unwrap());
        assert!(ctx.to_boolean(&TypedValue::from("x")).unwrap());

        let strings = with_behavior(ContextBehavior::NON_EMPTY_STRING_IS_TRUE);
        assert!(strings.to_boolean(&TypedValue::from("x")).unwrap());
        assert!(strings.to_boolean(&TypedValue::from("")).is_err());
    }

    #[test]
    fn test_truthiness_falls_back_to_parent() {
        let parent = with_behavior(ContextBehavior::ZERO_IS_FALSE);
        let child = Context::build(ContextSettings::default(), Some(parent), None);
        assert!(!child.to_boolean(&TypedValue::from(0)).unwrap());
    }

    #[test]
    fn test_variable_names_for_suggestions() {
        let parent = Context::default();
        parent.set("alpha", TypedValue::from(1));
        let child = parent.create_local(None);
        child.set_local("beta", TypedValue::from(2));
        assert_eq!(child.variable_names(), vec!["beta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn test_settings_from_json() {
        let settings: ContextSettings = serde_json::from_value(json!({
            "behavior": "NULL_IS_FALSE | ZERO_IS_FALSE",
            "assignment": "PROPERTY"
        }))
        .unwrap();
        assert!(settings.behavior.contains(ContextBehavior::NULL_IS_FALSE));
        assert!(settings.behavior.contains(ContextBehavior::ZERO_IS_FALSE));
        assert_eq!(settings.assignment, AssignmentPermissions::PROPERTY);
        assert_eq!(settings.string_comparison, StringComparison::Ordinal);
    }

    #[test]
    fn test_format_uses_context_number_format() {
        let ctx = Context::new(ContextSettings {
            number_format: NumberFormat {
                decimal_separator: ",".to_string(),
                group_separator: " ".to_string(),
                group_size: 3,
            },
            ..ContextSettings::default()
        });
        let text = ctx
            .format("{0}: {1:N1}", &[TypedValue::from("total"), TypedValue::from(12345.67)])
            .unwrap();
        assert_eq!(text, "total: 12 345,7");
    }
}
