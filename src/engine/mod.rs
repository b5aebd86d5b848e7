//! Engine facade
//!
//! [`ScriptEngine`] ties the pieces together: a [`Parser`] backed by a shared
//! [`ParseCache`], an immutable [`OperatorTable`], and the [`EngineConfig`]
//! new contexts are created from. An engine is `Send + Sync`; one instance can
//! serve many threads, each evaluating against its own [`Context`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::ParseCache;
use crate::context::{
    AssignmentPermissions, Context, ContextBehavior, ContextSettings, NumberFormat,
    StringComparison,
};
use crate::errors::{ScriptError, ScriptResult};
use crate::evaluator::{Evaluator, OperatorTable, TypedValue, MAX_CALL_DEPTH};
use crate::parser::{CompiledExpression, Parser};

/// Engine settings, loadable from JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parse cache size; 0 disables caching
    pub cache_capacity: usize,
    pub behavior: ContextBehavior,
    pub assignment: AssignmentPermissions,
    pub string_comparison: StringComparison,
    pub number_format: NumberFormat,
    /// Limit on nested script function calls
    pub max_call_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: ParseCache::DEFAULT_CAPACITY,
            behavior: ContextBehavior::empty(),
            assignment: AssignmentPermissions::empty(),
            string_comparison: StringComparison::default(),
            number_format: NumberFormat::default(),
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Lenient truthiness and every assignment allowed
    pub fn flexible() -> Self {
        let settings = ContextSettings::flexible();
        Self {
            behavior: settings.behavior,
            assignment: settings.assignment,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON text. Missing fields take their defaults.
    pub fn from_json(text: &str) -> ScriptResult<Self> {
        serde_json::from_str(text)
            .map_err(|e| ScriptError::argument(format!("invalid engine configuration: {}", e)))
    }

    /// The settings new root contexts receive
    pub fn context_settings(&self) -> ContextSettings {
        ContextSettings {
            behavior: self.behavior,
            assignment: self.assignment,
            string_comparison: self.string_comparison,
            number_format: self.number_format.clone(),
        }
    }
}

/// Compiles and evaluates expressions and scripts
pub struct ScriptEngine {
    parser: Parser,
    operators: Arc<OperatorTable>,
    config: EngineConfig,
}

impl Default for ScriptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptEngine {
    /// An engine with the default configuration and standard operators
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let cache = Arc::new(ParseCache::new(config.cache_capacity));
        Self {
            parser: Parser::with_cache(cache),
            operators: OperatorTable::standard(),
            config,
        }
    }

    /// Replace the operator table, e.g. one with extra overload names
    pub fn with_operators(mut self, operators: Arc<OperatorTable>) -> Self {
        self.operators = operators;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn operators(&self) -> &OperatorTable {
        &self.operators
    }

    /// A fresh root context using this engine's settings
    pub fn create_context(&self) -> Context {
        Context::new(self.config.context_settings())
    }

    /// A fresh root context whose members are visible as variables
    pub fn create_context_with_root(&self, root: TypedValue) -> Context {
        Context::with_root(self.config.context_settings(), root)
    }

    /// Compile `source`, reusing a cached tree when one exists
    pub fn compile(&self, source: &str) -> ScriptResult<Arc<CompiledExpression>> {
        self.parser.parse(source)
    }

    /// Evaluate a compiled tree against `ctx`
    pub fn evaluate(&self, compiled: &CompiledExpression, ctx: &Context) -> ScriptResult<TypedValue> {
        Evaluator::new(&self.operators)
            .with_max_call_depth(self.config.max_call_depth)
            .evaluate(&compiled.root, ctx)
    }

    /// Compile and evaluate in one step
    pub fn evaluate_str(&self, source: &str, ctx: &Context) -> ScriptResult<TypedValue> {
        let compiled = self.compile(source)?;
        self.evaluate(&compiled, ctx)
    }

    /// Drop every cached compilation
    pub fn reset_cache(&self) {
        debug!(entries = self.parser.cache().len(), "resetting parse cache");
        self.parser.cache().clear();
    }

    pub fn cache_len(&self) -> usize {
        self.parser.cache().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::Value;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.cache_capacity, 100);
        assert_eq!(config.max_call_depth, MAX_CALL_DEPTH);
        assert!(config.assignment.is_empty());
        assert!(config.behavior.is_empty());
    }

    #[test]
    fn test_config_from_json() {
        let config = EngineConfig::from_json(
            r#"{
                "cache_capacity": 8,
                "behavior": "ZERO_IS_FALSE | NULL_IS_FALSE",
                "assignment": "NEW_VARIABLE | EXISTING_VARIABLE",
                "string_comparison": "OrdinalIgnoreCase"
            }"#,
        )
        .unwrap();
        assert_eq!(config.cache_capacity, 8);
        assert_eq!(
            config.behavior,
            ContextBehavior::ZERO_IS_FALSE | ContextBehavior::NULL_IS_FALSE
        );
        assert_eq!(config.assignment, AssignmentPermissions::VARIABLE);
        assert_eq!(config.string_comparison, StringComparison::OrdinalIgnoreCase);
        assert_eq!(config.max_call_depth, MAX_CALL_DEPTH);
    }

    #[test]
    fn test_config_rejects_bad_json() {
        assert!(matches!(
            EngineConfig::from_json("{ \"cache_capacity\": \"lots\" }"),
            Err(ScriptError::Argument { .. })
        ));
    }

    #[test]
    fn test_config_round_trip() {
        let config = EngineConfig::flexible();
        let text = serde_json::to_string(&config).unwrap();
        assert_eq!(EngineConfig::from_json(&text).unwrap(), config);
    }

    #[test]
    fn test_evaluate_str() {
        let engine = ScriptEngine::new();
        let ctx = engine.create_context();
        let v = engine.evaluate_str("5 - 4 * 2", &ctx).unwrap();
        assert!(matches!(v.value, Value::Int(-3)));
    }

    #[test]
    fn test_context_uses_config() {
        let engine = ScriptEngine::with_config(EngineConfig::flexible());
        let ctx = engine.create_context();
        engine.evaluate_str("x = 2", &ctx).unwrap();
        assert!(matches!(ctx.get("x").unwrap().unwrap().value, Value::Int(2)));

        let strict = ScriptEngine::new();
        assert!(strict.evaluate_str("x = 2", &strict.create_context()).is_err());
    }

    #[test]
    fn test_cache_reuse_and_reset() {
        let engine = ScriptEngine::new();
        let first = engine.compile("1 + 2").unwrap();
        let second = engine.compile("1 + 2").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cache_len(), 1);
        engine.reset_cache();
        assert_eq!(engine.cache_len(), 0);
    }

    #[test]
    fn test_disabled_cache() {
        let engine = ScriptEngine::with_config(EngineConfig {
            cache_capacity: 0,
            ..EngineConfig::default()
        });
        engine.compile("1").unwrap();
        assert_eq!(engine.cache_len(), 0);
    }

    #[test]
    fn test_call_depth_from_config() {
        let engine = ScriptEngine::with_config(EngineConfig {
            max_call_depth: 4,
            ..EngineConfig::flexible()
        });
        let ctx = engine.create_context();
        let result = engine.evaluate_str("function f(n) { return n <= 0 ? 0 : f(n - 1); } f(10)", &ctx);
        assert!(matches!(result, Err(ScriptError::RecursionLimitExceeded { limit: 4 })));
        assert!(matches!(
            engine.evaluate_str("f(3)", &ctx).unwrap().value,
            Value::Int(0)
        ));
    }
}
