//! Evaluator for compiled expressions and scripts
//!
//! The evaluator walks an [`Expr`] tree against a [`Context`]. It handles:
//! - Variable lookup and assignment permissions
//! - Operator dispatch through an [`OperatorTable`]
//! - Member, indexer, call and constructor resolution
//! - Truthiness, short-circuiting and the null-aware operators
//! - Statement control flow via [`EvalOutcome`]

pub mod binder;
pub mod convert;
pub mod dynamic;
pub mod host;
pub mod members;
pub mod operators;
pub mod types;
pub mod value;

use std::cell::Cell;
use std::sync::Arc;

use tracing::trace;

use crate::context::{AssignmentPermissions, Context, ContextBehavior};
use crate::errors::{unknown_variable_help, AssignmentDenial, ScriptError, ScriptResult};
use crate::parser::ast::{Expr, FunctionDef};

pub use dynamic::DynamicValue;
pub use host::{HostObject, HostObjectRef, HostType, HostTypeRef, Member, MemberKind, Signature};
pub use operators::{OperatorTable, OverloadNames};
pub use types::TypeTag;
pub use value::{ArrayValue, Callable, NativeFunction, RangeValue, TypedValue, Value};

/// Default limit on nested script function calls
pub const MAX_CALL_DEPTH: usize = 256;

/// Result of evaluating one node. `Return` and `Break` unwind enclosing
/// blocks until a loop, a function call or the top level absorbs them.
#[derive(Debug, Clone)]
pub enum EvalOutcome<T = TypedValue> {
    Value(T),
    Return(TypedValue),
    Break,
}

impl EvalOutcome {
    /// The value this outcome leaves behind once absorbed
    pub fn into_value(self) -> TypedValue {
        match self {
            EvalOutcome::Value(v) | EvalOutcome::Return(v) => v,
            EvalOutcome::Break => TypedValue::null(),
        }
    }
}

/// Evaluate a sub-expression and unwrap its value, handing a control-flow
/// signal straight back to the caller
macro_rules! value {
    ($outcome:expr) => {
        match $outcome? {
            EvalOutcome::Value(v) => v,
            EvalOutcome::Return(v) => return Ok(EvalOutcome::Return(v)),
            EvalOutcome::Break => return Ok(EvalOutcome::Break),
        }
    };
}

/// The `typeof` function: the type named by a type value, or the runtime
/// type of any other value
pub fn typeof_function() -> TypedValue {
    NativeFunction::new("typeof")
        .overload(vec![TypeTag::Object], TypeTag::Type, |args| {
            let ty = match args.first().map(|a| &a.value) {
                Some(Value::Type(ty)) => ty.clone(),
                Some(other) => other.runtime_type(),
                None => TypeTag::Object,
            };
            Ok(TypedValue::type_value(ty))
        })
        .into_value()
}

/// Tree-walking evaluator
pub struct Evaluator<'a> {
    operators: &'a OperatorTable,
    max_call_depth: usize,
    /// Current script call depth
    depth: Cell<usize>,
}

impl<'a> Evaluator<'a> {
    pub fn new(operators: &'a OperatorTable) -> Self {
        Self {
            operators,
            max_call_depth: MAX_CALL_DEPTH,
            depth: Cell::new(0),
        }
    }

    pub fn with_max_call_depth(mut self, limit: usize) -> Self {
        self.max_call_depth = limit;
        self
    }

    /// Evaluate a whole tree. A top-level `return` yields its value and a
    /// stray `break` yields null.
    pub fn evaluate(&self, expr: &Expr, ctx: &Context) -> ScriptResult<TypedValue> {
        self.eval(expr, ctx).map(|outcome| outcome.into_value())
    }

    /// Evaluate one node
    pub fn eval(&self, expr: &Expr, ctx: &Context) -> ScriptResult<EvalOutcome> {
        let result = match expr {
            Expr::Value(v) => v.clone(),
            Expr::Variable(name) => self.variable(name, ctx)?,
            Expr::Binary { op, left, right } => {
                let l = value!(self.eval(left, ctx));
                let r = value!(self.eval(right, ctx));
                self.operators.binary(*op, &l, &r, ctx)?
            }
            Expr::UnaryMinus(operand) => {
                let v = value!(self.eval(operand, ctx));
                self.operators.negate(&v)?
            }
            Expr::Negation(operand) => {
                let v = value!(self.eval(operand, ctx));
                TypedValue::from(!ctx.to_boolean(&v)?)
            }
            Expr::BitwiseComplement(operand) => {
                let v = value!(self.eval(operand, ctx));
                self.operators.complement(&v)?
            }
            Expr::Cast { ty, operand } => {
                let v = value!(self.eval(operand, ctx));
                convert::convert_explicit(&v, ty)?
            }
            Expr::Field { target, name } => {
                let t = value!(self.eval(target, ctx));
                if t.is_null() {
                    TypedValue::null()
                } else {
                    members::get_member(&t, name)?
                }
            }
            Expr::Index { target, args } => {
                let t = value!(self.eval(target, ctx));
                let args = value!(self.eval_args(args, ctx));
                if t.is_null() {
                    TypedValue::null()
                } else {
                    members::get_index(&t, args)?
                }
            }
            Expr::Call { callee, args } => {
                let f = value!(self.eval(callee, ctx));
                let args = value!(self.eval_args(args, ctx));
                self.call(callee, f, args, ctx)?
            }
            Expr::Constructor { type_name, args } => {
                let ty = self.resolve_type(type_name, ctx)?;
                let args = value!(self.eval_args(args, ctx));
                members::call_host(&Callable::Constructor(ty), args)?
            }
            Expr::Assignment { target, value } => {
                let v = value!(self.eval(value, ctx));
                value!(self.assign(target, v, ctx))
            }
            Expr::Conditional {
                cond,
                if_true,
                if_false,
            } => {
                let c = value!(self.eval(cond, ctx));
                return if ctx.to_boolean(&c)? {
                    self.eval(if_true, ctx)
                } else {
                    self.eval(if_false, ctx)
                };
            }
            Expr::Coalesce { value, fallback } => {
                let v = value!(self.eval(value, ctx));
                if !v.is_null() {
                    v
                } else {
                    return self.eval(fallback, ctx);
                }
            }
            Expr::DefaultValue { value, fallback } => {
                let v = value!(self.eval(value, ctx));
                if ctx.to_boolean(&v)? {
                    v
                } else {
                    return self.eval(fallback, ctx);
                }
            }
            Expr::ValueOrNull { cond, value } => {
                let c = value!(self.eval(cond, ctx));
                if ctx.to_boolean(&c)? {
                    return self.eval(value, ctx);
                }
                TypedValue::null()
            }
            Expr::AndAlso(left, right) => {
                let l = value!(self.eval(left, ctx));
                let truth = ctx.to_boolean(&l)? && {
                    let r = value!(self.eval(right, ctx));
                    ctx.to_boolean(&r)?
                };
                TypedValue::from(truth)
            }
            Expr::OrElse(left, right) => {
                let l = value!(self.eval(left, ctx));
                let truth = ctx.to_boolean(&l)? || {
                    let r = value!(self.eval(right, ctx));
                    ctx.to_boolean(&r)?
                };
                TypedValue::from(truth)
            }
            Expr::As { value, ty } => {
                let v = value!(self.eval(value, ctx));
                let target = value!(self.type_operand(ty, "as", ctx));
                as_type(v, target)
            }
            Expr::Is { value, ty } => {
                let v = value!(self.eval(value, ctx));
                let target = value!(self.type_operand(ty, "is", ctx));
                TypedValue::from(is_type(&v, &target))
            }
            Expr::Range {
                from,
                to,
                exclude_from,
                exclude_to,
            } => {
                let f = value!(self.eval(from, ctx));
                let t = value!(self.eval(to, ctx));
                let (from, from_wide) = range_bound(&f)?;
                let (to, to_wide) = range_bound(&t)?;
                TypedValue::of(Value::Range(RangeValue {
                    from,
                    to,
                    exclude_from: *exclude_from,
                    exclude_to: *exclude_to,
                    wide: from_wide || to_wide,
                }))
            }
            Expr::In { iterator, .. } => {
                return Err(ScriptError::evaluation(format!(
                    "'{} in ...' is only valid in a foreach header",
                    iterator
                )));
            }
            Expr::Sequence(items) => {
                let mut last = TypedValue::null();
                for item in items {
                    last = value!(self.eval(item, ctx));
                }
                last
            }
            Expr::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let c = value!(self.eval(cond, ctx));
                if ctx.to_boolean(&c)? {
                    return self.eval(then_branch, ctx);
                }
                match else_branch {
                    Some(branch) => return self.eval(branch, ctx),
                    None => TypedValue::null(),
                }
            }
            Expr::While { cond, body } => {
                loop {
                    let c = value!(self.eval(cond, ctx));
                    if !ctx.to_boolean(&c)? {
                        break;
                    }
                    match self.eval(body, ctx)? {
                        EvalOutcome::Value(_) => {}
                        EvalOutcome::Break => break,
                        ret @ EvalOutcome::Return(_) => return Ok(ret),
                    }
                }
                TypedValue::null()
            }
            Expr::ForEach {
                iterator,
                collection,
                body,
            } => {
                let items = value!(self.eval(collection, ctx));
                for item in iterate(&items) {
                    let scope = ctx.create_local(None);
                    scope.set_local(iterator, item);
                    match self.eval(body, &scope)? {
                        EvalOutcome::Value(_) => {}
                        EvalOutcome::Break => break,
                        ret @ EvalOutcome::Return(_) => return Ok(ret),
                    }
                }
                TypedValue::null()
            }
            Expr::FunctionDefinition(def) => {
                ctx.set_local(&def.name, TypedValue::function(Callable::Script(Arc::clone(def))));
                TypedValue::null()
            }
            Expr::Return(value) => {
                let v = match value {
                    Some(value) => value!(self.eval(value, ctx)),
                    None => TypedValue::null(),
                };
                return Ok(EvalOutcome::Return(v));
            }
            Expr::Break => return Ok(EvalOutcome::Break),
        };
        Ok(EvalOutcome::Value(result))
    }

    fn eval_args(&self, args: &[Expr], ctx: &Context) -> ScriptResult<EvalOutcome<Vec<TypedValue>>> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(value!(self.eval(arg, ctx)));
        }
        Ok(EvalOutcome::Value(values))
    }

    fn variable(&self, name: &str, ctx: &Context) -> ScriptResult<TypedValue> {
        match ctx.get(name)? {
            Some(v) => Ok(v),
            None if ctx
                .behavior()
                .contains(ContextBehavior::RETURN_NULL_WHEN_NULL_REFERENCE) =>
            {
                Ok(TypedValue::null())
            }
            None => Err(ScriptError::unknown_property(
                name,
                unknown_variable_help(name, &ctx.variable_names()),
            )),
        }
    }

    /// Evaluate the right operand of `as`/`is`, which must be a type
    fn type_operand(&self, expr: &Expr, operator: &str, ctx: &Context) -> ScriptResult<EvalOutcome<TypeTag>> {
        let v = value!(self.eval(expr, ctx));
        match v.value {
            Value::Type(ty) => Ok(EvalOutcome::Value(ty)),
            _ => Err(ScriptError::evaluation(format!(
                "'{}' needs a type on its right, got '{}'",
                operator,
                describe(expr)
            ))),
        }
    }

    /// Resolve the type named by `new T(...)`; dotted names walk static members
    fn resolve_type(&self, name: &str, ctx: &Context) -> ScriptResult<HostTypeRef> {
        let mut resolved = ctx.get(name)?;
        if resolved.is_none() {
            let mut segments = name.split('.');
            if let Some(first) = segments.next() {
                resolved = ctx.get(first)?;
                for segment in segments {
                    resolved = match resolved {
                        Some(owner) => members::try_get_member(&owner, segment)?,
                        None => None,
                    };
                }
            }
        }
        match resolved.map(|v| v.value) {
            Some(Value::Type(TypeTag::Host(ty))) => Ok(ty),
            Some(_) => Err(ScriptError::evaluation(format!(
                "'{}' is not a constructible type",
                name
            ))),
            None => Err(ScriptError::unknown_property(
                name,
                unknown_variable_help(name, &ctx.variable_names()),
            )),
        }
    }

    fn assign(&self, target: &Expr, value: TypedValue, ctx: &Context) -> ScriptResult<EvalOutcome> {
        let permissions = ctx.assignment();
        match target {
            Expr::Variable(name) => {
                if !permissions.intersects(AssignmentPermissions::VARIABLE) {
                    return Err(ScriptError::illegal_assignment(AssignmentDenial::Variable, name.as_str()));
                }
                let (needed, denial) = if ctx.exists(name) {
                    (
                        AssignmentPermissions::EXISTING_VARIABLE,
                        AssignmentDenial::ExistingVariable,
                    )
                } else {
                    (
                        AssignmentPermissions::NEW_VARIABLE,
                        AssignmentDenial::NewVariable,
                    )
                };
                if !permissions.contains(needed) {
                    return Err(ScriptError::illegal_assignment(denial, name.as_str()));
                }
                ctx.set(name, value.clone());
            }
            Expr::Field { target: owner, name } => {
                if !permissions.contains(AssignmentPermissions::PROPERTY) {
                    return Err(ScriptError::illegal_assignment(AssignmentDenial::Property, name.as_str()));
                }
                let owner = value!(self.eval(owner, ctx));
                if owner.is_null() {
                    return Err(ScriptError::null_reference(format!(
                        "cannot assign '{}' on a null value",
                        name
                    )));
                }
                members::set_member(&owner, name, value.clone())?;
            }
            Expr::Index { target: owner, args } => {
                if !permissions.contains(AssignmentPermissions::INDEXER) {
                    return Err(ScriptError::illegal_assignment(
                        AssignmentDenial::Indexer,
                        describe(owner),
                    ));
                }
                let owner = value!(self.eval(owner, ctx));
                let args = value!(self.eval_args(args, ctx));
                if owner.is_null() {
                    return Err(ScriptError::null_reference(format!(
                        "cannot assign an element of null '{}'",
                        describe(target)
                    )));
                }
                members::set_index(&owner, args, value.clone())?;
            }
            other => {
                return Err(ScriptError::illegal_assignment(
                    AssignmentDenial::NotAssignable,
                    describe(other),
                ));
            }
        }
        Ok(EvalOutcome::Value(value))
    }

    fn call(
        &self,
        callee: &Expr,
        function: TypedValue,
        args: Vec<TypedValue>,
        ctx: &Context,
    ) -> ScriptResult<TypedValue> {
        match function.value {
            Value::Function(Callable::Script(def)) => self.call_script(&def, args, ctx),
            Value::Function(callable) => members::call_host(&callable, args),
            _ => Err(ScriptError::evaluation(format!(
                "'{}' is not callable",
                describe(callee)
            ))),
        }
    }

    /// Run a script function in a child scope of the caller
    fn call_script(
        &self,
        def: &Arc<FunctionDef>,
        args: Vec<TypedValue>,
        ctx: &Context,
    ) -> ScriptResult<TypedValue> {
        if args.len() != def.params.len() {
            return Err(ScriptError::bad_argument(format!(
                "function '{}' takes {} argument(s), got {}",
                def.name,
                def.params.len(),
                args.len()
            )));
        }
        let depth = self.depth.get() + 1;
        if depth > self.max_call_depth {
            return Err(ScriptError::RecursionLimitExceeded {
                limit: self.max_call_depth,
            });
        }
        trace!(function = %def.name, args = args.len(), depth, "calling script function");

        let scope = ctx.create_local(None);
        for (param, arg) in def.params.iter().zip(args) {
            scope.set_local(param, arg);
        }
        self.depth.set(depth);
        let result = self.eval(&def.body, &scope);
        self.depth.set(depth - 1);
        result.map(|outcome| outcome.into_value())
    }
}

/// Short description of an expression for error messages
fn describe(expr: &Expr) -> String {
    match expr {
        Expr::Variable(name) => name.clone(),
        Expr::Field { name, .. } => name.clone(),
        Expr::Value(v) => v.to_string(),
        Expr::Index { target, .. } => format!("{}[...]", describe(target)),
        Expr::Call { callee, .. } => format!("{}(...)", describe(callee)),
        _ => "expression".to_string(),
    }
}

fn as_type(v: TypedValue, target: TypeTag) -> TypedValue {
    if v.is_null() {
        return TypedValue::null_of(nullable_if_value(target));
    }
    let runtime = v.value.runtime_type();
    if !runtime.is_value_type() {
        if target.is_value_type() {
            return TypedValue::null_of(nullable_if_value(target));
        }
        return v.with_type(target);
    }
    if runtime == *target.strip_nullable() {
        TypedValue::new(v.value, target)
    } else {
        TypedValue::null_of(nullable_if_value(target))
    }
}

fn nullable_if_value(ty: TypeTag) -> TypeTag {
    if ty.is_value_type() {
        ty.nullable()
    } else {
        ty
    }
}

fn is_type(v: &TypedValue, target: &TypeTag) -> bool {
    if v.is_null() {
        return false;
    }
    let runtime = v.value.runtime_type();
    if runtime.is_value_type() {
        runtime == *target.strip_nullable()
    } else {
        target.is_assignable_from(&runtime)
    }
}

/// An integral range endpoint and whether it needs `long` items
fn range_bound(v: &TypedValue) -> ScriptResult<(i64, bool)> {
    let ty = v.ty.strip_nullable();
    if v.is_null() {
        return Err(ScriptError::null_reference("range bounds cannot be null"));
    }
    let n = match (ty.is_integral() && *ty != TypeTag::Char, v.value.as_i128()) {
        (true, Some(n)) => n,
        _ => {
            return Err(ScriptError::illegal_operands(
                "...",
                format!("a bound of type '{}'", v.ty),
            ))
        }
    };
    let n = i64::try_from(n).map_err(|_| ScriptError::argument("range bound is out of range"))?;
    let wide = matches!(ty, TypeTag::Long | TypeTag::ULong | TypeTag::UInt);
    Ok((n, wide))
}

/// The items `foreach` visits; anything that is not iterable yields nothing
fn iterate<'v>(collection: &'v TypedValue) -> Box<dyn Iterator<Item = TypedValue> + 'v> {
    match &collection.value {
        Value::Array(array) => Box::new(array.to_vec().into_iter()),
        Value::Range(range) => Box::new(range.iter()),
        Value::Dynamic(dynamic) => Box::new(dynamic.items().into_iter()),
        Value::Object(obj) => Box::new(obj.items().unwrap_or_default().into_iter()),
        Value::String(s) => Box::new(s.chars().map(TypedValue::from)),
        _ => Box::new(std::iter::empty()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ContextSettings;
    use crate::parser::Parser;
    use parking_lot::Mutex;

    fn run(source: &str, ctx: &Context) -> ScriptResult<TypedValue> {
        let compiled = Parser::new().compile(source)?;
        Evaluator::new(&OperatorTable::standard()).evaluate(&compiled.root, ctx)
    }

    fn eval(source: &str) -> TypedValue {
        run(source, &Context::flexible()).unwrap()
    }

    fn printing_context() -> (Context, Arc<Mutex<String>>) {
        let out = Arc::new(Mutex::new(String::new()));
        let sink = Arc::clone(&out);
        let ctx = Context::flexible();
        ctx.set_function(NativeFunction::new("print").overload(
            vec![TypeTag::Object],
            TypeTag::Object,
            move |args| {
                sink.lock().push_str(&args[0].to_string());
                Ok(TypedValue::null())
            },
        ));
        (ctx, out)
    }

    #[test]
    fn test_arithmetic_precedence() {
        assert!(matches!(eval("5-4*2").value, Value::Int(-3)));
        assert!(matches!(eval("5*(4/2)").value, Value::Int(10)));
        assert!(matches!(eval("7 % 4 + (1 << 3)").value, Value::Int(11)));
    }

    #[test]
    fn test_short_circuit() {
        assert!(matches!(eval("false && missing()").value, Value::Bool(false)));
        assert!(matches!(eval("true || missing()").value, Value::Bool(true)));
        assert!(run("true && missing()", &Context::flexible()).is_err());
    }

    #[test]
    fn test_null_operators() {
        assert!(matches!(eval("null ?? 3").value, Value::Int(3)));
        assert!(matches!(eval("0 ?: 4").value, Value::Int(4)));
        assert!(matches!(eval("2 ?: 4").value, Value::Int(2)));
        assert!(eval("false :: 5").is_null());
        assert!(matches!(eval("true :: 5").value, Value::Int(5)));
    }

    #[test]
    fn test_conditional_evaluates_one_branch() {
        assert!(matches!(eval("1 < 2 ? 10 : missing").value, Value::Int(10)));
    }

    #[test]
    fn test_as_and_is() {
        assert!(matches!(eval("5 is int").value, Value::Bool(true)));
        assert!(matches!(eval("5 is long").value, Value::Bool(false)));
        assert!(matches!(eval("null is int").value, Value::Bool(false)));
        assert!(matches!(eval("\"s\" is object").value, Value::Bool(true)));
        let v = eval("5 as long");
        assert!(v.is_null());
        assert_eq!(v.ty, TypeTag::Long.nullable());
        assert_eq!(eval("\"s\" as string").ty, TypeTag::String);
        assert!(matches!(
            run("5 is 3", &Context::flexible()),
            Err(ScriptError::ExpressionEvaluation { .. })
        ));
    }

    #[test]
    fn test_typeof() {
        assert!(matches!(eval("typeof(int)").value, Value::Type(TypeTag::Int)));
        assert!(matches!(eval("typeof(\"x\")").value, Value::Type(TypeTag::String)));
    }

    #[test]
    fn test_ranges() {
        assert!(matches!(eval("s=0; foreach (i in 1...5) s = s + i; s").value, Value::Int(15)));
        assert!(matches!(eval("s=0; foreach (i in 1...<5) s = s + i; s").value, Value::Int(10)));
        assert!(matches!(eval("s=0; foreach (i in 1>...5) s = s + i; s").value, Value::Int(14)));
        assert!(matches!(eval("s=0; foreach (i in 1>...<5) s = s + i; s").value, Value::Int(9)));
        assert!(matches!(eval("s=0; foreach (i in 3...1) s = s * 10 + i; s").value, Value::Int(321)));
        assert!(matches!(eval("(1L...3).Count").value, Value::Int(3)));
    }

    #[test]
    fn test_foreach_break() {
        let (ctx, out) = printing_context();
        run("foreach (x in [1...9]) { print(x); if (x>=5) break; }", &ctx).unwrap();
        assert_eq!(out.lock().as_str(), "12345");
    }

    #[test]
    fn test_while_loop() {
        let (ctx, out) = printing_context();
        run("x=1; while (x<10) { print(x); x=x+1; }", &ctx).unwrap();
        assert_eq!(out.lock().as_str(), "123456789");
    }

    #[test]
    fn test_foreach_over_null_is_empty() {
        assert!(matches!(eval("n = 0; foreach (x in null) n = 1; n").value, Value::Int(0)));
        assert!(matches!(eval("n = 0; foreach (x in 42) n = 1; n").value, Value::Int(0)));
    }

    #[test]
    fn test_foreach_iterator_is_scoped() {
        let ctx = Context::flexible();
        run("last = 0; foreach (item in 1...3) { last = item; fresh = item; }", &ctx).unwrap();
        assert!(!ctx.exists("item"));
        assert!(!ctx.exists("fresh"));
        assert!(matches!(ctx.get("last").unwrap().unwrap().value, Value::Int(3)));
    }

    #[test]
    fn test_top_level_return_and_break() {
        assert!(matches!(eval("return 4; 5").value, Value::Int(4)));
        assert!(eval("break; 5").is_null());
    }

    #[test]
    fn test_return_inside_loop_unwinds() {
        let source = "function find(limit) { foreach (i in 1...100) if (i * i > limit) return i; return -1; } find(50)";
        assert!(matches!(eval(source).value, Value::Int(8)));
    }

    #[test]
    fn test_recursion() {
        let source = "function fact(n) { if (n <= 1) return 1; return n * fact(n - 1); } fact(10)";
        assert!(matches!(eval(source).value, Value::Int(3628800)));
    }

    #[test]
    fn test_recursion_limit() {
        let compiled = Parser::new().compile("function f(n) { return f(n + 1); } f(0)").unwrap();
        let table = OperatorTable::new();
        let result = Evaluator::new(&table)
            .with_max_call_depth(32)
            .evaluate(&compiled.root, &Context::flexible());
        assert!(matches!(result, Err(ScriptError::RecursionLimitExceeded { limit: 32 })));
    }

    #[test]
    fn test_argument_count_mismatch() {
        assert!(matches!(
            run("function f(a) { a } f(1, 2)", &Context::flexible()),
            Err(ScriptError::BadArgument { .. })
        ));
    }

    #[test]
    fn test_not_callable() {
        let err = run("x = 1; x(2)", &Context::flexible()).unwrap_err();
        assert!(err.to_string().contains("'x' is not callable"));
    }

    #[test]
    fn test_unknown_variable() {
        let ctx = Context::flexible();
        ctx.set("counter", TypedValue::from(1));
        let strict = Context::new(ContextSettings::default());
        strict.set_local("counter", TypedValue::from(1));
        match run("countr + 1", &strict) {
            Err(ScriptError::UnknownProperty { name, help }) => {
                assert_eq!(name, "countr");
                assert!(help.contains("counter"));
            }
            other => panic!("unexpected result {:?}", other),
        }
        // flexible contexts read unknown names as null
        assert!(run("countr", &ctx).unwrap().is_null());
    }

    #[test]
    fn test_assignment_permissions() {
        let ctx = Context::new(ContextSettings::default());
        let err = run("x = 1", &ctx).unwrap_err();
        assert_eq!(err.assignment_denial(), Some(AssignmentDenial::Variable));

        let ctx = Context::new(ContextSettings {
            assignment: AssignmentPermissions::NEW_VARIABLE,
            ..ContextSettings::default()
        });
        run("x = 1", &ctx).unwrap();
        let err = run("x = 2", &ctx).unwrap_err();
        assert_eq!(err.assignment_denial(), Some(AssignmentDenial::ExistingVariable));

        let ctx = Context::new(ContextSettings {
            assignment: AssignmentPermissions::EXISTING_VARIABLE,
            ..ContextSettings::default()
        });
        ctx.set_local("x", TypedValue::from(1));
        let err = run("y = 1", &ctx).unwrap_err();
        assert_eq!(err.assignment_denial(), Some(AssignmentDenial::NewVariable));
        assert!(matches!(run("x = 5", &ctx).unwrap().value, Value::Int(5)));
        // the right-hand side is evaluated before the target is checked
        assert!(matches!(
            run("y = missing", &ctx),
            Err(ScriptError::UnknownProperty { .. })
        ));

        let err = run("1 = 2", &Context::flexible()).unwrap_err();
        assert_eq!(err.assignment_denial(), Some(AssignmentDenial::NotAssignable));
    }

    #[test]
    fn test_assignment_yields_value() {
        assert!(matches!(eval("a = b = 3; a + b").value, Value::Int(6)));
    }

    #[test]
    fn test_null_member_access_is_null() {
        assert!(eval("n = null; n.Length").is_null());
        assert!(eval("n = null; n[0]").is_null());
    }

    #[test]
    fn test_in_outside_foreach() {
        assert!(matches!(
            run("x in 1...3", &Context::flexible()),
            Err(ScriptError::ExpressionEvaluation { .. })
        ));
    }

    #[test]
    fn test_function_scope() {
        let ctx = Context::flexible();
        run("total = 1; function bump(step) { total = total + step; local = step; } bump(2)", &ctx).unwrap();
        assert!(matches!(ctx.get("total").unwrap().unwrap().value, Value::Int(3)));
        assert!(!ctx.exists("local"));
        assert!(!ctx.exists("step"));
    }

    #[test]
    fn test_bubble_sort() {
        let ctx = Context::flexible();
        let items = ArrayValue::from_vec(
            TypeTag::Int,
            [5, 3, 9, 1, 4].into_iter().map(Value::Int).collect(),
        );
        ctx.set("items", TypedValue::from(items.clone()));
        let source = "
            n = items.Length;
            foreach (i in 0...<n) {
                foreach (j in 0...<n - i - 1) {
                    if (items[j] > items[j + 1]) {
                        t = items[j]; items[j] = items[j + 1]; items[j + 1] = t;
                    }
                }
            }";
        run(source, &ctx).unwrap();
        let sorted: Vec<String> = items.to_vec().iter().map(|v| v.to_string()).collect();
        assert_eq!(sorted, vec!["1", "3", "4", "5", "9"]);
    }
}
