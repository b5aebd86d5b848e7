//! Member, indexer and host call resolution.
//!
//! These functions only see values, never a context; permission checks and
//! null short-circuiting happen in the evaluator before they are called.

use tracing::trace;

use crate::errors::{ScriptError, ScriptResult};

use super::binder;
use super::convert::index_argument;
use super::dynamic::DynamicValue;
use super::host::{HostObjectRef, HostTypeRef, Member};
use super::types::TypeTag;
use super::value::{BoundMethod, Callable, RangeValue, Receiver, TypedValue, Value};

/// Read `target.name`, or None when the target has no such member
pub fn try_get_member(target: &TypedValue, name: &str) -> ScriptResult<Option<TypedValue>> {
    match &target.value {
        Value::Type(TypeTag::Host(ty)) => static_member(ty, name),
        Value::Object(obj) => instance_member(obj, name),
        Value::Dynamic(dynamic) => Ok(dynamic_member(dynamic, name)),
        Value::String(s) if name == "Length" => {
            Ok(Some(TypedValue::from(s.chars().count() as i32)))
        }
        Value::Array(array) => Ok(match name {
            "Length" => Some(TypedValue::from(array.len() as i32)),
            "Rank" => Some(TypedValue::from(array.rank() as i32)),
            _ => None,
        }),
        Value::Range(range) if name == "Count" => range_count(range).map(Some),
        _ => Ok(None),
    }
}

/// Item count of a range: `long` for long ranges, `int` otherwise
fn range_count(range: &RangeValue) -> ScriptResult<TypedValue> {
    let count = range.len();
    let too_long =
        || ScriptError::evaluation(format!("range {} has too many items to count", range));
    if range.wide {
        i64::try_from(count).map(TypedValue::from).map_err(|_| too_long())
    } else {
        i32::try_from(count).map(TypedValue::from).map_err(|_| too_long())
    }
}

/// Read `target.name`
pub fn get_member(target: &TypedValue, name: &str) -> ScriptResult<TypedValue> {
    try_get_member(target, name)?
        .ok_or_else(|| ScriptError::missing_member(target.ty.to_string(), name))
}

fn static_member(ty: &HostTypeRef, name: &str) -> ScriptResult<Option<TypedValue>> {
    let members = ty.members();
    if let Some(member) = binder::resolve_member(ty, members, name, true) {
        return ty.get_static(member).map(Some);
    }
    let candidates = method_group(members, name, true);
    if candidates.is_empty() {
        return Ok(None);
    }
    Ok(Some(TypedValue::function(Callable::Method(BoundMethod {
        receiver: Receiver::Static(ty.clone()),
        name: name.to_string(),
        candidates,
    }))))
}

fn instance_member(obj: &HostObjectRef, name: &str) -> ScriptResult<Option<TypedValue>> {
    let ty = obj.host_type();
    let members = ty.members();
    if let Some(member) = binder::resolve_member(&ty, members, name, false) {
        let value = obj.get(member)?;
        return Ok(Some(declared(value, member)));
    }
    let candidates = method_group(members, name, false);
    if !candidates.is_empty() {
        return Ok(Some(TypedValue::function(Callable::Method(BoundMethod {
            receiver: Receiver::Instance(obj.clone()),
            name: name.to_string(),
            candidates,
        }))));
    }
    if let Some(indexer) = string_indexer(&ty, members) {
        return obj
            .get_index(indexer, vec![TypedValue::from(name)])
            .map(Some);
    }
    Ok(None)
}

fn dynamic_member(dynamic: &DynamicValue, name: &str) -> Option<TypedValue> {
    match dynamic {
        DynamicValue::Object(map) => map.get(name).map(DynamicValue::to_typed),
        DynamicValue::Array(items) if name == "Length" || name == "Count" => {
            Some(TypedValue::from(items.len() as i32))
        }
        _ => None,
    }
}

fn method_group(members: &[Member], name: &str, is_static: bool) -> Vec<Member> {
    members
        .iter()
        .filter(|m| m.is_method() && m.is_static == is_static && m.name == name)
        .cloned()
        .collect()
}

fn string_indexer<'m>(ty: &HostTypeRef, members: &'m [Member]) -> Option<&'m Member> {
    let indexers: Vec<Member> = members
        .iter()
        .filter(|m| m.is_indexer() && !m.is_static)
        .cloned()
        .collect();
    let chosen = binder::select_member(ty, &indexers, &[TypedValue::from("")])?;
    members.iter().find(|m| *m == chosen)
}

/// Keep the host's value but report it with the member's declared type
/// when the host returned a generic one
fn declared(value: TypedValue, member: &Member) -> TypedValue {
    match member.value_type() {
        Some(ty) if value.ty == TypeTag::Object || value.is_null() => {
            TypedValue::new(value.value, ty.clone())
        }
        _ => value,
    }
}

/// Write `target.name = value`
pub fn set_member(target: &TypedValue, name: &str, value: TypedValue) -> ScriptResult<()> {
    match &target.value {
        Value::Type(TypeTag::Host(ty)) => {
            let member = binder::resolve_member(ty, ty.members(), name, true)
                .ok_or_else(|| ScriptError::missing_member(ty.name(), name))?;
            let value = writable_value(member, value)?;
            ty.set_static(member, value)
        }
        Value::Object(obj) => {
            let ty = obj.host_type();
            let members = ty.members();
            if let Some(member) = binder::resolve_member(&ty, members, name, false) {
                let value = writable_value(member, value)?;
                return obj.set(member, value);
            }
            if let Some(indexer) = string_indexer(&ty, members) {
                let value = indexer_value(indexer, value)?;
                return obj.set_index(indexer, vec![TypedValue::from(name)], value);
            }
            Err(ScriptError::missing_member(ty.name(), name))
        }
        Value::Dynamic(_) => Err(ScriptError::evaluation(format!(
            "cannot assign member '{}' of a dynamic value",
            name
        ))),
        _ => Err(ScriptError::missing_member(target.ty.to_string(), name)),
    }
}

fn writable_value(member: &Member, value: TypedValue) -> ScriptResult<TypedValue> {
    if !member.is_writable() {
        return Err(ScriptError::evaluation(format!(
            "member '{}' is read-only",
            member.name
        )));
    }
    match member.value_type() {
        Some(ty) => binder::coerce_value(value, ty),
        None => Ok(value),
    }
}

fn indexer_value(indexer: &Member, value: TypedValue) -> ScriptResult<TypedValue> {
    match indexer.signature() {
        Some(sig) => binder::coerce_value(value, &sig.returns),
        None => Ok(value),
    }
}

/// Read `target[args]`
pub fn get_index(target: &TypedValue, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
    match &target.value {
        Value::Array(array) => {
            let indices = args.iter().map(index_argument).collect::<ScriptResult<Vec<_>>>()?;
            array.get(&indices)
        }
        Value::String(s) => {
            let index = single_index(&args)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| s.chars().nth(i))
                .map(TypedValue::from)
                .ok_or_else(|| {
                    ScriptError::bad_argument(format!(
                        "index {} is outside the bounds of the string",
                        index
                    ))
                })
        }
        Value::Dynamic(dynamic) => dynamic_index(dynamic, &args),
        Value::Object(obj) => {
            let ty = obj.host_type();
            let indexer = select_indexer(&ty, &args)?;
            let args = coerce_indexer_args(&indexer, args)?;
            obj.get_index(&indexer, args)
        }
        _ => Err(ScriptError::bad_argument(format!(
            "type '{}' cannot be indexed",
            target.ty
        ))),
    }
}

/// Write `target[args] = value`
pub fn set_index(target: &TypedValue, args: Vec<TypedValue>, value: TypedValue) -> ScriptResult<()> {
    match &target.value {
        Value::Array(array) => {
            let indices = args.iter().map(index_argument).collect::<ScriptResult<Vec<_>>>()?;
            let value = binder::coerce_value(value, array.element_type())?;
            array.set(&indices, value.value)
        }
        Value::Object(obj) => {
            let ty = obj.host_type();
            let indexer = select_indexer(&ty, &args)?;
            let args = coerce_indexer_args(&indexer, args)?;
            let value = indexer_value(&indexer, value)?;
            obj.set_index(&indexer, args, value)
        }
        _ => Err(ScriptError::bad_argument(format!(
            "type '{}' does not support indexed assignment",
            target.ty
        ))),
    }
}

fn single_index(args: &[TypedValue]) -> ScriptResult<i64> {
    match args {
        [arg] => index_argument(arg),
        _ => Err(ScriptError::bad_argument(format!(
            "expected 1 index, got {}",
            args.len()
        ))),
    }
}

fn dynamic_index(dynamic: &DynamicValue, args: &[TypedValue]) -> ScriptResult<TypedValue> {
    match dynamic {
        DynamicValue::Array(items) => {
            let index = single_index(args)?;
            usize::try_from(index)
                .ok()
                .and_then(|i| items.get(i))
                .map(DynamicValue::to_typed)
                .ok_or_else(|| {
                    ScriptError::bad_argument(format!(
                        "index {} is outside the bounds of the array (length {})",
                        index,
                        items.len()
                    ))
                })
        }
        DynamicValue::Object(map) => {
            let key = match args {
                [arg] => arg.value.as_str(),
                _ => None,
            }
            .ok_or_else(|| ScriptError::bad_argument("dynamic objects are indexed by a single string key"))?;
            map.get(key)
                .map(DynamicValue::to_typed)
                .ok_or_else(|| ScriptError::missing_member("dynamic", key))
        }
        DynamicValue::Value(_) => Err(ScriptError::bad_argument("dynamic scalar cannot be indexed")),
    }
}

fn select_indexer(ty: &HostTypeRef, args: &[TypedValue]) -> ScriptResult<Member> {
    let indexers: Vec<Member> = ty
        .members()
        .iter()
        .filter(|m| m.is_indexer() && !m.is_static)
        .cloned()
        .collect();
    if indexers.is_empty() {
        return Err(ScriptError::bad_argument(format!(
            "type '{}' has no indexer",
            ty.name()
        )));
    }
    binder::select_member(ty, &indexers, args)
        .cloned()
        .ok_or_else(|| {
            ScriptError::bad_argument(format!(
                "no indexer of '{}' accepts ({})",
                ty.name(),
                type_list(args)
            ))
        })
}

fn coerce_indexer_args(indexer: &Member, args: Vec<TypedValue>) -> ScriptResult<Vec<TypedValue>> {
    match indexer.signature() {
        Some(sig) => binder::coerce_args(&sig.params, args),
        None => Ok(args),
    }
}

fn type_list(args: &[TypedValue]) -> String {
    args.iter()
        .map(|a| a.ty.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Invoke a host callable: native overloads, bound methods and constructors
pub fn call_host(callable: &Callable, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
    match callable {
        Callable::Native(native) => {
            let index = binder::best_signature(native.overloads.iter().map(|o| &o.signature), &args)
                .ok_or_else(|| no_overload(&native.name, &args))?;
            let overload = &native.overloads[index];
            trace!(function = %native.name, overload = index, "calling native function");
            let args = binder::coerce_args(&overload.signature.params, args)?;
            (overload.func)(&args)
        }
        Callable::Method(method) => {
            let owner = match &method.receiver {
                Receiver::Instance(obj) => obj.host_type(),
                Receiver::Static(ty) => ty.clone(),
            };
            let member = binder::select_member(&owner, &method.candidates, &args)
                .ok_or_else(|| no_overload(&method.name, &args))?;
            trace!(method = %method.name, declaring_type = %member.declaring_type, "calling host method");
            let params = member.signature().map_or(&[][..], |sig| sig.params.as_slice());
            let args = binder::coerce_args(params, args)?;
            match &method.receiver {
                Receiver::Instance(obj) => obj.invoke(member, args),
                Receiver::Static(ty) => ty.invoke_static(member, args),
            }
        }
        Callable::Constructor(ty) => {
            let index = binder::best_signature(ty.constructors(), &args).ok_or_else(|| {
                ScriptError::bad_argument(format!(
                    "No match found for constructor of '{}' with ({})",
                    ty.name(),
                    type_list(&args)
                ))
            })?;
            let params = ty.constructors()[index].params.clone();
            let args = binder::coerce_args(&params, args)?;
            ty.construct(index, args)
        }
        Callable::Script(def) => Err(ScriptError::evaluation(format!(
            "script function '{}' needs an evaluator to run",
            def.name
        ))),
    }
}

fn no_overload(name: &str, args: &[TypedValue]) -> ScriptError {
    ScriptError::bad_argument(format!(
        "no overload of '{}' accepts ({})",
        name,
        type_list(args)
    ))
}
