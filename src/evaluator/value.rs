//! Runtime values for the evaluator
//!
//! Every evaluation step produces a [`TypedValue`]: the runtime [`Value`] paired
//! with the semantic [`TypeTag`] it was produced as. The type matters for values
//! such as nullable integers and nulls, where the payload alone cannot say what
//! the expression means.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::errors::{ScriptError, ScriptResult};
use crate::parser::ast::FunctionDef;

use super::dynamic::DynamicValue;
use super::host::{HostObjectRef, HostTypeRef, Member, Signature};
use super::types::TypeTag;

/// A runtime value
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Char(char),
    SByte(i8),
    Byte(u8),
    Short(i16),
    UShort(u16),
    Int(i32),
    UInt(u32),
    Long(i64),
    ULong(u64),
    Float(f32),
    Double(f64),
    Decimal(Decimal),
    String(Arc<str>),
    Array(ArrayValue),
    Range(RangeValue),
    Object(HostObjectRef),
    Dynamic(Arc<DynamicValue>),
    Function(Callable),
    Type(TypeTag),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The concrete type of this payload; null has no type of its own
    pub fn runtime_type(&self) -> TypeTag {
        match self {
            Value::Null => TypeTag::Object,
            Value::Bool(_) => TypeTag::Bool,
            Value::Char(_) => TypeTag::Char,
            Value::SByte(_) => TypeTag::SByte,
            Value::Byte(_) => TypeTag::Byte,
            Value::Short(_) => TypeTag::Short,
            Value::UShort(_) => TypeTag::UShort,
            Value::Int(_) => TypeTag::Int,
            Value::UInt(_) => TypeTag::UInt,
            Value::Long(_) => TypeTag::Long,
            Value::ULong(_) => TypeTag::ULong,
            Value::Float(_) => TypeTag::Float,
            Value::Double(_) => TypeTag::Double,
            Value::Decimal(_) => TypeTag::Decimal,
            Value::String(_) => TypeTag::String,
            Value::Array(array) => array.ty(),
            Value::Range(_) => TypeTag::Range,
            Value::Object(obj) => TypeTag::Host(obj.host_type()),
            Value::Dynamic(_) => TypeTag::Dynamic,
            Value::Function(_) => TypeTag::Function,
            Value::Type(_) => TypeTag::Type,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Integral payloads widened to i128 (chars by code point)
    pub fn as_i128(&self) -> Option<i128> {
        match self {
            Value::Char(c) => Some(*c as i128),
            Value::SByte(n) => Some(*n as i128),
            Value::Byte(n) => Some(*n as i128),
            Value::Short(n) => Some(*n as i128),
            Value::UShort(n) => Some(*n as i128),
            Value::Int(n) => Some(*n as i128),
            Value::UInt(n) => Some(*n as i128),
            Value::Long(n) => Some(*n as i128),
            Value::ULong(n) => Some(*n as i128),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f as f64),
            Value::Double(f) => Some(*f),
            Value::Decimal(d) => rust_decimal::prelude::ToPrimitive::to_f64(d),
            other => other.as_i128().map(|n| n as f64),
        }
    }

    /// Whether this numeric payload is zero; None for non-numeric values
    pub fn is_zero(&self) -> Option<bool> {
        match self {
            Value::Float(f) => Some(*f == 0.0),
            Value::Double(f) => Some(*f == 0.0),
            Value::Decimal(d) => Some(d.is_zero()),
            other => other.as_i128().map(|n| n == 0),
        }
    }

    /// Element count of collection-like values; strings are not collections here
    pub fn collection_len(&self) -> Option<usize> {
        match self {
            Value::Array(array) => Some(array.len()),
            Value::Range(range) => Some(usize::try_from(range.len()).unwrap_or(usize::MAX)),
            Value::Dynamic(dynamic) if !dynamic.is_value() => Some(dynamic.len()),
            Value::Object(obj) => obj.items().map(|items| items.len()),
            _ => None,
        }
    }

    /// Equality used when no operator matches: structural for scalars,
    /// identity for shared objects
    pub fn equals(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Double(a), Value::Double(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a.ptr_eq(b),
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => {
                Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
            }
            (Value::Dynamic(a), Value::Dynamic(b)) => a.equals(b),
            (Value::Type(a), Value::Type(b)) => a == b,
            (Value::Function(Callable::Script(a)), Value::Function(Callable::Script(b))) => {
                Arc::ptr_eq(a, b)
            }
            (a, b) => match (a.as_i128(), b.as_i128()) {
                (Some(x), Some(y)) => a.runtime_type() == b.runtime_type() && x == y,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(true) => write!(f, "True"),
            Value::Bool(false) => write!(f, "False"),
            Value::Char(c) => write!(f, "{}", c),
            Value::SByte(n) => write!(f, "{}", n),
            Value::Byte(n) => write!(f, "{}", n),
            Value::Short(n) => write!(f, "{}", n),
            Value::UShort(n) => write!(f, "{}", n),
            Value::Int(n) => write!(f, "{}", n),
            Value::UInt(n) => write!(f, "{}", n),
            Value::Long(n) => write!(f, "{}", n),
            Value::ULong(n) => write!(f, "{}", n),
            Value::Float(n) => write!(f, "{}", n),
            Value::Double(n) => write!(f, "{}", n),
            Value::Decimal(d) => write!(f, "{}", d),
            Value::String(s) => write!(f, "{}", s),
            Value::Array(array) => write!(f, "{}", array.ty()),
            Value::Range(range) => write!(f, "{}", range),
            Value::Object(obj) => write!(f, "{}", obj.host_type().name()),
            Value::Dynamic(dynamic) => write!(f, "{}", dynamic),
            Value::Function(callable) => write!(f, "{}", callable.name()),
            Value::Type(ty) => write!(f, "{}", ty),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "Null"),
            Value::String(s) => write!(f, "String({:?})", s),
            Value::Char(c) => write!(f, "Char({:?})", c),
            Value::Function(callable) => write!(f, "Function({})", callable.name()),
            Value::Type(ty) => write!(f, "Type({})", ty),
            other => write!(f, "{}({})", other.runtime_type(), other),
        }
    }
}

/// A runtime value paired with its semantic type
#[derive(Clone, Debug)]
pub struct TypedValue {
    pub value: Value,
    pub ty: TypeTag,
}

impl TypedValue {
    /// Pair a value with a type, narrowing the generic object type to the
    /// value's runtime type when a value is present
    pub fn new(value: Value, ty: TypeTag) -> Self {
        let ty = if ty == TypeTag::Object && !value.is_null() {
            value.runtime_type()
        } else {
            ty
        };
        Self { value, ty }
    }

    /// A value typed as its own runtime type
    pub fn of(value: Value) -> Self {
        let ty = value.runtime_type();
        Self { value, ty }
    }

    /// Untyped null, as produced by the `null` literal
    pub fn null() -> Self {
        Self {
            value: Value::Null,
            ty: TypeTag::Object,
        }
    }

    pub fn null_of(ty: TypeTag) -> Self {
        Self {
            value: Value::Null,
            ty,
        }
    }

    pub fn is_null(&self) -> bool {
        self.value.is_null()
    }

    pub fn string(s: impl AsRef<str>) -> Self {
        Self::of(Value::String(Arc::from(s.as_ref())))
    }

    pub fn function(callable: Callable) -> Self {
        Self::of(Value::Function(callable))
    }

    pub fn type_value(ty: TypeTag) -> Self {
        Self::of(Value::Type(ty))
    }

    pub fn host(obj: HostObjectRef) -> Self {
        Self::of(Value::Object(obj))
    }

    /// Retype this value, keeping the payload
    pub fn with_type(self, ty: TypeTag) -> Self {
        Self {
            value: self.value,
            ty,
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl From<bool> for TypedValue {
    fn from(b: bool) -> Self {
        TypedValue::of(Value::Bool(b))
    }
}

impl From<i32> for TypedValue {
    fn from(n: i32) -> Self {
        TypedValue::of(Value::Int(n))
    }
}

impl From<i64> for TypedValue {
    fn from(n: i64) -> Self {
        TypedValue::of(Value::Long(n))
    }
}

impl From<u32> for TypedValue {
    fn from(n: u32) -> Self {
        TypedValue::of(Value::UInt(n))
    }
}

impl From<u64> for TypedValue {
    fn from(n: u64) -> Self {
        TypedValue::of(Value::ULong(n))
    }
}

impl From<f32> for TypedValue {
    fn from(n: f32) -> Self {
        TypedValue::of(Value::Float(n))
    }
}

impl From<f64> for TypedValue {
    fn from(n: f64) -> Self {
        TypedValue::of(Value::Double(n))
    }
}

impl From<Decimal> for TypedValue {
    fn from(d: Decimal) -> Self {
        TypedValue::of(Value::Decimal(d))
    }
}

impl From<char> for TypedValue {
    fn from(c: char) -> Self {
        TypedValue::of(Value::Char(c))
    }
}

impl From<&str> for TypedValue {
    fn from(s: &str) -> Self {
        TypedValue::string(s)
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        TypedValue::string(s)
    }
}

impl From<ArrayValue> for TypedValue {
    fn from(array: ArrayValue) -> Self {
        TypedValue::of(Value::Array(array))
    }
}

impl From<DynamicValue> for TypedValue {
    fn from(dynamic: DynamicValue) -> Self {
        dynamic.to_typed()
    }
}

impl<T: Into<TypedValue>> From<Option<T>> for TypedValue {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => {
                let v = v.into();
                let ty = v.ty.clone().nullable();
                v.with_type(ty)
            }
            None => TypedValue::null(),
        }
    }
}

/// A homogeneous, possibly multi-dimensional array with shared storage.
/// Clones share elements, so writes through one handle are visible through all.
#[derive(Clone)]
pub struct ArrayValue {
    element: TypeTag,
    dims: Arc<[usize]>,
    items: Arc<RwLock<Vec<Value>>>,
}

impl ArrayValue {
    /// Build an array with the given dimension lengths; `items` are in row-major order
    pub fn new(element: TypeTag, dims: Vec<usize>, items: Vec<Value>) -> ScriptResult<Self> {
        let expected: usize = dims.iter().product();
        if dims.is_empty() || expected != items.len() {
            return Err(ScriptError::bad_argument(format!(
                "array of shape {:?} needs {} elements, got {}",
                dims,
                expected,
                items.len()
            )));
        }
        Ok(Self {
            element,
            dims: dims.into(),
            items: Arc::new(RwLock::new(items)),
        })
    }

    /// One-dimensional array
    pub fn from_vec(element: TypeTag, items: Vec<Value>) -> Self {
        Self {
            element,
            dims: vec![items.len()].into(),
            items: Arc::new(RwLock::new(items)),
        }
    }

    /// Two-dimensional array from equally long rows
    pub fn from_rows(element: TypeTag, rows: Vec<Vec<Value>>) -> ScriptResult<Self> {
        let width = rows.first().map_or(0, Vec::len);
        let height = rows.len();
        let items: Vec<Value> = rows.into_iter().flatten().collect();
        Self::new(element, vec![height, width], items)
    }

    pub fn element_type(&self) -> &TypeTag {
        &self.element
    }

    pub fn ty(&self) -> TypeTag {
        TypeTag::array(self.element.clone(), self.rank())
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ptr_eq(&self, other: &ArrayValue) -> bool {
        Arc::ptr_eq(&self.items, &other.items)
    }

    fn flat_index(&self, indices: &[i64]) -> ScriptResult<usize> {
        if indices.len() != self.rank() {
            return Err(ScriptError::bad_argument(format!(
                "array rank mismatch: expected {} indices, got {}",
                self.rank(),
                indices.len()
            )));
        }
        let mut flat = 0usize;
        for (&index, &len) in indices.iter().zip(self.dims.iter()) {
            if index < 0 || index as usize >= len {
                return Err(ScriptError::bad_argument(format!(
                    "index {} is outside the bounds of the array (length {})",
                    index, len
                )));
            }
            flat = flat * len + index as usize;
        }
        Ok(flat)
    }

    pub fn get(&self, indices: &[i64]) -> ScriptResult<TypedValue> {
        let flat = self.flat_index(indices)?;
        let value = self.items.read()[flat].clone();
        Ok(TypedValue::new(value, self.element.clone()))
    }

    pub fn set(&self, indices: &[i64], value: Value) -> ScriptResult<()> {
        let flat = self.flat_index(indices)?;
        self.items.write()[flat] = value;
        Ok(())
    }

    /// Copy of the elements in row-major order
    pub fn to_vec(&self) -> Vec<TypedValue> {
        self.items
            .read()
            .iter()
            .map(|v| TypedValue::new(v.clone(), self.element.clone()))
            .collect()
    }
}

/// A lazy integer sequence produced by `from...to`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeValue {
    pub from: i64,
    pub to: i64,
    pub exclude_from: bool,
    pub exclude_to: bool,
    /// Whether items are produced as `long` rather than `int`
    pub wide: bool,
}

impl RangeValue {
    /// First and last item plus direction, or None when the range is empty
    fn bounds(&self) -> Option<(i64, i64, i64)> {
        if self.from == self.to {
            return (!self.exclude_from && !self.exclude_to).then_some((self.from, self.to, 1));
        }
        // from != to, so stepping inward from either end cannot overflow
        let step = if self.from < self.to { 1 } else { -1 };
        let first = if self.exclude_from {
            self.from + step
        } else {
            self.from
        };
        let last = if self.exclude_to {
            self.to - step
        } else {
            self.to
        };
        if (last as i128 - first as i128) * (step as i128) < 0 {
            return None;
        }
        Some((first, last, step))
    }

    /// Number of items; a full-width long range holds up to 2^64 of them
    pub fn len(&self) -> u128 {
        self.bounds().map_or(0, |(first, last, step)| {
            ((last as i128 - first as i128) / step as i128) as u128 + 1
        })
    }

    pub fn is_empty(&self) -> bool {
        self.bounds().is_none()
    }

    pub fn iter(&self) -> impl Iterator<Item = TypedValue> {
        let wide = self.wide;
        let bounds = self.bounds();
        std::iter::successors(bounds.map(|(first, _, _)| first), move |&n| {
            let (_, last, step) = bounds?;
            (n != last).then(|| n + step)
        })
        .map(move |n| {
            if wide {
                TypedValue::of(Value::Long(n))
            } else {
                TypedValue::of(Value::Int(n as i32))
            }
        })
    }
}

impl fmt::Display for RangeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}...{}{}",
            self.from,
            if self.exclude_from { ">" } else { "" },
            if self.exclude_to { "<" } else { "" },
            self.to
        )
    }
}

pub type NativeFn = Arc<dyn Fn(&[TypedValue]) -> ScriptResult<TypedValue> + Send + Sync>;

/// One typed entry point of a native function
#[derive(Clone)]
pub struct NativeOverload {
    pub signature: Signature,
    pub func: NativeFn,
}

/// A host-provided callable with one or more overloads
#[derive(Clone)]
pub struct NativeFunction {
    pub name: String,
    pub overloads: Vec<NativeOverload>,
}

impl NativeFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overloads: Vec::new(),
        }
    }

    /// Add an overload taking `params` and returning `returns`
    pub fn overload<F>(mut self, params: Vec<TypeTag>, returns: TypeTag, func: F) -> Self
    where
        F: Fn(&[TypedValue]) -> ScriptResult<TypedValue> + Send + Sync + 'static,
    {
        self.overloads.push(NativeOverload {
            signature: Signature::new(params, returns),
            func: Arc::new(func),
        });
        self
    }

    pub fn into_value(self) -> TypedValue {
        TypedValue::function(Callable::Native(Arc::new(self)))
    }
}

/// What a bound method is invoked on
#[derive(Clone)]
pub enum Receiver {
    Instance(HostObjectRef),
    Static(HostTypeRef),
}

/// A host method group bound to its receiver; produced by member access,
/// invoked by a later call
#[derive(Clone)]
pub struct BoundMethod {
    pub receiver: Receiver,
    pub name: String,
    pub candidates: Vec<Member>,
}

/// Anything a call expression can invoke
#[derive(Clone)]
pub enum Callable {
    Native(Arc<NativeFunction>),
    Method(BoundMethod),
    Constructor(HostTypeRef),
    Script(Arc<FunctionDef>),
}

impl Callable {
    pub fn name(&self) -> &str {
        match self {
            Callable::Native(native) => &native.name,
            Callable::Method(method) => &method.name,
            Callable::Constructor(ty) => ty.name(),
            Callable::Script(def) => &def.name,
        }
    }
}
