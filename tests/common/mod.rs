//! Host objects and helpers shared by the end-to-end tests

#![allow(dead_code)]

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use iridium::{
    Context, EngineConfig, HostObject, HostType, HostTypeRef, Member, NativeFunction,
    ScriptEngine, ScriptError, ScriptResult, Signature, TypeTag, TypedValue, Value,
};
use parking_lot::Mutex;

/// Engine with lenient truthiness and every assignment allowed
pub fn flexible_engine() -> ScriptEngine {
    ScriptEngine::with_config(EngineConfig::flexible())
}

/// Evaluate `source` in a fresh flexible context
pub fn eval(source: &str) -> TypedValue {
    let engine = flexible_engine();
    let ctx = engine.create_context();
    engine.evaluate_str(source, &ctx).unwrap()
}

pub fn eval_err(source: &str) -> ScriptError {
    let engine = flexible_engine();
    let ctx = engine.create_context();
    engine.evaluate_str(source, &ctx).unwrap_err()
}

/// A `print` function that appends each argument's text to the returned buffer
pub fn printer(ctx: &Context) -> Arc<Mutex<String>> {
    let out = Arc::new(Mutex::new(String::new()));
    let sink = Arc::clone(&out);
    ctx.set_function(NativeFunction::new("print").overload(
        vec![TypeTag::Object],
        TypeTag::Object,
        move |args| {
            sink.lock().push_str(&args[0].to_string());
            Ok(TypedValue::null())
        },
    ));
    out
}

pub fn int(v: &TypedValue) -> i32 {
    match v.value {
        Value::Int(n) => n,
        ref other => panic!("expected int, got {:?}", other),
    }
}

// Point: fields, a constructor pair, an instance method, a static property
// and an `op_Addition` overload

static POINT: LazyLock<HostTypeRef> = LazyLock::new(|| HostTypeRef::new(PointType::new()));

pub fn point_type() -> HostTypeRef {
    POINT.clone()
}

pub struct PointType {
    members: Vec<Member>,
    constructors: Vec<Signature>,
}

impl PointType {
    fn new() -> Self {
        let point = || TypeTag::Host(HostTypeRef::new(PointStub));
        Self {
            members: vec![
                Member::field("Point", "X", TypeTag::Int),
                Member::field("Point", "Y", TypeTag::Int),
                Member::method("Point", "Scale", vec![TypeTag::Int], point()),
                Member::method("Point", "Describe", vec![], TypeTag::String),
                Member::property("Point", "Origin", point(), false).into_static(),
                Member::method("Point", "op_Addition", vec![point(), point()], point())
                    .into_static(),
            ],
            constructors: vec![
                Signature::new(vec![], point()),
                Signature::new(vec![TypeTag::Int, TypeTag::Int], point()),
            ],
        }
    }
}

/// Stands in for the Point type inside its own member list; host types
/// compare by name
struct PointStub;

impl HostType for PointStub {
    fn name(&self) -> &str {
        "Point"
    }

    fn members(&self) -> &[Member] {
        &[]
    }
}

impl HostType for PointType {
    fn name(&self) -> &str {
        "Point"
    }

    fn members(&self) -> &[Member] {
        &self.members
    }

    fn constructors(&self) -> &[Signature] {
        &self.constructors
    }

    fn construct(&self, index: usize, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
        match index {
            0 => Ok(Point::value(0, 0)),
            _ => Ok(Point::value(int(&args[0]), int(&args[1]))),
        }
    }

    fn get_static(&self, member: &Member) -> ScriptResult<TypedValue> {
        match member.name.as_str() {
            "Origin" => Ok(Point::value(0, 0)),
            _ => Err(ScriptError::missing_member("Point", &member.name)),
        }
    }

    fn invoke_static(&self, member: &Member, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
        match (member.name.as_str(), Point::of(&args[0]), Point::of(&args[1])) {
            ("op_Addition", Some(a), Some(b)) => {
                let (ax, ay) = a.coords();
                let (bx, by) = b.coords();
                Ok(Point::value(ax + bx, ay + by))
            }
            _ => Err(ScriptError::missing_member("Point", &member.name)),
        }
    }
}

pub struct Point {
    coords: Mutex<(i32, i32)>,
}

impl Point {
    pub fn value(x: i32, y: i32) -> TypedValue {
        TypedValue::host(Arc::new(Point {
            coords: Mutex::new((x, y)),
        }))
    }

    pub fn of(v: &TypedValue) -> Option<&Point> {
        match &v.value {
            Value::Object(obj) => obj.as_any().downcast_ref::<Point>(),
            _ => None,
        }
    }

    pub fn coords(&self) -> (i32, i32) {
        *self.coords.lock()
    }
}

impl HostObject for Point {
    fn host_type(&self) -> HostTypeRef {
        point_type()
    }

    fn get(&self, member: &Member) -> ScriptResult<TypedValue> {
        let (x, y) = self.coords();
        match member.name.as_str() {
            "X" => Ok(TypedValue::from(x)),
            "Y" => Ok(TypedValue::from(y)),
            _ => Err(ScriptError::missing_member("Point", &member.name)),
        }
    }

    fn set(&self, member: &Member, value: TypedValue) -> ScriptResult<()> {
        let mut coords = self.coords.lock();
        match member.name.as_str() {
            "X" => coords.0 = int(&value),
            "Y" => coords.1 = int(&value),
            _ => return Err(ScriptError::missing_member("Point", &member.name)),
        }
        Ok(())
    }

    fn invoke(&self, member: &Member, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
        let (x, y) = self.coords();
        match member.name.as_str() {
            "Scale" => {
                let k = int(&args[0]);
                Ok(Point::value(x * k, y * k))
            }
            "Describe" => Ok(TypedValue::from(format!("({}, {})", x, y))),
            _ => Err(ScriptError::missing_member("Point", &member.name)),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

// Settings: a bag with a string indexer, so `settings.name` falls back to
// `settings["name"]`

static SETTINGS: LazyLock<HostTypeRef> = LazyLock::new(|| {
    HostTypeRef::new(SettingsType {
        members: vec![
            Member::indexer("Settings", vec![TypeTag::String], TypeTag::Object),
            Member::property("Settings", "Count", TypeTag::Int, false),
        ],
    })
});

pub struct SettingsType {
    members: Vec<Member>,
}

impl HostType for SettingsType {
    fn name(&self) -> &str {
        "Settings"
    }

    fn members(&self) -> &[Member] {
        &self.members
    }
}

#[derive(Default)]
pub struct Settings {
    entries: Mutex<HashMap<String, TypedValue>>,
}

impl Settings {
    pub fn value(entries: &[(&str, TypedValue)]) -> TypedValue {
        let settings = Settings::default();
        {
            let mut map = settings.entries.lock();
            for (k, v) in entries {
                map.insert(k.to_string(), v.clone());
            }
        }
        TypedValue::host(Arc::new(settings))
    }
}

impl HostObject for Settings {
    fn host_type(&self) -> HostTypeRef {
        SETTINGS.clone()
    }

    fn get(&self, member: &Member) -> ScriptResult<TypedValue> {
        match member.name.as_str() {
            "Count" => Ok(TypedValue::from(self.entries.lock().len() as i32)),
            _ => Err(ScriptError::missing_member("Settings", &member.name)),
        }
    }

    fn get_index(&self, _indexer: &Member, args: Vec<TypedValue>) -> ScriptResult<TypedValue> {
        let key = args[0].to_string();
        Ok(self
            .entries
            .lock()
            .get(&key)
            .cloned()
            .unwrap_or_else(TypedValue::null))
    }

    fn set_index(&self, _indexer: &Member, args: Vec<TypedValue>, value: TypedValue) -> ScriptResult<()> {
        self.entries.lock().insert(args[0].to_string(), value);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
