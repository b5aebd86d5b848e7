//! Semantic type tags carried next to every runtime value.

use std::fmt;

use super::host::HostTypeRef;

/// The semantic type of a [`super::value::TypedValue`]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeTag {
    /// The generic "any" type; narrowed to the runtime type whenever a value is present
    Object,
    Bool,
    Char,
    SByte,
    Byte,
    Short,
    UShort,
    Int,
    UInt,
    Long,
    ULong,
    Float,
    Double,
    Decimal,
    String,
    Array { element: Box<TypeTag>, rank: usize },
    /// A value type that may also hold null
    Nullable(Box<TypeTag>),
    /// A lazy integer range produced by `from...to`
    Range,
    Function,
    /// A type used as a value, such as `int` in `x as int`
    Type,
    Dynamic,
    Host(HostTypeRef),
}

impl TypeTag {
    /// Resolve a built-in type keyword
    pub fn from_keyword(name: &str) -> Option<TypeTag> {
        let ty = match name {
            "object" => TypeTag::Object,
            "bool" => TypeTag::Bool,
            "char" => TypeTag::Char,
            "sbyte" => TypeTag::SByte,
            "byte" => TypeTag::Byte,
            "short" => TypeTag::Short,
            "ushort" => TypeTag::UShort,
            "int" => TypeTag::Int,
            "uint" => TypeTag::UInt,
            "long" => TypeTag::Long,
            "ulong" => TypeTag::ULong,
            "float" => TypeTag::Float,
            "double" => TypeTag::Double,
            "decimal" => TypeTag::Decimal,
            "string" => TypeTag::String,
            _ => return None,
        };
        Some(ty)
    }

    /// Keywords accepted by [`TypeTag::from_keyword`]
    pub const KEYWORDS: &'static [&'static str] = &[
        "object", "bool", "char", "sbyte", "byte", "short", "ushort", "int", "uint", "long",
        "ulong", "float", "double", "decimal", "string",
    ];

    pub fn array(element: TypeTag, rank: usize) -> TypeTag {
        TypeTag::Array {
            element: Box::new(element),
            rank,
        }
    }

    /// Wrap a value type as nullable; reference types and nullables are returned unchanged
    pub fn nullable(self) -> TypeTag {
        if self.is_value_type() && !self.is_nullable() {
            TypeTag::Nullable(Box::new(self))
        } else {
            self
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeTag::Nullable(_))
    }

    /// The underlying type with any nullable wrapper removed
    pub fn strip_nullable(&self) -> &TypeTag {
        match self {
            TypeTag::Nullable(inner) => inner,
            other => other,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            TypeTag::Char
                | TypeTag::SByte
                | TypeTag::Byte
                | TypeTag::Short
                | TypeTag::UShort
                | TypeTag::Int
                | TypeTag::UInt
                | TypeTag::Long
                | TypeTag::ULong
                | TypeTag::Float
                | TypeTag::Double
                | TypeTag::Decimal
        )
    }

    pub fn is_integral(&self) -> bool {
        matches!(
            self,
            TypeTag::Char
                | TypeTag::SByte
                | TypeTag::Byte
                | TypeTag::Short
                | TypeTag::UShort
                | TypeTag::Int
                | TypeTag::UInt
                | TypeTag::Long
                | TypeTag::ULong
        )
    }

    /// Signed integral types narrower than `long`
    pub fn is_small_signed(&self) -> bool {
        matches!(self, TypeTag::SByte | TypeTag::Short | TypeTag::Int)
    }

    /// Types with copy semantics; everything else is reference-like
    pub fn is_value_type(&self) -> bool {
        self.is_numeric() || matches!(self, TypeTag::Bool | TypeTag::Nullable(_))
    }

    /// Whether a value of type `other` may be stored where `self` is expected
    /// without conversion
    pub fn is_assignable_from(&self, other: &TypeTag) -> bool {
        if self == other || *self == TypeTag::Object {
            return true;
        }
        match (self, other) {
            (TypeTag::Nullable(inner), other) => inner.as_ref() == other.strip_nullable(),
            (TypeTag::Host(expected), TypeTag::Host(actual)) => expected.is_assignable_from(actual),
            (
                TypeTag::Array {
                    element: expected,
                    rank: r1,
                },
                TypeTag::Array {
                    element: actual,
                    rank: r2,
                },
            ) => r1 == r2 && !actual.is_value_type() && expected.is_assignable_from(actual),
            _ => false,
        }
    }

    pub fn name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for TypeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeTag::Object => write!(f, "object"),
            TypeTag::Bool => write!(f, "bool"),
            TypeTag::Char => write!(f, "char"),
            TypeTag::SByte => write!(f, "sbyte"),
            TypeTag::Byte => write!(f, "byte"),
            TypeTag::Short => write!(f, "short"),
            TypeTag::UShort => write!(f, "ushort"),
            TypeTag::Int => write!(f, "int"),
            TypeTag::UInt => write!(f, "uint"),
            TypeTag::Long => write!(f, "long"),
            TypeTag::ULong => write!(f, "ulong"),
            TypeTag::Float => write!(f, "float"),
            TypeTag::Double => write!(f, "double"),
            TypeTag::Decimal => write!(f, "decimal"),
            TypeTag::String => write!(f, "string"),
            TypeTag::Array { element, rank } => {
                write!(f, "{}[{}]", element, ",".repeat(rank.saturating_sub(1)))
            }
            TypeTag::Nullable(inner) => write!(f, "{}?", inner),
            TypeTag::Range => write!(f, "range"),
            TypeTag::Function => write!(f, "function"),
            TypeTag::Type => write!(f, "type"),
            TypeTag::Dynamic => write!(f, "dynamic"),
            TypeTag::Host(ty) => write!(f, "{}", ty.name()),
        }
    }
}
