//! Expression tree produced by the parser
//!
//! Nodes are immutable once built. Evaluation only changes state through the
//! [`crate::context::Context`] it is given.

use std::sync::Arc;

use crate::evaluator::types::TypeTag;
use crate::evaluator::value::TypedValue;

/// Binary operators dispatched through the operator table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    BitAnd,
    BitOr,
    BitXor,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
            BinaryOp::Le => "<=",
            BinaryOp::Ge => ">=",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
        }
    }
}

/// A script function: `function name(params) body`
#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Expr,
}

/// Expression tree node
#[derive(Debug, Clone)]
pub enum Expr {
    /// A constant
    Value(TypedValue),
    Variable(String),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryMinus(Box<Expr>),
    /// Logical `!`
    Negation(Box<Expr>),
    BitwiseComplement(Box<Expr>),
    /// `(T)operand`
    Cast {
        ty: TypeTag,
        operand: Box<Expr>,
    },
    Field {
        target: Box<Expr>,
        name: String,
    },
    Index {
        target: Box<Expr>,
        args: Vec<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `new T(args)`
    Constructor {
        type_name: String,
        args: Vec<Expr>,
    },
    Assignment {
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `cond ? if_true : if_false`
    Conditional {
        cond: Box<Expr>,
        if_true: Box<Expr>,
        if_false: Box<Expr>,
    },
    /// `value ?? fallback`: fallback when value is null
    Coalesce {
        value: Box<Expr>,
        fallback: Box<Expr>,
    },
    /// `value ?: fallback`: fallback when value is not truthy
    DefaultValue {
        value: Box<Expr>,
        fallback: Box<Expr>,
    },
    /// `cond :: value`: value when cond is truthy, otherwise null
    ValueOrNull {
        cond: Box<Expr>,
        value: Box<Expr>,
    },
    AndAlso(Box<Expr>, Box<Expr>),
    OrElse(Box<Expr>, Box<Expr>),
    As {
        value: Box<Expr>,
        ty: Box<Expr>,
    },
    Is {
        value: Box<Expr>,
        ty: Box<Expr>,
    },
    Range {
        from: Box<Expr>,
        to: Box<Expr>,
        exclude_from: bool,
        exclude_to: bool,
    },
    /// `name in collection`, only meaningful as a `foreach` header
    In {
        iterator: String,
        collection: Box<Expr>,
    },
    Sequence(Vec<Expr>),
    If {
        cond: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    While {
        cond: Box<Expr>,
        body: Box<Expr>,
    },
    ForEach {
        iterator: String,
        collection: Box<Expr>,
        body: Box<Expr>,
    },
    FunctionDefinition(Arc<FunctionDef>),
    Return(Option<Box<Expr>>),
    Break,
}

impl Expr {
    pub fn null() -> Expr {
        Expr::Value(TypedValue::null())
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Expr::Variable(_))
    }

    /// Number of top-level statements this node represents
    pub fn statement_count(&self) -> usize {
        match self {
            Expr::Sequence(items) => items.len(),
            _ => 1,
        }
    }
}
