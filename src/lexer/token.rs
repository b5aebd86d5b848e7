use std::fmt;

use crate::parser::ast::BinaryOp;

/// Statement keywords
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    If,
    Else,
    ForEach,
    While,
    Return,
    Break,
    Function,
}

/// Structural role of a token in the grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Operator,
    UnaryOperator,
    TernaryOperator,
    Term,
    FunctionCall,
    LeftParen,
    RightParen,
    ArgumentSeparator,
    StatementSeparator,
    OpenBrace,
    CloseBrace,
    Keyword(Keyword),
    Whitespace,
}

impl TokenKind {
    /// Whether this token can start an operand
    pub fn starts_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Term | TokenKind::UnaryOperator | TokenKind::LeftParen
        )
    }

    /// Whether this token can follow a complete operand
    pub fn follows_operand(&self) -> bool {
        matches!(
            self,
            TokenKind::Operator
                | TokenKind::TernaryOperator
                | TokenKind::FunctionCall
                | TokenKind::RightParen
                | TokenKind::ArgumentSeparator
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// What the compiler builds from a token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    None,
    // terms
    Number,
    Char,
    String,
    Identifier,
    Constructor,
    True,
    False,
    Null,
    TypeName,
    Typeof,
    // binary operators
    Binary(BinaryOp),
    Assign,
    Dot,
    AndAlso,
    OrElse,
    Coalesce,
    DefaultValue,
    ValueOrNull,
    As,
    Is,
    In,
    Range,
    Ternary,
    TernaryElse,
    // unary operators
    Minus,
    Not,
    Complement,
    Cast,
    // postfix
    Call,
    Index,
}

/// Grammar properties shared by every token of one syntax entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSpec {
    pub kind: TokenKind,
    pub precedence: u8,
    pub associativity: Associativity,
    pub arity: u8,
    pub action: Action,
}

impl TokenSpec {
    pub const fn new(kind: TokenKind, action: Action) -> Self {
        Self {
            kind,
            precedence: 0,
            associativity: Associativity::Left,
            arity: 0,
            action,
        }
    }

    pub const fn term(action: Action) -> Self {
        Self::new(TokenKind::Term, action)
    }

    pub const fn binary(precedence: u8, action: Action) -> Self {
        Self {
            kind: TokenKind::Operator,
            precedence,
            associativity: Associativity::Left,
            arity: 2,
            action,
        }
    }

    pub const fn unary(precedence: u8, action: Action) -> Self {
        Self {
            kind: TokenKind::UnaryOperator,
            precedence,
            associativity: Associativity::Right,
            arity: 1,
            action,
        }
    }

    pub const fn right(mut self) -> Self {
        self.associativity = Associativity::Right;
        self
    }

    pub const fn with_precedence(mut self, precedence: u8) -> Self {
        self.precedence = precedence;
        self
    }
}

/// A token produced by the lexer
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    /// Byte offset in the source
    pub offset: usize,
    pub kind: TokenKind,
    pub precedence: u8,
    pub associativity: Associativity,
    pub arity: u8,
    pub action: Action,
    /// Other interpretations of the same span
    pub alternates: Vec<Token>,
}

impl Token {
    pub fn new(text: impl Into<String>, offset: usize, spec: TokenSpec) -> Self {
        Self {
            text: text.into(),
            offset,
            kind: spec.kind,
            precedence: spec.precedence,
            associativity: spec.associativity,
            arity: spec.arity,
            action: spec.action,
            alternates: Vec::new(),
        }
    }

    pub fn spec(&self) -> TokenSpec {
        TokenSpec {
            kind: self.kind,
            precedence: self.precedence,
            associativity: self.associativity,
            arity: self.arity,
            action: self.action,
        }
    }

    /// This token reinterpreted with another spec, keeping text and position
    pub fn as_spec(&self, spec: TokenSpec) -> Token {
        Token::new(self.text.clone(), self.offset, spec)
    }

    /// The primary interpretation followed by the alternates
    pub fn interpretations(&self) -> impl Iterator<Item = &Token> {
        std::iter::once(self).chain(self.alternates.iter())
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn end(&self) -> usize {
        self.offset + self.text.len()
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.text)
    }
}
