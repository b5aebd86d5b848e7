//! Lexer for the expression and scripting syntax.
//!
//! Wires the default C#-like syntax table onto the generic [`tokenizer`] and
//! decodes literal tokens into values.

pub mod matchers;
pub mod token;
pub mod tokenizer;

use std::str::FromStr;

use rust_decimal::Decimal;

use crate::errors::{ScriptError, ScriptResult};
use crate::evaluator::types::TypeTag;
use crate::evaluator::value::TypedValue;
use crate::parser::ast::BinaryOp;
use matchers::{Cast, Constructor, Identifier, Literal, Number, Quoted, Range, Whitespace};
use token::{Action, Associativity, Keyword, Token, TokenKind, TokenSpec};
use tokenizer::Tokenizer;

pub mod precedence {
    pub const ASSIGN: u8 = 1;
    pub const TERNARY: u8 = 2;
    pub const COALESCE: u8 = 3;
    pub const OR_ELSE: u8 = 4;
    pub const AND_ALSO: u8 = 5;
    pub const BIT_OR: u8 = 6;
    pub const BIT_XOR: u8 = 7;
    pub const BIT_AND: u8 = 8;
    pub const EQUALITY: u8 = 9;
    pub const RELATIONAL: u8 = 10;
    pub const RANGE: u8 = 11;
    pub const SHIFT: u8 = 12;
    pub const ADDITIVE: u8 = 13;
    pub const MULTIPLICATIVE: u8 = 14;
    pub const UNARY: u8 = 15;
    pub const POSTFIX: u8 = 16;
}

use precedence::*;

const TERNARY_SPEC: TokenSpec = TokenSpec {
    kind: TokenKind::TernaryOperator,
    precedence: TERNARY,
    associativity: Associativity::Right,
    arity: 3,
    action: Action::Ternary,
};

const BINARY_OPERATORS: &[(&str, u8, BinaryOp)] = &[
    ("==", EQUALITY, BinaryOp::Eq),
    ("!=", EQUALITY, BinaryOp::Ne),
    ("<=", RELATIONAL, BinaryOp::Le),
    (">=", RELATIONAL, BinaryOp::Ge),
    ("<", RELATIONAL, BinaryOp::Lt),
    (">", RELATIONAL, BinaryOp::Gt),
    ("<<", SHIFT, BinaryOp::Shl),
    (">>", SHIFT, BinaryOp::Shr),
    ("+", ADDITIVE, BinaryOp::Add),
    ("-", ADDITIVE, BinaryOp::Sub),
    ("*", MULTIPLICATIVE, BinaryOp::Mul),
    ("/", MULTIPLICATIVE, BinaryOp::Div),
    ("%", MULTIPLICATIVE, BinaryOp::Rem),
    ("&", BIT_AND, BinaryOp::BitAnd),
    ("|", BIT_OR, BinaryOp::BitOr),
    ("^", BIT_XOR, BinaryOp::BitXor),
];

const STATEMENT_KEYWORDS: &[(&str, Keyword)] = &[
    ("if", Keyword::If),
    ("else", Keyword::Else),
    ("foreach", Keyword::ForEach),
    ("while", Keyword::While),
    ("return", Keyword::Return),
    ("break", Keyword::Break),
    ("function", Keyword::Function),
];

/// Tokenizer configured with a syntax table
pub struct Lexer {
    tokenizer: Tokenizer<TokenSpec>,
}

impl Default for Lexer {
    fn default() -> Self {
        Self::new()
    }
}

impl Lexer {
    /// Lexer for the default syntax
    pub fn new() -> Self {
        Self::with_tokenizer(default_syntax())
    }

    /// Lexer for a custom syntax table
    pub fn with_tokenizer(tokenizer: Tokenizer<TokenSpec>) -> Self {
        Self { tokenizer }
    }

    /// Split `source` into tokens, whitespace included
    pub fn tokenize(&self, source: &str) -> ScriptResult<Vec<Token>> {
        self.tokenizer
            .tokenize(source)?
            .into_iter()
            .map(|lexeme| {
                let spec = lexeme.tag.ok_or_else(|| {
                    ScriptError::unknown_token(source, lexeme.offset, lexeme.text.as_str())
                })?;
                let mut token = Token::new(lexeme.text, lexeme.offset, spec);
                let alternates: Vec<Token> = lexeme
                    .alternates
                    .into_iter()
                    .map(|alt| token.as_spec(alt))
                    .collect();
                token.alternates = alternates;
                Ok(token)
            })
            .collect()
    }
}

/// The default C#-like syntax table. Registration order decides which
/// interpretation of a span is primary.
pub fn default_syntax() -> Tokenizer<TokenSpec> {
    let mut t = Tokenizer::new();

    for (text, keyword) in STATEMENT_KEYWORDS {
        t.add(
            Literal::keyword(*text),
            TokenSpec::new(TokenKind::Keyword(*keyword), Action::None),
        );
    }
    t.add(Literal::keyword("in"), TokenSpec::binary(ASSIGN, Action::In).right())
        .add(Literal::keyword("as"), TokenSpec::binary(RELATIONAL, Action::As))
        .add(Literal::keyword("is"), TokenSpec::binary(RELATIONAL, Action::Is))
        .add(Literal::keyword("true"), TokenSpec::term(Action::True))
        .add(Literal::keyword("false"), TokenSpec::term(Action::False))
        .add(Literal::keyword("null"), TokenSpec::term(Action::Null))
        .add(Literal::keyword("typeof"), TokenSpec::term(Action::Typeof));
    for keyword in TypeTag::KEYWORDS {
        t.add(Literal::keyword(*keyword), TokenSpec::term(Action::TypeName));
    }
    t.add(Constructor, TokenSpec::term(Action::Constructor))
        .add(Cast, TokenSpec::unary(UNARY, Action::Cast))
        .add(Range, TokenSpec::binary(RANGE, Action::Range));

    for (text, precedence, op) in BINARY_OPERATORS {
        t.add(Literal::new(*text), TokenSpec::binary(*precedence, Action::Binary(*op)));
    }
    t.add(Literal::new("-"), TokenSpec::unary(UNARY, Action::Minus))
        .add(Literal::new("!"), TokenSpec::unary(UNARY, Action::Not))
        .add(Literal::new("~"), TokenSpec::unary(UNARY, Action::Complement))
        .add(Literal::new("&&"), TokenSpec::binary(AND_ALSO, Action::AndAlso))
        .add(Literal::new("||"), TokenSpec::binary(OR_ELSE, Action::OrElse))
        .add(Literal::new("??"), TokenSpec::binary(COALESCE, Action::Coalesce).right())
        .add(Literal::new("?:"), TokenSpec::binary(COALESCE, Action::DefaultValue).right())
        .add(Literal::new("::"), TokenSpec::binary(COALESCE, Action::ValueOrNull).right())
        .add(Literal::new("="), TokenSpec::binary(ASSIGN, Action::Assign).right())
        .add(Literal::new("?"), TERNARY_SPEC)
        .add(
            Literal::new(":"),
            TokenSpec {
                action: Action::TernaryElse,
                ..TERNARY_SPEC
            },
        )
        .add(Literal::new("."), TokenSpec::binary(POSTFIX, Action::Dot))
        .add(Literal::new(","), TokenSpec::new(TokenKind::ArgumentSeparator, Action::None))
        .add(Literal::new(";"), TokenSpec::new(TokenKind::StatementSeparator, Action::None))
        .add(Literal::new("{"), TokenSpec::new(TokenKind::OpenBrace, Action::None))
        .add(Literal::new("}"), TokenSpec::new(TokenKind::CloseBrace, Action::None))
        .add(Literal::new("("), TokenSpec::new(TokenKind::LeftParen, Action::None))
        .add(
            Literal::new("("),
            TokenSpec::new(TokenKind::FunctionCall, Action::Call).with_precedence(POSTFIX),
        )
        .add(Literal::new(")"), TokenSpec::new(TokenKind::RightParen, Action::None))
        .add(
            Literal::new("["),
            TokenSpec::new(TokenKind::FunctionCall, Action::Index).with_precedence(POSTFIX),
        )
        .add(Literal::new("["), TokenSpec::new(TokenKind::LeftParen, Action::None))
        .add(Literal::new("]"), TokenSpec::new(TokenKind::RightParen, Action::None))
        .add(Quoted::new('"'), TokenSpec::term(Action::String))
        .add(Quoted::new('\''), TokenSpec::term(Action::Char))
        .add(Whitespace, TokenSpec::new(TokenKind::Whitespace, Action::None))
        .add(Number, TokenSpec::term(Action::Number))
        .add(Identifier, TokenSpec::term(Action::Identifier));
    t
}

/// Decode a literal term (number, char or string) into its value
pub fn literal_value(token: &Token) -> Result<TypedValue, String> {
    match token.action {
        Action::Number => parse_number(&token.text),
        Action::Char => parse_char(&token.text),
        Action::String => parse_string(&token.text).map(TypedValue::from),
        _ => Err(format!("'{}' is not a literal", token.text)),
    }
}

/// Parse a numeric literal, honouring its type suffix
pub fn parse_number(text: &str) -> Result<TypedValue, String> {
    let split = text
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(text.len());
    let (body, suffix) = text.split_at(split);
    let invalid = || format!("invalid numeric literal '{}'", text);
    let out_of_range = || format!("numeric literal '{}' is out of range", text);

    let value = match suffix.to_ascii_lowercase().as_str() {
        "m" => TypedValue::from(Decimal::from_str(body).map_err(|_| invalid())?),
        "d" => TypedValue::from(body.parse::<f64>().map_err(|_| invalid())?),
        "f" => TypedValue::from(body.parse::<f32>().map_err(|_| invalid())?),
        "l" => match body.parse::<i64>() {
            Ok(n) => TypedValue::from(n),
            Err(_) => TypedValue::from(body.parse::<u64>().map_err(|_| out_of_range())?),
        },
        "u" => match body.parse::<u32>() {
            Ok(n) => TypedValue::from(n),
            Err(_) => TypedValue::from(body.parse::<u64>().map_err(|_| out_of_range())?),
        },
        "ul" | "lu" => TypedValue::from(body.parse::<u64>().map_err(|_| out_of_range())?),
        "" if body.contains('.') => TypedValue::from(body.parse::<f64>().map_err(|_| invalid())?),
        "" => {
            if let Ok(n) = body.parse::<i32>() {
                TypedValue::from(n)
            } else if let Ok(n) = body.parse::<i64>() {
                TypedValue::from(n)
            } else {
                TypedValue::from(body.parse::<u64>().map_err(|_| out_of_range())?)
            }
        }
        _ => return Err(invalid()),
    };
    Ok(value)
}

fn parse_char(text: &str) -> Result<TypedValue, String> {
    let body = unquote(text, '\'')?;
    let decoded = unescape(body)?;
    let mut chars = decoded.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(TypedValue::from(c)),
        _ => Err(format!("char literal {} must hold exactly one character", text)),
    }
}

/// Decode a double-quoted string literal
pub fn parse_string(text: &str) -> Result<String, String> {
    unescape(unquote(text, '"')?)
}

fn unquote(text: &str, quote: char) -> Result<&str, String> {
    text.strip_prefix(quote)
        .and_then(|t| t.strip_suffix(quote))
        .ok_or_else(|| format!("unterminated literal {}", text))
}

/// Resolve escape sequences: `\n \t \r \\ \' \" \0 \a \b \f \v` and `\x`
/// followed by one to four hex digits
pub fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let escaped = match chars.next() {
            Some('n') => '\n',
            Some('t') => '\t',
            Some('r') => '\r',
            Some('\\') => '\\',
            Some('\'') => '\'',
            Some('"') => '"',
            Some('0') => '\0',
            Some('a') => '\u{7}',
            Some('b') => '\u{8}',
            Some('f') => '\u{c}',
            Some('v') => '\u{b}',
            Some('x') => {
                let mut hex = String::new();
                while hex.len() < 4 {
                    match chars.peek() {
                        Some(h) if h.is_ascii_hexdigit() => {
                            hex.push(*h);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                let code = u32::from_str_radix(&hex, 16)
                    .map_err(|_| "\\x must be followed by hex digits".to_string())?;
                char::from_u32(code)
                    .ok_or_else(|| format!("\\x{} is not a valid character", hex))?
            }
            Some(other) => return Err(format!("'\\{}' is not a valid escape sequence", other)),
            None => return Err("unexpected end of literal in escape sequence".to_string()),
        };
        out.push(escaped);
    }
    Ok(out)
}
