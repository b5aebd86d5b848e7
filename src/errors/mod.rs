//! Error types, diagnostics, and result aliases for the script engine.
//!
//! All failures are variants of [`ScriptError`], rendered via `miette` diagnostics.
//! Errors raised while compiling carry the source text and a span; errors raised
//! while evaluating carry the names and types involved.

use std::fmt;

use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Calculate Levenshtein distance between two strings
fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    if a_chars.is_empty() {
        return b_chars.len();
    }
    if b_chars.is_empty() {
        return a_chars.len();
    }

    let mut previous: Vec<usize> = (0..=b_chars.len()).collect();
    let mut current = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (previous[j + 1] + 1)
                .min(current[j] + 1)
                .min(previous[j] + cost);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b_chars.len()]
}

/// Find the best "did you mean?" suggestion from a list of candidates
pub fn find_similar(name: &str, candidates: &[String], max_distance: usize) -> Option<String> {
    let name_lower = name.to_lowercase();
    let mut best_match = None;
    let mut best_distance = usize::MAX;

    for candidate in candidates {
        let distance = levenshtein_distance(&name_lower, &candidate.to_lowercase());

        if distance <= max_distance && distance < best_distance {
            best_distance = distance;
            best_match = Some(candidate.clone());
        }
    }

    best_match
}

/// Build the help line for an unknown variable, suggesting a close match if any
pub fn unknown_variable_help(name: &str, available: &[String]) -> String {
    // Longer names tolerate more typos
    let max_distance = (name.len() / 3).clamp(1, 3);

    if let Some(suggestion) = find_similar(name, available, max_distance) {
        format!("did you mean '{}'?", suggestion)
    } else if available.is_empty() {
        "no variables are defined in this context".to_string()
    } else if available.len() <= 5 {
        format!("available variables: {}", available.join(", "))
    } else {
        "check the variable name for typos".to_string()
    }
}

/// Why an assignment was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignmentDenial {
    /// Neither new nor existing variables may be assigned
    Variable,
    /// The variable does not exist yet and creating variables is not allowed
    NewVariable,
    /// The variable exists and overwriting variables is not allowed
    ExistingVariable,
    Property,
    Indexer,
    /// The left-hand side is not a variable, member or indexer
    NotAssignable,
}

impl fmt::Display for AssignmentDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssignmentDenial::Variable => write!(f, "assignment to variable not allowed"),
            AssignmentDenial::NewVariable => write!(f, "assignment to new variable not allowed"),
            AssignmentDenial::ExistingVariable => {
                write!(f, "assignment to existing variable not allowed")
            }
            AssignmentDenial::Property => write!(f, "assignment to property not allowed"),
            AssignmentDenial::Indexer => write!(f, "assignment to indexer not allowed"),
            AssignmentDenial::NotAssignable => write!(f, "expression is not assignable"),
        }
    }
}

/// Main error type for the script engine
#[derive(Error, Debug, Diagnostic)]
pub enum ScriptError {
    #[error("unknown token '{token}'")]
    #[diagnostic(code(E0001), help("no token of the expression syntax starts here"))]
    UnknownToken {
        #[source_code]
        src: String,
        #[label("unrecognized input")]
        span: SourceSpan,
        token: String,
    },

    #[error("{message}")]
    #[diagnostic(code(E0002), help("{help}"))]
    Lexer {
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
        message: String,
        help: String,
    },

    #[error("{message}")]
    #[diagnostic(code(E0003), help("{help}"))]
    Parsing {
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
        message: String,
        help: String,
    },

    #[error("operator '{operator}' cannot be applied to {operands}")]
    #[diagnostic(code(E0101))]
    IllegalOperands { operator: String, operands: String },

    #[error("{reason}")]
    #[diagnostic(code(E0102), help("grant the matching assignment permission on the context"))]
    IllegalAssignment {
        reason: AssignmentDenial,
        target: String,
    },

    #[error("unknown property '{name}'")]
    #[diagnostic(code(E0201), help("{help}"))]
    UnknownProperty { name: String, help: String },

    #[error("type '{type_name}' has no member '{member}'")]
    #[diagnostic(code(E0202))]
    MissingMember { type_name: String, member: String },

    #[error("{message}")]
    #[diagnostic(code(E0301))]
    ExpressionEvaluation { message: String },

    #[error("{message}")]
    #[diagnostic(code(E0302))]
    BadArgument { message: String },

    #[error("{message}")]
    #[diagnostic(code(E0303), help("enable NULL_IS_FALSE to treat null as false"))]
    NullReference { message: String },

    #[error("{message}")]
    #[diagnostic(code(E0304))]
    Argument { message: String },

    #[error("division by zero")]
    #[diagnostic(code(E0305), help("divisor must be non-zero"))]
    DivisionByZero,

    #[error("maximum call depth of {limit} exceeded")]
    #[diagnostic(code(E0306), help("check for unbounded recursion in script functions"))]
    RecursionLimitExceeded { limit: usize },
}

impl ScriptError {
    /// Create an UnknownToken error covering `offset..offset + len` of `src`
    pub fn unknown_token(src: impl Into<String>, offset: usize, token: impl Into<String>) -> Self {
        let token = token.into();
        ScriptError::UnknownToken {
            src: src.into(),
            span: (offset, token.len()).into(),
            token,
        }
    }

    /// Create a Lexer error (malformed statement brackets and keywords)
    pub fn lexer(
        src: impl Into<String>,
        span: (usize, usize),
        message: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        ScriptError::Lexer {
            src: src.into(),
            span: span.into(),
            message: message.into(),
            help: help.into(),
        }
    }

    /// Create a Parsing error (operator/operand structure)
    pub fn parsing(
        src: impl Into<String>,
        span: (usize, usize),
        message: impl Into<String>,
        help: impl Into<String>,
    ) -> Self {
        ScriptError::Parsing {
            src: src.into(),
            span: span.into(),
            message: message.into(),
            help: help.into(),
        }
    }

    pub fn illegal_operands(operator: impl Into<String>, operands: impl Into<String>) -> Self {
        ScriptError::IllegalOperands {
            operator: operator.into(),
            operands: operands.into(),
        }
    }

    pub fn illegal_assignment(reason: AssignmentDenial, target: impl Into<String>) -> Self {
        ScriptError::IllegalAssignment {
            reason,
            target: target.into(),
        }
    }

    pub fn unknown_property(name: impl Into<String>, help: impl Into<String>) -> Self {
        ScriptError::UnknownProperty {
            name: name.into(),
            help: help.into(),
        }
    }

    pub fn missing_member(type_name: impl Into<String>, member: impl Into<String>) -> Self {
        ScriptError::MissingMember {
            type_name: type_name.into(),
            member: member.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        ScriptError::ExpressionEvaluation {
            message: message.into(),
        }
    }

    pub fn bad_argument(message: impl Into<String>) -> Self {
        ScriptError::BadArgument {
            message: message.into(),
        }
    }

    pub fn null_reference(message: impl Into<String>) -> Self {
        ScriptError::NullReference {
            message: message.into(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        ScriptError::Argument {
            message: message.into(),
        }
    }

    /// Get the span (start, end) for this error, if it has one
    pub fn span(&self) -> Option<Span> {
        match self {
            ScriptError::UnknownToken { span, .. }
            | ScriptError::Lexer { span, .. }
            | ScriptError::Parsing { span, .. } => Some(Span::from(*span)),
            _ => None,
        }
    }

    /// The assignment denial reason, for IllegalAssignment errors
    pub fn assignment_denial(&self) -> Option<AssignmentDenial> {
        match self {
            ScriptError::IllegalAssignment { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Simple span type: (offset, length) -> (start, end)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl From<SourceSpan> for Span {
    fn from(span: SourceSpan) -> Self {
        Self {
            start: span.offset(),
            end: span.offset() + span.len(),
        }
    }
}

/// Result type for script engine operations
pub type ScriptResult<T> = Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", ""), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("count", "cuont"), 2);
    }

    #[test]
    fn test_find_similar_case_insensitive() {
        let candidates = vec!["Customer".to_string(), "Orders".to_string()];
        assert_eq!(
            find_similar("customr", &candidates, 2),
            Some("Customer".to_string())
        );
        assert_eq!(find_similar("zzz", &candidates, 2), None);
    }

    #[test]
    fn test_unknown_variable_help() {
        let available = vec!["total".to_string(), "count".to_string()];
        assert_eq!(
            unknown_variable_help("totl", &available),
            "did you mean 'total'?"
        );
        assert_eq!(
            unknown_variable_help("x", &[]),
            "no variables are defined in this context"
        );
        assert_eq!(
            unknown_variable_help("unrelated", &available),
            "available variables: total, count"
        );
    }

    #[test]
    fn test_span_only_on_compile_errors() {
        let err = ScriptError::unknown_token("a # b", 2, "#");
        let span = err.span().unwrap();
        assert_eq!((span.start, span.end), (2, 3));
        assert!(ScriptError::DivisionByZero.span().is_none());
    }

    #[test]
    fn test_assignment_denial_messages() {
        let err = ScriptError::illegal_assignment(AssignmentDenial::Property, "obj.Field");
        assert_eq!(err.to_string(), "assignment to property not allowed");
        assert_eq!(err.assignment_denial(), Some(AssignmentDenial::Property));
    }
}
