//! Operator-precedence compiler for a single statement
//!
//! A shunting-yard pass over the tokens of one statement. Operands are built
//! into [`Expr`] nodes as soon as their operator is reduced, so the output is
//! the tree itself rather than a postfix list. Brackets, call arguments and
//! the ternary `:` live on the operator stack as markers.

use crate::errors::{ScriptError, ScriptResult};
use crate::evaluator::typeof_function;
use crate::evaluator::types::TypeTag;
use crate::evaluator::value::TypedValue;
use crate::lexer::matchers::{Cast, Constructor};
use crate::lexer::precedence::{POSTFIX, TERNARY};
use crate::lexer::token::{Action, Associativity, Token, TokenKind};
use crate::lexer::literal_value;

use super::ast::Expr;
use super::MAX_PARSE_DEPTH;

enum Pending {
    Op(Token),
    /// Grouping bracket
    Paren(Token),
    /// Call or indexer bracket; `base` is the operand count below its arguments
    Call { open: Token, base: usize },
    /// A `?` whose `:` has been seen
    TernaryElse(Token),
}

impl Pending {
    fn is_marker(&self) -> bool {
        matches!(self, Pending::Paren(_) | Pending::Call { .. })
    }
}

pub(super) struct Rpn<'s> {
    source: &'s str,
    operands: Vec<Expr>,
    pending: Vec<Pending>,
    expect_operand: bool,
    brackets: usize,
    seen: bool,
}

impl<'s> Rpn<'s> {
    pub(super) fn new(source: &'s str) -> Self {
        Self {
            source,
            operands: Vec::new(),
            pending: Vec::new(),
            expect_operand: true,
            brackets: 0,
            seen: false,
        }
    }

    /// Compile `tokens` as one expression; None when there are no tokens
    pub(super) fn compile(mut self, tokens: &[Token]) -> ScriptResult<Option<Expr>> {
        for token in tokens {
            if token.kind == TokenKind::Whitespace {
                continue;
            }
            self.seen = true;
            let token = self.select(token);
            self.push(token)?;
        }
        self.finish(tokens.last())
    }

    /// The interpretation of `token` that fits the current position
    fn select(&self, token: &Token) -> Token {
        let fits = |t: &Token| {
            if self.expect_operand {
                t.kind.starts_operand()
            } else {
                t.kind.follows_operand()
            }
        };
        token
            .interpretations()
            .find(|t| fits(t))
            .unwrap_or(token)
            .clone()
    }

    fn error(&self, token: &Token, message: impl Into<String>, help: impl Into<String>) -> ScriptError {
        ScriptError::parsing(self.source, (token.offset, token.len()), message, help)
    }

    fn push(&mut self, token: Token) -> ScriptResult<()> {
        match token.kind {
            TokenKind::Term => {
                if !self.expect_operand {
                    return Err(self.error(
                        &token,
                        format!("unexpected '{}'", token.text),
                        "an operator is missing between two operands",
                    ));
                }
                let term = self.term(&token)?;
                self.operands.push(term);
                self.expect_operand = false;
            }
            TokenKind::UnaryOperator if self.expect_operand => {
                self.pending.push(Pending::Op(token));
            }
            TokenKind::UnaryOperator if token.action == Action::Cast => {
                // `typeof(int)`: a cast token after an operand calls it with a type
                let ty = self.cast_target(&token)?;
                self.reduce_while(|prec, _| prec >= POSTFIX)?;
                let callee = self.pop_operand(&token)?;
                self.operands.push(Expr::Call {
                    callee: Box::new(callee),
                    args: vec![Expr::Value(TypedValue::type_value(ty))],
                });
            }
            TokenKind::Operator => {
                self.require_operand_before(&token)?;
                let prec = token.precedence;
                let left = token.associativity == Associativity::Left;
                self.reduce_while(|top, _| top > prec || (left && top == prec))?;
                self.pending.push(Pending::Op(token));
                self.expect_operand = true;
            }
            TokenKind::TernaryOperator if token.action == Action::Ternary => {
                self.require_operand_before(&token)?;
                self.reduce_while(|top, _| top > TERNARY)?;
                self.pending.push(Pending::Op(token));
                self.expect_operand = true;
            }
            TokenKind::TernaryOperator => {
                self.require_operand_before(&token)?;
                self.reduce_while(|_, top| !matches!(top, Pending::Op(t) if t.action == Action::Ternary))?;
                match self.pending.pop() {
                    Some(Pending::Op(question)) if question.action == Action::Ternary => {
                        self.pending.push(Pending::TernaryElse(question));
                    }
                    other => {
                        if let Some(other) = other {
                            self.pending.push(other);
                        }
                        return Err(self.error(&token, "':' without a matching '?'", "use 'cond ? a : b'"));
                    }
                }
                self.expect_operand = true;
            }
            TokenKind::LeftParen => {
                if !self.expect_operand {
                    return Err(self.error(&token, format!("unexpected '{}'", token.text), "check brackets"));
                }
                self.open_bracket(&token)?;
                self.pending.push(Pending::Paren(token));
            }
            TokenKind::FunctionCall => {
                self.require_operand_before(&token)?;
                self.open_bracket(&token)?;
                self.reduce_while(|prec, _| prec >= POSTFIX)?;
                let base = self.operands.len();
                self.pending.push(Pending::Call { open: token, base });
                self.expect_operand = true;
            }
            TokenKind::ArgumentSeparator => {
                self.require_operand_before(&token)?;
                self.reduce_while(|_, top| !top.is_marker())?;
                if !matches!(self.pending.last(), Some(Pending::Call { .. })) {
                    return Err(self.error(
                        &token,
                        "',' outside of an argument list",
                        "separate statements with ';'",
                    ));
                }
                self.expect_operand = true;
            }
            TokenKind::RightParen => self.close_bracket(token)?,
            _ => {
                return Err(self.error(
                    &token,
                    format!("unexpected '{}' in expression", token.text),
                    "statements must be separated by ';'",
                ))
            }
        }
        Ok(())
    }

    fn require_operand_before(&self, token: &Token) -> ScriptResult<()> {
        if self.expect_operand {
            Err(self.error(
                token,
                format!("missing operand before '{}'", token.text),
                "check the expression for a dangling operator",
            ))
        } else {
            Ok(())
        }
    }

    fn open_bracket(&mut self, token: &Token) -> ScriptResult<()> {
        self.brackets += 1;
        if self.brackets > MAX_PARSE_DEPTH {
            return Err(self.error(
                token,
                format!(
                    "expression nesting exceeds maximum depth of {}",
                    MAX_PARSE_DEPTH
                ),
                "simplify the expression",
            ));
        }
        Ok(())
    }

    fn close_bracket(&mut self, close: Token) -> ScriptResult<()> {
        let empty = self.expect_operand;
        if !empty {
            self.reduce_while(|_, top| !top.is_marker())?;
        }
        let marker = match self.pending.pop() {
            Some(marker) if marker.is_marker() => marker,
            other => {
                if let Some(other) = other {
                    self.pending.push(other);
                }
                return Err(ScriptError::lexer(
                    self.source,
                    (close.offset, close.len()),
                    format!("unmatched '{}'", close.text),
                    "check brackets",
                ));
            }
        };
        self.brackets = self.brackets.saturating_sub(1);

        match marker {
            Pending::Paren(open) => {
                check_pair(self.source, &open, &close)?;
                if empty {
                    return Err(self.error(&close, "empty brackets", "put an expression inside the brackets"));
                }
            }
            Pending::Call { open, base } => {
                check_pair(self.source, &open, &close)?;
                if empty && self.operands.len() != base {
                    return Err(self.error(&close, "missing argument", "remove the trailing ','"));
                }
                let args = self.operands.split_off(base);
                let callee = self.pop_operand(&open)?;
                let node = match (open.action, callee) {
                    (Action::Index, _) if args.is_empty() => {
                        return Err(self.error(&close, "indexer needs at least one argument", "use a[i]"));
                    }
                    (Action::Index, target) => Expr::Index {
                        target: Box::new(target),
                        args,
                    },
                    (_, Expr::Constructor { type_name, args: none }) if none.is_empty() => {
                        Expr::Constructor { type_name, args }
                    }
                    (_, callee) => Expr::Call {
                        callee: Box::new(callee),
                        args,
                    },
                };
                self.operands.push(node);
            }
            _ => {}
        }
        self.expect_operand = false;
        Ok(())
    }

    /// Reduce operators from the top of the stack while `keep_going(precedence, entry)`
    /// holds. Markers always stop the reduction.
    fn reduce_while(&mut self, keep_going: impl Fn(u8, &Pending) -> bool) -> ScriptResult<()> {
        while let Some(top) = self.pending.last() {
            if top.is_marker() {
                break;
            }
            let prec = match top {
                Pending::Op(t) | Pending::TernaryElse(t) => t.precedence,
                _ => 0,
            };
            if !keep_going(prec, top) {
                break;
            }
            if let Some(entry) = self.pending.pop() {
                self.reduce(entry)?;
            }
        }
        Ok(())
    }

    fn pop_operand(&mut self, token: &Token) -> ScriptResult<Expr> {
        self.operands.pop().ok_or_else(|| {
            self.error(
                token,
                format!("missing operand for '{}'", token.text),
                "check the expression for a dangling operator",
            )
        })
    }

    fn reduce(&mut self, entry: Pending) -> ScriptResult<()> {
        let node = match entry {
            Pending::TernaryElse(question) => {
                let if_false = self.pop_operand(&question)?;
                let if_true = self.pop_operand(&question)?;
                let cond = self.pop_operand(&question)?;
                Expr::Conditional {
                    cond: Box::new(cond),
                    if_true: Box::new(if_true),
                    if_false: Box::new(if_false),
                }
            }
            Pending::Op(token) if token.action == Action::Ternary => {
                return Err(self.error(&token, "missing ':' for '?'", "use 'cond ? a : b'"));
            }
            Pending::Op(token) if token.kind == TokenKind::UnaryOperator => {
                let operand = Box::new(self.pop_operand(&token)?);
                match token.action {
                    Action::Minus => Expr::UnaryMinus(operand),
                    Action::Not => Expr::Negation(operand),
                    Action::Complement => Expr::BitwiseComplement(operand),
                    Action::Cast => Expr::Cast {
                        ty: self.cast_target(&token)?,
                        operand,
                    },
                    _ => return Err(self.error(&token, "unsupported unary operator", "")),
                }
            }
            Pending::Op(token) => {
                let right = self.pop_operand(&token)?;
                let left = self.pop_operand(&token)?;
                self.binary(&token, left, right)?
            }
            Pending::Paren(_) | Pending::Call { .. } => return Ok(()),
        };
        self.operands.push(node);
        Ok(())
    }

    fn binary(&self, token: &Token, left: Expr, right: Expr) -> ScriptResult<Expr> {
        let (l, r) = (Box::new(left), Box::new(right));
        let node = match token.action {
            Action::Binary(op) => Expr::Binary { op, left: l, right: r },
            Action::Assign => Expr::Assignment { target: l, value: r },
            Action::Dot => match *r {
                Expr::Variable(name) => Expr::Field { target: l, name },
                _ => {
                    return Err(self.error(token, "expected a member name after '.'", "use 'target.Member'"));
                }
            },
            Action::AndAlso => Expr::AndAlso(l, r),
            Action::OrElse => Expr::OrElse(l, r),
            Action::Coalesce => Expr::Coalesce { value: l, fallback: r },
            Action::DefaultValue => Expr::DefaultValue { value: l, fallback: r },
            Action::ValueOrNull => Expr::ValueOrNull { cond: l, value: r },
            Action::As => Expr::As { value: l, ty: r },
            Action::Is => Expr::Is { value: l, ty: r },
            Action::In => match *l {
                Expr::Variable(iterator) => Expr::In { iterator, collection: r },
                _ => {
                    return Err(self.error(token, "'in' needs a variable name on its left", "use 'x in items'"));
                }
            },
            Action::Range => Expr::Range {
                from: l,
                to: r,
                exclude_from: token.text.starts_with('>'),
                exclude_to: token.text.ends_with('<'),
            },
            _ => {
                return Err(self.error(token, format!("'{}' is not a binary operator", token.text), ""));
            }
        };
        Ok(node)
    }

    fn cast_target(&self, token: &Token) -> ScriptResult<TypeTag> {
        Cast::target(&token.text)
            .ok_or_else(|| self.error(token, format!("unknown cast '{}'", token.text), "cast to a built-in type"))
    }

    fn term(&self, token: &Token) -> ScriptResult<Expr> {
        let node = match token.action {
            Action::Number | Action::Char | Action::String => {
                let value = literal_value(token).map_err(|message| {
                    ScriptError::lexer(self.source, (token.offset, token.len()), message, "fix the literal")
                })?;
                Expr::Value(value)
            }
            Action::Identifier => {
                let name = token.text.strip_prefix('@').unwrap_or(&token.text);
                Expr::Variable(name.to_string())
            }
            Action::True => Expr::Value(TypedValue::from(true)),
            Action::False => Expr::Value(TypedValue::from(false)),
            Action::Null => Expr::null(),
            Action::TypeName => {
                let ty = TypeTag::from_keyword(&token.text)
                    .ok_or_else(|| self.error(token, format!("unknown type '{}'", token.text), ""))?;
                Expr::Value(TypedValue::type_value(ty))
            }
            Action::Typeof => Expr::Value(typeof_function()),
            Action::Constructor => Expr::Constructor {
                type_name: Constructor::type_name(&token.text).to_string(),
                args: Vec::new(),
            },
            _ => return Err(self.error(token, format!("unexpected '{}'", token.text), "")),
        };
        Ok(node)
    }

    fn finish(mut self, last: Option<&Token>) -> ScriptResult<Option<Expr>> {
        if !self.seen {
            return Ok(None);
        }
        let end = last.map_or(self.source.len(), Token::end);
        let at_end = |source: &str, message: &str, help: &str| {
            ScriptError::parsing(source, (end, 0), message, help)
        };
        if self.expect_operand {
            return Err(at_end(self.source, "unexpected end of expression", "an operand is missing"));
        }
        while let Some(entry) = self.pending.pop() {
            match entry {
                Pending::Paren(open) | Pending::Call { open, .. } => {
                    return Err(ScriptError::lexer(
                        self.source,
                        (open.offset, open.len()),
                        format!("unclosed '{}'", open.text),
                        "check brackets",
                    ));
                }
                entry => self.reduce(entry)?,
            }
        }
        match (self.operands.pop(), self.operands.is_empty()) {
            (Some(root), true) => Ok(Some(root)),
            _ => Err(at_end(self.source, "expression has unused operands", "an operator is missing")),
        }
    }
}

fn check_pair(source: &str, open: &Token, close: &Token) -> ScriptResult<()> {
    let expected = if open.text.starts_with('[') { "]" } else { ")" };
    if close.text == expected {
        Ok(())
    } else {
        Err(ScriptError::lexer(
            source,
            (close.offset, close.len()),
            format!("'{}' closed by '{}'", open.text, close.text),
            format!("expected '{}'", expected),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::ast::BinaryOp;

    fn compile(source: &str) -> ScriptResult<Option<Expr>> {
        let tokens = Lexer::new().tokenize(source)?;
        Rpn::new(source).compile(&tokens)
    }

    fn tree(source: &str) -> Expr {
        compile(source).unwrap().unwrap()
    }

    #[test]
    fn test_precedence() {
        match tree("5-4*2") {
            Expr::Binary { op: BinaryOp::Sub, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Mul, .. }))
            }
            other => panic!("unexpected tree {:?}", other),
        }
        match tree("5*(4/2)") {
            Expr::Binary { op: BinaryOp::Mul, right, .. } => {
                assert!(matches!(*right, Expr::Binary { op: BinaryOp::Div, .. }))
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_assignment_is_right_associative() {
        match tree("a = b = 1") {
            Expr::Assignment { target, value } => {
                assert!(matches!(*target, Expr::Variable(ref n) if n == "a"));
                assert!(matches!(*value, Expr::Assignment { .. }));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_unary_minus_alternate() {
        assert!(matches!(tree("-x"), Expr::UnaryMinus(_)));
        match tree("a - -b") {
            Expr::Binary { op: BinaryOp::Sub, right, .. } => {
                assert!(matches!(*right, Expr::UnaryMinus(_)))
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_calls_and_indexers() {
        match tree("f(1, g(2))[0]") {
            Expr::Index { target, args } => {
                assert_eq!(args.len(), 1);
                match *target {
                    Expr::Call { args, .. } => assert_eq!(args.len(), 2),
                    other => panic!("unexpected callee {:?}", other),
                }
            }
            other => panic!("unexpected tree {:?}", other),
        }
        assert!(matches!(tree("f()"), Expr::Call { args, .. } if args.is_empty()));
        assert!(matches!(tree("a.b.c(1)"), Expr::Call { .. }));
        assert!(matches!(tree("m[1, 2]"), Expr::Index { args, .. } if args.len() == 2));
    }

    #[test]
    fn test_square_brackets_group_in_operand_position() {
        assert!(matches!(tree("[1...9]"), Expr::Range { .. }));
        assert!(matches!(tree("2 * [3 + 4]"), Expr::Binary { op: BinaryOp::Mul, .. }));
    }

    #[test]
    fn test_ternary_nests_right() {
        match tree("a ? b : c ? d : e") {
            Expr::Conditional { if_false, .. } => {
                assert!(matches!(*if_false, Expr::Conditional { .. }))
            }
            other => panic!("unexpected tree {:?}", other),
        }
        assert!(compile("a ? b").is_err());
        assert!(compile("a : b").is_err());
    }

    #[test]
    fn test_range_flags() {
        match tree("1 >...< 5") {
            Expr::Range { exclude_from, exclude_to, .. } => {
                assert!(exclude_from);
                assert!(exclude_to);
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_constructor_absorbs_arguments() {
        match tree("new Geo.Point(1, 2)") {
            Expr::Constructor { type_name, args } => {
                assert_eq!(type_name, "Geo.Point");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_casts_and_typeof() {
        assert!(matches!(tree("(long)x + 1"), Expr::Binary { .. }));
        assert!(matches!(tree("(int?)x"), Expr::Cast { ty, .. } if ty == TypeTag::Int.nullable()));
        assert!(matches!(tree("typeof(int)"), Expr::Call { args, .. } if args.len() == 1));
    }

    #[test]
    fn test_keywords_as_identifiers() {
        match tree("in.as") {
            Expr::Field { target, name } => {
                assert!(matches!(*target, Expr::Variable(ref n) if n == "in"));
                assert_eq!(name, "as");
            }
            other => panic!("unexpected tree {:?}", other),
        }
        assert!(matches!(tree("x in items"), Expr::In { .. }));
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(compile("(1 + 2"), Err(ScriptError::Lexer { .. })));
        assert!(matches!(compile("1 + 2)"), Err(ScriptError::Lexer { .. })));
        assert!(matches!(compile("f(1]"), Err(ScriptError::Lexer { .. })));
        assert!(matches!(compile("1 +"), Err(ScriptError::Parsing { .. })));
        assert!(matches!(compile("1 2"), Err(ScriptError::Parsing { .. })));
        assert!(matches!(compile("(1, 2)"), Err(ScriptError::Parsing { .. })));
        assert!(matches!(compile("a.1"), Err(ScriptError::Parsing { .. })));
        assert!(compile("").unwrap().is_none());
    }

    #[test]
    fn test_bracket_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_PARSE_DEPTH + 1), ")".repeat(MAX_PARSE_DEPTH + 1));
        assert!(compile(&deep).is_err());
        let shallow = format!("{}1{}", "(".repeat(8), ")".repeat(8));
        assert!(compile(&shallow).is_ok());
    }
}
