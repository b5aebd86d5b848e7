//! Parser for the expression and scripting syntax
//!
//! Statements are recognized by their leading keyword and split out of the
//! token stream; the expression between them goes through the
//! operator-precedence compiler in [`rpn`]. Condition and parameter clauses
//! are found by scanning for the matching bracket, so the statement layer
//! never recurses into expressions.

pub mod ast;
mod rpn;

use std::sync::Arc;

use tracing::debug;

use crate::cache::ParseCache;
use crate::errors::{ScriptError, ScriptResult};
use crate::lexer::token::{Action, Keyword, Token, TokenKind};
use crate::lexer::Lexer;
use ast::{Expr, FunctionDef};
use rpn::Rpn;

/// Maximum nesting of blocks and brackets before the parser bails out
const MAX_PARSE_DEPTH: usize = 128;

/// The result of compiling a source text
#[derive(Debug)]
pub struct CompiledExpression {
    pub source: Arc<str>,
    pub root: Expr,
}

impl CompiledExpression {
    pub fn new(source: impl Into<Arc<str>>, root: Expr) -> Self {
        Self {
            source: source.into(),
            root,
        }
    }
}

/// Parser for source text, with an injected parse cache
pub struct Parser {
    lexer: Lexer,
    cache: Arc<ParseCache>,
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser {
    /// Parser for the default syntax with a default-sized cache
    pub fn new() -> Self {
        Self::with_cache(Arc::new(ParseCache::default()))
    }

    pub fn with_cache(cache: Arc<ParseCache>) -> Self {
        Self::with_lexer(Lexer::new(), cache)
    }

    /// Parser for a custom syntax
    pub fn with_lexer(lexer: Lexer, cache: Arc<ParseCache>) -> Self {
        Self { lexer, cache }
    }

    pub fn cache(&self) -> &Arc<ParseCache> {
        &self.cache
    }

    /// Compile `source`, reusing the cached tree for identical text
    pub fn parse(&self, source: &str) -> ScriptResult<Arc<CompiledExpression>> {
        self.cache
            .get_or_try_insert_with(source, || self.compile(source))
    }

    /// Compile `source` without consulting the cache
    pub fn compile(&self, source: &str) -> ScriptResult<CompiledExpression> {
        let tokens: Vec<Token> = self
            .lexer
            .tokenize(source)?
            .into_iter()
            .filter(|t| t.kind != TokenKind::Whitespace)
            .collect();
        let token_count = tokens.len();

        let mut statements = StatementCompiler::new(source, tokens);
        let root = statements.compile_script()?;
        debug!(
            tokens = token_count,
            statements = root.statement_count(),
            "compiled expression"
        );
        Ok(CompiledExpression::new(source, root))
    }
}

/// Splits a token stream into statements and compiles each one
struct StatementCompiler<'s> {
    source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl<'s> StatementCompiler<'s> {
    fn new(source: &'s str, tokens: Vec<Token>) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            depth: 0,
        }
    }

    fn compile_script(&mut self) -> ScriptResult<Expr> {
        let statements = self.compile_statements(true)?;
        if let Some(token) = self.current() {
            return Err(self.parsing_error(token, format!("unexpected '{}'", token.text), "remove the extra '}'"));
        }
        Ok(block(statements, false))
    }

    /// Compile statements until a `}` or the end of input; with `multiple`
    /// unset, stop after one statement (an `else` still attaches to it)
    fn compile_statements(&mut self, multiple: bool) -> ScriptResult<Vec<Expr>> {
        let mut statements: Vec<Expr> = Vec::new();
        let mut pending_if: Option<usize> = None;

        while let Some(token) = self.current() {
            let mut opened_if = false;
            match token.kind {
                TokenKind::CloseBrace => break,
                TokenKind::StatementSeparator => {
                    self.advance();
                    pending_if = None;
                    if !multiple {
                        break;
                    }
                    continue;
                }
                TokenKind::OpenBrace => {
                    let body = self.compile_body()?;
                    statements.push(body);
                }
                TokenKind::Keyword(Keyword::If) => {
                    self.advance();
                    let cond = self.compile_bracketed("if")?;
                    let then_branch = self.compile_body()?;
                    statements.push(Expr::If {
                        cond: Box::new(cond),
                        then_branch: Box::new(then_branch),
                        else_branch: None,
                    });
                    pending_if = Some(statements.len() - 1);
                    opened_if = true;
                }
                TokenKind::Keyword(Keyword::Else) => {
                    let else_token = token.clone();
                    self.advance();
                    let target = pending_if.take().and_then(|i| statements.get_mut(i));
                    let Some(Expr::If { else_branch, .. }) = target else {
                        return Err(self.parsing_error(
                            &else_token,
                            "'else' without a matching 'if'",
                            "an 'else' must directly follow the body of an 'if'",
                        ));
                    };
                    let body = self.compile_body()?;
                    *else_branch = Some(Box::new(body));
                }
                TokenKind::Keyword(Keyword::While) => {
                    self.advance();
                    let cond = self.compile_bracketed("while")?;
                    let body = self.compile_body()?;
                    statements.push(Expr::While {
                        cond: Box::new(cond),
                        body: Box::new(body),
                    });
                }
                TokenKind::Keyword(Keyword::ForEach) => {
                    let keyword = token.clone();
                    self.advance();
                    let header = self.compile_bracketed("foreach")?;
                    let Expr::In {
                        iterator,
                        collection,
                    } = header
                    else {
                        return Err(self.parsing_error(
                            &keyword,
                            "foreach syntax error",
                            "use 'foreach (item in collection)'",
                        ));
                    };
                    let body = self.compile_body()?;
                    statements.push(Expr::ForEach {
                        iterator,
                        collection,
                        body: Box::new(body),
                    });
                }
                TokenKind::Keyword(Keyword::Return) => {
                    self.advance();
                    let value = self.compile_expression()?;
                    statements.push(Expr::Return(value.map(Box::new)));
                }
                TokenKind::Keyword(Keyword::Break) => {
                    self.advance();
                    if self.check(TokenKind::StatementSeparator) {
                        self.advance();
                    }
                    statements.push(Expr::Break);
                }
                TokenKind::Keyword(Keyword::Function) => {
                    self.advance();
                    let def = self.compile_function()?;
                    statements.push(Expr::FunctionDefinition(Arc::new(def)));
                }
                _ => {
                    if let Some(expr) = self.compile_expression()? {
                        statements.push(expr);
                    }
                }
            }

            if !opened_if {
                pending_if = None;
            }
            if !multiple && !(pending_if.is_some() && self.check(TokenKind::Keyword(Keyword::Else))) {
                break;
            }
        }
        Ok(statements)
    }

    /// A braced block, or a single statement
    fn compile_body(&mut self) -> ScriptResult<Expr> {
        let Some(open) = self.current().cloned() else {
            return Err(ScriptError::parsing(
                self.source,
                (self.source.len(), 0),
                "expected a statement",
                "add a statement or a '{ }' block",
            ));
        };
        self.depth += 1;
        if self.depth > MAX_PARSE_DEPTH {
            self.depth -= 1;
            return Err(self.parsing_error(
                &open,
                format!("statement nesting exceeds maximum depth of {}", MAX_PARSE_DEPTH),
                "simplify the script",
            ));
        }

        let result = if open.kind == TokenKind::OpenBrace {
            self.advance();
            let statements = self.compile_statements(true)?;
            if !self.check(TokenKind::CloseBrace) {
                self.depth -= 1;
                return Err(ScriptError::lexer(
                    self.source,
                    (open.offset, open.len()),
                    "unterminated block",
                    "add the closing '}'",
                ));
            }
            self.advance();
            block(statements, true)
        } else {
            block(self.compile_statements(false)?, false)
        };
        self.depth -= 1;
        Ok(result)
    }

    /// Compile the expression up to the next `;` (consumed), `}` or `else`
    fn compile_expression(&mut self) -> ScriptResult<Option<Expr>> {
        let start = self.pos;
        while let Some(token) = self.current() {
            if matches!(
                token.kind,
                TokenKind::StatementSeparator
                    | TokenKind::CloseBrace
                    | TokenKind::Keyword(Keyword::Else)
            ) {
                break;
            }
            self.advance();
        }
        let end = self.pos;
        if self.check(TokenKind::StatementSeparator) {
            self.advance();
        }
        Rpn::new(self.source).compile(&self.tokens[start..end])
    }

    /// Compile `( ... )` after `keyword`, scanning for the matching bracket
    fn compile_bracketed(&mut self, keyword: &str) -> ScriptResult<Expr> {
        let open = self.expect_open_paren(keyword)?;
        let close = self.find_matching(self.pos).ok_or_else(|| {
            ScriptError::lexer(
                self.source,
                (open.offset, open.len()),
                format!("unterminated {}() expression", keyword),
                "add the closing ')'",
            )
        })?;
        let inner = Rpn::new(self.source).compile(&self.tokens[self.pos..close])?;
        self.pos = close + 1;
        inner.ok_or_else(|| {
            self.parsing_error(
                &open,
                format!("empty {}() expression", keyword),
                "put an expression inside the brackets",
            )
        })
    }

    /// `name(param, ...) body` after the `function` keyword
    fn compile_function(&mut self) -> ScriptResult<FunctionDef> {
        let name = self.expect_identifier("function name")?;
        let open = self.expect_open_paren("function")?;
        let close = self.find_matching(self.pos).ok_or_else(|| {
            ScriptError::lexer(
                self.source,
                (open.offset, open.len()),
                "unterminated function() parameter list",
                "add the closing ')'",
            )
        })?;

        let mut params = Vec::new();
        while self.pos < close {
            params.push(self.expect_identifier("parameter name")?);
            if self.pos < close {
                let Some(separator) = self.current() else {
                    break;
                };
                if separator.kind != TokenKind::ArgumentSeparator {
                    return Err(self.parsing_error(
                        separator,
                        "function parameters must be names separated by ','",
                        "use 'function name(a, b) { ... }'",
                    ));
                }
                self.advance();
                if self.pos == close {
                    return Err(self.parsing_error(
                        &self.tokens[close],
                        "missing parameter name after ','",
                        "remove the trailing ','",
                    ));
                }
            }
        }
        self.pos = close + 1;

        let body = self.compile_body()?;
        Ok(FunctionDef { name, params, body })
    }

    fn expect_open_paren(&mut self, keyword: &str) -> ScriptResult<Token> {
        match self.current() {
            Some(token) if token.text == "(" => {
                let token = token.clone();
                self.advance();
                Ok(token)
            }
            Some(token) => Err(self.parsing_error(
                token,
                format!("Expected ( after '{}'", keyword),
                format!("use '{} ( ... )'", keyword),
            )),
            None => Err(ScriptError::parsing(
                self.source,
                (self.source.len(), 0),
                format!("Expected ( after '{}'", keyword),
                format!("use '{} ( ... )'", keyword),
            )),
        }
    }

    fn expect_identifier(&mut self, what: &str) -> ScriptResult<String> {
        let name = self.current().and_then(|token| {
            token
                .interpretations()
                .find(|t| t.action == Action::Identifier)
                .map(|t| t.text.trim_start_matches('@').to_string())
        });
        match name {
            Some(name) => {
                self.advance();
                Ok(name)
            }
            None => {
                let (offset, len) = self.current().map_or((self.source.len(), 0), |t| (t.offset, t.len()));
                Err(ScriptError::parsing(
                    self.source,
                    (offset, len),
                    format!("expected a {}", what),
                    "names start with a letter or '_'",
                ))
            }
        }
    }

    /// Index of the bracket closing the one opened just before `from`
    fn find_matching(&self, from: usize) -> Option<usize> {
        let mut depth = 1usize;
        for (index, token) in self.tokens.iter().enumerate().skip(from) {
            match token.kind {
                TokenKind::LeftParen | TokenKind::FunctionCall => depth += 1,
                TokenKind::RightParen => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(index);
                    }
                }
                _ => {}
            }
        }
        None
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.current().is_some_and(|t| t.kind == kind)
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
    }

    fn parsing_error(&self, token: &Token, message: impl Into<String>, help: impl Into<String>) -> ScriptError {
        ScriptError::parsing(self.source, (token.offset, token.len()), message, help)
    }
}

/// Collapse compiled statements into one node
fn block(mut statements: Vec<Expr>, braced: bool) -> Expr {
    match statements.len() {
        0 if braced => Expr::Sequence(Vec::new()),
        0 => Expr::null(),
        1 => statements.remove(0),
        _ => Expr::Sequence(statements),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::BinaryOp;

    fn parse(source: &str) -> ScriptResult<Expr> {
        Parser::new().compile(source).map(|c| c.root)
    }

    fn tree(source: &str) -> Expr {
        parse(source).unwrap()
    }

    #[test]
    fn test_empty_source_is_null() {
        assert!(matches!(tree(""), Expr::Value(v) if v.is_null()));
        assert!(matches!(tree("  ;  "), Expr::Value(v) if v.is_null()));
    }

    #[test]
    fn test_single_expression() {
        assert!(matches!(tree("1 + 2"), Expr::Binary { op: BinaryOp::Add, .. }));
        assert!(matches!(tree("1 + 2;"), Expr::Binary { .. }));
    }

    #[test]
    fn test_sequence() {
        match tree("a = 1; b = 2; a + b") {
            Expr::Sequence(items) => assert_eq!(items.len(), 3),
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_if_else() {
        match tree("if (a) b = 1; else b = 2;") {
            Expr::If { else_branch, .. } => assert!(else_branch.is_some()),
            other => panic!("unexpected tree {:?}", other),
        }
        match tree("if (a) { b = 1; } else { b = 2; } c") {
            Expr::Sequence(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], Expr::If { else_branch: Some(_), .. }));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_dangling_else_binds_to_nearest_if() {
        match tree("if (a) if (b) x = 1; else x = 2;") {
            Expr::If {
                then_branch,
                else_branch,
                ..
            } => {
                assert!(else_branch.is_none());
                assert!(matches!(*then_branch, Expr::If { else_branch: Some(_), .. }));
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_else_if_chain() {
        match tree("if (a) x = 1; else if (b) x = 2; else x = 3;") {
            Expr::If { else_branch: Some(inner), .. } => {
                assert!(matches!(*inner, Expr::If { else_branch: Some(_), .. }))
            }
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_else_without_if() {
        assert!(matches!(parse("x = 1; else x = 2;"), Err(ScriptError::Parsing { .. })));
        assert!(matches!(parse("if (a) x = 1; y = 2; else x = 2;"), Err(ScriptError::Parsing { .. })));
    }

    #[test]
    fn test_foreach() {
        match tree("foreach (x in [1...9]) { print(x); if (x >= 5) break; }") {
            Expr::ForEach {
                iterator,
                collection,
                body,
            } => {
                assert_eq!(iterator, "x");
                assert!(matches!(*collection, Expr::Range { .. }));
                assert!(matches!(*body, Expr::Sequence(ref items) if items.len() == 2));
            }
            other => panic!("unexpected tree {:?}", other),
        }
        assert!(matches!(parse("foreach (x) y;"), Err(ScriptError::Parsing { .. })));
        assert!(matches!(parse("foreach x in y"), Err(ScriptError::Parsing { .. })));
    }

    #[test]
    fn test_while() {
        match tree("x=1; while (x<10) { print(x); x=x+1; }") {
            Expr::Sequence(items) => assert!(matches!(&items[1], Expr::While { .. })),
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_function_definition() {
        match tree("function add(a, b) { return a + b; }") {
            Expr::FunctionDefinition(def) => {
                assert_eq!(def.name, "add");
                assert_eq!(def.params, vec!["a".to_string(), "b".to_string()]);
                assert!(matches!(def.body, Expr::Return(Some(_))));
            }
            other => panic!("unexpected tree {:?}", other),
        }
        assert!(matches!(tree("function f() { }"), Expr::FunctionDefinition(def) if def.params.is_empty()));
        assert!(parse("function f(1) { }").is_err());
        assert!(parse("function f(a,) { }").is_err());
    }

    #[test]
    fn test_return_and_break() {
        assert!(matches!(tree("return;"), Expr::Return(None)));
        assert!(matches!(tree("return 1"), Expr::Return(Some(_))));
        assert!(matches!(tree("break"), Expr::Break));
    }

    #[test]
    fn test_empty_braced_block() {
        match tree("while (x) { }") {
            Expr::While { body, .. } => assert!(matches!(*body, Expr::Sequence(ref v) if v.is_empty())),
            other => panic!("unexpected tree {:?}", other),
        }
    }

    #[test]
    fn test_structural_errors() {
        assert!(matches!(parse("if (a { }"), Err(ScriptError::Lexer { .. })));
        assert!(matches!(parse("while (a) { x = 1;"), Err(ScriptError::Lexer { .. })));
        assert!(matches!(parse("if a"), Err(ScriptError::Parsing { .. })));
        assert!(matches!(parse("x }"), Err(ScriptError::Parsing { .. })));
        assert!(matches!(parse("if ()"), Err(ScriptError::Parsing { .. })));
    }

    #[test]
    fn test_block_depth_limit() {
        let deep = format!("{}1{}", "{".repeat(MAX_PARSE_DEPTH + 1), "}".repeat(MAX_PARSE_DEPTH + 1));
        assert!(parse(&deep).is_err());
        assert!(parse("{{{ 1 }}}").is_ok());
    }

    #[test]
    fn test_parse_uses_cache() {
        let parser = Parser::with_cache(Arc::new(ParseCache::new(10)));
        let first = parser.parse("1 + 2").unwrap();
        let second = parser.parse("1 + 2").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(parser.cache().len(), 1);
    }
}
