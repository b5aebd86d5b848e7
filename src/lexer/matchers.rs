//! Base matchers for the tokenizer.

use crate::evaluator::types::TypeTag;

use super::tokenizer::{Carry, MatchState, TokenMatcher};

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '@'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Fixed text such as an operator or a keyword
pub struct Literal {
    text: &'static str,
    /// Keywords must not run into a following identifier character
    word: bool,
}

impl Literal {
    pub fn new(text: &'static str) -> Self {
        Self { text, word: false }
    }

    pub fn keyword(text: &'static str) -> Self {
        Self { text, word: true }
    }
}

impl TokenMatcher for Literal {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        _next: Option<char>,
        _carry: &mut Carry,
    ) -> MatchState {
        if matched == self.text {
            return match ch {
                Some(c) if self.word && is_ident_char(c) => MatchState::Fail,
                _ => MatchState::Success,
            };
        }
        match ch {
            Some(c) if self.text.starts_with(matched) && self.text[matched.len()..].starts_with(c) => {
                MatchState::Valid
            }
            _ => MatchState::Fail,
        }
    }
}

pub struct Whitespace;

impl TokenMatcher for Whitespace {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        _next: Option<char>,
        _carry: &mut Carry,
    ) -> MatchState {
        match ch {
            Some(c) if c.is_whitespace() => MatchState::Valid,
            _ if matched.is_empty() => MatchState::Fail,
            _ => MatchState::Success,
        }
    }
}

/// Letters, digits and `_`, not starting with a digit; `@` may lead
pub struct Identifier;

impl TokenMatcher for Identifier {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        _next: Option<char>,
        _carry: &mut Carry,
    ) -> MatchState {
        match ch {
            Some(c) if matched.is_empty() && is_ident_start(c) => MatchState::Valid,
            Some(c) if !matched.is_empty() && is_ident_char(c) => MatchState::Valid,
            _ if matched.is_empty() || matched == "@" => MatchState::Fail,
            _ => MatchState::Success,
        }
    }
}

/// Decimal literal with an optional fraction and type suffix
/// (`M`, `D`, `F`, `L`, `U`, `UL`, `LU`; any case)
pub struct Number;

const SUFFIXES: &[&str] = &["m", "d", "f", "l", "u", "ul", "lu"];
const FRACTION_SUFFIXES: &[&str] = &["m", "d", "f"];

impl TokenMatcher for Number {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        next: Option<char>,
        _carry: &mut Carry,
    ) -> MatchState {
        if matched.is_empty() {
            return match ch {
                Some(c) if c.is_ascii_digit() => MatchState::Valid,
                _ => MatchState::Fail,
            };
        }

        let split = matched
            .find(|c: char| c.is_ascii_alphabetic())
            .unwrap_or(matched.len());
        let (body, suffix) = matched.split_at(split);
        let has_fraction = body.contains('.');
        let allowed = if has_fraction {
            FRACTION_SUFFIXES
        } else {
            SUFFIXES
        };

        let extends_suffix = |c: char| {
            let candidate = format!("{}{}", suffix, c).to_ascii_lowercase();
            allowed.iter().any(|s| s.starts_with(&candidate))
        };

        match ch {
            Some(c) if suffix.is_empty() && c.is_ascii_digit() => MatchState::Valid,
            Some('.') if suffix.is_empty() && !has_fraction => match next {
                Some(n) if n.is_ascii_digit() => MatchState::Valid,
                _ => MatchState::Success,
            },
            Some(c) if c.is_ascii_alphabetic() && extends_suffix(c) => MatchState::Valid,
            Some(c) if is_ident_char(c) => MatchState::Fail,
            _ => MatchState::Success,
        }
    }
}

/// Text between `quote` characters; backslash escapes the next character
pub struct Quoted {
    quote: char,
}

impl Quoted {
    const ESCAPED: u32 = 1;
    const CLOSED: u32 = 2;

    pub fn new(quote: char) -> Self {
        Self { quote }
    }
}

impl TokenMatcher for Quoted {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        _next: Option<char>,
        carry: &mut Carry,
    ) -> MatchState {
        if matched.is_empty() {
            return match ch {
                Some(c) if c == self.quote => MatchState::Valid,
                _ => MatchState::Fail,
            };
        }
        if carry.0 & Self::CLOSED != 0 {
            return MatchState::Success;
        }
        let Some(c) = ch else {
            return MatchState::Fail;
        };
        if carry.0 & Self::ESCAPED != 0 {
            carry.0 &= !Self::ESCAPED;
        } else if c == '\\' {
            carry.0 |= Self::ESCAPED;
        } else if c == self.quote {
            carry.0 |= Self::CLOSED;
        }
        MatchState::Valid
    }
}

/// Range operator `...` with optional `>` prefix and `<` suffix
pub struct Range;

impl Range {
    fn viable(text: &str) -> bool {
        let body = text.strip_prefix('>').unwrap_or(text);
        let body = body.strip_suffix('<').map_or(body, |b| if b == "..." { b } else { "x" });
        body.is_empty() || "...".starts_with(body)
    }

    fn complete(text: &str) -> bool {
        let body = text.strip_prefix('>').unwrap_or(text);
        body == "..." || body == "...<"
    }
}

impl TokenMatcher for Range {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        _next: Option<char>,
        _carry: &mut Carry,
    ) -> MatchState {
        if let Some(c) = ch {
            let candidate = format!("{}{}", matched, c);
            if Self::viable(&candidate) && !matched.ends_with('<') {
                return MatchState::Valid;
            }
        }
        if Self::complete(matched) {
            MatchState::Success
        } else {
            MatchState::Fail
        }
    }
}

/// Cast prefix `(type)`, optionally nullable as in `(int?)`
pub struct Cast;

impl Cast {
    /// Returns (viable prefix, complete cast)
    fn check(text: &str) -> (bool, bool) {
        let Some(rest) = text.strip_prefix('(') else {
            return (text.is_empty(), false);
        };
        let rest = rest.trim_start();
        let word_len = rest
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(rest.len());
        let (word, after) = rest.split_at(word_len);
        if after.is_empty() {
            let viable = TypeTag::KEYWORDS.iter().any(|k| k.starts_with(word));
            return (viable, false);
        }
        if TypeTag::from_keyword(word).is_none() {
            return (false, false);
        }
        let after = after.strip_prefix('?').unwrap_or(after).trim_start();
        match after {
            "" => (true, false),
            ")" => (true, true),
            _ => (false, false),
        }
    }

    /// The target type of a complete cast token
    pub fn target(text: &str) -> Option<TypeTag> {
        let inner = text.strip_prefix('(')?.strip_suffix(')')?.trim();
        match inner.strip_suffix('?') {
            Some(base) => TypeTag::from_keyword(base.trim()).map(TypeTag::nullable),
            None => TypeTag::from_keyword(inner),
        }
    }
}

impl TokenMatcher for Cast {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        _next: Option<char>,
        _carry: &mut Carry,
    ) -> MatchState {
        let (_, complete) = Self::check(matched);
        if complete {
            return MatchState::Success;
        }
        match ch {
            Some(c) if Self::check(&format!("{}{}", matched, c)).0 => MatchState::Valid,
            _ => MatchState::Fail,
        }
    }
}

/// `new` followed by a (possibly dotted) type name
pub struct Constructor;

impl Constructor {
    /// The type name of a complete constructor token
    pub fn type_name(text: &str) -> &str {
        text.strip_prefix("new").unwrap_or(text).trim()
    }
}

impl TokenMatcher for Constructor {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        next: Option<char>,
        _carry: &mut Carry,
    ) -> MatchState {
        if matched.len() < 3 {
            return match ch {
                Some(c) if "new"[matched.len()..].starts_with(c) && "new".starts_with(matched) => {
                    MatchState::Valid
                }
                _ => MatchState::Fail,
            };
        }
        let rest = &matched[3..];
        let name = rest.trim_start();
        let has_gap = rest.len() > name.len();

        match ch {
            Some(c) if c.is_whitespace() && name.is_empty() => MatchState::Valid,
            _ if !has_gap => MatchState::Fail,
            Some(c) if name.is_empty() => {
                if is_ident_start(c) {
                    MatchState::Valid
                } else {
                    MatchState::Fail
                }
            }
            Some(c) if is_ident_char(c) && !name.ends_with('.') => MatchState::Valid,
            Some(c) if name.ends_with('.') && is_ident_start(c) => MatchState::Valid,
            Some('.') if next.is_some_and(is_ident_start) => MatchState::Valid,
            _ if name.is_empty() || name.ends_with('.') => MatchState::Fail,
            _ => MatchState::Success,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenizer::Tokenizer;

    /// Length of the longest complete match of `matcher` at the start of `input`
    fn longest(matcher: &dyn TokenMatcher, input: &str) -> Option<usize> {
        let chars: Vec<char> = input.chars().collect();
        let mut best = None;
        let mut carry = Carry::default();
        for i in 0..=chars.len() {
            let matched: String = chars[..i].iter().collect();
            match matcher.feed(
                &matched,
                chars.get(i).copied(),
                chars.get(i + 1).copied(),
                &mut carry,
            ) {
                MatchState::Valid => {}
                MatchState::Success => {
                    best = Some(i);
                    break;
                }
                MatchState::Fail => break,
            }
        }
        best
    }

    #[test]
    fn test_keyword_needs_word_boundary() {
        assert_eq!(longest(&Literal::keyword("in"), "in x"), Some(2));
        assert_eq!(longest(&Literal::keyword("in"), "index"), None);
        assert_eq!(longest(&Literal::new("+"), "+x"), Some(1));
    }

    #[test]
    fn test_numbers() {
        assert_eq!(longest(&Number, "123+"), Some(3));
        assert_eq!(longest(&Number, "1.5*2"), Some(3));
        assert_eq!(longest(&Number, "1...5"), Some(1));
        assert_eq!(longest(&Number, "10UL "), Some(4));
        assert_eq!(longest(&Number, "2.5m"), Some(4));
        assert_eq!(longest(&Number, "2.5L"), None);
        assert_eq!(longest(&Number, "12abc"), None);
    }

    #[test]
    fn test_quoted() {
        assert_eq!(longest(&Quoted::new('"'), r#""a\"b" + 1"#), Some(6));
        assert_eq!(longest(&Quoted::new('"'), r#""open"#), None);
        assert_eq!(longest(&Quoted::new('\''), "'x'"), Some(3));
        assert_eq!(longest(&Quoted::new('"'), r#""a\\" + "b""#), Some(5));
        assert_eq!(longest(&Quoted::new('"'), r#""\\\"" x"#), Some(6));
    }

    #[test]
    fn test_long_string_literal() {
        let mut tokenizer = Tokenizer::new();
        tokenizer
            .add(Quoted::new('"'), "string")
            .add(Literal::new("+"), "plus")
            .add(Whitespace, "ws")
            .add(Number, "number");
        let body = "ab\\\"c".repeat(20_000);
        let input = format!("\"{}\" + 1", body);
        let lexed = tokenizer.tokenize(&input).unwrap();
        assert_eq!(lexed[0].tag, Some("string"));
        assert_eq!(lexed[0].text.len(), body.len() + 2);
        assert_eq!(lexed.last().and_then(|l| l.tag), Some("number"));
    }

    #[test]
    fn test_range_forms() {
        assert_eq!(longest(&Range, "...5"), Some(3));
        assert_eq!(longest(&Range, ">...<5"), Some(5));
        assert_eq!(longest(&Range, "...<5"), Some(4));
        assert_eq!(longest(&Range, ">...5"), Some(4));
        assert_eq!(longest(&Range, ".x"), None);
        assert_eq!(longest(&Range, "> 1"), None);
    }

    #[test]
    fn test_casts() {
        assert_eq!(longest(&Cast, "(int)x"), Some(5));
        assert_eq!(longest(&Cast, "( long? )x"), Some(9));
        assert_eq!(longest(&Cast, "(a)"), None);
        assert_eq!(longest(&Cast, "(intx)"), None);
        assert_eq!(Cast::target("( long? )"), Some(TypeTag::Long.nullable()));
        assert_eq!(Cast::target("(string)"), Some(TypeTag::String));
    }

    #[test]
    fn test_constructor() {
        assert_eq!(longest(&Constructor, "new Point(1)"), Some(9));
        assert_eq!(longest(&Constructor, "new  Geo.Point()"), Some(14));
        assert_eq!(longest(&Constructor, "newValue"), None);
        assert_eq!(longest(&Constructor, "new (1)"), None);
        assert_eq!(Constructor::type_name("new  Geo.Point"), "Geo.Point");
    }

    #[test]
    fn test_identifiers() {
        assert_eq!(longest(&Identifier, "_a1 "), Some(3));
        assert_eq!(longest(&Identifier, "@class."), Some(6));
        assert_eq!(longest(&Identifier, "1a"), None);
    }
}
