//! Competing-matcher tokenizer
//!
//! Every registered [`TokenMatcher`] is fed the same characters from the
//! current start position. A matcher answers [`MatchState::Valid`] while the
//! text seen so far can still grow into one of its tokens,
//! [`MatchState::Success`] when the text so far is a complete token that the
//! next character does not extend, and [`MatchState::Fail`] otherwise. The scan
//! continues while any matcher is still valid and emits the longest success.
//! All matchers that succeeded on that exact span are reported, in
//! registration order; the first is the token's primary interpretation and the
//! rest are its alternates.

use crate::errors::{ScriptError, ScriptResult};

/// Answer of a matcher to one more character
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchState {
    /// `matched + ch` is a viable prefix
    Valid,
    /// `matched` is a complete token and `ch` does not extend it
    Success,
    Fail,
}

/// Scratch word a matcher keeps across the characters of one token.
///
/// The tokenizer owns one per matcher and clears it at every token start, so
/// a shared tokenizer can still be used from many threads.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Carry(pub u32);

/// Recognizes one kind of token.
///
/// Matchers hold no state of their own: each call receives the text matched
/// so far, the next character (None at end of input), the character after it
/// and the matcher's [`Carry`] for the current token.
pub trait TokenMatcher: Send + Sync {
    fn feed(
        &self,
        matched: &str,
        ch: Option<char>,
        next: Option<char>,
        carry: &mut Carry,
    ) -> MatchState;
}

/// A recognized span of the input
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme<T> {
    pub text: String,
    /// Byte offset of the span in the input
    pub offset: usize,
    /// Tag of the primary matcher; None for filler text
    pub tag: Option<T>,
    /// Tags of the other matchers that succeeded on the same span
    pub alternates: Vec<T>,
}

/// Generic tokenizer over tagged matchers
pub struct Tokenizer<T> {
    matchers: Vec<(Box<dyn TokenMatcher>, T)>,
    allow_filler: bool,
}

impl<T: Clone> Default for Tokenizer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Tokenizer<T> {
    pub fn new() -> Self {
        Self {
            matchers: Vec::new(),
            allow_filler: false,
        }
    }

    /// Register a matcher; earlier registrations win ties
    pub fn add(&mut self, matcher: impl TokenMatcher + 'static, tag: T) -> &mut Self {
        self.matchers.push((Box::new(matcher), tag));
        self
    }

    /// Collect unmatched characters into filler lexemes instead of failing
    pub fn with_filler(mut self, allow: bool) -> Self {
        self.allow_filler = allow;
        self
    }

    pub fn tokenize(&self, input: &str) -> ScriptResult<Vec<Lexeme<T>>> {
        let chars: Vec<(usize, char)> = input.char_indices().collect();
        let byte_at = |i: usize| chars.get(i).map_or(input.len(), |(b, _)| *b);
        let char_at = |i: usize| chars.get(i).map(|(_, c)| *c);

        let mut lexemes = Vec::new();
        let mut filler: Option<(usize, String)> = None;
        let mut pos = 0;

        while pos < chars.len() {
            let start = pos;
            let start_byte = byte_at(start);
            let mut active = vec![true; self.matchers.len()];
            let mut carries = vec![Carry::default(); self.matchers.len()];
            let mut best: Option<(usize, Vec<usize>)> = None;
            let mut i = start;

            loop {
                let matched = &input[start_byte..byte_at(i)];
                let ch = char_at(i);
                let next = char_at(i + 1);
                let mut any_valid = false;
                let mut succeeded = Vec::new();

                for (index, (matcher, _)) in self.matchers.iter().enumerate() {
                    if !active[index] {
                        continue;
                    }
                    match matcher.feed(matched, ch, next, &mut carries[index]) {
                        MatchState::Valid => any_valid = true,
                        MatchState::Success => {
                            active[index] = false;
                            succeeded.push(index);
                        }
                        MatchState::Fail => active[index] = false,
                    }
                }

                if !succeeded.is_empty() && i > start {
                    best = Some((i, succeeded));
                }
                if !any_valid || ch.is_none() {
                    break;
                }
                i += 1;
            }

            match best {
                Some((end, winners)) => {
                    if let Some((offset, text)) = filler.take() {
                        lexemes.push(Lexeme {
                            text,
                            offset,
                            tag: None,
                            alternates: Vec::new(),
                        });
                    }
                    let mut tags = winners.into_iter().map(|w| self.matchers[w].1.clone());
                    lexemes.push(Lexeme {
                        text: input[start_byte..byte_at(end)].to_string(),
                        offset: start_byte,
                        tag: tags.next(),
                        alternates: tags.collect(),
                    });
                    pos = end;
                }
                None if self.allow_filler => {
                    let ch = char_at(start).unwrap_or_default();
                    filler
                        .get_or_insert_with(|| (start_byte, String::new()))
                        .1
                        .push(ch);
                    pos = start + 1;
                }
                None => {
                    let end = i.max(start + 1).min(chars.len());
                    return Err(ScriptError::unknown_token(
                        input,
                        start_byte,
                        &input[start_byte..byte_at(end)],
                    ));
                }
            }
        }

        if let Some((offset, text)) = filler {
            lexemes.push(Lexeme {
                text,
                offset,
                tag: None,
                alternates: Vec::new(),
            });
        }
        Ok(lexemes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::matchers::{Identifier, Literal, Number, Whitespace};

    fn tokenizer() -> Tokenizer<&'static str> {
        let mut t = Tokenizer::new();
        t.add(Literal::keyword("in"), "in")
            .add(Literal::new("="), "assign")
            .add(Literal::new("=="), "eq")
            .add(Literal::new("-"), "minus")
            .add(Literal::new("-"), "negate")
            .add(Whitespace, "ws")
            .add(Number, "number")
            .add(Identifier, "ident");
        t
    }

    fn tags(input: &str) -> Vec<(String, &'static str, Vec<&'static str>)> {
        tokenizer()
            .tokenize(input)
            .unwrap()
            .into_iter()
            .filter(|l| l.tag != Some("ws"))
            .map(|l| (l.text, l.tag.unwrap_or("filler"), l.alternates))
            .collect()
    }

    #[test]
    fn test_longest_match_wins() {
        let lexed = tags("a==b = c");
        let kinds: Vec<_> = lexed.iter().map(|(_, tag, _)| *tag).collect();
        assert_eq!(kinds, vec!["ident", "eq", "ident", "assign", "ident"]);
    }

    #[test]
    fn test_ties_become_alternates() {
        let lexed = tags("in -1");
        assert_eq!(lexed[0], ("in".to_string(), "in", vec!["ident"]));
        assert_eq!(lexed[1], ("-".to_string(), "minus", vec!["negate"]));
        let lexed = tags("inside");
        assert_eq!(lexed[0], ("inside".to_string(), "ident", vec![]));
    }

    #[test]
    fn test_unknown_token_reports_offset() {
        let err = tokenizer().tokenize("a # b").unwrap_err();
        match err {
            ScriptError::UnknownToken { token, span, .. } => {
                assert_eq!(token, "#");
                assert_eq!(span.offset(), 2);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_filler_mode_collects_text() {
        let mut t = Tokenizer::new().with_filler(true);
        t.add(Literal::new("{{"), "open").add(Literal::new("}}"), "close");
        let lexed = t.tokenize("hi {{x}} there").unwrap();
        let texts: Vec<_> = lexed.iter().map(|l| (l.text.as_str(), l.tag)).collect();
        assert_eq!(
            texts,
            vec![
                ("hi ", None),
                ("{{", Some("open")),
                ("x", None),
                ("}}", Some("close")),
                (" there", None),
            ]
        );
    }
}
