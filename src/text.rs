//! Whitespace/bracket tokenizer shared by the text readers.

use std::str::FromStr;

use crate::error::{HeError, Result};
use crate::ring::IndexSet;

pub(crate) struct Tokens<'t> {
    tokens: Vec<&'t str>,
    pos: usize,
}

impl<'t> Tokens<'t> {
    /// Split `input` on whitespace, with each of `[ ] { }` as a token of its own.
    pub(crate) fn new(input: &'t str) -> Self {
        let mut tokens = Vec::new();
        let mut start: Option<usize> = None;
        for (i, ch) in input.char_indices() {
            let is_bracket = matches!(ch, '[' | ']' | '{' | '}');
            if ch.is_whitespace() || is_bracket {
                if let Some(s) = start.take() {
                    tokens.push(&input[s..i]);
                }
                if is_bracket {
                    tokens.push(&input[i..i + 1]);
                }
            } else if start.is_none() {
                start = Some(i);
            }
        }
        if let Some(s) = start {
            tokens.push(&input[s..]);
        }
        Self { tokens, pos: 0 }
    }

    pub(crate) fn peek(&self) -> Option<&'t str> {
        self.tokens.get(self.pos).copied()
    }

    pub(crate) fn next_token(&mut self) -> Result<&'t str> {
        let tok = self
            .peek()
            .ok_or_else(|| HeError::Parse("unexpected end of input".into()))?;
        self.pos += 1;
        Ok(tok)
    }

    pub(crate) fn expect(&mut self, want: &str) -> Result<()> {
        let tok = self.next_token()?;
        if tok != want {
            return Err(HeError::Parse(format!("expected `{want}`, found `{tok}`")));
        }
        Ok(())
    }

    pub(crate) fn parse<T: FromStr>(&mut self) -> Result<T> {
        let tok = self.next_token()?;
        tok.parse()
            .map_err(|_| HeError::Parse(format!("cannot parse `{tok}`")))
    }

    pub(crate) fn is_exhausted(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// `{i j k}`
    pub(crate) fn index_set(&mut self) -> Result<IndexSet> {
        self.expect("{")?;
        let mut set = IndexSet::new();
        while self.peek() != Some("}") {
            set.insert(self.parse::<usize>()?);
        }
        self.expect("}")?;
        Ok(set)
    }
}
