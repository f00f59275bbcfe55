//! Murmur3 token ring and the ranges it induces.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A Murmur3 partitioner token.
pub type Token = i64;

/// Half-open token interval `(start, end]`. Ranges never wrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenRange {
    start: Token,
    end: Token,
}

impl TokenRange {
    pub fn new(start: Token, end: Token) -> Self {
        debug_assert!(start < end, "token range ({start}, {end}] is empty");
        Self { start, end }
    }

    pub fn start(&self) -> Token {
        self.start
    }

    pub fn end(&self) -> Token {
        self.end
    }

    pub fn contains(&self, token: Token) -> bool {
        self.start < token && token <= self.end
    }
}

impl fmt::Display for TokenRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}]", self.start, self.end)
    }
}

/// Sorted, de-duplicated node tokens of a cluster.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenRing {
    tokens: Vec<Token>,
}

impl TokenRing {
    pub fn new(tokens: impl IntoIterator<Item = Token>) -> Self {
        let mut tokens: Vec<Token> = tokens.into_iter().collect();
        tokens.sort_unstable();
        tokens.dedup();
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    /// Ordered, non-overlapping ranges covering `(MIN, MAX]`.
    ///
    /// `i64::MIN` itself is never produced by Murmur3 and is left out.
    pub fn ranges(&self) -> Vec<TokenRange> {
        let mut ranges = Vec::with_capacity(self.tokens.len() + 1);
        let mut prev = Token::MIN;
        for &token in &self.tokens {
            if token > prev {
                ranges.push(TokenRange::new(prev, token));
                prev = token;
            }
        }
        if prev < Token::MAX {
            ranges.push(TokenRange::new(prev, Token::MAX));
        }
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covers_space(ranges: &[TokenRange]) {
        assert_eq!(ranges.first().unwrap().start(), Token::MIN);
        assert_eq!(ranges.last().unwrap().end(), Token::MAX);
        for pair in ranges.windows(2) {
            assert_eq!(pair[0].end(), pair[1].start(), "gap or overlap at {}", pair[0]);
        }
    }

    #[test]
    fn test_empty_ring_is_one_range() {
        let ranges = TokenRing::default().ranges();
        assert_eq!(ranges, vec![TokenRange::new(Token::MIN, Token::MAX)]);
    }

    #[test]
    fn test_ranges_cover_space_without_gaps() {
        let ring = TokenRing::new([300, -5_000, 0, 300, 9_000_000]);
        assert_eq!(ring.tokens(), &[-5_000, 0, 300, 9_000_000]);

        let ranges = ring.ranges();
        assert_eq!(ranges.len(), 5);
        assert_covers_space(&ranges);
    }

    #[test]
    fn test_boundary_tokens() {
        let ranges = TokenRing::new([Token::MIN, Token::MAX]).ranges();
        assert_eq!(ranges, vec![TokenRange::new(Token::MIN, Token::MAX)]);
    }

    #[test]
    fn test_every_token_falls_in_exactly_one_range() {
        let ranges = TokenRing::new([-10, 10, 20]).ranges();
        for probe in [Token::MIN + 1, -10, -9, 10, 11, 20, 21, Token::MAX] {
            let hits = ranges.iter().filter(|r| r.contains(probe)).count();
            assert_eq!(hits, 1, "token {probe}");
        }
    }
}
