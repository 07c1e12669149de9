//! Two-tier attribute name dictionary.
//!
//! Attribute names, string values and string-map entries travel on the wire
//! as `i32` indices. Non-negative indices address the connection-scoped
//! global [`Dictionary`]; negative indices address the word list carried by
//! the message itself:
//!
//! | index   | resolves to        |
//! |---------|--------------------|
//! | `i >= 0`| `global[i]`        |
//! | `i < 0` | `local[-i - 1]`    |
//!
//! The same convention is used in both directions, see [`local_index`].

use crate::error::{Error, Result};
use std::collections::HashMap;

/// Attribute vocabulary every peer is assumed to share.
///
/// Names in this list never need to be spelled out in a message's word list.
pub const WELL_KNOWN_WORDS: &[&str] = &[
    "source.ip",
    "source.port",
    "source.name",
    "source.uid",
    "source.namespace",
    "source.labels",
    "source.user",
    "target.ip",
    "target.port",
    "target.service",
    "target.name",
    "target.uid",
    "target.namespace",
    "target.labels",
    "target.user",
    "request.headers",
    "request.id",
    "request.path",
    "request.host",
    "request.method",
    "request.reason",
    "request.referer",
    "request.scheme",
    "request.size",
    "request.time",
    "request.useragent",
    "response.headers",
    "response.size",
    "response.time",
    "response.duration",
    "response.code",
    "connection.id",
    "connection.received.bytes",
    "connection.sent.bytes",
    "connection.duration",
    "context.protocol",
    "context.timestamp",
    "api.name",
    "api.version",
    "api.operation",
    "api.protocol",
    "api.key",
    "auth.principal",
    "auth.audiences",
    "auth.presenter",
    "quota.name",
    "quota.amount",
];

/// Converts a position in a message-local word list into its wire index.
pub const fn local_index(position: usize) -> i32 {
    -(position as i32) - 1
}

/// The global (connection-scoped) half of the two-tier dictionary.
///
/// Holds the ordered word list used for non-negative indices and the reverse
/// mapping the encoder uses to prefer global entries over local words.
#[derive(Clone, Debug, Default)]
pub struct Dictionary {
    words: Vec<String>,
    reverse: HashMap<String, i32>,
}

impl Dictionary {
    /// Builds a dictionary from an ordered word list.
    ///
    /// If a word appears more than once, its first position wins when
    /// encoding; every position still resolves when decoding.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let words: Vec<String> = words.into_iter().map(Into::into).collect();
        let mut reverse = HashMap::with_capacity(words.len());
        for (i, word) in words.iter().enumerate() {
            reverse.entry(word.clone()).or_insert(i as i32);
        }
        Self { words, reverse }
    }

    /// The dictionary built from [`WELL_KNOWN_WORDS`].
    pub fn well_known() -> Self {
        Self::new(WELL_KNOWN_WORDS.iter().copied())
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Returns the global index of `word`, if it has one.
    pub fn index_of(&self, word: &str) -> Option<i32> {
        self.reverse.get(word).copied()
    }

    /// Resolves a wire index against this dictionary and a message's local
    /// word list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownIndex`] if the index is out of bounds for the
    /// tier it addresses.
    pub fn resolve<'a>(&'a self, index: i32, local: &'a [String]) -> Result<&'a str> {
        let word = if index >= 0 {
            self.words.get(index as usize)
        } else {
            // -(i + 1) cannot overflow, unlike -i for i32::MIN
            local.get(-(index + 1) as usize)
        };
        word.map(String::as_str)
            .ok_or(Error::UnknownIndex { index })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(w: &[&str]) -> Vec<String> {
        w.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn resolves_both_tiers() {
        let dict = Dictionary::new(["G0", "G1"]);
        let local = words(&["M1", "M2"]);

        assert_eq!(dict.resolve(0, &local), Ok("G0"));
        assert_eq!(dict.resolve(1, &local), Ok("G1"));
        assert_eq!(dict.resolve(-1, &local), Ok("M1"));
        assert_eq!(dict.resolve(-2, &local), Ok("M2"));
    }

    #[test]
    fn rejects_out_of_range_indices() {
        let dict = Dictionary::new(["G0"]);
        let local = words(&["M1"]);

        assert_eq!(dict.resolve(1, &local), Err(Error::UnknownIndex { index: 1 }));
        assert_eq!(dict.resolve(-2, &local), Err(Error::UnknownIndex { index: -2 }));
        assert_eq!(
            dict.resolve(i32::MIN, &local),
            Err(Error::UnknownIndex { index: i32::MIN })
        );
    }

    #[test]
    fn local_index_round_trips() {
        let dict = Dictionary::default();
        let local = words(&["a", "b", "c"]);
        for (pos, word) in local.iter().enumerate() {
            assert_eq!(dict.resolve(local_index(pos), &local), Ok(word.as_str()));
        }
    }

    #[test]
    fn first_occurrence_wins_for_reverse_lookup() {
        let dict = Dictionary::new(["x", "y", "x"]);
        assert_eq!(dict.index_of("x"), Some(0));
        assert_eq!(dict.index_of("z"), None);
        assert_eq!(dict.resolve(2, &[]), Ok("x"));
    }

    #[test]
    fn well_known_has_no_duplicates() {
        let dict = Dictionary::well_known();
        assert_eq!(dict.len(), WELL_KNOWN_WORDS.len());
        for (i, w) in WELL_KNOWN_WORDS.iter().enumerate() {
            assert_eq!(dict.index_of(w), Some(i as i32));
        }
    }
}
