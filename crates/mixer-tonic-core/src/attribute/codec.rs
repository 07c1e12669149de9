//! Translation between the wire [`Attributes`] message and attribute bags.
//!
//! Names, string values and string-map entries are carried as dictionary
//! indices (see [`mixer::Dictionary`]). Decoding resolves every index up
//! front and fails as a whole; encoding prefers global dictionary entries
//! and spills everything else into the message's own word list.

use crate::{
    Error, Result,
    proto::{Attributes, StringMap},
};
use bytes::Bytes;
use mixer::{Bag, Dictionary, ProtoBag, Value, local_index};
use std::{
    collections::{BTreeMap, HashMap},
    time::SystemTime,
};

/// Decodes one attribute update into a fresh [`ProtoBag`].
///
/// Attributes listed in `deleted_attributes` come back marked deleted.
/// `reset_context` is not interpreted here; it describes how the update
/// relates to earlier state, which is the [`Tracker`](super::Tracker)'s
/// concern.
///
/// # Errors
///
/// - [`Error::InvalidAttributeIndex`] if any index fails to resolve.
/// - [`Error::InvalidAttributeValue`] if a timestamp or duration is out of
///   range.
/// - [`Error::ConflictingDelta`] if two entries resolve to the same name.
///
/// No partial bag is ever returned.
#[cfg_attr(feature = "tracing", tracing::instrument(level = "trace", skip_all, fields(words = attrs.words.len())))]
pub fn decode(attrs: &Attributes, dictionary: &Dictionary) -> Result<ProtoBag> {
    let words = attrs.words.as_slice();
    let word = |index: i32| resolve(dictionary, words, index);
    let mut bag = ProtoBag::with_capacity(entry_count(attrs));

    for (&index, &value) in &attrs.strings {
        put(&mut bag, word(index)?, Value::from(word(value)?))?;
    }
    for (&index, &value) in &attrs.int64s {
        put(&mut bag, word(index)?, Value::Int64(value))?;
    }
    for (&index, &value) in &attrs.doubles {
        put(&mut bag, word(index)?, Value::Double(value))?;
    }
    for (&index, &value) in &attrs.bools {
        put(&mut bag, word(index)?, Value::Bool(value))?;
    }
    for (&index, value) in &attrs.timestamps {
        let name = word(index)?;
        let ts = SystemTime::try_from(value.clone()).map_err(|e| Error::InvalidAttributeValue {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        put(&mut bag, name, Value::Timestamp(ts))?;
    }
    for (&index, value) in &attrs.durations {
        let name = word(index)?;
        let d = core::time::Duration::try_from(value.clone()).map_err(|e| {
            Error::InvalidAttributeValue {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;
        put(&mut bag, name, Value::Duration(d))?;
    }
    for (&index, value) in &attrs.bytes {
        put(
            &mut bag,
            word(index)?,
            Value::Bytes(Bytes::copy_from_slice(value)),
        )?;
    }
    for (&index, value) in &attrs.string_maps {
        let mut map = BTreeMap::new();
        for (&k, &v) in &value.entries {
            map.insert(word(k)?.to_string(), word(v)?.to_string());
        }
        put(&mut bag, word(index)?, Value::from(map))?;
    }

    for &index in &attrs.deleted_attributes {
        let name = word(index)?;
        if bag.contains(name) || bag.is_deleted(name) {
            return Err(Error::ConflictingDelta {
                name: name.to_string(),
            });
        }
        bag.mark_deleted(name);
    }

    Ok(bag)
}

fn resolve<'a>(dictionary: &'a Dictionary, words: &'a [String], index: i32) -> Result<&'a str> {
    dictionary
        .resolve(index, words)
        .map_err(|_| Error::InvalidAttributeIndex { index })
}

fn put(bag: &mut ProtoBag, name: &str, value: Value) -> Result<()> {
    match bag.insert(name, value) {
        Some(_) => Err(Error::ConflictingDelta {
            name: name.to_string(),
        }),
        None => Ok(()),
    }
}

fn entry_count(attrs: &Attributes) -> usize {
    attrs.strings.len()
        + attrs.int64s.len()
        + attrs.doubles.len()
        + attrs.bools.len()
        + attrs.timestamps.len()
        + attrs.durations.len()
        + attrs.bytes.len()
        + attrs.string_maps.len()
}

/// Encodes the attributes `names` of `bag` into a new wire message.
///
/// Names that the bag does not hold are emitted in `deleted_attributes`.
/// Every word that has a global dictionary index uses it; all other words
/// are appended once to the message's word list.
pub fn encode<'a, B, I>(bag: &B, names: I, dictionary: &Dictionary) -> Attributes
where
    B: Bag + ?Sized,
    I: IntoIterator<Item = &'a str>,
{
    let mut encoder = Encoder::new(dictionary);
    for name in names {
        match bag.get(name) {
            Some(value) => encoder.put(name, &value),
            None => encoder.delete(name),
        }
    }
    encoder.finish()
}

/// Builds one [`Attributes`] message, assigning indices as words are seen.
struct Encoder<'d> {
    dictionary: &'d Dictionary,
    local: HashMap<String, i32>,
    out: Attributes,
}

impl<'d> Encoder<'d> {
    fn new(dictionary: &'d Dictionary) -> Self {
        Self {
            dictionary,
            local: HashMap::new(),
            out: Attributes::default(),
        }
    }

    fn index(&mut self, word: &str) -> i32 {
        if let Some(index) = self.dictionary.index_of(word) {
            return index;
        }
        if let Some(&index) = self.local.get(word) {
            return index;
        }
        let index = local_index(self.out.words.len());
        self.out.words.push(word.to_string());
        self.local.insert(word.to_string(), index);
        index
    }

    fn put(&mut self, name: &str, value: &Value) {
        let index = self.index(name);
        match value {
            Value::String(s) => {
                let v = self.index(s);
                self.out.strings.insert(index, v);
            }
            Value::Int64(v) => {
                self.out.int64s.insert(index, *v);
            }
            Value::Double(v) => {
                self.out.doubles.insert(index, *v);
            }
            Value::Bool(v) => {
                self.out.bools.insert(index, *v);
            }
            Value::Timestamp(t) => {
                self.out
                    .timestamps
                    .insert(index, prost_types::Timestamp::from(*t));
            }
            Value::Duration(d) => {
                let d = prost_types::Duration::try_from(*d).unwrap_or(prost_types::Duration {
                    seconds: i64::MAX,
                    nanos: 999_999_999,
                });
                self.out.durations.insert(index, d);
            }
            Value::Bytes(b) => {
                self.out.bytes.insert(index, b.to_vec());
            }
            Value::StringMap(m) => {
                let mut entries = HashMap::with_capacity(m.len());
                for (k, v) in m.iter() {
                    let k = self.index(k);
                    let v = self.index(v);
                    entries.insert(k, v);
                }
                self.out.string_maps.insert(index, StringMap { entries });
            }
        }
    }

    fn delete(&mut self, name: &str) {
        let index = self.index(name);
        self.out.deleted_attributes.push(index);
    }

    fn finish(self) -> Attributes {
        self.out
    }
}
