//! Canonical schema signatures
//!
//! A signature is the flat field-path → type map of a data schema. Its string
//! encoding is sorted by field name, so equal field sets always encode the
//! same way and signatures can be persisted and compared without the schema
//! types at hand.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{BarberError, Result};
use crate::schema::TypeTag;

const FIELD_SEPARATOR: char = ';';
const PAIR_SEPARATOR: char = ',';

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    fields: BTreeMap<String, TypeTag>,
}

impl Signature {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<String>, type_tag: TypeTag) {
        self.fields.insert(path.into(), type_tag);
    }

    pub fn get(&self, path: &str) -> Option<TypeTag> {
        self.fields.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fields.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, TypeTag> {
        &self.fields
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// First dot-segment of every field path
    pub fn root_keys(&self) -> BTreeSet<&str> {
        self.fields
            .keys()
            .map(|path| path.split('.').next().unwrap_or(path))
            .collect()
    }

    /// Encode as `name,ordinal` pairs sorted by name
    pub fn encode(&self) -> String {
        self.fields
            .iter()
            .map(|(name, tag)| format!("{}{}{}", name, PAIR_SEPARATOR, tag.ordinal()))
            .collect::<Vec<_>>()
            .join(&FIELD_SEPARATOR.to_string())
    }

    pub fn decode(encoded: &str) -> Result<Self> {
        let mut signature = Signature::new();
        if encoded.is_empty() {
            return Ok(signature);
        }
        for pair in encoded.split(FIELD_SEPARATOR) {
            let (name, ordinal) = pair.rsplit_once(PAIR_SEPARATOR).ok_or_else(|| {
                BarberError::Signature(format!("'{}' is not a name,type pair", pair))
            })?;
            if name.is_empty() {
                return Err(BarberError::Signature(format!("'{}' has an empty field name", pair)));
            }
            let tag = ordinal
                .parse::<u8>()
                .ok()
                .and_then(TypeTag::from_ordinal)
                .ok_or_else(|| {
                    BarberError::Signature(format!("'{}' has unknown type ordinal '{}'", pair, ordinal))
                })?;
            signature.insert(name, tag);
        }
        Ok(signature)
    }

    /// True iff every (field, type) pair of `target` is present here
    pub fn can_satisfy(&self, target: &Signature) -> bool {
        target
            .fields
            .iter()
            .all(|(name, tag)| self.fields.get(name) == Some(tag))
    }

    /// Like [`Signature::can_satisfy`] but compares field names only
    pub fn can_satisfy_naively(&self, target: &Signature) -> bool {
        target.fields.keys().all(|name| self.fields.contains_key(name))
    }

    /// SHA-256 fingerprint of the canonical encoding
    pub fn digest(&self) -> String {
        format!("{:x}", Sha256::digest(self.encode().as_bytes()))
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Signature {
    type Err = BarberError;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl FromIterator<(String, TypeTag)> for Signature {
    fn from_iter<I: IntoIterator<Item = (String, TypeTag)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}
