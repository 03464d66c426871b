//! Reply model for the tunnel protocol.
//!
//! A reply maps each security (as named by the backend) to the fields that
//! resolved for it. Fields the backend marks invalid or unavailable are
//! simply absent, never null. A [`ResultSet`] is built fresh per exchange
//! and discarded after serialization.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A resolved field value. Scalars are string-encoded by the backend;
/// array-valued fields arrive as sequences of scalars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Single string-encoded value
    Scalar(String),
    /// Array-valued field
    Array(Vec<String>),
}

/// Field name to resolved value, for one security.
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Aggregated lookup result: security -> field -> value.
///
/// Serializes transparently as the inner mapping, which is exactly the
/// reply body the client reads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultSet(BTreeMap<String, FieldMap>);

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one security's fields from a response page.
    ///
    /// The first page naming a security creates its entry; later pages add
    /// further fields to the same entry. A field repeated across pages
    /// takes the later page's value. The existing field set is never
    /// replaced wholesale.
    pub fn merge(&mut self, security: String, fields: FieldMap) {
        self.0.entry(security).or_default().extend(fields);
    }

    /// Fields resolved for one security, if any page named it
    pub fn get(&self, security: &str) -> Option<&FieldMap> {
        self.0.get(security)
    }

    /// Number of securities with at least one page entry
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
