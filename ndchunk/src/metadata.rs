//! Array metadata.
//!
//! An array carries two kinds of named, opaque byte metadata:
//!  - [`Metalayers`]: fixed at creation, both the set of names and their contents, and
//!  - [`VariableMetadata`]: added, overwritten, and deleted at any time.
//!
//! Both are persisted in the store of the array as JSON, with contents encoded as base64.

use std::collections::BTreeMap;

use base64::{prelude::BASE64_STANDARD, Engine};
use derive_more::Deref;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::codec::CompressionParams;

/// The maximum number of metalayers of an array.
pub const MAX_METALAYERS: usize = 15;

/// The maximum length of a metadata name in bytes.
pub const MAX_METADATA_NAME_LEN: usize = 31;

/// The store key of the array header.
pub const HEADER_KEY: &str = "header";

/// The store key of the variable metadata.
pub const VLMETA_KEY: &str = "vlmeta";

/// A metadata error.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MetadataError {
    /// No metadata with the name exists.
    #[error("metadata {0} not found")]
    NotFound(String),
    /// Metadata with the name already exists.
    #[error("metadata {0} already exists")]
    Duplicate(String),
    /// Too many metalayers.
    #[error("{0} metalayers exceeds the maximum of {MAX_METALAYERS}")]
    TooMany(usize),
    /// An invalid metadata name.
    #[error("invalid metadata name {0:?}, must be between 1 and {MAX_METADATA_NAME_LEN} bytes")]
    InvalidName(String),
    /// Metadata could not be decoded.
    #[error("invalid metadata: {0}")]
    Invalid(String),
}

fn validate_name(name: &str) -> Result<(), MetadataError> {
    if name.is_empty() || name.len() > MAX_METADATA_NAME_LEN {
        Err(MetadataError::InvalidName(name.to_string()))
    } else {
        Ok(())
    }
}

mod base64_content {
    use base64::{prelude::BASE64_STANDARD, Engine};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(content: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&BASE64_STANDARD.encode(content))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(d)?;
        BASE64_STANDARD.decode(encoded).map_err(D::Error::custom)
    }
}

/// A fixed metalayer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metalayer {
    name: String,
    #[serde(with = "base64_content")]
    content: Vec<u8>,
}

impl Metalayer {
    /// Return the name of the metalayer.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Return the content of the metalayer.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.content
    }
}

/// An ordered set of uniquely named metalayers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deref, Serialize, Deserialize)]
#[serde(try_from = "Vec<Metalayer>", into = "Vec<Metalayer>")]
pub struct Metalayers(Vec<Metalayer>);

impl Metalayers {
    /// Create an empty set of metalayers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a set of metalayers from `(name, content)` pairs.
    ///
    /// # Errors
    /// Returns a [`MetadataError`] if a name is invalid or repeated, or there are more than
    /// [`MAX_METALAYERS`] pairs.
    pub fn from_pairs<N: AsRef<str>, C: AsRef<[u8]>>(
        pairs: impl IntoIterator<Item = (N, C)>,
    ) -> Result<Self, MetadataError> {
        let mut metalayers = Self::new();
        for (name, content) in pairs {
            metalayers.push(name.as_ref(), content.as_ref().to_vec())?;
        }
        Ok(metalayers)
    }

    fn push(&mut self, name: &str, content: Vec<u8>) -> Result<(), MetadataError> {
        validate_name(name)?;
        if self.contains(name) {
            return Err(MetadataError::Duplicate(name.to_string()));
        }
        if self.0.len() == MAX_METALAYERS {
            return Err(MetadataError::TooMany(self.0.len() + 1));
        }
        self.0.push(Metalayer {
            name: name.to_string(),
            content,
        });
        Ok(())
    }

    /// Return the content of the metalayer `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|metalayer| metalayer.name == name)
            .map(Metalayer::content)
    }

    /// Returns true if a metalayer `name` exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Return the metalayer names in creation order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(Metalayer::name).collect()
    }
}

impl TryFrom<Vec<Metalayer>> for Metalayers {
    type Error = MetadataError;

    fn try_from(metalayers: Vec<Metalayer>) -> Result<Self, Self::Error> {
        let mut validated = Self::new();
        for Metalayer { name, content } in metalayers {
            validated.push(&name, content)?;
        }
        Ok(validated)
    }
}

impl From<Metalayers> for Vec<Metalayer> {
    fn from(metalayers: Metalayers) -> Self {
        metalayers.0
    }
}

/// Variable metadata, a map from unique names to contents.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deref)]
pub struct VariableMetadata(BTreeMap<String, Vec<u8>>);

impl VariableMetadata {
    /// Create empty variable metadata.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite the entry `name`.
    ///
    /// # Errors
    /// Returns [`MetadataError::InvalidName`] if `name` is empty or too long.
    pub fn set(&mut self, name: &str, content: Vec<u8>) -> Result<(), MetadataError> {
        validate_name(name)?;
        self.0.insert(name.to_string(), content);
        Ok(())
    }

    /// Remove the entry `name`.
    ///
    /// # Errors
    /// Returns [`MetadataError::NotFound`] if there is no entry `name`.
    pub fn remove(&mut self, name: &str) -> Result<Vec<u8>, MetadataError> {
        self.0
            .remove(name)
            .ok_or_else(|| MetadataError::NotFound(name.to_string()))
    }

    /// Return the entry names in lexicographical order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.0.keys().map(String::as_str).collect()
    }
}

impl Serialize for VariableMetadata {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        s.collect_map(
            self.0
                .iter()
                .map(|(name, content)| (name, BASE64_STANDARD.encode(content))),
        )
    }
}

impl<'de> Deserialize<'de> for VariableMetadata {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(d)?;
        let mut metadata = Self::new();
        for (name, content) in encoded {
            let content = BASE64_STANDARD.decode(content).map_err(D::Error::custom)?;
            metadata.set(&name, content).map_err(D::Error::custom)?;
        }
        Ok(metadata)
    }
}

/// The persisted header of an array.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArrayHeader {
    /// The dimensionality.
    pub ndim: usize,
    /// The array shape.
    pub shape: Vec<u64>,
    /// The chunk shape.
    pub chunk_shape: Vec<u64>,
    /// The block shape.
    pub block_shape: Vec<u64>,
    /// The element size in bytes.
    pub typesize: usize,
    /// The compression parameters.
    pub compression: CompressionParams,
    /// The fixed metalayers.
    pub metalayers: Metalayers,
}

impl ArrayHeader {
    /// Serialize the header to JSON bytes.
    ///
    /// # Errors
    /// Returns [`MetadataError::Invalid`] if serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, MetadataError> {
        serde_json::to_vec_pretty(self).map_err(|err| MetadataError::Invalid(err.to_string()))
    }

    /// Deserialize a header from JSON bytes.
    ///
    /// # Errors
    /// Returns [`MetadataError::Invalid`] if `bytes` is not a valid header.
    pub fn from_json(bytes: &[u8]) -> Result<Self, MetadataError> {
        let header: Self =
            serde_json::from_slice(bytes).map_err(|err| MetadataError::Invalid(err.to_string()))?;
        if header.ndim != header.shape.len() {
            return Err(MetadataError::Invalid(format!(
                "ndim {} does not match shape {:?}",
                header.ndim, header.shape
            )));
        }
        if header.typesize != header.compression.typesize() {
            return Err(MetadataError::Invalid(format!(
                "typesize {} does not match compression typesize {}",
                header.typesize,
                header.compression.typesize()
            )));
        }
        Ok(header)
    }
}
