//! Serialized form of the [`MetaCart`] block stored in CRT files.
//!
//! These structs exist only for Postcard encoding. They mirror the runtime
//! types with plain integers so the block stays stable if the in-memory
//! representation changes.

use serde::{Deserialize, Serialize};

use crate::meta::{FeatureKind, FeatureQuestion, MetaCart, MetaCartError};

// ============================================================================
// Top-Level Payload
// ============================================================================

/// Version-tagged metadata block.
///
/// New layouts add variants; existing ones are never modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetaPayload {
    V1(MetaPayloadV1),
}

/// Version 1 metadata block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaPayloadV1 {
    /// Language id of the voice.
    pub language: u32,
    /// Feature questions ordered by id.
    pub features: Vec<FeaturePayload>,
}

/// One feature question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeaturePayload {
    pub id: u32,
    /// [`FeatureKind::id`].
    pub kind: u8,
    /// Accepted values, ascending.
    pub values: Vec<i32>,
}

// ============================================================================
// Conversion
// ============================================================================

impl From<&MetaCart> for MetaPayload {
    fn from(meta: &MetaCart) -> Self {
        let features = meta
            .iter()
            .map(|q| FeaturePayload {
                id: q.id,
                kind: q.kind.id(),
                values: q.values.iter().copied().collect(),
            })
            .collect();
        MetaPayload::V1(MetaPayloadV1 {
            language: meta.language(),
            features,
        })
    }
}

impl TryFrom<MetaPayload> for MetaCart {
    type Error = MetaCartError;

    fn try_from(payload: MetaPayload) -> Result<Self, Self::Error> {
        match payload {
            MetaPayload::V1(v1) => {
                let mut meta = MetaCart::new(v1.language);
                for feature in v1.features {
                    let kind = FeatureKind::from_id(feature.kind)
                        .ok_or(MetaCartError::UnknownKindId(feature.kind))?;
                    meta.insert(FeatureQuestion::new(feature.id, kind, feature.values))?;
                }
                Ok(meta)
            }
        }
    }
}

impl MetaCart {
    /// Encode as a versioned Postcard block.
    pub fn to_bytes(&self) -> Result<Vec<u8>, MetaCartError> {
        Ok(postcard::to_allocvec(&MetaPayload::from(self))?)
    }

    /// Decode a block written by [`MetaCart::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, MetaCartError> {
        let payload: MetaPayload = postcard::from_bytes(bytes)?;
        payload.try_into()
    }
}
