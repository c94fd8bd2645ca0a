//! Lookup interface toward a cross-video re-identification service.
//!
//! The tracker only keeps identities alive within one stream. Persisting them
//! across videos is delegated to an external store that answers "which known
//! animal does this embedding belong to".

use serde::{Deserialize, Serialize};

/// A known identity returned by the lookup service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityMatch {
    /// Identifier assigned by the re-identification service
    pub identity_id: String,
    /// Similarity between the query and the stored embedding, higher is closer
    pub similarity: f32,
}

/// Lookup-by-embedding interface of a re-identification service.
pub trait IdentityLookup {
    type Error;

    /// Find the closest known identity for `embedding`, if any is close enough.
    fn lookup(&mut self, embedding: &[f32]) -> Result<Option<IdentityMatch>, Self::Error>;
}
