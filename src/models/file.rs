//! Represents a stored object (file) as seen by API clients.

use crate::store::ObjectInfo;
use serde::{Deserialize, Serialize};

/// One object's identity and verification state.
///
/// The payload bytes never live here; they only travel as an upload argument
/// or a download stream.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct File {
    /// Object key within its bucket.
    pub name: String,

    /// Bucket the object lives in.
    pub bucket: String,

    /// Value of the object's `verified` tag. Missing or unreadable tags read as `false`.
    pub verified: bool,

    /// MIME type recorded by the store, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

impl File {
    /// Project store metadata into an unverified `File`.
    pub fn from_object(bucket: &str, info: ObjectInfo) -> Self {
        Self {
            name: info.key,
            bucket: bucket.to_string(),
            verified: false,
            content_type: info.content_type.filter(|ct| !ct.is_empty()),
        }
    }
}
