//! Durable object stores behind the tiered backend
//!
//! A remote object carries its body plus the entry metadata as object
//! attributes, so one request recovers both.

#[cfg(test)]
mod memory;
mod s3;

#[cfg(test)]
pub use memory::{InjectedFailure, MemoryStore};
pub use s3::S3Store;

use super::local::EntryMeta;
use crate::error::CacheResult;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::collections::HashMap;

/// Attribute holding the hex output ID
pub const META_OUTPUT_ID: &str = "outputid";
/// Attribute holding the body size in bytes
pub const META_SIZE: &str = "size";
/// Attribute holding the put time in unix seconds
pub const META_TIME: &str = "time";

/// An object fetched from a remote store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub body: Vec<u8>,
    pub attributes: HashMap<String, String>,
}

/// Minimal object-store surface needed by the tiered backend
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Fetch an object; `Ok(None)` when the key doesn't exist
    async fn get_object(&self, key: &str) -> CacheResult<Option<RemoteObject>>;

    /// Create or replace an object
    async fn put_object(
        &self,
        key: &str,
        body: Vec<u8>,
        attributes: HashMap<String, String>,
    ) -> CacheResult<()>;

    /// Delete every object under `prefix`, returning how many were removed
    async fn delete_prefix(&self, prefix: &str) -> CacheResult<usize>;

    /// Human-readable store name for logs
    fn name(&self) -> &'static str;
}

/// Encode entry metadata as object attributes
pub fn meta_to_attributes(meta: &EntryMeta) -> HashMap<String, String> {
    HashMap::from([
        (META_OUTPUT_ID.to_string(), hex::encode(&meta.output_id)),
        (META_SIZE.to_string(), meta.size.to_string()),
        (META_TIME.to_string(), meta.put_time.timestamp().to_string()),
    ])
}

/// Decode entry metadata from object attributes
pub fn meta_from_attributes(attributes: &HashMap<String, String>) -> Result<EntryMeta, String> {
    let field = |name: &str| {
        attributes
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| format!("missing {} attribute", name))
    };

    let output_id =
        hex::decode(field(META_OUTPUT_ID)?).map_err(|e| format!("invalid outputid: {}", e))?;
    let size: u64 = field(META_SIZE)?
        .parse()
        .map_err(|e| format!("invalid size: {}", e))?;
    let unix: i64 = field(META_TIME)?
        .parse()
        .map_err(|e| format!("invalid time: {}", e))?;
    let put_time = Utc
        .timestamp_opt(unix, 0)
        .single()
        .ok_or_else(|| format!("time out of range: {}", unix))?;

    Ok(EntryMeta {
        output_id,
        size,
        put_time,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_roundtrip_meta() {
        let meta = EntryMeta {
            output_id: vec![0xca, 0xfe],
            size: 42,
            put_time: Utc.timestamp_opt(1_700_000_123, 0).unwrap(),
        };
        let attributes = meta_to_attributes(&meta);
        assert_eq!(attributes[META_OUTPUT_ID], "cafe");
        assert_eq!(meta_from_attributes(&attributes).unwrap(), meta);
    }

    #[test]
    fn missing_attribute_rejected() {
        let attributes = HashMap::from([(META_SIZE.to_string(), "1".to_string())]);
        let err = meta_from_attributes(&attributes).unwrap_err();
        assert!(err.contains("outputid"), "{}", err);
    }
}
