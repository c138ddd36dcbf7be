//! Local durable key-value storage
//!
//! The OTP login path and the hosted client both persist small string
//! values (login markers, the serialized hosted session, the PKCE
//! verifier) through this abstraction.
//!
//! - `KeyValueStore` trait: common async interface
//! - `FileStore`: single JSON file, atomic replace on every write
//! - `MemoryStore`: in-process map for tests and embedding
//!
//! Reads and writes are async and must be awaited before dependent logic
//! runs; the session manager relies on that ordering.

use async_trait::async_trait;

use crate::error::Result;

pub mod file;
pub mod markers;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Flat string-keyed storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Value for `key`, or `None` if absent
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or overwrite `key`
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> Result<()>;

    /// Remove several keys.
    ///
    /// Backends that can do so remove them in a single atomic write, so
    /// a crash never leaves only some of them deleted.
    async fn remove_many(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }

    /// Set several keys at once
    async fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Backend identifier used in logs ("file", "memory")
    fn backend_name(&self) -> &str;
}
