//! Resource transfer abstraction.

use crate::error::Result;
use bytes::Bytes;

/// Async byte transfer for a resource identifier.
///
/// The engine's loader deduplicates transfers; implementations only need to
/// turn one identifier into one payload. Identifiers are engine-opaque: a
/// desktop bridge typically understands `http(s)://` URLs and filesystem
/// paths, a test double can serve canned bytes.
#[async_trait::async_trait]
pub trait MediaFetcher: Send + Sync {
    /// Fetch the encoded payload for `url`.
    async fn fetch(&self, url: &str) -> Result<Bytes>;
}
