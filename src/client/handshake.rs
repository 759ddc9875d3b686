//! Registry id map handshake.
//!
//! | Step | Direction | Frame |
//! |------|-----------|-------|
//! | 1 | server → client | `blob hash` |
//! | 2 | client → server | `bool cached` |
//! | 3 | server → client | sync packets, only if not cached |
//! | 4 | client → server | `bool true` (ready) |
//!
//! The cache key is the upper-case hex of the hash.

// ============================================================================
// Imports
// ============================================================================

use std::sync::Arc;

use tracing::{debug, warn};

use crate::codec::ByteBuf;
use crate::error::{Error, Result};
use crate::registry::{BlockTypes, IdMapCache, RegistryIdMaps, cache_key};
use crate::transport::Connection;

// ============================================================================
// Handshake
// ============================================================================

/// Runs the handshake on an open connection and returns frozen maps.
///
/// Must run on the networking thread.
pub(crate) async fn negotiate(
    conn: &Connection,
    name: &str,
    cache: Option<&IdMapCache>,
    block_types: Arc<BlockTypes>,
) -> Result<RegistryIdMaps> {
    let frame = conn.read_frame().await?;
    let key = read_hash(&frame)?;
    debug!(client = %name, key, "Received registry hash");

    let cached = cache.and_then(|c| c.load(&key, Arc::clone(&block_types)));
    conn.write_frame(bool_frame(cached.is_some())).await?;

    let maps = match cached {
        Some(maps) => maps,
        None => {
            let frame = conn.read_frame().await?;
            let maps = read_maps(&frame, block_types)?;
            debug!(
                client = %name,
                cmds = maps.cmd().len(),
                msgs = maps.msg().len(),
                blocks = maps.block().len(),
                "Received registry id maps"
            );

            if let Some(cache) = cache
                && let Err(e) = cache.store(&key, &maps)
            {
                warn!(client = %name, key, error = %e, "Failed to write id map cache");
            }
            maps
        }
    };

    conn.write_frame(bool_frame(true)).await?;
    debug!(client = %name, "Handshake complete");
    Ok(maps)
}

fn read_hash(frame: &[u8]) -> Result<String> {
    let mut buf = ByteBuf::view(frame);
    let hash = buf.read_blob()?;
    if hash.is_empty() {
        return Err(Error::protocol("server sent an empty registry hash"));
    }
    Ok(cache_key(&hash))
}

fn read_maps(frame: &[u8], block_types: Arc<BlockTypes>) -> Result<RegistryIdMaps> {
    let mut maps = RegistryIdMaps::with_block_types(block_types);
    maps.read_sync_packets(&mut ByteBuf::view(frame))?;
    maps.freeze();
    Ok(maps)
}

fn bool_frame(value: bool) -> Vec<u8> {
    let mut buf = ByteBuf::with_capacity(1);
    buf.write_bool(value);
    buf.into_inner()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceId;

    #[test]
    fn test_read_hash() {
        let mut buf = ByteBuf::new();
        buf.write_blob(&[0xde, 0xad, 0x01]);
        assert_eq!(read_hash(buf.as_slice()).unwrap(), "DEAD01");

        let mut buf = ByteBuf::new();
        buf.write_blob(&[]);
        assert!(read_hash(buf.as_slice()).is_err());
    }

    #[test]
    fn test_read_maps_freezes() {
        let mut source = RegistryIdMaps::new();
        source
            .cmd_mut()
            .put(0, ResourceId::parse("codecraft:set_block").unwrap())
            .unwrap();
        let mut buf = ByteBuf::new();
        source.write_sync_packets(&mut buf);

        let maps = read_maps(buf.as_slice(), RegistryIdMaps::new().block_types().clone()).unwrap();
        assert!(maps.is_frozen());
        assert_eq!(maps.cmd().len(), 1);
    }

    #[test]
    fn test_bool_frame() {
        assert_eq!(bool_frame(true), vec![1]);
        assert_eq!(bool_frame(false), vec![0]);
    }
}
