//! Large-object draining.

use bytes::BytesMut;

use super::LobReader;
use crate::error::{BridgeError, Result};

/// Drain a large-object handle into text.
///
/// Chunks are accumulated as bytes and decoded once at the end, so a
/// multi-byte character split across chunks survives intact. The reader is
/// closed exactly once, whether or not draining succeeded.
pub async fn read_lob(mut reader: Box<dyn LobReader>) -> Result<String> {
    let drained = drain(reader.as_mut()).await;
    reader.close().await;
    let buf = drained?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

async fn drain(reader: &mut dyn LobReader) -> Result<BytesMut> {
    let mut buf = BytesMut::new();
    loop {
        match reader.next_chunk().await {
            Ok(Some(chunk)) => buf.extend_from_slice(&chunk),
            Ok(None) => return Ok(buf),
            Err(BridgeError::Stream(message)) => return Err(BridgeError::Stream(message)),
            Err(other) => return Err(BridgeError::Stream(other.to_string())),
        }
    }
}
