//! Payload fixtures.

use avgate_storage::ByteStream;
use bytes::Bytes;
use futures::stream;
use std::io;
use std::time::Duration;

/// The EICAR anti-malware test file.
pub const EICAR: &[u8] =
    br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";

/// Signature name clamd reports for [`EICAR`].
pub const EICAR_SIGNATURE: &str = "Eicar-Test-Signature";

/// Deterministic payload that never contains the EICAR string.
pub fn patterned_payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 251) as u8).collect()
}

/// Split `data` into `chunk_size` pieces.
pub fn bytes_stream(data: Vec<u8>, chunk_size: usize) -> ByteStream<'static> {
    let data = Bytes::from(data);
    let chunks: Vec<io::Result<Bytes>> = (0..data.len())
        .step_by(chunk_size.max(1))
        .map(|start| Ok(data.slice(start..(start + chunk_size).min(data.len()))))
        .collect();
    Box::pin(stream::iter(chunks))
}

/// Like [`bytes_stream`], sleeping before every chunk.
pub fn slow_stream(data: Vec<u8>, chunk_size: usize, delay: Duration) -> ByteStream<'static> {
    let data = Bytes::from(data);
    let chunk_size = chunk_size.max(1);
    Box::pin(stream::unfold(0usize, move |offset| {
        let data = data.clone();
        async move {
            if offset >= data.len() {
                return None;
            }
            tokio::time::sleep(delay).await;
            let end = (offset + chunk_size).min(data.len());
            Some((Ok(data.slice(offset..end)), end))
        }
    }))
}

/// Yields `prefix`, then fails as if the client connection dropped.
pub fn interrupted_stream(prefix: Vec<u8>) -> ByteStream<'static> {
    Box::pin(stream::iter(vec![
        Ok(Bytes::from(prefix)),
        Err(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )),
    ]))
}
