//! Bounded buffering of upstream response bodies.

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use futures_util::{stream, StreamExt};
use http_body_util::BodyExt;

/// Outcome of reading a body against a size ceiling.
pub enum Bounded {
    /// The whole body, no larger than the limit.
    Complete(Bytes),
    /// The limit was exceeded. The body replays the bytes already read
    /// followed by the unread remainder, so the client sees it unchanged.
    Overflow(Body),
}

/// Buffer `body` until it ends or grows past `limit` bytes.
///
/// Reading stops at the first frame that takes the total above `limit`, so at
/// most one frame beyond the ceiling is held in memory.
pub async fn read_bounded(mut body: Body, limit: usize) -> Result<Bounded, axum::Error> {
    let mut buf = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let frame = frame?;
        let Ok(data) = frame.into_data() else {
            // trailers carry no payload
            continue;
        };

        buf.extend_from_slice(&data);
        if buf.len() > limit {
            let prefix = stream::once(async move { Ok::<_, axum::Error>(buf.freeze()) });
            let replay = prefix.chain(body.into_data_stream());
            return Ok(Bounded::Overflow(Body::from_stream(replay)));
        }
    }

    Ok(Bounded::Complete(buf.freeze()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunked(chunks: &[&'static [u8]]) -> Body {
        let items: Vec<Result<Bytes, std::io::Error>> =
            chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect();
        Body::from_stream(stream::iter(items))
    }

    #[tokio::test]
    async fn test_within_limit() {
        match read_bounded(chunked(&[b"abc", b"def"]), 6).await.unwrap() {
            Bounded::Complete(bytes) => assert_eq!(&bytes[..], b"abcdef"),
            Bounded::Overflow(_) => panic!("body fits"),
        }
    }

    #[tokio::test]
    async fn test_overflow_replays_identical_bytes() {
        let result = read_bounded(chunked(&[b"abc", b"def", b"ghi"]), 4).await.unwrap();
        let Bounded::Overflow(body) = result else {
            panic!("body exceeds limit");
        };
        let all = body.collect().await.unwrap().to_bytes();
        assert_eq!(&all[..], b"abcdefghi");
    }

    #[tokio::test]
    async fn test_empty_body() {
        assert!(matches!(
            read_bounded(Body::empty(), 0).await.unwrap(),
            Bounded::Complete(b) if b.is_empty()
        ));
    }
}
