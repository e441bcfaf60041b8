use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};

use crate::error::Result;

const FRAME_HEADER_LEN: usize = 8;

/// Pull-based view over the output of an attached exec session.
///
/// The daemon multiplexes non-tty exec output as frames: one byte for
/// the stream kind, three zero bytes, the payload length as a
/// big-endian u32, then the payload. The transport is free to split or
/// coalesce frames, so a rolling buffer reassembles them here. The
/// sequence is finite and cannot be restarted.
pub struct ExecOutput {
    inner: BoxStream<'static, reqwest::Result<Bytes>>,
    buf: Vec<u8>,
    done: bool,
}

impl ExecOutput {
    pub(crate) fn new(stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            inner: stream.boxed(),
            buf: Vec::new(),
            done: false,
        }
    }

    /// Next decoded output chunk, or `None` once the session's stream
    /// has ended. Stdout and stderr frames are not told apart.
    pub async fn next_chunk(&mut self) -> Option<Result<String>> {
        loop {
            if let Some(payload) = self.take_frame() {
                return Some(Ok(payload));
            }
            if self.done {
                // Leftover bytes that never completed a frame are dropped.
                return None;
            }
            match self.inner.next().await {
                Some(Ok(chunk)) => self.buf.extend_from_slice(&chunk),
                Some(Err(e)) => return Some(Err(e.into())),
                None => self.done = true,
            }
        }
    }

    fn take_frame(&mut self) -> Option<String> {
        if self.buf.len() < FRAME_HEADER_LEN {
            return None;
        }
        let len = u32::from_be_bytes([self.buf[4], self.buf[5], self.buf[6], self.buf[7]]) as usize;
        if self.buf.len() < FRAME_HEADER_LEN + len {
            return None;
        }
        let payload = String::from_utf8_lossy(&self.buf[FRAME_HEADER_LEN..FRAME_HEADER_LEN + len])
            .into_owned();
        self.buf.drain(..FRAME_HEADER_LEN + len);
        Some(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn frame(kind: u8, payload: &str) -> Vec<u8> {
        let mut bytes = vec![kind, 0, 0, 0];
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload.as_bytes());
        bytes
    }

    fn output_over(chunks: Vec<Vec<u8>>) -> ExecOutput {
        ExecOutput::new(stream::iter(
            chunks
                .into_iter()
                .map(|c| Ok::<_, reqwest::Error>(Bytes::from(c))),
        ))
    }

    async fn collect(mut output: ExecOutput) -> Vec<String> {
        let mut decoded = Vec::new();
        while let Some(chunk) = output.next_chunk().await {
            decoded.push(chunk.unwrap());
        }
        decoded
    }

    #[tokio::test]
    async fn decodes_frames_in_order() {
        let mut bytes = frame(1, "line1\n");
        bytes.extend(frame(2, "line2\n"));

        let decoded = collect(output_over(vec![bytes])).await;
        assert_eq!(decoded, vec!["line1\n", "line2\n"]);
    }

    #[tokio::test]
    async fn reassembles_frames_split_across_chunks() {
        let bytes = frame(1, "hello world");
        let (head, tail) = bytes.split_at(5);

        let decoded = collect(output_over(vec![head.to_vec(), tail.to_vec()])).await;
        assert_eq!(decoded, vec!["hello world"]);
    }

    #[tokio::test]
    async fn empty_stream_yields_nothing() {
        let decoded = collect(output_over(Vec::new())).await;
        assert!(decoded.is_empty());
    }

    #[tokio::test]
    async fn incomplete_trailing_frame_is_dropped() {
        let mut bytes = frame(1, "complete");
        bytes.extend_from_slice(&[1, 0, 0, 0, 0, 0]);

        let decoded = collect(output_over(vec![bytes])).await;
        assert_eq!(decoded, vec!["complete"]);
    }

    #[tokio::test]
    async fn non_utf8_payload_is_decoded_lossily() {
        let mut bytes = vec![1, 0, 0, 0, 0, 0, 0, 2];
        bytes.extend_from_slice(&[0xff, 0xfe]);

        let decoded = collect(output_over(vec![bytes])).await;
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0], "\u{fffd}\u{fffd}");
    }
}
