use crate::error::ArenaStreamError;

/// Lines carrying event payloads start with this prefix; everything else on
/// the stream (comments, keep-alives, blank separators) is discarded.
pub const DATA_PREFIX: &str = "data:";

/// Incremental decoder for a newline-delimited `data:`-prefixed event stream.
///
/// Chunk boundaries carry no meaning: the buffer holds raw bytes and only
/// complete lines are decoded as UTF-8, so a frame — or a single multi-byte
/// character — split across two chunks is yielded whole once its terminating
/// newline arrives. A trailing partial line is held, never surfaced as an
/// error.
#[derive(Debug, Default)]
pub struct SseFrameDecoder {
    buffer: Vec<u8>,
}

impl SseFrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one chunk and returns the payloads of every frame it completed.
    pub fn push_chunk(&mut self, chunk: &[u8]) -> Result<Vec<String>, ArenaStreamError> {
        self.buffer.extend_from_slice(chunk);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&byte| byte == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = std::str::from_utf8(&line[..pos]).map_err(|error| {
                ArenaStreamError::InvalidStream(format!("invalid UTF-8 in stream frame: {error}"))
            })?;
            if let Some(data) = line.trim().strip_prefix(DATA_PREFIX) {
                frames.push(data.trim().to_string());
            }
        }

        Ok(frames)
    }

    /// Drains a complete trailing frame once the stream has ended. A trailing
    /// fragment that never became a full line is dropped silently.
    pub fn finish(&mut self) -> Option<String> {
        let frame = std::str::from_utf8(&self.buffer)
            .ok()
            .map(str::trim)
            .and_then(|line| line.strip_prefix(DATA_PREFIX))
            .map(|data| data.trim().to_string());
        self.buffer.clear();
        frame
    }
}
