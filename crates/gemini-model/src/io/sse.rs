use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    ChunksError(ChunksError),
    InvalidPayload,
}

/// A type for reading server-sent events from a chunk stream.
///
/// Only `data` fields are supported. Carriage returns are dropped, so both
/// `\n\n` and `\r\n\r\n` terminate an event.
pub struct Sse {
    // Bytes of a UTF-8 sequence that was split across two chunks.
    pending: Vec<u8>,
    buf: String,
    chunks: Chunks,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            pending: Vec::new(),
            buf: String::new(),
            chunks,
        }
    }

    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            // There may be complete events buffered from the last chunk.
            if let Some(event) = self.try_parse_event()? {
                return Ok(Some(event));
            }

            let Some(bytes) =
                self.chunks.next_chunk().await.map_err(Error::ChunksError)?
            else {
                // Abort if no more data available.
                return Ok(None);
            };
            self.push_bytes(&bytes)?;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.pending.extend_from_slice(bytes);
        let valid_len = match std::str::from_utf8(&self.pending) {
            Ok(s) => s.len(),
            // An incomplete sequence at the end, wait for the next chunk.
            Err(err) if err.error_len().is_none() => err.valid_up_to(),
            Err(_) => return Err(Error::InvalidPayload),
        };
        let text = std::str::from_utf8(&self.pending[..valid_len])
            .map_err(|_| Error::InvalidPayload)?;
        self.buf.extend(text.chars().filter(|c| *c != '\r'));
        self.pending.drain(..valid_len);
        Ok(())
    }

    fn try_parse_event(&mut self) -> Result<Option<String>, Error> {
        // Skip blank lines between events (e.g. a stray `\n` after `\n\n`).
        let skip = self.buf.len() - self.buf.trim_start_matches('\n').len();
        self.buf.drain(..skip);
        if self.buf.is_empty() {
            return Ok(None);
        }

        let Some(eol_idx) = self.buf.find("\n\n") else {
            return Ok(None);
        };

        // Each line of the event is a field, multiple `data` fields are
        // joined with a line feed.
        let mut data: Option<String> = None;
        for field in self.buf[..eol_idx].split('\n') {
            if field.starts_with(':') {
                // Comment line.
                continue;
            }
            let Some(value) = field.strip_prefix("data:") else {
                // Other fields are not supported.
                return Err(Error::InvalidPayload);
            };
            let value = value.strip_prefix(' ').unwrap_or(value);
            match &mut data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => data = Some(value.to_owned()),
            }
        }

        // Consume the bytes from the buffer.
        self.buf.drain(0..eol_idx + 2);

        match data {
            Some(data) => Ok(Some(data)),
            // An event of comments only, look for the next one.
            None => self.try_parse_event(),
        }
    }
}
