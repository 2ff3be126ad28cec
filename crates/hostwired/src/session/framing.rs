//! Newline-delimited framing for request lines.

use std::io::{self, Read};

use thiserror::Error;

/// Maximum size of a single request line in bytes, not counting the
/// delimiter.
pub(crate) const MAX_REQUEST_BYTES: usize = 64 * 1024;

const CHUNK_BYTES: usize = 1024;

/// Failure while reading one request line.
#[derive(Debug, Error)]
pub(crate) enum FrameError {
    #[error("failed to read from connection: {0}")]
    Io(#[from] io::Error),
    #[error("request line of {size} bytes exceeds {max_size} byte limit")]
    TooLarge { size: usize, max_size: usize },
}

/// Splits a byte stream into request lines, keeping bytes that arrive after
/// a delimiter for the next call.
#[derive(Debug)]
pub(crate) struct LineReader {
    pending: Vec<u8>,
    limit: usize,
}

impl LineReader {
    pub(crate) const fn new() -> Self {
        Self::with_limit(MAX_REQUEST_BYTES)
    }

    pub(crate) const fn with_limit(limit: usize) -> Self {
        Self {
            pending: Vec::new(),
            limit,
        }
    }

    /// Returns the next line, delimiter included.
    ///
    /// `Ok(None)` means the peer closed the stream with nothing buffered. A
    /// trailing fragment without a delimiter is returned as a final line.
    pub(crate) fn read_line<R>(&mut self, reader: &mut R) -> Result<Option<Vec<u8>>, FrameError>
    where
        R: Read + ?Sized,
    {
        let mut chunk = [0_u8; CHUNK_BYTES];
        loop {
            if let Some(position) = self.pending.iter().position(|byte| *byte == b'\n') {
                // The limit applies to the request body; the delimiter is free.
                self.enforce_limit(position)?;
                let rest = self.pending.split_off(position + 1);
                return Ok(Some(std::mem::replace(&mut self.pending, rest)));
            }
            self.enforce_limit(self.pending.len())?;

            let read = read_with_retry(reader, &mut chunk)?;
            if read == 0 {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(std::mem::take(&mut self.pending)));
            }
            self.pending.extend_from_slice(chunk.get(..read).unwrap_or_default());
        }
    }

    fn enforce_limit(&self, size: usize) -> Result<(), FrameError> {
        if size > self.limit {
            return Err(FrameError::TooLarge {
                size,
                max_size: self.limit,
            });
        }
        Ok(())
    }
}

fn read_with_retry<R>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: Read + ?Sized,
{
    loop {
        match reader.read(buf) {
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {}
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn splits_pipelined_lines() {
        let mut input = Cursor::new(b"first\nsecond\nthird".to_vec());
        let mut reader = LineReader::new();
        assert_eq!(
            reader.read_line(&mut input).expect("line").as_deref(),
            Some(b"first\n".as_slice())
        );
        assert_eq!(
            reader.read_line(&mut input).expect("line").as_deref(),
            Some(b"second\n".as_slice())
        );
        assert_eq!(
            reader.read_line(&mut input).expect("line").as_deref(),
            Some(b"third".as_slice())
        );
        assert!(reader.read_line(&mut input).expect("eof").is_none());
    }

    #[test]
    fn rejects_oversized_lines() {
        let mut input = Cursor::new(vec![b'x'; 64]);
        let mut reader = LineReader::with_limit(16);
        assert!(matches!(
            reader.read_line(&mut input),
            Err(FrameError::TooLarge { max_size: 16, .. })
        ));
    }

    #[test]
    fn request_at_the_limit_is_accepted() {
        let mut line = vec![b'x'; 16];
        line.push(b'\n');
        let mut input = Cursor::new(line.clone());
        let mut reader = LineReader::with_limit(16);
        assert_eq!(reader.read_line(&mut input).expect("line"), Some(line));
    }

    #[test]
    fn request_one_past_the_limit_is_refused() {
        let mut line = vec![b'x'; 17];
        line.push(b'\n');
        let mut input = Cursor::new(line);
        let mut reader = LineReader::with_limit(16);
        assert!(matches!(
            reader.read_line(&mut input),
            Err(FrameError::TooLarge { size: 17, max_size: 16 })
        ));
    }

    #[test]
    fn empty_stream_is_end_of_input() {
        let mut input = Cursor::new(Vec::new());
        assert!(LineReader::new().read_line(&mut input).expect("eof").is_none());
    }
}
