//! Chunked payload streaming.
//!
//! Payloads are moved in 64KB chunks so memory stays flat for any file size.
//! [`CipherWriter`] and [`CipherReader`] apply the payload stream cipher on
//! the way through, and [`pump`] drives the copy while reporting progress
//! and checking for cancellation between chunks.

use std::io::{self, Read, Write};

use crate::cipher::StreamCipher;
use crate::error::{AxCryptError, Result};

/// Chunk size for payload streaming (64KB)
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Progress and cancellation sink supplied by the caller.
pub trait Progress {
    /// `bytes` more plaintext bytes have been processed.
    fn advance(&self, bytes: u64);

    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Sink that ignores progress and never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&self, _bytes: u64) {}
}

pub(crate) fn check_cancelled(progress: &dyn Progress) -> Result<()> {
    if progress.is_cancelled() {
        return Err(AxCryptError::Cancelled);
    }
    Ok(())
}

/// Encrypts everything written before passing it on.
pub struct CipherWriter<W> {
    cipher: StreamCipher,
    inner: W,
    buffer: Vec<u8>,
}

impl<W: Write> CipherWriter<W> {
    pub fn new(cipher: StreamCipher, inner: W) -> Self {
        Self {
            cipher,
            inner,
            buffer: Vec::with_capacity(CHUNK_SIZE),
        }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.clear();
        self.buffer.extend_from_slice(buf);
        self.cipher.apply_keystream(&mut self.buffer);
        // The keystream has advanced, so the whole buffer must go out.
        self.inner.write_all(&self.buffer)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Decrypts everything read through it.
pub struct CipherReader<R> {
    cipher: StreamCipher,
    inner: R,
}

impl<R: Read> CipherReader<R> {
    pub fn new(cipher: StreamCipher, inner: R) -> Self {
        Self { cipher, inner }
    }
}

impl<R: Read> Read for CipherReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.apply_keystream(&mut buf[..n]);
        Ok(n)
    }
}

/// Copy `reader` to `writer` in chunks. Returns the number of bytes copied.
///
/// Cancellation is checked before every chunk. A stream that ends early while
/// a complete payload was expected surfaces as [`AxCryptError::Malformed`].
pub fn pump<R, W>(reader: &mut R, writer: &mut W, progress: &dyn Progress) -> Result<u64>
where
    R: Read + ?Sized,
    W: Write + ?Sized,
{
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        check_cancelled(progress)?;
        let n = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(AxCryptError::from_payload_io(e)),
        };
        writer.write_all(&buffer[..n])?;
        total += n as u64;
        progress.advance(n as u64);
    }

    writer.flush()?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::io::Cursor;

    const KEY: [u8; 32] = [0x42; 32];
    const IV: [u8; 16] = [0x07; 16];

    fn cipher() -> StreamCipher {
        StreamCipher::new(&KEY, &IV, 0).expect("valid key")
    }

    struct Recorder {
        seen: Cell<u64>,
        calls: Cell<u32>,
        cancel_after: Option<u64>,
    }

    impl Progress for Recorder {
        fn advance(&self, bytes: u64) {
            self.seen.set(self.seen.get() + bytes);
            self.calls.set(self.calls.get() + 1);
        }

        fn is_cancelled(&self) -> bool {
            self.cancel_after.is_some_and(|limit| self.seen.get() >= limit)
        }
    }

    #[test]
    fn test_cipher_round_trip_large() {
        // Larger than CHUNK_SIZE to cover multiple chunks
        let plaintext: Vec<u8> = (0..CHUNK_SIZE * 3 + 1000).map(|i| i as u8).collect();

        let mut writer = CipherWriter::new(cipher(), Vec::new());
        let written = pump(&mut Cursor::new(&plaintext), &mut writer, &NoProgress).unwrap();
        let encrypted = writer.into_inner();
        assert_eq!(written, plaintext.len() as u64);
        assert_ne!(encrypted, plaintext);

        let mut reader = CipherReader::new(cipher(), Cursor::new(encrypted));
        let mut decrypted = Vec::new();
        pump(&mut reader, &mut decrypted, &NoProgress).unwrap();
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_empty_input() {
        let mut out = Vec::new();
        assert_eq!(pump(&mut io::empty(), &mut out, &NoProgress).unwrap(), 0);
        assert!(out.is_empty());
    }

    #[test]
    fn test_progress_is_reported_per_chunk() {
        let data = vec![0u8; CHUNK_SIZE * 2 + 1];
        let recorder = Recorder {
            seen: Cell::new(0),
            calls: Cell::new(0),
            cancel_after: None,
        };
        pump(&mut Cursor::new(&data), &mut io::sink(), &recorder).unwrap();
        assert_eq!(recorder.seen.get(), data.len() as u64);
        assert_eq!(recorder.calls.get(), 3);
    }

    #[test]
    fn test_cancellation_stops_between_chunks() {
        let data = vec![0u8; CHUNK_SIZE * 4];
        let recorder = Recorder {
            seen: Cell::new(0),
            calls: Cell::new(0),
            cancel_after: Some(CHUNK_SIZE as u64),
        };
        let mut out = Vec::new();
        let result = pump(&mut Cursor::new(&data), &mut out, &recorder);
        assert!(matches!(result, Err(AxCryptError::Cancelled)));
        assert_eq!(out.len(), CHUNK_SIZE);
    }

    #[test]
    fn test_unexpected_eof_is_malformed() {
        struct Truncated;
        impl Read for Truncated {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::UnexpectedEof, "cut short"))
            }
        }
        assert!(matches!(
            pump(&mut Truncated, &mut io::sink(), &NoProgress),
            Err(AxCryptError::Malformed(_))
        ));
    }
}
