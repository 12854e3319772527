//! Forward-only byte source with pushback.
//!
//! [`LookAheadStream`] wraps any [`Read`] and lets the caller return bytes it
//! has already consumed. Pushed-back segments form a stack: the most recent
//! segment is read first, and once every segment is drained reads fall
//! through to the underlying stream again.

use std::io::{self, Read};

struct Segment {
    bytes: Vec<u8>,
    pos: usize,
}

impl Segment {
    fn remaining(&self) -> &[u8] {
        &self.bytes[self.pos..]
    }
}

pub struct LookAheadStream<R> {
    inner: R,
    pushed: Vec<Segment>,
}

impl<R: Read> LookAheadStream<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            pushed: Vec::new(),
        }
    }

    /// Return `bytes` to the front of the stream.
    pub fn pushback(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        self.pushed.push(Segment {
            bytes: bytes.to_vec(),
            pos: 0,
        });
    }

    /// Number of pushed-back bytes not yet re-read.
    pub fn pushed_back_len(&self) -> usize {
        self.pushed.iter().map(|s| s.remaining().len()).sum()
    }

    /// Fill `buf` completely. Returns `Ok(false)` when the stream ends first;
    /// the bytes read up to that point are consumed.
    pub fn read_exact_or_eof(&mut self, buf: &mut [u8]) -> io::Result<bool> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => return Ok(false),
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for LookAheadStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let mut filled = 0;
        while filled < buf.len() {
            let Some(top) = self.pushed.last_mut() else {
                break;
            };
            let available = top.remaining();
            let n = available.len().min(buf.len() - filled);
            buf[filled..filled + n].copy_from_slice(&available[..n]);
            top.pos += n;
            filled += n;
            if top.remaining().is_empty() {
                self.pushed.pop();
            }
        }

        if filled > 0 {
            return Ok(filled);
        }
        self.inner.read(buf)
    }
}
