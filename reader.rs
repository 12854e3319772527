//! Container reader state machine.
//!
//! ```text
//! Initial ──magic──▶ MagicFound ──Preamble──▶ InHeaderBlocks ──Data──▶ InData ──▶ Finished
//! ```
//!
//! [`AxCryptReader::next_item`] walks the stream one item at a time. Header
//! bytes from the Preamble onward are buffered so the caller can feed them
//! into the authentication tag once it knows the key. The payload itself is
//! obtained once through [`AxCryptReader::data_stream`], which bounds reads
//! to the declared length.

use std::io::{self, Read, Write};

use tracing::{debug, trace};

use crate::blocks::{payload_length, BlockType, HeaderBlock, MAGIC};
use crate::error::{AxCryptError, Result};
use crate::hmac_stream::{Tag, TAG_LEN};
use crate::lookahead::LookAheadStream;

/// Read size while scanning for the magic marker
pub const SCAN_CHUNK: usize = 4096;

/// Upper bound on buffered header bytes
pub const MAX_HEADER_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Initial,
    MagicFound,
    InHeaderBlocks,
    InData,
    Finished,
}

/// One step of the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadItem {
    MagicFound,
    Block(HeaderBlock),
    /// Declared payload length; the payload follows
    Data(u64),
    EndOfStream,
}

pub struct AxCryptReader<R> {
    input: LookAheadStream<R>,
    state: ReaderState,
    header_bytes: Option<Vec<u8>>,
    data_length: Option<u64>,
    payload_remaining: u64,
    payload_taken: bool,
}

impl<R: Read> AxCryptReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            input: LookAheadStream::new(input),
            state: ReaderState::Initial,
            header_bytes: Some(Vec::new()),
            data_length: None,
            payload_remaining: 0,
            payload_taken: false,
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Declared payload length, once the Data block has been read.
    pub fn data_length(&self) -> Option<u64> {
        self.data_length
    }

    pub fn next_item(&mut self) -> Result<ReadItem> {
        match self.state {
            ReaderState::Initial => {
                if !self.find_magic()? {
                    self.state = ReaderState::Finished;
                    return Err(AxCryptError::malformed("magic marker not found"));
                }
                self.state = ReaderState::MagicFound;
                Ok(ReadItem::MagicFound)
            }
            ReaderState::MagicFound | ReaderState::InHeaderBlocks => self.read_block(),
            ReaderState::InData => {
                self.state = ReaderState::Finished;
                Ok(ReadItem::Data(self.data_length.unwrap_or(0)))
            }
            ReaderState::Finished => Ok(ReadItem::EndOfStream),
        }
    }

    /// Scan forward for the magic marker. Memory use stays at one chunk plus
    /// `MAGIC.len() - 1` pushed-back bytes whatever the input size.
    pub fn find_magic(&mut self) -> Result<bool> {
        let mut chunk = vec![0u8; SCAN_CHUNK];
        let mut skipped: u64 = 0;
        loop {
            let filled = fill(&mut self.input, &mut chunk)?;
            if let Some(at) = chunk[..filled]
                .windows(MAGIC.len())
                .position(|window| window == MAGIC)
            {
                self.input.pushback(&chunk[at + MAGIC.len()..filled]);
                debug!(offset = skipped + at as u64, "found magic marker");
                return Ok(true);
            }
            if filled < chunk.len() {
                return Ok(false);
            }
            let keep = MAGIC.len() - 1;
            self.input.pushback(&chunk[filled - keep..filled]);
            skipped += (filled - keep) as u64;
        }
    }

    fn read_block(&mut self) -> Result<ReadItem> {
        let mut length_field = [0u8; 4];
        if !self.input.read_exact_or_eof(&mut length_field)? {
            return Ok(self.truncated());
        }
        let length = payload_length(u32::from_le_bytes(length_field))?;

        let mut tag = [0u8; 1];
        if !self.input.read_exact_or_eof(&mut tag)? {
            return Ok(self.truncated());
        }
        let block_type = BlockType::from_tag(tag[0]);
        match (self.state, block_type) {
            (ReaderState::MagicFound, BlockType::Preamble) => {}
            (ReaderState::MagicFound, other) => {
                return Err(AxCryptError::malformed(format!(
                    "first block must be a Preamble, found {:?}",
                    other
                )));
            }
            (_, BlockType::Preamble) => {
                return Err(AxCryptError::malformed("duplicate Preamble block"));
            }
            _ => {}
        }

        let mut payload = vec![0u8; length];
        if !self.input.read_exact_or_eof(&mut payload)? {
            return Ok(self.truncated());
        }

        if let Some(buffer) = self.header_bytes.as_mut() {
            if buffer.len() + length + 5 > MAX_HEADER_BYTES {
                return Err(AxCryptError::malformed("header section is too large"));
            }
            buffer.extend_from_slice(&length_field);
            buffer.push(tag[0]);
            buffer.extend_from_slice(&payload);
        }

        let block = HeaderBlock::from_raw(tag[0], payload)?;
        trace!(block = ?block.block_type(), length, "read header block");
        self.state = ReaderState::InHeaderBlocks;
        if let HeaderBlock::Data(declared) = block {
            self.data_length = Some(declared);
            self.payload_remaining = declared;
            self.state = ReaderState::InData;
        }
        Ok(ReadItem::Block(block))
    }

    fn truncated(&mut self) -> ReadItem {
        debug!(state = ?self.state, "stream ended inside the header section");
        self.state = ReaderState::Finished;
        ReadItem::EndOfStream
    }

    /// The payload as a bounded stream. Callable once, after the Data block.
    ///
    /// Buffered header bytes are drained into `auth` first, and every payload
    /// byte read is written to it as well.
    pub fn data_stream<'a>(
        &'a mut self,
        auth: Option<&'a mut dyn Write>,
    ) -> Result<DataStream<'a, R>> {
        if self.payload_taken {
            return Err(AxCryptError::usage("payload stream requested twice"));
        }
        if self.data_length.is_none() {
            return Err(AxCryptError::usage(
                "payload stream requested before the Data block was read",
            ));
        }
        let header_bytes = self.header_bytes.take().unwrap_or_default();
        let mut auth = auth;
        if let Some(sink) = auth.as_mut() {
            sink.write_all(&header_bytes)?;
        }
        self.payload_taken = true;
        Ok(DataStream { reader: self, auth })
    }

    /// The trailing authentication tag. Only valid once the payload is consumed.
    pub fn read_tag(&mut self) -> Result<Tag> {
        if !self.payload_taken || self.payload_remaining > 0 {
            return Err(AxCryptError::usage(
                "authentication tag requested before the payload was consumed",
            ));
        }
        let mut tag = [0u8; TAG_LEN];
        if !self.input.read_exact_or_eof(&mut tag)? {
            return Err(AxCryptError::malformed("missing authentication tag"));
        }
        Ok(tag)
    }
}

/// Payload reader limited to the declared length.
pub struct DataStream<'a, R> {
    reader: &'a mut AxCryptReader<R>,
    auth: Option<&'a mut dyn Write>,
}

impl<R: Read> DataStream<'_, R> {
    pub fn remaining(&self) -> u64 {
        self.reader.payload_remaining
    }
}

impl<R: Read> Read for DataStream<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.reader.payload_remaining;
        if remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let want = buf.len().min(usize::try_from(remaining).unwrap_or(usize::MAX));
        let n = self.reader.input.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload ended {} bytes early", remaining),
            ));
        }
        if let Some(sink) = self.auth.as_mut() {
            sink.write_all(&buf[..n])?;
        }
        self.reader.payload_remaining -= n as u64;
        Ok(n)
    }
}

fn fill<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
