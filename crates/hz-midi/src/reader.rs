//! Offset-tracked byte reader
//!
//! Every read, skip and rewind keeps `offset` equal to the absolute position
//! of the next unread byte in the underlying stream. Velocity offsets are
//! sampled from this counter, so it must never drift from the stream.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{ChunkId, MidiResult};

/// Chunk header as stored in the file: ID plus declared payload length
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    pub length: u32,
    /// Absolute offset of the first payload byte
    pub payload_offset: u64,
}

impl ChunkHeader {
    /// Absolute offset one past the declared payload
    #[inline]
    pub fn end_offset(&self) -> u64 {
        self.payload_offset + self.length as u64
    }
}

/// Byte reader over a seekable stream with its own offset counter
#[derive(Debug)]
pub struct ByteReader<R> {
    inner: R,
    offset: u64,
}

impl<R: Read + Seek> ByteReader<R> {
    /// Wrap a stream. The counter starts at 0; call [`rewind`](Self::rewind)
    /// if the stream is not already positioned at its start.
    pub fn new(inner: R) -> Self {
        Self { inner, offset: 0 }
    }

    /// Absolute offset of the next byte to be read
    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    /// Seek to the start of the stream and reset the counter.
    pub fn rewind(&mut self) -> MidiResult<()> {
        self.inner.seek(SeekFrom::Start(0))?;
        self.offset = 0;
        Ok(())
    }

    /// Read one byte.
    pub fn read_byte(&mut self) -> MidiResult<u8> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        self.offset += 1;
        Ok(buf[0])
    }

    /// Read one data byte, masking off the high bit.
    #[inline]
    pub fn read_u7(&mut self) -> MidiResult<u8> {
        Ok(self.read_byte()? & 0x7F)
    }

    pub fn read_u16_be(&mut self) -> MidiResult<u16> {
        let mut buf = [0u8; 2];
        self.inner.read_exact(&mut buf)?;
        self.offset += 2;
        Ok(u16::from_be_bytes(buf))
    }

    pub fn read_u32_be(&mut self) -> MidiResult<u32> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        self.offset += 4;
        Ok(u32::from_be_bytes(buf))
    }

    /// Read a variable-length quantity (7 bits per byte, big-endian,
    /// continuation flag in the high bit).
    ///
    /// Running out of data mid-sequence is an error; a partial value is
    /// never returned.
    pub fn read_var_len(&mut self) -> MidiResult<u32> {
        let mut value: u32 = 0;
        loop {
            let byte = self.read_byte()?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
    }

    /// Advance `count` bytes without reading them.
    pub fn skip(&mut self, count: u64) -> MidiResult<()> {
        if count == 0 {
            return Ok(());
        }
        self.offset += count;
        self.inner.seek(SeekFrom::Start(self.offset))?;
        Ok(())
    }

    /// Read a varint length and skip that many payload bytes.
    pub fn skip_var_len_text(&mut self) -> MidiResult<u32> {
        let len = self.read_var_len()?;
        self.skip(len as u64)?;
        Ok(len)
    }

    /// Step back over the byte that was just read (running status).
    pub fn unread_byte(&mut self) -> MidiResult<()> {
        debug_assert!(self.offset > 0, "unread_byte at stream start");
        self.inner.seek(SeekFrom::Current(-1))?;
        self.offset -= 1;
        Ok(())
    }

    /// Read a 4-byte chunk ID and the 4-byte big-endian length that follows it.
    ///
    /// The length is reported as declared; it is not checked against the
    /// amount of data actually present.
    pub fn read_chunk_header(&mut self) -> MidiResult<ChunkHeader> {
        let mut id = [0u8; 4];
        self.inner.read_exact(&mut id)?;
        self.offset += 4;
        let length = self.read_u32_be()?;
        Ok(ChunkHeader {
            id: ChunkId(id),
            length,
            payload_offset: self.offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(bytes: &[u8]) -> ByteReader<Cursor<Vec<u8>>> {
        ByteReader::new(Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn test_read_byte_advances_offset() {
        let mut r = reader(&[0x90, 0xC5]);
        assert_eq!(r.read_byte().unwrap(), 0x90);
        assert_eq!(r.offset(), 1);
        assert_eq!(r.read_u7().unwrap(), 0x45);
        assert_eq!(r.offset(), 2);
        assert!(r.read_byte().unwrap_err().is_end_of_stream());
        assert_eq!(r.offset(), 2);
    }

    #[test]
    fn test_var_len_values() {
        let cases: &[(&[u8], u32)] = &[
            (&[0x00], 0),
            (&[0x40], 0x40),
            (&[0x7F], 0x7F),
            (&[0x81, 0x00], 0x80),
            (&[0xC0, 0x00], 0x2000),
            (&[0xFF, 0x7F], 0x3FFF),
            (&[0x81, 0x80, 0x00], 0x4000),
            (&[0xFF, 0xFF, 0xFF, 0x7F], 0x0FFF_FFFF),
        ];
        for (bytes, expected) in cases {
            let mut r = reader(bytes);
            assert_eq!(r.read_var_len().unwrap(), *expected, "bytes {:02X?}", bytes);
            assert_eq!(r.offset(), bytes.len() as u64);
        }
    }

    #[test]
    fn test_var_len_truncated_is_error() {
        let mut r = reader(&[0x81, 0x80]);
        let err = r.read_var_len().unwrap_err();
        assert!(err.is_end_of_stream());
    }

    #[test]
    fn test_unread_byte_rewinds_stream_and_offset() {
        let mut r = reader(&[0x3C, 0x40]);
        assert_eq!(r.read_byte().unwrap(), 0x3C);
        r.unread_byte().unwrap();
        assert_eq!(r.offset(), 0);
        assert_eq!(r.read_byte().unwrap(), 0x3C);
        assert_eq!(r.read_byte().unwrap(), 0x40);
    }

    #[test]
    fn test_skip_var_len_text() {
        // len 3, payload "abc", then 0x99
        let mut r = reader(&[0x03, b'a', b'b', b'c', 0x99]);
        assert_eq!(r.skip_var_len_text().unwrap(), 3);
        assert_eq!(r.offset(), 4);
        assert_eq!(r.read_byte().unwrap(), 0x99);
    }

    #[test]
    fn test_chunk_header() {
        let mut r = reader(&[b'M', b'T', b'r', b'k', 0x00, 0x00, 0x01, 0x02, 0xAA]);
        let header = r.read_chunk_header().unwrap();
        assert_eq!(header.id, ChunkId::TRACK);
        assert_eq!(header.length, 0x0102);
        assert_eq!(header.payload_offset, 8);
        assert_eq!(header.end_offset(), 8 + 0x0102);
        assert_eq!(r.offset(), 8);
    }

    #[test]
    fn test_rewind_resets_offset() {
        let mut r = reader(&[1, 2, 3]);
        r.skip(2).unwrap();
        assert_eq!(r.offset(), 2);
        r.rewind().unwrap();
        assert_eq!(r.offset(), 0);
        assert_eq!(r.read_byte().unwrap(), 1);
    }
}
