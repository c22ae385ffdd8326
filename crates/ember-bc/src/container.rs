//! Chunked object container framing.
//!
//! ```text
//! object = header? chunk*
//! chunk  = tag[4] length:u32le payload[length]
//! ```
//!
//! Chunks with an empty payload are never written.

/// Little-endian scalar writers for byte buffers.
pub trait PutBytes {
    fn put_u8(&mut self, v: u8);
    fn put_u16(&mut self, v: u16);
    fn put_i16(&mut self, v: i16);
    fn put_u32(&mut self, v: u32);
    /// Bytes of `s` followed by a NUL.
    fn put_cstr(&mut self, s: &str);
}

impl PutBytes for Vec<u8> {
    fn put_u8(&mut self, v: u8) {
        self.push(v);
    }

    fn put_u16(&mut self, v: u16) {
        self.extend_from_slice(&v.to_le_bytes());
    }

    fn put_i16(&mut self, v: i16) {
        self.extend_from_slice(&v.to_le_bytes());
    }

    fn put_u32(&mut self, v: u32) {
        self.extend_from_slice(&v.to_le_bytes());
    }

    fn put_cstr(&mut self, s: &str) {
        self.extend_from_slice(s.as_bytes());
        self.push(0);
    }
}

/// One tagged section of the object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub tag: [u8; 4],
    pub payload: Vec<u8>,
}

impl Chunk {
    pub fn new(tag: &[u8; 4]) -> Self {
        Self {
            tag: *tag,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(tag: &[u8; 4], payload: Vec<u8>) -> Self {
        Self { tag: *tag, payload }
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    pub fn tag_str(&self) -> &str {
        std::str::from_utf8(&self.tag).unwrap_or("????")
    }
}

/// Assembles an object from an optional header and a chunk sequence.
#[derive(Debug, Default)]
pub struct ObjectWriter {
    out: Vec<u8>,
}

impl ObjectWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&mut self, bytes: &[u8]) -> &mut Self {
        self.out.extend_from_slice(bytes);
        self
    }

    /// Append a chunk, or nothing if its payload is empty.
    pub fn chunk(&mut self, chunk: &Chunk) -> &mut Self {
        if !chunk.is_empty() {
            self.out.extend_from_slice(&chunk.tag);
            self.out.put_u32(chunk.payload.len() as u32);
            self.out.extend_from_slice(&chunk.payload);
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.out
    }
}

/// Split an object back into its chunks, skipping `header_len` bytes.
/// Returns `None` on truncated input.
pub fn read_chunks(bytes: &[u8], header_len: usize) -> Option<Vec<Chunk>> {
    let mut rest = bytes.get(header_len..)?;
    let mut chunks = Vec::new();
    while !rest.is_empty() {
        let tag: [u8; 4] = rest.get(..4)?.try_into().ok()?;
        let len = u32::from_le_bytes(rest.get(4..8)?.try_into().ok()?) as usize;
        let payload = rest.get(8..8 + len)?.to_vec();
        chunks.push(Chunk { tag, payload });
        rest = &rest[8 + len..];
    }
    Some(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_bytes_little_endian() {
        let mut b = Vec::new();
        b.put_u32(0x0403_0201);
        b.put_u16(0x0605);
        b.put_i16(-1);
        b.put_u8(7);
        b.put_cstr("ok");
        assert_eq!(b, vec![1, 2, 3, 4, 5, 6, 0xFF, 0xFF, 7, b'o', b'k', 0]);
    }

    #[test]
    fn test_empty_chunk_omitted() {
        let mut w = ObjectWriter::new();
        w.chunk(&Chunk::new(b"ARAY"))
            .chunk(&Chunk::with_payload(b"CODE", vec![1, 2, 3, 4]));
        let bytes = w.finish();
        assert_eq!(bytes.len(), 12);
        assert_eq!(&bytes[..4], b"CODE");
    }

    #[test]
    fn test_read_back() {
        let mut w = ObjectWriter::new();
        w.header(b"HDR!")
            .chunk(&Chunk::with_payload(b"FUNC", vec![9; 8]))
            .chunk(&Chunk::with_payload(b"STRL", vec![1]));
        let chunks = read_chunks(&w.finish(), 4).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].tag_str(), "FUNC");
        assert_eq!(chunks[1].payload, vec![1]);
    }

    #[test]
    fn test_read_truncated() {
        assert!(read_chunks(b"CODE\x08\x00\x00\x00\x01", 0).is_none());
    }
}
