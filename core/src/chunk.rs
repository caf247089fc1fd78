//! Chunk container, header decoding, and the symmetric chunk builder.
//!
//! A chunk is laid out little-endian throughout: a `u32` static-memory
//! size, a `u16` literal count, the literal records (`u8` size byte plus
//! that many payload bytes), then the opcode stream. There is no magic
//! number and no trailing sentinel; execution stops at the chunk end.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::dispatch::Opcode;
use crate::value::ValueType;

/// Byte offset into a chunk. Chunks are capped at 4 GiB.
pub type ChunkPos = u32;

/// Immutable program bytes, shared read-only by every run thread.
#[derive(Debug)]
pub struct Chunk {
    bytes: Vec<u8>,
}

impl Chunk {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    #[inline]
    pub fn len(&self) -> ChunkPos {
        self.bytes.len() as ChunkPos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn byte(&self, pos: ChunkPos) -> u8 {
        self.bytes[pos as usize]
    }
}

/// Decoded chunk header: the literal pool, the static-memory size, and the
/// position of the first opcode byte.
#[derive(Debug)]
pub struct ChunkImage {
    pub chunk: Arc<Chunk>,
    pub literals: Vec<u64>,
    pub static_size: u32,
    pub code_start: ChunkPos,
}

impl ChunkImage {
    /// Read the header off the front of `bytes`. Truncated input is an
    /// error; literal payloads are decoded little-endian into 64-bit cells.
    /// A size byte outside {1, 2, 4, 8} yields a zero cell and consumes no
    /// payload — the upstream compiler is trusted not to emit one.
    pub fn decode(bytes: Vec<u8>) -> Result<Self> {
        let mut cursor = 0usize;

        let static_size = read_u32(&bytes, &mut cursor).context("chunk header: static memory size")?;
        let literal_count = read_u16(&bytes, &mut cursor).context("chunk header: literal count")?;

        let mut literals = Vec::with_capacity(literal_count as usize);
        for index in 0..literal_count {
            let cell = read_literal(&bytes, &mut cursor).with_context(|| format!("literal record {index}"))?;
            literals.push(cell);
        }

        Ok(Self {
            chunk: Arc::new(Chunk::new(bytes)),
            literals,
            static_size,
            code_start: cursor as ChunkPos,
        })
    }
}

fn read_literal(bytes: &[u8], cursor: &mut usize) -> Result<u64> {
    let size = read_u8(bytes, cursor)?;
    let cell = match size {
        1 => read_u8(bytes, cursor)? as u64,
        2 => read_u16(bytes, cursor)? as u64,
        4 => read_u32(bytes, cursor)? as u64,
        8 => read_u64(bytes, cursor)?,
        _ => 0,
    };
    Ok(cell)
}

fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    if *cursor >= bytes.len() {
        bail!("unexpected end of chunk while reading u8");
    }
    let value = bytes[*cursor];
    *cursor += 1;
    Ok(value)
}

fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    if *cursor + 2 > bytes.len() {
        bail!("unexpected end of chunk while reading u16");
    }
    let mut buf = [0u8; 2];
    buf.copy_from_slice(&bytes[*cursor..*cursor + 2]);
    *cursor += 2;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    if *cursor + 4 > bytes.len() {
        bail!("unexpected end of chunk while reading u32");
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&bytes[*cursor..*cursor + 4]);
    *cursor += 4;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(bytes: &[u8], cursor: &mut usize) -> Result<u64> {
    if *cursor + 8 > bytes.len() {
        bail!("unexpected end of chunk while reading u64");
    }
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[*cursor..*cursor + 8]);
    *cursor += 8;
    Ok(u64::from_le_bytes(buf))
}

/// Emits the chunk layout symmetrically with [`ChunkImage::decode`].
///
/// This is test and bench tooling, not a compiler: callers lay out code by
/// hand and compute jump offsets themselves, with [`ChunkBuilder::position`]
/// and [`ChunkBuilder::patch_i32`] to help. All literals must be added
/// before any code so positions stay stable.
#[derive(Debug, Default)]
pub struct ChunkBuilder {
    static_size: u32,
    literal_count: u16,
    literals: Vec<u8>,
    code: Vec<u8>,
}

impl ChunkBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn static_size(&mut self, size: u32) -> &mut Self {
        self.static_size = size;
        self
    }

    pub fn literal_u8(&mut self, value: u8) -> &mut Self {
        self.literals.push(1);
        self.literals.push(value);
        self.literal_count += 1;
        self
    }

    pub fn literal_u16(&mut self, value: u16) -> &mut Self {
        self.literals.push(2);
        self.literals.extend_from_slice(&value.to_le_bytes());
        self.literal_count += 1;
        self
    }

    pub fn literal_u32(&mut self, value: u32) -> &mut Self {
        self.literals.push(4);
        self.literals.extend_from_slice(&value.to_le_bytes());
        self.literal_count += 1;
        self
    }

    pub fn literal_u64(&mut self, value: u64) -> &mut Self {
        self.literals.push(8);
        self.literals.extend_from_slice(&value.to_le_bytes());
        self.literal_count += 1;
        self
    }

    pub fn literal_i32(&mut self, value: i32) -> &mut Self {
        self.literal_u32(value as u32)
    }

    pub fn literal_f32(&mut self, value: f32) -> &mut Self {
        self.literal_u32(value.to_bits())
    }

    pub fn literal_f64(&mut self, value: f64) -> &mut Self {
        self.literal_u64(value.to_bits())
    }

    pub fn op(&mut self, op: Opcode) -> &mut Self {
        self.code.push(op as u8);
        self
    }

    pub fn ty(&mut self, ty: ValueType) -> &mut Self {
        self.code.push(ty as u8);
        self
    }

    pub fn reg(&mut self, reg: u8) -> &mut Self {
        self.code.push(reg);
        self
    }

    pub fn byte(&mut self, value: u8) -> &mut Self {
        self.code.push(value);
        self
    }

    pub fn u16(&mut self, value: u16) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i8(&mut self, value: i8) -> &mut Self {
        self.code.push(value as u8);
        self
    }

    pub fn i16(&mut self, value: i16) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn i32(&mut self, value: i32) -> &mut Self {
        self.code.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Chunk position the next emitted code byte will occupy.
    pub fn position(&self) -> ChunkPos {
        (Self::HEADER_LEN + self.literals.len() + self.code.len()) as ChunkPos
    }

    /// Overwrite four code bytes at an absolute chunk position, for jump
    /// targets that are only known after the target is emitted.
    pub fn patch_i32(&mut self, pos: ChunkPos, value: i32) {
        let start = pos as usize - Self::HEADER_LEN - self.literals.len();
        self.code[start..start + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::HEADER_LEN + self.literals.len() + self.code.len());
        out.extend_from_slice(&self.static_size.to_le_bytes());
        out.extend_from_slice(&self.literal_count.to_le_bytes());
        out.extend_from_slice(&self.literals);
        out.extend_from_slice(&self.code);
        out
    }

    // static size + literal count
    const HEADER_LEN: usize = 6;
}
