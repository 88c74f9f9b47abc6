//! Length-prefixed byte-block framing.
//!
//! A block is a 4-byte big-endian length followed by that many payload
//! bytes. Blocks concatenate freely; [`decode`] peels one off the front and
//! returns the remainder, [`decode_all`] splits a whole concatenation.

use std::io::{self, Read, Write};

/// Size of the length prefix in bytes.
pub const PREFIX_LEN: usize = 4;

/// Decoding failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The input ended before the declared block (or its prefix) did.
    #[error("truncated block: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
}

/// Encodes `block` as a freshly allocated prefix + payload.
///
/// # Panics
///
/// Panics if `block` is longer than `u32::MAX` bytes.
#[must_use]
pub fn encode(block: &[u8]) -> Vec<u8> {
    let mut out = vec![0u8; PREFIX_LEN + block.len()];
    encode_to(block, &mut out);
    out
}

/// Encodes `block` into the front of `out`.
///
/// # Panics
///
/// Panics if `block` is longer than `u32::MAX` bytes or `out` is shorter
/// than `block.len() + PREFIX_LEN`.
pub fn encode_to(block: &[u8], out: &mut [u8]) {
    let len = block_len(block);
    out[..PREFIX_LEN].copy_from_slice(&len.to_be_bytes());
    out[PREFIX_LEN..PREFIX_LEN + block.len()].copy_from_slice(block);
}

/// Encodes each block in order and concatenates the results.
///
/// # Panics
///
/// Panics if any block is longer than `u32::MAX` bytes.
#[must_use]
pub fn encode_all(blocks: &[&[u8]]) -> Vec<u8> {
    let total = blocks.iter().map(|b| PREFIX_LEN + b.len()).sum();
    let mut out = vec![0u8; total];
    let mut at = 0;
    for block in blocks {
        let end = at + PREFIX_LEN + block.len();
        encode_to(block, &mut out[at..end]);
        at = end;
    }
    out
}

/// Writes `block`'s prefix and payload to `out`.
///
/// Returns the total number of bytes written on success.
///
/// # Errors
///
/// Propagates the writer's I/O errors.
///
/// # Panics
///
/// Panics if `block` is longer than `u32::MAX` bytes.
pub fn write_block(out: &mut impl Write, block: &[u8]) -> io::Result<usize> {
    let len = block_len(block);
    out.write_all(&len.to_be_bytes())?;
    out.write_all(block)?;
    Ok(PREFIX_LEN + block.len())
}

/// Reads one block from `input`.
///
/// # Errors
///
/// Propagates the reader's I/O errors; input ending mid-prefix or
/// mid-payload surfaces as [`io::ErrorKind::UnexpectedEof`].
pub fn read_block(input: &mut impl Read) -> io::Result<Vec<u8>> {
    let mut prefix = [0u8; PREFIX_LEN];
    input.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix) as usize;
    let mut block = vec![0u8; len];
    input.read_exact(&mut block)?;
    Ok(block)
}

/// Splits one block off the front of `input`, returning it and the
/// remainder.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if `input` is shorter than the prefix
/// or the length the prefix declares.
pub fn decode(input: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    if input.len() < PREFIX_LEN {
        return Err(CodecError::Truncated {
            need: PREFIX_LEN,
            have: input.len(),
        });
    }
    let mut prefix = [0u8; PREFIX_LEN];
    prefix.copy_from_slice(&input[..PREFIX_LEN]);
    let len = u32::from_be_bytes(prefix) as usize;

    let rest = &input[PREFIX_LEN..];
    if rest.len() < len {
        return Err(CodecError::Truncated {
            need: len,
            have: rest.len(),
        });
    }
    Ok(rest.split_at(len))
}

/// Splits a concatenation of blocks.
///
/// # Errors
///
/// Returns [`CodecError::Truncated`] if the input ends mid-block.
pub fn decode_all(mut input: &[u8]) -> Result<Vec<&[u8]>, CodecError> {
    let mut blocks = Vec::new();
    while !input.is_empty() {
        let (block, rest) = decode(input)?;
        blocks.push(block);
        input = rest;
    }
    Ok(blocks)
}

fn block_len(block: &[u8]) -> u32 {
    u32::try_from(block.len()).expect("block length exceeds u32 range")
}
