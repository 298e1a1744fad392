//! Framing of the compiled lexicon that `namespace-lexicon` embeds.
//!
//! A lexicon blob is [`LEXICON_MAGIC`], the little-endian [`FORMAT_VERSION`]
//! and then the postcard encoding of an [`ExpandedLexicon`](crate::ExpandedLexicon).

use thiserror::Error;

pub const LEXICON_MAGIC: [u8; 8] = *b"NSLEXICN";

/// Bumped whenever [`ExpandedLexicon`](crate::ExpandedLexicon) changes shape.
pub const FORMAT_VERSION: u32 = 1;

pub const HEADER_LEN: usize = LEXICON_MAGIC.len() + size_of::<u32>();

/// Why a byte slice is not a lexicon blob this crate can read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BlobError {
	#[error("lexicon blob is {len} bytes, shorter than its header")]
	Truncated { len: usize },

	#[error("not a lexicon blob")]
	NotALexicon,

	#[error("lexicon blob has format {found}, expected {FORMAT_VERSION}")]
	Format { found: u32 },
}

/// The header every lexicon blob starts with.
pub fn lexicon_header() -> [u8; HEADER_LEN] {
	let mut header = [0; HEADER_LEN];
	let (magic, version) = header.split_at_mut(LEXICON_MAGIC.len());
	magic.copy_from_slice(&LEXICON_MAGIC);
	version.copy_from_slice(&FORMAT_VERSION.to_le_bytes());
	header
}

/// Checks the header of `blob` and returns the encoded lexicon after it.
pub fn lexicon_payload(blob: &[u8]) -> Result<&[u8], BlobError> {
	let truncated = BlobError::Truncated { len: blob.len() };
	let (magic, rest) = blob.split_first_chunk::<8>().ok_or(truncated)?;
	if *magic != LEXICON_MAGIC {
		return Err(BlobError::NotALexicon);
	}
	let (version, payload) = rest.split_first_chunk::<4>().ok_or(truncated)?;
	match u32::from_le_bytes(*version) {
		FORMAT_VERSION => Ok(payload),
		found => Err(BlobError::Format { found }),
	}
}
