// Dialect configuration and the element-type abstraction
//
// The engine is generic over the element type: UTF-8 bytes (u8) and UTF-16
// code units (u16). The sealed `Token` trait carries the two operations the
// element type actually changes: byte-order-mark probing and the 16-lane
// equality bitmask the vectorized paths are built on.
//
// ## Stabilization-safe API subset (std::simd)
//
// We use only: Simd::from_slice, splat, simd_eq, to_bitmask, bitwise ops.
// These are the most stable parts of portable_simd. We avoid: swizzle,
// scatter, gather, and any SIMD shuffles.

use std::simd::prelude::*;

use crate::error::{Error, Result};

/// SIMD block size in lanes, for both element types.
pub const LANES: usize = 16;

/// Lower 16 bits of a lane bitmask.
pub(crate) const MASK_16: u64 = (1u64 << 16) - 1;

mod sealed {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
}

/// Element type the engine operates on: `u8` for UTF-8 byte streams,
/// `u16` for UTF-16 text. Sealed; not implementable outside the crate.
pub trait Token:
    sealed::Sealed + Copy + Eq + Default + Send + Sync + std::fmt::Debug + 'static
{
    /// Convert an ASCII-range character to an element.
    fn from_char(c: char) -> Self;

    /// Length of a recognized byte-order mark at the start of `data`.
    fn bom_len(data: &[Self]) -> usize;

    /// Bitmask of lanes in `block` equal to `needle`.
    /// `block` must be exactly `LANES` elements long.
    fn eq_bitmask(block: &[Self], needle: Self) -> u64;
}

impl Token for u8 {
    #[inline]
    fn from_char(c: char) -> u8 {
        debug_assert!(c.is_ascii());
        c as u8
    }

    #[inline]
    fn bom_len(data: &[u8]) -> usize {
        // UTF-8 BOM: EF BB BF
        if data.starts_with(&[0xEF, 0xBB, 0xBF]) {
            3
        } else {
            0
        }
    }

    #[inline]
    fn eq_bitmask(block: &[u8], needle: u8) -> u64 {
        let chunk = Simd::<u8, LANES>::from_slice(block);
        chunk.simd_eq(Simd::splat(needle)).to_bitmask() & MASK_16
    }
}

impl Token for u16 {
    #[inline]
    fn from_char(c: char) -> u16 {
        debug_assert!(c.is_ascii());
        c as u16
    }

    #[inline]
    fn bom_len(_data: &[u16]) -> usize {
        // UTF-16 sources are already decoded code units; no preamble handling
        0
    }

    #[inline]
    fn eq_bitmask(block: &[u16], needle: u16) -> u64 {
        let chunk = Simd::<u16, LANES>::from_slice(block);
        chunk.simd_eq(Simd::splat(needle)).to_bitmask() & MASK_16
    }
}

// ---------------------------------------------------------------------------
// Dialect
// ---------------------------------------------------------------------------

/// Record terminator mode.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum Newline {
    /// Only `\n` terminates a record; `\r` is ordinary data.
    Lf,
    /// `\r\n` is a two-element terminator; a bare `\r` is ordinary data.
    #[default]
    Crlf,
}

/// CSV dialect: delimiter, quote, optional distinct escape, newline mode,
/// and extra elements that force quoting on the write side.
#[derive(Clone, Debug)]
pub struct Dialect<T: Token> {
    pub delimiter: T,
    pub quote: T,
    /// Distinct escape element (Unix-style dialects). `None` means doubled
    /// quotes (RFC 4180).
    pub escape: Option<T>,
    pub newline: Newline,
    /// Extra elements that force a written field to be quoted.
    pub quoting_triggers: Vec<T>,
}

impl<T: Token> Default for Dialect<T> {
    fn default() -> Self {
        Dialect {
            delimiter: T::from_char(','),
            quote: T::from_char('"'),
            escape: None,
            newline: Newline::default(),
            quoting_triggers: Vec::new(),
        }
    }
}

impl<T: Token> Dialect<T> {
    #[inline]
    pub(crate) fn lf(&self) -> T {
        T::from_char('\n')
    }

    #[inline]
    pub(crate) fn cr(&self) -> T {
        T::from_char('\r')
    }

    /// Validate the configuration. Called by the reader constructors.
    pub fn validate(&self) -> Result<()> {
        let lf = self.lf();
        let cr = self.cr();

        if self.delimiter == self.quote {
            return Err(Error::Dialect("delimiter and quote must differ"));
        }
        if self.delimiter == lf || self.delimiter == cr || self.quote == lf || self.quote == cr {
            return Err(Error::Dialect("delimiter and quote must not be newline elements"));
        }
        if let Some(escape) = self.escape {
            if escape == self.delimiter || escape == self.quote {
                return Err(Error::Dialect("escape must differ from delimiter and quote"));
            }
            if escape == lf || escape == cr {
                return Err(Error::Dialect("escape must not be a newline element"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_bitmask_u8() {
        let block = b"a,b,c,d,e,f,g,h!";
        assert_eq!(block.len(), LANES);
        let mask = u8::eq_bitmask(block, b',');
        assert_eq!(mask, 0b0010_1010_1010_1010);
    }

    #[test]
    fn test_eq_bitmask_u16() {
        let block: Vec<u16> = "a,b,c,d,e,f,g,h!".encode_utf16().collect();
        assert_eq!(block.len(), LANES);
        let mask = u16::eq_bitmask(&block, u16::from_char(','));
        assert_eq!(mask, 0b0010_1010_1010_1010);
    }

    #[test]
    fn test_bom_len() {
        assert_eq!(u8::bom_len(&[0xEF, 0xBB, 0xBF, b'a']), 3);
        assert_eq!(u8::bom_len(b"abc"), 0);
        assert_eq!(u8::bom_len(&[0xEF, 0xBB]), 0);
        assert_eq!(u16::bom_len(&[0xFEFF, b'a' as u16]), 0);
    }

    #[test]
    fn test_validate_rejects_conflicts() {
        let mut dialect = Dialect::<u8>::default();
        assert!(dialect.validate().is_ok());

        dialect.quote = b',';
        assert!(dialect.validate().is_err());

        dialect = Dialect::default();
        dialect.delimiter = b'\n';
        assert!(dialect.validate().is_err());

        dialect = Dialect::default();
        dialect.escape = Some(b'"');
        assert!(dialect.validate().is_err());

        dialect = Dialect::default();
        dialect.escape = Some(b'\\');
        assert!(dialect.validate().is_ok());
    }
}
