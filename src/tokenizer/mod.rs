// Tokenizers and packed field metadata
//
// Both tokenizers write `FieldMeta` entries: one packed 8-byte word per
// field, positioned relative to the tokenized window. The vectorized
// tokenizer handles doubled-quote dialects; dialects with a distinct escape
// element always use the scalar tokenizer.

pub mod record;
pub mod scalar;
pub mod simd;

pub use record::{Record, RecordBuffer, Records};

/// Packed per-field metadata.
///
/// Bit layout (low to high):
/// - bits 0..31: end position of the field content (window-relative)
/// - bit 31: end-of-record flag
/// - bits 32..34: next-field start offset (1 for a delimiter, 1 or 2 for a
///   record terminator, 0 for a shadow terminator at end of data)
/// - bit 34: field was tokenized under a distinct-escape dialect
/// - bits 35..64: special-element count (quotes, or escapes in escape mode)
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldMeta(u64);

const END_MASK: u64 = 0x7FFF_FFFF;
const RECORD_END_FLAG: u64 = 1 << 31;
const OFFSET_SHIFT: u32 = 32;
const OFFSET_MASK: u64 = 0b11 << OFFSET_SHIFT;
const ESCAPE_FLAG: u64 = 1 << 34;
const SPECIAL_SHIFT: u32 = 35;

impl FieldMeta {
    /// Sentinel occupying slot 0 of a record buffer: `next_start` is 0.
    pub const START_OF_DATA: FieldMeta = FieldMeta(0);

    /// A field ended by a delimiter at `end`.
    #[inline]
    pub fn field(end: usize, special: u64) -> FieldMeta {
        FieldMeta(end as u64 | (1 << OFFSET_SHIFT) | (special << SPECIAL_SHIFT))
    }

    /// A field ending its record. `newline_len` is 1 for `\n`, 2 for `\r\n`
    /// and 0 for a shadow terminator at end of data.
    #[inline]
    pub fn record_end(end: usize, special: u64, newline_len: usize) -> FieldMeta {
        FieldMeta(
            end as u64
                | RECORD_END_FLAG
                | ((newline_len as u64) << OFFSET_SHIFT)
                | (special << SPECIAL_SHIFT),
        )
    }

    /// Mark the field as tokenized under a distinct-escape dialect.
    #[inline]
    pub fn with_escape(self) -> FieldMeta {
        FieldMeta(self.0 | ESCAPE_FLAG)
    }

    /// End position of the field content, excluding the terminator.
    #[inline]
    pub fn end(self) -> usize {
        (self.0 & END_MASK) as usize
    }

    #[inline]
    pub fn is_record_end(self) -> bool {
        self.0 & RECORD_END_FLAG != 0
    }

    /// Start position of the next field.
    #[inline]
    pub fn next_start(self) -> usize {
        self.end() + ((self.0 & OFFSET_MASK) >> OFFSET_SHIFT) as usize
    }

    /// Number of elements the unescape transform has to look at.
    #[inline]
    pub fn special_count(self) -> usize {
        (self.0 >> SPECIAL_SHIFT) as usize
    }

    #[inline]
    pub fn is_escape(self) -> bool {
        self.0 & ESCAPE_FLAG != 0
    }
}

impl std::fmt::Debug for FieldMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldMeta")
            .field("end", &self.end())
            .field("record_end", &self.is_record_end())
            .field("next_start", &self.next_start())
            .field("special", &self.special_count())
            .field("escape", &self.is_escape())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_packing() {
        let meta = FieldMeta::field(1234, 3);
        assert_eq!(meta.end(), 1234);
        assert_eq!(meta.next_start(), 1235);
        assert_eq!(meta.special_count(), 3);
        assert!(!meta.is_record_end());
        assert!(!meta.is_escape());
    }

    #[test]
    fn test_record_end_packing() {
        let crlf = FieldMeta::record_end(10, 0, 2);
        assert!(crlf.is_record_end());
        assert_eq!(crlf.end(), 10);
        assert_eq!(crlf.next_start(), 12);

        let shadow = FieldMeta::record_end(7, 2, 0);
        assert!(shadow.is_record_end());
        assert_eq!(shadow.next_start(), 7);
        assert_eq!(shadow.special_count(), 2);
    }

    #[test]
    fn test_start_of_data_sentinel() {
        assert_eq!(FieldMeta::START_OF_DATA.next_start(), 0);
        assert!(!FieldMeta::START_OF_DATA.is_record_end());
    }

    #[test]
    fn test_escape_flag() {
        let meta = FieldMeta::field(5, 1).with_escape();
        assert!(meta.is_escape());
        assert_eq!(meta.end(), 5);
        assert_eq!(meta.special_count(), 1);
    }
}
