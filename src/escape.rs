// Escaping engine — needs-quoting scans, escape/unescape transforms
//
// The write side scans each field once (`QuoteScan`): a vectorized pass
// produces both the needs-quoting verdict and a bitmask of elements that
// must be doubled, so the transform never rescans. The transform copies
// backward so a field can be escaped in place at the front of a larger
// buffer; when the destination is too short, the escaped tail spills into
// an overflow buffer.
//
// The read side collapses doubled quotes (or strips distinct escapes),
// borrowing when the field needs no rewrite.

use std::borrow::Cow;

use crate::dialect::{Dialect, Newline, Token, LANES};
use crate::error::Result;
use crate::io::{BufferWriter, Sink};
use crate::tokenizer::FieldMeta;

// ==========================================================================
// Scanning
// ==========================================================================

/// Result of scanning a field on the write side. Reusable across fields to
/// keep the mask allocation.
#[derive(Default)]
pub struct QuoteScan {
    /// Field contains a delimiter, quote, CR/LF or a configured trigger.
    pub required: bool,
    /// Elements the transform must double (quotes; escapes too in escape
    /// mode).
    pub special: usize,
    masks: Vec<u32>,
    len: usize,
}

impl QuoteScan {
    pub fn scan<T: Token>(field: &[T], dialect: &Dialect<T>) -> QuoteScan {
        let mut scan = QuoteScan::default();
        scan.rescan(field, dialect);
        scan
    }

    /// Rescan a new field, reusing the mask buffer.
    pub fn rescan<T: Token>(&mut self, field: &[T], dialect: &Dialect<T>) {
        self.masks.clear();
        self.masks.resize(field.len().div_ceil(32), 0);
        self.len = field.len();
        self.special = 0;

        let quote = dialect.quote;
        let lf = dialect.lf();
        let cr = dialect.cr();

        let mut hits: u64 = 0;
        let mut pos = 0;

        while pos + LANES <= field.len() {
            let block = &field[pos..pos + LANES];

            let mut special_bits = T::eq_bitmask(block, quote);
            if let Some(escape) = dialect.escape {
                special_bits |= T::eq_bitmask(block, escape);
            }

            hits |= special_bits
                | T::eq_bitmask(block, dialect.delimiter)
                | T::eq_bitmask(block, lf)
                | T::eq_bitmask(block, cr);
            for &trigger in &dialect.quoting_triggers {
                hits |= T::eq_bitmask(block, trigger);
            }

            self.special += special_bits.count_ones() as usize;
            self.masks[pos / 32] |= (special_bits as u32) << (pos % 32);
            pos += LANES;
        }

        // Scalar tail
        while pos < field.len() {
            let t = field[pos];
            let is_special = t == quote || dialect.escape == Some(t);
            if is_special {
                self.special += 1;
                self.masks[pos / 32] |= 1 << (pos % 32);
            }
            if is_special
                || t == dialect.delimiter
                || t == lf
                || t == cr
                || dialect.quoting_triggers.contains(&t)
            {
                hits |= 1;
            }
            pos += 1;
        }

        self.required = hits != 0;
    }

    /// Whether the element at `index` must be doubled.
    #[inline]
    pub fn is_special(&self, index: usize) -> bool {
        self.masks[index / 32] >> (index % 32) & 1 != 0
    }

    /// Escaped length of the scanned field: content, doubles and the
    /// wrapping quotes.
    #[inline]
    pub fn escaped_len(&self) -> usize {
        self.len + self.special + 2
    }
}

// ==========================================================================
// Escape transforms (backward, overlap-tolerant)
// ==========================================================================

/// Escape the field occupying `buf[..src_len]` into the whole of `buf`,
/// which must be exactly `src_len + special + 2` elements. Walks backward,
/// so the unescaped field and the escaped output share the buffer start.
pub fn escape_in_place<T: Token>(
    buf: &mut [T],
    src_len: usize,
    quote: T,
    escape: Option<T>,
    special: usize,
) {
    debug_assert_eq!(buf.len(), src_len + special + 2);
    let inserted = escape.unwrap_or(quote);

    let mut write = buf.len() - 1;
    buf[write] = quote;

    let mut remaining = special;
    let mut read = src_len;
    while remaining > 0 {
        read -= 1;
        let t = buf[read];
        write -= 1;
        buf[write] = t;
        if t == quote || escape == Some(t) {
            write -= 1;
            buf[write] = inserted;
            remaining -= 1;
        }
    }

    // everything before the last special shifts by exactly one: the
    // opening quote
    buf.copy_within(..read, 1);
    buf[0] = quote;
}

/// Escape `src` into a disjoint `dst` of exactly `src.len() + special + 2`.
pub fn escape_field<T: Token>(
    src: &[T],
    dst: &mut [T],
    quote: T,
    escape: Option<T>,
    special: usize,
) {
    debug_assert_eq!(dst.len(), src.len() + special + 2);
    dst[..src.len()].copy_from_slice(src);
    escape_in_place(dst, src.len(), quote, escape, special);
}

/// Escape using a previous [`QuoteScan`] so no element comparisons are
/// repeated; the scan's quote mask drives the doubling.
pub fn escape_from_scan<T: Token>(
    src: &[T],
    dst: &mut [T],
    scan: &QuoteScan,
    quote: T,
    escape: Option<T>,
) {
    debug_assert_eq!(dst.len(), src.len() + scan.special + 2);
    let inserted = escape.unwrap_or(quote);

    let mut write = dst.len() - 1;
    dst[write] = quote;

    let mut remaining = scan.special;
    let mut read = src.len();
    while read > 0 {
        read -= 1;
        write -= 1;
        dst[write] = src[read];
        if remaining > 0 && scan.is_special(read) {
            write -= 1;
            dst[write] = inserted;
            remaining -= 1;
        }
    }
    dst[0] = quote;
}

/// Escape `src` into a too-short `dst`: the head of the escaped form fills
/// `dst` completely and the tail that does not fit is appended to
/// `overflow`, in order.
pub fn escape_with_overflow<T: Token>(
    src: &[T],
    dst: &mut [T],
    overflow: &mut Vec<T>,
    quote: T,
    escape: Option<T>,
    special: usize,
) {
    let required = src.len() + special + 2;
    debug_assert!(dst.len() < required);
    let inserted = escape.unwrap_or(quote);

    let overflow_start = overflow.len();
    overflow.resize(overflow_start + required - dst.len(), quote);
    let spill = &mut overflow[overflow_start..];

    #[inline]
    fn put<T: Copy>(dst: &mut [T], spill: &mut [T], index: usize, value: T) {
        if index < dst.len() {
            dst[index] = value;
        } else {
            spill[index - dst.len()] = value;
        }
    }

    let mut write = required - 1;
    put(dst, spill, write, quote);

    let mut remaining = special;
    let mut read = src.len();
    while remaining > 0 {
        read -= 1;
        let t = src[read];
        write -= 1;
        put(dst, spill, write, t);
        if t == quote || escape == Some(t) {
            write -= 1;
            put(dst, spill, write, inserted);
            remaining -= 1;
        }
    }
    while read > 0 {
        read -= 1;
        write -= 1;
        put(dst, spill, write, src[read]);
    }
    write -= 1;
    put(dst, spill, write, quote);
    debug_assert_eq!(write, 0);
}

// ==========================================================================
// Unescaping
// ==========================================================================

/// Collapse doubled quotes (or strip distinct escapes) from `src` into
/// `dst`. `src` excludes the wrapping quotes. Returns elements written.
pub fn unescape_field<T: Token>(src: &[T], dst: &mut [T], quote: T, escape: Option<T>) -> usize {
    let mut read = 0;
    let mut write = 0;
    match escape {
        None => {
            while read < src.len() {
                let t = src[read];
                dst[write] = t;
                write += 1;
                read += 1;
                if t == quote && read < src.len() && src[read] == quote {
                    read += 1;
                }
            }
        }
        Some(escape) => {
            while read < src.len() {
                if src[read] == escape && read + 1 < src.len() {
                    read += 1;
                }
                dst[write] = src[read];
                write += 1;
                read += 1;
            }
        }
    }
    write
}

/// Extract the logical content of a raw field span, borrowing when no
/// rewrite is needed: wrapping quotes are stripped per the meta, doubled
/// quotes collapsed, distinct escapes removed.
pub fn unescape_cow<'a, T: Token>(
    field: &'a [T],
    meta: FieldMeta,
    quote: T,
    escape: Option<T>,
) -> Cow<'a, [T]> {
    // In doubled-quote mode the special count includes the wrapping quotes,
    // so zero means there is nothing to strip. In escape mode only escapes
    // are counted and the wrap check has to be structural.
    if escape.is_none() && meta.special_count() == 0 {
        return Cow::Borrowed(field);
    }

    // Not cleanly wrapped in quotes: return as-is (stray quotes are data)
    let wrapped =
        field.len() >= 2 && field[0] == quote && field[field.len() - 1] == quote;
    if !wrapped {
        return Cow::Borrowed(field);
    }
    let inner = &field[1..field.len() - 1];

    match escape {
        None => {
            // the wrapping pair accounts for two specials
            if meta.special_count() <= 2 {
                return Cow::Borrowed(inner);
            }
        }
        Some(_) => {
            if meta.special_count() == 0 {
                return Cow::Borrowed(inner);
            }
        }
    }

    let mut out = vec![T::default(); inner.len()];
    let n = unescape_field(inner, &mut out, quote, escape);
    out.truncate(n);
    Cow::Owned(out)
}

// ==========================================================================
// Record writing
// ==========================================================================

/// Write one record through the writer: fields separated by the delimiter,
/// quoted and escaped as needed, terminated by the dialect newline. Drains
/// the writer whenever it crosses the high-water mark.
pub fn write_record<T: Token, S: Sink<T>>(
    writer: &mut BufferWriter<T, S>,
    dialect: &Dialect<T>,
    scan: &mut QuoteScan,
    fields: &[&[T]],
) -> Result<()> {
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            let buf = writer.get_buffer(1)?;
            buf[0] = dialect.delimiter;
            writer.advance(1)?;
        }

        scan.rescan(field, dialect);
        if scan.required {
            let needed = scan.escaped_len();
            let buf = writer.get_buffer(needed)?;
            escape_from_scan(field, &mut buf[..needed], scan, dialect.quote, dialect.escape);
            writer.advance(needed)?;
        } else if !field.is_empty() {
            let buf = writer.get_buffer(field.len())?;
            buf[..field.len()].copy_from_slice(field);
            writer.advance(field.len())?;
        }

        if writer.needs_drain() {
            writer.drain()?;
        }
    }

    match dialect.newline {
        Newline::Crlf => {
            let buf = writer.get_buffer(2)?;
            buf[0] = dialect.cr();
            buf[1] = dialect.lf();
            writer.advance(2)?;
        }
        Newline::Lf => {
            let buf = writer.get_buffer(1)?;
            buf[0] = dialect.lf();
            writer.advance(1)?;
        }
    }
    if writer.needs_drain() {
        writer.drain()?;
    }
    Ok(())
}
