// Vectorized tokenizer — prefix-XOR quote detection over 16-lane blocks
//
// Per block: quote bitmask → prefix-XOR parity mask (bit i set iff an odd
// number of quotes precede position i), with a one-bit carry across blocks.
// Delimiter and newline bitmasks are filtered through the parity mask, then
// boundaries are emitted in ascending order via bit extraction.
//
// The tokenizer only understands quote states it can attribute: a field with
// quotes must be cleanly wrapped in them (even count, quotes at both edges).
// Anything else — an odd count at a boundary, or quotes in the middle of an
// unquoted field — returns `ABANDON` and the caller retokenizes the window
// with the scalar tokenizer. Only full blocks are processed; the tail past
// the last full block is left for the caller.

use crate::dialect::{Dialect, Newline, Token, LANES, MASK_16};

use super::FieldMeta;

/// Returned when the window contains a quote state the bitmask algorithm
/// cannot attribute. The caller downgrades to the scalar tokenizer.
pub const ABANDON: isize = -1;

/// Prefix-XOR via shift-and-xor cascade (works for 16 bits within a u64,
/// since upper bits are zero). ~6 dependent XOR+shift ops, comparable to a
/// CLMUL instruction, and keeps the tokenizer free of `unsafe`.
#[inline]
fn prefix_xor(mut x: u64) -> u64 {
    x ^= x << 1;
    x ^= x << 2;
    x ^= x << 4;
    x ^= x << 8;
    x ^= x << 16;
    x ^= x << 32;
    x
}

/// Tokenize full 16-lane blocks of `data`, writing field metadata into
/// `dst`. Returns the number of metas written, or `ABANDON`.
///
/// Only valid for doubled-quote dialects (`dialect.escape` is `None`).
pub fn tokenize<T: Token>(dialect: &Dialect<T>, dst: &mut [FieldMeta], data: &[T]) -> isize {
    debug_assert!(dialect.escape.is_none());

    let delimiter = dialect.delimiter;
    let quote = dialect.quote;
    let lf = dialect.lf();
    let cr = dialect.cr();
    let crlf = dialect.newline == Newline::Crlf;

    let mut n: usize = 0;
    let mut pos: usize = 0;
    let mut carry: u64 = 0; // 0 or 1: parity of quotes seen so far
    let mut field_quotes: u64 = 0; // quotes since the last boundary
    let mut field_start: usize = 0;

    while pos + LANES <= data.len() && n < dst.len() {
        let block = &data[pos..pos + LANES];

        let quote_bits = T::eq_bitmask(block, quote);
        let quoted = (prefix_xor(quote_bits) ^ carry.wrapping_neg()) & MASK_16;
        carry ^= (quote_bits.count_ones() as u64) & 1;
        let not_quoted = !quoted & MASK_16;

        let delim_bits = T::eq_bitmask(block, delimiter) & not_quoted;
        let lf_bits = T::eq_bitmask(block, lf) & not_quoted;
        let mut bits = delim_bits | lf_bits;

        let mut consumed_lanes: u32 = 0;
        while bits != 0 {
            let lane = bits.trailing_zeros();
            bits &= bits - 1; // clear lowest set bit

            let below = (1u64 << lane) - 1;
            let already = (1u64 << consumed_lanes) - 1;
            let quotes_here =
                field_quotes + (quote_bits & below & !already).count_ones() as u64;

            let end = pos + lane as usize;
            let is_lf = lf_bits & (1 << lane) != 0;
            let content_end = if is_lf && crlf && end > 0 && data[end - 1] == cr {
                end - 1
            } else {
                end
            };

            if quotes_here != 0 {
                // quotes must cleanly wrap the field; everything else is
                // for the scalar tokenizer
                let wrapped = quotes_here & 1 == 0
                    && content_end - field_start >= 2
                    && data[field_start] == quote
                    && data[content_end - 1] == quote;
                if !wrapped {
                    return ABANDON;
                }
            }

            dst[n] = if is_lf {
                let newline_len = end - content_end + 1;
                FieldMeta::record_end(content_end, quotes_here, newline_len)
            } else {
                FieldMeta::field(end, quotes_here)
            };
            n += 1;
            field_start = dst[n - 1].next_start();
            field_quotes = 0;
            consumed_lanes = lane + 1;
            if n == dst.len() {
                return n as isize;
            }
        }

        let already = (1u64 << consumed_lanes) - 1;
        field_quotes += (quote_bits & !already & MASK_16).count_ones() as u64;
        pos += LANES;
    }

    n as isize
}
