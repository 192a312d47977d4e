// Scalar tokenizer
//
// Single pass over the window, tracking quote state and per-field special
// counts. Handles every dialect, including distinct escapes; also the
// fallback when the vectorized tokenizer abandons, and the final pass at
// end of data (`read_to_end`).

use crate::dialect::{Dialect, Newline, Token};

use super::FieldMeta;

/// Tokenize `data`, writing field metadata into `dst`. Returns the number of
/// metas written; stops when `dst` is full. With `read_to_end`, trailing data
/// with no final newline is emitted as a record via a shadow terminator.
pub fn tokenize<T: Token>(
    dialect: &Dialect<T>,
    dst: &mut [FieldMeta],
    data: &[T],
    read_to_end: bool,
) -> usize {
    let delimiter = dialect.delimiter;
    let quote = dialect.quote;
    let escape = dialect.escape;
    let lf = dialect.lf();
    let cr = dialect.cr();
    let crlf = dialect.newline == Newline::Crlf;
    // RFC mode counts quotes (including the wrapping pair); escape mode
    // counts only the escapes.
    let count_quotes = escape.is_none();

    let mut n = 0;
    let mut pos = 0;
    let mut special: u64 = 0;
    let mut in_quotes = false;

    while pos < data.len() && n < dst.len() {
        let t = data[pos];

        if in_quotes {
            if escape == Some(t) {
                if pos + 1 < data.len() {
                    special += 1;
                    pos += 2;
                } else {
                    // dangling escape at the window end: leave it for the
                    // next window (or as data on the final pass)
                    pos += 1;
                }
                continue;
            }
            if t == quote {
                in_quotes = false;
                if count_quotes {
                    special += 1;
                }
            }
            pos += 1;
            continue;
        }

        if t == quote {
            in_quotes = true;
            if count_quotes {
                special += 1;
            }
            pos += 1;
        } else if t == delimiter {
            dst[n] = tag(FieldMeta::field(pos, special), escape.is_some());
            n += 1;
            special = 0;
            pos += 1;
        } else if t == lf {
            let meta = if crlf && pos > 0 && data[pos - 1] == cr {
                FieldMeta::record_end(pos - 1, special, 2)
            } else {
                FieldMeta::record_end(pos, special, 1)
            };
            dst[n] = tag(meta, escape.is_some());
            n += 1;
            special = 0;
            pos += 1;
        } else {
            pos += 1;
        }
    }

    if read_to_end && n < dst.len() {
        // Emit a trailing record with a shadow terminator: dangling content,
        // or an empty field after a trailing delimiter.
        let emit = if n == 0 {
            !data.is_empty()
        } else if !dst[n - 1].is_record_end() {
            true
        } else {
            dst[n - 1].next_start() < data.len()
        };
        if emit {
            dst[n] = tag(FieldMeta::record_end(data.len(), special, 0), escape.is_some());
            n += 1;
        }
    }

    n
}

#[inline]
fn tag(meta: FieldMeta, escape_mode: bool) -> FieldMeta {
    if escape_mode {
        meta.with_escape()
    } else {
        meta
    }
}
