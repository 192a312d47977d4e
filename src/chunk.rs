// Chunked reader — self-contained windows of complete records
//
// Each call to `read` produces a `Chunk`: a leased data window plus the
// field metadata of every complete record inside it. Chunks share nothing
// with the reader or each other, so they can be processed on other threads
// (`map_parallel`) while preserving source order.
//
// The trailing partial record of a window is carried over as leftover and
// re-prepended to the next window. Two feedback loops keep the reader
// making progress and sized to the data: the window doubles whenever the
// leftover would fill half of it, and the field-metadata capacity adapts to
// the density of the records actually seen.

use std::borrow::Cow;

use rayon::prelude::*;

use crate::dialect::{Dialect, Token};
use crate::error::{Error, Result};
use crate::escape::unescape_cow;
use crate::io::Source;
use crate::pool::{ensure_capacity, BufferPool, Lease};
use crate::tokenizer::{scalar, simd, FieldMeta, Record, RecordBuffer};

#[cfg(feature = "async")]
use crate::io::AsyncSource;

const MIN_RECORD_FIELDS: usize = 256;
const MAX_RECORD_FIELDS: usize = 65536;

/// Tuning knobs for [`ChunkReader`].
#[derive(Clone, Debug)]
pub struct ChunkReaderOptions {
    /// Initial window size in elements. Grows when records do not fit.
    pub buffer_len: usize,
    /// Initial field-metadata capacity per window. Adapts to the data.
    pub record_fields: usize,
    /// When set, every record must have exactly this many fields.
    pub expected_fields: Option<usize>,
}

impl Default for ChunkReaderOptions {
    fn default() -> Self {
        ChunkReaderOptions {
            buffer_len: 8192,
            record_fields: 1024,
            expected_fields: None,
        }
    }
}

// ==========================================================================
// Chunk
// ==========================================================================

/// A self-contained window of complete records. Owns its leased buffers;
/// dropping the chunk returns them to the reader's pools.
pub struct Chunk<T: Token> {
    position: u64,
    data: Lease<T>,
    records: RecordBuffer,
    quote: T,
    escape: Option<T>,
}

impl<T: Token> Chunk<T> {
    /// Stream position of the window's first element.
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn record_count(&self) -> usize {
        self.records.record_count()
    }

    pub fn records(&self) -> impl Iterator<Item = RecordRef<'_, T>> + '_ {
        self.records.records().map(|rec| RecordRef {
            data: &self.data[..],
            rec,
            quote: self.quote,
            escape: self.escape,
        })
    }
}

impl<T: Token> std::fmt::Debug for Chunk<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("position", &self.position)
            .field("records", &self.record_count())
            .field("len", &self.data.len())
            .finish()
    }
}

/// One record inside a chunk.
#[derive(Clone, Copy)]
pub struct RecordRef<'a, T: Token> {
    data: &'a [T],
    rec: Record<'a>,
    quote: T,
    escape: Option<T>,
}

impl<'a, T: Token> RecordRef<'a, T> {
    pub fn field_count(&self) -> usize {
        self.rec.field_count()
    }

    /// Raw span of field `index`, wrapping quotes included.
    pub fn raw_field(&self, index: usize) -> &'a [T] {
        let (start, end) = self.rec.field_span(index);
        &self.data[start..end]
    }

    /// Logical content of field `index`: quotes stripped, doubled quotes
    /// collapsed, escapes removed. Borrows when no rewrite is needed.
    pub fn field(&self, index: usize) -> Cow<'a, [T]> {
        unescape_cow(self.raw_field(index), self.rec.meta(index), self.quote, self.escape)
    }

    pub fn fields(&self) -> impl Iterator<Item = Cow<'a, [T]>> + '_ {
        (0..self.field_count()).map(|i| self.field(i))
    }

    /// The whole record, terminator excluded.
    pub fn raw(&self) -> &'a [T] {
        &self.data[self.rec.start()..self.rec.end()]
    }
}

// ==========================================================================
// Reader
// ==========================================================================

pub struct ChunkReader<T: Token, S> {
    source: S,
    dialect: Dialect<T>,
    data_pool: BufferPool<T>,
    meta_pool: BufferPool<FieldMeta>,
    buffer_len: usize,
    record_fields: usize,
    expected_fields: Option<usize>,
    leftover: Lease<T>,
    leftover_len: usize,
    position: u64,
    completed: bool,
    /// Cleared permanently the first time the vectorized tokenizer abandons
    /// a window. Never set for distinct-escape dialects.
    vectorized: bool,
    bom_pending: bool,
}

impl<T: Token, S> ChunkReader<T, S> {
    pub fn new(source: S, dialect: Dialect<T>) -> Result<Self> {
        Self::with_options(source, dialect, ChunkReaderOptions::default())
    }

    pub fn with_options(source: S, dialect: Dialect<T>, options: ChunkReaderOptions) -> Result<Self> {
        dialect.validate()?;
        let data_pool = BufferPool::new();
        let leftover = Lease::empty(&data_pool);
        let vectorized = dialect.escape.is_none();
        Ok(ChunkReader {
            source,
            dialect,
            data_pool,
            meta_pool: BufferPool::new(),
            buffer_len: options.buffer_len.max(LEFTOVER_FLOOR),
            record_fields: options.record_fields.clamp(MIN_RECORD_FIELDS, MAX_RECORD_FIELDS),
            expected_fields: options.expected_fields,
            leftover,
            leftover_len: 0,
            position: 0,
            completed: false,
            vectorized,
            bom_pending: true,
        })
    }

    /// Rent the next window, growing it when the carried-over partial record
    /// would fill half of it, and prepend the leftover.
    fn prepare(&mut self) -> Lease<T> {
        if self.leftover_len * 2 >= self.buffer_len {
            self.buffer_len *= 2;
            tracing::debug!(buffer_len = self.buffer_len, "growing read window");
        }
        // the window must leave room to read past the carried-over data
        let min_len = self.buffer_len.max(self.leftover_len * 2);
        let mut lease = self.data_pool.rent(min_len);
        lease[..self.leftover_len].copy_from_slice(&self.leftover[..self.leftover_len]);
        lease
    }

    fn tokenize_window(&mut self, dst: &mut [FieldMeta], data: &[T]) -> usize {
        if self.completed {
            // final pass: emit the trailing record even without a newline
            return scalar::tokenize(&self.dialect, dst, data, true);
        }
        if self.vectorized {
            let n = simd::tokenize(&self.dialect, dst, data);
            if n >= 0 {
                return n as usize;
            }
            tracing::debug!("vectorized tokenizer abandoned a window, downgrading to scalar");
            self.vectorized = false;
        }
        scalar::tokenize(&self.dialect, dst, data, false)
    }

    /// Tokenize a prepared window and package the complete records into a
    /// chunk. `None` means no record completed; the whole window became
    /// leftover and the caller should fill a larger one.
    fn process(&mut self, data: Lease<T>, total: usize) -> Result<Option<Chunk<T>>> {
        let mut records = RecordBuffer::new(&self.meta_pool, self.record_fields);
        let n = self.tokenize_window(records.unread_buffer(), &data[..total]);
        records.set_fields_read(n);

        if records.record_count() == 0 {
            if records.field_count() == records.field_capacity() {
                // a single record overflowed the metadata buffer; grow past
                // the usual ceiling so the reader always makes progress
                self.record_fields *= 2;
                tracing::debug!(
                    record_fields = self.record_fields,
                    "record overflowed field metadata, growing"
                );
            }
            ensure_capacity(&self.data_pool, &mut self.leftover, total, false);
            self.leftover[..total].copy_from_slice(&data[..total]);
            self.leftover_len = total;
            return Ok(None);
        }

        let fields_seen = records.field_count();
        let consumed = records.consumed();
        records.truncate_to_records();

        let tail = total - consumed;
        ensure_capacity(&self.data_pool, &mut self.leftover, tail, false);
        self.leftover[..tail].copy_from_slice(&data[consumed..total]);
        self.leftover_len = tail;

        if let Some(expected) = self.expected_fields {
            for rec in records.records() {
                if rec.field_count() != expected {
                    return Err(Error::FieldCount {
                        position: self.position + rec.start() as u64,
                        expected,
                        actual: rec.field_count(),
                    });
                }
            }
        }

        // adapt the metadata capacity to the record density seen
        let capacity = records.field_capacity();
        if fields_seen > capacity - capacity / 4 {
            self.record_fields = (self.record_fields * 2).min(MAX_RECORD_FIELDS);
        } else if fields_seen < capacity / 4 {
            self.record_fields = (self.record_fields / 2).max(MIN_RECORD_FIELDS);
        }

        let chunk = Chunk {
            position: self.position,
            data,
            records,
            quote: self.dialect.quote,
            escape: self.dialect.escape,
        };
        self.position += consumed as u64;
        tracing::trace!(
            position = chunk.position,
            records = chunk.record_count(),
            consumed,
            "chunk ready"
        );
        Ok(Some(chunk))
    }

    /// Strip a recognized preamble once enough of the stream is buffered.
    /// Returns the new total, or `None` when more data is needed first.
    fn strip_preamble(&mut self, lease: &mut Lease<T>, total: usize) -> Option<usize> {
        // longest recognized preamble is 3 elements
        if total < 3 && !self.completed {
            ensure_capacity(&self.data_pool, &mut self.leftover, total, false);
            self.leftover[..total].copy_from_slice(&lease[..total]);
            self.leftover_len = total;
            return None;
        }
        self.bom_pending = false;
        let bom = T::bom_len(&lease[..total]);
        if bom > 0 {
            lease.copy_within(bom..total, 0);
        }
        Some(total - bom)
    }
}

const LEFTOVER_FLOOR: usize = 64;

impl<T: Token, S: Source<T>> ChunkReader<T, S> {
    /// Read the next chunk of complete records, or `None` at end of data.
    /// Safe to call again after `None`.
    pub fn read(&mut self) -> Result<Option<Chunk<T>>> {
        loop {
            if self.completed && self.leftover_len == 0 {
                return Ok(None);
            }
            let mut lease = self.prepare();
            let start = self.leftover_len;

            let read = if self.completed {
                0
            } else {
                // the leftover stays carried until the source delivers, so a
                // failed read can simply be retried
                self.source.read(&mut lease[start..])?
            };
            self.leftover_len = 0;
            if read == 0 {
                self.completed = true;
            }
            let mut total = start + read;
            if total == 0 {
                return Ok(None);
            }

            if self.bom_pending {
                match self.strip_preamble(&mut lease, total) {
                    Some(t) => total = t,
                    None => continue,
                }
                if total == 0 {
                    continue;
                }
            }

            if let Some(chunk) = self.process(lease, total)? {
                return Ok(Some(chunk));
            }
        }
    }

    /// Read the whole source into chunks, in order.
    pub fn read_all(&mut self) -> Result<Vec<Chunk<T>>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.read()? {
            chunks.push(chunk);
        }
        Ok(chunks)
    }

    /// Read the whole source and map every chunk on the rayon thread pool.
    /// Results come back in source order.
    pub fn map_parallel<F, R>(&mut self, f: F) -> Result<Vec<R>>
    where
        F: Fn(&Chunk<T>) -> R + Sync + Send,
        R: Send,
    {
        let chunks = self.read_all()?;
        Ok(chunks.par_iter().map(f).collect())
    }
}

#[cfg(feature = "async")]
impl<T: Token, S: AsyncSource<T>> ChunkReader<T, S> {
    /// Async counterpart of [`read`](Self::read). Dropping the returned
    /// future cancels the read; the reader stays usable.
    pub async fn read_async(&mut self) -> Result<Option<Chunk<T>>> {
        loop {
            if self.completed && self.leftover_len == 0 {
                return Ok(None);
            }
            let mut lease = self.prepare();
            let start = self.leftover_len;

            let read = if self.completed {
                0
            } else {
                // the leftover stays carried until the source delivers, so a
                // dropped future or a failed read leaves nothing lost
                self.source.read(&mut lease[start..]).await?
            };
            self.leftover_len = 0;
            if read == 0 {
                self.completed = true;
            }
            let mut total = start + read;
            if total == 0 {
                return Ok(None);
            }

            if self.bom_pending {
                match self.strip_preamble(&mut lease, total) {
                    Some(t) => total = t,
                    None => continue,
                }
                if total == 0 {
                    continue;
                }
            }

            if let Some(chunk) = self.process(lease, total)? {
                return Ok(Some(chunk));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::SliceSource;

    fn collect_fields(data: &[u8], options: ChunkReaderOptions) -> Vec<Vec<Vec<u8>>> {
        let mut reader =
            ChunkReader::with_options(SliceSource::new(data), Dialect::default(), options)
                .unwrap();
        let mut out = Vec::new();
        while let Some(chunk) = reader.read().unwrap() {
            for rec in chunk.records() {
                out.push(rec.fields().map(|f| f.into_owned()).collect());
            }
        }
        out
    }

    fn small() -> ChunkReaderOptions {
        ChunkReaderOptions {
            buffer_len: 64,
            ..ChunkReaderOptions::default()
        }
    }

    #[test]
    fn test_records_across_chunks() {
        let mut data = Vec::new();
        for i in 0..200 {
            data.extend_from_slice(format!("row{i},value{i},\"x,{i}\"\r\n").as_bytes());
        }
        let rows = collect_fields(&data, small());
        assert_eq!(rows.len(), 200);
        assert_eq!(rows[0], vec![b"row0".to_vec(), b"value0".to_vec(), b"x,0".to_vec()]);
        assert_eq!(rows[199][0], b"row199");
    }

    #[test]
    fn test_positions_are_stream_offsets() {
        let data = b"aa,b\ncc,d\nee,f\n";
        let mut reader = ChunkReader::with_options(
            SliceSource::new(data),
            Dialect::default(),
            ChunkReaderOptions {
                buffer_len: 64,
                ..ChunkReaderOptions::default()
            },
        )
        .unwrap();

        let chunk = reader.read().unwrap().unwrap();
        assert_eq!(chunk.position(), 0);
        assert_eq!(chunk.record_count(), 3);

        let rec: Vec<_> = chunk.records().collect();
        assert_eq!(rec[1].raw(), b"cc,d");
        assert_eq!(rec[1].raw_field(0), b"cc");
    }

    #[test]
    fn test_trailing_record_without_newline() {
        let rows = collect_fields(b"a,b\nc,d", small());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn test_empty_source_yields_none_repeatedly() {
        let mut reader =
            ChunkReader::new(SliceSource::new(&b""[..]), Dialect::<u8>::default()).unwrap();
        assert!(reader.read().unwrap().is_none());
        assert!(reader.read().unwrap().is_none());
    }

    /// Delivers `data` a few elements per call and fails once at a chosen
    /// call index, like a socket hitting a transient error mid-stream.
    struct TrickleSource<'a> {
        data: &'a [u8],
        pos: usize,
        step: usize,
        fail_on: Option<usize>,
        calls: usize,
    }

    impl Source<u8> for TrickleSource<'_> {
        fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
            let call = self.calls;
            self.calls += 1;
            if self.fail_on == Some(call) {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::Interrupted,
                    "transient",
                )
                .into());
            }
            let n = buf.len().min(self.step).min(self.data.len() - self.pos);
            buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
            self.pos += n;
            Ok(n)
        }
    }

    #[test]
    fn test_read_error_keeps_carried_over_records() {
        // the source fails while a partial record is carried over; after a
        // retry every record, including the carried one and the trailing
        // record without a newline, must still come out
        let source = TrickleSource {
            data: b"aaaa,bbbb\ncccc,dddd\nleft,",
            pos: 0,
            step: 12,
            fail_on: Some(1),
            calls: 0,
        };
        let mut reader = ChunkReader::new(source, Dialect::default()).unwrap();

        assert!(reader.read().is_err());

        let mut rows = Vec::new();
        while let Some(chunk) = reader.read().unwrap() {
            for rec in chunk.records() {
                rows.push(rec.fields().map(|f| f.into_owned()).collect::<Vec<_>>());
            }
        }
        assert_eq!(
            rows,
            vec![
                vec![b"aaaa".to_vec(), b"bbbb".to_vec()],
                vec![b"cccc".to_vec(), b"dddd".to_vec()],
                vec![b"left".to_vec(), b"".to_vec()],
            ]
        );
    }

    #[test]
    fn test_record_longer_than_window() {
        // single record much larger than the initial window: the window
        // must double until the record fits
        let mut data = vec![b'x'; 500];
        data.extend_from_slice(b",tail\n");
        let rows = collect_fields(&data, small());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][0].len(), 500);
        assert_eq!(rows[0][1], b"tail");
    }

    #[test]
    fn test_record_with_many_fields() {
        // more fields than the metadata buffer holds: capacity must grow
        // past its ceiling so the record still comes out whole
        let mut data = b"f,".repeat(600);
        data.pop();
        data.push(b'\n');
        let rows = collect_fields(
            &data,
            ChunkReaderOptions {
                record_fields: 4,
                ..ChunkReaderOptions::default()
            },
        );
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].len(), 600);
    }

    #[test]
    fn test_expected_fields_mismatch() {
        let mut reader = ChunkReader::with_options(
            SliceSource::new(&b"a,b\nc\n"[..]),
            Dialect::default(),
            ChunkReaderOptions {
                expected_fields: Some(2),
                ..ChunkReaderOptions::default()
            },
        )
        .unwrap();
        let err = reader.read().unwrap_err();
        match err {
            Error::FieldCount {
                position,
                expected,
                actual,
            } => {
                assert_eq!(position, 4);
                assert_eq!(expected, 2);
                assert_eq!(actual, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bom_is_stripped() {
        let data = b"\xEF\xBB\xBFa,b\n";
        let mut reader =
            ChunkReader::new(SliceSource::new(&data[..]), Dialect::default()).unwrap();
        let chunk = reader.read().unwrap().unwrap();
        let rec = chunk.records().next().unwrap();
        assert_eq!(rec.raw_field(0), b"a");
        assert_eq!(chunk.position(), 0, "positions exclude the preamble");
    }

    #[test]
    fn test_scalar_downgrade_keeps_records_correct() {
        // quotes in the middle of a field defeat the vectorized tokenizer;
        // the reader must fall back and still parse every record
        let mut data = Vec::new();
        for i in 0..50 {
            data.extend_from_slice(format!("plain{i},ab\"cd\"f,tail{i}\n").as_bytes());
        }
        let rows = collect_fields(&data, small());
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[7][1], b"ab\"cd\"f");
    }

    #[test]
    fn test_invalid_dialect_rejected() {
        let mut dialect = Dialect::<u8>::default();
        dialect.quote = dialect.delimiter;
        assert!(ChunkReader::new(SliceSource::new(&b""[..]), dialect).is_err());
    }

    #[test]
    fn test_map_parallel_preserves_order() {
        let mut data = Vec::new();
        for i in 0..300 {
            data.extend_from_slice(format!("{i},x\n").as_bytes());
        }
        let mut reader = ChunkReader::with_options(
            SliceSource::new(&data),
            Dialect::default(),
            small(),
        )
        .unwrap();

        let counts = reader
            .map_parallel(|chunk| {
                chunk
                    .records()
                    .map(|r| String::from_utf8(r.field(0).into_owned()).unwrap())
                    .collect::<Vec<_>>()
            })
            .unwrap();

        let all: Vec<String> = counts.into_iter().flatten().collect();
        assert_eq!(all.len(), 300);
        for (i, v) in all.iter().enumerate() {
            assert_eq!(v, &i.to_string());
        }
    }

    #[test]
    fn test_u16_stream() {
        let data: Vec<u16> = "x,\"a\"\"b\"\ny,z\n".encode_utf16().collect();
        let mut reader =
            ChunkReader::new(SliceSource::new(&data), Dialect::<u16>::default()).unwrap();
        let chunk = reader.read().unwrap().unwrap();
        let records: Vec<_> = chunk.records().collect();
        assert_eq!(records.len(), 2);

        let expect: Vec<u16> = "a\"b".encode_utf16().collect();
        assert_eq!(records[0].field(1).as_ref(), &expect[..]);
    }
}
