// Record buffer: pooled field metadata with a start-of-data sentinel
//
// Slot 0 holds the sentinel so that every field's start is the previous
// meta's `next_start`, uniformly. The tokenizer writes into the unread
// slots; `set_fields_read` commits them and counts completed records;
// `truncate_to_records` drops a trailing partial record before the buffer
// is handed out with a chunk.

use crate::pool::{BufferPool, Lease};

use super::FieldMeta;

pub struct RecordBuffer {
    metas: Lease<FieldMeta>,
    /// Committed metas, excluding the sentinel.
    len: usize,
    records: usize,
    /// Slot index of the last record-end meta; 0 when none.
    last_end: usize,
}

impl RecordBuffer {
    pub fn new(pool: &BufferPool<FieldMeta>, field_capacity: usize) -> RecordBuffer {
        let mut metas = pool.rent(field_capacity + 1);
        metas[0] = FieldMeta::START_OF_DATA;
        RecordBuffer {
            metas,
            len: 0,
            records: 0,
            last_end: 0,
        }
    }

    /// Slots the tokenizer may write into.
    pub fn unread_buffer(&mut self) -> &mut [FieldMeta] {
        &mut self.metas[self.len + 1..]
    }

    /// Commit `count` metas written into the unread slots.
    pub fn set_fields_read(&mut self, count: usize) {
        for i in self.len + 1..self.len + 1 + count {
            if self.metas[i].is_record_end() {
                self.records += 1;
                self.last_end = i;
            }
        }
        self.len += count;
    }

    pub fn field_capacity(&self) -> usize {
        self.metas.len() - 1
    }

    /// Committed metas, including any trailing partial record.
    pub fn field_count(&self) -> usize {
        self.len
    }

    pub fn record_count(&self) -> usize {
        self.records
    }

    /// Elements of the window consumed by completed records.
    pub fn consumed(&self) -> usize {
        if self.last_end == 0 {
            0
        } else {
            self.metas[self.last_end].next_start()
        }
    }

    /// Drop the metas of a trailing partial record.
    pub fn truncate_to_records(&mut self) {
        self.len = self.last_end;
    }

    /// Iterate the completed records.
    pub fn records(&self) -> Records<'_> {
        Records {
            metas: &self.metas[..self.len + 1],
            cursor: 1,
        }
    }
}

/// Iterator over completed records in a `RecordBuffer`.
pub struct Records<'a> {
    metas: &'a [FieldMeta],
    cursor: usize,
}

impl<'a> Iterator for Records<'a> {
    type Item = Record<'a>;

    fn next(&mut self) -> Option<Record<'a>> {
        let first = self.cursor;
        let mut i = self.cursor;
        while i < self.metas.len() && !self.metas[i].is_record_end() {
            i += 1;
        }
        if i >= self.metas.len() {
            // trailing metas without a record end are a partial record
            return None;
        }
        self.cursor = i + 1;
        Some(Record {
            start: self.metas[first - 1].next_start(),
            metas: &self.metas[first..=i],
        })
    }
}

/// View over one completed record's metas. Positions are window-relative.
#[derive(Clone, Copy)]
pub struct Record<'a> {
    start: usize,
    metas: &'a [FieldMeta],
}

impl<'a> Record<'a> {
    pub fn field_count(&self) -> usize {
        self.metas.len()
    }

    /// Window position of the record's first element.
    pub fn start(&self) -> usize {
        self.start
    }

    /// Window position one past the record content, excluding the terminator.
    pub fn end(&self) -> usize {
        self.metas[self.metas.len() - 1].end()
    }

    /// Raw span of field `index`, wrapping quotes included.
    pub fn field_span(&self, index: usize) -> (usize, usize) {
        let start = if index == 0 {
            self.start
        } else {
            self.metas[index - 1].next_start()
        };
        (start, self.metas[index].end())
    }

    pub fn meta(&self, index: usize) -> FieldMeta {
        self.metas[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::Dialect;
    use crate::tokenizer::scalar;

    fn tokenized(data: &[u8], capacity: usize, read_to_end: bool) -> RecordBuffer {
        let pool = BufferPool::new();
        let mut buffer = RecordBuffer::new(&pool, capacity);
        let dialect = Dialect::<u8>::default();
        let n = scalar::tokenize(&dialect, buffer.unread_buffer(), data, read_to_end);
        buffer.set_fields_read(n);
        buffer
    }

    #[test]
    fn test_counts_records_and_consumed() {
        let buffer = tokenized(b"a,b\nc,d\ne,", 16, false);
        assert_eq!(buffer.record_count(), 2);
        assert_eq!(buffer.field_count(), 5, "partial record's field is committed");
        assert_eq!(buffer.consumed(), 8);
    }

    #[test]
    fn test_truncate_drops_partial_record() {
        let mut buffer = tokenized(b"a,b\nc,d\ne,", 16, false);
        buffer.truncate_to_records();
        assert_eq!(buffer.field_count(), 4);
        assert_eq!(buffer.records().count(), 2);
    }

    #[test]
    fn test_record_spans() {
        let buffer = tokenized(b"aa,b\n\"c\",dd\n", 16, false);
        let records: Vec<_> = buffer.records().collect();
        assert_eq!(records.len(), 2);

        assert_eq!(records[0].start(), 0);
        assert_eq!(records[0].field_span(0), (0, 2));
        assert_eq!(records[0].field_span(1), (3, 4));

        assert_eq!(records[1].start(), 5);
        assert_eq!(records[1].field_span(0), (5, 8));
        assert_eq!(records[1].field_span(1), (9, 11));
        assert_eq!(records[1].end(), 11);
    }

    #[test]
    fn test_incremental_commits() {
        let pool = BufferPool::new();
        let mut buffer = RecordBuffer::new(&pool, 16);
        let dialect = Dialect::<u8>::default();

        let n = scalar::tokenize(&dialect, buffer.unread_buffer(), b"a,b\n", false);
        buffer.set_fields_read(n);
        assert_eq!(buffer.record_count(), 1);

        // second window appended after the first: positions here are
        // window-relative, which is fine for span bookkeeping only
        let n = scalar::tokenize(&dialect, buffer.unread_buffer(), b"c\n", false);
        buffer.set_fields_read(n);
        assert_eq!(buffer.record_count(), 2);
        assert_eq!(buffer.field_count(), 3);
    }

    #[test]
    fn test_empty_buffer() {
        let pool = BufferPool::new();
        let buffer = RecordBuffer::new(&pool, 8);
        assert_eq!(buffer.record_count(), 0);
        assert_eq!(buffer.consumed(), 0);
        assert_eq!(buffer.records().count(), 0);
    }
}
