// velocsv - Pooled, vectorized CSV engine for byte and UTF-16 streams
//
// Layers:
// 1. Buffer pool: leased buffers shared by every layer (pool)
// 2. Buffered I/O: sources, sinks and the reader/writer adapters (io)
// 3. Tokenizing and escaping: scalar + vectorized tokenizers, field
//    metadata, escape/unescape transforms (tokenizer, escape)
// 4. Chunked reading: ordered, self-contained windows of records,
//    parallelizable via rayon (chunk)

#![feature(portable_simd)]

pub mod chunk;
pub mod dialect;
pub mod error;
pub mod escape;
pub mod io;
pub mod pool;
pub mod tokenizer;

pub use chunk::{Chunk, ChunkReader, ChunkReaderOptions, RecordRef};
pub use dialect::{Dialect, Newline, Token};
pub use error::{Error, Result};
pub use escape::{write_record, QuoteScan};
pub use io::{BufferReader, BufferWriter, ReadResult, Sink, SliceSource, Source, VecSink};
pub use pool::{BufferPool, Lease};

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;
