// Buffered I/O adapters over pluggable sources and sinks

mod reader;
mod source;
mod writer;

pub use reader::{BufferReader, ReadResult};
pub use source::{IoSink, IoSource, Sink, SliceSource, Source, VecSink};
pub use writer::BufferWriter;

#[cfg(feature = "async")]
pub use source::{AsyncSink, AsyncSource, TokioSink, TokioSource};
