// Sources and sinks
//
// A `Source` yields elements into a caller-provided buffer; a `Sink` accepts
// slices of elements. Slices act as sources directly; `std::io` streams are
// bridged for byte elements. The `async` feature adds tokio bridges.

use std::io::{Read, Write};

use crate::dialect::Token;
use crate::error::Result;

/// Pull-based element source.
pub trait Source<T: Token> {
    /// Read up to `buf.len()` elements into `buf`, returning the count.
    /// Zero means end of data.
    fn read(&mut self, buf: &mut [T]) -> Result<usize>;

    /// Rewind to the start of the data. Returns `false` when the source
    /// does not support rewinding.
    fn try_reset(&mut self) -> bool {
        false
    }
}

/// Push-based element sink.
pub trait Sink<T: Token> {
    fn write(&mut self, data: &[T]) -> Result<()>;
    fn flush(&mut self) -> Result<()>;
}

// ---------------------------------------------------------------------------
// In-memory adapters
// ---------------------------------------------------------------------------

/// Source over an in-memory slice. Supports reset.
pub struct SliceSource<'a, T> {
    data: &'a [T],
    pos: usize,
}

impl<'a, T> SliceSource<'a, T> {
    pub fn new(data: &'a [T]) -> Self {
        SliceSource { data, pos: 0 }
    }
}

impl<T: Token> Source<T> for SliceSource<'_, T> {
    fn read(&mut self, buf: &mut [T]) -> Result<usize> {
        let n = buf.len().min(self.data.len() - self.pos);
        buf[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn try_reset(&mut self) -> bool {
        self.pos = 0;
        true
    }
}

/// Growable in-memory sink.
#[derive(Default)]
pub struct VecSink<T> {
    data: Vec<T>,
}

impl<T> VecSink<T> {
    pub fn new() -> Self {
        VecSink { data: Vec::new() }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn into_inner(self) -> Vec<T> {
        self.data
    }
}

impl<T: Token> Sink<T> for VecSink<T> {
    fn write(&mut self, data: &[T]) -> Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// std::io bridges (byte elements only)
// ---------------------------------------------------------------------------

/// Bridge a `std::io::Read` as a byte source.
pub struct IoSource<R> {
    inner: R,
}

impl<R: Read> IoSource<R> {
    pub fn new(inner: R) -> Self {
        IoSource { inner }
    }
}

impl<R: Read> Source<u8> for IoSource<R> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(self.inner.read(buf)?)
    }
}

/// Bridge a `std::io::Write` as a byte sink.
pub struct IoSink<W> {
    inner: W,
}

impl<W: Write> IoSink<W> {
    pub fn new(inner: W) -> Self {
        IoSink { inner }
    }
}

impl<W: Write> Sink<u8> for IoSink<W> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.inner.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Async bridges (tokio)
// ---------------------------------------------------------------------------

/// Async pull-based element source.
#[cfg(feature = "async")]
pub trait AsyncSource<T: Token> {
    async fn read(&mut self, buf: &mut [T]) -> Result<usize>;
}

/// Async push-based element sink.
#[cfg(feature = "async")]
pub trait AsyncSink<T: Token> {
    async fn write(&mut self, data: &[T]) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;
}

/// Bridge a `tokio::io::AsyncRead` as a byte source.
#[cfg(feature = "async")]
pub struct TokioSource<R> {
    inner: R,
}

#[cfg(feature = "async")]
impl<R: tokio::io::AsyncRead + Unpin> TokioSource<R> {
    pub fn new(inner: R) -> Self {
        TokioSource { inner }
    }
}

#[cfg(feature = "async")]
impl<R: tokio::io::AsyncRead + Unpin + Send> AsyncSource<u8> for TokioSource<R> {
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        use tokio::io::AsyncReadExt;
        Ok(self.inner.read(buf).await?)
    }
}

/// Bridge a `tokio::io::AsyncWrite` as a byte sink.
#[cfg(feature = "async")]
pub struct TokioSink<W> {
    inner: W,
}

#[cfg(feature = "async")]
impl<W: tokio::io::AsyncWrite + Unpin> TokioSink<W> {
    pub fn new(inner: W) -> Self {
        TokioSink { inner }
    }
}

#[cfg(feature = "async")]
impl<W: tokio::io::AsyncWrite + Unpin + Send> AsyncSink<u8> for TokioSink<W> {
    async fn write(&mut self, data: &[u8]) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.inner.write_all(data).await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        use tokio::io::AsyncWriteExt;
        self.inner.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_source_reads_and_resets() {
        let data = b"hello world";
        let mut source = SliceSource::new(&data[..]);
        let mut buf = [0u8; 5];

        assert_eq!(source.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
        assert_eq!(source.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b" worl");
        assert_eq!(source.read(&mut buf).unwrap(), 1);
        assert_eq!(source.read(&mut buf).unwrap(), 0);

        assert!(source.try_reset());
        assert_eq!(source.read(&mut buf).unwrap(), 5);
        assert_eq!(&buf, b"hello");
    }

    #[test]
    fn test_vec_sink_collects() {
        let mut sink = VecSink::<u16>::new();
        sink.write(&[1, 2]).unwrap();
        sink.write(&[3]).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_io_bridges() {
        let mut source = IoSource::new(&b"abc"[..]);
        let mut buf = [0u8; 8];
        assert_eq!(source.read(&mut buf).unwrap(), 3);

        let mut out = Vec::new();
        {
            let mut sink = IoSink::new(&mut out);
            sink.write(b"xyz").unwrap();
            sink.flush().unwrap();
        }
        assert_eq!(out, b"xyz");
    }
}
