//! Local gzip file streaming with byte counting.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use flate2::read::MultiGzDecoder;

/// Buffer size for gzip stream reader (256KB)
const GZIP_BUF_SIZE: usize = 256 * 1024;

/// Buffered reader over a gzipped file with byte counting
pub type GzipReader = BufReader<MultiGzDecoder<CountingReader<File>>>;

/// Shared counter of compressed bytes consumed
pub type ByteCounter = Arc<AtomicU64>;

/// Open `path` → gunzip → buffered reader with byte counter.
///
/// The gzip header is read eagerly, so a file that is not gzip fails here
/// rather than on the first line.
///
/// Returns (reader, byte_counter, compressed_size)
pub fn open_gzip_file(path: &Path) -> io::Result<(GzipReader, ByteCounter, u64)> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();

    let counter = Arc::new(AtomicU64::new(0));
    let counting = CountingReader {
        inner: file,
        count: counter.clone(),
    };
    let mut reader = BufReader::with_capacity(GZIP_BUF_SIZE, MultiGzDecoder::new(counting));
    reader.fill_buf()?;

    Ok((reader, counter, size))
}

/// Reader wrapper that tracks bytes read
#[derive(Debug)]
pub struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}
