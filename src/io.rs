use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

pub fn is_gzipped(path: &Path) -> bool {
    path.extension().and_then(|s| s.to_str()) == Some("gz")
}

/// Open a plain or gzip file for buffered reading. Multi-member gzip
/// (concatenated or bgzf) is decoded as a single stream.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path).map_err(|e| Error::file_io(path, e))?;

    if is_gzipped(path) {
        let decoder = MultiGzDecoder::new(file);
        Ok(Box::new(BufReader::with_capacity(2 << 20, decoder)))
    } else {
        Ok(Box::new(BufReader::with_capacity(2 << 20, file)))
    }
}

/// Create a gzip encoder over a new file. Call `finish` on the result so the
/// trailer is written and errors surface.
pub fn create_gz_writer(path: &Path, level: u32) -> Result<GzEncoder<BufWriter<File>>> {
    let file = File::create(path).map_err(|e| Error::file_io(path, e))?;
    // 先缓冲再压缩, 减少 sys-call 次数
    Ok(GzEncoder::new(
        BufWriter::with_capacity(4 << 20, file),
        Compression::new(level),
    ))
}

/// A plain or gzip output file. Call [`OutputWriter::finish`] when done;
/// dropping it discards errors of the final flush.
pub enum OutputWriter {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

impl OutputWriter {
    /// Flush buffered data and, for gzip, write the trailer.
    pub fn finish(self) -> io::Result<()> {
        match self {
            OutputWriter::Plain(mut w) => w.flush(),
            OutputWriter::Gzip(w) => w.finish()?.flush(),
        }
    }
}

impl Write for OutputWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputWriter::Plain(w) => w.write(buf),
            OutputWriter::Gzip(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputWriter::Plain(w) => w.flush(),
            OutputWriter::Gzip(w) => w.flush(),
        }
    }
}

/// Create an output file, gzip-compressed when the name ends in `.gz`.
pub fn create_writer(path: &Path) -> Result<OutputWriter> {
    if is_gzipped(path) {
        let encoder = create_gz_writer(path, Compression::default().level())?;
        Ok(OutputWriter::Gzip(encoder))
    } else {
        let file = File::create(path).map_err(|e| Error::file_io(path, e))?;
        Ok(OutputWriter::Plain(BufWriter::with_capacity(4 << 20, file)))
    }
}

/// Size of a file in bytes, or `None` when it does not exist.
pub fn file_size(path: &Path) -> Option<u64> {
    std::fs::metadata(path).ok().map(|m| m.len())
}
