//! Line-delimited JSON files.
//!
//! Readers and writers pick gzip framing from the file extension (`.gz`).
//! Writers produce a sibling `.partial` file and rename it into place on
//! [`OutputFile::finish`], so a reader never sees a half-written output.

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;

/// Suffix appended to in-progress output files.
pub const PARTIAL_SUFFIX: &str = ".partial";

/// Returns true if `path` names a gzip file.
#[must_use]
pub fn is_gzip_path(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
}

/// Returns `path` with [`PARTIAL_SUFFIX`] appended to its file name.
#[must_use]
pub fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    path.with_file_name(name)
}

/// Opens `path` for buffered reading, decompressing `.gz` files.
///
/// # Errors
///
/// Returns the I/O error from opening the file.
pub fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    if is_gzip_path(path) {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Iterates the non-blank lines of a reader with their 1-based line numbers.
///
/// Line terminators (`\n` or `\r\n`) are stripped. Blank lines are skipped
/// but still counted, so numbers always match the position in the file.
pub struct Lines<R> {
    reader: R,
    line_number: u64,
}

impl<R: BufRead> Lines<R> {
    /// Wraps `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_number: 0,
        }
    }
}

impl<R: BufRead> Iterator for Lines<R> {
    type Item = io::Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut buf = Vec::new();
            match self.reader.read_until(b'\n', &mut buf) {
                Ok(0) => return None,
                Ok(_) => {
                    self.line_number += 1;
                    if buf.last() == Some(&b'\n') {
                        buf.pop();
                        if buf.last() == Some(&b'\r') {
                            buf.pop();
                        }
                    }
                    if buf.iter().all(u8::is_ascii_whitespace) {
                        continue;
                    }
                    return Some(Ok((self.line_number, buf)));
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

enum Sink {
    Plain(BufWriter<File>),
    Gzip(GzEncoder<BufWriter<File>>),
}

/// Output file written via a `.partial` sibling and renamed on completion.
///
/// Dropping an unfinished `OutputFile` removes the partial file.
pub struct OutputFile {
    path: PathBuf,
    partial: PathBuf,
    sink: Option<Sink>,
}

impl OutputFile {
    /// Creates the partial file for `path`, gzip-compressed if `path` ends in `.gz`.
    ///
    /// Missing parent directories are created.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from creating the directory or file.
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let partial = partial_path(path);
        let file = BufWriter::new(File::create(&partial)?);
        let sink = if is_gzip_path(path) {
            Sink::Gzip(GzEncoder::new(file, Compression::default()))
        } else {
            Sink::Plain(file)
        };
        Ok(Self {
            path: path.to_path_buf(),
            partial,
            sink: Some(sink),
        })
    }

    /// Final path of the output.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes `line` followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns the underlying write error.
    pub fn write_line(&mut self, line: &[u8]) -> io::Result<()> {
        self.write_all(line)?;
        self.write_all(b"\n")
    }

    /// Flushes everything and renames the partial file to the final path.
    ///
    /// # Errors
    ///
    /// Returns the I/O error from flushing or renaming; the partial file is
    /// removed in that case.
    pub fn finish(mut self) -> io::Result<PathBuf> {
        let result = match self.sink.take() {
            Some(Sink::Plain(writer)) => finish_plain(writer),
            Some(Sink::Gzip(encoder)) => encoder.finish().and_then(finish_plain),
            None => Ok(()),
        }
        .and_then(|()| std::fs::rename(&self.partial, &self.path));

        match result {
            Ok(()) => Ok(std::mem::take(&mut self.path)),
            Err(e) => {
                let _ = std::fs::remove_file(&self.partial);
                Err(e)
            }
        }
    }
}

fn finish_plain(writer: BufWriter<File>) -> io::Result<()> {
    let file = writer.into_inner().map_err(io::IntoInnerError::into_error)?;
    file.sync_all()
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.sink.as_mut() {
            Some(Sink::Plain(w)) => w.write(buf),
            Some(Sink::Gzip(w)) => w.write(buf),
            None => Err(io::Error::other("output already finished")),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.sink.as_mut() {
            Some(Sink::Plain(w)) => w.flush(),
            Some(Sink::Gzip(w)) => w.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for OutputFile {
    fn drop(&mut self) {
        if self.sink.take().is_some() {
            let _ = std::fs::remove_file(&self.partial);
        }
    }
}
