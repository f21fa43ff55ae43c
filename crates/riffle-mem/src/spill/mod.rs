//! Spill directory and run files for external-memory operators.
//!
//! A `SpillDir` owns the temp-file namespace: it hands out monotonically
//! increasing file numbers and builds the `{direction}-SMTemp-{n}[-{pass}]`
//! and `BNJtemp-{n}` names from them, so simultaneously open plans can share
//! one directory without collisions. `RunWriter`/`RunReader` stream framed,
//! checksummed batches to and from one run file.

pub mod codec;
pub mod frame;

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use riffle_core::batch::Batch;
use riffle_core::schema::Schema;

use crate::error::{Error, Result};

pub use codec::Codec;
pub use frame::{FrameHeader, CHECKSUM_LEN, HEADER_LEN};

/// Owner of the spill-file namespace.
pub struct SpillDir {
    root: PathBuf,
    codec: Codec,
    next_file: AtomicU64,
}

impl SpillDir {
    /// Create (or reuse) the spill directory rooted at `root`.
    pub fn new(root: impl Into<PathBuf>, codec: Codec) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::Storage(format!("mkdir: {e}")))?;
        Ok(Self {
            root,
            codec,
            next_file: AtomicU64::new(0),
        })
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Next value of the monotonic file counter.
    pub fn next_file_id(&self) -> u64 {
        self.next_file.fetch_add(1, Ordering::Relaxed)
    }

    /// Path for a generation-phase run of the sort tagged `direction`.
    pub fn run_path(&self, direction: &str, file_id: u64) -> PathBuf {
        self.root.join(format!("{direction}-SMTemp-{file_id}"))
    }

    /// Path for a merge-pass output of the sort tagged `direction`.
    pub fn merge_path(&self, direction: &str, file_id: u64, pass: u32) -> PathBuf {
        self.root
            .join(format!("{direction}-SMTemp-{file_id}-{pass}"))
    }

    /// Path for a block-nested join's materialized right side.
    pub fn nested_path(&self, file_id: u64) -> PathBuf {
        self.root.join(format!("BNJtemp-{file_id}"))
    }

    pub fn create(&self, path: &Path, schema: Schema) -> Result<RunWriter> {
        RunWriter::create(path, schema, self.codec)
    }

    pub fn open(&self, path: &Path, schema: Schema, page_capacity: usize) -> Result<RunReader> {
        RunReader::open(path, schema, page_capacity)
    }

    /// Delete a spill file. Idempotent (no error if the path is gone).
    pub fn remove(&self, path: &Path) -> Result<()> {
        if path.exists() {
            fs::remove_file(path).map_err(|e| Error::Storage(format!("delete: {e}")))?;
            tracing::trace!(path = %path.display(), "removed spill file");
        }
        Ok(())
    }

    /// List files currently present under the spill root.
    pub fn list(&self) -> Result<Vec<PathBuf>> {
        let mut out = Vec::new();
        let entries =
            fs::read_dir(&self.root).map_err(|e| Error::Storage(format!("list: {e}")))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::Storage(format!("list: {e}")))?;
            if entry.path().is_file() {
                out.push(entry.path());
            }
        }
        Ok(out)
    }
}

/// Sequential writer for one run file.
pub struct RunWriter {
    out: BufWriter<File>,
    schema: Schema,
    codec: Codec,
    batches: u64,
}

impl RunWriter {
    pub fn create(path: &Path, schema: Schema, codec: Codec) -> Result<Self> {
        let file = File::create(path).map_err(|e| Error::Storage(format!("create: {e}")))?;
        tracing::trace!(path = %path.display(), "created spill file");
        Ok(Self {
            out: BufWriter::new(file),
            schema,
            codec,
            batches: 0,
        })
    }

    /// Append one batch as a framed record.
    pub fn write_batch(&mut self, batch: &Batch) -> Result<()> {
        let payload = frame::encode_tuples(&self.schema, batch.tuples())?;
        let uncompressed_len = payload.len() as u32;
        let compressed = codec::compress(self.codec, &payload)?;
        let compressed_len = compressed.len() as u32;

        let header = FrameHeader::new(
            self.codec,
            uncompressed_len,
            compressed_len,
            batch.len() as u32,
        );
        let header_bytes = header.to_bytes();

        let mut hasher = blake3::Hasher::new();
        hasher.update(&header_bytes);
        hasher.update(&compressed);
        let checksum: [u8; 32] = hasher.finalize().into();

        self.out
            .write_all(&header_bytes)
            .and_then(|_| self.out.write_all(&checksum))
            .and_then(|_| self.out.write_all(&compressed))
            .map_err(|e| Error::Storage(format!("write: {e}")))?;
        self.batches += 1;
        Ok(())
    }

    /// Flush and close the file.
    pub fn finish(mut self) -> Result<u64> {
        self.out
            .flush()
            .map_err(|e| Error::Storage(format!("flush: {e}")))?;
        Ok(self.batches)
    }
}

/// Sequential reader over one run file.
pub struct RunReader {
    input: BufReader<File>,
    schema: Schema,
    page_capacity: usize,
}

impl RunReader {
    pub fn open(path: &Path, schema: Schema, page_capacity: usize) -> Result<Self> {
        let file = File::open(path).map_err(|e| Error::Storage(format!("open: {e}")))?;
        Ok(Self {
            input: BufReader::new(file),
            schema,
            page_capacity,
        })
    }

    /// Read the next framed batch; `None` on a clean end-of-file.
    ///
    /// A frame cut short, a failed checksum, or an undecodable payload is
    /// surfaced as an error rather than silently truncating the stream.
    pub fn next_batch(&mut self) -> Result<Option<Batch>> {
        let mut header_bytes = [0u8; HEADER_LEN];
        if !read_exact_or_eof(&mut self.input, &mut header_bytes)? {
            return Ok(None);
        }
        let header = FrameHeader::from_bytes(&header_bytes)?;

        let mut checksum = [0u8; CHECKSUM_LEN];
        self.input
            .read_exact(&mut checksum)
            .map_err(|e| Error::Storage(format!("read checksum: {e}")))?;

        let mut compressed = vec![0u8; header.compressed_len as usize];
        self.input
            .read_exact(&mut compressed)
            .map_err(|e| Error::Storage(format!("read payload: {e}")))?;

        let mut hasher = blake3::Hasher::new();
        hasher.update(&header_bytes);
        hasher.update(&compressed);
        if <[u8; 32]>::from(hasher.finalize()) != checksum {
            return Err(Error::ChecksumMismatch);
        }

        let payload = codec::decompress(header.codec, &compressed)?;
        if payload.len() != header.uncompressed_len as usize {
            return Err(Error::Codec(format!(
                "frame length mismatch: {} declared, {} decoded",
                header.uncompressed_len,
                payload.len()
            )));
        }
        let tuples = frame::decode_tuples(&self.schema, header.tuple_count as usize, &payload)?;
        Ok(Some(Batch::from_tuples(self.page_capacity, tuples)))
    }
}

/// Fill `buf` exactly, or return false when the reader is already at EOF.
fn read_exact_or_eof(reader: &mut impl Read, buf: &mut [u8]) -> Result<bool> {
    let mut filled = 0usize;
    while filled < buf.len() {
        let n = reader
            .read(&mut buf[filled..])
            .map_err(|e| Error::Storage(format!("read: {e}")))?;
        if n == 0 {
            if filled == 0 {
                return Ok(false);
            }
            return Err(Error::Storage("truncated frame header".into()));
        }
        filled += n;
    }
    Ok(true)
}
