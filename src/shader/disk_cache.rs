//! Append-only on-disk bytecode store.
//!
//! # File layout
//!
//! ```text
//! header:  magic "DCAC" | format version u32 | key size u32 | version hash u128
//! record:  key bytes [key size] | payload length u32 | payload [length]
//! ```
//!
//! All integers are little-endian. The version hash is the xxh3-128 of the
//! configured cache version string, so bytecode from an incompatible build is
//! never replayed. The file is read fully when opened and only appended to
//! afterwards. A torn trailing record (e.g. after a crash mid-append) ends the
//! replay and is cut off so new records stay reachable.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use xxhash_rust::xxh3::xxh3_128;

use super::uid::ShaderUid;
use crate::errors::{Result, ShaderCacheError};

const CACHE_MAGIC: [u8; 4] = *b"DCAC";
const FORMAT_VERSION: u32 = 1;
const HEADER_SIZE: usize = 4 + 4 + 4 + 16;
const LENGTH_SIZE: usize = 4;

/// Payloads above this size are treated as corruption rather than allocated.
pub const MAX_PAYLOAD_SIZE: u32 = 64 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Header {
    magic: [u8; 4],
    format_version: u32,
    key_size: u32,
    version_hash: u128,
}

impl Header {
    fn current<U: ShaderUid>(version: &str) -> Self {
        Self {
            magic: CACHE_MAGIC,
            format_version: FORMAT_VERSION,
            key_size: size_of::<U>() as u32,
            version_hash: xxh3_128(version.as_bytes()),
        }
    }

    fn to_bytes(self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.magic);
        out[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        out[8..12].copy_from_slice(&self.key_size.to_le_bytes());
        out[12..28].copy_from_slice(&self.version_hash.to_le_bytes());
        out
    }

    fn parse(bytes: &[u8]) -> Option<Self> {
        let bytes: &[u8; HEADER_SIZE] = bytes.get(..HEADER_SIZE)?.try_into().ok()?;
        Some(Self {
            magic: bytes[0..4].try_into().ok()?,
            format_version: u32::from_le_bytes(bytes[4..8].try_into().ok()?),
            key_size: u32::from_le_bytes(bytes[8..12].try_into().ok()?),
            version_hash: u128::from_le_bytes(bytes[12..28].try_into().ok()?),
        })
    }
}

/// One stage's persistent cache file, open for appending.
pub struct LinearDiskCache<U: ShaderUid> {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    // File length up to the end of the last complete record.
    committed_len: u64,
    num_entries: usize,
    _uid: PhantomData<fn() -> U>,
}

impl<U: ShaderUid> std::fmt::Debug for LinearDiskCache<U> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearDiskCache")
            .field("path", &self.path)
            .field("open", &self.writer.is_some())
            .field("num_entries", &self.num_entries)
            .finish()
    }
}

impl<U: ShaderUid> LinearDiskCache<U> {
    /// Opens (or creates) the cache file and hands every valid record to `visitor`.
    ///
    /// Header mismatches discard the file contents; a corrupt tail is
    /// truncated. Both are logged and are not errors. Only failure to open or
    /// read the file at all is returned, as [`ShaderCacheError::DiskCacheUnavailable`].
    pub fn open_and_load(
        path: impl Into<PathBuf>,
        version: &str,
        mut visitor: impl FnMut(U, &[u8]),
    ) -> Result<Self> {
        let path = path.into();
        let mut file = open_rw(&path, false)?;

        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .map_err(|source| unavailable(&path, source))?;

        let expected = Header::current::<U>(version);
        let mut good_end = HEADER_SIZE as u64;
        let mut num_entries = 0;

        match Header::parse(&contents) {
            Some(header) if header == expected => {
                let (count, end) = replay(&contents, &mut visitor);
                num_entries = count;
                good_end = end;
                if end < contents.len() as u64 {
                    log::warn!(
                        "{} in {}, dropping {} trailing bytes",
                        ShaderCacheError::CorruptRecord { offset: end },
                        path.display(),
                        contents.len() as u64 - end
                    );
                }
            }
            _ => {
                if !contents.is_empty() {
                    log::warn!(
                        "{}, starting from an empty cache",
                        ShaderCacheError::DiskCacheHeaderMismatch { path: path.clone() }
                    );
                }
                file.set_len(0)?;
                file.seek(SeekFrom::Start(0))?;
                file.write_all(&expected.to_bytes())?;
            }
        }

        file.set_len(good_end)?;
        file.seek(SeekFrom::Start(good_end))?;

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            committed_len: good_end,
            num_entries,
            _uid: PhantomData,
        })
    }

    /// Creates an empty cache file, discarding whatever was stored before.
    pub fn create_truncated(path: impl Into<PathBuf>, version: &str) -> Result<Self> {
        let path = path.into();
        let mut file = open_rw(&path, true)?;
        file.write_all(&Header::current::<U>(version).to_bytes())?;

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            committed_len: HEADER_SIZE as u64,
            num_entries: 0,
            _uid: PhantomData,
        })
    }

    /// Appends one record and hands it to the operating system. Call
    /// [`sync`](Self::sync) to force it to disk.
    ///
    /// If a write fails the partial record is cut off and the cache closes
    /// itself, so a torn record never shadows later ones. Appending to a
    /// closed cache is a no-op.
    pub fn append(&mut self, uid: &U, payload: &[u8]) -> Result<()> {
        let Some(writer) = self.writer.as_mut() else {
            return Ok(());
        };
        let len = u32::try_from(payload.len())
            .ok()
            .filter(|len| *len <= MAX_PAYLOAD_SIZE)
            .ok_or_else(|| {
                std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("payload of {} bytes is too large", payload.len()),
                )
            })?;

        let written = writer
            .write_all(uid.key_bytes())
            .and_then(|()| writer.write_all(&len.to_le_bytes()))
            .and_then(|()| writer.write_all(payload))
            .and_then(|()| writer.flush());
        if let Err(err) = written {
            self.abandon();
            return Err(err.into());
        }

        self.committed_len += (size_of::<U>() + LENGTH_SIZE + payload.len()) as u64;
        self.num_entries += 1;
        Ok(())
    }

    /// Drops the writer without flushing and truncates the file back to the
    /// last complete record.
    fn abandon(&mut self) {
        if let Some(writer) = self.writer.take() {
            drop(writer.into_parts());
        }
        let truncated = OpenOptions::new()
            .write(true)
            .open(&self.path)
            .and_then(|file| file.set_len(self.committed_len));
        if let Err(err) = truncated {
            log::warn!(
                "Failed to roll back partial record in {}: {err}",
                self.path.display()
            );
        }
        log::warn!(
            "Stopped appending to {} after a failed write",
            self.path.display()
        );
    }

    /// Flushes buffered records to the operating system and the disk.
    pub fn sync(&mut self) -> Result<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
            writer.get_ref().sync_data()?;
        }
        Ok(())
    }

    /// Flushes and closes the file. Further appends are ignored.
    pub fn close(&mut self) -> Result<()> {
        self.sync()?;
        self.writer = None;
        Ok(())
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Records replayed at open plus records appended since.
    #[must_use]
    pub fn num_entries(&self) -> usize {
        self.num_entries
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_rw(path: &Path, truncate: bool) -> Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path)
        .map_err(|source| unavailable(path, source))
}

fn unavailable(path: &Path, source: std::io::Error) -> ShaderCacheError {
    ShaderCacheError::DiskCacheUnavailable {
        path: path.to_path_buf(),
        source,
    }
}

/// Walks the records after the header. Returns the number of valid records
/// and the offset just past the last one.
fn replay<U: ShaderUid>(contents: &[u8], visitor: &mut impl FnMut(U, &[u8])) -> (usize, u64) {
    let key_size = size_of::<U>();
    let mut offset = HEADER_SIZE;
    let mut count = 0;

    while offset < contents.len() {
        let Some(record) = read_record::<U>(&contents[offset..], key_size) else {
            break;
        };
        let (uid, payload, consumed) = record;
        visitor(uid, payload);
        offset += consumed;
        count += 1;
    }

    (count, offset as u64)
}

fn read_record<U: ShaderUid>(bytes: &[u8], key_size: usize) -> Option<(U, &[u8], usize)> {
    let key = bytes.get(..key_size)?;
    let len_bytes = bytes.get(key_size..key_size + LENGTH_SIZE)?;
    let len = u32::from_le_bytes(len_bytes.try_into().ok()?);
    if len > MAX_PAYLOAD_SIZE {
        return None;
    }
    let start = key_size + LENGTH_SIZE;
    let payload = bytes.get(start..start + len as usize)?;
    let uid = U::from_key_bytes(key)?;
    Some((uid, payload, start + len as usize))
}
