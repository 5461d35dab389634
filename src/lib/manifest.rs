//! Archive manifests and the archive writer.
//!
//! An archive is a plain concatenation of entry payloads. Where each payload lives
//! is recorded in a separate TSV manifest with one [`ManifestEntry`] per entry:
//!
//! ```text
//! name        offset  compressed_size  uncompressed_size  codec
//! level0.dat  0       48213            262144             deflate
//! readme.txt  48213   311              311                stored
//! ```

use anyhow::{Context, Result, bail};
use fgoxide::io::DelimFile;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::path::{Component, Path};

use crate::codec::CompressionKind;
use crate::stream::CompressionInfo;

/// One entry of an archive manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Name of the entry, used as its output file name.
    pub name: String,
    /// Byte offset of the payload within the archive.
    pub offset: u64,
    /// Size of the payload as stored.
    pub compressed_size: usize,
    /// Size of the entry once decompressed.
    pub uncompressed_size: usize,
    /// How the payload is encoded.
    pub codec: CompressionKind,
}

impl ManifestEntry {
    /// Where to find this entry in `archive`.
    #[must_use]
    pub fn compression_info(&self, archive: &Path) -> CompressionInfo {
        CompressionInfo {
            archive: archive.to_path_buf(),
            offset: self.offset,
            compressed_size: self.compressed_size,
            uncompressed_size: self.uncompressed_size,
            kind: self.codec,
        }
    }
}

/// True if `name` is a single plain file name, so it cannot resolve outside the
/// directory it is joined onto.
#[must_use]
pub fn is_plain_file_name(name: &str) -> bool {
    if name.contains(['/', '\\']) {
        return false;
    }
    let mut components = Path::new(name).components();
    matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

/// Read a manifest from a TSV file.
///
/// # Errors
/// Returns an error if the file cannot be read or parsed, an entry name is not a
/// plain file name, or two entries share a name.
pub fn read_manifest<P: AsRef<Path>>(path: P) -> Result<Vec<ManifestEntry>> {
    let path = path.as_ref();
    let entries: Vec<ManifestEntry> = DelimFile::default()
        .read_tsv(&path)
        .with_context(|| format!("Failed to read manifest: {}", path.display()))?;

    let mut names = std::collections::HashSet::new();
    for entry in &entries {
        if !is_plain_file_name(&entry.name) {
            bail!("Manifest {} has invalid entry name '{}'", path.display(), entry.name);
        }
        if !names.insert(entry.name.as_str()) {
            bail!("Manifest {} lists entry '{}' more than once", path.display(), entry.name);
        }
    }
    Ok(entries)
}

/// Write a manifest to a TSV file.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_manifest<P: AsRef<Path>>(path: P, entries: &[ManifestEntry]) -> Result<()> {
    crate::metrics::write_metrics(path, entries, "manifest")
}

/// Packs entries into an archive stream, tracking their manifest entries.
///
/// # Example
/// ```
/// use pakstream_lib::codec::CompressionKind;
/// use pakstream_lib::manifest::ArchiveWriter;
///
/// let mut writer = ArchiveWriter::new(Vec::new(), 6);
/// writer.add_entry("a.txt", b"aaaaaaaaaaaaaaaa", CompressionKind::Deflate).unwrap();
/// writer.add_entry("b.txt", b"bee", CompressionKind::Stored).unwrap();
/// let (archive, entries) = writer.finish().unwrap();
///
/// assert_eq!(entries[1].offset, entries[0].compressed_size as u64);
/// assert_eq!(archive.len(), entries[0].compressed_size + 3);
/// ```
pub struct ArchiveWriter<W: Write> {
    inner: W,
    level: Compression,
    offset: u64,
    entries: Vec<ManifestEntry>,
}

impl<W: Write> ArchiveWriter<W> {
    /// Create a writer with deflate compression `level` (0-9).
    pub fn new(inner: W, level: u32) -> Self {
        Self { inner, level: Compression::new(level), offset: 0, entries: Vec::new() }
    }

    /// Encode `data` with `kind` and append it to the archive.
    ///
    /// # Errors
    /// Returns an error if `name` is not a plain file name, or compression or the
    /// underlying write fails.
    pub fn add_entry(
        &mut self,
        name: &str,
        data: &[u8],
        kind: CompressionKind,
    ) -> io::Result<&ManifestEntry> {
        if !is_plain_file_name(name) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid entry name '{name}'"),
            ));
        }
        let compressed_size = match kind {
            CompressionKind::Stored => {
                self.inner.write_all(data)?;
                data.len()
            }
            CompressionKind::Deflate => {
                let mut encoder = DeflateEncoder::new(Vec::new(), self.level);
                encoder.write_all(data)?;
                let payload = encoder.finish()?;
                self.inner.write_all(&payload)?;
                payload.len()
            }
        };

        let entry = ManifestEntry {
            name: name.to_string(),
            offset: self.offset,
            compressed_size,
            uncompressed_size: data.len(),
            codec: kind,
        };
        self.offset += compressed_size as u64;
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Number of bytes written so far.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.offset
    }

    /// Flush the archive and return the inner writer and the manifest entries.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn finish(mut self) -> io::Result<(W, Vec<ManifestEntry>)> {
        self.inner.flush()?;
        Ok((self.inner, self.entries))
    }
}
