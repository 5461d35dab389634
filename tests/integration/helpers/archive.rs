//! Builders for archive payloads and requests used across integration tests.

#![allow(dead_code)]

use flate2::Compression;
use flate2::write::DeflateEncoder;
use pakstream_lib::codec::CompressionKind;
use pakstream_lib::manifest::{ArchiveWriter, ManifestEntry, write_manifest};
use pakstream_lib::stream::{CompressionInfo, Request};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// In-memory archive name used with `MemoryReader` and `ManualReader`.
pub const MEMORY_ARCHIVE: &str = "memory.pak";

/// Raw-deflate `data` at the default level.
pub fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("Failed to deflate");
    encoder.finish().expect("Failed to finish deflate")
}

/// Deterministic, moderately compressible test data.
pub fn sample_data(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| ((i / 7) as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// An in-memory archive holding each of `contents` deflated back to back.
pub struct MemoryArchive {
    pub bytes: Vec<u8>,
    pub entries: Vec<CompressionInfo>,
    pub contents: Vec<Vec<u8>>,
}

impl MemoryArchive {
    /// Build an archive from `contents`.
    pub fn new(contents: Vec<Vec<u8>>) -> Self {
        let mut writer = ArchiveWriter::new(Vec::new(), 6);
        for (i, data) in contents.iter().enumerate() {
            writer
                .add_entry(&format!("entry{i}"), data, CompressionKind::Deflate)
                .expect("Failed to add entry");
        }
        let (bytes, manifest) = writer.finish().expect("Failed to finish archive");
        let entries =
            manifest.iter().map(|e| e.compression_info(Path::new(MEMORY_ARCHIVE))).collect();
        Self { bytes, entries, contents }
    }

    /// `count` entries of `len` bytes each, with distinct contents.
    pub fn uniform(count: usize, len: usize) -> Self {
        Self::new((0..count).map(|i| sample_data(len, i as u8)).collect())
    }

    /// Whole-file requests for every entry, in order.
    pub fn requests(&self) -> Vec<Request> {
        self.entries.iter().cloned().map(Request::whole_file).collect()
    }
}

/// Files written for a CLI or file-reader test.
pub struct ArchiveOnDisk {
    pub archive: PathBuf,
    pub manifest: PathBuf,
    pub entries: Vec<ManifestEntry>,
}

/// Write `files` into an archive and manifest under `dir`.
pub fn write_archive(dir: &Path, files: &[(&str, Vec<u8>)], kind: CompressionKind) -> ArchiveOnDisk {
    let archive = dir.join("test.pak");
    let manifest = dir.join("test.tsv");
    let file = fs::File::create(&archive).expect("Failed to create archive");
    let mut writer = ArchiveWriter::new(file, 6);
    for (name, data) in files {
        writer.add_entry(name, data, kind).expect("Failed to add entry");
    }
    let (_, entries) = writer.finish().expect("Failed to finish archive");
    write_manifest(&manifest, &entries).expect("Failed to write manifest");
    ArchiveOnDisk { archive, manifest, entries }
}
