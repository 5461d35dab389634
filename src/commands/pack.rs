//! Pack files into an archive and write its manifest.
//!
//! Each input becomes one entry named after its file name. Payloads are written
//! back to back into the archive and their locations recorded in a TSV manifest
//! that `pakstream stream` consumes.

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use pakstream_lib::codec::CompressionKind;
use pakstream_lib::logging::{OperationTimer, format_bytes, format_percent};
use pakstream_lib::manifest::{ArchiveWriter, write_manifest};
use pakstream_lib::validation::{validate_compression_level, validate_file_exists};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use crate::commands::command::Command;

/// Compress files into a pakstream archive.
#[derive(Debug, Parser)]
#[command(
    name = "pack",
    about = "\x1b[38;5;72m[ARCHIVE]\x1b[0m        \x1b[36mCompress files into an archive and manifest\x1b[0m",
    long_about = r#"
Compress files into a pakstream archive.

Every input file is stored as one entry, named after its file name. Entries are
raw-deflate compressed unless --store is given, and their payloads are written
back to back into the archive. The manifest is a TSV with one row per entry
giving its name, offset, compressed size, uncompressed size and codec.

Empty input files are skipped with a warning. Two inputs with the same file name
are rejected.

Example usage:
  pakstream pack -i level0.dat level1.dat -o assets.pak -m assets.tsv
  pakstream pack -i *.txt -o text.pak -m text.tsv --level 9
"#
)]
pub struct Pack {
    /// Files to add to the archive
    #[arg(short = 'i', long = "input", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Archive file to write
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Manifest TSV to write
    #[arg(short = 'm', long = "manifest")]
    pub manifest: PathBuf,

    /// Deflate compression level (0-9)
    #[arg(long = "level", default_value = "6")]
    pub level: u32,

    /// Store entries without compression
    #[arg(long = "store", default_value = "false")]
    pub store: bool,
}

impl Pack {
    fn kind(&self) -> CompressionKind {
        if self.store { CompressionKind::Stored } else { CompressionKind::Deflate }
    }
}

impl Command for Pack {
    fn execute(&self, command_line: &str) -> Result<()> {
        log::debug!("Command line: {command_line}");
        for input in &self.inputs {
            validate_file_exists(input, "Input file")?;
        }
        validate_compression_level(self.level)?;

        let timer = OperationTimer::new("Packing archive");
        info!("Inputs: {}", self.inputs.len());
        info!("Archive: {}", self.output.display());
        info!("Manifest: {}", self.manifest.display());
        info!("Codec: {}", self.kind());

        let file = File::create(&self.output)
            .with_context(|| format!("Failed to create archive: {}", self.output.display()))?;
        let mut writer = ArchiveWriter::new(BufWriter::new(file), self.level);

        let mut names = HashSet::new();
        let mut total_uncompressed = 0u64;
        for input in &self.inputs {
            let Some(name) = input.file_name().and_then(|n| n.to_str()) else {
                bail!("Input has no usable file name: {}", input.display());
            };
            if !names.insert(name.to_string()) {
                bail!("Two inputs share the file name '{name}'");
            }

            let data =
                fs::read(input).with_context(|| format!("Failed to read: {}", input.display()))?;
            if data.is_empty() {
                warn!("Skipping empty input: {}", input.display());
                continue;
            }

            let entry = writer
                .add_entry(name, &data, self.kind())
                .with_context(|| format!("Failed to write entry '{name}'"))?;
            info!(
                "Added {}: {} -> {}",
                entry.name,
                format_bytes(entry.uncompressed_size as u64),
                format_bytes(entry.compressed_size as u64)
            );
            total_uncompressed += data.len() as u64;
        }

        let (_, entries) = writer
            .finish()
            .with_context(|| format!("Failed to flush archive: {}", self.output.display()))?;
        write_manifest(&self.manifest, &entries)?;

        let total_compressed: u64 = entries.iter().map(|e| e.compressed_size as u64).sum();
        if total_uncompressed > 0 {
            info!(
                "Archive is {} of the input size",
                format_percent(total_compressed as f64 / total_uncompressed as f64, 2)
            );
        }
        timer.log_completion(entries.len() as u64, total_uncompressed);
        Ok(())
    }
}
