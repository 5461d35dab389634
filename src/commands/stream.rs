//! Stream archive entries through the bounded decompression stage.
//!
//! Every manifest entry (or the same sub-range of every entry) becomes one
//! request. The driver feeds them to the stage as read slots open up, and each
//! completed output is written to the output directory under the entry's name.

use anyhow::{Context, Result, bail};
use clap::Parser;
use log::{info, warn};
use pakstream_lib::logging::{OperationTimer, format_duration, log_statistics};
use pakstream_lib::manifest::{ManifestEntry, read_manifest};
use pakstream_lib::metrics::write_statistics;
use pakstream_lib::reader::FileReader;
use pakstream_lib::stream::{
    DecompressionStage, DriverOptions, ReadRange, Request, RequestId, RequestStatus,
    StreamDriver,
};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::commands::command::Command;
use crate::commands::common::{ArchiveOptions, StageOptions, StatsOptions};

/// Decompress archive entries through the streaming stage.
#[derive(Debug, Parser)]
#[command(
    name = "stream",
    about = "\x1b[38;5;72m[ARCHIVE]\x1b[0m        \x1b[36mStream archive entries through the decompression stage\x1b[0m",
    long_about = r#"
Stream archive entries through the bounded decompression stage.

Each entry in the manifest becomes one request. At most --max-reads payloads are
read from the archive at once and at most --max-jobs are decompressed at once;
remaining requests wait their turn in submission order. Each completed entry is
written to the output directory under its manifest name.

With --offset and/or --length only that byte range of every entry is produced.
The range is clamped to the end of each entry; an entry shorter than the offset
fails.

Statistics about queue delay, decompression speed and read times are logged at
the end and can be written to a TSV with --stats. The command exits with an
error if any request failed.

Example usage:
  pakstream stream -a assets.pak -m assets.tsv -o out/
  pakstream stream -a assets.pak -m assets.tsv -o out/ --max-reads 4 --max-jobs 4 -t 4
  pakstream stream -a assets.pak -m assets.tsv -o heads/ --length 1024 --stats stats.tsv
"#
)]
pub struct Stream {
    /// Archive and manifest
    #[command(flatten)]
    pub archive: ArchiveOptions,

    /// Directory the decompressed entries are written to
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// First byte of each entry to produce
    #[arg(long = "offset")]
    pub offset: Option<usize>,

    /// Number of bytes of each entry to produce
    #[arg(long = "length")]
    pub length: Option<usize>,

    /// Stage slot and threading options
    #[command(flatten)]
    pub stage: StageOptions,

    /// Statistics output
    #[command(flatten)]
    pub stats: StatsOptions,
}

impl Stream {
    fn is_ranged(&self) -> bool {
        self.offset.is_some() || self.length.is_some()
    }

    /// Build the request for one entry, clamping any sub-range to the entry.
    fn request_for(&self, entry: &ManifestEntry) -> Request {
        let info = entry.compression_info(&self.archive.archive);
        if !self.is_ranged() {
            return Request::whole_file(info);
        }
        let offset = self.offset.unwrap_or(0);
        let remaining = entry.uncompressed_size.saturating_sub(offset);
        let size = self.length.map_or(remaining, |length| length.min(remaining));
        Request::range_of(info, ReadRange::new(offset, size))
    }
}

impl Command for Stream {
    fn execute(&self, command_line: &str) -> Result<()> {
        log::debug!("Command line: {command_line}");
        self.archive.validate()?;
        self.stage.validate()?;
        if self.length == Some(0) {
            bail!("--length must be positive");
        }

        let entries = read_manifest(&self.archive.manifest)?;
        fs::create_dir_all(&self.output).with_context(|| {
            format!("Failed to create output directory: {}", self.output.display())
        })?;

        let timer = OperationTimer::new("Streaming archive");
        info!("Archive: {}", self.archive.archive.display());
        info!("Entries: {}", entries.len());
        info!("Output: {}", self.output.display());
        info!(
            "Read slots: {}, job slots: {}, dispatch: {} ({} threads)",
            self.stage.max_reads, self.stage.max_jobs, self.stage.dispatch, self.stage.threads
        );
        if self.is_ranged() {
            info!("Range: offset {} length {:?}", self.offset.unwrap_or(0), self.length);
        }

        let config = self.stage.to_config();
        let reader = FileReader::new(config.num_io_threads)?;
        let mut stage = DecompressionStage::with_strategy(config, Box::new(reader))?;

        let mut names: HashMap<RequestId, &str> = HashMap::with_capacity(entries.len());
        let requests: Vec<Request> = entries
            .iter()
            .map(|entry| {
                let request = self.request_for(entry);
                names.insert(request.id(), entry.name.as_str());
                request
            })
            .collect();

        let mut write_error: Option<anyhow::Error> = None;
        let summary = StreamDriver::new(&mut stage, DriverOptions::default()).run(
            requests,
            |request, status| {
                let name = names.get(&request.id()).copied().unwrap_or("<unknown>");
                match status {
                    RequestStatus::Completed => {
                        if write_error.is_some() {
                            return;
                        }
                        let path = self.output.join(name);
                        if let Err(e) = fs::write(&path, request.take_destination()) {
                            write_error = Some(anyhow::Error::new(e).context(format!(
                                "Failed to write output: {}",
                                path.display()
                            )));
                        }
                    }
                    RequestStatus::Failed(reason) => warn!("Entry '{name}' failed: {reason}"),
                    other => warn!("Entry '{name}' finished in unexpected state {other}"),
                }
            },
        );

        let mut statistics = Vec::new();
        stage.collect_statistics(&mut statistics);
        log_statistics(&statistics);
        if let Some(path) = &self.stats.stats {
            write_statistics(path, &statistics)?;
            info!("Wrote statistics to {}", path.display());
        }

        if let Some(e) = write_error {
            return Err(e);
        }

        info!(
            "Completed {} of {} entries in {}",
            summary.completed,
            entries.len(),
            format_duration(summary.elapsed)
        );
        if !summary.all_succeeded() {
            bail!("{} of {} entries failed to decompress", summary.failed, entries.len());
        }
        timer.log_completion(summary.completed, summary.bytes_delivered);
        Ok(())
    }
}
