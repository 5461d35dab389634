//! End-to-end streaming from archives on disk.
//!
//! These tests run the real `FileReader` and every dispatch strategy against
//! archives written with `ArchiveWriter`.

use pakstream_lib::codec::CompressionKind;
use pakstream_lib::dispatch::DispatchStrategy;
use pakstream_lib::errors::StreamError;
use pakstream_lib::manifest::read_manifest;
use pakstream_lib::reader::FileReader;
use pakstream_lib::stream::{
    DecompressionMode, DecompressionStage, DriverOptions, ReadRange, Request, RequestId,
    RequestStatus, StageConfig, StreamDriver,
};
use rstest::rstest;
use std::collections::HashMap;
use std::fs::OpenOptions;
use tempfile::TempDir;

use crate::helpers::{sample_data, write_archive};

fn file_stage(config: StageConfig) -> DecompressionStage {
    let reader = FileReader::new(config.num_io_threads).expect("Failed to start reader");
    DecompressionStage::with_strategy(config, Box::new(reader)).expect("Failed to create stage")
}

/// Run `requests` to completion, returning each request's status and output by id.
fn run(
    stage: &mut DecompressionStage,
    requests: Vec<Request>,
) -> HashMap<RequestId, (RequestStatus, Vec<u8>)> {
    let mut results = HashMap::new();
    StreamDriver::new(stage, DriverOptions::default()).run(requests, |request, status| {
        results.insert(request.id(), (status, request.take_destination()));
    });
    results
}

#[rstest]
#[case::dedicated(DispatchStrategy::Dedicated, CompressionKind::Deflate)]
#[case::work_stealing(DispatchStrategy::WorkStealing, CompressionKind::Deflate)]
#[case::inline(DispatchStrategy::Inline, CompressionKind::Deflate)]
#[case::stored(DispatchStrategy::Dedicated, CompressionKind::Stored)]
fn test_stream_whole_archive(#[case] strategy: DispatchStrategy, #[case] kind: CompressionKind) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let files: Vec<(String, Vec<u8>)> =
        (0..20).map(|i| (format!("file{i}.bin"), sample_data(1_000 + i * 3_700, i as u8))).collect();
    let named: Vec<(&str, Vec<u8>)> = files.iter().map(|(n, d)| (n.as_str(), d.clone())).collect();
    let on_disk = write_archive(dir.path(), &named, kind);

    let entries = read_manifest(&on_disk.manifest).expect("Failed to read manifest");
    assert_eq!(entries, on_disk.entries);

    let config = StageConfig::new(3, 2).with_worker_threads(2).with_dispatch_strategy(strategy);
    let mut stage = file_stage(config);
    let requests: Vec<Request> =
        entries.iter().map(|e| Request::whole_file(e.compression_info(&on_disk.archive))).collect();
    let ids: Vec<RequestId> = requests.iter().map(Request::id).collect();

    let results = run(&mut stage, requests);
    assert_eq!(results.len(), files.len());
    for (id, (_, data)) in ids.iter().zip(&files) {
        let (status, output) = &results[id];
        assert_eq!(*status, RequestStatus::Completed);
        assert_eq!(output, data);
    }
    assert!(stage.is_idle());
}

#[rstest]
#[case::head(0, 4_096)]
#[case::middle(100_000, 12_345)]
#[case::tail(190_000, 10_000)]
fn test_stream_partial_ranges(#[case] offset: usize, #[case] size: usize) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let data = sample_data(200_000, 42);
    let on_disk = write_archive(dir.path(), &[("big.bin", data.clone())], CompressionKind::Deflate);
    let info = on_disk.entries[0].compression_info(&on_disk.archive);

    let mut stage = file_stage(StageConfig::default());
    let request = Request::range_of(info, ReadRange::new(offset, size));
    let id = request.id();
    assert!(stage.prepare_request(&request));
    assert_eq!(request.mode(), Some(DecompressionMode::Partial));

    let results = run(&mut stage, vec![request]);
    let (status, output) = &results[&id];
    assert_eq!(*status, RequestStatus::Completed);
    assert_eq!(output.as_slice(), &data[offset..offset + size]);
}

#[test]
fn test_missing_archive_fails_every_request() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let on_disk = write_archive(
        dir.path(),
        &[("a", sample_data(500, 1)), ("b", sample_data(700, 2))],
        CompressionKind::Deflate,
    );
    let missing = dir.path().join("missing.pak");

    let mut stage = file_stage(StageConfig::new(1, 1));
    let requests: Vec<Request> =
        on_disk.entries.iter().map(|e| Request::whole_file(e.compression_info(&missing))).collect();

    let results = run(&mut stage, requests);
    assert_eq!(results.len(), 2);
    for (status, _) in results.values() {
        assert!(matches!(status, RequestStatus::Failed(StreamError::Read { .. })), "{status}");
    }
    assert!(stage.is_idle());
}

#[test]
fn test_truncated_archive_fails_only_the_cut_entry() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let on_disk = write_archive(
        dir.path(),
        &[("first", sample_data(3_000, 1)), ("second", sample_data(3_000, 2))],
        CompressionKind::Deflate,
    );
    let cut = on_disk.entries[1].offset + 1;
    OpenOptions::new()
        .write(true)
        .open(&on_disk.archive)
        .and_then(|f| f.set_len(cut))
        .expect("Failed to truncate archive");

    let mut stage = file_stage(StageConfig::default());
    let requests: Vec<Request> = on_disk
        .entries
        .iter()
        .map(|e| Request::whole_file(e.compression_info(&on_disk.archive)))
        .collect();
    let ids: Vec<RequestId> = requests.iter().map(Request::id).collect();

    let results = run(&mut stage, requests);
    assert_eq!(results[&ids[0]].0, RequestStatus::Completed);
    assert!(matches!(results[&ids[1]].0, RequestStatus::Failed(StreamError::Read { .. })));
}

#[test]
fn test_corrupt_payload_fails_with_decompression_error() {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let on_disk =
        write_archive(dir.path(), &[("junk", sample_data(8_000, 9))], CompressionKind::Deflate);
    let mut bytes = std::fs::read(&on_disk.archive).expect("Failed to read archive");
    for byte in &mut bytes {
        *byte = 0xFF;
    }
    std::fs::write(&on_disk.archive, &bytes).expect("Failed to rewrite archive");

    let mut stage = file_stage(StageConfig::default());
    let request = Request::whole_file(on_disk.entries[0].compression_info(&on_disk.archive));
    let id = request.id();
    let results = run(&mut stage, vec![request]);

    let (status, output) = &results[&id];
    assert!(matches!(status, RequestStatus::Failed(StreamError::Decompression { .. })), "{status}");
    assert!(output.iter().all(|&b| b == 0), "failed request destination must be untouched");
}
