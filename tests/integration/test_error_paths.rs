//! Error path integration tests.
//!
//! These tests verify that invalid configuration, malformed requests, bad
//! manifests and misbehaving jobs are reported without disturbing the stage.

use crossbeam_channel::unbounded;
use pakstream_lib::codec::CompressionKind;
use pakstream_lib::dispatch::{DispatchStrategy, InlineDispatcher, create_dispatcher};
use pakstream_lib::errors::StreamError;
use pakstream_lib::manifest::read_manifest;
use pakstream_lib::reader::MemoryReader;
use pakstream_lib::stream::{
    CompressionInfo, DecompressionStage, ReadRange, Request, RequestStatus, StageConfig,
    StageStatus,
};
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

use crate::helpers::{MEMORY_ARCHIVE, MemoryArchive};

fn inline_stage(archive: &MemoryArchive) -> DecompressionStage {
    let reader = MemoryReader::new().with_file(MEMORY_ARCHIVE, archive.bytes.clone());
    DecompressionStage::new(StageConfig::new(2, 2), Box::new(reader), Arc::new(InlineDispatcher))
        .expect("Failed to create stage")
}

// ==================== Configuration ====================

#[rstest]
#[case::no_reads(StageConfig::new(0, 2), "max-reads")]
#[case::no_jobs(StageConfig::new(2, 0), "max-jobs")]
#[case::no_io_threads(StageConfig::new(2, 2).with_io_threads(0), "io-threads")]
#[case::no_workers(StageConfig::new(2, 2).with_worker_threads(0), "threads")]
fn test_invalid_config_is_rejected(#[case] config: StageConfig, #[case] parameter: &str) {
    let result = DecompressionStage::with_strategy(config, Box::new(MemoryReader::new()));
    match result {
        Err(StreamError::InvalidParameter { parameter: p, .. }) => assert_eq!(p, parameter),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("config should be rejected"),
    }
}

#[test]
fn test_inline_strategy_needs_no_workers() {
    let config = StageConfig::new(1, 1)
        .with_worker_threads(0)
        .with_dispatch_strategy(DispatchStrategy::Inline);
    assert!(DecompressionStage::with_strategy(config, Box::new(MemoryReader::new())).is_ok());
    assert!(create_dispatcher(DispatchStrategy::Inline, 0).is_ok());
    assert!(create_dispatcher(DispatchStrategy::WorkStealing, 0).is_err());
}

// ==================== Requests ====================

#[test]
fn test_malformed_requests_never_take_a_slot() {
    let archive = MemoryArchive::uniform(1, 1000);
    let mut stage = inline_stage(&archive);
    let info = archive.entries[0].clone();

    let past_end = Request::range_of(info.clone(), ReadRange::new(900, 200));
    let short_destination = Request::new(info.clone(), ReadRange::new(0, 1000), vec![0u8; 10]);
    let no_payload = Request::whole_file(CompressionInfo { compressed_size: 0, ..info });

    for request in [&past_end, &short_destination, &no_payload] {
        assert!(stage.queue_request(request.clone()));
    }
    let mut status = StageStatus::default();
    stage.report_status(&mut status);
    assert_eq!(status.pending_reads, 0);
    assert_eq!(status.available_read_slots, 2);

    let finished = stage.take_finished();
    assert_eq!(finished.len(), 3);
    for request in &finished {
        assert!(matches!(
            stage.finalize_request(request),
            RequestStatus::Failed(StreamError::InvalidRequest { .. })
        ));
    }
    assert!(!stage.execute_requests());
    assert!(stage.is_idle());
}

#[test]
fn test_resubmitting_a_queued_request_is_ignored() {
    let archive = MemoryArchive::uniform(1, 1000);
    let mut stage = inline_stage(&archive);
    let request = archive.requests().remove(0);

    assert!(stage.queue_request(request.clone()));
    assert!(!stage.queue_request(request.clone()));
    assert_eq!(stage.num_pending_reads(), 1);

    while stage.execute_requests() {}
    assert_eq!(stage.take_finished().len(), 1);
    assert!(!stage.queue_request(request.clone()));
    assert_eq!(request.status(), RequestStatus::Completed);
}

#[test]
fn test_finalizing_an_unfinished_request_reports_its_state() {
    let archive = MemoryArchive::uniform(1, 1000);
    let mut stage = inline_stage(&archive);
    let request = archive.requests().remove(0);

    assert_eq!(stage.finalize_request(&request), RequestStatus::Submitted);
    stage.queue_request(request.clone());
    assert_eq!(stage.finalize_request(&request), RequestStatus::ReadPending);
}

#[test]
fn test_wait_for_events_returns_when_idle() {
    let archive = MemoryArchive::uniform(1, 1000);
    let mut stage = inline_stage(&archive);
    assert!(!stage.wait_for_events(Duration::from_secs(5)));
}

#[test]
fn test_stored_entry_with_mismatched_sizes_is_rejected() {
    let archive = MemoryArchive::uniform(1, 4000);
    let mut stage = inline_stage(&archive);
    let info = CompressionInfo { kind: CompressionKind::Stored, ..archive.entries[0].clone() };
    let request = Request::whole_file(info);
    stage.queue_request(request.clone());

    match request.status() {
        RequestStatus::Failed(StreamError::InvalidRequest { reason, .. }) => {
            assert!(reason.contains("stored entry sizes differ"), "{reason}");
        }
        other => panic!("unexpected status {other}"),
    }
    assert_eq!(stage.take_finished().len(), 1);
}

// ==================== Dispatchers ====================

#[rstest]
#[case::dedicated(DispatchStrategy::Dedicated)]
#[case::work_stealing(DispatchStrategy::WorkStealing)]
fn test_dispatcher_survives_panicking_job(#[case] strategy: DispatchStrategy) {
    let dispatcher = create_dispatcher(strategy, 1).expect("Failed to create dispatcher");
    let (tx, rx) = unbounded();

    dispatcher.submit(Box::new(|| panic!("job blew up")));
    dispatcher.submit(Box::new(move || tx.send(7).expect("receiver alive")));

    assert_eq!(rx.recv_timeout(Duration::from_secs(10)), Ok(7));
}

// ==================== Manifests ====================

#[test]
fn test_manifest_errors() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");

    let missing = temp_dir.path().join("missing.tsv");
    let err = read_manifest(&missing).expect_err("missing manifest should fail");
    assert!(format!("{err:#}").contains("Failed to read manifest"));

    let duplicate: PathBuf = temp_dir.path().join("dup.tsv");
    fs::write(
        &duplicate,
        "name\toffset\tcompressed_size\tuncompressed_size\tcodec\n\
         a\t0\t10\t20\tdeflate\n\
         a\t10\t10\t20\tdeflate\n",
    )
    .expect("Failed to write manifest");
    let err = read_manifest(&duplicate).expect_err("duplicate names should fail");
    assert!(format!("{err:#}").contains("more than once"));

    let bad_codec = temp_dir.path().join("codec.tsv");
    fs::write(
        &bad_codec,
        "name\toffset\tcompressed_size\tuncompressed_size\tcodec\n\
         a\t0\t10\t20\tzstd\n",
    )
    .expect("Failed to write manifest");
    assert!(read_manifest(&bad_codec).is_err());
}
