//! Integration tests for the `pack` and `stream` commands.

use pakstream_lib::codec::CompressionKind;
use pakstream_lib::manifest::read_manifest;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

use crate::helpers::{sample_data, write_archive};

fn pakstream(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_pakstream"))
        .args(args)
        .output()
        .expect("Failed to run pakstream")
}

fn path_str(path: &Path) -> &str {
    path.to_str().expect("temp paths are UTF-8")
}

/// Write `count` input files into `dir` and return their paths and contents.
fn write_inputs(dir: &Path, count: usize) -> Vec<(PathBuf, Vec<u8>)> {
    (0..count)
        .map(|i| {
            let path = dir.join(format!("asset{i}.dat"));
            let data = sample_data(5_000 * (i + 1), i as u8);
            fs::write(&path, &data).expect("Failed to write input");
            (path, data)
        })
        .collect()
}

#[test]
fn test_pack_then_stream_round_trip() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let inputs = write_inputs(temp_dir.path(), 4);
    let archive = temp_dir.path().join("assets.pak");
    let manifest = temp_dir.path().join("assets.tsv");
    let out_dir = temp_dir.path().join("out");
    let stats = temp_dir.path().join("stats.tsv");

    let mut args = vec!["pack", "-o", path_str(&archive), "-m", path_str(&manifest), "-i"];
    args.extend(inputs.iter().map(|(p, _)| path_str(p)));
    let output = pakstream(&args);
    assert!(output.status.success(), "pack failed: {}", String::from_utf8_lossy(&output.stderr));

    let entries = read_manifest(&manifest).expect("Failed to read manifest");
    assert_eq!(entries.len(), 4);
    assert!(entries.iter().all(|e| e.codec == CompressionKind::Deflate));

    let output = pakstream(&[
        "stream",
        "-a",
        path_str(&archive),
        "-m",
        path_str(&manifest),
        "-o",
        path_str(&out_dir),
        "--max-reads",
        "2",
        "--max-jobs",
        "1",
        "--threads",
        "2",
        "--dispatch",
        "work-stealing",
        "--stats",
        path_str(&stats),
    ]);
    assert!(output.status.success(), "stream failed: {}", String::from_utf8_lossy(&output.stderr));

    for (path, data) in &inputs {
        let name = path.file_name().expect("input has a file name");
        let streamed = fs::read(out_dir.join(name)).expect("Failed to read streamed output");
        assert_eq!(&streamed, data);
    }

    let stats = fs::read_to_string(&stats).expect("Failed to read statistics");
    let mut lines = stats.lines();
    assert_eq!(lines.next(), Some("owner\tname\tvalue"));
    assert!(stats.contains("Decompressor\tRequests completed\t4"), "{stats}");
    assert!(stats.contains("Decompressor\tRequests failed\t0"), "{stats}");
    assert!(stats.contains("Read duration (avg. us)"));
}

#[test]
fn test_stream_ranged_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let data = sample_data(50_000, 5);
    let on_disk =
        write_archive(temp_dir.path(), &[("big.bin", data.clone())], CompressionKind::Deflate);
    let out_dir = temp_dir.path().join("out");

    let output = pakstream(&[
        "stream",
        "-a",
        path_str(&on_disk.archive),
        "-m",
        path_str(&on_disk.manifest),
        "-o",
        path_str(&out_dir),
        "--offset",
        "1000",
        "--length",
        "2500",
    ]);
    assert!(output.status.success(), "stream failed: {}", String::from_utf8_lossy(&output.stderr));

    let streamed = fs::read(out_dir.join("big.bin")).expect("Failed to read output");
    assert_eq!(streamed.as_slice(), &data[1000..3500]);
}

#[test]
fn test_stream_fails_when_entry_is_unreadable() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let on_disk = write_archive(
        temp_dir.path(),
        &[("ok.bin", sample_data(2_000, 1)), ("cut.bin", sample_data(2_000, 2))],
        CompressionKind::Stored,
    );
    let keep = on_disk.entries[1].offset as usize + 10;
    let bytes = fs::read(&on_disk.archive).expect("Failed to read archive");
    fs::write(&on_disk.archive, &bytes[..keep]).expect("Failed to truncate archive");
    let out_dir = temp_dir.path().join("out");

    let output = pakstream(&[
        "stream",
        "-a",
        path_str(&on_disk.archive),
        "-m",
        path_str(&on_disk.manifest),
        "-o",
        path_str(&out_dir),
    ]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("1 of 2 entries failed"), "{stderr}");
    assert!(out_dir.join("ok.bin").exists());
    assert!(!out_dir.join("cut.bin").exists());
}

#[test]
fn test_stream_rejects_missing_archive() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let on_disk =
        write_archive(temp_dir.path(), &[("a", sample_data(100, 0))], CompressionKind::Deflate);

    let output = pakstream(&[
        "stream",
        "-a",
        path_str(&temp_dir.path().join("nope.pak")),
        "-m",
        path_str(&on_disk.manifest),
        "-o",
        path_str(&temp_dir.path().join("out")),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("File does not exist"));
}

#[test]
fn test_stream_rejects_zero_slots() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let on_disk =
        write_archive(temp_dir.path(), &[("a", sample_data(100, 0))], CompressionKind::Deflate);

    let output = pakstream(&[
        "stream",
        "-a",
        path_str(&on_disk.archive),
        "-m",
        path_str(&on_disk.manifest),
        "-o",
        path_str(&temp_dir.path().join("out")),
        "--max-jobs",
        "0",
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("max-jobs"));
}

#[test]
fn test_pack_store_flag() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let inputs = write_inputs(temp_dir.path(), 2);
    let archive = temp_dir.path().join("stored.pak");
    let manifest = temp_dir.path().join("stored.tsv");

    let output = pakstream(&[
        "pack",
        "--store",
        "-o",
        path_str(&archive),
        "-m",
        path_str(&manifest),
        "-i",
        path_str(&inputs[0].0),
        path_str(&inputs[1].0),
    ]);
    assert!(output.status.success());

    let entries = read_manifest(&manifest).expect("Failed to read manifest");
    assert!(entries.iter().all(|e| e.codec == CompressionKind::Stored));
    let total: usize = inputs.iter().map(|(_, d)| d.len()).sum();
    assert_eq!(fs::metadata(&archive).expect("archive exists").len(), total as u64);
}

#[test]
fn test_stream_rejects_entry_names_outside_output() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let on_disk = write_archive(
        temp_dir.path(),
        &[("escaped.bin", sample_data(1_000, 4))],
        CompressionKind::Deflate,
    );
    let manifest = fs::read_to_string(&on_disk.manifest).expect("Failed to read manifest");
    fs::write(&on_disk.manifest, manifest.replace("escaped.bin", "../escaped.bin"))
        .expect("Failed to rewrite manifest");
    let out_dir = temp_dir.path().join("out");

    let output = pakstream(&[
        "stream",
        "-a",
        path_str(&on_disk.archive),
        "-m",
        path_str(&on_disk.manifest),
        "-o",
        path_str(&out_dir),
    ]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("invalid entry name"));
    assert!(!temp_dir.path().join("escaped.bin").exists());
}
