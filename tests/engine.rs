mod support;

use std::{path::Path, sync::atomic::Ordering};

use support::{FakeZfs, RECORD_SIZE, content, dataset, write_file};
use tempfile::TempDir;
use zrecsync::{
   Error,
   engine::{SyncEngine, SyncOptions},
   record::CompareMode,
};

fn hash_options() -> SyncOptions {
   SyncOptions { mode: CompareMode::Hash, fsync: false, ..SyncOptions::default() }
}

fn read(path: &Path) -> Vec<u8> {
   std::fs::read(path).expect("read file")
}

#[tokio::test]
async fn grown_source_copies_only_the_new_record() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("dst.img");
   write_file(&src, &content(b"AB"));
   write_file(&dst, &content(b"A"));

   let engine = SyncEngine::new(FakeZfs::new(vec![vol]));
   let plan = engine.plan(&src, &dst, &hash_options()).await.expect("plan");
   assert_eq!(plan.diff.offsets(), &[RECORD_SIZE]);

   let report = engine
      .run(&src, &dst, &hash_options(), &mut ())
      .await
      .expect("sync");
   let stats = report.stats.expect("copy stats");
   assert_eq!(stats.written, 1);
   assert_eq!(stats.bytes_written, RECORD_SIZE);
   assert_eq!(report.source_size, 2 * RECORD_SIZE);
   assert_eq!(report.destination_size, RECORD_SIZE);
   assert_eq!(std::fs::metadata(&dst).expect("dst meta").len(), 2 * RECORD_SIZE);
   assert_eq!(read(&src), read(&dst));
}

#[tokio::test]
async fn second_run_finds_nothing_to_do() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("dst.img");
   write_file(&src, &content(b"abc\0efgh\0"));
   write_file(&dst, &content(b"axc\0eZgh\0jk"));

   let engine = SyncEngine::new(FakeZfs::new(vec![vol]));
   let first = engine.run(&src, &dst, &hash_options(), &mut ()).await.expect("first sync");
   assert_eq!(first.diff_records, 2);
   assert_eq!(read(&src), read(&dst));

   let second = engine.plan(&src, &dst, &hash_options()).await.expect("second plan");
   assert!(second.diff.is_empty());
   assert!(second.is_in_sync());
}

#[tokio::test]
async fn shrunk_source_truncates_without_writing_the_tail() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("dst.img");
   write_file(&src, &content(b"ab"));
   write_file(&dst, &content(b"abcde"));

   let engine = SyncEngine::new(FakeZfs::new(vec![vol]));
   let report = engine.run(&src, &dst, &hash_options(), &mut ()).await.expect("sync");

   assert_eq!(report.diff_records, 0);
   assert_eq!(report.records_written(), 0);
   assert_eq!(read(&src), read(&dst));
}

#[tokio::test]
async fn dry_run_leaves_destination_untouched() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("dst.img");
   write_file(&src, &content(b"xyz"));
   write_file(&dst, &content(b"xy"));
   let before = read(&dst);

   let engine = SyncEngine::new(FakeZfs::new(vec![vol]));
   let options = SyncOptions { dry_run: true, ..hash_options() };
   let report = engine.run(&src, &dst, &options, &mut ()).await.expect("dry run");

   assert!(report.dry_run);
   assert_eq!(report.diff_records, 1);
   assert_eq!(report.planned_bytes, RECORD_SIZE);
   assert!(report.stats.is_none() && report.copy.is_none());
   assert_eq!(read(&dst), before);
}

#[tokio::test]
async fn dry_run_requires_destination() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("missing.img");
   write_file(&src, &content(b"a"));

   let engine = SyncEngine::new(FakeZfs::new(vec![vol]));
   let options = SyncOptions { dry_run: true, ..hash_options() };
   let err = engine.run(&src, &dst, &options, &mut ()).await.expect_err("must fail");
   assert!(matches!(err, Error::DestinationMissing(_)));
   assert_eq!(err.exit_code(), 2);
   assert!(!dst.exists());
}

#[tokio::test]
async fn missing_source_is_a_precondition_failure() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let engine = SyncEngine::new(FakeZfs::new(vec![vol.clone()]));

   let err = engine
      .run(&vol.mountpoint.join("nope"), &vol.mountpoint.join("dst"), &hash_options(), &mut ())
      .await
      .expect_err("must fail");
   assert!(matches!(err, Error::SourceMissing(_)));
}

#[tokio::test]
async fn missing_destination_is_created_and_filled() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("new.img");
   let mut data = content(b"a\0c");
   data.truncate(data.len() - 100);
   write_file(&src, &data);

   let engine = SyncEngine::new(FakeZfs::new(vec![vol]));
   let report = engine.run(&src, &dst, &hash_options(), &mut ()).await.expect("sync");

   assert!(report.destination_created);
   assert_eq!(report.destination_size, 0);
   // The hole in the middle is left to the resize.
   assert_eq!(report.diff_records, 2);
   assert_eq!(engine.zfs().scans.load(Ordering::SeqCst), 1);
   assert_eq!(read(&src), read(&dst));
}

#[tokio::test]
async fn record_size_mismatch_aborts_before_writing() {
   let tmp = TempDir::new().expect("temp dir");
   let small = dataset(&tmp, "small");
   let large = dataset(&tmp, "large");
   let src = small.mountpoint.join("src.img");
   let dst = large.mountpoint.join("dst.img");
   write_file(&src, &content(b"ab"));
   write_file(&dst, &content(b"cd"));
   let before = read(&dst);

   let mut zfs = FakeZfs::new(vec![small, large]);
   zfs.record_sizes.insert("tank/large".into(), 128 * 1024);
   let engine = SyncEngine::new(zfs);

   let err = engine.run(&src, &dst, &hash_options(), &mut ()).await.expect_err("must fail");
   assert!(matches!(
      err,
      Error::RecordSizeMismatch { source_size: 4096, destination_size: 131072 }
   ));
   assert_eq!(engine.zfs().scans.load(Ordering::SeqCst), 0);
   assert_eq!(read(&dst), before);
}

#[tokio::test]
async fn failing_scan_aborts_the_run() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("dst.img");
   write_file(&src, &content(b"ab"));
   write_file(&dst, &content(b"cd"));
   let before = read(&dst);

   let mut zfs = FakeZfs::new(vec![vol]);
   zfs.failing.insert(dst.canonicalize().expect("canonical dst"));
   let engine = SyncEngine::new(zfs);

   let err = engine.run(&src, &dst, &hash_options(), &mut ()).await.expect_err("must fail");
   assert!(matches!(err, Error::ExternalTool { .. }));
   assert_eq!(err.exit_code(), 3);
   assert_eq!(read(&dst), before);
}

#[tokio::test]
async fn unknown_records_are_rewritten_and_optimize_skips_them() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("dst.img");
   write_file(&src, &content(b"abc"));
   write_file(&dst, &content(b"abX"));

   let zfs = FakeZfs::new(vec![vol]);
   zfs.mark_unknown(&dst, RECORD_SIZE);
   let engine = SyncEngine::new(zfs);

   let options = SyncOptions { optimize: true, ..hash_options() };
   let report = engine.run(&src, &dst, &options, &mut ()).await.expect("sync");
   let stats = report.stats.expect("copy stats");

   assert_eq!(report.diff_records, 2);
   assert_eq!(stats.planned, 2);
   assert_eq!(stats.written, 1);
   assert_eq!(stats.skipped, 1);
   assert_eq!(read(&src), read(&dst));
}

#[tokio::test]
async fn address_mode_is_forced_to_hash_without_ancestry() {
   let tmp = TempDir::new().expect("temp dir");
   let a = dataset(&tmp, "a");
   let b = dataset(&tmp, "b");
   let src = a.mountpoint.join("src.img");
   let dst = b.mountpoint.join("dst.img");
   write_file(&src, &content(b"ab"));
   write_file(&dst, &content(b"aa"));

   let engine = SyncEngine::new(FakeZfs::new(vec![a, b]));
   let options = SyncOptions { mode: CompareMode::Address, dry_run: true, ..hash_options() };
   let report = engine.run(&src, &dst, &options, &mut ()).await.expect("dry run");

   assert!(report.mode_forced);
   assert_eq!(report.mode, CompareMode::Hash);
   assert_eq!(report.diff_records, 1);
}

#[tokio::test]
async fn address_mode_kept_for_clones() {
   let tmp = TempDir::new().expect("temp dir");
   let base = dataset(&tmp, "base");
   let clone = dataset(&tmp, "clone");
   let src = base.mountpoint.join("src.img");
   let dst = clone.mountpoint.join("dst.img");
   write_file(&src, &content(b"abc"));
   write_file(&dst, &content(b"abd"));

   let mut zfs = FakeZfs::new(vec![base, clone]);
   zfs.origins.insert("tank/clone".into(), "tank/base@snap".into());
   let engine = SyncEngine::new(zfs);

   let mut updates = Vec::new();
   let options = SyncOptions { mode: CompareMode::Address, ..hash_options() };
   let report = engine
      .run(&src, &dst, &options, &mut |u: zrecsync::apply::ApplyUpdate| updates.push(u.done))
      .await
      .expect("sync");

   assert!(!report.mode_forced);
   assert_eq!(report.mode, CompareMode::Address);
   assert_eq!(report.diff_records, 1);
   assert_eq!(updates, vec![1]);
   assert_eq!(engine.zfs().flushes.load(Ordering::SeqCst), 1);
   assert_eq!(read(&src), read(&dst));
}

#[tokio::test]
async fn flush_can_be_disabled() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("dst.img");
   write_file(&src, &content(b"a"));
   write_file(&dst, &content(b"a"));

   let engine = SyncEngine::new(FakeZfs::new(vec![vol]));
   let options = SyncOptions { flush_before_scan: false, ..hash_options() };
   engine.run(&src, &dst, &options, &mut ()).await.expect("sync");
   assert_eq!(engine.zfs().flushes.load(Ordering::SeqCst), 0);
   assert_eq!(engine.zfs().scans.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn embedded_records_are_rewritten_in_address_mode() {
   let tmp = TempDir::new().expect("temp dir");
   let base = dataset(&tmp, "base");
   let clone = dataset(&tmp, "clone");
   let src = base.mountpoint.join("src.img");
   let dst = clone.mountpoint.join("dst.img");
   write_file(&src, &content(b"abc"));
   write_file(&dst, &content(b"abd"));

   let mut zfs = FakeZfs::new(vec![base, clone]);
   zfs.origins.insert("tank/clone".into(), "tank/base@snap".into());
   zfs.mark_unknown(&src, 2 * RECORD_SIZE);
   zfs.mark_unknown(&dst, 2 * RECORD_SIZE);
   let engine = SyncEngine::new(zfs);

   let options = SyncOptions { mode: CompareMode::Address, ..hash_options() };
   let report = engine.run(&src, &dst, &options, &mut ()).await.expect("sync");

   assert_eq!(report.mode, CompareMode::Address);
   assert_eq!(report.diff_records, 1);
   assert_eq!(read(&src), read(&dst));
}

#[tokio::test]
async fn failing_source_scan_leaves_no_destination_behind() {
   let tmp = TempDir::new().expect("temp dir");
   let vol = dataset(&tmp, "fs");
   let src = vol.mountpoint.join("src.img");
   let dst = vol.mountpoint.join("new.img");
   write_file(&src, &content(b"ab"));

   let mut zfs = FakeZfs::new(vec![vol]);
   zfs.failing.insert(src.canonicalize().expect("canonical src"));
   let engine = SyncEngine::new(zfs);

   let err = engine.run(&src, &dst, &hash_options(), &mut ()).await.expect_err("must fail");
   assert!(matches!(err, Error::ExternalTool { .. }));
   assert!(!dst.exists());
}
