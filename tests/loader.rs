//! Integration tests for the file loader scheduler.

use ironline::parsers::LineCollector;
use ironline::testing::*;
use ironline::*;
use std::any::Any;
use std::sync::mpsc;
use std::time::Duration;


fn loader_with(source: &MockByteSource, max_job_count: usize) -> anyhow::Result<FileLoader> {
    let config = LoaderConfig {
        max_job_count,
        block_size: 16,
        worker_threads: Some(4),
        ..LoaderConfig::default()
    };
    Ok(FileLoader::builder()
        .config(config)
        .byte_source(source.clone())
        .build()?)
}

#[test]
fn load_and_drain_collects_lines() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    let text = join_with_mixed_terminators(&["alpha", "beta", "gamma", "delta", "epsilon"]);
    source.insert_text("greek.txt", &text);

    let mut loader = loader_with(&source, 2)?;
    let idx = loader.add_file("greek.txt")?;
    assert_status!(loader, idx, ReadStatus::UnLoaded);

    loader.load_file(idx)?;
    loader.drain()?;

    assert_status!(loader, idx, ReadStatus::Completed);
    let lines = loader.parser_as::<LineCollector>(idx)?.lines();
    assert_eq!(lines, ["alpha", "beta", "gamma", "delta", "epsilon"]);
    assert_eq!(loader.state(idx)?.ref_count, 1);
    assert_eq!(source.read_count("greek.txt"), 1);
    Ok(())
}

#[test]
fn idle_tick_allocates_nothing() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    let mut loader = loader_with(&source, 4)?;
    loader.add_file("a")?;

    loader.update()?;
    loader.run_all_jobs()?;

    assert_eq!(loader.worker_count(), 0);
    assert_eq!(loader.active_jobs(), 0);
    assert_status!(loader, 0, ReadStatus::UnLoaded);
    assert_eq!(loader.metrics().snapshot(), MetricsSnapshot::default());
    Ok(())
}

#[test]
fn ref_count_is_the_sum_of_requests() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    let mut loader = loader_with(&source, 2)?;
    let idx = loader.add_file("a")?;

    loader.load_file(idx)?;
    loader.load_file(idx)?;
    loader.load_file(idx)?;
    loader.unload_file(idx)?;
    loader.drain()?;

    let state = loader.state(idx)?;
    assert_eq!(state.ref_count, 2);
    assert_eq!(state.status, ReadStatus::Completed);
    // Only the 0 -> 1 crossing reads the file.
    assert_eq!(source.read_count("a"), 1);
    Ok(())
}

#[test]
fn load_then_unload_in_one_tick_never_reads() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    let mut loader = loader_with(&source, 2)?;
    let idx = loader.add_file("a")?;

    loader.load_file(idx)?;
    loader.unload_file(idx)?;
    loader.update()?;

    assert_status!(loader, idx, ReadStatus::UnLoaded);
    assert_eq!(loader.state(idx)?.ref_count, 0);
    assert_eq!(source.total_reads(), 0);
    assert!(loader.is_idle());

    let metrics = loader.metrics().snapshot();
    assert_eq!(metrics.loads_cancelled, 1);
    assert_eq!(metrics.activations_started, 0);
    Ok(())
}

#[test]
fn active_jobs_never_exceed_max_job_count() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    for name in ["f0", "f1", "f2", "f3", "f4"] {
        source.insert_text(name, "line\n");
    }
    source.close_gate();

    let mut loader = loader_with(&source, 2)?;
    let ids = loader.add_files(["f0", "f1", "f2", "f3", "f4"])?;
    for &id in &ids {
        loader.load_file(id)?;
    }
    loader.update()?;

    assert_eq!(loader.active_jobs(), 2);
    assert_eq!(loader.worker_count(), 2);
    for &id in &ids[2..] {
        let state = loader.state(id)?;
        assert_eq!(state.status, ReadStatus::UnLoaded);
        assert_eq!(state.ref_count, 1);
    }

    source.open_gate();
    loader.drain()?;
    for &id in &ids {
        assert_status!(loader, id, ReadStatus::Completed);
    }
    assert!(loader.worker_count() <= 2);
    Ok(())
}

#[test]
fn overflow_is_dispatched_in_request_order() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    for name in ["f0", "f1", "f2"] {
        source.insert_text(name, "line\n");
    }
    source.close_gate();

    let mut loader = loader_with(&source, 1)?;
    let ids = loader.add_files(["f0", "f1", "f2"])?;
    for &id in &ids {
        loader.load_file(id)?;
    }

    loader.update()?;
    wait_until!(source.waiting() == 1);
    assert_eq!(source.read_count("f0"), 1);
    assert_eq!(source.read_count("f1"), 0);

    source.open_gate();
    wait_until!(loader.state(ids[0])?.status == ReadStatus::WaitForCallingComplete);
    source.close_gate();

    loader.update()?;
    assert_status!(loader, ids[0], ReadStatus::Completed);
    assert_eq!(loader.active_jobs(), 1);
    wait_until!(source.waiting() == 1);
    assert_eq!(source.read_count("f1"), 1);
    assert_eq!(source.read_count("f2"), 0);
    assert_status!(loader, ids[2], ReadStatus::UnLoaded);

    source.open_gate();
    loader.drain()?;
    assert_status!(loader, ids[2], ReadStatus::Completed);
    Ok(())
}

#[test]
fn run_all_jobs_ignores_the_cap() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    for name in ["f0", "f1", "f2"] {
        source.insert_text(name, "line\n");
    }
    source.close_gate();

    let mut loader = loader_with(&source, 1)?;
    let ids = loader.add_files(["f0", "f1", "f2"])?;
    for &id in &ids {
        loader.load_file(id)?;
    }
    loader.run_all_jobs()?;

    assert_eq!(loader.active_jobs(), 3);
    wait_until!(source.waiting() == 3);

    source.open_gate();
    loader.drain()?;
    for &id in &ids {
        assert_status!(loader, id, ReadStatus::Completed);
    }
    // Reaped workers beyond the cap are disposed.
    assert_eq!(loader.worker_count(), 1);
    Ok(())
}

#[test]
fn unload_while_reading_is_deferred() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "one\ntwo\n");
    source.close_gate();

    let recorder = RecordingParser::new();
    let mut loader = loader_with(&source, 2)?;
    let idx = loader.add_file_with_parser("a", recorder.boxed())?;

    loader.load_file(idx)?;
    loader.update()?;
    wait_until!(source.waiting() == 1);

    loader.unload_file(idx)?;
    loader.update()?;
    assert_status!(loader, idx, ReadStatus::ReadAsync);
    assert_eq!(loader.state(idx)?.ref_count, 0);
    assert_eq!(recorder.count(&ParserEvent::Unload), 0);

    source.open_gate();
    loader.drain()?;
    assert_status!(loader, idx, ReadStatus::UnLoaded);
    assert_eq!(recorder.count(&ParserEvent::Unload), 1);
    Ok(())
}

#[test]
fn parser_sees_the_full_callback_sequence() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\r\ny");

    let recorder = RecordingParser::new();
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file_with_parser("a", recorder.boxed())?;
    assert_eq!(recorder.events(), [ParserEvent::Init]);

    loader.load_file(idx)?;
    loader.drain()?;
    loader.unload_file(idx)?;
    loader.drain()?;

    assert_status!(loader, idx, ReadStatus::UnLoaded);
    assert_eq!(
        recorder.events(),
        [
            ParserEvent::Init,
            ParserEvent::Clear,
            ParserEvent::Line("x".into()),
            ParserEvent::Line("y".into()),
            ParserEvent::PostReadProc,
            ParserEvent::Unload,
        ]
    );
    let metrics = loader.metrics().snapshot();
    assert_eq!(metrics.unload_batches, 1);
    assert_eq!(metrics.files_unloaded, 1);
    Ok(())
}

#[test]
fn reload_after_unload_reads_again() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "first\n");
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("a")?;

    loader.load_file(idx)?;
    loader.drain()?;
    loader.unload_file(idx)?;
    loader.drain()?;
    assert_status!(loader, idx, ReadStatus::UnLoaded);

    source.insert_text("a", "second\n");
    loader.load_file(idx)?;
    loader.drain()?;

    assert_status!(loader, idx, ReadStatus::Completed);
    assert_eq!(loader.parser_as::<LineCollector>(idx)?.lines(), ["second"]);
    assert_eq!(source.read_count("a"), 2);
    Ok(())
}

#[test]
fn unbalanced_unload_is_rejected() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("a")?;

    assert!(matches!(
        loader.unload_file(idx),
        Err(LoaderError::UnbalancedUnload(0))
    ));

    // Queued requests count towards the balance.
    loader.load_file(idx)?;
    loader.unload_file(idx)?;
    assert!(matches!(
        loader.unload_file(idx),
        Err(LoaderError::UnbalancedUnload(0))
    ));
    Ok(())
}

#[test]
fn bad_indices_and_paths_are_rejected() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    let mut loader = loader_with(&source, 1)?;
    loader.add_file("a")?;

    assert!(matches!(
        loader.load_file(5),
        Err(LoaderError::IndexOutOfRange { index: 5, len: 1 })
    ));
    assert!(matches!(
        loader.state(1),
        Err(LoaderError::IndexOutOfRange { index: 1, len: 1 })
    ));
    assert!(matches!(loader.add_file(""), Err(LoaderError::InvalidPath(_))));
    assert_eq!(loader.len(), 1);
    Ok(())
}

#[test]
fn parser_is_unavailable_while_its_job_runs() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    source.close_gate();

    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("a")?;
    loader.load_file(idx)?;
    loader.update()?;

    assert!(matches!(loader.parser(idx), Err(LoaderError::JobActive(0))));
    assert!(matches!(loader.parser_mut(idx), Err(LoaderError::JobActive(0))));

    source.open_gate();
    loader.drain()?;
    assert!(loader.parser(idx).is_ok());
    assert!(matches!(
        loader.parser_as::<RecordingParser>(idx),
        Err(LoaderError::ParserType { index: 0, .. })
    ));
    Ok(())
}

#[test]
fn read_failure_completes_without_lines() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.fail("broken", "disk on fire");

    let recorder = RecordingParser::new();
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file_with_parser("broken", recorder.boxed())?;
    loader.load_file(idx)?;
    loader.drain()?;

    let state = loader.state(idx)?;
    assert_eq!(state.status, ReadStatus::Completed);
    assert!(state.failure.as_deref().is_some_and(|f| f.contains("disk on fire")));
    assert!(recorder.lines().is_empty());
    assert_eq!(recorder.count(&ParserEvent::PostReadProc), 1);
    assert_eq!(loader.metrics().snapshot().read_failures, 1);
    Ok(())
}

#[test]
fn parser_can_stop_early() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "1\n2\n3\n4\n");

    let recorder = RecordingParser::stopping_after(2);
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file_with_parser("a", recorder.boxed())?;
    loader.load_file(idx)?;
    loader.drain()?;

    assert_status!(loader, idx, ReadStatus::Completed);
    assert_eq!(recorder.lines(), ["1", "2"]);
    assert_eq!(recorder.count(&ParserEvent::PostReadProc), 1);
    assert_eq!(loader.metrics().snapshot().parse_aborts, 1);
    Ok(())
}

#[test]
fn parser_panic_is_contained() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "ok\nboom\nlater\n");
    source.insert_text("b", "fine\n");

    let recorder = RecordingParser::panicking_on("boom");
    let mut loader = loader_with(&source, 2)?;
    let bad = loader.add_file_with_parser("a", recorder.boxed())?;
    let good = loader.add_file("b")?;
    loader.load_file(bad)?;
    loader.load_file(good)?;
    loader.drain()?;

    let state = loader.state(bad)?;
    assert_eq!(state.status, ReadStatus::Completed);
    assert!(state.failure.as_deref().is_some_and(|f| f.starts_with("panic")));
    assert_eq!(recorder.lines(), ["ok"]);
    assert_status!(loader, good, ReadStatus::Completed);
    assert_eq!(loader.metrics().snapshot().worker_panics, 1);
    Ok(())
}

#[test]
fn block_progress_is_reported() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", &"abcdefghi\n".repeat(10));

    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("a")?;
    loader.load_file(idx)?;
    loader.drain()?;

    let state = loader.state(idx)?;
    assert_eq!(state.block_count, 7);
    assert_eq!(state.blocks_read, 7);
    assert_eq!(loader.parser_as::<LineCollector>(idx)?.lines().len(), 10);
    Ok(())
}

#[test]
fn requests_from_another_thread() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("a")?;

    let handle = loader.handle();
    std::thread::spawn(move || handle.load_file(idx))
        .join()
        .map_err(|_| anyhow::anyhow!("request thread panicked"))??;

    loader.drain()?;
    assert_status!(loader, idx, ReadStatus::Completed);
    Ok(())
}

#[test]
fn racing_handles_keep_holds_balanced() -> anyhow::Result<()> {
    const ROUNDS: usize = 2_000;

    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    source.insert_text("b", "y\n");
    let mut loader = loader_with(&source, 1)?;
    let a = loader.add_file("a")?;
    let b = loader.add_file("b")?;
    loader.load_file(b)?;

    let loads = {
        let handle = loader.handle();
        std::thread::spawn(move || -> ironline::Result<()> {
            for _ in 0..ROUNDS {
                handle.load_file(a)?;
            }
            Ok(())
        })
    };
    let unloads = {
        let handle = loader.handle();
        std::thread::spawn(move || -> ironline::Result<()> {
            let mut released = 0;
            while released < ROUNDS {
                match handle.unload_file(a) {
                    Ok(()) => released += 1,
                    Err(LoaderError::UnbalancedUnload(_)) => std::thread::yield_now(),
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        })
    };

    while !loads.is_finished() || !unloads.is_finished() {
        loader.update()?;
    }
    loads
        .join()
        .map_err(|_| anyhow::anyhow!("load thread panicked"))??;
    unloads
        .join()
        .map_err(|_| anyhow::anyhow!("unload thread panicked"))??;
    loader.drain()?;

    assert_eq!(loader.state(a)?.ref_count, 0);
    assert_status!(loader, a, ReadStatus::UnLoaded);
    assert_status!(loader, b, ReadStatus::Completed);
    assert_eq!(loader.state(b)?.ref_count, 1);
    Ok(())
}

#[test]
fn synchronous_load_completes_immediately() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "now\n");
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("a")?;

    loader.load_file_sync(idx)?;
    assert_status!(loader, idx, ReadStatus::Completed);
    assert_eq!(loader.parser_as::<LineCollector>(idx)?.lines(), ["now"]);

    loader.load_file(idx)?;
    loader.drain()?;
    assert_eq!(loader.state(idx)?.ref_count, 2);
    assert_eq!(source.read_count("a"), 1);

    loader.unload_file(idx)?;
    loader.unload_file(idx)?;
    loader.drain()?;
    assert_status!(loader, idx, ReadStatus::UnLoaded);
    Ok(())
}

#[test]
fn teardown_requires_drained_jobs() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    source.close_gate();

    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("a")?;
    loader.load_file(idx)?;
    loader.update()?;
    assert!(matches!(loader.clear(), Err(LoaderError::JobsRunning(1))));

    source.open_gate();
    loader.drain()?;
    loader.clear()?;
    assert!(loader.is_empty());
    loader.close()?;
    Ok(())
}

#[test]
fn properties_are_validated() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    let mut loader = loader_with(&source, 1)?;

    loader.set_block_size(1);
    assert_eq!(loader.block_size(), config::MIN_BLOCK_SIZE);
    loader.set_block_size(4096);
    assert_eq!(loader.block_size(), 4096);

    assert!(matches!(loader.set_max_job_count(0), Err(LoaderError::Config(_))));
    loader.set_max_job_count(3)?;
    assert_eq!(loader.max_job_count(), 3);

    loader.set_encoding(encoding::latin1());
    assert_eq!(loader.encoding().name(), "latin1");
    Ok(())
}

#[test]
fn per_file_encoding_override() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    let mut bytes = vec![0xFF, 0xFE];
    for unit in "h\u{e9}\r\nw\u{f6}rld".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    source.insert("wide.txt", bytes);

    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("wide.txt")?;
    loader.set_file_encoding(idx, Some(encoding::utf16le()))?;
    loader.load_file(idx)?;
    loader.drain()?;

    assert_eq!(
        loader.parser_as::<LineCollector>(idx)?.lines(),
        ["h\u{e9}", "w\u{f6}rld"]
    );
    Ok(())
}

#[test]
fn files_from_disk_via_glob() -> anyhow::Result<()> {
    let files = TempTextFiles::new()?;
    files.write("a.txt", "a1\na2\n")?;
    files.write("b.txt", "b1\r\n")?;
    files.write("c.log", "ignored\n")?;

    let mut loader = FileLoader::builder()
        .config(LoaderConfig {
            max_job_count: 2,
            ..LoaderConfig::default()
        })
        .build()?;
    let ids = loader.add_glob(&format!("{}/*.txt", files.path().display()))?;
    assert_eq!(ids, [0, 1]);
    assert!(loader.path(0)?.ends_with("a.txt"));

    for &id in &ids {
        loader.load_file(id)?;
    }
    loader.drain()?;

    assert_eq!(loader.parser_as::<LineCollector>(0)?.lines(), ["a1", "a2"]);
    assert_eq!(loader.parser_as::<LineCollector>(1)?.lines(), ["b1"]);
    Ok(())
}

#[test]
fn missing_file_on_disk_is_a_read_failure() -> anyhow::Result<()> {
    let files = TempTextFiles::new()?;
    let mut loader = FileLoader::builder().build()?;
    let idx = loader.add_file(files.path().join("nope.txt"))?;
    loader.load_file(idx)?;
    loader.drain()?;

    let state = loader.state(idx)?;
    assert_eq!(state.status, ReadStatus::Completed);
    assert!(state.failure.is_some());
    Ok(())
}

#[mark_flaky_tests::flaky]
#[test]
fn read_phase_time_is_measured() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    source.close_gate();

    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file("a")?;
    loader.load_file(idx)?;
    loader.update()?;

    let opener = source.clone();
    let release = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(30));
        opener.open_gate();
    });
    loader.drain()?;
    release
        .join()
        .map_err(|_| anyhow::anyhow!("gate thread panicked"))?;

    let timings = loader.state(idx)?.timings;
    assert!(timings.read >= Duration::from_millis(20), "{timings:?}");
    assert!(timings.total() >= timings.read);
    Ok(())
}

/// Signals when it receives a line, then waits to be released.
struct BlockingParser {
    entered: mpsc::Sender<()>,
    release: mpsc::Receiver<()>,
}

impl ParserCallback for BlockingParser {
    fn clear(&mut self) {}

    fn parse_line(&mut self, _line: &str) -> bool {
        let _ = self.entered.send(());
        let _ = self.release.recv();
        true
    }

    fn unload(&mut self) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[test]
fn read_time_is_visible_while_parsing() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    source.close_gate();

    let (entered_tx, entered) = mpsc::channel();
    let (release, release_rx) = mpsc::channel();
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file_with_parser(
        "a",
        Box::new(BlockingParser {
            entered: entered_tx,
            release: release_rx,
        }),
    )?;

    loader.load_file(idx)?;
    loader.update()?;
    wait_until!(source.waiting() == 1);
    std::thread::sleep(Duration::from_millis(5));
    source.open_gate();
    entered.recv_timeout(Duration::from_secs(5))?;

    let state = loader.state(idx)?;
    assert_eq!(state.status, ReadStatus::ParseText);
    assert!(state.timings.read >= Duration::from_millis(5), "{:?}", state.timings);
    assert_eq!(state.timings.parse, Duration::ZERO);
    assert_eq!(state.timings.post_proc, Duration::ZERO);

    release.send(())?;
    loader.drain()?;
    let timings = loader.state(idx)?.timings;
    assert!(timings.read >= Duration::from_millis(5));
    assert!(timings.parse > Duration::ZERO);
    Ok(())
}

#[test]
fn raising_the_cap_grows_the_thread_pool() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    let names = ["a", "b", "c", "d", "e", "f"];
    for name in names {
        source.insert_text(name, "x\n");
    }
    source.close_gate();

    let config = LoaderConfig {
        max_job_count: 2,
        ..LoaderConfig::default()
    };
    let mut loader = FileLoader::builder()
        .config(config)
        .byte_source(source.clone())
        .build()?;
    assert_eq!(loader.thread_count(), 3);

    loader.set_max_job_count(names.len())?;
    assert_eq!(loader.thread_count(), names.len() + 1);
    for name in names {
        let idx = loader.add_file(name)?;
        loader.load_file(idx)?;
    }
    loader.update()?;
    assert_eq!(loader.active_jobs(), names.len());
    // Every activation blocks in its read at the same time.
    wait_until!(source.waiting() == names.len());

    source.open_gate();
    loader.drain()?;
    for idx in 0..names.len() {
        assert_status!(loader, idx, ReadStatus::Completed);
    }

    // Lowering the cap keeps the threads.
    loader.set_max_job_count(1)?;
    assert_eq!(loader.thread_count(), names.len() + 1);
    Ok(())
}

#[test]
fn explicit_worker_threads_stay_fixed() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    let mut loader = loader_with(&source, 2)?;
    assert_eq!(loader.thread_count(), 4);
    loader.set_max_job_count(8)?;
    assert_eq!(loader.thread_count(), 4);
    Ok(())
}

#[test]
fn dropping_the_loader_finishes_the_unload_batch() -> anyhow::Result<()> {
    let source = MockByteSource::new();
    source.insert_text("a", "x\n");
    let recorder = RecordingParser::new();
    let mut loader = loader_with(&source, 1)?;
    let idx = loader.add_file_with_parser("a", recorder.boxed())?;

    loader.load_file(idx)?;
    loader.drain()?;
    loader.unload_file(idx)?;
    loader.update()?;
    drop(loader);

    assert_eq!(recorder.count(&ParserEvent::Unload), 1);
    Ok(())
}
