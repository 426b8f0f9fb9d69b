use anyhow::{Result, bail};
use ironstream::config::RunnerConfig;
use ironstream::metrics::MetricsCollector;
use ironstream::prelude::*;
use ironstream::testing::{assert_collections_equal, assert_key_order_preserved, run_collect};
use ironstream::{JsonLinesInput, JsonLinesOutput};
use std::time::Duration;
use tempfile::tempdir;

/// `n` items on keys `0..keys`, one every 100ms.
fn ticks(n: i64, keys: i64) -> TimestampedInput<std::vec::IntoIter<Timestamped<(i64, i64)>>> {
    TimestampedInput::new(
        (0..n)
            .map(|i| Timestamped::new(i * 100, (i % keys, i)))
            .collect::<Vec<_>>(),
    )
}

fn per_second_sums(input: TimestampedInput<std::vec::IntoIter<Timestamped<(i64, i64)>>>) -> Stream<(i64, (WindowId, i64))> {
    Dataflow::new("sums")
        .input("inp", input)
        .fold_window(
            "sum",
            ClockConfig::Epoch,
            WindowConfig::tumbling(Duration::from_secs(1), 0),
            || 0i64,
            |acc, v| acc + v,
        )
}

#[test]
fn parallel_matches_sequential_per_key() -> Result<()> {
    let sequential = run_collect(per_second_sums(ticks(5_000, 11)), &Runner::default())?;

    for (threads, partitions, batch_size) in [(None, Some(1), 1), (Some(2), Some(3), 17), (Some(4), None, 256)] {
        let runner = Runner {
            mode: ExecMode::Parallel { threads, partitions },
            batch_size,
            ..Runner::default()
        };
        let parallel = run_collect(per_second_sums(ticks(5_000, 11)), &runner)?;
        assert_key_order_preserved(&parallel, &sequential);
    }
    Ok(())
}

#[test]
fn sequential_runs_are_deterministic() -> Result<()> {
    let a = run_collect(per_second_sums(ticks(1_000, 7)), &Runner::default())?;
    let b = run_collect(per_second_sums(ticks(1_000, 7)), &Runner::default())?;
    assert_collections_equal(&a, &b);
    Ok(())
}

fn stoppable(handle: &StopHandle, sink: &CollectSink<(&'static str, (WindowId, Vec<i64>))>) -> Result<Pipeline> {
    let h = handle.clone();
    let input = TimestampedInput::new((0..100).map(|i| Timestamped::new(i * 100, i)).collect::<Vec<_>>());
    Ok(Dataflow::new("stoppable")
        .input("inp", input)
        .inspect(move |i: &i64| {
            if *i == 25 {
                h.stop();
            }
        })
        .key_by(|_| "k")
        .collect_window(
            "win",
            ClockConfig::Epoch,
            WindowConfig::tumbling(Duration::from_secs(1), 0),
        )
        .output("out", sink.clone())?)
}

#[test]
fn stop_with_flush_emits_open_windows() -> Result<()> {
    let handle = StopHandle::new();
    let sink = CollectSink::new();
    let runner = Runner {
        stop: Some(handle.clone()),
        ..Runner::default()
    };

    let summary = runner.run(stoppable(&handle, &sink)?)?;
    assert!(summary.stopped);
    assert_eq!(summary.ingested, 26);
    let sizes: Vec<_> = sink.values().iter().map(|(_, (_, v))| v.len()).collect();
    assert_eq!(sizes, vec![10, 10, 6]);
    Ok(())
}

#[test]
fn stop_with_discard_drops_open_windows() -> Result<()> {
    let handle = StopHandle::new();
    let sink = CollectSink::new();
    let runner = Runner {
        stop: Some(handle.clone()),
        on_stop: StopPolicy::Discard,
        ..Runner::default()
    };

    let summary = runner.run(stoppable(&handle, &sink)?)?;
    assert!(summary.stopped);
    let sizes: Vec<_> = sink.values().iter().map(|(_, (_, v))| v.len()).collect();
    assert_eq!(sizes, vec![10, 10]);
    assert_eq!(summary.step("win").map(|s| s.pending_discarded), Some(1));
    Ok(())
}

#[test]
fn panicking_map_aborts_after_delivering_earlier_items() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("panics")
        .input("inp", TestingInput::new(0..6))
        .map(|x: &i32| {
            assert!(*x != 3, "three is not allowed");
            x * 10
        })
        .output("out", sink.clone())?;

    let err = Runner::default().run(pipeline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserFunction);
    assert_eq!(err.step(), Some("map@1"));
    assert!(err.to_string().contains("three is not allowed"));
    assert_eq!(sink.values(), vec![0, 10, 20]);
    Ok(())
}

#[test]
fn sink_failure_is_an_output_error() -> Result<()> {
    let pipeline = Dataflow::new("failing_sink")
        .input("inp", TestingInput::new(0..5))
        .output(
            "out",
            FnSink(|_epoch: i64, v: i32| {
                if v == 2 {
                    bail!("disk full");
                }
                Ok(())
            }),
        )?;

    let err = Runner::default().run(pipeline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Output);
    assert_eq!(err.step(), Some("out"));
    Ok(())
}

#[test]
fn metrics_receive_run_counters() -> Result<()> {
    let metrics = MetricsCollector::new();
    let runner = Runner {
        metrics: Some(metrics.clone()),
        ..Runner::default()
    };
    let pipeline = per_second_sums(ticks(30, 2)).output("out", CollectSink::new())?;
    let summary = runner.run(pipeline)?;

    assert_eq!(metrics.counter("ingested"), Some(30));
    assert_eq!(metrics.counter("emitted"), Some(summary.emitted));
    // Three seconds of data on two keys.
    assert_eq!(metrics.counter("sum.windows_opened"), Some(6));
    assert_eq!(metrics.counter("sum.windows_closed"), Some(6));
    assert_eq!(metrics.counter("sum.late_dropped"), Some(0));
    assert!(metrics.elapsed().is_some());

    let dir = tempdir()?;
    let path = dir.path().join("metrics.json");
    metrics.save_to_file(&path)?;
    let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
    assert_eq!(saved["sum.windows_closed"]["value"], 6);
    assert!(saved.get("execution_time_ms").is_some());
    Ok(())
}

#[test]
fn jsonl_files_in_and_out() -> Result<()> {
    let dir = tempdir()?;
    let input_path = dir.path().join("in.jsonl");
    let output_path = dir.path().join("out/sessions.jsonl");
    std::fs::write(
        &input_path,
        concat!(
            "{\"ts\": 0, \"value\": [\"u1\", 1]}\n",
            "{\"ts\": 500, \"value\": [\"u1\", 2]}\n",
            "\n",
            "{\"ts\": 700, \"value\": [\"u2\", 5]}\n",
            "{\"ts\": 9000, \"value\": [\"u1\", 3]}\n",
        ),
    )?;

    let pipeline = Dataflow::new("files")
        .input("inp", JsonLinesInput::<(String, u32)>::open(&input_path)?)
        .reduce_window(
            "session_sum",
            ClockConfig::Epoch,
            WindowConfig::session(Duration::from_secs(2)),
            |acc, v| acc + v,
        )
        .map(|(user, (_, total)): &(String, (WindowId, u32))| (user.clone(), *total))
        .output("out", JsonLinesOutput::create(&output_path)?.with_epochs())?;
    Runner::default().run(pipeline)?;

    let mut written = JsonLinesInput::<(String, u32)>::open(&output_path)?;
    let mut rows = Vec::new();
    while let Some(t) = written.next()? {
        rows.push((t.ts, t.value));
    }
    assert_eq!(
        rows,
        vec![
            (9_000, ("u1".to_string(), 3)),
            (9_000, ("u1".to_string(), 3)),
            (9_000, ("u2".to_string(), 5)),
        ]
    );
    Ok(())
}

#[test]
fn runner_from_config_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("runner.json");
    std::fs::write(
        &path,
        r#"{"mode": {"parallel": {"threads": 2, "partitions": 4}}, "batch_size": 8}"#,
    )?;

    let runner = RunnerConfig::from_json_file(&path)?.into_runner();
    let out = run_collect(per_second_sums(ticks(100, 3)), &runner)?;
    let sequential = run_collect(per_second_sums(ticks(100, 3)), &Runner::default())?;
    assert_key_order_preserved(&out, &sequential);
    Ok(())
}
