use anyhow::Result;
use ironstream::prelude::*;
use ironstream::testing::run_collect;
use std::time::Duration;

const T0: i64 = 1_700_000_000_000;

fn events(items: &[(&'static str, i64)]) -> TimestampedInput<std::vec::IntoIter<Timestamped<(&'static str, i64)>>> {
    TimestampedInput::new(
        items
            .iter()
            .map(|&(k, t)| Timestamped::new(t, (k, t)))
            .collect::<Vec<_>>(),
    )
}

fn one_second() -> WindowConfig {
    WindowConfig::tumbling(Duration::from_secs(1), T0)
}

fn one_second_gap() -> WindowConfig {
    WindowConfig::session(Duration::from_secs(1))
}

#[test]
fn tumbling_windows_split_at_length_boundaries() -> Result<()> {
    let stream = Dataflow::new("tumbling")
        .input("inp", events(&[("k", T0 + 200), ("k", T0 + 900), ("k", T0 + 1_100)]))
        .collect_window("win", ClockConfig::Epoch, one_second());

    let out = run_collect(stream, &Runner::default())?;
    assert_eq!(
        out,
        vec![
            ("k", (WindowId(0), vec![T0 + 200, T0 + 900])),
            ("k", (WindowId(1), vec![T0 + 1_100])),
        ]
    );
    Ok(())
}

#[test]
fn tumbling_window_is_emitted_when_the_key_moves_past_it() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("closing")
        .input("inp", events(&[("k", T0), ("k", T0 + 999), ("k", T0 + 1_000), ("k", T0 + 2_500)]))
        .fold_window("count", ClockConfig::Epoch, one_second(), || 0u32, |n, _| n + 1)
        .output("out", sink.clone())?;

    let summary = Runner::default().run(pipeline)?;
    let emitted: Vec<_> = sink
        .timestamped()
        .into_iter()
        .map(|t| (t.ts, t.value.1))
        .collect();
    // The first two windows close on arrival of the item that passes them;
    // the last one is flushed at end of stream.
    assert_eq!(
        emitted,
        vec![
            (T0 + 1_000, (WindowId(0), 2)),
            (T0 + 2_500, (WindowId(1), 1)),
            (T0 + 2_500, (WindowId(2), 1)),
        ]
    );
    let stats = summary.step("count").copied().unwrap_or_default();
    assert_eq!((stats.windows_opened, stats.windows_closed), (3, 3));
    Ok(())
}

#[test]
fn reduce_window_seeds_with_first_value() -> Result<()> {
    let stream = Dataflow::new("max")
        .input("inp", events(&[("a", T0 + 5), ("b", T0 + 7), ("a", T0 + 3), ("a", T0 + 1_004)]))
        .map(|(k, t): &(&'static str, i64)| (*k, t - T0))
        .reduce_window("max", ClockConfig::Epoch, one_second(), |acc, v| acc.max(*v));

    let out = run_collect(stream, &Runner::default())?;
    // Key "a" closes window 0 on its own watermark; "b" waits for end of stream.
    assert_eq!(
        out,
        vec![
            ("a", (WindowId(0), 5)),
            ("a", (WindowId(1), 1_004)),
            ("b", (WindowId(0), 7)),
        ]
    );
    Ok(())
}

#[test]
fn session_splits_on_gap_and_extends_within_it() -> Result<()> {
    let stream = Dataflow::new("sessions")
        .input(
            "inp",
            events(&[("k", T0), ("k", T0 + 500), ("k", T0 + 3_000), ("k", T0 + 3_400)]),
        )
        .collect_window("win", ClockConfig::Epoch, one_second_gap());

    let out = run_collect(stream, &Runner::default())?;
    assert_eq!(
        out,
        vec![
            ("k", (WindowId(0), vec![T0, T0 + 500])),
            ("k", (WindowId(1), vec![T0 + 3_000, T0 + 3_400])),
        ]
    );
    Ok(())
}

#[test]
fn bridging_item_merges_sessions_in_time_order() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("bridge")
        .input("inp", events(&[("k", T0), ("k", T0 + 1_800), ("k", T0 + 900)]))
        .collect_window("win", ClockConfig::Epoch, one_second_gap())
        .output("out", sink.clone())?;

    let runner = Runner {
        batch_size: 3,
        ..Runner::default()
    };
    let summary = runner.run(pipeline)?;
    assert_eq!(
        sink.values(),
        vec![("k", (WindowId(0), vec![T0, T0 + 900, T0 + 1_800]))]
    );
    let stats = summary.step("win").copied().unwrap_or_default();
    assert_eq!(stats.sessions_merged, 1);
    assert_eq!(stats.windows_opened, 2);
    assert_eq!(stats.windows_closed, 1);
    Ok(())
}

#[test]
fn closed_session_is_not_reopened_by_a_late_item() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("late_session")
        .input("inp", events(&[("k", T0), ("k", T0 + 1_800), ("k", T0 + 900)]))
        .collect_window("win", ClockConfig::Epoch, one_second_gap())
        .output("out", sink.clone())?;

    // One item per batch: the first session closes before the bridging item arrives.
    let summary = Runner::default().run(pipeline)?;
    assert_eq!(
        sink.values(),
        vec![
            ("k", (WindowId(0), vec![T0])),
            ("k", (WindowId(1), vec![T0 + 1_800])),
        ]
    );
    assert_eq!(summary.step("win").map(|s| s.late_dropped), Some(1));
    Ok(())
}

#[test]
fn tumbling_window_longer_than_the_timestamp_range_holds_everything() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("forever")
        .input("inp", events(&[("k", T0 + 1), ("k", T0 + 2), ("k", T0 + 3)]))
        .collect_window(
            "win",
            ClockConfig::Epoch,
            WindowConfig::tumbling(Duration::from_secs(u64::MAX), T0),
        )
        .output("out", sink.clone())?;

    let summary = Runner::default().run(pipeline)?;
    assert_eq!(
        sink.values(),
        vec![("k", (WindowId(0), vec![T0 + 1, T0 + 2, T0 + 3]))]
    );
    assert_eq!(summary.step("win").map(|s| s.late_dropped), Some(0));
    Ok(())
}

#[test]
fn late_item_is_dropped_and_counted() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("late")
        .input("inp", events(&[("k", T0 + 100), ("k", T0 + 1_500), ("k", T0 + 200)]))
        .collect_window("win", ClockConfig::Epoch, one_second())
        .output("out", sink.clone())?;

    let summary = Runner::default().run(pipeline)?;
    assert_eq!(
        sink.values(),
        vec![
            ("k", (WindowId(0), vec![T0 + 100])),
            ("k", (WindowId(1), vec![T0 + 1_500])),
        ]
    );
    assert_eq!(summary.step("win").map(|s| s.late_dropped), Some(1));
    Ok(())
}

#[test]
fn late_item_fails_the_run_under_strict_policy() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("strict")
        .input("inp", events(&[("k", T0 + 100), ("k", T0 + 1_500), ("k", T0 + 200)]))
        .collect_window("win", ClockConfig::Epoch, one_second())
        .output("out", sink.clone())?;

    let runner = Runner {
        late_data: LateDataPolicy::Fail,
        ..Runner::default()
    };
    let err = runner.run(pipeline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::LateData);
    assert_eq!(err.step(), Some("win"));
    // The window closed before the failure was already delivered.
    assert_eq!(sink.values(), vec![("k", (WindowId(0), vec![T0 + 100]))]);
    Ok(())
}

#[test]
fn timestamp_before_alignment_is_a_configuration_error() -> Result<()> {
    let pipeline = Dataflow::new("early")
        .input("inp", events(&[("k", T0 - 1)]))
        .collect_window("win", ClockConfig::Epoch, one_second())
        .output("out", CollectSink::new())?;

    let err = Runner::default().run(pipeline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert!(matches!(err, FlowError::BeforeAlignment { .. }));
    Ok(())
}

#[test]
fn zero_length_window_is_rejected_when_building() {
    let err = Dataflow::new("invalid")
        .input("inp", events(&[]))
        .collect_window("win", ClockConfig::Epoch, WindowConfig::session(Duration::ZERO))
        .output("out", CollectSink::new())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(err.step(), Some("win"));
}

#[test]
fn custom_clock_supplies_window_time() -> Result<()> {
    let clock = TestingClock::new(0);
    let ticker = clock.clone();
    let stream = Dataflow::new("ticking")
        .input("inp", TestingInput::new(vec!["a", "b", "c", "d"]))
        .inspect(move |_| ticker.advance(Duration::from_millis(600)))
        .key_by(|_| "k")
        .collect_window(
            "win",
            ClockConfig::custom(clock),
            WindowConfig::tumbling(Duration::from_secs(1), 0),
        );

    let out = run_collect(stream, &Runner::default())?;
    // Window times 600, 1200, 1800, 2400.
    assert_eq!(
        out,
        vec![
            ("k", (WindowId(0), vec!["a"])),
            ("k", (WindowId(1), vec!["b", "c"])),
            ("k", (WindowId(2), vec!["d"])),
        ]
    );
    Ok(())
}

#[mark_flaky_tests::flaky]
#[test]
fn system_clock_groups_a_quick_burst_into_one_session() {
    let stream = Dataflow::new("wall")
        .input("inp", TestingInput::new(0..100))
        .key_by(|_| "k")
        .fold_window(
            "count",
            ClockConfig::System,
            WindowConfig::session(Duration::from_secs(5)),
            || 0usize,
            |n, _| n + 1,
        );

    let out = run_collect(stream, &Runner::default()).unwrap();
    assert_eq!(out, vec![("k", (WindowId(0), 100))]);
}
