use anyhow::Result;
use ironstream::prelude::*;
use ironstream::testing::run_collect;

fn append(mut acc: Vec<i32>, v: &Vec<i32>) -> Vec<i32> {
    acc.extend(v);
    acc
}

fn evens_doubled() -> Stream<(&'static str, Vec<i32>)> {
    Dataflow::new("example")
        .input("inp", TestingInput::new(0..10))
        .filter(|x: &i32| x % 2 == 0)
        .filter_map(|x: &i32| if *x == 0 { None } else { Some(x * 2) })
        .map(|x: &i32| ("all", vec![*x]))
}

#[test]
fn always_complete_emits_once_per_item_and_resets() -> Result<()> {
    let stream = evens_doubled().reduce("collect_all", append, |_| true);
    let out = run_collect(stream, &Runner::default())?;
    assert_eq!(
        out,
        vec![
            ("all", vec![4]),
            ("all", vec![8]),
            ("all", vec![12]),
            ("all", vec![16]),
        ]
    );
    Ok(())
}

#[test]
fn accumulator_grows_until_complete() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = evens_doubled()
        .reduce("pairs", append, |acc: &Vec<i32>| acc.len() == 2)
        .output("out", sink.clone())?;

    let summary = Runner::default().run(pipeline)?;
    assert_eq!(sink.values(), vec![("all", vec![4, 8]), ("all", vec![12, 16])]);

    let stats = summary.step("pairs").copied().unwrap_or_default();
    assert_eq!(stats.windows_opened, 2);
    assert_eq!(stats.windows_closed, 2);
    assert_eq!(stats.pending_discarded, 0);
    Ok(())
}

#[test]
fn incomplete_accumulators_are_discarded_at_end_of_stream() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("triples")
        .input("inp", TestingInput::new(vec![("a", 1), ("b", 1), ("a", 1), ("a", 1), ("b", 1)]))
        .reduce("sum_to_3", |acc, v| acc + v, |acc: &i32| *acc >= 3)
        .output("out", sink.clone())?;

    let summary = Runner::default().run(pipeline)?;
    assert_eq!(sink.values(), vec![("a", 3)]);
    assert_eq!(summary.step("sum_to_3").map(|s| s.pending_discarded), Some(1));
    Ok(())
}

#[test]
fn keys_reduce_independently() -> Result<()> {
    let stream = Dataflow::new("keys")
        .input("inp", TestingInput::new(1..=6))
        .key_by(|x: &u32| x % 2)
        .reduce("sum", |acc, v| acc + v, |acc: &u32| *acc > 5);
    let out = run_collect(stream, &Runner::default())?;
    // odd: 1, 1+3, 4+5 -> 9; even: 2, 2+4 -> 6, then 6 alone after the reset
    assert_eq!(out, vec![(0, 6), (1, 9), (0, 6)]);
    Ok(())
}

#[test]
fn panicking_reducer_reports_step_and_input() -> Result<()> {
    let sink = CollectSink::new();
    let pipeline = Dataflow::new("boom")
        .input("inp", TestingInput::new(vec![("k", 1), ("k", 0), ("k", 2)]))
        .reduce(
            "divide",
            |acc: i32, v: &i32| acc / v,
            |_| false,
        )
        .output("out", sink.clone())?;

    let err = Runner::default().run(pipeline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UserFunction);
    assert_eq!(err.step(), Some("divide"));
    match err {
        FlowError::UserFunction { input, .. } => assert!(input.contains('0'), "{input}"),
        other => panic!("unexpected error {other:?}"),
    }
    assert!(sink.is_empty());
    Ok(())
}
