use ironstream::planner::OptimizationDecision;
use ironstream::prelude::*;
use ironstream::StepKind;

fn summed() -> Result<Pipeline, FlowError> {
    Dataflow::new("summed")
        .input("inp", TestingInput::new(0..10))
        .filter(|x: &i32| x % 3 != 0)
        .map(|x: &i32| (x % 2, *x))
        .inspect(|_| {})
        .reduce("sum", |acc, v| acc + v, |acc: &i32| *acc > 10)
        .map(|(k, v): &(i32, i32)| format!("{k}:{v}"))
        .output("out", CollectSink::new())
}

#[test]
fn stateless_steps_get_generated_labels() {
    let pipeline = summed().unwrap();
    assert_eq!(pipeline.name(), "summed");
    assert_eq!(
        pipeline.step_names(),
        vec!["inp", "filter@1", "map@2", "inspect@3", "sum", "map@5", "out"]
    );
    assert_eq!(
        pipeline.step_kinds(),
        vec![
            StepKind::Filter,
            StepKind::Map,
            StepKind::Inspect,
            StepKind::Reduce,
            StepKind::Map,
        ]
    );
}

#[test]
fn duplicate_step_name_is_rejected() {
    let err = Dataflow::new("dup")
        .input("inp", TestingInput::new(vec![("k", 1)]))
        .reduce("agg", |acc, v| acc + v, |_| true)
        .output("agg", CollectSink::new())
        .unwrap_err();
    assert!(matches!(err, FlowError::DuplicateStep(ref name) if name == "agg"));
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn invalid_step_name_is_rejected() {
    for bad in ["bad name", "", "ünicode", "a.b"] {
        let err = Dataflow::new("names")
            .input(bad, TestingInput::new(0..1))
            .output("out", CollectSink::new())
            .unwrap_err();
        assert!(
            matches!(err, FlowError::InvalidStepName { ref name, .. } if name == bad),
            "{bad:?}: {err}"
        );
    }
}

#[test]
fn first_configuration_error_wins() {
    let err = Dataflow::new("first")
        .input("inp", TestingInput::new(vec![("k", 1)]))
        .reduce("bad name", |acc, v| acc + v, |_| true)
        .reduce("inp", |acc, v| acc + v, |_| true)
        .output("out", CollectSink::new())
        .unwrap_err();
    assert!(matches!(err, FlowError::InvalidStepName { .. }));
}

#[test]
fn explain_fuses_stateless_runs_around_barriers() {
    let explanation = summed().unwrap().explain();

    assert_eq!(explanation.pipeline, "summed");
    assert_eq!(explanation.summary.declared_steps, 5);
    assert_eq!(explanation.summary.stateless_ops, 4);
    assert_eq!(explanation.summary.barriers, 1);
    // Input, fused(filter, map, inspect), sum, fused(map), output.
    assert_eq!(explanation.summary.stages, 5);
    assert_eq!(
        explanation.stages[1].steps,
        vec!["filter@1", "map@2", "inspect@3"]
    );
    assert!(explanation.stages[2].is_barrier);
    assert_eq!(
        explanation.optimizations,
        vec![OptimizationDecision::FusedStateless {
            steps_before: 4,
            stages_after: 2,
        }]
    );

    let text = explanation.to_string();
    assert!(text.contains("EXECUTION PLAN: summed"));
    assert!(text.contains("[BARRIER]"));
    assert!(text.contains("filter@1 → map@2 → inspect@3"));
    assert!(text.contains("Fused Stateless Operations"));
}

#[test]
fn explain_without_fusion_records_no_optimization() {
    let explanation = Dataflow::new("plain")
        .input("inp", TestingInput::new(vec![("k", 1)]))
        .stateful_map("count", || 0, |n: i32, _: &i32| (n + 1, n + 1))
        .output("out", CollectSink::new())
        .unwrap()
        .explain();
    assert!(explanation.optimizations.is_empty());
    assert_eq!(explanation.summary.stages, 3);
}
