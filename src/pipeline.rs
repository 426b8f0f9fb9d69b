use crate::io::{ErasedSink, ErasedSource};
use crate::node::{Node, StepKind};
use crate::node_id::StepId;
use crate::planner::{ExecutionExplanation, build_plan};

/// An immutable, fully built dataflow: one input, the declared steps in
/// order, one output.
///
/// Built with [`Dataflow`](crate::stream::Dataflow) and consumed by
/// [`Runner::run`](crate::runner::Runner::run). There is no shared registry:
/// each pipeline owns its steps, source and sink.
pub struct Pipeline {
    pub(crate) name: String,
    pub(crate) input: InputStep,
    pub(crate) steps: Vec<Node>,
    pub(crate) output: OutputStep,
}

pub(crate) struct InputStep {
    pub id: StepId,
    pub source: Box<dyn ErasedSource>,
}

pub(crate) struct OutputStep {
    pub id: StepId,
    pub sink: Box<dyn ErasedSink>,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step names from input to output; stateless steps show their generated labels.
    pub fn step_names(&self) -> Vec<String> {
        std::iter::once(self.input.id.to_string())
            .chain(self.steps.iter().map(|n| n.id().to_string()))
            .chain(std::iter::once(self.output.id.to_string()))
            .collect()
    }

    /// Kinds of the declared steps, in order.
    pub fn step_kinds(&self) -> Vec<StepKind> {
        self.steps.iter().map(Node::kind).collect()
    }

    /// Describe how the runner will execute this pipeline.
    #[must_use]
    pub fn explain(&self) -> ExecutionExplanation {
        build_plan(self).explain_named(&self.name)
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}
