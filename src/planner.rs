//! Execution planning.
//!
//! The planner turns the declared steps of a [`Pipeline`] into **stages**:
//!
//! - every run of adjacent stateless steps is fused into one stage, applied
//!   item by item without intermediate buffers;
//! - every stateful step is its own stage and acts as a **barrier**: it owns
//!   keyed state, so in parallel mode items are routed to its partitions by key.
//!
//! Step order is never changed. Stateless steps are caller-ordered and may be
//! side-effecting (`inspect`), so the planner only fuses, it does not reorder.

use crate::node::{Node, StatefulLogic, StatelessOp, StepKind};
use crate::node_id::StepId;
use crate::pipeline::Pipeline;
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::sync::Arc;

pub(crate) enum Stage {
    Fused(Vec<(StepId, Arc<dyn StatelessOp>)>),
    Barrier {
        id: StepId,
        kind: StepKind,
        logic: Arc<dyn StatefulLogic>,
    },
}

/// A finalized execution plan.
pub struct Plan {
    pub(crate) input: StepId,
    pub(crate) stages: Vec<Stage>,
    pub(crate) output: StepId,
    /// Descriptions of the declared steps, kept for explanations.
    declared: Vec<(StepId, StepKind)>,
    /// Optimization decisions made during planning.
    pub optimizations: Vec<OptimizationDecision>,
}

/// Represents an optimization decision made by the planner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptimizationDecision {
    /// Adjacent stateless operations were fused together.
    FusedStateless {
        /// Number of stateless steps before fusion.
        steps_before: usize,
        /// Number of fused stages after fusion.
        stages_after: usize,
    },
}

/// Detailed explanation of an execution plan.
#[derive(Debug, Clone)]
pub struct ExecutionExplanation {
    pub pipeline: String,
    pub stages: Vec<ExplainStage>,
    pub summary: PlanSummary,
    pub optimizations: Vec<OptimizationDecision>,
}

/// A single stage in the execution plan.
#[derive(Debug, Clone)]
pub struct ExplainStage {
    /// Position in the execution sequence, starting at 1.
    pub stage: usize,
    /// `Input`, `Stateless`, `Stateful` or `Output`.
    pub stage_type: String,
    /// Names of the steps this stage executes.
    pub steps: Vec<String>,
    pub description: String,
    /// Whether this stage owns keyed state.
    pub is_barrier: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub declared_steps: usize,
    pub stateless_ops: usize,
    pub barriers: usize,
    pub stages: usize,
}

impl Display for ExecutionExplanation {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(
            f,
            "╔═══════════════════════════════════════════════════════════════╗"
        )?;
        writeln!(f, "║ EXECUTION PLAN: {:<46}║", self.pipeline)?;
        writeln!(
            f,
            "╚═══════════════════════════════════════════════════════════════╝"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ SUMMARY ────────────────────────────────────────────────────┐"
        )?;
        writeln!(f, "│ Declared Steps:    {:>10}", self.summary.declared_steps)?;
        writeln!(f, "│ Stateless Ops:     {:>10}", self.summary.stateless_ops)?;
        writeln!(f, "│ Barrier Stages:    {:>10}", self.summary.barriers)?;
        writeln!(f, "│ Total Stages:      {:>10}", self.summary.stages)?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;
        writeln!(f)?;

        writeln!(
            f,
            "┌─ EXECUTION STAGES ───────────────────────────────────────────┐"
        )?;
        for stage in &self.stages {
            let barrier_marker = if stage.is_barrier { " [BARRIER]" } else { "" };
            writeln!(f, "│")?;
            writeln!(
                f,
                "│ Stage {}: {}{}",
                stage.stage, stage.stage_type, barrier_marker
            )?;
            writeln!(f, "│   {}", stage.description)?;
            writeln!(f, "│   Steps: {}", stage.steps.join(" → "))?;
        }
        writeln!(f, "│")?;
        writeln!(
            f,
            "└──────────────────────────────────────────────────────────────┘"
        )?;

        if !self.optimizations.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "┌─ OPTIMIZATIONS APPLIED ──────────────────────────────────────┐"
            )?;
            for opt in &self.optimizations {
                match opt {
                    OptimizationDecision::FusedStateless {
                        steps_before,
                        stages_after,
                    } => {
                        writeln!(f, "│ • Fused Stateless Operations")?;
                        writeln!(
                            f,
                            "│   {steps_before} steps → {stages_after} fused stage(s)"
                        )?;
                    }
                }
            }
            writeln!(
                f,
                "└──────────────────────────────────────────────────────────────┘"
            )?;
        }
        Ok(())
    }
}

impl Plan {
    /// Generate a detailed explanation of the execution plan.
    #[must_use]
    pub fn explain(&self) -> ExecutionExplanation {
        self.explain_named("")
    }

    pub(crate) fn explain_named(&self, pipeline: &str) -> ExecutionExplanation {
        let mut stages = Vec::with_capacity(self.stages.len() + 2);
        let mut stateless_ops = 0;
        let mut barriers = 0;

        stages.push(ExplainStage {
            stage: 1,
            stage_type: "Input".to_string(),
            steps: vec![self.input.to_string()],
            description: "Pull items from the source".to_string(),
            is_barrier: false,
        });

        for stage in &self.stages {
            let (stage_type, steps, description, is_barrier) = match stage {
                Stage::Fused(ops) => {
                    stateless_ops += ops.len();
                    let names: Vec<String> = ops.iter().map(|(id, _)| id.to_string()).collect();
                    (
                        "Stateless",
                        names,
                        format!("Apply {} fused operation(s) item by item", ops.len()),
                        false,
                    )
                }
                Stage::Barrier { id, kind, .. } => {
                    barriers += 1;
                    let what = if kind.is_windowed() {
                        "Assign windows per key, emit on completion"
                    } else if *kind == StepKind::Reduce {
                        "Reduce per key, emit when complete"
                    } else {
                        "Map with per-key state, emit every item"
                    };
                    ("Stateful", vec![id.to_string()], format!("{kind}: {what}"), true)
                }
            };
            stages.push(ExplainStage {
                stage: stages.len() + 1,
                stage_type: stage_type.to_string(),
                steps,
                description,
                is_barrier,
            });
        }

        stages.push(ExplainStage {
            stage: stages.len() + 1,
            stage_type: "Output".to_string(),
            steps: vec![self.output.to_string()],
            description: "Push emitted items to the sink".to_string(),
            is_barrier: false,
        });

        ExecutionExplanation {
            pipeline: pipeline.to_string(),
            summary: PlanSummary {
                declared_steps: self.declared.len(),
                stateless_ops,
                barriers,
                stages: stages.len(),
            },
            stages,
            optimizations: self.optimizations.clone(),
        }
    }
}

/// Build the stage list of `p`.
pub fn build_plan(p: &Pipeline) -> Plan {
    let mut stages = Vec::new();
    let mut stateless_steps = 0;
    let mut fused_stages = 0;

    for node in &p.steps {
        match node {
            Node::Stateless { id, op, .. } => {
                stateless_steps += 1;
                if let Some(Stage::Fused(ops)) = stages.last_mut() {
                    ops.push((id.clone(), Arc::clone(op)));
                } else {
                    fused_stages += 1;
                    stages.push(Stage::Fused(vec![(id.clone(), Arc::clone(op))]));
                }
            }
            Node::Stateful { id, kind, logic } => stages.push(Stage::Barrier {
                id: id.clone(),
                kind: *kind,
                logic: Arc::clone(logic),
            }),
        }
    }

    let mut optimizations = Vec::new();
    if stateless_steps > fused_stages {
        optimizations.push(OptimizationDecision::FusedStateless {
            steps_before: stateless_steps,
            stages_after: fused_stages,
        });
    }

    Plan {
        input: p.input.id.clone(),
        stages,
        output: p.output.id.clone(),
        declared: p.steps.iter().map(|n| (n.id().clone(), n.kind())).collect(),
        optimizations,
    }
}
