//! Generated-model entry point.
//!
//! A [`Model`] owns its step lists and validated [`ModelPlan`].
//! [`Model::compute`] runs one inference against a caller-installed
//! [`ExecutionContext`] and always returns both pools to their entry
//! marks.

use std::fmt;

use kiln_arena::{ExecutionContext, PoolCapacities};
use kiln_core::{PoolBytes, PoolKind, TensorReader, TensorWriter};

use crate::context::StepContext;
use crate::error::{RunError, StepError};
use crate::plan::{validate_model, ModelError, ModelPlan};
use crate::step::{Declaration, Evaluation};

/// Everything needed to construct a [`Model`].
pub struct ModelConfig {
    /// Model name, used in tracing and reports.
    pub name: String,
    /// Arena capacity of each pool the model was generated for.
    pub capacities: PoolCapacities,
    /// Names of caller-supplied input tensors.
    pub inputs: Vec<String>,
    /// Names of caller-supplied output tensors.
    pub outputs: Vec<String>,
    /// Declaration steps, in execution order.
    pub declarations: Vec<Box<dyn Declaration>>,
    /// Evaluation steps, in execution order.
    pub evaluations: Vec<Box<dyn Evaluation>>,
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("capacities", &self.capacities)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("declarations", &self.declarations.len())
            .field("evaluations", &self.evaluations.len())
            .finish()
    }
}

/// Summary of one successful run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunReport {
    /// Model name.
    pub model: String,
    /// Declaration steps executed.
    pub declarations: usize,
    /// Evaluation steps executed.
    pub evaluations: usize,
    /// Bindings made during the run.
    pub bindings: usize,
    /// Highest usage of each pool during the run, entry usage included.
    pub peak: PoolBytes,
}

/// A validated generated model.
pub struct Model {
    name: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    declarations: Vec<Box<dyn Declaration>>,
    evaluations: Vec<Box<dyn Evaluation>>,
    plan: ModelPlan,
}

struct RunSummary {
    bindings: usize,
    peak: PoolBytes,
}

impl Model {
    /// Validate `config` and build the model.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        if config.name.is_empty() {
            return Err(ModelError::EmptyName);
        }
        let plan = validate_model(
            &config.declarations,
            &config.evaluations,
            &config.inputs,
            &config.outputs,
            config.capacities,
        )?;
        tracing::debug!(
            model = %config.name,
            declarations = config.declarations.len(),
            evaluations = config.evaluations.len(),
            metadata_required = plan.required().metadata,
            ram_required = plan.required().ram,
            "model validated"
        );
        Ok(Self {
            name: config.name,
            inputs: config.inputs,
            outputs: config.outputs,
            declarations: config.declarations,
            evaluations: config.evaluations,
            plan,
        })
    }

    /// Model name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The validated memory plan.
    pub fn plan(&self) -> &ModelPlan {
        &self.plan
    }

    /// Names of the caller-supplied inputs.
    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    /// Names of the caller-supplied outputs.
    pub fn outputs(&self) -> &[String] {
        &self.outputs
    }

    /// Run one inference.
    ///
    /// Runs every declaration, then every evaluation, releasing each
    /// evaluation's scratch after it returns. On every path, success or
    /// failure, both pools are unwound to their marks at entry, so
    /// consecutive runs see identical arena state.
    ///
    /// # Errors
    ///
    /// - [`RunError::ContextTooSmall`] if an installed arena has less free
    ///   space than the plan requires. Nothing is allocated.
    /// - [`RunError::MissingInput`] / [`RunError::MissingOutput`] if the
    ///   caller did not supply a declared tensor.
    /// - [`RunError::StepFailed`] if a step returns an error.
    /// - [`RunError::UnbalancedStep`] if an evaluation moves a pool's
    ///   high-water mark.
    pub fn compute(
        &self,
        ctx: &mut ExecutionContext<'_>,
        inputs: &dyn TensorReader,
        outputs: &mut dyn TensorWriter,
    ) -> Result<RunReport, RunError> {
        let required = self.plan.required();
        for pool in PoolKind::ALL {
            let available = ctx.allocator_ref(pool).remaining();
            if available < required.get(pool) {
                return Err(RunError::ContextTooSmall {
                    pool,
                    required: required.get(pool),
                    available,
                });
            }
        }
        if let Some(name) = self.inputs.iter().find(|n| inputs.tensor(n).is_none()) {
            return Err(RunError::MissingInput { name: name.clone() });
        }
        if let Some(name) = self.outputs.iter().find(|n| !outputs.contains(n)) {
            return Err(RunError::MissingOutput { name: name.clone() });
        }

        let entry = ctx.mark();
        tracing::debug!(model = %self.name, usage = %ctx.usage(), "run started");
        let outcome = self.run(ctx, inputs, outputs);
        let unwound = ctx.unwind_to(entry);

        match (outcome, unwound) {
            (Ok(summary), Ok(())) => {
                tracing::debug!(
                    model = %self.name,
                    peak = %summary.peak,
                    "run finished"
                );
                Ok(RunReport {
                    model: self.name.clone(),
                    declarations: self.declarations.len(),
                    evaluations: self.evaluations.len(),
                    bindings: summary.bindings,
                    peak: summary.peak,
                })
            }
            (Ok(_), Err(e)) => Err(RunError::Unwind(e)),
            (Err(e), unwound) => {
                if let Err(unwind_err) = unwound {
                    tracing::warn!(model = %self.name, error = %unwind_err, "unwind after failed run");
                }
                Err(e)
            }
        }
    }

    fn run(
        &self,
        ctx: &mut ExecutionContext<'_>,
        inputs: &dyn TensorReader,
        outputs: &mut dyn TensorWriter,
    ) -> Result<RunSummary, RunError> {
        let mut step_ctx = StepContext::new(ctx, inputs, outputs);

        for decl in &self.declarations {
            tracing::trace!(model = %self.name, step = decl.name(), "declare");
            decl.declare(&mut step_ctx)
                .map_err(|reason| self.step_failed(decl.name(), reason))?;
            step_ctx.note_usage();
        }

        step_ctx.begin_evaluation();
        for eval in &self.evaluations {
            tracing::trace!(model = %self.name, step = eval.name(), "evaluate");
            let before = step_ctx.usage();
            let evaluated = eval.evaluate(&mut step_ctx);
            step_ctx.note_usage();
            let released = step_ctx.release_scratch();
            evaluated
                .and(released)
                .map_err(|reason| self.step_failed(eval.name(), reason))?;

            let after = step_ctx.usage();
            if let Some(pool) = PoolKind::ALL
                .into_iter()
                .find(|&p| before.get(p) != after.get(p))
            {
                tracing::warn!(
                    model = %self.name,
                    step = eval.name(),
                    %pool,
                    before = before.get(pool),
                    after = after.get(pool),
                    "unbalanced evaluation"
                );
                return Err(RunError::UnbalancedStep {
                    step: eval.name().to_owned(),
                    pool,
                    before: before.get(pool),
                    after: after.get(pool),
                });
            }
        }

        Ok(RunSummary {
            bindings: step_ctx.binding_count(),
            peak: step_ctx.peak(),
        })
    }

    fn step_failed(&self, step: &str, reason: StepError) -> RunError {
        match reason.out_of_space() {
            Some((pool, requested)) => tracing::warn!(
                model = %self.name,
                step,
                %pool,
                requested,
                "arena exhausted"
            ),
            None => tracing::debug!(model = %self.name, step, error = %reason, "step failed"),
        }
        RunError::StepFailed {
            step: step.to_owned(),
            reason,
        }
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("declarations", &self.declarations.len())
            .field("evaluations", &self.evaluations.len())
            .field("plan", &self.plan)
            .finish()
    }
}
