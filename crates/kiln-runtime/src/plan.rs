//! Model validation and memory planning.
//!
//! [`validate_model`] runs once at model construction. It checks the
//! step lists for structural errors and sizes the arenas the model
//! needs: the sum of every declaration footprint plus the largest
//! evaluation scratch requirement, per pool.

use std::error::Error;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use kiln_arena::{ArenaError, PoolCapacities};
use kiln_core::{PoolBytes, PoolKind};

use crate::step::{Declaration, Evaluation};

// ── Plan ───────────────────────────────────────────────────────────

/// Per-pool memory requirements of a validated model.
#[derive(Debug, Clone)]
#[must_use]
pub struct ModelPlan {
    capacities: PoolCapacities,
    declared: PoolBytes,
    max_scratch: PoolBytes,
    footprints: IndexMap<String, PoolBytes>,
}

impl ModelPlan {
    /// Configured capacity of each pool.
    pub fn capacities(&self) -> PoolCapacities {
        self.capacities
    }

    /// Total bytes bound by all declarations.
    pub fn declared(&self) -> PoolBytes {
        self.declared
    }

    /// Largest scratch requirement of any single evaluation.
    pub fn max_scratch(&self) -> PoolBytes {
        self.max_scratch
    }

    /// Bytes a run needs free in each pool.
    pub fn required(&self) -> PoolBytes {
        self.declared.saturating_add(self.max_scratch)
    }

    /// Configured capacity left over after [`required`](Self::required).
    pub fn headroom(&self, pool: PoolKind) -> usize {
        self.capacities
            .for_pool(pool)
            .saturating_sub(self.required().get(pool))
    }

    /// Footprint of a named step: bound bytes for declarations, scratch
    /// bytes for evaluations.
    pub fn footprint(&self, step: &str) -> Option<PoolBytes> {
        self.footprints.get(step).copied()
    }

    /// Number of steps in the plan.
    pub fn len(&self) -> usize {
        self.footprints.len()
    }

    /// Whether the plan covers zero steps.
    pub fn is_empty(&self) -> bool {
        self.footprints.is_empty()
    }
}

// ── Errors ─────────────────────────────────────────────────────────

/// Errors from model validation (construction-time, not per-run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    /// The model has no evaluation steps.
    EmptyModel,
    /// The model name is empty.
    EmptyName,
    /// Two steps share a name.
    DuplicateStep {
        /// The contested name.
        name: String,
    },
    /// An input or output name appears twice.
    DuplicateTensor {
        /// The contested name.
        name: String,
    },
    /// The configured pool capacities are invalid.
    Capacities(ArenaError),
    /// The planned requirement exceeds a configured pool capacity.
    FootprintExceedsPool {
        /// The undersized pool.
        pool: PoolKind,
        /// Bytes the model requires.
        required: usize,
        /// Configured capacity.
        capacity: usize,
    },
}

impl fmt::Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyModel => write!(f, "model has no evaluation steps"),
            Self::EmptyName => write!(f, "model name is empty"),
            Self::DuplicateStep { name } => write!(f, "step name '{name}' used twice"),
            Self::DuplicateTensor { name } => {
                write!(f, "tensor name '{name}' used twice in inputs/outputs")
            }
            Self::Capacities(e) => write!(f, "capacities: {e}"),
            Self::FootprintExceedsPool {
                pool,
                required,
                capacity,
            } => {
                write!(
                    f,
                    "model requires {required} bytes of {pool}, capacity is {capacity}"
                )
            }
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Capacities(e) => Some(e),
            _ => None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────────

/// Validate a model's steps and tensors against its pool capacities.
///
/// Checks, in order:
/// 1. Capacities are valid for their pools.
/// 2. At least one evaluation step exists.
/// 3. Step names are unique across declarations and evaluations.
/// 4. Input and output names are unique across both lists.
/// 5. Declared bytes plus the largest scratch requirement fit each pool.
pub fn validate_model(
    declarations: &[Box<dyn Declaration>],
    evaluations: &[Box<dyn Evaluation>],
    inputs: &[String],
    outputs: &[String],
    capacities: PoolCapacities,
) -> Result<ModelPlan, ModelError> {
    capacities.validate().map_err(ModelError::Capacities)?;
    if evaluations.is_empty() {
        return Err(ModelError::EmptyModel);
    }

    let mut footprints = IndexMap::with_capacity(declarations.len() + evaluations.len());
    let mut declared = PoolBytes::ZERO;
    for decl in declarations {
        let fp = decl.footprint();
        if footprints.insert(decl.name().to_owned(), fp).is_some() {
            return Err(ModelError::DuplicateStep {
                name: decl.name().to_owned(),
            });
        }
        declared = declared.saturating_add(fp);
    }

    let mut max_scratch = PoolBytes::ZERO;
    for eval in evaluations {
        let fp = eval.scratch();
        if footprints.insert(eval.name().to_owned(), fp).is_some() {
            return Err(ModelError::DuplicateStep {
                name: eval.name().to_owned(),
            });
        }
        max_scratch = max_scratch.max(fp);
    }

    let mut seen = IndexSet::with_capacity(inputs.len() + outputs.len());
    for name in inputs.iter().chain(outputs) {
        if !seen.insert(name.as_str()) {
            return Err(ModelError::DuplicateTensor { name: name.clone() });
        }
    }

    let plan = ModelPlan {
        capacities,
        declared,
        max_scratch,
        footprints,
    };
    for pool in PoolKind::ALL {
        let required = plan.required().get(pool);
        let capacity = capacities.for_pool(pool);
        if required > capacity {
            return Err(ModelError::FootprintExceedsPool {
                pool,
                required,
                capacity,
            });
        }
    }
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StepContext;
    use crate::error::StepError;

    struct Decl(&'static str, PoolBytes);

    impl Declaration for Decl {
        fn name(&self) -> &str {
            self.0
        }
        fn footprint(&self) -> PoolBytes {
            self.1
        }
        fn declare(&self, _ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
            Ok(())
        }
    }

    struct Eval(&'static str, PoolBytes);

    impl Evaluation for Eval {
        fn name(&self) -> &str {
            self.0
        }
        fn scratch(&self) -> PoolBytes {
            self.1
        }
        fn evaluate(&self, _ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
            Ok(())
        }
    }

    fn decl(name: &'static str, meta: usize, ram: usize) -> Box<dyn Declaration> {
        Box::new(Decl(name, PoolBytes::new(meta, ram)))
    }

    fn eval(name: &'static str, meta: usize, ram: usize) -> Box<dyn Evaluation> {
        Box::new(Eval(name, PoolBytes::new(meta, ram)))
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn required_is_declared_plus_max_scratch() {
        let plan = validate_model(
            &[decl("a", 24, 100), decl("b", 24, 50)],
            &[eval("x", 0, 64), eval("y", 8, 16)],
            &names(&["in"]),
            &names(&["out"]),
            PoolCapacities::new(64, 256),
        )
        .unwrap();
        assert_eq!(plan.declared(), PoolBytes::new(48, 150));
        assert_eq!(plan.max_scratch(), PoolBytes::new(8, 64));
        assert_eq!(plan.required(), PoolBytes::new(56, 214));
        assert_eq!(plan.headroom(PoolKind::Ram), 42);
        assert_eq!(plan.footprint("y"), Some(PoolBytes::new(8, 16)));
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn empty_model_rejected() {
        let err = validate_model(&[], &[], &[], &[], PoolCapacities::new(64, 64)).unwrap_err();
        assert_eq!(err, ModelError::EmptyModel);
    }

    #[test]
    fn duplicate_step_across_phases_rejected() {
        let err = validate_model(
            &[decl("conv", 0, 0)],
            &[eval("conv", 0, 0)],
            &[],
            &[],
            PoolCapacities::new(64, 64),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::DuplicateStep {
                name: "conv".into()
            }
        );
    }

    #[test]
    fn input_output_name_clash_rejected() {
        let err = validate_model(
            &[],
            &[eval("x", 0, 0)],
            &names(&["t"]),
            &names(&["t"]),
            PoolCapacities::new(64, 64),
        )
        .unwrap_err();
        assert_eq!(err, ModelError::DuplicateTensor { name: "t".into() });
    }

    #[test]
    fn oversized_footprint_names_the_pool() {
        let err = validate_model(
            &[decl("a", 40, 0)],
            &[eval("x", 30, 0)],
            &[],
            &[],
            PoolCapacities::new(64, 64),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModelError::FootprintExceedsPool {
                pool: PoolKind::Metadata,
                required: 70,
                capacity: 64,
            }
        );
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = validate_model(&[], &[eval("x", 0, 0)], &[], &[], PoolCapacities::new(0, 64))
            .unwrap_err();
        assert!(matches!(err, ModelError::Capacities(_)));
    }
}
