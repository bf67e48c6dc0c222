//! Benchmark profiles for the kiln arena runtime.
//!
//! - [`allocation_trace`]: deterministic `(size, align)` requests from a
//!   seeded ChaCha8 stream
//! - [`layered_model`]: an `n`-layer int8 model of tensor declarations,
//!   dense layers with i32 scratch accumulators and in-place ReLUs

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use kiln_arena::PoolCapacities;
use kiln_core::{DType, PoolBytes, PoolKind, Shape, TensorDescriptor};
use kiln_runtime::{
    Declaration, Evaluation, ModelConfig, Region, StepContext, StepError, TensorDeclaration,
};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Metadata capacity used by the benchmark profiles.
pub const PROFILE_METADATA: usize = 4096;

/// Ram capacity used by the benchmark profiles.
pub const PROFILE_RAM: usize = 64 * 1024;

/// Generate `len` deterministic allocation requests.
///
/// Sizes are in `0..max_size`, alignments in `{1, 2, 4, 8, 16}`.
pub fn allocation_trace(seed: u64, len: usize, max_size: usize) -> Vec<(usize, usize)> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let max_size = max_size.max(1);
    (0..len)
        .map(|_| {
            let size = rng.next_u32() as usize % max_size;
            let align = 1usize << (rng.next_u32() % 5);
            (size, align)
        })
        .collect()
}

fn activation(layer: usize) -> String {
    format!("act_{layer}")
}

/// Copies the `input` tensor into the first activation.
struct LoadLayer;

impl Evaluation for LoadLayer {
    fn name(&self) -> &str {
        "load_input"
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        ctx.load_input("input", &activation(0))
    }
}

/// Fixed-weight dense layer: `to[j] = clamp(sum_i from[i] * w(i, j) >> 2)`
/// with weights in `{-1, 0, 1}`.
struct DenseLayer {
    name: String,
    from: String,
    to: String,
    width: usize,
}

impl Evaluation for DenseLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn scratch(&self) -> PoolBytes {
        PoolBytes::only(PoolKind::Ram, self.width * 4 + 3)
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        let acc = ctx.scratch(PoolKind::Ram, self.width * 4, 4)?;
        let (input, acc_bytes) = ctx.split_mut(Region::Binding(&self.from), Region::Scratch(acc))?;
        for (j, slot) in acc_bytes.chunks_exact_mut(4).enumerate() {
            let sum: i32 = input
                .iter()
                .enumerate()
                .map(|(i, &x)| (x as i8 as i32) * (((i + j) % 3) as i32 - 1))
                .sum();
            slot.copy_from_slice(&sum.to_le_bytes());
        }
        let (acc_bytes, output) = ctx.split_mut(Region::Scratch(acc), Region::Binding(&self.to))?;
        for (slot, out) in acc_bytes.chunks_exact(4).zip(output.iter_mut()) {
            let sum = i32::from_le_bytes([slot[0], slot[1], slot[2], slot[3]]);
            *out = (sum >> 2).clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8;
        }
        Ok(())
    }
}

/// In-place int8 ReLU.
struct ReluLayer {
    name: String,
    tensor: String,
}

impl Evaluation for ReluLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        for v in ctx.binding_mut(&self.tensor)? {
            if (*v as i8) < 0 {
                *v = 0;
            }
        }
        Ok(())
    }
}

/// Copies the last activation into the `output` tensor.
struct StoreLayer {
    from: String,
}

impl Evaluation for StoreLayer {
    fn name(&self) -> &str {
        "store_output"
    }

    fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
        ctx.store_output(&self.from, "output")
    }
}

/// Build an `layers`-deep int8 model over `width`-element activations.
///
/// Inputs: `input` (`width` bytes). Outputs: `output` (`width` bytes).
pub fn layered_model(layers: usize, width: usize) -> ModelConfig {
    let declarations: Vec<Box<dyn Declaration>> = (0..=layers)
        .map(|l| {
            Box::new(TensorDeclaration::new(
                activation(l),
                TensorDescriptor::new(DType::I8, Shape::from_slice(&[1, width as u32])),
            )) as Box<dyn Declaration>
        })
        .collect();

    let mut evaluations: Vec<Box<dyn Evaluation>> = vec![Box::new(LoadLayer)];
    for l in 0..layers {
        evaluations.push(Box::new(DenseLayer {
            name: format!("dense_{l}"),
            from: activation(l),
            to: activation(l + 1),
            width,
        }));
        evaluations.push(Box::new(ReluLayer {
            name: format!("relu_{l}"),
            tensor: activation(l + 1),
        }));
    }
    evaluations.push(Box::new(StoreLayer {
        from: activation(layers),
    }));

    ModelConfig {
        name: format!("layered_{layers}x{width}"),
        capacities: PoolCapacities::new(PROFILE_METADATA, PROFILE_RAM),
        inputs: vec!["input".into()],
        outputs: vec!["output".into()],
        declarations,
        evaluations,
    }
}
