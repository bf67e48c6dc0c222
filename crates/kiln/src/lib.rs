//! Kiln: static circular arenas and step sequencing for generated
//! embedded inference models.
//!
//! This is the facade crate that re-exports the public API of the Kiln
//! sub-crates. Generated models and their hosts normally depend on
//! `kiln` alone.
//!
//! # Quick start
//!
//! ```rust
//! use std::collections::HashMap;
//! use kiln::prelude::*;
//!
//! // Caller-owned tensors.
//! #[derive(Default)]
//! struct Tensors(HashMap<String, Vec<u8>>);
//! impl TensorReader for Tensors {
//!     fn tensor(&self, name: &str) -> Option<&[u8]> {
//!         self.0.get(name).map(Vec::as_slice)
//!     }
//! }
//! impl TensorWriter for Tensors {
//!     fn tensor_mut(&mut self, name: &str) -> Option<&mut [u8]> {
//!         self.0.get_mut(name).map(Vec::as_mut_slice)
//!     }
//!     fn contains(&self, name: &str) -> bool {
//!         self.0.contains_key(name)
//!     }
//! }
//!
//! // Copies `x` through the arena into `y`, adding one on the way.
//! struct AddOne;
//! impl Evaluation for AddOne {
//!     fn name(&self) -> &str { "add_one" }
//!     fn evaluate(&self, ctx: &mut StepContext<'_, '_>) -> Result<(), StepError> {
//!         ctx.load_input("x", "buf")?;
//!         for v in ctx.binding_mut("buf")? {
//!             *v = v.wrapping_add(1);
//!         }
//!         ctx.store_output("buf", "y")
//!     }
//! }
//!
//! let model = Model::new(ModelConfig {
//!     name: "add_one".into(),
//!     capacities: PoolCapacities::new(64, 64),
//!     inputs: vec!["x".into()],
//!     outputs: vec!["y".into()],
//!     declarations: vec![Box::new(TensorDeclaration::new(
//!         "buf",
//!         TensorDescriptor::new(DType::U8, Shape::from_slice(&[4])),
//!     ))],
//!     evaluations: vec![Box::new(AddOne)],
//! })
//! .unwrap();
//!
//! let mut meta = CircularArena::<64>::new(PoolKind::Metadata).unwrap();
//! let mut ram = CircularArena::<64>::new(PoolKind::Ram).unwrap();
//! let mut ctx = ExecutionContext::new(&mut meta, &mut ram).unwrap();
//!
//! let mut inputs = Tensors::default();
//! inputs.0.insert("x".into(), vec![1, 2, 3, 4]);
//! let mut outputs = Tensors::default();
//! outputs.0.insert("y".into(), vec![0; 4]);
//!
//! model.compute(&mut ctx, &inputs, &mut outputs).unwrap();
//! assert_eq!(outputs.0["y"], vec![2, 3, 4, 5]);
//! assert_eq!(ctx.usage(), PoolBytes::ZERO);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `kiln-core` | Pools, tensor descriptors, caller tensor traits |
//! | [`arena`] | `kiln-arena` | Circular arenas, scratch scopes, execution context |
//! | [`runtime`] | `kiln-runtime` | Step traits, model validation and sequencing |
//! | [`codegen`] | `kiln-codegen` | Snippets, operator factory, container rendering |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Pools, tensor descriptors and caller tensor traits (`kiln-core`).
pub use kiln_core as types;

/// Circular arenas and the execution context (`kiln-arena`).
///
/// [`arena::CircularArena`] is the fixed-capacity stack allocator;
/// [`arena::ExecutionContext`] pairs one metadata and one ram arena.
pub use kiln_arena as arena;

/// Step traits and model sequencing (`kiln-runtime`).
///
/// Implement [`runtime::Declaration`] and [`runtime::Evaluation`], then
/// assemble them into a [`runtime::Model`].
pub use kiln_runtime as runtime;

/// Source emission for generated models (`kiln-codegen`).
pub use kiln_codegen as codegen;

/// Common imports for typical Kiln usage.
///
/// ```rust
/// use kiln::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use kiln_core::{
        DType, PoolBytes, PoolKind, Shape, TensorDescriptor, TensorReader, TensorWriter,
    };

    // Arenas
    pub use kiln_arena::{
        AllocationHandle, Allocator, ArenaError, CircularArena, ExecutionContext,
        PoolCapacities, ScratchScope,
    };

    // Runtime
    pub use kiln_runtime::{
        Declaration, Evaluation, Model, ModelConfig, ModelError, Region, RunError, RunReport,
        StepContext, StepError, TensorDeclaration,
    };

    // Codegen
    pub use kiln_codegen::{render_container, CodegenError, ModelIr, OperatorFactory};
}
