//! Fixed-capacity circular bump arenas for generated inference models.
//!
//! Every generated model owns two arenas sized offline by the memory
//! planner: one for small metadata records, one for tensor payloads.
//! Both are installed together into an [`ExecutionContext`] before any
//! declaration or evaluation step runs.
//!
//! # Architecture
//!
//! ```text
//! ExecutionContext (pool → arena binding, threaded through calls)
//! ├── &mut dyn Allocator  (metadata pool)
//! │   └── CircularArena<N> → [u8; N] + high-water mark
//! └── &mut dyn Allocator  (ram pool)
//!     └── CircularArena<M> → [u8; M] + high-water mark
//! ```
//!
//! # Release discipline
//!
//! An arena tracks a single high-water mark, not a free list. Only the
//! most recently issued live allocation may be released; anything else
//! is rejected with [`ArenaError::InvalidRelease`]. Handles and marks
//! carry the arena's epoch and issue number, so one that was released,
//! unwound past or reset away is refused instead of aliasing newer
//! bytes. [`ScratchScope`] makes the discipline structural: it holds the
//! arena's `&mut` borrow and unwinds to its opening mark on drop.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod allocator;
pub mod arena;
pub mod config;
pub mod context;
pub mod error;
pub mod handle;
pub mod scoped;

// Public re-exports for the primary API surface.
pub use allocator::{Allocator, ArenaState};
pub use arena::CircularArena;
pub use config::{PoolCapacities, MAX_POOL_CAPACITY};
pub use context::{ContextMark, ExecutionContext};
pub use error::ArenaError;
pub use handle::{AllocationHandle, ArenaMark};
pub use scoped::{ScratchScope, ScratchSlot};
