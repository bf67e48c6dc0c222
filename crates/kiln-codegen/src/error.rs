//! Code emission errors.

use std::error::Error;
use std::fmt;

use kiln_arena::ArenaError;
use kiln_core::PoolKind;

/// Errors from building snippets or rendering a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodegenError {
    /// No snippet constructor is registered for this operator type.
    UnsupportedOp {
        /// The unregistered operator type.
        op_type: String,
    },
    /// A name that must become a C++ identifier is not one.
    InvalidIdentifier {
        /// The offending name.
        name: String,
    },
    /// Two symbols in the container share a name.
    DuplicateSymbol {
        /// The contested name.
        name: String,
    },
    /// An operator lacks a required attribute.
    MissingAttr {
        /// Operator name.
        op: String,
        /// Attribute name.
        attr: String,
    },
    /// An operator attribute has the wrong shape or value.
    InvalidAttr {
        /// Operator name.
        op: String,
        /// Attribute name.
        attr: String,
        /// What was wrong.
        reason: String,
    },
    /// An output's quantization scale is NaN or infinite.
    NonFiniteScale {
        /// The output variable.
        var: String,
    },
    /// The configured pool capacities are invalid.
    Capacities(ArenaError),
    /// Local declarations need more bytes than a pool holds.
    FootprintExceedsPool {
        /// The undersized pool.
        pool: PoolKind,
        /// Bytes the declarations need.
        required: usize,
        /// Configured capacity.
        capacity: usize,
    },
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedOp { op_type } => write!(f, "unsupported op type: {op_type}"),
            Self::InvalidIdentifier { name } => write!(f, "'{name}' is not a valid identifier"),
            Self::DuplicateSymbol { name } => write!(f, "symbol '{name}' defined twice"),
            Self::MissingAttr { op, attr } => write!(f, "op '{op}' is missing attribute '{attr}'"),
            Self::InvalidAttr { op, attr, reason } => {
                write!(f, "op '{op}' attribute '{attr}': {reason}")
            }
            Self::NonFiniteScale { var } => {
                write!(f, "output '{var}' has a non-finite quantization scale")
            }
            Self::Capacities(e) => write!(f, "capacities: {e}"),
            Self::FootprintExceedsPool {
                pool,
                required,
                capacity,
            } => {
                write!(
                    f,
                    "declarations require {required} bytes of {pool}, capacity is {capacity}"
                )
            }
        }
    }
}

impl Error for CodegenError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Capacities(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ArenaError> for CodegenError {
    fn from(e: ArenaError) -> Self {
        Self::Capacities(e)
    }
}
