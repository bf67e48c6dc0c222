//! Memory pool categories and per-pool byte counts.

use std::fmt;

/// One of the two memory pools a generated model allocates from.
///
/// Each pool is backed by its own arena instance; the two never share
/// capacity. Pool identity is fixed when the model is generated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PoolKind {
    /// Small fixed-size bookkeeping records such as tensor descriptors.
    Metadata,
    /// Tensor payload bytes.
    Ram,
}

impl PoolKind {
    /// Both pools, metadata first.
    pub const ALL: [PoolKind; 2] = [PoolKind::Metadata, PoolKind::Ram];

    /// Short lowercase name used in diagnostics and generated code.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Ram => "ram",
        }
    }
}

impl fmt::Display for PoolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A byte count for each pool.
///
/// Used for step footprints, observed usage and run peaks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct PoolBytes {
    /// Bytes in the metadata pool.
    pub metadata: usize,
    /// Bytes in the ram pool.
    pub ram: usize,
}

impl PoolBytes {
    /// Zero bytes in both pools.
    pub const ZERO: PoolBytes = PoolBytes {
        metadata: 0,
        ram: 0,
    };

    /// Construct from explicit per-pool counts.
    pub const fn new(metadata: usize, ram: usize) -> Self {
        Self { metadata, ram }
    }

    /// Only `bytes` in `pool`, zero in the other.
    pub fn only(pool: PoolKind, bytes: usize) -> Self {
        let mut out = Self::ZERO;
        *out.get_mut(pool) = bytes;
        out
    }

    /// Byte count for `pool`.
    pub fn get(&self, pool: PoolKind) -> usize {
        match pool {
            PoolKind::Metadata => self.metadata,
            PoolKind::Ram => self.ram,
        }
    }

    /// Mutable byte count for `pool`.
    pub fn get_mut(&mut self, pool: PoolKind) -> &mut usize {
        match pool {
            PoolKind::Metadata => &mut self.metadata,
            PoolKind::Ram => &mut self.ram,
        }
    }

    /// Per-pool saturating sum.
    pub fn saturating_add(self, other: Self) -> Self {
        Self {
            metadata: self.metadata.saturating_add(other.metadata),
            ram: self.ram.saturating_add(other.ram),
        }
    }

    /// Per-pool maximum.
    pub fn max(self, other: Self) -> Self {
        Self {
            metadata: self.metadata.max(other.metadata),
            ram: self.ram.max(other.ram),
        }
    }
}

impl fmt::Display for PoolBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "metadata={}B ram={}B", self.metadata, self.ram)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_names() {
        assert_eq!(PoolKind::Metadata.to_string(), "metadata");
        assert_eq!(PoolKind::Ram.to_string(), "ram");
    }

    #[test]
    fn only_sets_one_pool() {
        let b = PoolBytes::only(PoolKind::Ram, 64);
        assert_eq!(b.get(PoolKind::Ram), 64);
        assert_eq!(b.get(PoolKind::Metadata), 0);
    }

    #[test]
    fn add_and_max_are_per_pool() {
        let a = PoolBytes::new(10, 100);
        let b = PoolBytes::new(20, 50);
        assert_eq!(a.saturating_add(b), PoolBytes::new(30, 150));
        assert_eq!(a.max(b), PoolBytes::new(20, 100));
    }

    #[test]
    fn saturating_add_does_not_wrap() {
        let a = PoolBytes::new(usize::MAX, 1);
        let b = PoolBytes::new(1, 1);
        assert_eq!(a.saturating_add(b).metadata, usize::MAX);
    }
}
