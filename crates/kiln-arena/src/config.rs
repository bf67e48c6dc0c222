//! Pool capacity configuration.

use kiln_core::PoolKind;

use crate::error::ArenaError;

/// Largest accepted pool capacity in bytes.
///
/// Handles store offsets and sizes as `u32`, so no pool may exceed the
/// `u32` range.
pub const MAX_POOL_CAPACITY: usize = u32::MAX as usize;

/// Check a single pool capacity.
///
/// Returns [`ArenaError::Configuration`] if `capacity` is zero or above
/// [`MAX_POOL_CAPACITY`].
pub fn validate_capacity(pool: PoolKind, capacity: usize) -> Result<(), ArenaError> {
    if capacity == 0 || capacity > MAX_POOL_CAPACITY {
        return Err(ArenaError::Configuration {
            pool,
            capacity,
            max: MAX_POOL_CAPACITY,
        });
    }
    Ok(())
}

/// The pair of pool capacities chosen offline by the memory planner.
///
/// Has no `Default`: capacities come from the lifetime analysis of a
/// concrete model.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolCapacities {
    /// Metadata pool capacity in bytes.
    pub metadata: usize,
    /// Ram pool capacity in bytes.
    pub ram: usize,
}

impl PoolCapacities {
    /// Create a capacity pair.
    pub fn new(metadata: usize, ram: usize) -> Self {
        Self { metadata, ram }
    }

    /// Capacity of the given pool.
    pub fn for_pool(&self, pool: PoolKind) -> usize {
        match pool {
            PoolKind::Metadata => self.metadata,
            PoolKind::Ram => self.ram,
        }
    }

    /// Check both capacities, metadata first.
    pub fn validate(&self) -> Result<(), ArenaError> {
        for pool in PoolKind::ALL {
            validate_capacity(pool, self.for_pool(pool))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_pair_passes() {
        assert!(PoolCapacities::new(256, 4096).validate().is_ok());
    }

    #[test]
    fn zero_metadata_is_rejected_first() {
        let err = PoolCapacities::new(0, 0).validate().unwrap_err();
        assert!(matches!(
            err,
            ArenaError::Configuration {
                pool: PoolKind::Metadata,
                capacity: 0,
                ..
            }
        ));
    }

    #[test]
    #[cfg(target_pointer_width = "64")]
    fn oversized_ram_is_rejected() {
        let err = PoolCapacities::new(16, MAX_POOL_CAPACITY + 1)
            .validate()
            .unwrap_err();
        assert!(matches!(
            err,
            ArenaError::Configuration {
                pool: PoolKind::Ram,
                ..
            }
        ));
    }

    #[test]
    fn max_capacity_is_accepted() {
        assert!(validate_capacity(PoolKind::Ram, MAX_POOL_CAPACITY).is_ok());
    }
}
