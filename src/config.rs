use serde::Serialize;
use thiserror::Error;

/// Width of the physical addresses the cache decodes.
pub const ADDRESS_BITS: u32 = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{name} must be a positive power of two, got {value}")]
    NotPowerOfTwo { name: &'static str, value: usize },
    #[error("block size {block_size} x {ways} ways does not divide cache size {cache_size}")]
    Indivisible {
        block_size: usize,
        ways: usize,
        cache_size: usize,
    },
    #[error("offset and index fields need {bits} bits, wider than a 32-bit address")]
    AddressTooNarrow { bits: u32 },
}

/// Cache parameters as given on the command line: block size and total size
/// in bytes, plus associativity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheConfig {
    block_size: usize,
    cache_size: usize,
    ways: usize,
}

/// Field widths and set layout derived from a [`CacheConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Geometry {
    pub offset_bits: u32,
    pub index_bits: u32,
    pub tag_bits: u32,
    pub ways: usize,
    pub num_sets: usize,
}

fn power_of_two(name: &'static str, value: usize) -> Result<usize, ConfigError> {
    if value.is_power_of_two() {
        Ok(value)
    } else {
        Err(ConfigError::NotPowerOfTwo { name, value })
    }
}

impl CacheConfig {
    pub fn new(block_size: usize, cache_size: usize, ways: usize) -> Result<Self, ConfigError> {
        let block_size = power_of_two("block size", block_size)?;
        let cache_size = power_of_two("cache size", cache_size)?;
        let ways = power_of_two("ways", ways)?;

        let indivisible = ConfigError::Indivisible {
            block_size,
            ways,
            cache_size,
        };
        // All three are powers of two, so divisibility reduces to a size check.
        match block_size.checked_mul(ways) {
            Some(set_bytes) if set_bytes <= cache_size => {}
            _ => return Err(indivisible),
        }

        let config = CacheConfig {
            block_size,
            cache_size,
            ways,
        };
        let bits = config.block_size.ilog2() + config.num_sets().ilog2();
        if bits > ADDRESS_BITS {
            return Err(ConfigError::AddressTooNarrow { bits });
        }
        Ok(config)
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn cache_size(&self) -> usize {
        self.cache_size
    }

    pub fn ways(&self) -> usize {
        self.ways
    }

    pub fn num_sets(&self) -> usize {
        self.cache_size / (self.block_size * self.ways)
    }

    pub fn geometry(&self) -> Geometry {
        let offset_bits = self.block_size.ilog2();
        let index_bits = self.num_sets().ilog2();
        Geometry {
            offset_bits,
            index_bits,
            tag_bits: ADDRESS_BITS - offset_bits - index_bits,
            ways: self.ways,
            num_sets: self.num_sets(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_geometry() {
        let geom = CacheConfig::new(64, 32 * 1024, 8).unwrap().geometry();
        assert_eq!(geom.num_sets, 64);
        assert_eq!(geom.offset_bits, 6);
        assert_eq!(geom.index_bits, 6);
        assert_eq!(geom.tag_bits, 20);
        assert_eq!(geom.ways, 8);
    }

    #[test]
    fn geometry_covers_whole_cache() {
        for (block, size, ways) in [(1, 1, 1), (4, 8, 1), (16, 4096, 4), (32, 1024, 32)] {
            let config = CacheConfig::new(block, size, ways).unwrap();
            let geom = config.geometry();
            assert_eq!(geom.num_sets * geom.ways * block, size);
            assert_eq!(geom.offset_bits + geom.index_bits + geom.tag_bits, ADDRESS_BITS);
        }
    }

    #[test]
    fn fully_associative_has_no_index_bits() {
        let geom = CacheConfig::new(16, 256, 16).unwrap().geometry();
        assert_eq!(geom.num_sets, 1);
        assert_eq!(geom.index_bits, 0);
        assert_eq!(geom.tag_bits, 28);
    }

    #[test]
    fn rejects_non_powers_of_two() {
        assert_eq!(
            CacheConfig::new(24, 1024, 2),
            Err(ConfigError::NotPowerOfTwo {
                name: "block size",
                value: 24
            })
        );
        assert!(matches!(
            CacheConfig::new(16, 1000, 2),
            Err(ConfigError::NotPowerOfTwo { name: "cache size", .. })
        ));
        assert!(matches!(
            CacheConfig::new(16, 1024, 0),
            Err(ConfigError::NotPowerOfTwo { name: "ways", .. })
        ));
    }

    #[test]
    fn rejects_sets_larger_than_cache() {
        assert_eq!(
            CacheConfig::new(64, 128, 4),
            Err(ConfigError::Indivisible {
                block_size: 64,
                ways: 4,
                cache_size: 128
            })
        );
        assert!(CacheConfig::new(1 << 40, 1 << 40, 1 << 30).is_err());
    }

    #[test]
    fn rejects_fields_wider_than_address() {
        assert_eq!(
            CacheConfig::new(1, 1 << 33, 1),
            Err(ConfigError::AddressTooNarrow { bits: 33 })
        );
    }
}
