use std::{iter, ops::Range};

use tracing::{debug, trace};

use crate::{
    addr::{Addr, AddrDecoder},
    config::{CacheConfig, Geometry},
    lru::LruStack,
    stats::CacheStats,
    trace::{Access, AccessKind},
};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub valid: bool,
    pub dirty: bool,
    pub tag: u64,
}

impl Block {
    fn apply(&mut self, tag: u64, is_write: bool) {
        self.valid = true;
        self.tag = tag;
        self.dirty = is_write;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessOutcome {
    Hit,
    Miss,
    /// Miss whose victim was valid and dirty.
    MissWithWriteback,
}

impl AccessOutcome {
    pub fn is_hit(self) -> bool {
        self == AccessOutcome::Hit
    }
}

/// One set of a [`Cache`]: its ways and the LRU stack ordering them.
#[derive(Debug)]
pub struct CacheSet<'a> {
    blocks: &'a mut [Block],
    lru: &'a mut LruStack,
}

impl<'a> CacheSet<'a> {
    pub fn new(blocks: &'a mut [Block], lru: &'a mut LruStack) -> Self {
        assert_eq!(blocks.len(), lru.n_ways());
        CacheSet { blocks, lru }
    }

    /// First valid way holding `tag`.
    pub fn probe(&self, tag: u64) -> Option<usize> {
        self.blocks.iter().position(|b| b.valid && b.tag == tag)
    }

    pub fn record_access(&mut self, tag: u64, is_write: bool) -> AccessOutcome {
        if let Some(way) = self.probe(tag) {
            if is_write {
                self.blocks[way].dirty = true;
            }
            self.lru.mark_most_recently_used(way);
            return AccessOutcome::Hit;
        }

        // Cold misses fill an invalid way before anything is evicted
        let (way, outcome) = match self.blocks.iter().position(|b| !b.valid) {
            Some(vacant) => (vacant, AccessOutcome::Miss),
            None => {
                let lru_way = self.lru.least_recently_used();
                let victim = &self.blocks[lru_way];
                if victim.dirty {
                    trace!(way = lru_way, tag = victim.tag, "writeback");
                    (lru_way, AccessOutcome::MissWithWriteback)
                } else {
                    (lru_way, AccessOutcome::Miss)
                }
            }
        };
        self.blocks[way].apply(tag, is_write);
        self.lru.mark_most_recently_used(way);
        outcome
    }
}

/// Set-associative write-back cache with LRU replacement.
///
/// Blocks of every set live in one contiguous vector; set `s` owns
/// `blocks[s * ways..(s + 1) * ways]`.
#[derive(Debug)]
pub struct Cache {
    config: CacheConfig,
    geometry: Geometry,
    decoder: AddrDecoder,
    blocks: Vec<Block>,
    set_data: Vec<LruStack>,
    stats: CacheStats,
}

impl Cache {
    pub fn new(config: CacheConfig) -> Self {
        let geometry = config.geometry();
        debug!(
            block_size = config.block_size(),
            cache_size = config.cache_size(),
            ways = config.ways(),
            sets = geometry.num_sets,
            offset_bits = geometry.offset_bits,
            index_bits = geometry.index_bits,
            tag_bits = geometry.tag_bits,
            "cache geometry"
        );

        Cache {
            config,
            geometry,
            decoder: AddrDecoder::new(&geometry),
            blocks: vec![Block::default(); geometry.num_sets * geometry.ways],
            set_data: iter::repeat_with(|| LruStack::new(geometry.ways))
                .take(geometry.num_sets)
                .collect(),
            stats: CacheStats::default(),
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.config
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn split_addr(&self, addr: u64) -> Addr {
        self.decoder.split(addr)
    }

    fn get_set(&self, set: usize) -> Range<usize> {
        set * self.geometry.ways..(set + 1) * self.geometry.ways
    }

    pub fn set(&mut self, set: usize) -> CacheSet<'_> {
        let range = self.get_set(set);
        CacheSet::new(&mut self.blocks[range], &mut self.set_data[set])
    }

    pub fn set_blocks(&self, set: usize) -> &[Block] {
        &self.blocks[self.get_set(set)]
    }

    pub fn lru(&self, set: usize) -> &LruStack {
        &self.set_data[set]
    }

    /// The block currently caching `addr`, if any.
    pub fn resident(&self, addr: u64) -> Option<&Block> {
        let Addr { set, tag, .. } = self.split_addr(addr);
        self.set_blocks(set)
            .iter()
            .find(|b| b.valid && b.tag == tag)
    }

    pub fn access(&mut self, addr: u64, kind: AccessKind) -> AccessOutcome {
        let Addr { set, tag, .. } = self.split_addr(addr);
        let outcome = self.set(set).record_access(tag, kind.is_write());
        self.stats.record(outcome);
        outcome
    }

    pub fn replay(&mut self, accesses: &[Access]) {
        for access in accesses {
            self.access(access.addr, access.kind);
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }
}
