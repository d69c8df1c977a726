//! Per-set LRU stack.
//!
//! Each way holds a rank: 0 is the most recently used way and `ways - 1` the
//! least recently used. The ranks always form a permutation of `0..ways`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LruStack {
    ranks: Box<[usize]>,
}

impl LruStack {
    /// Way 0 starts as MRU and way `ways - 1` as LRU.
    pub fn new(n_ways: usize) -> Self {
        assert!(n_ways > 0, "an LRU stack needs at least one way");
        LruStack {
            ranks: (0..n_ways).collect(),
        }
    }

    pub fn n_ways(&self) -> usize {
        self.ranks.len()
    }

    pub fn rank(&self, way: usize) -> usize {
        self.ranks[way]
    }

    /// The way holding the bottom rank. Does not change the stack.
    pub fn least_recently_used(&self) -> usize {
        let bottom = self.ranks.len() - 1;
        self.ranks
            .iter()
            .position(|&rank| rank == bottom)
            .expect("LRU ranks are a permutation, so the bottom rank is always held")
    }

    /// Moves `way` to rank 0, pushing every way that was more recent down one
    /// rank. Ways below `way` keep their ranks.
    pub fn mark_most_recently_used(&mut self, way: usize) {
        let promoted = self.ranks[way];
        for rank in self.ranks.iter_mut() {
            if *rank < promoted {
                *rank += 1;
            }
        }
        self.ranks[way] = 0;
        debug_assert!(self.is_permutation(), "LRU ranks {:?}", self.ranks);
    }

    /// Ways ordered from most to least recently used.
    pub fn order(&self) -> Vec<usize> {
        let mut order = vec![0; self.ranks.len()];
        for (way, &rank) in self.ranks.iter().enumerate() {
            order[rank] = way;
        }
        order
    }

    pub fn is_permutation(&self) -> bool {
        let mut seen = vec![false; self.ranks.len()];
        self.ranks.iter().all(|&rank| {
            rank < seen.len() && !std::mem::replace(&mut seen[rank], true)
        })
    }
}
