//! The valid state space: the sorted, compactly-encoded set of joint
//! states that satisfy the grid's validity rules, with bounded caches
//! that amortize repeated lookups during policy iteration.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use crate::geometry::{MapSize, Obstacle, Vec2D};
use crate::state::State;

/// The narrowest unsigned-integer backing array that fits the largest
/// packed index in the space.
#[derive(Debug)]
enum VssArray {
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
}

impl VssArray {
    fn from_sorted_indices(indices: Vec<u64>) -> Self {
        let max = indices.last().copied().unwrap_or(0);
        if max <= u8::MAX as u64 {
            VssArray::U8(indices.into_iter().map(|v| v as u8).collect())
        } else if max <= u16::MAX as u64 {
            VssArray::U16(indices.into_iter().map(|v| v as u16).collect())
        } else if max <= u32::MAX as u64 {
            VssArray::U32(indices.into_iter().map(|v| v as u32).collect())
        } else {
            VssArray::U64(indices)
        }
    }

    fn len(&self) -> usize {
        match self {
            VssArray::U8(v) => v.len(),
            VssArray::U16(v) => v.len(),
            VssArray::U32(v) => v.len(),
            VssArray::U64(v) => v.len(),
        }
    }

    fn get(&self, index: usize) -> u64 {
        match self {
            VssArray::U8(v) => v[index] as u64,
            VssArray::U16(v) => v[index] as u64,
            VssArray::U32(v) => v[index] as u64,
            VssArray::U64(v) => v[index],
        }
    }
}

/// Bounded, insertion-ordered cache: eviction is strictly oldest-first
/// once the map grows past `capacity`. Re-inserting an existing key
/// updates its value without moving it in eviction order (this mirrors
/// `collections.OrderedDict`'s behaviour under plain item assignment).
#[derive(Debug, Clone)]
struct BoundedCache {
    map: HashMap<i64, i64>,
    order: VecDeque<i64>,
    capacity: usize,
}

impl BoundedCache {
    fn new(capacity: usize) -> Self {
        BoundedCache {
            map: HashMap::new(),
            order: VecDeque::new(),
            capacity,
        }
    }

    fn get(&self, key: i64) -> Option<i64> {
        self.map.get(&key).copied()
    }

    fn contains(&self, key: i64) -> bool {
        self.map.contains_key(&key)
    }

    fn insert(&mut self, key: i64, value: i64) {
        if self.map.insert(key, value).is_none() {
            self.order.push_back(key);
        }
        while self.map.len() > self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.map.remove(&oldest);
                }
                None => break,
            }
        }
    }
}

/// The space of valid joint states for a given grid and obstacle set.
#[derive(Debug, Clone)]
pub struct ValidStateSpace {
    map_size: MapSize,
    array: Arc<VssArray>,
    space_size: usize,
    valid_cache: RefCell<BoundedCache>,
    not_valid_cache: RefCell<BoundedCache>,
}

impl ValidStateSpace {
    /// Enumerate the packed index from 0 upward (agent fastest, then
    /// opponent, then target), keeping only states passing the validity
    /// test, then freeze into the narrowest backing array.
    pub fn build(map_size: Vec2D, obstacles: &[Obstacle]) -> Self {
        let map_size = MapSize::new(map_size.x, map_size.y);
        let mut indices = Vec::new();
        let mut state = State::default();
        loop {
            if is_state_valid(&state, obstacles) {
                indices.push(state.pack(&map_size));
            }
            if !state.advance(&map_size) {
                break;
            }
        }
        let space_size = indices.len();
        let max_cache_length = (3 * map_size.n.max(0)) as usize;
        ValidStateSpace {
            map_size,
            array: Arc::new(VssArray::from_sorted_indices(indices)),
            space_size,
            valid_cache: RefCell::new(BoundedCache::new(max_cache_length)),
            not_valid_cache: RefCell::new(BoundedCache::new(max_cache_length)),
        }
    }

    pub fn map_size(&self) -> &MapSize {
        &self.map_size
    }

    pub fn space_size(&self) -> usize {
        self.space_size
    }

    /// Return the valid index of `state`, which must already be known
    /// valid. `None` if it was not found (a bug: the caller should have
    /// checked validity first).
    pub fn get_valid_index(&self, state: &State) -> Option<usize> {
        let packed = state.pack(&self.map_size) as i64;
        if let Some(valid_index) = self.valid_cache.borrow().get(packed) {
            return Some(valid_index as usize);
        }
        let (found, k) = self.binary_search(packed as u64);
        if !found {
            return None;
        }
        self.add_to_valid_cache(packed, k as i64);
        Some(k)
    }

    /// Return `true` if `state`'s positions don't collide with any
    /// obstacle. Assumes `state` is already known to be within bounds.
    pub fn is_state_outside_obstacles(&self, state: &State) -> bool {
        let packed = state.pack(&self.map_size) as i64;
        if self.valid_cache.borrow().contains(packed) {
            return true;
        }
        if self.not_valid_cache.borrow().contains(packed) {
            return false;
        }
        let (found, k) = self.binary_search(packed as u64);
        if found {
            self.add_to_valid_cache(packed, k as i64);
        } else {
            self.add_to_not_valid_cache(packed, k as i64);
        }
        found
    }

    pub fn is_state_within_bounds(&self, state: &State) -> bool {
        self.map_size.contains(state.agent)
            && self.map_size.contains(state.opponent)
            && self.map_size.contains(state.target)
    }

    /// Materialize the `index`-th valid state into `out`.
    pub fn copy_valid_state_to(&self, out: &mut State, index: usize) {
        out.unpack_into(self.array.get(index), &self.map_size);
    }

    pub fn get(&self, index: usize) -> State {
        State::unpack(self.array.get(index), &self.map_size)
    }

    pub fn contains_index(&self, packed: u64) -> bool {
        self.binary_search(packed).0
    }

    pub fn contains_state(&self, state: &State) -> bool {
        self.is_state_within_bounds(state) && self.is_state_outside_obstacles(state)
    }

    pub fn iter(&self) -> ValidStateSpaceIter<'_> {
        ValidStateSpaceIter {
            vss: self,
            front: 0,
            back: self.space_size,
        }
    }

    /// Binary search contract: `(true, k)` on hit with `k` the exact
    /// position, `(false, k)` on miss with `k` the largest index whose
    /// element is smaller than `query` (as `i64`, `-1` if none).
    fn binary_search(&self, query: u64) -> (bool, i64) {
        if self.space_size == 0 {
            return (false, -1);
        }
        let mut i: i64 = 0;
        let mut j: i64 = self.space_size as i64 - 1;
        while i <= j {
            let k = (i + j) / 2;
            let retrieved = self.array.get(k as usize);
            if retrieved == query {
                return (true, k);
            } else if retrieved < query {
                i = k + 1;
            } else {
                j = k - 1;
            }
        }
        (false, j)
    }

    fn add_to_valid_cache(&self, packed: i64, valid_index: i64) {
        self.valid_cache.borrow_mut().insert(packed, valid_index);
        self.load_near_states_to_cache(packed, valid_index, true);
    }

    fn add_to_not_valid_cache(&self, packed: i64, last_smaller_valid_index: i64) {
        self.not_valid_cache
            .borrow_mut()
            .insert(packed, last_smaller_valid_index);
        self.load_near_states_to_cache(packed, last_smaller_valid_index, false);
    }

    /// Opportunistic neighbour loading: inspect the predecessor and
    /// successor slots in the backing array to deduce runs of adjacent
    /// valid/invalid packed indices, since a single-action transition
    /// changes the packed index by a small, predictable delta.
    fn load_near_states_to_cache(&self, state_index: i64, valid_state_index: i64, is_state_valid: bool) {
        let prev_valid_state_index = if is_state_valid {
            valid_state_index - 1
        } else {
            valid_state_index
        };
        let prev_state_index = state_index - 1;
        let next_valid_state_index = valid_state_index + 1;
        let next_state_index = state_index + 1;

        if prev_valid_state_index > -1 {
            let prev_state_index_found = self.array.get(prev_valid_state_index as usize) as i64;
            if prev_state_index_found == prev_state_index {
                self.valid_cache
                    .borrow_mut()
                    .insert(prev_state_index, prev_valid_state_index);
            } else {
                self.valid_cache
                    .borrow_mut()
                    .insert(prev_state_index_found, prev_valid_state_index);
                self.not_valid_cache
                    .borrow_mut()
                    .insert(prev_state_index_found + 1, prev_valid_state_index);
                self.not_valid_cache
                    .borrow_mut()
                    .insert(prev_state_index, prev_valid_state_index);
            }
        } else {
            self.not_valid_cache
                .borrow_mut()
                .insert(prev_state_index, prev_valid_state_index);
        }

        if (next_valid_state_index as usize) < self.space_size {
            let next_state_index_found = self.array.get(next_valid_state_index as usize) as i64;
            if next_state_index_found == next_state_index {
                self.valid_cache
                    .borrow_mut()
                    .insert(next_state_index, next_valid_state_index);
            } else {
                self.valid_cache
                    .borrow_mut()
                    .insert(next_state_index_found, next_valid_state_index);
                self.not_valid_cache
                    .borrow_mut()
                    .insert(next_state_index_found - 1, valid_state_index);
                self.not_valid_cache
                    .borrow_mut()
                    .insert(next_state_index, valid_state_index);
            }
        } else {
            self.not_valid_cache
                .borrow_mut()
                .insert(next_state_index, valid_state_index);
        }
    }
}

fn is_state_valid(state: &State, obstacles: &[Obstacle]) -> bool {
    if state.target == state.opponent {
        return false;
    }
    !obstacles.iter().any(|obstacle| {
        obstacle.is_inside(state.agent)
            || obstacle.is_inside(state.opponent)
            || obstacle.is_inside(state.target)
    })
}

/// Forward or reverse in-order traversal over a [`ValidStateSpace`].
pub struct ValidStateSpaceIter<'a> {
    vss: &'a ValidStateSpace,
    front: usize,
    back: usize,
}

impl<'a> Iterator for ValidStateSpaceIter<'a> {
    type Item = (usize, State);

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let index = self.front;
        self.front += 1;
        Some((index, self.vss.get(index)))
    }
}

impl<'a> DoubleEndedIterator for ValidStateSpaceIter<'a> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        Some((self.back, self.vss.get(self.back)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vss_sorted_and_complete() {
        let obstacles = vec![Obstacle::new(Vec2D::new(1, 1), Vec2D::new(1, 1))];
        let vss = ValidStateSpace::build(Vec2D::new(3, 3), &obstacles);
        let mut last = None;
        let mut count = 0usize;
        for x in 0..3 {
            for y in 0..3 {
                for ox in 0..3 {
                    for oy in 0..3 {
                        for tx in 0..3 {
                            for ty in 0..3 {
                                let state = State::new(
                                    Vec2D::new(x, y),
                                    Vec2D::new(ox, oy),
                                    Vec2D::new(tx, ty),
                                );
                                if is_state_valid(&state, &obstacles) {
                                    count += 1;
                                    assert!(vss.contains_state(&state));
                                }
                            }
                        }
                    }
                }
            }
        }
        assert_eq!(vss.space_size(), count);
        for (_, state) in vss.iter() {
            let packed = state.pack(vss.map_size());
            assert!(last.map(|l| l < packed).unwrap_or(true));
            last = Some(packed);
        }
    }

    #[test]
    fn get_valid_index_round_trips() {
        let vss = ValidStateSpace::build(Vec2D::new(3, 1), &[]);
        for (k, state) in vss.iter() {
            assert_eq!(vss.get_valid_index(&state), Some(k));
        }
    }

    #[test]
    fn reverse_iteration_matches_forward_reversed() {
        let vss = ValidStateSpace::build(Vec2D::new(3, 2), &[]);
        let forward: Vec<_> = vss.iter().map(|(k, _)| k).collect();
        let backward: Vec<_> = vss.iter().rev().map(|(k, _)| k).collect();
        let mut reversed_forward = forward.clone();
        reversed_forward.reverse();
        assert_eq!(backward, reversed_forward);
    }

    #[test]
    fn binary_search_contract() {
        let vss = ValidStateSpace::build(Vec2D::new(4, 4), &[]);
        let (found, k) = vss.binary_search(0);
        assert!(found);
        assert_eq!(k, 0);
        let (found, _) = vss.binary_search(u64::MAX);
        assert!(!found);
    }
}
