use std::collections::{HashMap, HashSet};

use glam::Vec2;

use crate::core::math::Aabb;
use crate::core::shape::ShapeId;

/// Broadphase contract the step pipeline consumes.
///
/// Implementations are interchangeable. The dynamic index is handed its
/// static peer at query time and must emit dynamic-vs-static candidate pairs
/// alongside its own; static-vs-static pairs are never produced because the
/// static index's `reindex_query` is never driven.
pub trait SpatialIndex {
    fn insert(&mut self, shape: ShapeId, hashid: u32, bb: Aabb);
    fn remove(&mut self, shape: ShapeId, hashid: u32);
    /// Re-stores the bounding box of an already-indexed shape.
    fn update(&mut self, shape: ShapeId, hashid: u32, bb: Aabb);
    fn contains(&self, shape: ShapeId, hashid: u32) -> bool;
    fn count(&self) -> usize;
    fn each(&self, f: &mut dyn FnMut(ShapeId));
    fn bb(&self, shape: ShapeId) -> Option<Aabb>;

    /// Emits every potentially colliding unordered pair exactly once per
    /// call, in a deterministic order. The callback's return value is
    /// retained as the pair's next collision id and handed back the next
    /// frame, threading incremental narrowphase hints.
    fn reindex_query(
        &mut self,
        static_peer: Option<&dyn SpatialIndex>,
        pair: &mut dyn FnMut(ShapeId, ShapeId, u32) -> u32,
    );

    /// Visits every indexed shape whose bounding box touches `bb`.
    fn query(&self, bb: Aabb, f: &mut dyn FnMut(ShapeId));

    /// Visits every indexed shape whose bounding box touches the segment
    /// from `a` to `b`.
    fn segment_query(&self, a: Vec2, b: Vec2, f: &mut dyn FnMut(ShapeId));
}

#[derive(Debug, Clone, Copy)]
struct IndexEntry {
    shape: ShapeId,
    bb: Aabb,
}

fn pair_key(a: ShapeId, b: ShapeId) -> (ShapeId, ShapeId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Uniform-grid spatial hash.
///
/// Shapes are binned into every cell their bounding box covers; pair
/// generation walks each shape's cells. Slot order is deterministic for a
/// given operation sequence, which keeps the emitted pair stream frame-stable.
pub struct SpatialHashGrid {
    cell_size: f32,
    slots: Vec<Option<IndexEntry>>,
    free_slots: Vec<usize>,
    index_of: HashMap<ShapeId, usize>,
    cells: HashMap<(i32, i32), Vec<usize>>,
    pair_ids: HashMap<(ShapeId, ShapeId), u32>,
}

impl SpatialHashGrid {
    pub fn new(cell_size: f32, capacity: usize) -> Self {
        assert!(cell_size > 0.0, "grid cell size must be positive");
        Self {
            cell_size,
            slots: Vec::with_capacity(capacity),
            free_slots: Vec::new(),
            index_of: HashMap::with_capacity(capacity),
            cells: HashMap::with_capacity(capacity),
            pair_ids: HashMap::new(),
        }
    }

    fn cell_range(&self, bb: Aabb) -> ((i32, i32), (i32, i32)) {
        let to_cell = |v: f32| (v / self.cell_size).floor() as i32;
        (
            (to_cell(bb.min.x), to_cell(bb.min.y)),
            (to_cell(bb.max.x), to_cell(bb.max.y)),
        )
    }

    fn add_to_cells(&mut self, slot: usize, bb: Aabb) {
        let (min, max) = self.cell_range(bb);
        for x in min.0..=max.0 {
            for y in min.1..=max.1 {
                self.cells.entry((x, y)).or_default().push(slot);
            }
        }
    }

    fn remove_from_cells(&mut self, slot: usize, bb: Aabb) {
        let (min, max) = self.cell_range(bb);
        for x in min.0..=max.0 {
            for y in min.1..=max.1 {
                if let Some(bin) = self.cells.get_mut(&(x, y)) {
                    bin.retain(|&idx| idx != slot);
                }
            }
        }
    }
}

impl SpatialIndex for SpatialHashGrid {
    fn insert(&mut self, shape: ShapeId, _hashid: u32, bb: Aabb) {
        assert!(
            !self.index_of.contains_key(&shape),
            "shape is already present in this index"
        );
        let entry = IndexEntry { shape, bb };
        let slot = match self.free_slots.pop() {
            Some(slot) => {
                self.slots[slot] = Some(entry);
                slot
            }
            None => {
                self.slots.push(Some(entry));
                self.slots.len() - 1
            }
        };
        self.index_of.insert(shape, slot);
        self.add_to_cells(slot, bb);
    }

    fn remove(&mut self, shape: ShapeId, _hashid: u32) {
        let slot = match self.index_of.remove(&shape) {
            Some(slot) => slot,
            None => return,
        };
        if let Some(entry) = self.slots[slot].take() {
            self.remove_from_cells(slot, entry.bb);
        }
        self.free_slots.push(slot);
    }

    fn update(&mut self, shape: ShapeId, _hashid: u32, bb: Aabb) {
        let slot = match self.index_of.get(&shape) {
            Some(&slot) => slot,
            None => return,
        };
        let old_bb = match self.slots[slot] {
            Some(entry) => entry.bb,
            None => return,
        };
        self.remove_from_cells(slot, old_bb);
        if let Some(entry) = self.slots[slot].as_mut() {
            entry.bb = bb;
        }
        self.add_to_cells(slot, bb);
    }

    fn contains(&self, shape: ShapeId, _hashid: u32) -> bool {
        self.index_of.contains_key(&shape)
    }

    fn count(&self) -> usize {
        self.index_of.len()
    }

    fn each(&self, f: &mut dyn FnMut(ShapeId)) {
        for entry in self.slots.iter().flatten() {
            f(entry.shape);
        }
    }

    fn bb(&self, shape: ShapeId) -> Option<Aabb> {
        let slot = *self.index_of.get(&shape)?;
        self.slots[slot].map(|entry| entry.bb)
    }

    fn reindex_query(
        &mut self,
        static_peer: Option<&dyn SpatialIndex>,
        pair: &mut dyn FnMut(ShapeId, ShapeId, u32) -> u32,
    ) {
        let mut seen: HashSet<(ShapeId, ShapeId)> = HashSet::new();

        for slot in 0..self.slots.len() {
            let entry = match self.slots[slot] {
                Some(entry) => entry,
                None => continue,
            };

            // Same-index candidates from the cells this shape covers.
            let (min, max) = self.cell_range(entry.bb);
            for x in min.0..=max.0 {
                for y in min.1..=max.1 {
                    let bin = match self.cells.get(&(x, y)) {
                        Some(bin) => bin.clone(),
                        None => continue,
                    };
                    for other_slot in bin {
                        if other_slot <= slot {
                            continue;
                        }
                        let other = match self.slots[other_slot] {
                            Some(other) => other,
                            None => continue,
                        };
                        if !entry.bb.intersects(&other.bb) {
                            continue;
                        }
                        let key = pair_key(entry.shape, other.shape);
                        if !seen.insert(key) {
                            continue;
                        }
                        let id = self.pair_ids.get(&key).copied().unwrap_or(0);
                        let next = pair(entry.shape, other.shape, id);
                        self.pair_ids.insert(key, next);
                    }
                }
            }

            // Cross-index candidates against the static peer.
            if let Some(peer) = static_peer {
                let mut hits = Vec::new();
                peer.query(entry.bb, &mut |other| hits.push(other));
                for other in hits {
                    let key = pair_key(entry.shape, other);
                    if !seen.insert(key) {
                        continue;
                    }
                    let id = self.pair_ids.get(&key).copied().unwrap_or(0);
                    let next = pair(entry.shape, other, id);
                    self.pair_ids.insert(key, next);
                }
            }
        }
    }

    fn query(&self, bb: Aabb, f: &mut dyn FnMut(ShapeId)) {
        let mut visited: HashSet<usize> = HashSet::new();
        let (min, max) = self.cell_range(bb);
        for x in min.0..=max.0 {
            for y in min.1..=max.1 {
                let bin = match self.cells.get(&(x, y)) {
                    Some(bin) => bin,
                    None => continue,
                };
                for &slot in bin {
                    if !visited.insert(slot) {
                        continue;
                    }
                    if let Some(entry) = self.slots[slot] {
                        if entry.bb.intersects(&bb) {
                            f(entry.shape);
                        }
                    }
                }
            }
        }
    }

    fn segment_query(&self, a: Vec2, b: Vec2, f: &mut dyn FnMut(ShapeId)) {
        let segment_bb = Aabb::new(a.min(b), a.max(b));
        let mut visited: HashSet<usize> = HashSet::new();
        let (min, max) = self.cell_range(segment_bb);
        for x in min.0..=max.0 {
            for y in min.1..=max.1 {
                let bin = match self.cells.get(&(x, y)) {
                    Some(bin) => bin,
                    None => continue,
                };
                for &slot in bin {
                    if !visited.insert(slot) {
                        continue;
                    }
                    if let Some(entry) = self.slots[slot] {
                        if entry.bb.intersects_segment(a, b) {
                            f(entry.shape);
                        }
                    }
                }
            }
        }
    }
}

/// Exhaustive list index: O(n²) pair emission, O(n) queries.
///
/// The reference implementation used to cross-check the grid; also a sane
/// choice for tiny spaces.
pub struct ShapeList {
    entries: Vec<IndexEntry>,
    pair_ids: HashMap<(ShapeId, ShapeId), u32>,
}

impl ShapeList {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
            pair_ids: HashMap::new(),
        }
    }

    fn position_of(&self, shape: ShapeId) -> Option<usize> {
        self.entries.iter().position(|entry| entry.shape == shape)
    }
}

impl Default for ShapeList {
    fn default() -> Self {
        Self::new()
    }
}

impl SpatialIndex for ShapeList {
    fn insert(&mut self, shape: ShapeId, _hashid: u32, bb: Aabb) {
        assert!(
            self.position_of(shape).is_none(),
            "shape is already present in this index"
        );
        self.entries.push(IndexEntry { shape, bb });
    }

    fn remove(&mut self, shape: ShapeId, _hashid: u32) {
        self.entries.retain(|entry| entry.shape != shape);
    }

    fn update(&mut self, shape: ShapeId, _hashid: u32, bb: Aabb) {
        if let Some(position) = self.position_of(shape) {
            self.entries[position].bb = bb;
        }
    }

    fn contains(&self, shape: ShapeId, _hashid: u32) -> bool {
        self.position_of(shape).is_some()
    }

    fn count(&self) -> usize {
        self.entries.len()
    }

    fn each(&self, f: &mut dyn FnMut(ShapeId)) {
        for entry in &self.entries {
            f(entry.shape);
        }
    }

    fn bb(&self, shape: ShapeId) -> Option<Aabb> {
        self.position_of(shape).map(|i| self.entries[i].bb)
    }

    fn reindex_query(
        &mut self,
        static_peer: Option<&dyn SpatialIndex>,
        pair: &mut dyn FnMut(ShapeId, ShapeId, u32) -> u32,
    ) {
        for i in 0..self.entries.len() {
            let entry = self.entries[i];
            for j in i + 1..self.entries.len() {
                let other = self.entries[j];
                if !entry.bb.intersects(&other.bb) {
                    continue;
                }
                let key = pair_key(entry.shape, other.shape);
                let id = self.pair_ids.get(&key).copied().unwrap_or(0);
                let next = pair(entry.shape, other.shape, id);
                self.pair_ids.insert(key, next);
            }

            if let Some(peer) = static_peer {
                let mut hits = Vec::new();
                peer.query(entry.bb, &mut |other| hits.push(other));
                for other in hits {
                    let key = pair_key(entry.shape, other);
                    let id = self.pair_ids.get(&key).copied().unwrap_or(0);
                    let next = pair(entry.shape, other, id);
                    self.pair_ids.insert(key, next);
                }
            }
        }
    }

    fn query(&self, bb: Aabb, f: &mut dyn FnMut(ShapeId)) {
        for entry in &self.entries {
            if entry.bb.intersects(&bb) {
                f(entry.shape);
            }
        }
    }

    fn segment_query(&self, a: Vec2, b: Vec2, f: &mut dyn FnMut(ShapeId)) {
        for entry in &self.entries {
            if entry.bb.intersects_segment(a, b) {
                f(entry.shape);
            }
        }
    }
}

/// Placeholder index swapped in while the real one is borrowed by the
/// broadphase.
pub(crate) struct NullIndex;

impl SpatialIndex for NullIndex {
    fn insert(&mut self, _shape: ShapeId, _hashid: u32, _bb: Aabb) {}
    fn remove(&mut self, _shape: ShapeId, _hashid: u32) {}
    fn update(&mut self, _shape: ShapeId, _hashid: u32, _bb: Aabb) {}
    fn contains(&self, _shape: ShapeId, _hashid: u32) -> bool {
        false
    }
    fn count(&self) -> usize {
        0
    }
    fn each(&self, _f: &mut dyn FnMut(ShapeId)) {}
    fn bb(&self, _shape: ShapeId) -> Option<Aabb> {
        None
    }
    fn reindex_query(
        &mut self,
        _static_peer: Option<&dyn SpatialIndex>,
        _pair: &mut dyn FnMut(ShapeId, ShapeId, u32) -> u32,
    ) {
    }
    fn query(&self, _bb: Aabb, _f: &mut dyn FnMut(ShapeId)) {}
    fn segment_query(&self, _a: Vec2, _b: Vec2, _f: &mut dyn FnMut(ShapeId)) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::allocator::Handle;

    fn shape(n: u32) -> ShapeId {
        Handle::new(n, 0)
    }

    fn square(x: f32, y: f32, half: f32) -> Aabb {
        Aabb::new(Vec2::new(x - half, y - half), Vec2::new(x + half, y + half))
    }

    fn collect_pairs(index: &mut dyn SpatialIndex) -> HashSet<(ShapeId, ShapeId)> {
        let mut pairs = HashSet::new();
        index.reindex_query(None, &mut |a, b, id| {
            pairs.insert(pair_key(a, b));
            id
        });
        pairs
    }

    #[test]
    fn grid_and_list_agree_on_pair_sets() {
        let mut grid = SpatialHashGrid::new(2.0, 16);
        let mut list = ShapeList::new();

        let boxes = [
            square(0.0, 0.0, 1.0),
            square(1.5, 0.0, 1.0),
            square(10.0, 10.0, 1.0),
            square(10.5, 10.5, 1.0),
            square(-3.0, 0.5, 1.0),
            square(0.5, 0.5, 0.25),
        ];
        for (i, bb) in boxes.iter().enumerate() {
            grid.insert(shape(i as u32), i as u32, *bb);
            list.insert(shape(i as u32), i as u32, *bb);
        }

        let grid_pairs = collect_pairs(&mut grid);
        let list_pairs = collect_pairs(&mut list);
        assert_eq!(grid_pairs, list_pairs);
        assert!(grid_pairs.contains(&pair_key(shape(0), shape(1))));
        assert!(!grid_pairs.contains(&pair_key(shape(0), shape(2))));
    }

    #[test]
    fn collision_ids_are_threaded_between_frames() {
        let mut grid = SpatialHashGrid::new(2.0, 4);
        grid.insert(shape(0), 0, square(0.0, 0.0, 1.0));
        grid.insert(shape(1), 1, square(0.5, 0.0, 1.0));

        let mut first = Vec::new();
        grid.reindex_query(None, &mut |_, _, id| {
            first.push(id);
            id + 10
        });
        assert_eq!(first, vec![0]);

        let mut second = Vec::new();
        grid.reindex_query(None, &mut |_, _, id| {
            second.push(id);
            id
        });
        assert_eq!(second, vec![10]);
    }

    #[test]
    fn cross_index_pairs_come_from_the_peer() {
        let mut dynamic = SpatialHashGrid::new(2.0, 4);
        let mut statics = SpatialHashGrid::new(2.0, 4);
        dynamic.insert(shape(0), 0, square(0.0, 0.0, 1.0));
        statics.insert(shape(9), 9, square(0.5, 0.0, 1.0));
        statics.insert(shape(8), 8, square(40.0, 0.0, 1.0));

        let mut pairs = Vec::new();
        dynamic.reindex_query(Some(&statics), &mut |a, b, id| {
            pairs.push((a, b));
            id
        });
        assert_eq!(pairs, vec![(shape(0), shape(9))]);
    }

    #[test]
    fn update_moves_a_shape_between_cells() {
        let mut grid = SpatialHashGrid::new(1.0, 4);
        grid.insert(shape(0), 0, square(0.0, 0.0, 0.4));

        let mut hits = 0;
        grid.query(square(5.0, 5.0, 0.4), &mut |_| hits += 1);
        assert_eq!(hits, 0);

        grid.update(shape(0), 0, square(5.0, 5.0, 0.4));
        grid.query(square(5.0, 5.0, 0.4), &mut |_| hits += 1);
        assert_eq!(hits, 1);

        grid.remove(shape(0), 0);
        assert_eq!(grid.count(), 0);
    }

    #[test]
    fn segment_query_walks_covered_cells() {
        let mut grid = SpatialHashGrid::new(1.0, 4);
        grid.insert(shape(0), 0, square(3.0, 0.0, 0.4));
        grid.insert(shape(1), 1, square(3.0, 5.0, 0.4));

        let mut hits = Vec::new();
        grid.segment_query(Vec2::new(0.0, 0.0), Vec2::new(6.0, 0.0), &mut |s| hits.push(s));
        assert_eq!(hits, vec![shape(0)]);
    }
}
