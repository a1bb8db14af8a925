use std::collections::HashMap;

use smallvec::SmallVec;

#[cfg(feature = "parallel")]
use rayon::iter::{IntoParallelIterator, IntoParallelRefIterator, ParallelIterator};

use crate::error::{Error, Result};
use crate::mould::Mould;
use crate::property::Property;
use crate::stats;

/// Most distinct categories a training image may carry.
pub const MAX_CATEGORIES: usize = 10;

/// Sentinel category of the root node and its reverse-structure bucket.
const ROOT_VALUE: i32 = i32::MIN;

type NodeId = u32;

/// Neighbor values of one fully informed training pattern, plus its core.
struct Pattern {
    neighbors: SmallVec<[i32; 24]>,
    core: Option<i32>,
}

#[derive(Debug)]
struct Node {
    /// Category fixed at this node's depth; `ROOT_VALUE` at the root.
    value: i32,
    /// 0-based template depth; -1 at the root.
    depth: i16,
    parent: Option<NodeId>,
    /// Children keyed by category, kept sorted.
    children: SmallVec<[(i32, NodeId); 4]>,
    /// Central-value counts of the patterns traversing this node, aligned
    /// with the tree's sorted category list.
    core_freq: SmallVec<[u32; MAX_CATEGORIES]>,
}

/// Search tree over template positions, with the reverse retrieval
/// structure built alongside.
///
/// Nodes live in an arena and link by index; the reverse structure holds,
/// for each depth and category, the ids of the nodes at that depth carrying
/// that category. Both are immutable once built and safe to read from many
/// threads.
#[derive(Debug)]
pub struct STree {
    nodes: Vec<Node>,
    mould: Mould,
    categories: Vec<i32>,
    /// `rars[d]` maps category -> nodes at tree depth `d` (template depth
    /// `d - 1`); slot 0 holds the root under the sentinel key.
    rars: Vec<HashMap<i32, Vec<NodeId>>>,
    pattern_count: u64,
}

impl STree {
    /// Index the training image `ti` under the template `mould`.
    ///
    /// Only patterns whose neighbors are all informed are retained; the
    /// core value may be missing. Fails when the training image carries
    /// more than [`MAX_CATEGORIES`] distinct values.
    pub fn build(mould: &Mould, ti: &Property) -> Result<Self> {
        let categories = stats::categories(ti);
        if categories.len() > MAX_CATEGORIES {
            return Err(Error::TooManyCategories(categories.len()));
        }

        // Phase 1: pattern extraction, one record per fully informed cell.
        let patterns = extract_patterns(mould, ti)?;

        // Phase 2: per-pattern root-to-leaf walk, counting the core at
        // every visited node.
        let n_cat = categories.len();
        let mut nodes = vec![Node {
            value: ROOT_VALUE,
            depth: -1,
            parent: None,
            children: SmallVec::new(),
            core_freq: SmallVec::from_elem(0, n_cat),
        }];
        for pattern in &patterns {
            let core_slot = pattern
                .core
                .and_then(|c| categories.binary_search(&c).ok());
            if let Some(s) = core_slot {
                nodes[0].core_freq[s] += 1;
            }
            let mut cur: NodeId = 0;
            for (d, &v) in pattern.neighbors.iter().enumerate() {
                cur = child_or_insert(&mut nodes, cur, v, d as i16, n_cat);
                if let Some(s) = core_slot {
                    nodes[cur as usize].core_freq[s] += 1;
                }
            }
        }

        // Phase 3: group nodes per depth and category, breadth-first.
        let mut rars: Vec<HashMap<i32, Vec<NodeId>>> = Vec::with_capacity(mould.len() + 1);
        let mut root_slot = HashMap::new();
        root_slot.insert(ROOT_VALUE, vec![0]);
        rars.push(root_slot);
        let mut level: Vec<NodeId> = vec![0];
        for _ in 0..mould.len() {
            let next: Vec<NodeId> = level
                .iter()
                .flat_map(|&id| nodes[id as usize].children.iter().map(|&(_, c)| c))
                .collect();
            let mut buckets: HashMap<i32, Vec<NodeId>> = HashMap::new();
            for &id in &next {
                buckets.entry(nodes[id as usize].value).or_default().push(id);
            }
            rars.push(buckets);
            level = next;
        }

        Ok(Self {
            nodes,
            mould: mould.clone(),
            categories,
            rars,
            pattern_count: patterns.len() as u64,
        })
    }

    #[inline]
    pub fn categories(&self) -> &[i32] {
        &self.categories
    }

    #[inline]
    pub fn mould(&self) -> &Mould {
        &self.mould
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Root level plus one level per template neighbor.
    #[inline]
    pub fn depth(&self) -> usize {
        self.mould.len() + 1
    }

    /// Number of retained training patterns.
    #[inline]
    pub fn pattern_count(&self) -> u64 {
        self.pattern_count
    }

    /// Forward retrieval: extend a frontier from the root through the data
    /// event in near-to-far order, wildcarding missing entries, and return
    /// the per-category replicate counts of the deepest informed level
    /// whose total exceeds `cd_min`. `None` when no level qualifies.
    pub fn retrieve_forward(&self, event: &[Option<i32>], cd_min: u64) -> Option<Vec<u64>> {
        debug_assert_eq!(event.len(), self.mould.len());
        let mut frontier: Vec<NodeId> = vec![0];
        let mut informed: Vec<Vec<u64>> = Vec::new();
        for e in event {
            if frontier.is_empty() {
                break;
            }
            match e {
                None => {
                    frontier = frontier
                        .iter()
                        .flat_map(|&id| self.nodes[id as usize].children.iter().map(|&(_, c)| c))
                        .collect();
                }
                Some(v) => {
                    frontier = frontier
                        .iter()
                        .filter_map(|&id| self.child_of(id, *v))
                        .collect();
                    informed.push(self.aggregate(&frontier));
                }
            }
        }
        informed
            .into_iter()
            .rev()
            .find(|agg| agg.iter().sum::<u64>() > cd_min)
    }

    /// Reverse retrieval: walk the observed entries far-to-near; at each,
    /// take the nodes of that depth and category from the reverse structure,
    /// keep those whose root path matches every observed strictly-closer
    /// entry, and return the first per-category aggregate whose total
    /// exceeds `cd_min`. `None` when no depth qualifies.
    pub fn retrieve_reverse(&self, event: &[Option<i32>], cd_min: u64) -> Option<Vec<u64>> {
        debug_assert_eq!(event.len(), self.mould.len());
        let observed: SmallVec<[(usize, i32); 24]> = event
            .iter()
            .enumerate()
            .filter_map(|(d, e)| e.map(|v| (d, v)))
            .collect();

        for oi in (0..observed.len()).rev() {
            let (d, v) = observed[oi];
            let Some(bucket) = self.rars[d + 1].get(&v) else {
                continue;
            };
            let closer = &observed[..oi];
            let agg = if closer.is_empty() {
                self.aggregate(bucket)
            } else {
                let cand = self.filter_candidates(bucket, d, closer);
                if cand.is_empty() {
                    continue;
                }
                self.aggregate(&cand)
            };
            if agg.iter().sum::<u64>() > cd_min {
                return Some(agg);
            }
        }
        None
    }

    /// Keep the candidates whose root-path labels match every observed
    /// closer entry.
    fn filter_candidates(&self, bucket: &[NodeId], d: usize, closer: &[(usize, i32)]) -> Vec<NodeId> {
        #[cfg(feature = "parallel")]
        {
            bucket
                .par_iter()
                .copied()
                .filter(|&id| self.path_matches(id, d, closer))
                .collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            bucket
                .iter()
                .copied()
                .filter(|&id| self.path_matches(id, d, closer))
                .collect()
        }
    }

    /// Whether the root path of `id` (a node at template depth `d`) carries
    /// `vj` at template depth `j` for every `(j, vj)` in `closer`.
    fn path_matches(&self, id: NodeId, d: usize, closer: &[(usize, i32)]) -> bool {
        // labels[i] holds the category at template depth d - i.
        let mut labels: SmallVec<[i32; 24]> = SmallVec::new();
        let mut cur = Some(id);
        while let Some(i) = cur {
            let node = &self.nodes[i as usize];
            if node.depth < 0 {
                break;
            }
            labels.push(node.value);
            cur = node.parent;
        }
        closer.iter().all(|&(j, vj)| labels[d - j] == vj)
    }

    #[inline]
    fn child_of(&self, id: NodeId, value: i32) -> Option<NodeId> {
        let children = &self.nodes[id as usize].children;
        children
            .binary_search_by_key(&value, |&(k, _)| k)
            .ok()
            .map(|pos| children[pos].1)
    }

    /// Per-category replicate counts summed over the given nodes.
    fn aggregate(&self, ids: &[NodeId]) -> Vec<u64> {
        let mut agg = vec![0u64; self.categories.len()];
        for &id in ids {
            for (slot, &n) in self.nodes[id as usize].core_freq.iter().enumerate() {
                agg[slot] += u64::from(n);
            }
        }
        agg
    }
}

fn child_or_insert(nodes: &mut Vec<Node>, parent: NodeId, value: i32, depth: i16, n_cat: usize) -> NodeId {
    match nodes[parent as usize]
        .children
        .binary_search_by_key(&value, |&(k, _)| k)
    {
        Ok(pos) => nodes[parent as usize].children[pos].1,
        Err(pos) => {
            let id = nodes.len() as NodeId;
            nodes.push(Node {
                value,
                depth,
                parent: Some(parent),
                children: SmallVec::new(),
                core_freq: SmallVec::from_elem(0, n_cat),
            });
            nodes[parent as usize].children.insert(pos, (value, id));
            id
        }
    }
}

/// Phase 1: gather every cell of the training image, keeping the patterns
/// whose neighbors are all informed. Each worker owns its gather buffer.
fn extract_patterns(mould: &Mould, ti: &Property) -> Result<Vec<Pattern>> {
    let n = ti.len();

    #[cfg(feature = "parallel")]
    let records: Vec<Option<Pattern>> = (0..n)
        .into_par_iter()
        .map(|idx| {
            let mut buf = Vec::with_capacity(mould.len());
            extract_at(mould, ti, idx, &mut buf)
        })
        .collect::<Result<_>>()?;

    #[cfg(not(feature = "parallel"))]
    let records: Vec<Option<Pattern>> = {
        let mut out = Vec::with_capacity(n);
        let mut buf = Vec::with_capacity(mould.len());
        for idx in 0..n {
            out.push(extract_at(mould, ti, idx, &mut buf)?);
        }
        out
    };

    Ok(records.into_iter().flatten().collect())
}

fn extract_at(
    mould: &Mould,
    ti: &Property,
    idx: usize,
    buf: &mut Vec<Option<f32>>,
) -> Result<Option<Pattern>> {
    let si = ti.grid().spatial_index(idx);
    let gathered = mould.gather(si, ti, buf)?;
    if !gathered.all_valid {
        return Ok(None);
    }
    let mut neighbors: SmallVec<[i32; 24]> = SmallVec::with_capacity(buf.len());
    for v in buf.iter() {
        match v {
            Some(x) => neighbors.push(stats::as_category(*x)),
            None => return Ok(None),
        }
    }
    Ok(Some(Pattern {
        neighbors,
        core: gathered.core.map(stats::as_category),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{Dim, GridStructure, SpatialIndex};

    fn row_property(values: &[f32]) -> Property {
        let g = GridStructure::new_2d(values.len() as u32, 1, 1.0, 1.0, 0.0, 0.0).unwrap();
        let mut p = Property::new(g);
        for (i, &v) in values.iter().enumerate() {
            p.set_at(i, v).unwrap();
        }
        p
    }

    fn left_neighbor_mould() -> Mould {
        let core = SpatialIndex::new_2d(1, 0);
        Mould::by_locations(core, &[SpatialIndex::new_2d(0, 0)]).unwrap()
    }

    fn checkerboard(n: u32) -> Property {
        let g = GridStructure::new_2d(n, n, 1.0, 1.0, 0.0, 0.0).unwrap();
        let mut p = Property::new(g.clone());
        for si in g.cells().collect::<Vec<_>>() {
            p.set(si, ((si.ix + si.iy) % 2) as f32).unwrap();
        }
        p
    }

    fn cross4() -> Mould {
        Mould::by_anisotropic_topk(4, 1.0, 1.0, 1.0, 1, Dim::Two).unwrap()
    }

    #[test]
    fn refuses_more_than_ten_categories() {
        let values: Vec<f32> = (0..11).map(|v| v as f32).collect();
        let ti = row_property(&values);
        let err = STree::build(&left_neighbor_mould(), &ti).unwrap_err();
        assert!(matches!(err, Error::TooManyCategories(11)));
    }

    #[test]
    fn k1_tree_is_the_nearest_neighbor_histogram() {
        let ti = row_property(&[0.0, 0.0, 1.0, 1.0, 0.0]);
        let tree = STree::build(&left_neighbor_mould(), &ti).unwrap();
        assert_eq!(tree.depth(), 2);
        assert_eq!(tree.pattern_count(), 4);
        assert_eq!(tree.categories(), &[0, 1]);

        // Patterns: [0]->0, [0]->1, [1]->1, [1]->0.
        let a = tree.retrieve_forward(&[Some(0)], 0).unwrap();
        assert_eq!(a, vec![1, 1]);
        let b = tree.retrieve_reverse(&[Some(0)], 0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn core_freq_totals_count_traversing_patterns() {
        let ti = row_property(&[0.0, 0.0, 1.0, 1.0, 0.0]);
        let tree = STree::build(&left_neighbor_mould(), &ti).unwrap();
        // Root counts every pattern; each depth-1 node counts its branch.
        assert_eq!(tree.nodes[0].core_freq.iter().sum::<u32>(), 4);
        for &(v, id) in &tree.nodes[0].children {
            let total: u32 = tree.nodes[id as usize].core_freq.iter().sum();
            let expected = match v {
                0 | 1 => 2,
                _ => unreachable!(),
            };
            assert_eq!(total, expected);
        }
    }

    #[test]
    fn rars_buckets_partition_each_depth() {
        let ti = checkerboard(6);
        let tree = STree::build(&cross4(), &ti).unwrap();
        for depth in 0..=tree.mould().len() {
            let bucketed: usize = tree.rars[depth].values().map(Vec::len).sum();
            let at_depth = tree
                .nodes
                .iter()
                .filter(|n| n.depth == depth as i16 - 1)
                .count();
            assert_eq!(bucketed, at_depth);
            for (cat, ids) in &tree.rars[depth] {
                for &id in ids {
                    assert_eq!(tree.nodes[id as usize].value, *cat);
                    assert_eq!(tree.nodes[id as usize].depth, depth as i16 - 1);
                }
            }
        }
    }

    #[test]
    fn node_ids_are_monotonic_in_construction_order() {
        let ti = checkerboard(6);
        let tree = STree::build(&cross4(), &ti).unwrap();
        for (id, node) in tree.nodes.iter().enumerate() {
            if let Some(p) = node.parent {
                assert!((p as usize) < id);
            }
        }
    }

    #[test]
    fn interior_checkerboard_pattern_is_a_singleton() {
        let ti = checkerboard(8);
        let tree = STree::build(&cross4(), &ti).unwrap();
        // Around a 0-cell every neighbor is 1.
        let event = [Some(1), Some(1), Some(1), Some(1)];
        let agg = tree.retrieve_forward(&event, 1).unwrap();
        assert_eq!(agg[1], 0);
        assert!(agg[0] > 1);
    }

    #[test]
    fn forward_and_reverse_agree_under_full_evidence() {
        let ti = checkerboard(8);
        let tree = STree::build(&cross4(), &ti).unwrap();
        for event in [
            [Some(1), Some(1), Some(1), Some(1)],
            [Some(0), Some(0), Some(0), Some(0)],
        ] {
            let fwd = tree.retrieve_forward(&event, 1);
            let rev = tree.retrieve_reverse(&event, 1);
            assert!(fwd.is_some());
            assert_eq!(fwd, rev);
        }
    }

    #[test]
    fn all_missing_event_retrieves_nothing() {
        let ti = checkerboard(8);
        let tree = STree::build(&cross4(), &ti).unwrap();
        let event = [None, None, None, None];
        assert_eq!(tree.retrieve_forward(&event, 1), None);
        assert_eq!(tree.retrieve_reverse(&event, 1), None);
    }

    #[test]
    fn partial_event_wildcards_missing_entries() {
        let ti = checkerboard(8);
        let tree = STree::build(&cross4(), &ti).unwrap();
        // Any single informed neighbor pins the center on a checkerboard.
        let event = [None, None, Some(1), None];
        let fwd = tree.retrieve_forward(&event, 1).unwrap();
        assert!(fwd[0] > 0);
        assert_eq!(fwd[1], 0);
        let rev = tree.retrieve_reverse(&event, 1).unwrap();
        assert!(rev[0] > 0);
        assert_eq!(rev[1], 0);
    }

    #[test]
    fn unknown_category_in_event_falls_through() {
        let ti = checkerboard(8);
        let tree = STree::build(&cross4(), &ti).unwrap();
        let event = [Some(7), Some(7), Some(7), Some(7)];
        assert_eq!(tree.retrieve_forward(&event, 1), None);
        assert_eq!(tree.retrieve_reverse(&event, 1), None);
    }

    #[test]
    fn under_supported_deep_match_falls_back_to_a_shallower_level() {
        // Patterns with left=1: [1,0] once (core 0) and [1,1] once (core 0).
        let ti = row_property(&[1.0, 0.0, 0.0, 1.0, 0.0, 1.0, 1.0]);
        let core = SpatialIndex::new_2d(2, 0);
        let mould = Mould::by_locations(
            core,
            &[SpatialIndex::new_2d(1, 0), SpatialIndex::new_2d(3, 0)],
        )
        .unwrap();
        let tree = STree::build(&mould, &ti).unwrap();
        // The exact event [1, 0] occurs once; cd_min=0 accepts that level,
        // cd_min=1 rejects it and falls back to the left=1 aggregate.
        let deep = tree.retrieve_forward(&[Some(1), Some(0)], 0).unwrap();
        assert_eq!(deep.iter().sum::<u64>(), 1);
        let fallback = tree.retrieve_forward(&[Some(1), Some(0)], 1).unwrap();
        assert_eq!(fallback, vec![2, 0]);
    }

    #[test]
    fn missing_core_patterns_shape_the_tree_but_not_the_counts() {
        let g = GridStructure::new_2d(3, 1, 1.0, 1.0, 0.0, 0.0).unwrap();
        let mut ti = Property::new(g);
        ti.set_at(0, 1.0).unwrap();
        // Cell 1 stays missing; its left neighbor is informed.
        ti.set_at(2, 0.0).unwrap();
        let tree = STree::build(&left_neighbor_mould(), &ti).unwrap();
        // Cell 1 contributes a pattern with a missing core; cell 2 has a
        // missing left neighbor and is dropped.
        assert_eq!(tree.pattern_count(), 1);
        assert_eq!(tree.nodes[0].core_freq.iter().sum::<u32>(), 0);
        assert_eq!(tree.node_count(), 2);
    }
}
