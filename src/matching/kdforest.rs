//! Randomized kd-forest for approximate nearest-neighbor search.
//!
//! Each tree splits on a dimension drawn at random from the five with the
//! highest variance (estimated on a sample of up to 100 points) at the
//! sample mean. Queries descend every tree once, then continue best-bin-first
//! over a single priority queue shared by all trees until the distance
//! evaluation budget (`checks`) is spent. Tree construction is seeded, so a
//! forest built twice from the same data is identical.

use crate::util::{AlignError, AlignResult};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::cmp::Ordering;
use std::collections::BinaryHeap;

const VARIANCE_SAMPLE: usize = 100;
const RANDOM_DIMS: usize = 5;

/// One neighbor returned by a query.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    /// Row index into the indexed data.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: f32,
}

enum Node {
    Leaf {
        start: usize,
        end: usize,
    },
    Split {
        dim: usize,
        value: f32,
        left: usize,
        right: usize,
    },
}

struct KdTree {
    nodes: Vec<Node>,
    order: Vec<usize>,
    root: usize,
}

/// Forest of randomized kd-trees over borrowed row-major vectors.
pub struct KdForest<'a> {
    data: &'a [f32],
    dim: usize,
    len: usize,
    trees: Vec<KdTree>,
}

#[derive(Clone, Copy)]
struct Branch {
    bound: f32,
    tree: usize,
    node: usize,
}

impl PartialEq for Branch {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Branch {}

impl PartialOrd for Branch {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Branch {
    // Reversed so `BinaryHeap` pops the smallest bound first.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .bound
            .total_cmp(&self.bound)
            .then_with(|| other.tree.cmp(&self.tree))
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl<'a> KdForest<'a> {
    /// Builds `trees` randomized trees over `data` (rows of length `dim`).
    pub fn build(
        data: &'a [f32],
        dim: usize,
        trees: usize,
        leaf_size: usize,
        seed: u64,
    ) -> AlignResult<Self> {
        if dim == 0 {
            return Err(AlignError::InvalidInput("kd-forest dimension must be > 0"));
        }
        if data.len() % dim != 0 {
            return Err(AlignError::InvalidInput(
                "kd-forest data length is not a multiple of the dimension",
            ));
        }
        if trees == 0 {
            return Err(AlignError::InvalidConfig("trees must be at least 1".into()));
        }
        let len = data.len() / dim;
        let leaf_size = leaf_size.max(1);
        let mut rng = StdRng::seed_from_u64(seed);

        let mut forest = Vec::with_capacity(trees);
        for _ in 0..trees {
            let mut order: Vec<usize> = (0..len).collect();
            order.shuffle(&mut rng);
            let mut tree = KdTree {
                nodes: Vec::new(),
                order,
                root: 0,
            };
            if len > 0 {
                let mut builder = TreeBuilder {
                    data,
                    dim,
                    leaf_size,
                    rng: &mut rng,
                };
                tree.root = builder.build(&mut tree.nodes, &mut tree.order, 0, len);
            }
            forest.push(tree);
        }

        Ok(Self {
            data,
            dim,
            len,
            trees: forest,
        })
    }

    /// Returns the number of indexed rows.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true when nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn row(&self, index: usize) -> &[f32] {
        &self.data[index * self.dim..(index + 1) * self.dim]
    }

    /// Returns up to `k` approximate nearest neighbors, closest first.
    ///
    /// At most `checks` distance evaluations are spent after the first
    /// descent of every tree; fewer than `k` neighbors are returned only when
    /// the index holds fewer than `k` rows.
    pub fn knn(&self, query: &[f32], k: usize, checks: usize) -> Vec<Neighbor> {
        if k == 0 || self.len == 0 || query.len() != self.dim {
            return Vec::new();
        }

        let mut search = Search {
            forest: self,
            query,
            k,
            best: Vec::with_capacity(k + 1),
            visited: vec![false; self.len],
            heap: BinaryHeap::new(),
            evaluated: 0,
        };

        for (tree_idx, tree) in self.trees.iter().enumerate() {
            search.descend(tree_idx, tree.root, 0.0);
        }
        while let Some(branch) = search.heap.pop() {
            if search.evaluated >= checks && search.best.len() >= k {
                break;
            }
            if search.best.len() >= k && branch.bound >= search.worst() {
                continue;
            }
            search.descend(branch.tree, branch.node, branch.bound);
        }

        search
            .best
            .into_iter()
            .map(|(dist_sq, index)| Neighbor {
                index,
                distance: dist_sq.sqrt(),
            })
            .collect()
    }
}

struct TreeBuilder<'b, 'r> {
    data: &'b [f32],
    dim: usize,
    leaf_size: usize,
    rng: &'r mut StdRng,
}

impl TreeBuilder<'_, '_> {
    fn value(&self, index: usize, dim: usize) -> f32 {
        self.data[index * self.dim + dim]
    }

    fn build(
        &mut self,
        nodes: &mut Vec<Node>,
        order: &mut [usize],
        start: usize,
        end: usize,
    ) -> usize {
        let count = end - start;
        if count <= self.leaf_size {
            nodes.push(Node::Leaf { start, end });
            return nodes.len() - 1;
        }

        let slice = &mut order[start..end];
        let sample = &slice[..count.min(VARIANCE_SAMPLE)];
        let mut mean = vec![0.0f64; self.dim];
        for &idx in sample {
            for (d, m) in mean.iter_mut().enumerate() {
                *m += self.value(idx, d) as f64;
            }
        }
        let inv = 1.0 / sample.len() as f64;
        mean.iter_mut().for_each(|m| *m *= inv);
        let mut var = vec![0.0f64; self.dim];
        for &idx in sample {
            for (d, v) in var.iter_mut().enumerate() {
                let diff = self.value(idx, d) as f64 - mean[d];
                *v += diff * diff;
            }
        }

        let mut dims: Vec<usize> = (0..self.dim).collect();
        dims.sort_by(|&a, &b| var[b].total_cmp(&var[a]).then_with(|| a.cmp(&b)));
        let candidates = RANDOM_DIMS.min(self.dim);
        let split_dim = dims[self.rng.random_range(0..candidates)];
        if var[split_dim] <= 0.0 && var[dims[0]] <= 0.0 {
            nodes.push(Node::Leaf { start, end });
            return nodes.len() - 1;
        }
        let split_dim = if var[split_dim] > 0.0 { split_dim } else { dims[0] };
        let mut split_value = mean[split_dim] as f32;

        let mut mid = partition(slice, |idx| self.value(idx, split_dim) < split_value);
        if mid == 0 || mid == count {
            // Mean split was one-sided; fall back to the median.
            slice.sort_by(|&a, &b| {
                self.value(a, split_dim)
                    .total_cmp(&self.value(b, split_dim))
                    .then_with(|| a.cmp(&b))
            });
            mid = count / 2;
            split_value = self.value(slice[mid], split_dim);
            mid = slice.partition_point(|&idx| self.value(idx, split_dim) < split_value);
            if mid == 0 {
                nodes.push(Node::Leaf { start, end });
                return nodes.len() - 1;
            }
        }

        let left = self.build(nodes, order, start, start + mid);
        let right = self.build(nodes, order, start + mid, end);
        nodes.push(Node::Split {
            dim: split_dim,
            value: split_value,
            left,
            right,
        });
        nodes.len() - 1
    }
}

/// Stable-enough in-place partition; returns the count of `pred`-true items.
fn partition<F: Fn(usize) -> bool>(slice: &mut [usize], pred: F) -> usize {
    let mut next = 0;
    for i in 0..slice.len() {
        if pred(slice[i]) {
            slice.swap(next, i);
            next += 1;
        }
    }
    next
}

struct Search<'f, 'a, 'q> {
    forest: &'f KdForest<'a>,
    query: &'q [f32],
    k: usize,
    best: Vec<(f32, usize)>,
    visited: Vec<bool>,
    heap: BinaryHeap<Branch>,
    evaluated: usize,
}

impl Search<'_, '_, '_> {
    fn worst(&self) -> f32 {
        self.best.last().map(|b| b.0).unwrap_or(f32::INFINITY)
    }

    fn descend(&mut self, tree_idx: usize, mut node: usize, bound: f32) {
        let tree = &self.forest.trees[tree_idx];
        loop {
            match tree.nodes[node] {
                Node::Leaf { start, end } => {
                    for &index in &tree.order[start..end] {
                        if self.visited[index] {
                            continue;
                        }
                        self.visited[index] = true;
                        self.evaluated += 1;
                        let dist_sq = squared_distance(self.query, self.forest.row(index));
                        self.offer(dist_sq, index);
                    }
                    return;
                }
                Node::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let diff = self.query[dim] - value;
                    let (near, far) = if diff < 0.0 { (left, right) } else { (right, left) };
                    let far_bound = bound + diff * diff;
                    if self.best.len() < self.k || far_bound < self.worst() {
                        self.heap.push(Branch {
                            bound: far_bound,
                            tree: tree_idx,
                            node: far,
                        });
                    }
                    node = near;
                }
            }
        }
    }

    fn offer(&mut self, dist_sq: f32, index: usize) {
        if self.best.len() >= self.k && dist_sq >= self.worst() {
            return;
        }
        let pos = self
            .best
            .partition_point(|&(d, i)| d < dist_sq || (d == dist_sq && i < index));
        self.best.insert(pos, (dist_sq, index));
        self.best.truncate(self.k);
    }
}

pub(crate) fn squared_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::{squared_distance, KdForest};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_rows(count: usize, dim: usize, seed: u64) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count * dim).map(|_| rng.random::<f32>()).collect()
    }

    fn brute_force(data: &[f32], dim: usize, query: &[f32]) -> (usize, usize) {
        let mut dists: Vec<(f32, usize)> = data
            .chunks(dim)
            .enumerate()
            .map(|(i, row)| (squared_distance(query, row), i))
            .collect();
        dists.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        (dists[0].1, dists[1].1)
    }

    #[test]
    fn exhaustive_budget_matches_brute_force() {
        let dim = 16;
        let data = random_rows(400, dim, 7);
        let forest = KdForest::build(&data, dim, 4, 2, 11).unwrap();
        let queries = random_rows(25, dim, 8);
        for query in queries.chunks(dim) {
            let found = forest.knn(query, 2, usize::MAX);
            let expected = brute_force(&data, dim, query);
            assert_eq!((found[0].index, found[1].index), expected);
            assert!(found[0].distance <= found[1].distance);
        }
    }

    #[test]
    fn indexed_row_is_its_own_nearest_neighbor() {
        let dim = 32;
        let data = random_rows(1000, dim, 3);
        let forest = KdForest::build(&data, dim, 5, 4, 1).unwrap();
        for index in [0usize, 17, 512, 999] {
            let query = &data[index * dim..(index + 1) * dim];
            let found = forest.knn(query, 2, 64);
            assert_eq!(found[0].index, index);
            assert_eq!(found[0].distance, 0.0);
        }
    }

    #[test]
    fn build_is_deterministic_for_seed() {
        let dim = 8;
        let data = random_rows(300, dim, 5);
        let query = random_rows(1, dim, 6);
        let a = KdForest::build(&data, dim, 5, 1, 42).unwrap().knn(&query, 2, 20);
        let b = KdForest::build(&data, dim, 5, 1, 42).unwrap().knn(&query, 2, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn single_row_returns_single_neighbor() {
        let data = vec![1.0f32, 2.0];
        let forest = KdForest::build(&data, 2, 3, 1, 0).unwrap();
        let found = forest.knn(&[1.0, 2.0], 2, 10);
        assert_eq!(found.len(), 1);
        assert!(forest.knn(&[1.0], 2, 10).is_empty());
    }
}
