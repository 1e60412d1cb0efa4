//! Merge history of an agglomerative clustering run.
//!
//! Cluster labels follow the SciPy/`kodama` convention: leaves are
//! `0..n`, and merge `i` creates cluster `n + i`.

use crate::error::{HclusError, Result};

/// Two clusters joined at `height`; `size` counts the leaves below.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Merge {
    pub left: usize,
    pub right: usize,
    pub height: f64,
    pub size: usize,
}

/// Merge history over `n_items` leaves, in merge order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dendrogram {
    merges: Vec<Merge>,
    n_items: usize,
}

/// Drawing coordinates for a dendrogram.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    /// Leaves left to right.
    pub order: Vec<usize>,
    /// `(x, height)` of every merge node, indexed like the merges.
    pub nodes: Vec<(f64, f64)>,
    /// Line segments `((x0, y0), (x1, y1))` making up the tree.
    pub segments: Vec<((f64, f64), (f64, f64))>,
}

impl Dendrogram {
    pub fn new(n_items: usize) -> Self {
        Self {
            merges: Vec::with_capacity(n_items.saturating_sub(1)),
            n_items,
        }
    }

    /// Join clusters `left` and `right` at `height` as the next merge.
    pub fn join(&mut self, left: usize, right: usize, height: f64) {
        let size = self.size_of(left) + self.size_of(right);
        self.merges.push(Merge {
            left,
            right,
            height,
            size,
        });
    }

    fn size_of(&self, label: usize) -> usize {
        match label.checked_sub(self.n_items) {
            None => 1,
            Some(step) => self.merges.get(step).map_or(0, |m| m.size),
        }
    }

    /// Number of leaves.
    pub fn n_items(&self) -> usize {
        self.n_items
    }

    /// Number of merges recorded.
    pub fn n_merges(&self) -> usize {
        self.merges.len()
    }

    pub fn merges(&self) -> &[Merge] {
        &self.merges
    }

    /// Merge heights in merge order.
    pub fn heights(&self) -> Vec<f64> {
        self.merges.iter().map(|m| m.height).collect()
    }

    fn check_label(&self, label: usize, step: usize) -> Result<()> {
        if label >= self.n_items + step {
            return Err(HclusError::InvalidParameter {
                name: "dendrogram",
                message: format!("merge {step} refers to unknown cluster {label}"),
            });
        }
        Ok(())
    }

    /// Cluster ids in `1..=k` for every item, from applying the first `n - k`
    /// merges. Ids are numbered in order of first appearance over the items.
    pub fn cut_to_k(&self, k: usize) -> Result<Vec<usize>> {
        let n = self.n_items;
        if k == 0 || k > n || n - k > self.merges.len() {
            return Err(HclusError::InvalidClusterCount {
                requested: k,
                n_items: n,
            });
        }

        let mut parent: Vec<usize> = (0..n).collect();
        // representative leaf of every merged cluster
        let mut rep: Vec<usize> = Vec::with_capacity(n - k);
        for (step, merge) in self.merges.iter().take(n - k).enumerate() {
            self.check_label(merge.left, step)?;
            self.check_label(merge.right, step)?;
            let leaf = |label: usize| if label < n { label } else { rep[label - n] };
            let a = find(&mut parent, leaf(merge.left));
            let b = find(&mut parent, leaf(merge.right));
            parent[b] = a;
            rep.push(a);
        }

        let mut ids: Vec<Option<usize>> = vec![None; n];
        let mut next = 0;
        let mut out = Vec::with_capacity(n);
        for item in 0..n {
            let root = find(&mut parent, item);
            let id = *ids[root].get_or_insert_with(|| {
                next += 1;
                next
            });
            out.push(id);
        }
        Ok(out)
    }

    /// Leaves in drawing order: a depth-first walk from the root visiting
    /// `left` before `right`. Unmerged leaves (a forest) follow in
    /// index order.
    pub fn order(&self) -> Result<Vec<usize>> {
        let n = self.n_items;
        for (step, merge) in self.merges.iter().enumerate() {
            self.check_label(merge.left, step)?;
            self.check_label(merge.right, step)?;
        }

        let mut used = vec![false; n + self.merges.len()];
        for merge in &self.merges {
            used[merge.left] = true;
            used[merge.right] = true;
        }

        let mut order = Vec::with_capacity(n);
        let roots = (0..n + self.merges.len()).rev().filter(|&c| !used[c]);
        let mut roots: Vec<usize> = roots.collect();
        roots.reverse();
        // merged trees before singletons
        roots.sort_by_key(|&c| c < n);
        for root in roots {
            let mut stack = vec![root];
            while let Some(c) = stack.pop() {
                if c < n {
                    order.push(c);
                } else {
                    let merge = &self.merges[c - n];
                    stack.push(merge.right);
                    stack.push(merge.left);
                }
            }
        }
        Ok(order)
    }

    /// Coordinates for drawing: leaf `i` of the order sits at `x = i` with
    /// height zero, every merge node midway between its children.
    pub fn layout(&self) -> Result<Layout> {
        let n = self.n_items;
        let order = self.order()?;
        let mut leaf_x = vec![0.0; n];
        for (pos, &leaf) in order.iter().enumerate() {
            leaf_x[leaf] = pos as f64;
        }

        let mut nodes: Vec<(f64, f64)> = Vec::with_capacity(self.merges.len());
        let mut segments = Vec::with_capacity(3 * self.merges.len());
        for merge in &self.merges {
            let point = |label: usize| if label < n { (leaf_x[label], 0.0) } else { nodes[label - n] };
            let (xa, ya) = point(merge.left);
            let (xb, yb) = point(merge.right);
            let h = merge.height;
            segments.push(((xa, ya), (xa, h)));
            segments.push(((xb, yb), (xb, h)));
            segments.push(((xa, h), (xb, h)));
            nodes.push(((xa + xb) / 2.0, h));
        }

        Ok(Layout {
            order,
            nodes,
            segments,
        })
    }
}

fn find(parent: &mut [usize], mut x: usize) -> usize {
    while parent[x] != x {
        parent[x] = parent[parent[x]];
        x = parent[x];
    }
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    // ((0,1),(2,3)) then 4 joins last
    fn sample() -> Dendrogram {
        let mut d = Dendrogram::new(5);
        d.join(0, 1, 0.5);
        d.join(2, 3, 0.7);
        d.join(5, 6, 1.0);
        d.join(4, 7, 2.0);
        d
    }

    #[test]
    fn test_join_counts_leaves() {
        let d = sample();
        assert_eq!(d.n_items(), 5);
        let sizes: Vec<usize> = d.merges().iter().map(|m| m.size).collect();
        assert_eq!(sizes, [2, 2, 4, 5]);
        assert_eq!(d.heights(), [0.5, 0.7, 1.0, 2.0]);
    }

    #[test]
    fn test_cut_to_k() {
        let d = sample();
        assert_eq!(d.cut_to_k(5).unwrap(), [1, 2, 3, 4, 5]);
        assert_eq!(d.cut_to_k(3).unwrap(), [1, 1, 2, 2, 3]);
        assert_eq!(d.cut_to_k(2).unwrap(), [1, 1, 1, 1, 2]);
        assert_eq!(d.cut_to_k(1).unwrap(), [1; 5]);
        assert!(matches!(
            d.cut_to_k(0),
            Err(HclusError::InvalidClusterCount { requested: 0, n_items: 5 })
        ));
        assert!(d.cut_to_k(6).is_err());
    }

    #[test]
    fn test_ids_follow_first_appearance() {
        let mut d = Dendrogram::new(3);
        d.join(1, 2, 1.0);
        d.join(0, 3, 2.0);
        assert_eq!(d.cut_to_k(2).unwrap(), [1, 2, 2]);
    }

    #[test]
    fn test_order_and_layout() {
        let d = sample();
        assert_eq!(d.order().unwrap(), [4, 0, 1, 2, 3]);
        let layout = d.layout().unwrap();
        assert_eq!(layout.nodes[0], (1.5, 0.5));
        assert_eq!(layout.nodes[2], (2.5, 1.0));
        assert_eq!(layout.nodes[3], (1.25, 2.0));
        assert_eq!(layout.segments.len(), 12);
    }

    #[test]
    fn test_forest_order_lists_singletons_last() {
        let mut d = Dendrogram::new(3);
        d.join(0, 2, 1.0);
        assert_eq!(d.order().unwrap(), [0, 2, 1]);
        assert_eq!(d.cut_to_k(2).unwrap(), [1, 2, 1]);
    }

    #[test]
    fn test_rejects_forward_references() {
        let mut d = Dendrogram::new(2);
        d.join(0, 3, 1.0);
        assert!(d.order().is_err());
        assert!(d.cut_to_k(1).is_err());
    }
}
