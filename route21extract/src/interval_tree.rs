//!
//! # Augmented Interval Tree
//!
//! An AVL tree keyed on (low coordinate, payload), where every node also
//! caches the maximum high coordinate of its subtree. The augmentation makes
//! overlap queries O(log n + k): a subtree whose cached max lies below the
//! query can be skipped wholesale.
//!
//! Intersection is *closed* on both ends: two intervals sharing only an
//! endpoint do intersect. Ties among equal-low intervals are broken by
//! payload, so traversal order, and everything derived from it, is
//! deterministic.
//!

// Crates.io
use serde::{Deserialize, Serialize};

// Local imports
use route21db::{DbUnits, Span};

/// One stored element: a [Span] plus its payload.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TreeEntry<P> {
    pub span: Span,
    pub payload: P,
}

struct Node<P> {
    low: DbUnits,
    high: DbUnits,
    payload: P,
    /// max(high) over this node and both subtrees
    max: DbUnits,
    height: i32,
    left: Option<Box<Node<P>>>,
    right: Option<Box<Node<P>>>,
}
impl<P: Copy + Ord> Node<P> {
    fn new(low: DbUnits, high: DbUnits, payload: P) -> Box<Self> {
        Box::new(Self {
            low,
            high,
            payload,
            max: high,
            height: 1,
            left: None,
            right: None,
        })
    }
    /// Sort key: (low, payload)
    fn key(&self) -> (DbUnits, P) {
        (self.low, self.payload)
    }
}

fn height<P>(node: &Option<Box<Node<P>>>) -> i32 {
    node.as_ref().map_or(0, |n| n.height)
}
fn submax<P>(node: &Option<Box<Node<P>>>) -> Option<DbUnits> {
    node.as_ref().map(|n| n.max)
}

/// # Interval Tree
///
/// Self-balancing store of (interval, payload) pairs supporting
/// logarithmic insertion, removal and stabbing/overlap queries.
pub struct IntervalTree<P> {
    root: Option<Box<Node<P>>>,
    len: usize,
}
impl<P: Copy + Ord> Default for IntervalTree<P> {
    fn default() -> Self {
        Self::new()
    }
}
impl<P: Copy + Ord> IntervalTree<P> {
    /// Create a new and empty tree
    pub fn new() -> Self {
        Self { root: None, len: 0 }
    }
    /// Number of stored elements
    pub fn len(&self) -> usize {
        self.len
    }
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
    /// Insert `span` with `payload`
    pub fn insert(&mut self, span: Span, payload: P) {
        let root = self.root.take();
        self.root = Some(Self::insert_at(root, span.vmin, span.vmax, payload));
        self.len += 1;
    }
    /// Remove the element matching (`span`, `payload`).
    /// Returns whether anything was removed.
    pub fn remove(&mut self, span: Span, payload: P) -> bool {
        let root = self.root.take();
        let mut removed = false;
        self.root = Self::remove_at(root, span.vmin, span.vmax, payload, &mut removed);
        if removed {
            self.len -= 1;
        }
        removed
    }
    /// Collect every element whose interval intersects `query`
    /// (closed bounds), in ascending (low, payload) order.
    pub fn overlaps(&self, query: Span) -> Vec<TreeEntry<P>> {
        let mut out = Vec::new();
        Self::overlaps_at(&self.root, &query, &mut out);
        out
    }
    /// Collect every element whose interval contains coordinate `x`
    pub fn stab(&self, x: DbUnits) -> Vec<TreeEntry<P>> {
        self.overlaps(Span::new(x, x))
    }
    /// In-order traversal of all elements, ascending (low, payload)
    pub fn elements(&self) -> Vec<TreeEntry<P>> {
        let mut out = Vec::new();
        Self::walk(&self.root, &mut |n| {
            out.push(TreeEntry {
                span: Span::new(n.low, n.high),
                payload: n.payload,
            })
        });
        out
    }
    /// Verify the max-augmentation over the whole tree. Test support.
    pub fn check_max(&self) -> bool {
        Self::check_max_at(&self.root).is_some() || self.root.is_none()
    }

    // Internal: recursive implementations

    fn insert_at(
        node: Option<Box<Node<P>>>,
        low: DbUnits,
        high: DbUnits,
        payload: P,
    ) -> Box<Node<P>> {
        let mut node = match node {
            None => return Node::new(low, high, payload),
            Some(n) => n,
        };
        if (low, payload) < node.key() {
            node.left = Some(Self::insert_at(node.left.take(), low, high, payload));
        } else {
            node.right = Some(Self::insert_at(node.right.take(), low, high, payload));
        }
        Self::rebalance(node)
    }

    fn remove_at(
        node: Option<Box<Node<P>>>,
        low: DbUnits,
        high: DbUnits,
        payload: P,
        removed: &mut bool,
    ) -> Option<Box<Node<P>>> {
        let mut node = node?;
        if (low, payload) < node.key() {
            node.left = Self::remove_at(node.left.take(), low, high, payload, removed);
        } else if (low, payload) > node.key() {
            node.right = Self::remove_at(node.right.take(), low, high, payload, removed);
        } else if node.high != high {
            // Same key, different high: not the element we were asked for.
            return Some(Self::rebalance(node));
        } else {
            *removed = true;
            match (node.left.take(), node.right.take()) {
                (None, None) => return None,
                (Some(l), None) => return Some(l),
                (None, Some(r)) => return Some(r),
                (Some(l), Some(r)) => {
                    // Two children: replace by the in-order successor.
                    let (succ, rest) = Self::pop_min(r);
                    node.low = succ.low;
                    node.high = succ.high;
                    node.payload = succ.payload;
                    node.left = Some(l);
                    node.right = rest;
                }
            }
        }
        Some(Self::rebalance(node))
    }

    /// Detach the minimum node of `node`'s subtree; returns (min, remainder)
    fn pop_min(mut node: Box<Node<P>>) -> (Box<Node<P>>, Option<Box<Node<P>>>) {
        match node.left.take() {
            None => {
                let rest = node.right.take();
                (node, rest)
            }
            Some(left) => {
                let (min, rest) = Self::pop_min(left);
                node.left = rest;
                (min, Some(Self::rebalance(node)))
            }
        }
    }

    /// Recompute `height` and `max`, then restore the AVL shape if needed.
    fn rebalance(mut node: Box<Node<P>>) -> Box<Node<P>> {
        Self::update(&mut node);
        let balance = height(&node.left) - height(&node.right);
        if balance > 1 {
            // Left-heavy; rotate the left child first on a zig-zag.
            if height(&node.left.as_ref().unwrap().left)
                < height(&node.left.as_ref().unwrap().right)
            {
                let left = node.left.take().unwrap();
                node.left = Some(Self::rotate_left(left));
            }
            return Self::rotate_right(node);
        }
        if balance < -1 {
            if height(&node.right.as_ref().unwrap().right)
                < height(&node.right.as_ref().unwrap().left)
            {
                let right = node.right.take().unwrap();
                node.right = Some(Self::rotate_right(right));
            }
            return Self::rotate_left(node);
        }
        node
    }

    fn update(node: &mut Box<Node<P>>) {
        node.height = 1 + height(&node.left).max(height(&node.right));
        let mut max = node.high;
        if let Some(m) = submax(&node.left) {
            max = max.max(m);
        }
        if let Some(m) = submax(&node.right) {
            max = max.max(m);
        }
        node.max = max;
    }

    fn rotate_left(mut node: Box<Node<P>>) -> Box<Node<P>> {
        let mut pivot = node.right.take().unwrap();
        node.right = pivot.left.take();
        Self::update(&mut node);
        pivot.left = Some(node);
        Self::update(&mut pivot);
        pivot
    }

    fn rotate_right(mut node: Box<Node<P>>) -> Box<Node<P>> {
        let mut pivot = node.left.take().unwrap();
        node.left = pivot.right.take();
        Self::update(&mut node);
        pivot.right = Some(node);
        Self::update(&mut pivot);
        pivot
    }

    fn overlaps_at(node: &Option<Box<Node<P>>>, query: &Span, out: &mut Vec<TreeEntry<P>>) {
        let node = match node {
            None => return,
            Some(n) => n,
        };
        // The left subtree can only contribute if some stored high
        // reaches up to the query's low bound.
        if let Some(max) = submax(&node.left) {
            if max >= query.vmin {
                Self::overlaps_at(&node.left, query, out);
            }
        }
        if node.low <= query.vmax && node.high >= query.vmin {
            out.push(TreeEntry {
                span: Span::new(node.low, node.high),
                payload: node.payload,
            });
        }
        // Everything right of a node past the query's high bound is, too.
        if node.low <= query.vmax {
            Self::overlaps_at(&node.right, query, out);
        }
    }

    fn walk(node: &Option<Box<Node<P>>>, f: &mut impl FnMut(&Node<P>)) {
        if let Some(n) = node {
            Self::walk(&n.left, f);
            f(n);
            Self::walk(&n.right, f);
        }
    }

    fn check_max_at(node: &Option<Box<Node<P>>>) -> Option<DbUnits> {
        let n = node.as_ref()?;
        let mut expect = n.high;
        if let Some(m) = Self::check_max_at(&n.left) {
            expect = expect.max(m);
        }
        if let Some(m) = Self::check_max_at(&n.right) {
            expect = expect.max(m);
        }
        if expect != n.max {
            panic!("Interval-tree max annotation out of sync");
        }
        Some(expect)
    }
}

impl<P: Copy + Ord + std::fmt::Debug> std::fmt::Debug for IntervalTree<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_list().entries(self.elements()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(a: i64, b: i64) -> Span {
        Span::new(a, b)
    }

    #[test]
    fn overlap_basics() {
        let mut tree = IntervalTree::new();
        tree.insert(span(0, 10), 1u32);
        tree.insert(span(5, 20), 2);
        tree.insert(span(30, 40), 3);

        let hits = tree.overlaps(span(8, 12));
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].payload, 1);
        assert_eq!(hits[1].payload, 2);

        // Closed ends: touching intervals intersect
        let hits = tree.overlaps(span(10, 10));
        assert_eq!(hits.len(), 2);
        assert!(tree.overlaps(span(21, 29)).is_empty());
    }
    #[test]
    fn ties_break_by_payload() {
        let mut tree = IntervalTree::new();
        tree.insert(span(0, 5), 9u32);
        tree.insert(span(0, 8), 3);
        tree.insert(span(0, 2), 7);
        let all = tree.elements();
        assert_eq!(
            all.iter().map(|e| e.payload).collect::<Vec<_>>(),
            vec![3, 7, 9]
        );
    }
    #[test]
    fn insert_remove_round_trip() {
        let mut tree = IntervalTree::new();
        let keep: Vec<(Span, u32)> = (0..64)
            .map(|i| (span(i * 3, i * 3 + 10), i as u32))
            .collect();
        for (s, p) in &keep {
            tree.insert(*s, *p);
        }
        let baseline = tree.elements();
        assert!(tree.check_max());

        // Insert-then-remove must restore the same element sequence and
        // keep the max annotations coherent.
        tree.insert(span(7, 100), 999);
        assert!(tree.check_max());
        assert!(tree.remove(span(7, 100), 999));
        assert!(tree.check_max());
        assert_eq!(tree.elements(), baseline);

        // Removing something absent reports false
        assert!(!tree.remove(span(7, 100), 999));
    }
    #[test]
    fn removal_recomputes_max_path() {
        let mut tree = IntervalTree::new();
        tree.insert(span(0, 100), 1u32); // The subtree-max donor
        tree.insert(span(10, 20), 2);
        tree.insert(span(30, 35), 3);
        assert!(tree.remove(span(0, 100), 1));
        assert!(tree.check_max());
        // 100 is gone: a query above the survivors must now miss
        assert!(tree.overlaps(span(50, 60)).is_empty());
    }
    #[test]
    fn exhaustive_against_naive() {
        // Every stored element intersecting the query, and nothing else
        let mut tree = IntervalTree::new();
        let mut naive = Vec::new();
        let mut k = 0u32;
        for lo in (0..40).step_by(3) {
            for len in [0i64, 2, 7, 15] {
                tree.insert(span(lo, lo + len), k);
                naive.push((span(lo, lo + len), k));
                k += 1;
            }
        }
        for qlo in 0..45 {
            let q = span(qlo, qlo + 4);
            let mut expect: Vec<u32> = naive
                .iter()
                .filter(|(s, _)| s.intersects(&q))
                .map(|(_, p)| *p)
                .collect();
            expect.sort_by_key(|p| (naive[*p as usize].0.vmin, *p));
            let got: Vec<u32> = tree.overlaps(q).iter().map(|e| e.payload).collect();
            assert_eq!(got, expect);
        }
    }
}
