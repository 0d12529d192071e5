//! Arena-backed red-black tree.
//!
//! One implementation serves two owners: the memtable (`String -> String`)
//! and each segment's sparse index (`String -> u64` byte offsets).
//!
//! Nodes live in a `Vec` and refer to each other by index, so rotations only
//! rewrite `Option<usize>` links and never fight the borrow checker. Removing
//! a node `swap_remove`s it out of the arena and re-links whichever node was
//! moved into the freed slot, keeping the arena dense.
//!
//! ## Invariants (checked by [`RedBlackTree::validate`])
//!
//! 1. The root is black.
//! 2. No red node has a red child.
//! 3. Every root-to-leaf path crosses the same number of black nodes.
//! 4. Keys are in strict BST order.
//! 5. Every child's `parent` link points back at its parent.
//!
//! `DoubleBlack` only exists transiently while a removal is being repaired.

use std::borrow::Borrow;
use std::cmp::Ordering;
use std::fmt;

use thiserror::Error;

type NodeId = usize;

/// Node color. `DoubleBlack` marks a node carrying an extra black during
/// deletion fix-up and never survives a completed operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
    DoubleBlack,
}

/// A structural defect found by [`RedBlackTree::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvariantViolation {
    #[error("root node is not black")]
    RedRoot,
    #[error("root node has a parent link")]
    RootHasParent,
    #[error("node {child} does not point back at its parent {parent}")]
    BrokenParentLink { parent: usize, child: usize },
    #[error("red node {0} has a red child")]
    RedRed(usize),
    #[error("black height differs below node {0}")]
    BlackHeight(usize),
    #[error("node {0} breaks key ordering")]
    Unordered(usize),
    #[error("node {0} is still double black")]
    StrayDoubleBlack(usize),
    #[error("{reachable} of {total} arena nodes are reachable from the root")]
    Unreachable { reachable: usize, total: usize },
}

#[derive(Clone)]
struct Node<K, V> {
    key: K,
    value: V,
    color: Color,
    left: Option<NodeId>,
    right: Option<NodeId>,
    parent: Option<NodeId>,
}

/// An ordered map implemented as a red-black tree over an index arena.
#[derive(Clone)]
pub struct RedBlackTree<K, V> {
    nodes: Vec<Node<K, V>>,
    root: Option<NodeId>,
}

impl<K: Ord, V> RedBlackTree<K, V> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.root = None;
    }

    /// Exact lookup.
    pub fn get<Q>(&self, key: &Q) -> Option<&V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key).map(|id| &self.nodes[id].value)
    }

    pub fn contains_key<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        self.find_node(key).is_some()
    }

    /// Returns the entry with the largest key `<= key`.
    pub fn floor<Q>(&self, key: &Q) -> Option<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root;
        let mut best = None;
        while let Some(id) = cur {
            let node = &self.nodes[id];
            match key.cmp(node.key.borrow()) {
                Ordering::Less => cur = node.left,
                Ordering::Equal => {
                    best = Some(id);
                    break;
                }
                Ordering::Greater => {
                    best = Some(id);
                    cur = node.right;
                }
            }
        }
        best.map(|id| (&self.nodes[id].key, &self.nodes[id].value))
    }

    /// Inserts `key -> value`.
    ///
    /// If the key already exists its value is replaced in place and the old
    /// value is returned; no node is allocated. Otherwise a red leaf is linked
    /// in and the tree is rebalanced.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let mut parent = None;
        let mut go_left = false;
        let mut cur = self.root;
        while let Some(id) = cur {
            match key.cmp(&self.nodes[id].key) {
                Ordering::Less => {
                    parent = Some(id);
                    go_left = true;
                    cur = self.nodes[id].left;
                }
                Ordering::Greater => {
                    parent = Some(id);
                    go_left = false;
                    cur = self.nodes[id].right;
                }
                Ordering::Equal => {
                    return Some(std::mem::replace(&mut self.nodes[id].value, value));
                }
            }
        }

        let id = self.nodes.len();
        self.nodes.push(Node {
            key,
            value,
            color: Color::Red,
            left: None,
            right: None,
            parent,
        });
        match parent {
            None => self.root = Some(id),
            Some(p) if go_left => self.nodes[p].left = Some(id),
            Some(p) => self.nodes[p].right = Some(id),
        }

        self.fix_insert(id);
        None
    }

    /// Removes `key`, returning its value if it was present.
    ///
    /// A node with two children first trades payloads with its in-order
    /// successor, so the node actually unlinked has at most one child.
    pub fn remove<Q>(&mut self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let z = self.find_node(key)?;
        let target = match (self.nodes[z].left, self.nodes[z].right) {
            (Some(_), Some(r)) => {
                let successor = self.min_node(r);
                self.swap_payload(z, successor);
                successor
            }
            _ => z,
        };
        let (_, value) = self.remove_node(target);
        Some(value)
    }

    /// In-order iterator over `(key, value)`.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut iter = Iter {
            tree: self,
            stack: Vec::new(),
        };
        iter.push_left(self.root);
        iter
    }

    /// Empties the tree, returning every entry in ascending key order.
    pub fn drain_sorted(&mut self) -> Vec<(K, V)> {
        let order: Vec<NodeId> = self.in_order_ids();
        self.root = None;
        let mut slots: Vec<Option<(K, V)>> = std::mem::take(&mut self.nodes)
            .into_iter()
            .map(|n| Some((n.key, n.value)))
            .collect();
        order.into_iter().filter_map(|id| slots[id].take()).collect()
    }

    /// Number of nodes on the longest root-to-leaf path.
    #[must_use]
    pub fn height(&self) -> usize {
        fn walk<K, V>(nodes: &[Node<K, V>], id: Option<NodeId>) -> usize {
            match id {
                None => 0,
                Some(id) => 1 + walk(nodes, nodes[id].left).max(walk(nodes, nodes[id].right)),
            }
        }
        walk(&self.nodes, self.root)
    }

    /// Walks the whole tree and reports the first broken invariant.
    ///
    /// O(n); meant for tests and debugging, not for the hot path.
    pub fn validate(&self) -> Result<(), InvariantViolation> {
        let Some(root) = self.root else {
            return match self.nodes.len() {
                0 => Ok(()),
                total => Err(InvariantViolation::Unreachable {
                    reachable: 0,
                    total,
                }),
            };
        };
        if self.nodes[root].parent.is_some() {
            return Err(InvariantViolation::RootHasParent);
        }
        if self.nodes[root].color != Color::Black {
            return Err(InvariantViolation::RedRoot);
        }

        let mut reachable = 0;
        self.check_subtree(root, None, None, &mut reachable)?;
        if reachable != self.nodes.len() {
            return Err(InvariantViolation::Unreachable {
                reachable,
                total: self.nodes.len(),
            });
        }
        Ok(())
    }

    // ---- Lookup helpers ----

    fn find_node<Q>(&self, key: &Q) -> Option<NodeId>
    where
        K: Borrow<Q>,
        Q: Ord + ?Sized,
    {
        let mut cur = self.root;
        while let Some(id) = cur {
            let node = &self.nodes[id];
            match key.cmp(node.key.borrow()) {
                Ordering::Less => cur = node.left,
                Ordering::Greater => cur = node.right,
                Ordering::Equal => return Some(id),
            }
        }
        None
    }

    fn min_node(&self, mut id: NodeId) -> NodeId {
        while let Some(left) = self.nodes[id].left {
            id = left;
        }
        id
    }

    fn in_order_ids(&self) -> Vec<NodeId> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut cur = self.root;
        loop {
            while let Some(id) = cur {
                stack.push(id);
                cur = self.nodes[id].left;
            }
            match stack.pop() {
                Some(id) => {
                    out.push(id);
                    cur = self.nodes[id].right;
                }
                None => break,
            }
        }
        out
    }

    fn is_red(&self, id: Option<NodeId>) -> bool {
        id.is_some_and(|id| self.nodes[id].color == Color::Red)
    }

    // ---- Structural helpers ----

    /// Points `parent`'s link that referenced `old` at `new` instead (or the
    /// root, when `parent` is `None`).
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: Option<NodeId>) {
        match parent {
            None => self.root = new,
            Some(p) => {
                if self.nodes[p].left == Some(old) {
                    self.nodes[p].left = new;
                } else {
                    self.nodes[p].right = new;
                }
            }
        }
    }

    /// ```text
    ///   x                y
    ///  / \              / \
    /// a   y     -->    x   c
    ///    / \          / \
    ///   b   c        a   b
    /// ```
    fn rotate_left(&mut self, x: NodeId) {
        let Some(y) = self.nodes[x].right else {
            return;
        };
        let b = self.nodes[y].left;
        self.nodes[x].right = b;
        if let Some(b) = b {
            self.nodes[b].parent = Some(x);
        }
        let xp = self.nodes[x].parent;
        self.nodes[y].parent = xp;
        self.replace_child(xp, x, Some(y));
        self.nodes[y].left = Some(x);
        self.nodes[x].parent = Some(y);
    }

    /// ```text
    ///     x            y
    ///    / \          / \
    ///   y   c  -->   a   x
    ///  / \              / \
    /// a   b            b   c
    /// ```
    fn rotate_right(&mut self, x: NodeId) {
        let Some(y) = self.nodes[x].left else {
            return;
        };
        let b = self.nodes[y].right;
        self.nodes[x].left = b;
        if let Some(b) = b {
            self.nodes[b].parent = Some(x);
        }
        let xp = self.nodes[x].parent;
        self.nodes[y].parent = xp;
        self.replace_child(xp, x, Some(y));
        self.nodes[y].right = Some(x);
        self.nodes[x].parent = Some(y);
    }

    fn swap_payload(&mut self, a: NodeId, b: NodeId) {
        if a == b {
            return;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.nodes.split_at_mut(hi);
        let (first, second) = (&mut head[lo], &mut tail[0]);
        std::mem::swap(&mut first.key, &mut second.key);
        std::mem::swap(&mut first.value, &mut second.value);
    }

    // ---- Insert rebalancing ----

    fn fix_insert(&mut self, mut z: NodeId) {
        while let Some(p) = self.nodes[z].parent {
            if self.nodes[p].color != Color::Red {
                break;
            }
            // A red node is never the root, so its parent exists.
            let Some(g) = self.nodes[p].parent else {
                break;
            };

            if self.nodes[g].left == Some(p) {
                let uncle = self.nodes[g].right;
                if self.is_red(uncle) {
                    self.recolor_from_uncle(p, uncle, g);
                    z = g;
                } else {
                    let (mut parent, mut node) = (p, z);
                    if self.nodes[p].right == Some(z) {
                        self.rotate_left(p);
                        parent = z;
                        node = p;
                    }
                    self.nodes[parent].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    self.rotate_right(g);
                    z = node;
                }
            } else {
                let uncle = self.nodes[g].left;
                if self.is_red(uncle) {
                    self.recolor_from_uncle(p, uncle, g);
                    z = g;
                } else {
                    let (mut parent, mut node) = (p, z);
                    if self.nodes[p].left == Some(z) {
                        self.rotate_right(p);
                        parent = z;
                        node = p;
                    }
                    self.nodes[parent].color = Color::Black;
                    self.nodes[g].color = Color::Red;
                    self.rotate_left(g);
                    z = node;
                }
            }
        }

        if let Some(root) = self.root {
            self.nodes[root].color = Color::Black;
        }
    }

    fn recolor_from_uncle(&mut self, parent: NodeId, uncle: Option<NodeId>, grandparent: NodeId) {
        self.nodes[parent].color = Color::Black;
        if let Some(u) = uncle {
            self.nodes[u].color = Color::Black;
        }
        self.nodes[grandparent].color = Color::Red;
    }

    // ---- Remove rebalancing ----

    /// Unlinks `x` (which has at most one child) and frees its arena slot.
    fn remove_node(&mut self, x: NodeId) -> (K, V) {
        let child = self.nodes[x].left.or(self.nodes[x].right);

        if self.nodes[x].color == Color::Red || self.is_red(child) {
            if let Some(c) = child {
                self.nodes[c].color = Color::Black;
            }
        } else if self.nodes[x].parent.is_some() {
            // A black leaf leaves its path one black short.
            self.nodes[x].color = Color::DoubleBlack;
            self.fix_double_black(x);
        }

        let parent = self.nodes[x].parent;
        if let Some(c) = child {
            self.nodes[c].parent = parent;
        }
        self.replace_child(parent, x, child);
        self.release(x)
    }

    fn fix_double_black(&mut self, mut x: NodeId) {
        while self.nodes[x].color == Color::DoubleBlack {
            let Some(p) = self.nodes[x].parent else {
                // The root absorbs the extra black.
                self.nodes[x].color = Color::Black;
                break;
            };
            let x_is_left = self.nodes[p].left == Some(x);
            let sibling = if x_is_left {
                self.nodes[p].right
            } else {
                self.nodes[p].left
            };

            let Some(s) = sibling else {
                self.nodes[x].color = Color::Black;
                x = self.push_black_up(p, x);
                continue;
            };

            if self.nodes[s].color == Color::Red {
                self.nodes[p].color = Color::Red;
                self.nodes[s].color = Color::Black;
                if x_is_left {
                    self.rotate_left(p);
                } else {
                    self.rotate_right(p);
                }
                continue;
            }

            let (near, far) = if x_is_left {
                (self.nodes[s].left, self.nodes[s].right)
            } else {
                (self.nodes[s].right, self.nodes[s].left)
            };

            if self.is_red(far) {
                self.nodes[s].color = self.nodes[p].color;
                self.nodes[p].color = Color::Black;
                if let Some(f) = far {
                    self.nodes[f].color = Color::Black;
                }
                if x_is_left {
                    self.rotate_left(p);
                } else {
                    self.rotate_right(p);
                }
                self.nodes[x].color = Color::Black;
            } else if self.is_red(near) {
                if let Some(n) = near {
                    self.nodes[n].color = Color::Black;
                }
                self.nodes[s].color = Color::Red;
                if x_is_left {
                    self.rotate_right(s);
                } else {
                    self.rotate_left(s);
                }
            } else {
                self.nodes[s].color = Color::Red;
                self.nodes[x].color = Color::Black;
                x = self.push_black_up(p, x);
            }
        }
    }

    /// Hands the extra black of `x` to its parent `p`. Returns the node that
    /// now carries it (or `x` again when a red parent absorbed it).
    fn push_black_up(&mut self, p: NodeId, x: NodeId) -> NodeId {
        if self.nodes[p].color == Color::Red {
            self.nodes[p].color = Color::Black;
            x
        } else {
            self.nodes[p].color = Color::DoubleBlack;
            p
        }
    }

    /// Drops the detached node `x` from the arena.
    fn release(&mut self, x: NodeId) -> (K, V) {
        let node = self.nodes.swap_remove(x);
        let moved_from = self.nodes.len();
        if x < moved_from {
            // The former last node now lives at `x`.
            let parent = self.nodes[x].parent;
            match parent {
                None => self.root = Some(x),
                Some(p) => {
                    if self.nodes[p].left == Some(moved_from) {
                        self.nodes[p].left = Some(x);
                    } else {
                        self.nodes[p].right = Some(x);
                    }
                }
            }
            let children = [self.nodes[x].left, self.nodes[x].right];
            for c in children.into_iter().flatten() {
                self.nodes[c].parent = Some(x);
            }
        }
        (node.key, node.value)
    }

    // ---- Validation ----

    /// Returns the black height of the subtree rooted at `id`.
    fn check_subtree(
        &self,
        id: NodeId,
        lower: Option<&K>,
        upper: Option<&K>,
        reachable: &mut usize,
    ) -> Result<usize, InvariantViolation> {
        *reachable += 1;
        let node = &self.nodes[id];

        if node.color == Color::DoubleBlack {
            return Err(InvariantViolation::StrayDoubleBlack(id));
        }
        if lower.is_some_and(|l| node.key <= *l) || upper.is_some_and(|u| node.key >= *u) {
            return Err(InvariantViolation::Unordered(id));
        }

        for child in [node.left, node.right].into_iter().flatten() {
            if self.nodes[child].parent != Some(id) {
                return Err(InvariantViolation::BrokenParentLink { parent: id, child });
            }
            if node.color == Color::Red && self.nodes[child].color == Color::Red {
                return Err(InvariantViolation::RedRed(id));
            }
        }

        let left_height = match node.left {
            Some(l) => self.check_subtree(l, lower, Some(&node.key), reachable)?,
            None => 1,
        };
        let right_height = match node.right {
            Some(r) => self.check_subtree(r, Some(&node.key), upper, reachable)?,
            None => 1,
        };
        if left_height != right_height {
            return Err(InvariantViolation::BlackHeight(id));
        }

        Ok(left_height + usize::from(node.color == Color::Black))
    }
}

impl<K: Ord, V> Default for RedBlackTree<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Ord + fmt::Debug, V: fmt::Debug> fmt::Debug for RedBlackTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// In-order iterator returned by [`RedBlackTree::iter`].
pub struct Iter<'a, K, V> {
    tree: &'a RedBlackTree<K, V>,
    stack: Vec<NodeId>,
}

impl<K, V> Iter<'_, K, V> {
    fn push_left(&mut self, mut cur: Option<NodeId>) {
        while let Some(id) = cur {
            self.stack.push(id);
            cur = self.tree.nodes[id].left;
        }
    }
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        let tree: &'a RedBlackTree<K, V> = self.tree;
        self.push_left(tree.nodes[id].right);
        let node = &tree.nodes[id];
        Some((&node.key, &node.value))
    }
}
