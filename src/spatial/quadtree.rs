//! Region index over object bounding boxes.
//!
//! Nodes live in one arena; child slots are ordered top-right, top-left,
//! bottom-left, bottom-right. An entry sinks into a child only when its box
//! lies strictly on one side of both mid-lines, so boxes straddling a
//! mid-line stay in the parent.

use macroquad::prelude::*;

pub const MAX_OBJECTS: usize = 5;
pub const MAX_LEVELS: u16 = 5;

/// Position of an object in the map: layer index and index in that layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectRef {
    pub layer: usize,
    pub object: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Entry {
    pub object: ObjectRef,
    pub aabb: Rect,
}

#[derive(Debug, Clone)]
struct Node {
    bounds: Rect,
    level: u16,
    entries: Vec<Entry>,
    children: Option<[usize; 4]>,
}

impl Node {
    fn new(bounds: Rect, level: u16) -> Self {
        Self {
            bounds,
            level,
            entries: Vec::new(),
            children: None,
        }
    }

    /// Child slot that fully holds `area`, if any.
    fn index_of(&self, area: &Rect) -> Option<usize> {
        let b = &self.bounds;
        let mid = b.center();

        let top = area.bottom() < mid.y && area.y >= b.y;
        let bottom = area.y > mid.y && area.bottom() <= b.bottom();
        let left = area.right() < mid.x && area.x >= b.x;
        let right = area.x > mid.x && area.right() <= b.right();

        match (left, right, top, bottom) {
            (_, true, true, _) => Some(0),
            (true, _, true, _) => Some(1),
            (true, _, _, true) => Some(2),
            (_, true, _, true) => Some(3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct QuadTree {
    nodes: Vec<Node>,
    len: usize,
}

impl QuadTree {
    pub fn new(bounds: Rect) -> Self {
        Self {
            nodes: vec![Node::new(bounds, 0)],
            len: 0,
        }
    }

    /// Drops every node and entry and starts over with `bounds`.
    pub fn clear(&mut self, bounds: Rect) {
        self.nodes.clear();
        self.nodes.push(Node::new(bounds, 0));
        self.len = 0;
    }

    pub fn bounds(&self) -> Rect {
        self.nodes[0].bounds
    }

    /// Entries held by the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Deepest level any node has reached.
    pub fn depth(&self) -> u16 {
        self.nodes.iter().map(|n| n.level).max().unwrap_or(0)
    }

    /// Adds an entry. Boxes entirely outside the root bounds are ignored;
    /// returns whether the entry was stored.
    pub fn insert(&mut self, entry: Entry) -> bool {
        if !self.nodes[0].bounds.overlaps(&entry.aabb) {
            return false;
        }
        self.insert_at(0, entry);
        self.len += 1;
        true
    }

    fn insert_at(&mut self, node: usize, entry: Entry) {
        if let Some(children) = self.nodes[node].children {
            if let Some(q) = self.nodes[node].index_of(&entry.aabb) {
                self.insert_at(children[q], entry);
                return;
            }
        }

        self.nodes[node].entries.push(entry);

        let (count, level, existing) = {
            let n = &self.nodes[node];
            (n.entries.len(), n.level, n.children)
        };
        if count <= MAX_OBJECTS || level >= MAX_LEVELS {
            return;
        }
        let children = match existing {
            Some(c) => c,
            None => self.split(node),
        };
        for e in std::mem::take(&mut self.nodes[node].entries) {
            match self.nodes[node].index_of(&e.aabb) {
                Some(q) => self.insert_at(children[q], e),
                None => self.nodes[node].entries.push(e),
            }
        }
    }

    fn split(&mut self, node: usize) -> [usize; 4] {
        let Node { bounds, level, .. } = self.nodes[node];
        let (hw, hh) = (bounds.w / 2.0, bounds.h / 2.0);
        let (x, y) = (bounds.x, bounds.y);
        let quads = [
            Rect::new(x + hw, y, hw, hh),
            Rect::new(x, y, hw, hh),
            Rect::new(x, y + hh, hw, hh),
            Rect::new(x + hw, y + hh, hw, hh),
        ];

        let first = self.nodes.len();
        self.nodes
            .extend(quads.into_iter().map(|r| Node::new(r, level + 1)));
        let children = [first, first + 1, first + 2, first + 3];
        self.nodes[node].children = Some(children);
        children
    }

    /// Broad phase: every entry stored in a node the area can reach. May
    /// include entries that do not overlap `area`.
    pub fn candidates(&self, area: Rect) -> Vec<Entry> {
        let mut out = Vec::new();
        self.collect(0, &area, &mut out);
        out
    }

    fn collect(&self, node: usize, area: &Rect, out: &mut Vec<Entry>) {
        let n = &self.nodes[node];
        if let Some(children) = n.children {
            match n.index_of(area) {
                Some(q) => self.collect(children[q], area, out),
                None => {
                    for c in children {
                        if area.overlaps(&self.nodes[c].bounds) {
                            self.collect(c, area, out);
                        }
                    }
                }
            }
        }
        out.extend_from_slice(&n.entries);
    }

    /// Objects whose boxes overlap `area`.
    pub fn retrieve(&self, area: Rect) -> Vec<ObjectRef> {
        self.candidates(area)
            .into_iter()
            .filter(|e| e.aabb.overlaps(&area))
            .map(|e| e.object)
            .collect()
    }

    /// One closed line strip per node, for debug drawing.
    pub fn outline(&self) -> Vec<[Vec2; 5]> {
        self.nodes
            .iter()
            .map(|n| {
                let b = n.bounds;
                [
                    vec2(b.x, b.y),
                    vec2(b.right(), b.y),
                    vec2(b.right(), b.bottom()),
                    vec2(b.x, b.bottom()),
                    vec2(b.x, b.y),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ::rand::rngs::StdRng;
    use ::rand::{Rng, SeedableRng};

    fn entry(i: usize, aabb: Rect) -> Entry {
        Entry {
            object: ObjectRef { layer: 0, object: i },
            aabb,
        }
    }

    #[test]
    fn splits_after_five_entries() {
        let mut tree = QuadTree::new(Rect::new(0.0, 0.0, 100.0, 100.0));
        for i in 0..5 {
            tree.insert(entry(i, Rect::new(i as f32 * 2.0, 1.0, 1.0, 1.0)));
        }
        assert_eq!(tree.node_count(), 1);
        tree.insert(entry(5, Rect::new(80.0, 80.0, 5.0, 5.0)));
        assert_eq!(tree.node_count(), 5);
        assert_eq!(tree.len(), 6);

        // top-left child holds the first five, bottom-right the last
        let found = tree.retrieve(Rect::new(70.0, 70.0, 20.0, 20.0));
        assert_eq!(found, vec![ObjectRef { layer: 0, object: 5 }]);
    }

    #[test]
    fn straddlers_stay_in_the_parent() {
        let mut tree = QuadTree::new(Rect::new(0.0, 0.0, 100.0, 100.0));
        for i in 0..6 {
            tree.insert(entry(i, Rect::new(45.0, 45.0, 10.0, 10.0)));
        }
        assert_eq!(tree.node_count(), 5);
        // every child query still sees the straddlers
        assert_eq!(tree.retrieve(Rect::new(0.0, 0.0, 50.0, 50.0)).len(), 6);
        assert_eq!(tree.retrieve(Rect::new(60.0, 60.0, 10.0, 10.0)).len(), 0);
    }

    #[test]
    fn boxes_outside_the_root_are_ignored() {
        let mut tree = QuadTree::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(!tree.insert(entry(0, Rect::new(50.0, 50.0, 1.0, 1.0))));
        assert!(tree.is_empty());
    }

    #[test]
    fn depth_is_capped() {
        let mut tree = QuadTree::new(Rect::new(0.0, 0.0, 1024.0, 1024.0));
        for i in 0..200 {
            tree.insert(entry(i, Rect::new(0.1, 0.1, 0.01, 0.01)));
        }
        assert_eq!(tree.depth(), MAX_LEVELS);
        assert_eq!(tree.retrieve(Rect::new(0.0, 0.0, 1.0, 1.0)).len(), 200);
    }

    #[test]
    fn clear_resets_to_new_bounds() {
        let mut tree = QuadTree::new(Rect::new(0.0, 0.0, 10.0, 10.0));
        tree.insert(entry(0, Rect::new(1.0, 1.0, 1.0, 1.0)));
        tree.clear(Rect::new(0.0, 0.0, 20.0, 20.0));
        assert!(tree.is_empty());
        assert_eq!(tree.bounds(), Rect::new(0.0, 0.0, 20.0, 20.0));
        assert_eq!(tree.outline().len(), 1);
    }

    #[test]
    fn retrieve_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let bounds = Rect::new(0.0, 0.0, 1000.0, 1000.0);
        let mut tree = QuadTree::new(bounds);
        let mut all = Vec::new();
        for i in 0..400 {
            let w = rng.gen_range(1.0..60.0);
            let h = rng.gen_range(1.0..60.0);
            let r = Rect::new(rng.gen_range(0.0..1000.0 - w), rng.gen_range(0.0..1000.0 - h), w, h);
            tree.insert(entry(i, r));
            all.push(entry(i, r));
        }

        for _ in 0..200 {
            let w = rng.gen_range(5.0..300.0);
            let h = rng.gen_range(5.0..300.0);
            let area = Rect::new(rng.gen_range(-50.0..1000.0), rng.gen_range(-50.0..1000.0), w, h);

            let mut got = tree.retrieve(area);
            got.sort();
            let mut want: Vec<_> = all
                .iter()
                .filter(|e| e.aabb.overlaps(&area))
                .map(|e| e.object)
                .collect();
            want.sort();
            assert_eq!(got, want);
        }
    }
}
