//! Clustering of raw per-window hits into reported objects.

use serde::{Deserialize, Serialize};

use crate::geometry::Rect;

/// User label attached to a cascade and to every object it finds.
pub type Tag = i32;

/// A detected object in image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Object {
    pub rect: Rect,
    /// Number of raw hits merged into this object.
    pub weight: usize,
    pub tag: Tag,
}

impl Object {
    pub fn new(rect: Rect, weight: usize, tag: Tag) -> Self {
        Self { rect, weight, tag }
    }
}

/// `true` when every edge of `a` is within `delta` of the same edge of `b`,
/// with `delta = size_difference_max * (min width + min height) / 2`.
pub fn similar(a: &Rect, b: &Rect, size_difference_max: f64) -> bool {
    let delta = size_difference_max
        * (a.width().min(b.width()) + a.height().min(b.height())) as f64
        * 0.5;
    let close = |x: usize, y: usize| x.abs_diff(y) as f64 <= delta;
    close(a.left, b.left) && close(a.top, b.top) && close(a.right, b.right) && close(a.bottom, b.bottom)
}

/// Disjoint-set forest with union by rank and path compression.
#[derive(Debug)]
struct Partition {
    parent: Vec<usize>,
    rank: Vec<u32>,
}

impl Partition {
    fn new(len: usize) -> Self {
        Self {
            parent: (0..len).collect(),
            rank: vec![0; len],
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[i] != root {
            let next = self.parent[i];
            self.parent[i] = root;
            i = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (a, b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        match self.rank[a].cmp(&self.rank[b]) {
            std::cmp::Ordering::Greater => self.parent[b] = a,
            std::cmp::Ordering::Less => self.parent[a] = b,
            std::cmp::Ordering::Equal => {
                self.parent[a] = b;
                self.rank[b] += 1;
            }
        }
    }
}

/// Labels `rects` into equivalence classes of the transitive closure of
/// [`similar`]. Returns one label per rectangle, numbered in order of first
/// appearance, and the number of classes.
pub fn partition(rects: &[Rect], size_difference_max: f64) -> (Vec<usize>, usize) {
    let mut sets = Partition::new(rects.len());
    for i in 0..rects.len() {
        for j in 0..i {
            if similar(&rects[i], &rects[j], size_difference_max) {
                sets.union(i, j);
            }
        }
    }

    let mut class_of_root = vec![usize::MAX; rects.len()];
    let mut classes = 0;
    let labels = (0..rects.len())
        .map(|i| {
            let root = sets.find(i);
            if class_of_root[root] == usize::MAX {
                class_of_root[root] = classes;
                classes += 1;
            }
            class_of_root[root]
        })
        .collect();
    (labels, classes)
}

/// Merges raw hits of one tag into objects.
///
/// Hits are clustered with [`partition`] and averaged. Clusters lighter than
/// `group_size_min` are dropped, as is a cluster lying inside a heavier one.
/// Nothing is reported when `group_size_min` is zero or there are fewer hits
/// than it.
pub fn group_objects(candidates: &[Object], group_size_min: usize, size_difference_max: f64) -> Vec<Object> {
    if group_size_min == 0 || candidates.len() < group_size_min {
        return Vec::new();
    }

    let rects: Vec<Rect> = candidates.iter().map(|c| c.rect).collect();
    let (labels, classes) = partition(&rects, size_difference_max);

    let mut sums = vec![[0usize; 4]; classes];
    let mut clusters = vec![Object::new(Rect::default(), 0, 0); classes];
    for (candidate, &label) in candidates.iter().zip(&labels) {
        let r = candidate.rect;
        for (s, v) in sums[label].iter_mut().zip([r.left, r.top, r.right, r.bottom]) {
            *s += v;
        }
        clusters[label].weight += 1;
        clusters[label].tag = candidate.tag;
    }
    for (cluster, sum) in clusters.iter_mut().zip(&sums) {
        let n = cluster.weight as f64;
        let avg = |v: usize| (v as f64 / n).round() as usize;
        cluster.rect = Rect::new(avg(sum[0]), avg(sum[1]), avg(sum[2]), avg(sum[3]));
    }

    let nested = |i: usize, j: usize| {
        let (r1, n1) = (clusters[i].rect, clusters[i].weight);
        let (r2, n2) = (clusters[j].rect, clusters[j].weight);
        let dx = (r2.width() as f64 * size_difference_max).round() as isize;
        let dy = (r2.height() as f64 * size_difference_max).round() as isize;
        let signed = |v: usize| v as isize;
        (n2 > n1.max(3) || n1 < 3)
            && signed(r1.left) >= signed(r2.left) - dx
            && signed(r1.top) >= signed(r2.top) - dy
            && signed(r1.right) <= signed(r2.right) + dx
            && signed(r1.bottom) <= signed(r2.bottom) + dy
    };

    (0..classes)
        .filter(|&i| clusters[i].weight >= group_size_min)
        .filter(|&i| {
            !(0..classes).any(|j| j != i && clusters[j].weight >= group_size_min && nested(i, j))
        })
        .map(|i| clusters[i])
        .collect()
}
