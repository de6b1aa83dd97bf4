use std::collections::HashMap;

use kiddo::{KdTree, SquaredEuclidean};
use mpo3d_core::{Pt3, Real};
use nalgebra::Rotation3;

/// A point returned by a [`KdIndex`] query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    /// Position of the point in the slice the index was built from.
    pub index: usize,
    /// Euclidean distance to the query.
    pub distance: Real,
}

/// Nearest-neighbour index over a fixed set of positions.
///
/// Points are stored in a rotated frame so that clouds lying in an
/// axis-aligned plane or along image rows do not fill a tree bucket with a
/// single split value. Distances are unaffected by the rotation.
///
/// Coincident points share one tree entry. Queries expand the entry back to
/// every point at that position; [`nearest_distinct`](Self::nearest_distinct)
/// reports one representative (the lowest index) per position instead.
pub struct KdIndex {
    tree: KdTree<Real, 3>,
    frame: Rotation3<Real>,
    /// Point indices per distinct position, ascending.
    groups: Vec<Vec<usize>>,
    group_of: Vec<usize>,
}

impl KdIndex {
    pub fn new(points: &[Pt3]) -> Self {
        let frame = Rotation3::from_euler_angles(0.4637, 0.7297, 0.2914);
        let mut tree: KdTree<Real, 3> = KdTree::new();
        let mut groups: Vec<Vec<usize>> = Vec::new();
        let mut group_of = Vec::with_capacity(points.len());
        let mut by_position: HashMap<[u64; 3], usize> = HashMap::new();

        for (i, p) in points.iter().enumerate() {
            let k = key(&frame, p);
            // -0.0 and 0.0 must land in the same entry.
            let bits = k.map(|c| (c + 0.0).to_bits());
            let g = *by_position.entry(bits).or_insert_with(|| {
                tree.add(&k, groups.len() as u64);
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[g].push(i);
            group_of.push(g);
        }
        if groups.len() < points.len() {
            log::debug!(
                "indexed {} points at {} distinct positions",
                points.len(),
                groups.len()
            );
        }

        Self {
            tree,
            frame,
            groups,
            group_of,
        }
    }

    pub fn len(&self) -> usize {
        self.group_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group_of.is_empty()
    }

    /// Number of distinct positions.
    pub fn distinct_len(&self) -> usize {
        self.groups.len()
    }

    /// Lowest index of the points sharing the position of point `i`, or
    /// `None` when `i` is out of range.
    pub fn representative(&self, i: usize) -> Option<usize> {
        let g = *self.group_of.get(i)?;
        self.groups[g].first().copied()
    }

    /// The `k` points closest to `query`, nearest first. A query at an
    /// indexed position returns the points there first.
    pub fn nearest(&self, query: &Pt3, k: usize) -> Vec<Neighbor> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        // Every entry holds at least one point, so the k nearest entries
        // contain the k nearest points.
        let mut found = self.expand(self.nearest_entries(query, k), |members| members);
        found.truncate(k);
        found
    }

    /// The `k` distinct positions closest to `query`, each reported by its
    /// representative, nearest first.
    pub fn nearest_distinct(&self, query: &Pt3, k: usize) -> Vec<Neighbor> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }
        self.expand(self.nearest_entries(query, k), |members| &members[..1])
    }

    /// Every point within `radius` of `query`, nearest first.
    pub fn within(&self, query: &Pt3, radius: Real) -> Vec<Neighbor> {
        if self.is_empty() || radius.is_nan() || radius < 0.0 {
            return Vec::new();
        }
        let found = self
            .tree
            .within::<SquaredEuclidean>(&key(&self.frame, query), radius * radius)
            .into_iter()
            .map(|n| (n.item as usize, n.distance))
            .collect();
        self.expand(found, |members| members)
    }

    fn nearest_entries(&self, query: &Pt3, k: usize) -> Vec<(usize, Real)> {
        self.tree
            .nearest_n::<SquaredEuclidean>(&key(&self.frame, query), k)
            .into_iter()
            .map(|n| (n.item as usize, n.distance))
            .collect()
    }

    fn expand<'a, F>(&'a self, entries: Vec<(usize, Real)>, pick: F) -> Vec<Neighbor>
    where
        F: Fn(&'a [usize]) -> &'a [usize],
    {
        let points = entries
            .into_iter()
            .flat_map(|(g, d2)| pick(&self.groups[g]).iter().map(move |&i| (i, d2)))
            .collect();
        sorted(points)
    }
}

fn key(frame: &Rotation3<Real>, p: &Pt3) -> [Real; 3] {
    let q = frame * p.coords;
    [q.x, q.y, q.z]
}

/// Ties are broken by index so results do not depend on tree layout.
fn sorted(mut found: Vec<(usize, Real)>) -> Vec<Neighbor> {
    found.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
    found
        .into_iter()
        .map(|(index, d2)| Neighbor {
            index,
            distance: d2.sqrt(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn brute_force(points: &[Pt3], q: &Pt3, k: usize) -> Vec<usize> {
        let mut all: Vec<(usize, Real)> = points
            .iter()
            .enumerate()
            .map(|(i, p)| (i, (p - q).norm_squared()))
            .collect();
        all.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        all.into_iter().take(k).map(|(i, _)| i).collect()
    }

    #[test]
    fn nearest_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(3);
        let points: Vec<Pt3> = (0..400)
            .map(|_| {
                Pt3::new(
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                    rng.gen_range(-10.0..10.0),
                )
            })
            .collect();
        let index = KdIndex::new(&points);
        assert_eq!(index.len(), 400);

        for q in points.iter().step_by(37) {
            let got: Vec<usize> = index.nearest(q, 8).iter().map(|n| n.index).collect();
            assert_eq!(got, brute_force(&points, q, 8));
        }
    }

    #[test]
    fn within_is_sorted_and_bounded() {
        let points: Vec<Pt3> = (0..10).map(|i| Pt3::new(i as Real, 0.0, 0.0)).collect();
        let index = KdIndex::new(&points);
        let found = index.within(&Pt3::new(4.2, 0.0, 0.0), 2.0);
        let ids: Vec<usize> = found.iter().map(|n| n.index).collect();
        assert_eq!(ids, vec![4, 5, 3, 6]);
        assert!(found.windows(2).all(|w| w[0].distance <= w[1].distance));
        assert!(index.within(&Pt3::origin(), -1.0).is_empty());
    }

    #[test]
    fn flat_grids_are_indexed() {
        // Every point shares z and each column shares x.
        let points: Vec<Pt3> = (0..60)
            .flat_map(|r| (0..60).map(move |c| Pt3::new(c as Real, r as Real, 500.0)))
            .collect();
        let index = KdIndex::new(&points);
        let found = index.nearest(&Pt3::new(30.0, 30.0, 500.0), 5);
        assert_eq!(found[0].index, 30 * 60 + 30);
        assert_eq!(found[0].distance, 0.0);
        assert!(found[1..].iter().all(|n| (n.distance - 1.0).abs() < 1e-9));
    }

    #[test]
    fn coincident_points_share_an_entry() {
        // More copies of one position than fit in a tree bucket.
        let mut points = vec![Pt3::new(1.0, 2.0, 3.0); 40];
        points.push(Pt3::new(1.0, 2.0, 4.0));
        points.push(Pt3::new(-0.0, 0.0, 0.0));
        points.push(Pt3::new(0.0, -0.0, 0.0));
        let index = KdIndex::new(&points);
        assert_eq!(index.len(), 43);
        assert_eq!(index.distinct_len(), 3);
        assert_eq!(index.representative(17), Some(0));
        assert_eq!(index.representative(42), Some(41));
        assert_eq!(index.representative(43), None);

        let all = index.nearest(&Pt3::new(1.0, 2.0, 3.0), 41);
        assert_eq!(all.len(), 41);
        assert!(all[..40].iter().all(|n| n.distance == 0.0));
        assert_eq!(all[40].index, 40);

        let distinct: Vec<usize> = index
            .nearest_distinct(&Pt3::new(1.0, 2.0, 3.0), 5)
            .iter()
            .map(|n| n.index)
            .collect();
        assert_eq!(distinct, vec![0, 40, 41]);
        assert_eq!(index.within(&Pt3::new(1.0, 2.0, 3.5), 0.6).len(), 41);
    }

    #[test]
    fn empty_index_answers_nothing() {
        let index = KdIndex::new(&[]);
        assert!(index.is_empty());
        assert!(index.nearest(&Pt3::origin(), 3).is_empty());
    }
}
