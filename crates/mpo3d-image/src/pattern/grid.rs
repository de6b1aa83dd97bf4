//! Assigning an unordered point set to the cells of a regular grid.

use mpo3d_core::{Pt2, Real, Vec2};
use mpo3d_linear::{apply_homography, dlt_homography};

/// Largest distance (in grid cells) between a mapped point and its cell.
const CELL_TOLERANCE: Real = 0.3;

fn cross(o: &Vec2, a: &Vec2, b: &Vec2) -> Real {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// Convex hull (Andrew's monotone chain) as indices into `points`, without
/// collinear vertices.
pub(crate) fn convex_hull(points: &[Vec2]) -> Vec<usize> {
    let mut idx: Vec<usize> = (0..points.len()).collect();
    idx.sort_by(|&a, &b| {
        points[a]
            .x
            .total_cmp(&points[b].x)
            .then(points[a].y.total_cmp(&points[b].y))
    });
    if idx.len() < 3 {
        return idx;
    }

    let mut hull: Vec<usize> = Vec::with_capacity(2 * idx.len());
    for pass in 0..2 {
        let start = hull.len();
        let order: Box<dyn Iterator<Item = &usize>> = if pass == 0 {
            Box::new(idx.iter())
        } else {
            Box::new(idx.iter().rev())
        };
        for &i in order {
            while hull.len() >= start + 2
                && cross(
                    &points[hull[hull.len() - 2]],
                    &points[hull[hull.len() - 1]],
                    &points[i],
                ) <= 0.0
            {
                hull.pop();
            }
            hull.push(i);
        }
        hull.pop();
    }
    hull
}

fn quad_area(q: [&Vec2; 4]) -> Real {
    let mut s = 0.0;
    for i in 0..4 {
        let a = q[i];
        let b = q[(i + 1) % 4];
        s += a.x * b.y - b.x * a.y;
    }
    0.5 * s.abs()
}

/// The four hull vertices spanning the largest quadrilateral, in hull order.
fn outer_quad(points: &[Vec2], hull: &[usize]) -> Option<[usize; 4]> {
    let h = hull.len();
    if h < 4 {
        return None;
    }
    let mut best: Option<([usize; 4], Real)> = None;
    for a in 0..h {
        for b in a + 1..h {
            for c in b + 1..h {
                for d in c + 1..h {
                    let q = [hull[a], hull[b], hull[c], hull[d]];
                    let area = quad_area(q.map(|i| &points[i]));
                    if best.map_or(true, |(_, s)| area > s) {
                        best = Some((q, area));
                    }
                }
            }
        }
    }
    best.map(|(q, _)| q)
}

/// Try mapping `points` onto the grid with the given image corners for grid
/// cells (0,0), (cols-1,0), (cols-1,rows-1), (0,rows-1).
fn assign(points: &[Vec2], corners: [Vec2; 4], rows: usize, cols: usize) -> Option<Vec<Vec2>> {
    let (cw, rh) = ((cols - 1) as Real, (rows - 1) as Real);
    let grid = [
        Pt2::new(0.0, 0.0),
        Pt2::new(cw, 0.0),
        Pt2::new(cw, rh),
        Pt2::new(0.0, rh),
    ];
    let image = corners.map(|c| Pt2::new(c.x, c.y));
    let h = dlt_homography(&grid, &image).ok()?;
    let h_inv = h.try_inverse()?;

    let mut cells: Vec<Option<Vec2>> = vec![None; rows * cols];
    for p in points {
        let g = apply_homography(&h_inv, &Pt2::new(p.x, p.y));
        let (u, v) = (g.x.round(), g.y.round());
        if (g.x - u).abs() > CELL_TOLERANCE || (g.y - v).abs() > CELL_TOLERANCE {
            return None;
        }
        if u < 0.0 || v < 0.0 || u > cw || v > rh {
            return None;
        }
        let slot = &mut cells[v as usize * cols + u as usize];
        if slot.is_some() {
            return None;
        }
        *slot = Some(*p);
    }
    cells.into_iter().collect()
}

/// Order `points` into a `rows x cols` grid, row-major.
///
/// The outer corners are the hull quadrilateral of maximal area; every corner
/// assignment that maps all points onto distinct cells without mirroring is a
/// candidate, and the one whose first point is nearest the image origin wins.
pub(crate) fn order_grid(points: &[Vec2], rows: usize, cols: usize) -> Option<Vec<Vec2>> {
    if rows < 2 || cols < 2 || points.len() != rows * cols {
        return None;
    }
    let hull = convex_hull(points);
    let quad = outer_quad(points, &hull)?.map(|i| points[i]);

    let mut best: Option<(Vec<Vec2>, Real)> = None;
    for start in 0..4 {
        for reverse in [false, true] {
            let corners: [Vec2; 4] = std::array::from_fn(|i| {
                let k = if reverse { start + 4 - i } else { start + i };
                quad[k % 4]
            });
            let ex = corners[1] - corners[0];
            let ey = corners[3] - corners[0];
            if ex.x * ey.y - ex.y * ey.x <= 0.0 {
                continue;
            }
            if let Some(ordered) = assign(points, corners, rows, cols) {
                let d = ordered[0].norm_squared();
                if best.as_ref().map_or(true, |(_, bd)| d < *bd) {
                    best = Some((ordered, d));
                }
            }
        }
    }
    best.map(|(o, _)| o)
}
