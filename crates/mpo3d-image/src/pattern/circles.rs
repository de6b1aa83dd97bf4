//! Symmetric circle-grid detection.
//!
//! Dark blobs are collected over a sweep of binarisation thresholds and
//! merged when they reappear at the same place. The blobs are then clustered
//! by spacing until a cluster of exactly `rows * cols` members orders into the
//! requested grid.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use mpo3d_core::Vec2;

use super::grid::order_grid;
use crate::ImageBuffer;

const MIN_THRESHOLD: u8 = 50;
const MAX_THRESHOLD: u8 = 220;
const THRESHOLD_STEP: usize = 10;
const MIN_AREA: f64 = 25.0;
const MAX_AREA: f64 = 5000.0;
const MIN_INERTIA_RATIO: f64 = 0.1;
const MIN_FILL_RATIO: f64 = 0.5;
const MIN_REPEATABILITY: usize = 2;
const LINK_FACTORS: [f64; 4] = [1.25, 1.5, 2.0, 2.5];

#[derive(Debug, Clone, Copy)]
pub(crate) struct Blob {
    pub center: Vec2,
    pub radius: f64,
}

#[derive(Debug, Clone, Copy, Default)]
struct Moments {
    m00: f64,
    m10: f64,
    m01: f64,
    m20: f64,
    m11: f64,
    m02: f64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

impl Moments {
    fn add(&mut self, x: u32, y: u32) {
        if self.m00 == 0.0 {
            (self.min_x, self.min_y, self.max_x, self.max_y) = (x, y, x, y);
        }
        let (fx, fy) = (f64::from(x), f64::from(y));
        self.m00 += 1.0;
        self.m10 += fx;
        self.m01 += fy;
        self.m20 += fx * fx;
        self.m11 += fx * fy;
        self.m02 += fy * fy;
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn blob(&self, width: u32, height: u32) -> Option<Blob> {
        let area = self.m00;
        if !(MIN_AREA..=MAX_AREA).contains(&area) {
            return None;
        }
        if self.min_x == 0 || self.min_y == 0 || self.max_x + 1 >= width || self.max_y + 1 >= height
        {
            return None;
        }
        let box_area =
            f64::from(self.max_x - self.min_x + 1) * f64::from(self.max_y - self.min_y + 1);
        if area / box_area < MIN_FILL_RATIO {
            return None;
        }

        let cx = self.m10 / area;
        let cy = self.m01 / area;
        let mu20 = self.m20 / area - cx * cx;
        let mu02 = self.m02 / area - cy * cy;
        let mu11 = self.m11 / area - cx * cy;
        let half_sum = 0.5 * (mu20 + mu02);
        let root = (0.25 * (mu20 - mu02).powi(2) + mu11 * mu11).sqrt();
        let (l_max, l_min) = (half_sum + root, half_sum - root);
        if l_max <= 0.0 || l_min / l_max < MIN_INERTIA_RATIO {
            return None;
        }

        Some(Blob {
            center: Vec2::new(cx, cy),
            radius: (area / std::f64::consts::PI).sqrt(),
        })
    }
}

fn blobs_at_threshold(gray: &GrayImage, threshold: u8) -> Vec<Blob> {
    let (w, h) = gray.dimensions();
    let mask = GrayImage::from_fn(w, h, |x, y| {
        Luma([if gray.get_pixel(x, y)[0] < threshold {
            255
        } else {
            0
        }])
    });
    let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

    let mut moments: Vec<Moments> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let l = label[0] as usize;
        if l == 0 {
            continue;
        }
        if moments.len() <= l {
            moments.resize(l + 1, Moments::default());
        }
        moments[l].add(x, y);
    }
    moments
        .iter()
        .filter(|m| m.m00 > 0.0)
        .filter_map(|m| m.blob(w, h))
        .collect()
}

/// Dark, roughly round blobs stable across at least two thresholds.
pub(crate) fn detect_blobs(gray: &GrayImage) -> Vec<Blob> {
    // Each group keeps every sighting of one blob.
    let mut groups: Vec<Vec<Blob>> = Vec::new();
    for t in (MIN_THRESHOLD..MAX_THRESHOLD).step_by(THRESHOLD_STEP) {
        let found = blobs_at_threshold(gray, t);
        let mut new_groups = Vec::new();
        for blob in found {
            let hit = groups.iter_mut().find(|g| {
                g.last().is_some_and(|last| {
                    (last.center - blob.center).norm() < last.radius.max(blob.radius)
                })
            });
            match hit {
                Some(g) => g.push(blob),
                None => new_groups.push(vec![blob]),
            }
        }
        groups.extend(new_groups);
    }

    groups
        .into_iter()
        .filter(|g| g.len() >= MIN_REPEATABILITY)
        .map(|g| {
            let n = g.len() as f64;
            let center = g.iter().map(|b| b.center).sum::<Vec2>() / n;
            let mut radii: Vec<f64> = g.iter().map(|b| b.radius).collect();
            radii.sort_by(f64::total_cmp);
            Blob {
                center,
                radius: radii[radii.len() / 2],
            }
        })
        .collect()
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

/// Clusters of blobs linked by similar size and spacing below `link`.
fn clusters(blobs: &[Blob], link: f64) -> Vec<Vec<usize>> {
    let n = blobs.len();
    let mut parent: Vec<usize> = (0..n).collect();
    for i in 0..n {
        for j in i + 1..n {
            let (a, b) = (&blobs[i], &blobs[j]);
            let ratio = a.radius / b.radius;
            if (a.center - b.center).norm() <= link && (0.5..=2.0).contains(&ratio) {
                let (ri, rj) = (find(&mut parent, i), find(&mut parent, j));
                if ri != rj {
                    parent[rj.max(ri)] = ri.min(rj);
                }
            }
        }
    }
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); n];
    for i in 0..n {
        let r = find(&mut parent, i);
        groups[r].push(i);
    }
    groups.retain(|g| !g.is_empty());
    groups
}

fn median_neighbour_distance(blobs: &[Blob]) -> Option<f64> {
    let mut nn: Vec<f64> = blobs
        .iter()
        .enumerate()
        .filter_map(|(i, a)| {
            blobs
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, b)| (a.center - b.center).norm())
                .min_by(f64::total_cmp)
        })
        .collect();
    if nn.is_empty() {
        return None;
    }
    nn.sort_by(f64::total_cmp);
    Some(nn[nn.len() / 2])
}

/// Detect the `rows x cols` circle centres, ordered row-major.
pub(crate) fn find_circle_grid_centers(
    img: &ImageBuffer,
    rows: usize,
    cols: usize,
) -> Option<Vec<Vec2>> {
    let gray = img.to_gray_image().ok()?;
    let blobs = detect_blobs(&gray);
    let n = rows * cols;
    log::debug!("circle grid: {} blobs", blobs.len());
    if blobs.len() < n {
        return None;
    }
    if blobs.len() == n {
        let centers: Vec<Vec2> = blobs.iter().map(|b| b.center).collect();
        if let Some(ordered) = order_grid(&centers, rows, cols) {
            return Some(ordered);
        }
    }

    let spacing = median_neighbour_distance(&blobs)?;
    for factor in LINK_FACTORS {
        for cluster in clusters(&blobs, factor * spacing) {
            if cluster.len() != n {
                continue;
            }
            let centers: Vec<Vec2> = cluster.iter().map(|&i| blobs[i].center).collect();
            if let Some(ordered) = order_grid(&centers, rows, cols) {
                log::debug!("circle grid: clustered with link {:.1}", factor * spacing);
                return Some(ordered);
            }
        }
    }
    None
}
