//! Inner-corner detection on a chessboard.
//!
//! Corners are saddle points of the smoothed intensity surface. Candidates
//! are the local maxima of `Ixy² - Ixx·Iyy` that also show the alternating
//! dark/light pattern of an X-junction on a surrounding ring. The search runs
//! over several smoothing scales and contrast thresholds and stops at the
//! first candidate set that orders into the requested grid.

use mpo3d_core::Vec2;

use super::grid::order_grid;
use super::subpix::{refine_corners, SubPixCriteria};
use crate::float::{gray_f32, normalize, sample_bilinear, GrayF32};
use crate::ImageBuffer;

const SIGMAS: [f32; 3] = [1.0, 2.0, 3.5];
const MIN_CONTRASTS: [f32; 3] = [60.0, 30.0, 12.0];
const RING_SAMPLES: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Candidate {
    pos: Vec2,
    response: f32,
    contrast: f32,
}

fn saddle_response(img: &GrayF32, margin: usize) -> Vec<f32> {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let d = img.as_raw();
    let mut out = vec![0.0f32; w * h];
    if w <= 2 * margin || h <= 2 * margin {
        return out;
    }
    for y in margin..h - margin {
        for x in margin..w - margin {
            let i = y * w + x;
            let ixx = d[i + 1] - 2.0 * d[i] + d[i - 1];
            let iyy = d[i + w] - 2.0 * d[i] + d[i - w];
            let ixy = (d[i + w + 1] - d[i + w - 1] - d[i - w + 1] + d[i - w - 1]) * 0.25;
            out[i] = ixy * ixy - ixx * iyy;
        }
    }
    out
}

/// Strict local maxima within `radius`; ties go to the first pixel in raster order.
fn local_maxima(resp: &[f32], w: usize, h: usize, radius: usize) -> Vec<(usize, usize, f32)> {
    let mut out = Vec::new();
    for y in radius..h.saturating_sub(radius) {
        'px: for x in radius..w.saturating_sub(radius) {
            let v = resp[y * w + x];
            if v <= 0.0 {
                continue;
            }
            for ny in y - radius..=y + radius {
                for nx in x - radius..=x + radius {
                    let n = resp[ny * w + nx];
                    let earlier = (ny, nx) < (y, x);
                    if n > v || (earlier && n == v) {
                        continue 'px;
                    }
                }
            }
            out.push((x, y, v));
        }
    }
    out
}

/// Number of dark/light transitions on a ring around `c`, and the ring contrast.
fn ring_profile(img: &GrayF32, c: Vec2, radius: f64) -> (usize, f32) {
    let samples: Vec<f32> = (0..RING_SAMPLES)
        .map(|k| {
            let a = k as f64 * std::f64::consts::TAU / RING_SAMPLES as f64;
            sample_bilinear(img, c.x + radius * a.cos(), c.y + radius * a.sin())
        })
        .collect();
    let (lo, hi) = samples
        .iter()
        .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let mid = 0.5 * (lo + hi);
    let signs: Vec<bool> = samples.iter().map(|&v| v > mid).collect();
    let transitions = (0..RING_SAMPLES)
        .filter(|&k| signs[k] != signs[(k + 1) % RING_SAMPLES])
        .count();
    (transitions, hi - lo)
}

fn candidates(blurred: &GrayF32, sigma: f32) -> Vec<Candidate> {
    let ring = f64::from((2.0 * sigma + 2.0).round());
    let margin = ring.ceil() as usize + 1;
    let (w, h) = (blurred.width() as usize, blurred.height() as usize);
    let resp = saddle_response(blurred, margin);

    let mut out: Vec<Candidate> = local_maxima(&resp, w, h, margin)
        .into_iter()
        .filter_map(|(x, y, response)| {
            let pos = Vec2::new(x as f64, y as f64);
            let (transitions, contrast) = ring_profile(blurred, pos, ring);
            (transitions == 4).then_some(Candidate {
                pos,
                response,
                contrast,
            })
        })
        .collect();
    out.sort_by(|a, b| b.response.total_cmp(&a.response));
    out
}

/// Detect the `rows x cols` inner corners, ordered row-major and refined to
/// sub-pixel precision.
pub(crate) fn find_chessboard_corners(
    img: &ImageBuffer,
    rows: usize,
    cols: usize,
) -> Option<Vec<Vec2>> {
    let gray = gray_f32(img).ok()?;
    let mut norm = gray.clone();
    normalize(&mut norm);
    let n = rows * cols;

    for sigma in SIGMAS {
        let blurred = imageproc::filter::gaussian_blur_f32(&norm, sigma);
        let found = candidates(&blurred, sigma);
        log::debug!("chessboard: sigma {sigma}, {} saddle candidates", found.len());

        for min_contrast in MIN_CONTRASTS {
            let strong: Vec<Vec2> = found
                .iter()
                .filter(|c| c.contrast >= min_contrast)
                .take(n)
                .map(|c| c.pos)
                .collect();
            if strong.len() < n {
                continue;
            }
            if let Some(mut corners) = order_grid(&strong, rows, cols) {
                refine_corners(&gray, &mut corners, &SubPixCriteria::default());
                log::debug!("chessboard: found at sigma {sigma}, contrast >= {min_contrast}");
                return Some(corners);
            }
        }
    }
    None
}
