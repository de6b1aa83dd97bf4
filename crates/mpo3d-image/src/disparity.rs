//! Dense disparity by semi-global block matching.
//!
//! Matching cost per pixel is a Birchfield–Tomasi dissimilarity on a clipped
//! horizontal Sobel response plus a quarter-weighted dissimilarity on raw
//! intensities, summed over channels and aggregated over a square block. The
//! block costs are smoothed along 8 (full) or 5 (standard) scanline paths with
//! penalties `P1` for a disparity step of one and `P2` for larger jumps. The
//! winner then goes through a uniqueness test, parabolic sub-pixel
//! interpolation, a left-right consistency check and speckle removal.
//!
//! Two volumes of `width * height * num_disparities` cells are live at
//! once: 16-bit block costs and 32-bit path sums.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::{ImageBuffer, ImageError, PixelFormat};

/// Scanline directions used for cost aggregation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SgbmMode {
    /// Five directions: left, right, up and the two upper diagonals.
    Standard,
    /// All eight directions.
    #[default]
    Full,
}

impl SgbmMode {
    /// Path directions `r`; the predecessor of pixel `p` is `p - r`.
    fn directions(self) -> &'static [(i64, i64)] {
        match self {
            SgbmMode::Standard => &[(1, 0), (-1, 0), (0, 1), (1, 1), (-1, 1)],
            SgbmMode::Full => &[
                (1, 0),
                (-1, 0),
                (0, 1),
                (0, -1),
                (1, 1),
                (-1, 1),
                (1, -1),
                (-1, -1),
            ],
        }
    }
}

/// Semi-global block matching parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SgbmParams {
    /// Smallest disparity searched.
    pub min_disparity: i32,
    /// Number of disparities searched; `None` derives it from the image width
    /// as `width / 8` rounded up to a multiple of 16.
    pub num_disparities: Option<usize>,
    /// Matching block side (odd).
    pub block_size: usize,
    /// Penalty for a disparity change of one between neighbours; `None`
    /// means `8 * channels * block_size²`.
    pub p1: Option<u32>,
    /// Penalty for larger disparity changes; `None` means
    /// `32 * channels * block_size²`. Raised to `p1 + 1` if smaller.
    pub p2: Option<u32>,
    /// Largest allowed left-right disagreement in whole pixels; negative
    /// disables the check.
    pub disp12_max_diff: i32,
    /// Clip of the Sobel pre-filter response.
    pub pre_filter_cap: i32,
    /// Margin in percent by which the best cost must beat the runner-up.
    pub uniqueness_ratio: u32,
    /// Connected regions of at most this many pixels are discarded; 0
    /// disables speckle filtering.
    pub speckle_window_size: usize,
    /// Largest disparity difference inside one speckle region.
    pub speckle_range: f32,
    pub mode: SgbmMode,
}

impl Default for SgbmParams {
    fn default() -> Self {
        Self {
            min_disparity: 0,
            num_disparities: None,
            block_size: 3,
            p1: None,
            p2: None,
            disp12_max_diff: 1,
            pre_filter_cap: 63,
            uniqueness_ratio: 10,
            speckle_window_size: 100,
            speckle_range: 32.0,
            mode: SgbmMode::Full,
        }
    }
}

impl SgbmParams {
    /// Disparity range for an image `width` pixels wide.
    pub fn num_disparities_for(&self, width: usize) -> usize {
        let n = self.num_disparities.unwrap_or(((width / 8) + 15) & !15);
        n.max(16).next_multiple_of(16)
    }

    /// Smoothness penalties `(P1, P2)` for images with `channels` channels.
    pub fn penalties(&self, channels: usize) -> (u32, u32) {
        let area = (channels * self.block_size * self.block_size) as u32;
        let p1 = self.p1.unwrap_or(8 * area);
        let p2 = self.p2.unwrap_or(32 * area).max(p1 + 1);
        (p1, p2)
    }
}

/// Floating-point disparity map aligned with the left image.
///
/// Invalid pixels hold `min_disparity - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct DisparityMap {
    width: usize,
    height: usize,
    min_disparity: i32,
    num_disparities: usize,
    data: Vec<f32>,
}

impl DisparityMap {
    /// Wrap precomputed disparities, row-major.
    pub fn from_raw(
        width: usize,
        height: usize,
        min_disparity: i32,
        num_disparities: usize,
        data: Vec<f32>,
    ) -> Result<Self, ImageError> {
        if data.len() != width * height {
            return Err(ImageError::MapSize {
                width,
                height,
                len: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            min_disparity,
            num_disparities,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn min_disparity(&self) -> i32 {
        self.min_disparity
    }

    pub fn num_disparities(&self) -> usize {
        self.num_disparities
    }

    /// Marker stored at pixels without a disparity.
    pub fn invalid_value(&self) -> f32 {
        (self.min_disparity - 1) as f32
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.get(x, y) > self.invalid_value()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// 8-bit rendering scaled by `255 / num_disparities`; invalid pixels are black.
    pub fn visualize(&self) -> ImageBuffer {
        let scale = 255.0 / self.num_disparities as f32;
        ImageBuffer::from_fn(self.width, self.height, PixelFormat::Gray, |x, y| {
            let v = (self.get(x, y) * scale).round().clamp(0.0, 255.0) as u8;
            [v, v, v]
        })
    }
}

/// Per-channel planes of the raw image and of its clipped Sobel response.
struct Planes {
    raw: Vec<Vec<i32>>,
    sobel: Vec<Vec<i32>>,
}

fn planes(img: &ImageBuffer, cap: i32) -> Planes {
    let (w, h, ch) = (img.width(), img.height(), img.channels());
    let data = img.data();
    let raw: Vec<Vec<i32>> = (0..ch)
        .map(|c| data.iter().skip(c).step_by(ch).map(|&v| i32::from(v)).collect())
        .collect();
    let sobel = raw
        .iter()
        .map(|plane| {
            let at = |x: i64, y: i64| {
                let xc = x.clamp(0, w as i64 - 1) as usize;
                let yc = y.clamp(0, h as i64 - 1) as usize;
                plane[yc * w + xc]
            };
            let mut out = Vec::with_capacity(w * h);
            for y in 0..h as i64 {
                for x in 0..w as i64 {
                    let d = (at(x + 1, y - 1) + 2 * at(x + 1, y) + at(x + 1, y + 1))
                        - (at(x - 1, y - 1) + 2 * at(x - 1, y) + at(x - 1, y + 1));
                    out.push(d.clamp(-cap, cap) + cap);
                }
            }
            out
        })
        .collect();
    Planes { raw, sobel }
}

/// Row-wise (min, max) of each value and its half-way neighbours, doubled.
fn half_range(row: &[i32]) -> Vec<(i32, i32)> {
    let n = row.len();
    (0..n)
        .map(|x| {
            let v = 2 * row[x];
            let l = row[x] + row[x.saturating_sub(1)];
            let r = row[x] + row[(x + 1).min(n - 1)];
            (v.min(l).min(r), v.max(l).max(r))
        })
        .collect()
}

/// Birchfield–Tomasi dissimilarity on doubled values.
#[inline]
fn bt(lv: i32, lr: (i32, i32), rv: i32, rr: (i32, i32)) -> i32 {
    let c1 = 0.max(rv - lr.1).max(lr.0 - rv);
    let c2 = 0.max(lv - rr.1).max(rr.0 - lv);
    c1.min(c2)
}

struct Volume {
    w: usize,
    h: usize,
    nd: usize,
}

impl Volume {
    #[inline]
    fn index(&self, x: usize, y: usize) -> usize {
        (y * self.w + x) * self.nd
    }
}

fn pixel_costs(left: &Planes, right: &Planes, vol: &Volume, min_d: i32, cap: i32) -> Vec<u16> {
    let (w, h, nd) = (vol.w, vol.h, vol.nd);
    let channels = left.raw.len() as i32;
    let out_of_range = (channels * (2 * cap + 64)).clamp(0, i32::from(u16::MAX)) as u16;
    let mut cost = vec![out_of_range; w * h * nd];

    for y in 0..h {
        let row = y * w..(y + 1) * w;
        let mut terms = Vec::with_capacity(4 * left.raw.len());
        for (planes_l, planes_r, shift) in [(&left.sobel, &right.sobel, 0), (&left.raw, &right.raw, 2)]
        {
            for (pl, pr) in planes_l.iter().zip(planes_r) {
                let l = &pl[row.clone()];
                let r = &pr[row.clone()];
                terms.push((l, half_range(l), r, half_range(r), shift));
            }
        }

        for x in 0..w {
            let base = vol.index(x, y);
            for d in 0..nd {
                let xr = x as i64 - (d as i64 + i64::from(min_d));
                if xr < 0 || xr >= w as i64 {
                    continue;
                }
                let xr = xr as usize;
                let mut c = 0i32;
                for (l, lrange, r, rrange, shift) in &terms {
                    // Halve the doubled dissimilarity, then apply the term weight.
                    c += (bt(2 * l[x], lrange[x], 2 * r[xr], rrange[xr]) / 2) >> shift;
                }
                cost[base + d] = c.clamp(0, i32::from(u16::MAX)) as u16;
            }
        }
    }
    cost
}

/// Replace every cost by its sum over a `block x block` window with clamped
/// borders.
///
/// Works in place: horizontal sums are cached for the `block` rows of the
/// current window, and a row is summed before the output reaches it.
fn aggregate_block(cost: &mut [u16], vol: &Volume, block: usize) {
    let (w, h, nd) = (vol.w, vol.h, vol.nd);
    let r = block / 2;
    if r == 0 {
        return;
    }
    let row_len = w * nd;
    let mut cached: Vec<Option<usize>> = vec![None; block];
    let mut sums = vec![0u32; block * row_len];
    let mut acc = vec![0u32; row_len];

    for y in 0..h {
        acc.fill(0);
        for dy in 0..block {
            let src = (y + dy).saturating_sub(r).min(h - 1);
            let slot = src % block;
            let slot_sums = &mut sums[slot * row_len..(slot + 1) * row_len];
            if cached[slot] != Some(src) {
                horizontal_sums(&cost[src * row_len..(src + 1) * row_len], slot_sums, nd, r);
                cached[slot] = Some(src);
            }
            for (a, v) in acc.iter_mut().zip(slot_sums.iter()) {
                *a += v;
            }
        }
        for (c, a) in cost[y * row_len..(y + 1) * row_len].iter_mut().zip(&acc) {
            *c = (*a).min(u32::from(u16::MAX)) as u16;
        }
    }
}

fn horizontal_sums(row: &[u16], out: &mut [u32], nd: usize, r: usize) {
    let w = row.len() / nd;
    out.fill(0);
    for x in 0..w {
        let dst = x * nd;
        for dx in 0..=2 * r {
            let src = (x + dx).saturating_sub(r).min(w - 1) * nd;
            for d in 0..nd {
                out[dst + d] += u32::from(row[src + d]);
            }
        }
    }
}

/// Add the path costs `L_r` for direction `(dx, dy)` into `sum`.
fn accumulate_path(
    cost: &[u16],
    sum: &mut [u32],
    vol: &Volume,
    dx: i64,
    dy: i64,
    p1: u32,
    p2: u32,
) {
    let (w, h, nd) = (vol.w, vol.h, vol.nd);
    let mut prev_row = vec![0u32; w * nd];
    let mut cur_row = vec![0u32; w * nd];
    let mut pred = vec![0u32; nd];
    let mut has_prev_row = false;

    let rows: Vec<usize> = if dy < 0 {
        (0..h).rev().collect()
    } else {
        (0..h).collect()
    };
    let cols: Vec<usize> = if dx < 0 {
        (0..w).rev().collect()
    } else {
        (0..w).collect()
    };

    for &y in &rows {
        for &x in &cols {
            let px = x as i64 - dx;
            let in_range = px >= 0 && px < w as i64;
            let source = match (dy != 0, in_range) {
                (true, true) if has_prev_row => Some(&prev_row),
                (false, true) => Some(&cur_row),
                _ => None,
            };
            let have_pred = match source {
                Some(buf) => {
                    let p = px as usize * nd;
                    pred.copy_from_slice(&buf[p..p + nd]);
                    true
                }
                None => false,
            };

            let base = vol.index(x, y);
            let c = &cost[base..base + nd];
            let out = &mut cur_row[x * nd..(x + 1) * nd];
            if have_pred {
                let min_prev = pred.iter().copied().min().unwrap_or(0);
                for d in 0..nd {
                    let mut best = pred[d];
                    if d > 0 {
                        best = best.min(pred[d - 1] + p1);
                    }
                    if d + 1 < nd {
                        best = best.min(pred[d + 1] + p1);
                    }
                    best = best.min(min_prev + p2);
                    out[d] = u32::from(c[d]) + best - min_prev;
                }
            } else {
                for d in 0..nd {
                    out[d] = u32::from(c[d]);
                }
            }
            for d in 0..nd {
                sum[base + d] += out[d];
            }
        }
        std::mem::swap(&mut prev_row, &mut cur_row);
        has_prev_row = true;
    }
}

/// Winner-take-all with uniqueness, sub-pixel refinement and the left-right check.
fn select_disparities(sum: &[u32], vol: &Volume, params: &SgbmParams, invalid: f32) -> Vec<f32> {
    let (w, h, nd) = (vol.w, vol.h, vol.nd);
    let min_d = params.min_disparity;
    let uniq = u64::from(100u32.saturating_sub(params.uniqueness_ratio));
    let mut disp = vec![invalid; w * h];
    let mut disp2 = vec![i32::MIN; w];
    let mut disp2_cost = vec![u32::MAX; w];

    for y in 0..h {
        disp2.fill(i32::MIN);
        disp2_cost.fill(u32::MAX);
        let row = &mut disp[y * w..(y + 1) * w];

        for (x, out) in row.iter_mut().enumerate() {
            let base = vol.index(x, y);
            let s = &sum[base..base + nd];
            let (best, min_s) = s
                .iter()
                .copied()
                .enumerate()
                .fold((0, u32::MAX), |acc, (d, v)| if v < acc.1 { (d, v) } else { acc });

            let xr = x as i64 - (best as i64 + i64::from(min_d));
            if xr >= 0 && xr < w as i64 && min_s < disp2_cost[xr as usize] {
                disp2_cost[xr as usize] = min_s;
                disp2[xr as usize] = best as i32 + min_d;
            }

            let unique = s.iter().enumerate().all(|(d, &v)| {
                d.abs_diff(best) <= 1 || u64::from(v) * uniq >= u64::from(min_s) * 100
            });
            if !unique {
                continue;
            }

            let mut d = best as f32;
            if best > 0 && best + 1 < nd {
                let (sm, s0, sp) = (
                    i64::from(s[best - 1]),
                    i64::from(s[best]),
                    i64::from(s[best + 1]),
                );
                let denom = (sm + sp - 2 * s0).max(1);
                d += (sm - sp) as f32 / (2 * denom) as f32;
            }
            *out = d + min_d as f32;
        }

        if params.disp12_max_diff < 0 {
            continue;
        }
        for x in 0..w {
            let d = row[x];
            if d <= invalid {
                continue;
            }
            let lo = d.floor() as i64;
            let hi = d.ceil() as i64;
            let disagrees = |dd: i64| {
                let xr = x as i64 - dd;
                xr >= 0
                    && xr < w as i64
                    && disp2[xr as usize] >= min_d
                    && (i64::from(disp2[xr as usize]) - dd).abs()
                        > i64::from(params.disp12_max_diff)
            };
            if disagrees(lo) && disagrees(hi) {
                row[x] = invalid;
            }
        }
    }
    disp
}

/// Invalidate connected regions of similar disparity with at most
/// `max_size` pixels.
fn filter_speckles(disp: &mut [f32], w: usize, h: usize, invalid: f32, max_size: usize, range: f32) {
    let mut label = vec![0u32; w * h];
    let mut next = 0u32;
    let mut queue = VecDeque::new();
    let mut region = Vec::new();

    for start in 0..w * h {
        if label[start] != 0 || disp[start] <= invalid {
            continue;
        }
        next += 1;
        label[start] = next;
        queue.push_back(start);
        region.clear();

        while let Some(i) = queue.pop_front() {
            region.push(i);
            let (x, y) = (i % w, i / w);
            let neighbours = [
                (x > 0).then(|| i - 1),
                (x + 1 < w).then(|| i + 1),
                (y > 0).then(|| i - w),
                (y + 1 < h).then(|| i + w),
            ];
            for j in neighbours.into_iter().flatten() {
                if label[j] == 0 && disp[j] > invalid && (disp[j] - disp[i]).abs() <= range {
                    label[j] = next;
                    queue.push_back(j);
                }
            }
        }

        if region.len() <= max_size {
            for &i in &region {
                disp[i] = invalid;
            }
        }
    }
}

/// Dense disparity of a rectified pair, aligned with `left`.
pub fn compute_disparity_sgbm(
    left: &ImageBuffer,
    right: &ImageBuffer,
    params: &SgbmParams,
) -> Result<DisparityMap, ImageError> {
    if left.is_empty() || right.is_empty() {
        return Err(ImageError::Empty);
    }
    if left.width() != right.width()
        || left.height() != right.height()
        || left.format() != right.format()
    {
        return Err(ImageError::PairMismatch {
            left: (left.width(), left.height(), left.format()),
            right: (right.width(), right.height(), right.format()),
        });
    }

    let vol = Volume {
        w: left.width(),
        h: left.height(),
        nd: params.num_disparities_for(left.width()),
    };
    let (p1, p2) = params.penalties(left.channels());
    let min_d = params.min_disparity;
    let invalid = (min_d - 1) as f32;
    log::debug!(
        "sgbm: {}x{}, {} disparities from {}, P1 {} P2 {}",
        vol.w,
        vol.h,
        vol.nd,
        min_d,
        p1,
        p2
    );

    let cap = params.pre_filter_cap.max(1);
    let mut cost = pixel_costs(&planes(left, cap), &planes(right, cap), &vol, min_d, cap);
    aggregate_block(&mut cost, &vol, params.block_size.max(1) | 1);

    let mut sum = vec![0u32; cost.len()];
    for &(dx, dy) in params.mode.directions() {
        accumulate_path(&cost, &mut sum, &vol, dx, dy, p1, p2);
    }
    drop(cost);

    let mut data = select_disparities(&sum, &vol, params, invalid);

    // Left columns without a full disparity range.
    let strip = (i64::from(min_d) + vol.nd as i64).clamp(0, vol.w as i64) as usize;
    for row in data.chunks_exact_mut(vol.w) {
        row[..strip].fill(invalid);
    }

    if params.speckle_window_size > 0 {
        filter_speckles(
            &mut data,
            vol.w,
            vol.h,
            invalid,
            params.speckle_window_size,
            params.speckle_range,
        );
    }

    Ok(DisparityMap {
        width: vol.w,
        height: vol.h,
        min_disparity: min_d,
        num_disparities: vol.nd,
        data,
    })
}
