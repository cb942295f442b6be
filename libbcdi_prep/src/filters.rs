use ndarray::{Array2, ArrayView2, ArrayViewMut2, Axis};
use serde::{Deserialize, Serialize};

use super::constants::{ISOLATED_EXTENT, ISOLATED_MIN_COUNT};
use super::stack::DiffractionStack;

/// Frame filtering applied after masking
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IsolatedFilter {
    #[default]
    Skip,
    /// 3x3 median filter of every measured frame
    Median,
    /// Mask empty pixels surrounded by enough bright neighbours
    MaskIsolated,
    /// Replace empty pixels surrounded by enough bright neighbours by their mean
    InterpIsolated,
}

/// Filter for empty pixels sitting in the middle of measured intensity.
///
/// A pixel is a candidate when it is zero and not masked. Its neighbours are the pixels
/// of the `(2 * extent + 1)` wide window around it; a neighbour is valid when it is finite,
/// non-zero and not masked. When at least `nb_neighbours` neighbours are valid and all of
/// them are above `min_count`, the candidate is either masked or interpolated with the
/// mean of the valid neighbours. Masked pixels are never restored.
///
/// Candidates are evaluated against the unfiltered frame, so the result does not
/// depend on the visiting order.
#[derive(Debug, Clone, PartialEq)]
pub struct IsolatedPixelFilter {
    pub nb_neighbours: usize,
    pub extent: usize,
    pub min_count: f64,
    pub interpolate: bool,
}

impl IsolatedPixelFilter {
    pub fn new(nb_neighbours: usize, interpolate: bool) -> Self {
        Self {
            nb_neighbours,
            extent: ISOLATED_EXTENT,
            min_count: ISOLATED_MIN_COUNT,
            interpolate,
        }
    }

    /// Filter one frame in place, returns the number of pixels processed
    pub fn apply(&self, mut frame: ArrayViewMut2<f64>, mut mask: ArrayViewMut2<u8>) -> usize {
        let original = frame.to_owned();
        let original_mask = mask.to_owned();
        let (ny, nx) = original.dim();
        let mut processed = 0;

        for ((row, col), value) in original.indexed_iter() {
            if *value != 0.0 || original_mask[[row, col]] != 0 {
                continue;
            }
            let row_range = row.saturating_sub(self.extent)..(row + self.extent + 1).min(ny);
            let col_range = col.saturating_sub(self.extent)..(col + self.extent + 1).min(nx);

            let mut count = 0;
            let mut sum = 0.0;
            let mut all_bright = true;
            for r in row_range {
                for c in col_range.clone() {
                    let neighbour = original[[r, c]];
                    if (r == row && c == col)
                        || !neighbour.is_finite()
                        || neighbour == 0.0
                        || original_mask[[r, c]] != 0
                    {
                        continue;
                    }
                    count += 1;
                    sum += neighbour;
                    all_bright &= neighbour > self.min_count;
                }
            }
            if count == 0 || count < self.nb_neighbours || !all_bright {
                continue;
            }
            processed += 1;
            if self.interpolate {
                frame[[row, col]] = sum / count as f64;
            } else {
                mask[[row, col]] = 1;
            }
        }
        processed
    }
}

/// 3x3 median filter, pixels outside of the frame count as zero
pub fn median_filter_3x3(frame: ArrayView2<f64>) -> Array2<f64> {
    let (ny, nx) = frame.dim();
    Array2::from_shape_fn((ny, nx), |(row, col)| {
        let mut window = [0.0; 9];
        let mut idx = 0;
        for dr in -1isize..=1 {
            for dc in -1isize..=1 {
                let r = row as isize + dr;
                let c = col as isize + dc;
                if r >= 0 && c >= 0 && (r as usize) < ny && (c as usize) < nx {
                    window[idx] = frame[[r as usize, c as usize]];
                }
                idx += 1;
            }
        }
        window.sort_by(|a, b| a.total_cmp(b));
        window[4]
    })
}

/// Apply the configured filter to the measured frames of the stack.
///
/// Returns the number of processed pixels (0 for the median filter).
pub fn filter_stack(
    stack: &mut DiffractionStack,
    filter: IsolatedFilter,
    nb_neighbours: usize,
    frames: std::ops::Range<usize>,
) -> usize {
    let pixel_filter = match filter {
        IsolatedFilter::Skip => {
            spdlog::info!("Skipping frame filtering");
            return 0;
        }
        IsolatedFilter::Median => {
            spdlog::info!("Applying median filtering");
            for idx in frames {
                let filtered = median_filter_3x3(stack.data.index_axis(Axis(0), idx));
                stack.data.index_axis_mut(Axis(0), idx).assign(&filtered);
            }
            return 0;
        }
        IsolatedFilter::MaskIsolated => IsolatedPixelFilter::new(nb_neighbours, false),
        IsolatedFilter::InterpIsolated => IsolatedPixelFilter::new(nb_neighbours, true),
    };

    spdlog::info!("Filtering isolated pixels");
    let mut total = 0;
    for idx in frames {
        let processed = pixel_filter.apply(
            stack.data.index_axis_mut(Axis(0), idx),
            stack.mask.index_axis_mut(Axis(0), idx),
        );
        spdlog::debug!("Frame {}, number of filtered pixels: {}", idx, processed);
        total += processed;
    }
    spdlog::info!("Total number of filtered pixels: {}", total);
    total
}
