//! Crop/pad/centering geometry of the diffraction stack.
//!
//! All operations are expressed as one [AxisWindow] per axis, which keeps data, mask,
//! q values and frames logical consistent.
use ndarray::{Array3, ArrayView3};
use serde::{Deserialize, Serialize};

use super::center::{find_crop_center, find_pivot, rounded_center_of_mass, Centering};
use super::constants::{FFT_MAX_PRIME, FFT_REQUIRED_DIVIDERS};
use super::error::CropPadError;
use super::fft_shape::{higher_prime, is_fft_compatible, smaller_prime, smaller_primes};
use super::stack::{AxisWindow, DiffractionStack};

/// Window of one axis for a crop or a pad to `output_len`.
///
/// Padding places the input at `pad_start` (default: centered). Cropping keeps
/// `output_len` indices starting at `crop_center - output_len / 2` (default: centered).
pub fn axis_window(
    axis: usize,
    length: usize,
    output_len: usize,
    pad_start: Option<usize>,
    crop_center: Option<usize>,
) -> Result<AxisWindow, CropPadError> {
    if output_len >= length {
        let start = pad_start.unwrap_or((output_len - length) / 2);
        if start + length > output_len {
            return Err(CropPadError::PadOutOfBounds {
                axis,
                start,
                size: output_len,
                length,
            });
        }
        Ok(AxisWindow {
            source: 0..length,
            target: start..start + length,
            output_len,
        })
    } else {
        let center = crop_center.unwrap_or(length / 2);
        let half = output_len / 2;
        if center < half || center - half + output_len > length {
            return Err(CropPadError::CropOutOfBounds {
                axis,
                center,
                size: output_len,
                length,
            });
        }
        let start = center - half;
        Ok(AxisWindow {
            source: start..start + output_len,
            target: 0..output_len,
            output_len,
        })
    }
}

/// Crop and/or pad a 3D array to `output_shape`, filling padded voxels with `pad_value`
pub fn crop_pad<T: Clone>(
    array: ArrayView3<T>,
    output_shape: [usize; 3],
    pad_value: T,
    pad_start: Option<[usize; 3]>,
    crop_center: Option<[usize; 3]>,
) -> Result<Array3<T>, CropPadError> {
    let (nz, ny, nx) = array.dim();
    let shape = [nz, ny, nx];
    let mut windows = Vec::with_capacity(3);
    for axis in 0..3 {
        windows.push(axis_window(
            axis,
            shape[axis],
            output_shape[axis],
            pad_start.map(|p| p[axis]),
            crop_center.map(|c| c[axis]),
        )?);
    }
    let mut output = Array3::from_elem(output_shape, pad_value);
    output
        .slice_mut(ndarray::s![
            windows[0].target.clone(),
            windows[1].target.clone(),
            windows[2].target.clone()
        ])
        .assign(&array.slice(ndarray::s![
            windows[0].source.clone(),
            windows[1].source.clone(),
            windows[2].source.clone()
        ]));
    Ok(output)
}

/// Pad a 3D array by `pad_width` = `[z0, z1, y0, y1, x0, x1]` voxels of `value`
pub fn zero_pad<T: Clone>(array: ArrayView3<T>, pad_width: [usize; 6], value: T) -> Array3<T> {
    let (nz, ny, nx) = array.dim();
    let shape = [
        nz + pad_width[0] + pad_width[1],
        ny + pad_width[2] + pad_width[3],
        nx + pad_width[4] + pad_width[5],
    ];
    let mut output = Array3::from_elem(shape, value);
    output
        .slice_mut(ndarray::s![
            pad_width[0]..pad_width[0] + nz,
            pad_width[2]..pad_width[2] + ny,
            pad_width[4]..pad_width[4] + nx
        ])
        .assign(&array);
    output
}

/// Crop/pad strategies of [center_fft]. Z is the stacking (rocking curve) axis, YX the
/// detector plane. Symmetric variants center the pivot, asymmetric ones keep the array
/// center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FftOption {
    #[serde(rename = "skip")]
    Skip,
    #[serde(rename = "crop_sym_ZYX")]
    CropSymZYX,
    #[default]
    #[serde(rename = "crop_asym_ZYX", alias = "crop_asymmetric_ZYX")]
    CropAsymZYX,
    #[serde(rename = "pad_sym_Z_crop_sym_YX")]
    PadSymZCropSymYX,
    #[serde(rename = "pad_sym_Z_crop_asym_YX")]
    PadSymZCropAsymYX,
    #[serde(rename = "pad_asym_Z_crop_sym_YX")]
    PadAsymZCropSymYX,
    #[serde(rename = "pad_asym_Z_crop_asym_YX")]
    PadAsymZCropAsymYX,
    #[serde(rename = "pad_sym_Z")]
    PadSymZ,
    #[serde(rename = "pad_asym_Z", alias = "pad_Z")]
    PadAsymZ,
    #[serde(rename = "pad_sym_ZYX")]
    PadSymZYX,
    #[serde(rename = "pad_asym_ZYX", alias = "pad_asymmetric_ZYX")]
    PadAsymZYX,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisPlan {
    Keep,
    CropSym,
    CropAsym,
    PadSym,
    PadAsym,
}

impl FftOption {
    fn plans(&self) -> [AxisPlan; 3] {
        use AxisPlan::*;
        match self {
            Self::Skip => [Keep, Keep, Keep],
            Self::CropSymZYX => [CropSym, CropSym, CropSym],
            Self::CropAsymZYX => [CropAsym, CropAsym, CropAsym],
            Self::PadSymZCropSymYX => [PadSym, CropSym, CropSym],
            Self::PadSymZCropAsymYX => [PadSym, CropAsym, CropAsym],
            Self::PadAsymZCropSymYX => [PadAsym, CropSym, CropSym],
            Self::PadAsymZCropAsymYX => [PadAsym, CropAsym, CropAsym],
            Self::PadSymZ => [PadSym, Keep, Keep],
            Self::PadAsymZ => [PadAsym, Keep, Keep],
            Self::PadSymZYX => [PadSym, PadSym, PadSym],
            Self::PadAsymZYX => [PadAsym, PadAsym, PadAsym],
        }
    }

    /// Options which keep the output shape independent of the peak position, safe to
    /// use when several scans have to be combined
    pub fn is_shape_stable(&self) -> bool {
        matches!(self, Self::Skip | Self::CropAsymZYX | Self::PadAsymZ | Self::PadAsymZYX)
    }

    fn needs_pivot(&self) -> bool {
        self.plans()
            .iter()
            .any(|p| matches!(p, AxisPlan::CropSym | AxisPlan::PadSym))
    }
}

/// Parameters of [center_fft]
#[derive(Debug, Clone, Default)]
pub struct CenterFftParams {
    pub option: FftOption,
    pub centering: Centering,
    /// Pivot given directly in stack coordinates, overrides `centering`
    pub fix_bragg: Option<[usize; 3]>,
    /// Explicit crop bounds `[z0, z1, y0, y1, x0, x1]` applied before anything else
    pub fix_size: Option<[usize; 6]>,
    /// Output sizes for the symmetric padding options
    pub pad_size: Option<[usize; 3]>,
    /// Value of the mask in padded voxels
    pub mask_fill: u8,
}

/// Outcome of [center_fft]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CenterFftResult {
    /// Signed widths `[z0, z1, y0, y1, x0, x1]`, negative when cropped
    pub pad_width: [isize; 6],
    pub pivot: Option<[usize; 3]>,
    pub option: Option<FftOption>,
}

impl CenterFftResult {
    /// Indices of the frames which hold measured data (not padded)
    pub fn measured_frames(&self, nz: usize) -> std::ops::Range<usize> {
        let start = self.pad_width[0].max(0) as usize;
        let end = nz.saturating_sub(self.pad_width[1].max(0) as usize);
        start.min(end)..end
    }
}

fn axis_window_for_plan(
    axis: usize,
    plan: AxisPlan,
    length: usize,
    pivot: usize,
    pad_size: Option<usize>,
) -> Result<AxisWindow, CropPadError> {
    match plan {
        AxisPlan::Keep => Ok(AxisWindow::identity(length)),
        AxisPlan::CropSym => {
            let size = smaller_prime(
                2 * pivot.min(length - pivot),
                FFT_MAX_PRIME,
                &FFT_REQUIRED_DIVIDERS,
            )?;
            axis_window(axis, length, size, None, Some(pivot))
        }
        AxisPlan::CropAsym => {
            let size = smaller_prime(length, FFT_MAX_PRIME, &FFT_REQUIRED_DIVIDERS)?;
            axis_window(axis, length, size, None, None)
        }
        AxisPlan::PadSym => {
            let size = pad_size.ok_or(CropPadError::MissingPadSize)?;
            if !is_fft_compatible(size, FFT_MAX_PRIME, &FFT_REQUIRED_DIVIDERS) {
                return Err(CropPadError::PadSizeNotFftCompatible(size, axis));
            }
            if size < length {
                return Err(CropPadError::PadSizeTooSmall(size, axis, length));
            }
            let wanted = (size / 2) as isize - pivot as isize;
            let start = wanted.clamp(0, (size - length) as isize) as usize;
            if start as isize != wanted {
                spdlog::warn!(
                    "Pivot {} along axis {} cannot be centered in a pad of {}, using pad start {}",
                    pivot,
                    axis,
                    size,
                    start
                );
            }
            axis_window(axis, length, size, Some(start), None)
        }
        AxisPlan::PadAsym => {
            let size = higher_prime(length, FFT_MAX_PRIME, &FFT_REQUIRED_DIVIDERS)?;
            axis_window(axis, length, size, Some((size - length + 1) / 2), None)
        }
    }
}

/// Crop the stack to explicit bounds `[z0, z1, y0, y1, x0, x1]`
pub fn apply_fix_size(stack: &mut DiffractionStack, bounds: [usize; 6]) -> Result<(), CropPadError> {
    let shape = stack.shape();
    let mut windows = Vec::with_capacity(3);
    for axis in 0..3 {
        let (start, stop) = (bounds[2 * axis], bounds[2 * axis + 1]);
        if start >= stop || stop > shape[axis] {
            return Err(CropPadError::BadFixSize(bounds, shape));
        }
        windows.push(AxisWindow {
            source: start..stop,
            target: 0..stop - start,
            output_len: stop - start,
        });
    }
    let windows: [AxisWindow; 3] = [windows[0].clone(), windows[1].clone(), windows[2].clone()];
    stack.apply_windows(&windows, 0);
    Ok(())
}

/// Crop/pad the stack according to `params.option`, so that the output meets the FFT
/// requirements of the phasing tool and, for the symmetric options, the pivot sits at
/// the center of the output.
pub fn center_fft(
    stack: &mut DiffractionStack,
    params: &CenterFftParams,
) -> Result<CenterFftResult, CropPadError> {
    let active = stack.active_frames();
    if active != stack.shape()[0] {
        return Err(CropPadError::FramesMismatch(active, stack.shape()[0]));
    }
    if let Some(bounds) = params.fix_size {
        apply_fix_size(stack, bounds)?;
        spdlog::info!("Data cropped to fix_size: {:?}", stack.shape());
    }

    let shape = stack.shape();
    let mut option = params.option;
    let pivot = match params.fix_bragg {
        Some(bragg) => {
            if (0..3).any(|axis| bragg[axis] >= shape[axis]) {
                return Err(CropPadError::PivotOutOfBounds(bragg, shape));
            }
            bragg
        }
        None => find_pivot(stack.data.view(), params.centering),
    };
    spdlog::info!(
        "Pivot at {:?}, intensity {:.1}",
        pivot,
        stack.data[[pivot[0], pivot[1], pivot[2]]]
    );

    let plans = option.plans();
    let empty_box = (0..3).any(|axis| {
        plans[axis] == AxisPlan::CropSym && pivot[axis].min(shape[axis] - pivot[axis]) == 0
    });
    if empty_box {
        spdlog::warn!(
            "Pivot {:?} on the edge of the data {:?}, empty symmetric box: skipping centering",
            pivot,
            shape
        );
        option = FftOption::Skip;
    }

    let plans = option.plans();
    let mut windows = Vec::with_capacity(3);
    for axis in 0..3 {
        windows.push(axis_window_for_plan(
            axis,
            plans[axis],
            shape[axis],
            pivot[axis],
            params.pad_size.map(|p| p[axis]),
        )?);
    }
    let windows: [AxisWindow; 3] = [windows[0].clone(), windows[1].clone(), windows[2].clone()];

    let mut pad_width = [0; 6];
    for axis in 0..3 {
        let (before, after) = windows[axis].pad_width(shape[axis]);
        pad_width[2 * axis] = before;
        pad_width[2 * axis + 1] = after;
    }
    stack.apply_windows(&windows, params.mask_fill);

    Ok(CenterFftResult {
        pad_width,
        pivot: option.needs_pivot().then_some(pivot),
        option: Some(option),
    })
}

/// Crop the stack to the largest shape meeting the FFT requirements, keeping the
/// center of mass as close as possible to the center of the output.
///
/// Returns the final shape.
pub fn fit_fft_shape(stack: &mut DiffractionStack) -> Result<[usize; 3], CropPadError> {
    let shape = stack.shape();
    let final_shape = smaller_primes(shape, FFT_MAX_PRIME, &FFT_REQUIRED_DIVIDERS)?;
    if final_shape == shape {
        return Ok(shape);
    }
    let com = rounded_center_of_mass(stack.data.view());
    let crop_center = find_crop_center(shape, final_shape, com);
    let mut windows = Vec::with_capacity(3);
    for axis in 0..3 {
        windows.push(axis_window(
            axis,
            shape[axis],
            final_shape[axis],
            None,
            Some(crop_center[axis]),
        )?);
    }
    let windows: [AxisWindow; 3] = [windows[0].clone(), windows[1].clone(), windows[2].clone()];
    stack.apply_windows(&windows, 0);
    Ok(final_shape)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::QValues;
    use ndarray::{Array1, Array3};

    fn peaked_stack(shape: [usize; 3], peak: [usize; 3]) -> DiffractionStack {
        let mut data = Array3::<f64>::ones(shape);
        data[peak] = 1000.0;
        let mask = Array3::<u8>::zeros(shape);
        DiffractionStack::new(data, mask, None, vec![1; shape[0]]).unwrap()
    }

    #[test]
    fn test_crop_pad_centered() {
        let data = Array3::from_shape_fn((4, 4, 4), |(z, y, x)| (z * 16 + y * 4 + x) as f64);
        let cropped = crop_pad(data.view(), [2, 6, 4], -1.0, None, None).unwrap();
        assert_eq!(cropped.dim(), (2, 6, 4));
        assert_eq!(cropped[[0, 0, 0]], -1.0);
        assert_eq!(cropped[[0, 1, 0]], data[[1, 0, 0]]);
        assert_eq!(cropped[[1, 4, 3]], data[[2, 3, 3]]);
    }

    #[test]
    fn test_crop_pad_out_of_bounds() {
        let data = Array3::<u8>::zeros((10, 10, 10));
        let result = crop_pad(data.view(), [4, 10, 10], 0, None, Some([1, 5, 5]));
        assert!(matches!(
            result,
            Err(CropPadError::CropOutOfBounds { axis: 0, .. })
        ));
        let result = crop_pad(data.view(), [12, 10, 10], 0, Some([3, 0, 0]), None);
        assert!(matches!(
            result,
            Err(CropPadError::PadOutOfBounds { axis: 0, .. })
        ));
    }

    #[test]
    fn test_zero_pad() {
        let data = Array3::<f64>::ones((2, 2, 2));
        let padded = zero_pad(data.view(), [1, 0, 0, 2, 1, 1], 0.0);
        assert_eq!(padded.dim(), (3, 4, 4));
        assert_eq!(padded.sum(), 8.0);
        assert_eq!(padded[[1, 0, 1]], 1.0);
        assert_eq!(padded[[0, 0, 1]], 0.0);
    }

    #[test]
    fn test_crop_sym_centers_peak() {
        let mut stack = peaked_stack([30, 40, 50], [10, 25, 20]);
        let params = CenterFftParams {
            option: FftOption::CropSymZYX,
            ..Default::default()
        };
        let result = center_fft(&mut stack, &params).unwrap();
        // boxes: 2*min(10, 20)=20, 2*min(25, 15)=30, 2*min(20, 30)=40
        assert_eq!(stack.shape(), [20, 30, 40]);
        assert_eq!(stack.data[[10, 15, 20]], 1000.0);
        assert_eq!(result.pad_width, [0, -10, -10, 0, 0, -10]);
        assert_eq!(result.pivot, Some([10, 25, 20]));
        assert_eq!(stack.frames_logical.iter().filter(|f| **f == 1).count(), 20);
    }

    #[test]
    fn test_crop_asym_keeps_center() {
        let mut stack = peaked_stack([31, 40, 22], [3, 3, 3]);
        let params = CenterFftParams::default();
        let result = center_fft(&mut stack, &params).unwrap();
        assert_eq!(stack.shape(), [30, 40, 20]);
        assert_eq!(result.pad_width, [0, -1, 0, 0, -1, -1]);
        assert_eq!(result.pivot, None);
    }

    #[test]
    fn test_pad_sym_z() {
        let mut stack = peaked_stack([20, 8, 8], [5, 4, 4]);
        let params = CenterFftParams {
            option: FftOption::PadSymZ,
            pad_size: Some([32, 8, 8]),
            mask_fill: 1,
            ..Default::default()
        };
        let result = center_fft(&mut stack, &params).unwrap();
        assert_eq!(stack.shape(), [32, 8, 8]);
        assert_eq!(result.pad_width[0..2], [11, 1]);
        assert_eq!(stack.data[[16, 4, 4]], 1000.0);
        assert_eq!(stack.mask[[0, 0, 0]], 1);
        assert_eq!(stack.mask[[11, 0, 0]], 0);
        assert_eq!(stack.mask[[31, 0, 0]], 1);
        assert_eq!(stack.frames_logical.len(), 32);
        assert_eq!(stack.frames_logical[0], -1);
    }

    #[test]
    fn test_pad_sym_requires_compatible_size() {
        let mut stack = peaked_stack([20, 8, 8], [5, 4, 4]);
        let params = CenterFftParams {
            option: FftOption::PadSymZ,
            pad_size: Some([22, 8, 8]),
            ..Default::default()
        };
        assert!(matches!(
            center_fft(&mut stack, &params),
            Err(CropPadError::PadSizeNotFftCompatible(22, 0))
        ));
    }

    #[test]
    fn test_pad_asym_zyx() {
        let mut stack = peaked_stack([11, 9, 10], [5, 4, 4]);
        let params = CenterFftParams {
            option: FftOption::PadAsymZYX,
            ..Default::default()
        };
        let result = center_fft(&mut stack, &params).unwrap();
        assert_eq!(stack.shape(), [12, 10, 10]);
        assert_eq!(result.pad_width, [1, 0, 1, 0, 0, 0]);
        assert_eq!(result.measured_frames(12), 1..12);
    }

    #[test]
    fn test_q_values_follow_crop() {
        let mut stack = peaked_stack([6, 6, 6], [4, 3, 3]);
        let axis = Array1::linspace(0.0, 0.5, 6);
        stack.q_values = Some(QValues {
            qx: axis.clone(),
            qz: axis.clone(),
            qy: axis,
        });
        let params = CenterFftParams {
            option: FftOption::CropSymZYX,
            ..Default::default()
        };
        center_fft(&mut stack, &params).unwrap();
        let q = stack.q_values.as_ref().unwrap();
        assert_eq!(q.lengths(), stack.shape());
        assert_eq!(q.qx.len(), 4);
        assert!((q.qx[0] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_edge_pivot_skips() {
        let mut stack = peaked_stack([10, 10, 10], [0, 5, 5]);
        let params = CenterFftParams {
            option: FftOption::CropSymZYX,
            ..Default::default()
        };
        let result = center_fft(&mut stack, &params).unwrap();
        assert_eq!(result.option, Some(FftOption::Skip));
        assert_eq!(stack.shape(), [10, 10, 10]);
    }

    #[test]
    fn test_fix_size() {
        let mut stack = peaked_stack([10, 10, 10], [5, 5, 5]);
        let params = CenterFftParams {
            option: FftOption::Skip,
            fix_size: Some([2, 8, 0, 10, 1, 9]),
            ..Default::default()
        };
        center_fft(&mut stack, &params).unwrap();
        assert_eq!(stack.shape(), [6, 10, 8]);
        assert_eq!(stack.data[[3, 5, 4]], 1000.0);
        assert_eq!(stack.frames_logical, vec![0, 0, 1, 1, 1, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn test_fit_fft_shape() {
        let mut stack = peaked_stack([23, 30, 17], [20, 15, 8]);
        let shape = fit_fft_shape(&mut stack).unwrap();
        assert_eq!(shape, [20, 30, 16]);
        assert_eq!(stack.shape(), [20, 30, 16]);
        assert!(stack.data.iter().any(|v| *v == 1000.0));
    }
}
