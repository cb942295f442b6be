use ndarray::{s, Array1, Array3, Axis, Zip};
use std::ops::Range;

use super::binning::{bin_axis_values, bin_data, bin_mask};
use super::error::StackError;

/// q values of an orthonormal stack, in the order of the array axes:
/// qx along z (downstream), qz along y (vertical up), qy along x (outboard)
#[derive(Debug, Clone, PartialEq)]
pub struct QValues {
    pub qx: Array1<f64>,
    pub qz: Array1<f64>,
    pub qy: Array1<f64>,
}

impl QValues {
    pub fn lengths(&self) -> [usize; 3] {
        [self.qx.len(), self.qz.len(), self.qy.len()]
    }

    fn axis(&self, axis: usize) -> &Array1<f64> {
        match axis {
            0 => &self.qx,
            1 => &self.qz,
            _ => &self.qy,
        }
    }

    fn axis_mut(&mut self, axis: usize) -> &mut Array1<f64> {
        match axis {
            0 => &mut self.qx,
            1 => &mut self.qz,
            _ => &mut self.qy,
        }
    }
}

/// Mapping of one axis of an input array onto an output array.
///
/// `source` is the range of input indices kept, `target` where they land in the output.
/// Output indices outside of `target` are padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AxisWindow {
    pub source: Range<usize>,
    pub target: Range<usize>,
    pub output_len: usize,
}

impl AxisWindow {
    pub fn identity(length: usize) -> Self {
        Self {
            source: 0..length,
            target: 0..length,
            output_len: length,
        }
    }

    /// Signed (before, after) width: positive when padded, negative when cropped
    pub fn pad_width(&self, input_len: usize) -> (isize, isize) {
        let before = self.target.start as isize - self.source.start as isize;
        let after = (self.output_len - self.target.end) as isize
            - (input_len - self.source.end) as isize;
        (before, after)
    }

    /// Apply the window to 1D axis values. Padded positions extend the grid with the
    /// mean spacing of the input values.
    pub fn apply_to_values(&self, values: &Array1<f64>) -> Array1<f64> {
        let n = values.len();
        if n == 0 {
            return Array1::zeros(self.output_len);
        }
        let spacing = if n > 1 {
            (values[n - 1] - values[0]) / (n - 1) as f64
        } else {
            0.0
        };
        let origin = values[self.source.start];
        let first = self.target.start as f64;
        Array1::from_shape_fn(self.output_len, |idx| {
            if self.target.contains(&idx) {
                values[self.source.start + idx - self.target.start]
            } else {
                origin + (idx as f64 - first) * spacing
            }
        })
    }
}

/// A 3D diffraction stack with everything which has to stay consistent with it
/// through cropping, padding and binning.
///
/// `frames_logical` follows the raw frames of the scan: 1 for frames present in the
/// stack, 0 for frames which were excluded or cropped away, -1 for padded frames.
#[derive(Debug, Clone)]
pub struct DiffractionStack {
    pub data: Array3<f64>,
    pub mask: Array3<u8>,
    pub q_values: Option<QValues>,
    pub frames_logical: Vec<i8>,
}

impl DiffractionStack {
    pub fn new(
        data: Array3<f64>,
        mask: Array3<u8>,
        q_values: Option<QValues>,
        frames_logical: Vec<i8>,
    ) -> Result<Self, StackError> {
        let stack = Self {
            data,
            mask,
            q_values,
            frames_logical,
        };
        stack.check()?;
        Ok(stack)
    }

    pub fn shape(&self) -> [usize; 3] {
        let (nz, ny, nx) = self.data.dim();
        [nz, ny, nx]
    }

    /// Verify that mask, q values and frames logical match the data
    pub fn check(&self) -> Result<(), StackError> {
        let shape = self.shape();
        let (mz, my, mx) = self.mask.dim();
        if [mz, my, mx] != shape {
            return Err(StackError::MaskMismatch([mz, my, mx], shape));
        }
        if let Some(q) = &self.q_values {
            if q.lengths() != shape {
                return Err(StackError::QValuesMismatch(q.lengths(), shape));
            }
        }
        let active = self.active_frames();
        if active != shape[0] {
            return Err(StackError::FramesMismatch(active, shape[0]));
        }
        Ok(())
    }

    /// Number of entries of frames logical which correspond to a frame of the stack
    pub fn active_frames(&self) -> usize {
        self.frames_logical.iter().filter(|f| **f != 0).count()
    }

    /// Row of the stack holding a raw frame of the scan
    pub fn frame_row(&self, frame: usize) -> Result<usize, StackError> {
        match self.frames_logical.get(frame) {
            None => Err(StackError::FrameOutOfRange(frame, self.frames_logical.len())),
            Some(0) => Err(StackError::ExcludedFrame(frame)),
            Some(_) => Ok(self.frames_logical[..frame]
                .iter()
                .filter(|f| **f != 0)
                .count()),
        }
    }

    /// Crop and/or pad the stack with one window per axis. Padded data voxels are 0,
    /// padded mask voxels take `mask_fill`.
    pub fn apply_windows(&mut self, windows: &[AxisWindow; 3], mask_fill: u8) {
        let shape = [
            windows[0].output_len,
            windows[1].output_len,
            windows[2].output_len,
        ];
        let src = s![
            windows[0].source.clone(),
            windows[1].source.clone(),
            windows[2].source.clone()
        ];
        let dst = s![
            windows[0].target.clone(),
            windows[1].target.clone(),
            windows[2].target.clone()
        ];

        let mut data = Array3::<f64>::zeros(shape);
        data.slice_mut(dst).assign(&self.data.slice(src));
        let mut mask = Array3::<u8>::from_elem(shape, mask_fill);
        mask.slice_mut(dst).assign(&self.mask.slice(src));
        self.data = data;
        self.mask = mask;

        if let Some(q) = self.q_values.as_mut() {
            for (axis, window) in windows.iter().enumerate() {
                let updated = window.apply_to_values(q.axis(axis));
                *q.axis_mut(axis) = updated;
            }
        }
        self.update_frames_logical(&windows[0]);
    }

    fn update_frames_logical(&mut self, window: &AxisWindow) {
        let mut row = 0;
        for flag in self.frames_logical.iter_mut() {
            if *flag != 0 {
                if !window.source.contains(&row) {
                    *flag = 0;
                }
                row += 1;
            }
        }
        let before = window.target.start;
        let after = window.output_len - window.target.end;
        let mut updated = vec![-1; before];
        updated.append(&mut self.frames_logical);
        updated.extend(std::iter::repeat(-1).take(after));
        self.frames_logical = updated;
    }

    /// Set the mask to 0/1 and zero the data of masked voxels
    pub fn binarize_mask(&mut self) {
        Zip::from(&mut self.data)
            .and(&mut self.mask)
            .for_each(|value, flag| {
                if *flag != 0 {
                    *flag = 1;
                    *value = 0.0;
                }
            });
    }

    /// Bin the whole stack. Binning along the stacking axis merges frames, frames
    /// logical is then reset to the binned frames.
    pub fn bin(&mut self, binning: [usize; 3]) -> Result<(), StackError> {
        if binning == [1, 1, 1] {
            return Ok(());
        }
        self.data = bin_data(self.data.view(), binning)?;
        self.mask = bin_mask(self.mask.view(), binning)?;
        if let Some(q) = self.q_values.as_mut() {
            q.qx = bin_axis_values(&q.qx, binning[0])?;
            q.qz = bin_axis_values(&q.qz, binning[1])?;
            q.qy = bin_axis_values(&q.qy, binning[2])?;
        }
        if binning[0] != 1 {
            self.frames_logical = vec![1; self.data.len_of(Axis(0))];
        }
        self.check()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn ramp_stack(nz: usize) -> DiffractionStack {
        let data = Array3::from_shape_fn((nz, 2, 2), |(z, _, _)| z as f64);
        let mask = Array3::zeros((nz, 2, 2));
        DiffractionStack::new(data, mask, None, vec![1; nz]).unwrap()
    }

    #[test]
    fn test_pad_width() {
        let crop = AxisWindow {
            source: 2..8,
            target: 0..6,
            output_len: 6,
        };
        assert_eq!(crop.pad_width(10), (-2, -2));
        let pad = AxisWindow {
            source: 0..10,
            target: 3..13,
            output_len: 14,
        };
        assert_eq!(pad.pad_width(10), (3, 1));
    }

    #[test]
    fn test_values_extension() {
        let q = array![1.0, 2.0, 3.0];
        let window = AxisWindow {
            source: 0..3,
            target: 1..4,
            output_len: 5,
        };
        assert_eq!(window.apply_to_values(&q), array![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_frames_logical_crop_then_pad() {
        let mut stack = ramp_stack(4);
        stack.frames_logical = vec![1, 0, 1, 1, 1];
        let crop = AxisWindow {
            source: 1..3,
            target: 0..2,
            output_len: 2,
        };
        let id = AxisWindow::identity(2);
        stack.apply_windows(&[crop, id.clone(), id.clone()], 1);
        assert_eq!(stack.frames_logical, vec![0, 0, 1, 1, 0]);
        assert_eq!(stack.data[[0, 0, 0]], 1.0);

        let pad = AxisWindow {
            source: 0..2,
            target: 1..3,
            output_len: 4,
        };
        stack.apply_windows(&[pad, id.clone(), id], 1);
        assert_eq!(stack.frames_logical, vec![-1, 0, 0, 1, 1, 0, -1]);
        assert_eq!(stack.mask[[0, 0, 0]], 1);
        assert_eq!(stack.mask[[1, 0, 0]], 0);
        assert!(stack.check().is_ok());
    }

    #[test]
    fn test_mismatched_mask() {
        let result = DiffractionStack::new(
            Array3::zeros((2, 2, 2)),
            Array3::zeros((2, 2, 3)),
            None,
            vec![1, 1],
        );
        assert!(matches!(result, Err(StackError::MaskMismatch(..))));
    }

    #[test]
    fn test_frame_row_skips_excluded() {
        let mut stack = ramp_stack(3);
        stack.frames_logical = vec![0, 1, 0, 1, 1];
        assert_eq!(stack.frame_row(1).unwrap(), 0);
        assert_eq!(stack.frame_row(4).unwrap(), 2);
        assert!(matches!(stack.frame_row(2), Err(StackError::ExcludedFrame(2))));
        assert!(matches!(
            stack.frame_row(5),
            Err(StackError::FrameOutOfRange(5, 5))
        ));
    }
}
