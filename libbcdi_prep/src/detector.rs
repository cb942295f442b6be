use serde::{Deserialize, Serialize};

use super::error::DetectorError;

/// Area detector description: full size, pixel size, region of interest and binning.
///
/// The ROI is given in unbinned detector pixels as `[y0, y1, x0, x1]` (stop excluded).
/// An empty ROI selects the full detector. Binning is given in (z, y, x) order, where z
/// is the stacking (rocking curve) axis. The preprocessing binning is the binning which
/// was already applied to reloaded data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Detector {
    pub name: String,
    pub nb_pixel_y: usize,
    pub nb_pixel_x: usize,
    pub pixel_size_y: f64,
    pub pixel_size_x: f64,
    pub roi: Vec<usize>,
    pub binning: [usize; 3],
    pub preprocessing_binning: [usize; 3],
}

impl Default for Detector {
    fn default() -> Self {
        Self {
            name: String::from("Maxipix"),
            nb_pixel_y: 516,
            nb_pixel_x: 516,
            pixel_size_y: 55e-6,
            pixel_size_x: 55e-6,
            roi: vec![],
            binning: [1, 1, 1],
            preprocessing_binning: [1, 1, 1],
        }
    }
}

impl Detector {
    /// Check the ROI and binning against the detector size
    pub fn validate(&self) -> Result<(), DetectorError> {
        self.roi_bounds()?;
        if self.binning.iter().any(|b| *b == 0) {
            return Err(DetectorError::BadBinning(self.binning));
        }
        if self.preprocessing_binning.iter().any(|b| *b == 0) {
            return Err(DetectorError::BadBinning(self.preprocessing_binning));
        }
        Ok(())
    }

    /// ROI as `[y0, y1, x0, x1]`, the full detector if no ROI was set
    pub fn roi_bounds(&self) -> Result<[usize; 4], DetectorError> {
        if self.roi.is_empty() {
            return Ok([0, self.nb_pixel_y, 0, self.nb_pixel_x]);
        }
        match self.roi[..] {
            [y0, y1, x0, x1]
                if y0 < y1 && x0 < x1 && y1 <= self.nb_pixel_y && x1 <= self.nb_pixel_x =>
            {
                Ok([y0, y1, x0, x1])
            }
            _ => Err(DetectorError::BadRoi(
                self.roi.clone(),
                self.nb_pixel_y,
                self.nb_pixel_x,
            )),
        }
    }

    /// Frame shape (y, x) after the ROI and the detector plane binning
    pub fn binned_frame_shape(&self) -> Result<(usize, usize), DetectorError> {
        let [y0, y1, x0, x1] = self.roi_bounds()?;
        Ok(((y1 - y0) / self.binning[1], (x1 - x0) / self.binning[2]))
    }

    /// Combined preprocessing binning and binning along each axis
    pub fn total_binning(&self) -> [usize; 3] {
        [
            self.preprocessing_binning[0] * self.binning[0],
            self.preprocessing_binning[1] * self.binning[1],
            self.preprocessing_binning[2] * self.binning[2],
        ]
    }

    /// Suffix `_{bz}_{by}_{bx}` used in output file names
    pub fn binning_comment(&self) -> String {
        let [bz, by, bx] = self.total_binning();
        format!("_{bz}_{by}_{bx}")
    }

    /// Convert a raw detector pixel `[frame, y, x]` into the frame of the cropped and
    /// binned stack
    pub fn bragg_to_roi(&self, bragg: [usize; 3]) -> Result<[usize; 3], DetectorError> {
        let roi = self.roi_bounds()?;
        let [_, by, bx] = self.total_binning();
        if bragg[1] < roi[0] || bragg[1] >= roi[1] || bragg[2] < roi[2] || bragg[2] >= roi[3] {
            return Err(DetectorError::BraggOutsideRoi(bragg, roi));
        }
        Ok([
            bragg[0] / self.preprocessing_binning[0],
            (bragg[1] - roi[0]) / by,
            (bragg[2] - roi[2]) / bx,
        ])
    }
}
