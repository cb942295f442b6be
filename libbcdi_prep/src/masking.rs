//! Non-interactive masking of the stack: parasitic scattering ("aliens") boxes,
//! polygons drawn on a projection of the stack, zero-event and photon threshold masks.
//!
//! Coordinates refer to the stack after crop/pad, i.e. what an operator sees when
//! inspecting the data before masking.
use ndarray::{s, Axis, Zip};
use serde::{Deserialize, Serialize};

use super::error::MaskError;
use super::stack::DiffractionStack;

/// A box `[z0, z1, y0, y1, x0, x1]` (stops excluded) of parasitic intensity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlienBox(pub [usize; 6]);

/// Plane of the projection a polygon was drawn on. The polygon masks the voxels along
/// the projected axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectionPlane {
    /// Sum along z; vertices are (x, y)
    XY,
    /// Sum along y; vertices are (x, z)
    XZ,
    /// Sum along x; vertices are (y, z)
    YZ,
}

/// Polygon mask, vertices are (horizontal, vertical) pixel coordinates of the plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskPolygon {
    pub plane: ProjectionPlane,
    pub vertices: Vec<[f64; 2]>,
}

impl MaskPolygon {
    /// Even-odd rule test of a point against the polygon
    pub fn contains(&self, h: f64, v: f64) -> bool {
        let n = self.vertices.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            let [hi, vi] = self.vertices[i];
            let [hj, vj] = self.vertices[j];
            if (vi > v) != (vj > v) && h < (hj - hi) * (v - vi) / (vj - vi) + hi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// Zero the data and set the mask inside of alien boxes. Returns the number of voxels
/// newly masked.
pub fn apply_aliens(stack: &mut DiffractionStack, aliens: &[AlienBox]) -> Result<usize, MaskError> {
    let shape = stack.shape();
    let mut masked = 0;
    for AlienBox(bounds) in aliens {
        let valid = (0..3).all(|axis| {
            bounds[2 * axis] < bounds[2 * axis + 1] && bounds[2 * axis + 1] <= shape[axis]
        });
        if !valid {
            return Err(MaskError::BadAlienBox(*bounds, shape));
        }
        let region = s![
            bounds[0]..bounds[1],
            bounds[2]..bounds[3],
            bounds[4]..bounds[5]
        ];
        Zip::from(stack.data.slice_mut(region))
            .and(stack.mask.slice_mut(region))
            .for_each(|value, flag| {
                if *flag == 0 {
                    masked += 1;
                }
                *value = 0.0;
                *flag = 1;
            });
    }
    Ok(masked)
}

/// Mask the voxels of the stack inside of a polygon drawn on a projection
pub fn apply_polygon(stack: &mut DiffractionStack, polygon: &MaskPolygon) -> Result<usize, MaskError> {
    if polygon.vertices.len() < 3 {
        return Err(MaskError::BadPolygon(polygon.vertices.len()));
    }
    let (projected_axis, vertical_axis, horizontal_axis) = match polygon.plane {
        ProjectionPlane::XY => (0, 1, 2),
        ProjectionPlane::XZ => (1, 0, 2),
        ProjectionPlane::YZ => (2, 0, 1),
    };
    let shape = stack.shape();
    let mut masked = 0;
    for v in 0..shape[vertical_axis] {
        for h in 0..shape[horizontal_axis] {
            if !polygon.contains(h as f64, v as f64) {
                continue;
            }
            for p in 0..shape[projected_axis] {
                let mut index = [0; 3];
                index[projected_axis] = p;
                index[vertical_axis] = v;
                index[horizontal_axis] = h;
                if stack.mask[index] == 0 {
                    stack.mask[index] = 1;
                    masked += 1;
                }
            }
        }
    }
    Ok(masked)
}

/// Mask detector pixels which have no intensity along the whole rocking curve
pub fn mask_zero_events(stack: &mut DiffractionStack) -> usize {
    let summed = stack.data.sum_axis(Axis(0));
    let mut masked = 0;
    for mut frame in stack.mask.axis_iter_mut(Axis(0)) {
        Zip::from(&mut frame).and(&summed).for_each(|flag, total| {
            if *total == 0.0 && *flag == 0 {
                *flag = 1;
                masked += 1;
            }
        });
    }
    masked
}

/// Mask and zero voxels below the photon threshold
pub fn apply_photon_threshold(stack: &mut DiffractionStack, threshold: f64) -> usize {
    let mut masked = 0;
    Zip::from(&mut stack.data)
        .and(&mut stack.mask)
        .for_each(|value, flag| {
            if *value < threshold {
                *value = 0.0;
                if *flag == 0 {
                    *flag = 1;
                    masked += 1;
                }
            }
        });
    masked
}

/// Replace NaN and infinite voxels by 0 and mask them
pub fn remove_nan(stack: &mut DiffractionStack) -> usize {
    let mut count = 0;
    Zip::from(&mut stack.data)
        .and(&mut stack.mask)
        .for_each(|value, flag| {
            if !value.is_finite() {
                *value = 0.0;
                *flag = 1;
                count += 1;
            }
        });
    count
}
