use ndarray::{ArrayView3, Zip};
use serde::{Deserialize, Serialize};

/// How the reference point of the crop/pad windows is found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Centering {
    /// Voxel of maximum intensity
    #[default]
    Max,
    /// Intensity weighted center of mass
    Com,
}

fn array_center(shape: [usize; 3]) -> [usize; 3] {
    [shape[0] / 2, shape[1] / 2, shape[2] / 2]
}

/// Position of the voxel with the largest absolute value. NaN voxels are ignored, the
/// first maximum wins. Falls back to the array center for an empty array.
pub fn max_position(data: ArrayView3<f64>) -> [usize; 3] {
    let (nz, ny, nx) = data.dim();
    let mut best: Option<([usize; 3], f64)> = None;
    for ((z, y, x), value) in data.indexed_iter() {
        let value = value.abs();
        if value.is_nan() {
            continue;
        }
        match best {
            Some((_, max)) if value <= max => (),
            _ => best = Some(([z, y, x], value)),
        }
    }
    best.map(|(position, _)| position)
        .unwrap_or_else(|| array_center([nz, ny, nx]))
}

/// Intensity weighted center of mass. None when the total intensity is not positive.
pub fn center_of_mass(data: ArrayView3<f64>) -> Option<[f64; 3]> {
    let mut total = 0.0;
    let mut moments = [0.0; 3];
    Zip::indexed(&data).for_each(|(z, y, x), value| {
        if value.is_finite() {
            total += value;
            moments[0] += value * z as f64;
            moments[1] += value * y as f64;
            moments[2] += value * x as f64;
        }
    });
    if total <= 0.0 {
        return None;
    }
    Some([moments[0] / total, moments[1] / total, moments[2] / total])
}

/// Center of mass rounded to the nearest voxel, clamped inside the array. Falls back to
/// the array center when the array holds no intensity.
pub fn rounded_center_of_mass(data: ArrayView3<f64>) -> [usize; 3] {
    let (nz, ny, nx) = data.dim();
    let shape = [nz, ny, nx];
    match center_of_mass(data) {
        Some(com) => {
            let mut pivot = [0; 3];
            for axis in 0..3 {
                let upper = shape[axis].saturating_sub(1) as f64;
                pivot[axis] = com[axis].round().clamp(0.0, upper) as usize;
            }
            pivot
        }
        None => {
            spdlog::warn!("Data holds no intensity, using the array center as pivot");
            array_center(shape)
        }
    }
}

/// Find the pivot of the data according to the centering method
pub fn find_pivot(data: ArrayView3<f64>, centering: Centering) -> [usize; 3] {
    match centering {
        Centering::Max => max_position(data),
        Centering::Com => rounded_center_of_mass(data),
    }
}

/// Find the center of a crop window of `crop_shape` around `pivot` which stays inside
/// of `array_shape`.
///
/// Along each axis the window is centered on the pivot when possible. When the pivot is
/// too close to an edge the window is pushed back inside of the array. Axes which are
/// not cropped (crop size >= array size) get the array center.
pub fn find_crop_center<const N: usize>(
    array_shape: [usize; N],
    crop_shape: [usize; N],
    pivot: [usize; N],
) -> [usize; N] {
    let mut center = [0; N];
    for axis in 0..N {
        let length = array_shape[axis];
        let size = crop_shape[axis];
        let half = size / 2;
        if size >= length {
            center[axis] = length / 2;
        } else if pivot[axis] < half {
            spdlog::warn!(
                "Pivot {} too close to the start of axis {} for a crop of {}, shifting the window",
                pivot[axis],
                axis,
                size
            );
            center[axis] = half;
        } else if pivot[axis] + (size - half) > length {
            spdlog::warn!(
                "Pivot {} too close to the end of axis {} for a crop of {}, shifting the window",
                pivot[axis],
                axis,
                size
            );
            center[axis] = length - (size - half);
        } else {
            center[axis] = pivot[axis];
        }
    }
    center
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    #[test]
    fn test_max_position() {
        let mut data = Array3::<f64>::zeros((4, 5, 6));
        data[[1, 2, 3]] = 10.0;
        data[[3, 4, 5]] = -20.0;
        data[[0, 0, 0]] = f64::NAN;
        assert_eq!(max_position(data.view()), [3, 4, 5]);
    }

    #[test]
    fn test_center_of_mass() {
        let mut data = Array3::<f64>::zeros((5, 5, 5));
        data[[1, 2, 3]] = 1.0;
        data[[3, 2, 3]] = 1.0;
        assert_eq!(center_of_mass(data.view()), Some([2.0, 2.0, 3.0]));
        assert_eq!(find_pivot(data.view(), Centering::Com), [2, 2, 3]);
        let empty = Array3::<f64>::zeros((4, 4, 4));
        assert_eq!(center_of_mass(empty.view()), None);
        assert_eq!(rounded_center_of_mass(empty.view()), [2, 2, 2]);
    }

    #[test]
    fn test_crop_center_inside() {
        assert_eq!(find_crop_center([100], [40], [50]), [50]);
    }

    #[test]
    fn test_crop_center_near_edges() {
        assert_eq!(find_crop_center([100, 100], [40, 40], [5, 95]), [20, 80]);
        // odd crop size, the window must still end inside of the array
        let center = find_crop_center([100], [41], [99]);
        assert_eq!(center, [79]);
        assert!(center[0] - 41 / 2 + 41 <= 100);
    }

    #[test]
    fn test_crop_center_no_crop() {
        assert_eq!(find_crop_center([30], [30], [2]), [15]);
    }
}
