use ndarray::{s, Array1, Array2, Array3, ArrayView2, ArrayView3};

use super::error::ShapeError;

fn check_binning(binning: &[usize], shape: &[usize]) -> Result<(), ShapeError> {
    if binning.iter().any(|b| *b == 0) {
        return Err(ShapeError::BadBinning(binning.to_vec()));
    }
    if binning.iter().zip(shape.iter()).any(|(b, n)| b > n) {
        return Err(ShapeError::BinningTooLarge {
            binning: binning.to_vec(),
            shape: shape.to_vec(),
        });
    }
    Ok(())
}

/// Sum a 3D array over blocks of `binning` voxels.
///
/// Voxels which do not fill a complete block at the end of an axis are dropped.
pub fn bin_data(array: ArrayView3<f64>, binning: [usize; 3]) -> Result<Array3<f64>, ShapeError> {
    check_binning(&binning, array.shape())?;
    if binning == [1, 1, 1] {
        return Ok(array.to_owned());
    }
    let (nz, ny, nx) = array.dim();
    let shape = (nz / binning[0], ny / binning[1], nx / binning[2]);
    let values: Vec<f64> = array
        .exact_chunks((binning[0], binning[1], binning[2]))
        .into_iter()
        .map(|block| block.sum())
        .collect();
    // exact_chunks visits blocks in logical order, so this cannot fail
    Ok(Array3::from_shape_vec(shape, values).unwrap_or_else(|_| Array3::zeros(shape)))
}

/// Bin a mask, a binned voxel is masked when any of its voxels is masked
pub fn bin_mask(mask: ArrayView3<u8>, binning: [usize; 3]) -> Result<Array3<u8>, ShapeError> {
    check_binning(&binning, mask.shape())?;
    let (nz, ny, nx) = mask.dim();
    let shape = (nz / binning[0], ny / binning[1], nx / binning[2]);
    let values: Vec<u8> = mask
        .exact_chunks((binning[0], binning[1], binning[2]))
        .into_iter()
        .map(|block| u8::from(block.iter().any(|m| *m != 0)))
        .collect();
    Ok(Array3::from_shape_vec(shape, values).unwrap_or_else(|_| Array3::zeros(shape)))
}

/// Sum a single detector frame over blocks of `by` x `bx` pixels
pub fn bin_frame(frame: ArrayView2<f64>, by: usize, bx: usize) -> Result<Array2<f64>, ShapeError> {
    check_binning(&[by, bx], frame.shape())?;
    let (ny, nx) = frame.dim();
    let shape = (ny / by, nx / bx);
    let values: Vec<f64> = frame
        .exact_chunks((by, bx))
        .into_iter()
        .map(|block| block.sum())
        .collect();
    Ok(Array2::from_shape_vec(shape, values).unwrap_or_else(|_| Array2::zeros(shape)))
}

/// Bin a single frame of the mask
pub fn bin_frame_mask(mask: ArrayView2<u8>, by: usize, bx: usize) -> Result<Array2<u8>, ShapeError> {
    check_binning(&[by, bx], mask.shape())?;
    let (ny, nx) = mask.dim();
    let shape = (ny / by, nx / bx);
    let values: Vec<u8> = mask
        .exact_chunks((by, bx))
        .into_iter()
        .map(|block| u8::from(block.iter().any(|m| *m != 0)))
        .collect();
    Ok(Array2::from_shape_vec(shape, values).unwrap_or_else(|_| Array2::zeros(shape)))
}

/// Subsample axis values (i.e. q values) to match a binned axis.
///
/// Keeps the first value of every complete block.
pub fn bin_axis_values(values: &Array1<f64>, binning: usize) -> Result<Array1<f64>, ShapeError> {
    check_binning(&[binning], &[values.len()])?;
    let stop = values.len() - values.len() % binning;
    Ok(values.slice(s![..stop;binning]).to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_bin_data_drops_remainder() {
        let data = Array3::<f64>::ones((5, 4, 6));
        let binned = bin_data(data.view(), [2, 2, 3]).unwrap();
        assert_eq!(binned.dim(), (2, 2, 2));
        assert!(binned.iter().all(|v| *v == 12.0));
    }

    #[test]
    fn test_bin_mask() {
        let mut mask = Array3::<u8>::zeros((2, 4, 4));
        mask[[1, 3, 0]] = 1;
        let binned = bin_mask(mask.view(), [2, 2, 2]).unwrap();
        assert_eq!(binned.dim(), (1, 2, 2));
        assert_eq!(binned[[0, 1, 0]], 1);
        assert_eq!(binned.sum(), 1);
    }

    #[test]
    fn test_bin_frame() {
        let frame = array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]];
        let binned = bin_frame(frame.view(), 2, 1).unwrap();
        assert_eq!(binned, array![[5.0, 7.0, 9.0]]);
    }

    #[test]
    fn test_bin_axis_values() {
        let q = array![0.0, 0.1, 0.2, 0.3, 0.4];
        assert_eq!(bin_axis_values(&q, 2).unwrap(), array![0.0, 0.2]);
    }

    #[test]
    fn test_bad_binning() {
        let data = Array3::<f64>::ones((2, 2, 2));
        assert!(matches!(
            bin_data(data.view(), [0, 1, 1]),
            Err(ShapeError::BadBinning(_))
        ));
        assert!(matches!(
            bin_data(data.view(), [3, 1, 1]),
            Err(ShapeError::BinningTooLarge { .. })
        ));
    }
}
