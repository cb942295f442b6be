use ndarray::{s, Array1, Array2, Array3, ArrayD, ArrayView2, Axis, Ix2, Ix3, Zip};
use ndarray_npy::{read_npy, NpzReader, ReadNpyError, ReadNpzError, ReadableElement};
use std::fs::File;
use std::path::{Path, PathBuf};

use super::config::{Config, ReloadPaths};
use super::constants::MIN_FRAMES;
use super::error::LoaderError;
use super::stack::{DiffractionStack, QValues};

/// An array stored in a .npy file or as the first array of a .npz archive
enum ArraySource {
    Npy(PathBuf),
    Npz(NpzReader<File>),
}

impl ArraySource {
    fn open(path: &Path) -> Result<Self, LoaderError> {
        if !path.exists() {
            return Err(LoaderError::BadFilePath(path.to_path_buf()));
        }
        let is_npz = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("npz"))
            .unwrap_or(false);
        if !is_npz {
            return Ok(Self::Npy(path.to_path_buf()));
        }
        let mut reader = NpzReader::new(File::open(path)?)?;
        if reader.is_empty() {
            return Err(LoaderError::EmptyArchive(path.to_path_buf()));
        }
        Ok(Self::Npz(reader))
    }

    fn read<T: ReadableElement>(&mut self) -> Result<ArrayD<T>, LoaderError> {
        match self {
            Self::Npy(path) => Ok(read_npy(path)?),
            Self::Npz(reader) => Ok(reader.by_index(0)?),
        }
    }
}

fn is_wrong_dtype(error: &LoaderError) -> bool {
    matches!(
        error,
        LoaderError::ReadNpyError(ReadNpyError::WrongDescriptor(_))
            | LoaderError::ReadNpzError(ReadNpzError::Npy(ReadNpyError::WrongDescriptor(_)))
    )
}

/// Read an array from a .npy or .npz file as f64, whatever its numeric dtype
pub fn read_array_file(path: &Path) -> Result<ArrayD<f64>, LoaderError> {
    let mut source = ArraySource::open(path)?;
    match source.read::<f64>() {
        Err(e) if is_wrong_dtype(&e) => (),
        result => return result,
    }
    match source.read::<f32>() {
        Err(e) if is_wrong_dtype(&e) => (),
        result => return result.map(|a| a.mapv(f64::from)),
    }
    match source.read::<i32>() {
        Err(e) if is_wrong_dtype(&e) => (),
        result => return result.map(|a| a.mapv(f64::from)),
    }
    match source.read::<i64>() {
        Err(e) if is_wrong_dtype(&e) => (),
        result => return result.map(|a| a.mapv(|v| v as f64)),
    }
    match source.read::<u16>() {
        Err(e) if is_wrong_dtype(&e) => (),
        result => return result.map(|a| a.mapv(f64::from)),
    }
    match source.read::<u8>() {
        Err(e) if is_wrong_dtype(&e) => (),
        result => return result.map(|a| a.mapv(f64::from)),
    }
    source
        .read::<bool>()
        .map(|a| a.mapv(|v| if v { 1.0 } else { 0.0 }))
}

fn into_2d(array: ArrayD<f64>, path: &Path) -> Result<Array2<f64>, LoaderError> {
    let found = array.ndim();
    array
        .into_dimensionality::<Ix2>()
        .map_err(|_| LoaderError::BadDimensions {
            path: path.to_path_buf(),
            expected: String::from("2"),
            found,
        })
}

fn into_3d(array: ArrayD<f64>, path: &Path) -> Result<Array3<f64>, LoaderError> {
    let found = array.ndim();
    array
        .into_dimensionality::<Ix3>()
        .map_err(|_| LoaderError::BadDimensions {
            path: path.to_path_buf(),
            expected: String::from("3"),
            found,
        })
}

/// Load a 2D flat-field map
pub fn load_flatfield(path: &Path) -> Result<Array2<f64>, LoaderError> {
    into_2d(read_array_file(path)?, path)
}

/// Load a hot pixel map, 2D or a 3D stack of maps summed along the first axis.
/// Any non-zero pixel is hot.
pub fn load_hotpixels(path: &Path) -> Result<Array2<u8>, LoaderError> {
    let array = read_array_file(path)?;
    let map = match array.ndim() {
        2 => into_2d(array, path)?,
        3 => into_3d(array, path)?.sum_axis(Axis(0)),
        found => {
            return Err(LoaderError::BadDimensions {
                path: path.to_path_buf(),
                expected: String::from("2 or 3"),
                found,
            })
        }
    };
    Ok(map.mapv(|v| u8::from(v != 0.0)))
}

/// Load a 2D background map
pub fn load_background(path: &Path) -> Result<Array2<f64>, LoaderError> {
    into_2d(read_array_file(path)?, path)
}

/// Detector calibration maps, all optional
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    pub flatfield: Option<Array2<f64>>,
    pub hotpixels: Option<Array2<u8>>,
    pub background: Option<Array2<f64>>,
}

impl Calibration {
    pub fn load(config: &Config) -> Result<Self, LoaderError> {
        let flatfield = config
            .flatfield_file
            .as_deref()
            .map(load_flatfield)
            .transpose()?;
        let hotpixels = config
            .hotpixels_file
            .as_deref()
            .map(load_hotpixels)
            .transpose()?;
        let background = config
            .background_file
            .as_deref()
            .map(load_background)
            .transpose()?;
        if let Some(hot) = &hotpixels {
            spdlog::info!("Loaded hot pixel map with {} hot pixels", hot.iter().filter(|h| **h != 0).count());
        }
        Ok(Self {
            flatfield,
            hotpixels,
            background,
        })
    }

    /// Check every map against the raw frame shape
    fn check_shape(&self, frame_shape: (usize, usize), config: &Config) -> Result<(), LoaderError> {
        let maps = [
            (self.flatfield.as_ref().map(|m| m.dim()), &config.flatfield_file),
            (self.hotpixels.as_ref().map(|m| m.dim()), &config.hotpixels_file),
            (self.background.as_ref().map(|m| m.dim()), &config.background_file),
        ];
        for (dim, path) in maps {
            if let (Some(dim), Some(path)) = (dim, path) {
                if dim != frame_shape {
                    return Err(LoaderError::ShapeMismatch {
                        path: path.clone(),
                        expected: vec![frame_shape.0, frame_shape.1],
                        found: vec![dim.0, dim.1],
                    });
                }
            }
        }
        Ok(())
    }
}

fn open_dataset(path: &Path, dataset: &str) -> Result<hdf5::Dataset, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::BadFilePath(path.to_path_buf()));
    }
    let file = hdf5::File::open(path)?;
    Ok(file.dataset(dataset)?)
}

/// Read the raw stack (frames, y, x) from an HDF5 dataset
pub fn read_raw_stack(path: &Path, dataset: &str) -> Result<Array3<f64>, LoaderError> {
    let array = open_dataset(path, dataset)?
        .as_reader()
        .conv(hdf5::Conversion::Hard)
        .read_dyn::<f64>()?;
    into_3d(array, path)
}

/// Read the 1D monitor (incident flux) values of a scan
pub fn read_monitor(path: &Path, dataset: &str) -> Result<Array1<f64>, LoaderError> {
    Ok(open_dataset(path, dataset)?
        .as_reader()
        .conv(hdf5::Conversion::Hard)
        .read_1d::<f64>()?)
}

/// Scale each frame by `monitor.min() / monitor[frame]`
pub fn normalize_by_monitor(data: &mut Array3<f64>, monitor: &Array1<f64>) -> Result<(), LoaderError> {
    let nz = data.len_of(Axis(0));
    if monitor.len() != nz {
        return Err(LoaderError::MonitorLength(monitor.len(), nz));
    }
    if monitor.iter().any(|m| !m.is_finite() || *m <= 0.0) {
        return Err(LoaderError::BadMonitor);
    }
    let min = monitor.fold(f64::INFINITY, |acc, m| acc.min(*m));
    let max = monitor.fold(0.0_f64, |acc, m| acc.max(*m));
    spdlog::info!("Normalizing by monitor, min: {} max: {}", min, max);
    for (mut frame, value) in data.axis_iter_mut(Axis(0)).zip(monitor.iter()) {
        frame *= min / value;
    }
    Ok(())
}

/// Per-frame corrections applied while loading the raw stack
pub struct FrameCorrector<'a> {
    calibration: &'a Calibration,
    linearity: Option<&'a [f64]>,
    threshold: f64,
    roi: [usize; 4],
    binning: (usize, usize),
}

impl<'a> FrameCorrector<'a> {
    pub fn new(config: &'a Config, calibration: &'a Calibration) -> Result<Self, LoaderError> {
        let [_, by, bx] = config.detector.binning;
        Ok(Self {
            calibration,
            linearity: config.linearity_coefficients.as_deref(),
            threshold: config.loading_threshold(),
            roi: config.detector.roi_bounds()?,
            binning: (by, bx),
        })
    }

    /// Correct a full detector frame: linearity, flat-field, hot pixels, background,
    /// threshold, then crop to the ROI and bin. Returns the frame and its mask.
    pub fn correct(&self, frame: ArrayView2<f64>) -> Result<(Array2<f64>, Array2<u8>), LoaderError> {
        let mut frame = frame.to_owned();
        let mut mask = Array2::<u8>::zeros(frame.raw_dim());

        if let Some(coefficients) = self.linearity {
            frame.mapv_inplace(|v| coefficients.iter().rev().fold(0.0, |acc, c| acc * v + c));
        }
        if let Some(flatfield) = &self.calibration.flatfield {
            frame *= flatfield;
        }
        if let Some(hotpixels) = &self.calibration.hotpixels {
            Zip::from(&mut frame)
                .and(&mut mask)
                .and(hotpixels)
                .for_each(|value, flag, hot| {
                    if *hot != 0 {
                        *value = 0.0;
                        *flag = 1;
                    }
                });
        }
        if let Some(background) = &self.calibration.background {
            Zip::from(&mut frame).and(background).for_each(|value, bg| {
                *value -= bg;
                if *value < 0.0 {
                    *value = 0.0;
                }
            });
        }
        if self.threshold > 0.0 {
            let threshold = self.threshold;
            frame.mapv_inplace(|v| if v < threshold { 0.0 } else { v });
        }

        let [y0, y1, x0, x1] = self.roi;
        let (by, bx) = self.binning;
        let frame = super::binning::bin_frame(frame.slice(s![y0..y1, x0..x1]), by, bx)?;
        let mask = super::binning::bin_frame_mask(mask.slice(s![y0..y1, x0..x1]), by, bx)?;
        Ok((frame, mask))
    }
}

/// Load and correct the raw stack of a scan. Excluded frames are dropped and flagged 0
/// in frames logical.
pub fn load_bcdi_data(
    config: &Config,
    scan: u32,
    calibration: &Calibration,
) -> Result<DiffractionStack, LoaderError> {
    let path = config.get_data_file(scan)?;
    let raw = read_raw_stack(&path, &config.data_dataset)?;
    let (nb_frames, ny, nx) = raw.dim();
    spdlog::info!(
        "Loaded raw stack of shape {:?} from {} ({})",
        raw.shape(),
        path.to_string_lossy(),
        human_bytes::human_bytes((raw.len() * std::mem::size_of::<f64>()) as f64)
    );

    let detector = &config.detector;
    if (ny, nx) != (detector.nb_pixel_y, detector.nb_pixel_x) {
        return Err(LoaderError::ShapeMismatch {
            path,
            expected: vec![nb_frames, detector.nb_pixel_y, detector.nb_pixel_x],
            found: vec![nb_frames, ny, nx],
        });
    }
    calibration.check_shape((ny, nx), config)?;

    let mut frames_logical = vec![1i8; nb_frames];
    for idx in config.excluded_frames.iter() {
        match frames_logical.get_mut(*idx) {
            Some(flag) => *flag = 0,
            None => spdlog::warn!(
                "Excluded frame {} is out of range for a scan of {} frames, ignoring",
                idx,
                nb_frames
            ),
        }
    }
    let kept: Vec<usize> = (0..nb_frames)
        .filter(|idx| frames_logical[*idx] == 1)
        .collect();
    if kept.len() < MIN_FRAMES {
        return Err(LoaderError::NotEnoughFrames(kept.len(), nb_frames));
    }
    if kept.len() != nb_frames {
        spdlog::info!("Excluding {} frames", nb_frames - kept.len());
    }

    let corrector = FrameCorrector::new(config, calibration)?;
    let (out_y, out_x) = detector.binned_frame_shape()?;
    let mut data = Array3::<f64>::zeros((kept.len(), out_y, out_x));
    let mut mask = Array3::<u8>::zeros((kept.len(), out_y, out_x));
    for (row, idx) in kept.iter().enumerate() {
        let (frame, frame_mask) = corrector.correct(raw.index_axis(Axis(0), *idx))?;
        data.index_axis_mut(Axis(0), row).assign(&frame);
        mask.index_axis_mut(Axis(0), row).assign(&frame_mask);
    }

    if config.normalize_flux {
        let dataset = config
            .monitor_dataset
            .as_deref()
            .ok_or(LoaderError::MissingMonitor)?;
        let monitor = read_monitor(&path, dataset)?;
        if monitor.len() != nb_frames {
            return Err(LoaderError::MonitorLength(monitor.len(), nb_frames));
        }
        let monitor = Array1::from_iter(kept.iter().map(|idx| monitor[*idx]));
        normalize_by_monitor(&mut data, &monitor)?;
    }

    Ok(DiffractionStack::new(data, mask, None, frames_logical)?)
}

/// Read the qx, qz, qy arrays saved with a previous orthogonal run
pub fn read_q_values(path: &Path) -> Result<QValues, LoaderError> {
    if !path.exists() {
        return Err(LoaderError::BadFilePath(path.to_path_buf()));
    }
    let mut reader = NpzReader::new(File::open(path)?)?;
    Ok(QValues {
        qx: reader.by_name("qx")?,
        qz: reader.by_name("qz")?,
        qy: reader.by_name("qy")?,
    })
}

/// Reload the data and mask of a previous run.
///
/// Orthogonal data is binned along every axis together with its q values. Data in the
/// detector frame gets the loading threshold and the detector plane binning, the
/// stacking axis is binned after masking.
pub fn reload_bcdi_data(config: &Config, reload: &ReloadPaths) -> Result<DiffractionStack, LoaderError> {
    let mut data = into_3d(read_array_file(&reload.data)?, &reload.data)?;
    let mask = into_3d(read_array_file(&reload.mask)?, &reload.mask)?;
    if mask.dim() != data.dim() {
        return Err(LoaderError::ShapeMismatch {
            path: reload.mask.clone(),
            expected: data.shape().to_vec(),
            found: mask.shape().to_vec(),
        });
    }
    let mask = mask.mapv(|v| u8::from(v != 0.0));
    let nz = data.len_of(Axis(0));
    if nz < MIN_FRAMES {
        return Err(LoaderError::NotEnoughFrames(nz, nz));
    }
    spdlog::info!(
        "Reloaded data of shape {:?} from {}",
        data.shape(),
        reload.data.to_string_lossy()
    );

    if config.reload_orthogonal {
        let q_values = match &reload.q_values {
            Some(path) if path.exists() => Some(read_q_values(path)?),
            Some(path) => {
                spdlog::warn!("q values file {} not found, continuing without q values", path.to_string_lossy());
                None
            }
            None => None,
        };
        let mut stack = DiffractionStack::new(data, mask, q_values, vec![1; nz])?;
        if config.detector.binning != [1, 1, 1] {
            spdlog::info!("Binning the reloaded orthogonal data by {:?}", config.detector.binning);
        }
        stack.bin(config.detector.binning)?;
        return Ok(stack);
    }

    let threshold = config.loading_threshold();
    if threshold > 0.0 {
        data.mapv_inplace(|v| if v < threshold { 0.0 } else { v });
    }
    let [_, by, bx] = config.detector.binning;
    let mut stack = DiffractionStack::new(data, mask, None, vec![1; nz])?;
    stack.bin([1, by, bx])?;
    Ok(stack)
}
