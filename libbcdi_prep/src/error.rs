use std::path::PathBuf;
use thiserror::Error;

use super::worker_status::WorkerStatus;

#[derive(Debug, Clone, Error)]
pub enum ShapeError {
    #[error("Maximum prime factor must be at least 2, got {0}")]
    BadMaxPrime(usize),
    #[error("Required divider {0} has a prime factor larger than the maximum prime {1}")]
    IncompatibleDivider(usize, usize),
    #[error("No size smaller or equal to {0} satisfies maximum prime {1} and dividers {2:?}")]
    NoSmallerSize(usize, usize, Vec<usize>),
    #[error("Invalid binning factors {0:?}; all factors must be at least 1")]
    BadBinning(Vec<usize>),
    #[error("Binning {binning:?} is larger than the array shape {shape:?}")]
    BinningTooLarge {
        binning: Vec<usize>,
        shape: Vec<usize>,
    },
}

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("Detector ROI {0:?} is invalid for a {1}x{2} detector; expected [y0, y1, x0, x1] with y0 < y1 and x0 < x1")]
    BadRoi(Vec<usize>, usize, usize),
    #[error("Detector binning {0:?} is invalid; all factors must be at least 1")]
    BadBinning([usize; 3]),
    #[error("Bragg peak pixel {0:?} lies outside of the detector ROI {1:?}")]
    BraggOutsideRoi([usize; 3], [usize; 4]),
}

#[derive(Debug, Error)]
pub enum CropPadError {
    #[error("Crop center {center} incompatible with output size {size} along axis {axis} of length {length}")]
    CropOutOfBounds {
        axis: usize,
        center: usize,
        size: usize,
        length: usize,
    },
    #[error("Pad start {start} incompatible with output size {size} along axis {axis} of length {length}")]
    PadOutOfBounds {
        axis: usize,
        start: usize,
        size: usize,
        length: usize,
    },
    #[error("Padding option requires pad_size, but none was given")]
    MissingPadSize,
    #[error("pad_size {0} along axis {1} does not meet FFT requirements")]
    PadSizeNotFftCompatible(usize, usize),
    #[error("pad_size {0} along axis {1} is smaller than the data size {2}")]
    PadSizeTooSmall(usize, usize, usize),
    #[error("fix_size bounds {0:?} do not fit in the data shape {1:?}")]
    BadFixSize([usize; 6], [usize; 3]),
    #[error("Pivot {0:?} lies outside of the data shape {1:?}")]
    PivotOutOfBounds([usize; 3], [usize; 3]),
    #[error("Frames logical holds {0} active frames but the data has {1}")]
    FramesMismatch(usize, usize),
    #[error("Crop/pad failed due to shape error: {0}")]
    Shape(#[from] ShapeError),
}

#[derive(Debug, Error)]
pub enum StackError {
    #[error("Mask shape {0:?} does not match data shape {1:?}")]
    MaskMismatch([usize; 3], [usize; 3]),
    #[error("q values have lengths {0:?}, incompatible with data shape {1:?}")]
    QValuesMismatch([usize; 3], [usize; 3]),
    #[error("Frames logical holds {0} active frames but the data has {1}")]
    FramesMismatch(usize, usize),
    #[error("Frame {0} was excluded from the stack")]
    ExcludedFrame(usize),
    #[error("Frame {0} is out of range for a scan of {1} frames")]
    FrameOutOfRange(usize, usize),
    #[error("Stack failed due to shape error: {0}")]
    Shape(#[from] ShapeError),
}

#[derive(Debug, Error)]
pub enum MaskError {
    #[error("Alien box {0:?} is empty or outside of the data shape {1:?}")]
    BadAlienBox([usize; 6], [usize; 3]),
    #[error("Mask polygon needs at least 3 vertices, got {0}")]
    BadPolygon(usize),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Config has an invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Config failed due to detector error: {0}")]
    DetectorError(#[from] DetectorError),
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("Could not load data as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Loader failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Loader failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Loader failed to read npy file: {0}")]
    ReadNpyError(#[from] ndarray_npy::ReadNpyError),
    #[error("Loader failed to read npz file: {0}")]
    ReadNpzError(#[from] ndarray_npy::ReadNpzError),
    #[error("File {0:?} does not contain any array")]
    EmptyArchive(PathBuf),
    #[error("Array in {path:?} has {found} dimensions, expected {expected}")]
    BadDimensions {
        path: PathBuf,
        expected: String,
        found: usize,
    },
    #[error("Array in {path:?} has shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        path: PathBuf,
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("Monitor has {0} values but the stack has {1} frames")]
    MonitorLength(usize, usize),
    #[error("Monitor contains non-positive values, cannot normalize")]
    BadMonitor,
    #[error("Flux normalization requested but no monitor dataset is configured")]
    MissingMonitor,
    #[error("Only {0} of {1} frames left to process, at least 2 are required")]
    NotEnoughFrames(usize, usize),
    #[error("Loader failed due to detector error: {0}")]
    DetectorError(#[from] DetectorError),
    #[error("Loader failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Loader failed due to stack error: {0}")]
    StackError(#[from] StackError),
    #[error("Loader failed due to shape error: {0}")]
    ShapeError(#[from] ShapeError),
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("Writer failed due to HDF5 error: {0}")]
    HDF5Error(#[from] hdf5::Error),
    #[error("Writer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Writer failed to write npz file: {0}")]
    WriteNpzError(#[from] ndarray_npy::WriteNpzError),
    #[error("Writer failed to convert to yaml: {0}")]
    ParsingError(#[from] serde_yaml::Error),
    #[error("Writer failed to encode an HDF5 string: {0}")]
    StringError(#[from] hdf5::types::StringError),
    #[error("Writer failed to format the timestamp: {0}")]
    TimeError(#[from] time::error::Format),
    #[error("PyNX run template {0:?} has fewer than 3 lines")]
    BadRunTemplate(PathBuf),
}

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Processor failed due to Loader error: {0}")]
    LoaderError(#[from] LoaderError),
    #[error("Processor failed due to detector error: {0}")]
    DetectorError(#[from] DetectorError),
    #[error("Processor failed due to crop/pad error: {0}")]
    CropPadError(#[from] CropPadError),
    #[error("Processor failed due to stack error: {0}")]
    StackError(#[from] StackError),
    #[error("Processor failed due to masking error: {0}")]
    MaskError(#[from] MaskError),
    #[error("Processor failed due to Writer error: {0}")]
    WriterError(#[from] WriterError),
    #[error("Processor failed due to Send error: {0}")]
    SendError(#[from] std::sync::mpsc::SendError<WorkerStatus>),
}
