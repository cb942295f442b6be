/// Largest prime factor allowed in an FFT-friendly array dimension
pub const FFT_MAX_PRIME: usize = 7;
/// Every FFT-friendly array dimension must be divisible by these
pub const FFT_REQUIRED_DIVIDERS: [usize; 1] = [2];

/// Fewest frames a stack needs to meet the FFT requirements along the stacking axis
pub const MIN_FRAMES: usize = 2;

/// Half-width of the isolated pixel window (1 -> 3x3 window)
pub const ISOLATED_EXTENT: usize = 1;
/// Neighbours of an isolated pixel must all be strictly above this intensity
pub const ISOLATED_MIN_COUNT: f64 = 3.0;

/// Save directory name for data kept in the detector frame
pub const RAW_SAVE_DIRNAME: &str = "pynxraw";
/// Save directory name for data gridded in the orthonormal frame
pub const ORTHO_SAVE_DIRNAME: &str = "pynx";
/// Run script template of the phasing tool, updated after each scan
pub const PYNX_RUN_FILE: &str = "pynx_run.txt";

/// This is the version of the output format
pub const FORMAT_VERSION: &str = "1.0";
