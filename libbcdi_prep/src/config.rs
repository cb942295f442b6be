use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::center::Centering;
use super::constants::{ORTHO_SAVE_DIRNAME, RAW_SAVE_DIRNAME};
use super::crop_pad::FftOption;
use super::detector::Detector;
use super::error::ConfigError;
use super::filters::IsolatedFilter;
use super::masking::{AlienBox, MaskPolygon};

/// Whether the photon threshold is also applied while loading. A non-zero threshold is
/// always applied after filtering, where values below it are set to 0 and masked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhotonFilter {
    /// On each frame while loading, values below the threshold are set to 0
    #[default]
    Loading,
    /// Only after filtering
    Postprocessing,
}

/// Files of a previous preprocessing run to resume from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReloadPaths {
    pub data: PathBuf,
    pub mask: PathBuf,
    pub q_values: Option<PathBuf>,
}

/// Structure representing the preprocessing configuration. Contains pathing, detector,
/// correction, centering, masking and output information.
/// Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scans: Vec<u32>,
    pub root_folder: PathBuf,
    pub save_dir: Option<PathBuf>,
    pub data_dirname: String,
    pub sample_name: String,
    pub user_comment: String,
    pub data_file_template: String,
    pub data_dataset: String,
    pub monitor_dataset: Option<String>,
    pub detector: Detector,
    pub flatfield_file: Option<PathBuf>,
    pub hotpixels_file: Option<PathBuf>,
    pub background_file: Option<PathBuf>,
    pub linearity_coefficients: Option<Vec<f64>>,
    pub photon_threshold: f64,
    pub photon_filter: PhotonFilter,
    pub normalize_flux: bool,
    pub mask_zero_event: bool,
    pub isolated_filter: IsolatedFilter,
    pub medfilt_order: usize,
    pub centering: Centering,
    pub fix_bragg: Option<[usize; 3]>,
    pub fix_size: Option<[usize; 6]>,
    pub center_fft: FftOption,
    pub pad_size: Option<[usize; 3]>,
    pub use_rawdata: bool,
    pub reload_previous: Option<ReloadPaths>,
    pub reload_orthogonal: bool,
    pub fill_value_mask: u8,
    pub align_q: bool,
    pub ref_axis_q: String,
    pub excluded_frames: Vec<usize>,
    pub aliens: Vec<AlienBox>,
    pub mask_polygons: Vec<MaskPolygon>,
    pub save_rawdata: bool,
    pub save_to_npz: bool,
    pub save_to_hdf: bool,
    pub save_asint: bool,
    pub n_threads: i32,
}

impl Default for Config {
    /// Generate a new Config object. Paths are placeholders
    fn default() -> Self {
        Self {
            scans: vec![0],
            root_folder: PathBuf::from("None"),
            save_dir: None,
            data_dirname: String::from("data"),
            sample_name: String::from("S"),
            user_comment: String::from(""),
            data_file_template: String::from("S{scan}.h5"),
            data_dataset: String::from("/entry/data/data"),
            monitor_dataset: None,
            detector: Detector::default(),
            flatfield_file: None,
            hotpixels_file: None,
            background_file: None,
            linearity_coefficients: None,
            photon_threshold: 0.0,
            photon_filter: PhotonFilter::Loading,
            normalize_flux: false,
            mask_zero_event: false,
            isolated_filter: IsolatedFilter::Skip,
            medfilt_order: 7,
            centering: Centering::Max,
            fix_bragg: None,
            fix_size: None,
            center_fft: FftOption::CropAsymZYX,
            pad_size: None,
            use_rawdata: true,
            reload_previous: None,
            reload_orthogonal: false,
            fill_value_mask: 1,
            align_q: false,
            ref_axis_q: String::from("y"),
            excluded_frames: vec![],
            aliens: vec![],
            mask_polygons: vec![],
            save_rawdata: false,
            save_to_npz: true,
            save_to_hdf: false,
            save_asint: false,
            n_threads: 1,
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a resolved and validated Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        serde_yaml::from_str::<Self>(&yaml_str)?.resolve()
    }

    /// Apply the rules tying parameters together, then validate
    pub fn resolve(mut self) -> Result<Self, ConfigError> {
        if self.scans.len() > 1 && !self.center_fft.is_shape_stable() {
            spdlog::warn!(
                "Several scans requested, center_fft {:?} overridden to skip so outputs share a shape",
                self.center_fft
            );
            self.center_fft = FftOption::Skip;
        }
        if self.fix_size.is_some() {
            spdlog::info!("fix_size provided, detector ROI cleared and center_fft set to skip");
            self.detector.roi.clear();
            self.center_fft = FftOption::Skip;
        }
        if self.reload_previous.is_none() {
            self.detector.preprocessing_binning = [1, 1, 1];
            self.reload_orthogonal = false;
        } else if self.normalize_flux {
            spdlog::warn!("Reloaded data is assumed to be normalized already, normalize_flux ignored");
            self.normalize_flux = false;
        }
        if self.reload_orthogonal {
            self.use_rawdata = false;
            self.center_fft = FftOption::Skip;
            self.fix_size = None;
        }
        self.validate()?;
        Ok(self)
    }

    /// Check parameter values and combinations
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        if self.scans.is_empty() {
            return Err(ConfigError::InvalidParameter(String::from(
                "at least one scan is required",
            )));
        }
        if !self.is_n_threads_valid() {
            return Err(ConfigError::InvalidParameter(format!(
                "n_threads must be at least 1, got {}",
                self.n_threads
            )));
        }
        if self.fill_value_mask > 1 {
            return Err(ConfigError::InvalidParameter(format!(
                "fill_value_mask should be 0 or 1, got {}",
                self.fill_value_mask
            )));
        }
        if self.align_q && !matches!(self.ref_axis_q.as_str(), "x" | "y" | "z") {
            return Err(ConfigError::InvalidParameter(format!(
                "ref_axis_q should be either 'x', 'y' or 'z', got {}",
                self.ref_axis_q
            )));
        }
        if self.photon_threshold.is_nan() || self.photon_threshold < 0.0 {
            return Err(ConfigError::InvalidParameter(format!(
                "photon_threshold must be positive, got {}",
                self.photon_threshold
            )));
        }
        if matches!(
            self.isolated_filter,
            IsolatedFilter::MaskIsolated | IsolatedFilter::InterpIsolated
        ) && !(1..=8).contains(&self.medfilt_order)
        {
            return Err(ConfigError::InvalidParameter(format!(
                "medfilt_order must be between 1 and 8 for a 3x3 window, got {}",
                self.medfilt_order
            )));
        }
        if !self.use_rawdata && !self.reload_orthogonal {
            return Err(ConfigError::InvalidParameter(String::from(
                "gridding detector frame data is not supported, set use_rawdata or reload orthogonal data",
            )));
        }
        if self.reload_previous.is_some() && self.scans.len() != 1 {
            return Err(ConfigError::InvalidParameter(format!(
                "reload_previous resumes a single scan, got {} scans",
                self.scans.len()
            )));
        }
        Ok(())
    }

    /// Threshold applied to frames while loading, 0 in postprocessing mode
    pub fn loading_threshold(&self) -> f64 {
        match self.photon_filter {
            PhotonFilter::Loading => self.photon_threshold,
            PhotonFilter::Postprocessing => 0.0,
        }
    }

    /// Comment common to every scan: user comment, reload and q alignment tags
    pub fn base_comment(&self) -> String {
        let mut comment = self.user_comment.clone();
        if !comment.is_empty() && !comment.starts_with('_') {
            comment.insert(0, '_');
        }
        if self.reload_previous.is_some() {
            comment.push_str("_reloaded");
        }
        if self.align_q {
            comment.push_str(&format!("_align-q-{}", self.ref_axis_q));
        }
        comment
    }

    /// Comment of the output files of a scan, before the final shape is known
    pub fn scan_comment(&self) -> String {
        let mut comment = self.base_comment();
        if !self.use_rawdata {
            comment.push_str("_ortho");
        }
        if self.normalize_flux {
            comment.push_str("_norm");
        }
        comment
    }

    /// Name of the save directory inside of a scan directory
    pub fn save_dirname(&self) -> &'static str {
        if self.use_rawdata {
            RAW_SAVE_DIRNAME
        } else {
            ORTHO_SAVE_DIRNAME
        }
    }

    /// Get the Path to the directory of a scan
    pub fn get_scan_directory(&self, scan: u32) -> PathBuf {
        self.root_folder.join(format!("{}{}", self.sample_name, scan))
    }

    /// Get the Path to the raw data file of a scan
    pub fn get_data_file(&self, scan: u32) -> Result<PathBuf, ConfigError> {
        let file_name = self
            .data_file_template
            .replace("{scan}", &scan.to_string());
        let path = self
            .get_scan_directory(scan)
            .join(&self.data_dirname)
            .join(file_name);
        if path.exists() {
            Ok(path)
        } else {
            Err(ConfigError::BadFilePath(path))
        }
    }

    /// Get the directory outputs of a scan are written to. Without an explicit save_dir,
    /// reloaded data is saved next to the reloaded file.
    pub fn get_save_directory(&self, scan: u32) -> PathBuf {
        if let Some(dir) = &self.save_dir {
            return dir.clone();
        }
        if let Some(parent) = self
            .reload_previous
            .as_ref()
            .and_then(|reload| reload.data.parent())
        {
            return parent.to_path_buf();
        }
        self.get_scan_directory(scan).join(self.save_dirname())
    }

    /// Check if the raw data of a scan can be found, reloads always exist
    pub fn does_scan_exist(&self, scan: u32) -> bool {
        match &self.reload_previous {
            Some(reload) => reload.data.exists(),
            None => self.get_data_file(scan).is_ok(),
        }
    }

    pub fn is_n_threads_valid(&self) -> bool {
        self.n_threads >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_round_trip() {
        let yaml = serde_yaml::to_string(&Config::default()).unwrap();
        let config: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.center_fft, FftOption::CropAsymZYX);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let yaml = "scans: [11, 12]\ncenter_fft: crop_sym_ZYX\nphoton_filter: postprocessing\n";
        let config = serde_yaml::from_str::<Config>(yaml)
            .unwrap()
            .resolve()
            .unwrap();
        assert_eq!(config.center_fft, FftOption::Skip);
        assert_eq!(config.loading_threshold(), 0.0);
        assert_eq!(config.n_threads, 1);
    }

    #[test]
    fn test_fix_size_clears_roi() {
        let mut config = Config {
            fix_size: Some([0, 10, 0, 10, 0, 10]),
            ..Default::default()
        };
        config.detector.roi = vec![0, 100, 0, 100];
        let config = config.resolve().unwrap();
        assert!(config.detector.roi.is_empty());
        assert_eq!(config.center_fft, FftOption::Skip);
    }

    #[test]
    fn test_comments() {
        let config = Config {
            user_comment: String::from("test"),
            align_q: true,
            ref_axis_q: String::from("z"),
            normalize_flux: true,
            ..Default::default()
        };
        assert_eq!(config.base_comment(), "_test_align-q-z");
        assert_eq!(config.scan_comment(), "_test_align-q-z_norm");

        let config = Config {
            reload_previous: Some(ReloadPaths {
                data: PathBuf::from("/tmp/out/S1_pynx.npz"),
                mask: PathBuf::from("/tmp/out/S1_maskpynx.npz"),
                q_values: None,
            }),
            reload_orthogonal: true,
            normalize_flux: true,
            ..Default::default()
        }
        .resolve()
        .unwrap();
        assert!(!config.use_rawdata);
        assert_eq!(config.scan_comment(), "_reloaded_ortho");
        assert_eq!(config.get_save_directory(1), PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_invalid_parameters() {
        let config = Config {
            fill_value_mask: 2,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let config = Config {
            use_rawdata: false,
            ..Default::default()
        };
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::InvalidParameter(_))
        ));
        let config = Config {
            n_threads: 0,
            ..Default::default()
        };
        assert!(!config.is_n_threads_valid());
    }

    #[test]
    fn test_paths() {
        let config = Config {
            root_folder: PathBuf::from("/data/exp"),
            sample_name: String::from("Pt_"),
            ..Default::default()
        };
        assert_eq!(
            config.get_save_directory(42),
            PathBuf::from("/data/exp/Pt_42/pynxraw")
        );
        assert!(matches!(
            config.get_data_file(42),
            Err(ConfigError::BadFilePath(_))
        ));
    }
}
