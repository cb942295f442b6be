use hdf5::types::VarLenUnicode;
use hdf5::File;
use ndarray::{ArrayBase, Data, Dimension};
use ndarray_npy::{NpzWriter, WritableElement};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use super::constants::{FORMAT_VERSION, PYNX_RUN_FILE};
use super::crop_pad::CenterFftResult;
use super::error::WriterError;
use super::stack::DiffractionStack;

const DATA_NAME: &str = "data";
const MASK_NAME: &str = "mask";
const FRAMES_LOGICAL_NAME: &str = "frames_logical";
const PAD_WIDTH_NAME: &str = "pad_width";

/// Book-keeping of a preprocessed scan, written next to the outputs as YAML
#[derive(Debug, Clone, Default, Serialize)]
pub struct ScanSummary {
    pub version: String,
    pub timestamp: String,
    pub scan: u32,
    pub comment: String,
    pub input_shape: [usize; 3],
    pub center_fft: CenterFftResult,
    pub shape_after_center_fft: [usize; 3],
    pub final_shape: [usize; 3],
    pub binning: [usize; 3],
    pub frames_logical: Vec<i8>,
    pub zero_event_pixels: usize,
    pub alien_voxels: usize,
    pub polygon_voxels: usize,
    pub filtered_pixels: usize,
    pub threshold_voxels: usize,
    pub nan_voxels: usize,
    pub masked_fraction: f64,
}

impl ScanSummary {
    pub fn new(scan: u32) -> Self {
        Self {
            version: format!("{}:{}", env!("CARGO_PKG_NAME"), FORMAT_VERSION),
            scan,
            ..Default::default()
        }
    }
}

fn write_npz<S, D>(path: &Path, arrays: &[(&str, &ArrayBase<S, D>)]) -> Result<(), WriterError>
where
    S: Data,
    S::Elem: WritableElement,
    D: Dimension,
{
    let mut npz = NpzWriter::new_compressed(std::fs::File::create(path)?);
    for (name, array) in arrays {
        npz.add_array(*name, *array)?;
    }
    npz.finish()?;
    Ok(())
}

/// Writes the outputs of one scan into its save directory.
///
/// File names carry the scan number and a comment describing the processing
/// (reload, normalization, final shape and binning).
#[derive(Debug)]
pub struct ScanWriter {
    save_dir: PathBuf,
    scan: u32,
    comment: String,
}
// Outputs
// S{scan}_pynx{comment}.npz - data
// S{scan}_maskpynx{comment}.npz - mask
// QxQzQy_S{scan}{comment}.npz - qx, qz, qy
// S{scan}_data_before_masking_stack.npz - data
// S{scan}_prep{comment}.h5 - data, mask, qx, qz, qy, frames_logical, pad_width - scan, version
// S{scan}_prep{comment}.yml

impl ScanWriter {
    /// Create the writer, creating the save directory if needed
    pub fn new(save_dir: &Path, scan: u32) -> Result<Self, WriterError> {
        std::fs::create_dir_all(save_dir)?;
        Ok(Self {
            save_dir: save_dir.to_path_buf(),
            scan,
            comment: String::new(),
        })
    }

    pub fn set_comment(&mut self, comment: &str) {
        self.comment = comment.to_string();
    }

    pub fn save_dir(&self) -> &Path {
        &self.save_dir
    }

    pub fn data_path(&self) -> PathBuf {
        self.save_dir
            .join(format!("S{}_pynx{}.npz", self.scan, self.comment))
    }

    pub fn mask_path(&self) -> PathBuf {
        self.save_dir
            .join(format!("S{}_maskpynx{}.npz", self.scan, self.comment))
    }

    pub fn q_values_path(&self) -> PathBuf {
        self.save_dir
            .join(format!("QxQzQy_S{}{}.npz", self.scan, self.comment))
    }

    pub fn raw_stack_path(&self) -> PathBuf {
        self.save_dir
            .join(format!("S{}_data_before_masking_stack.npz", self.scan))
    }

    pub fn hdf_path(&self) -> PathBuf {
        self.save_dir
            .join(format!("S{}_prep{}.h5", self.scan, self.comment))
    }

    pub fn summary_path(&self) -> PathBuf {
        self.save_dir
            .join(format!("S{}_prep{}.yml", self.scan, self.comment))
    }

    /// Save the stack as loaded, before any masking
    pub fn write_raw_stack(&self, stack: &DiffractionStack) -> Result<(), WriterError> {
        let path = self.raw_stack_path();
        write_npz(&path, &[(DATA_NAME, &stack.data)])?;
        spdlog::info!("Saved raw stack to {}", path.to_string_lossy());
        Ok(())
    }

    /// Save data, mask and q values (when present) as compressed npz archives
    pub fn write_npz(&self, stack: &DiffractionStack, save_asint: bool) -> Result<(), WriterError> {
        if save_asint {
            let data = stack.data.mapv(|v| v as i64);
            write_npz(&self.data_path(), &[(DATA_NAME, &data)])?;
        } else {
            write_npz(&self.data_path(), &[(DATA_NAME, &stack.data)])?;
        }
        let mask = stack.mask.mapv(|m| i8::from(m != 0));
        write_npz(&self.mask_path(), &[(MASK_NAME, &mask)])?;
        if let Some(q) = &stack.q_values {
            write_npz(
                &self.q_values_path(),
                &[("qx", &q.qx), ("qz", &q.qz), ("qy", &q.qy)],
            )?;
        }
        spdlog::info!(
            "Saved data to {} ({})",
            self.data_path().to_string_lossy(),
            human_bytes::human_bytes((stack.data.len() * std::mem::size_of::<f64>()) as f64)
        );
        Ok(())
    }

    /// Write the final stack in a single HDF5 file
    pub fn write_hdf(
        &self,
        stack: &DiffractionStack,
        summary: &ScanSummary,
    ) -> Result<(), WriterError> {
        let file = File::create(self.hdf_path())?;
        file.new_dataset_builder()
            .with_data(&stack.data)
            .create(DATA_NAME)?;
        file.new_dataset_builder()
            .with_data(&stack.mask)
            .create(MASK_NAME)?;
        if let Some(q) = &stack.q_values {
            file.new_dataset_builder().with_data(&q.qx).create("qx")?;
            file.new_dataset_builder().with_data(&q.qz).create("qz")?;
            file.new_dataset_builder().with_data(&q.qy).create("qy")?;
        }
        file.new_dataset_builder()
            .with_data(stack.frames_logical.as_slice())
            .create(FRAMES_LOGICAL_NAME)?;
        let pad_width = summary.center_fft.pad_width.map(|w| w as i64);
        file.new_dataset_builder()
            .with_data(&pad_width)
            .create(PAD_WIDTH_NAME)?;

        file.new_attr::<u32>()
            .create("scan")?
            .write_scalar(&summary.scan)?;
        file.new_attr::<VarLenUnicode>()
            .create("version")?
            .write_scalar(&VarLenUnicode::from_str(&summary.version)?)?;
        file.new_attr::<VarLenUnicode>()
            .create("comment")?
            .write_scalar(&VarLenUnicode::from_str(&summary.comment)?)?;
        Ok(())
    }

    /// Write the scan summary in a yaml file
    pub fn write_summary(&self, summary: &ScanSummary) -> Result<(), WriterError> {
        let mut summary = summary.clone();
        summary.comment = self.comment.clone();
        summary.timestamp = time::OffsetDateTime::now_utc()
            .format(&time::format_description::well_known::Rfc3339)?;
        let mut file = std::fs::File::create(self.summary_path())?;
        file.write_all(serde_yaml::to_string(&summary)?.as_bytes())?;
        Ok(())
    }

    /// Point the phasing run script of the save directory at the new data and mask.
    /// Returns false when there is no run script to update.
    pub fn update_pynx_run(&self) -> Result<bool, WriterError> {
        let path = self.save_dir.join(PYNX_RUN_FILE);
        if !path.exists() {
            spdlog::info!(
                "No {} in {}, skipping its update",
                PYNX_RUN_FILE,
                self.save_dir.to_string_lossy()
            );
            return Ok(false);
        }
        let text = std::fs::read_to_string(&path)?;
        let mut lines: Vec<String> = text.lines().map(String::from).collect();
        if lines.len() < 3 {
            return Err(WriterError::BadRunTemplate(path));
        }
        lines[1] = format!("data = \"{}\"", self.data_path().to_string_lossy());
        lines[2] = format!("mask = \"{}\"", self.mask_path().to_string_lossy());
        let mut file = std::fs::File::create(&path)?;
        file.write_all((lines.join("\n") + "\n").as_bytes())?;
        spdlog::info!("Updated {}", path.to_string_lossy());
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::QValues;
    use ndarray::{Array1, Array3};
    use ndarray_npy::NpzReader;

    fn small_stack() -> DiffractionStack {
        let data = Array3::from_shape_fn((2, 2, 2), |(z, y, x)| (z * 4 + y * 2 + x) as f64 + 0.7);
        let mut mask = Array3::<u8>::zeros((2, 2, 2));
        mask[[1, 1, 1]] = 1;
        let axis = Array1::linspace(0.0, 0.1, 2);
        let q = QValues {
            qx: axis.clone(),
            qz: axis.clone(),
            qy: axis,
        };
        DiffractionStack::new(data, mask, Some(q), vec![1, 1]).unwrap()
    }

    #[test]
    fn test_paths() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ScanWriter::new(dir.path(), 12).unwrap();
        writer.set_comment("_test_2_2_2_1_1_1");
        assert_eq!(
            writer.data_path(),
            dir.path().join("S12_pynx_test_2_2_2_1_1_1.npz")
        );
        assert_eq!(
            writer.q_values_path(),
            dir.path().join("QxQzQy_S12_test_2_2_2_1_1_1.npz")
        );
        assert_eq!(
            writer.raw_stack_path(),
            dir.path().join("S12_data_before_masking_stack.npz")
        );
    }

    #[test]
    fn test_write_npz_asint() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ScanWriter::new(dir.path(), 1).unwrap();
        writer.write_npz(&small_stack(), true).unwrap();

        let mut npz = NpzReader::new(std::fs::File::open(writer.data_path()).unwrap()).unwrap();
        let data: Array3<i64> = npz.by_name("data").unwrap();
        assert_eq!(data[[0, 0, 0]], 0);
        assert_eq!(data[[1, 1, 1]], 7);
        let mut npz = NpzReader::new(std::fs::File::open(writer.mask_path()).unwrap()).unwrap();
        let mask: Array3<i8> = npz.by_name("mask").unwrap();
        assert_eq!(mask.sum(), 1);
        assert!(writer.q_values_path().exists());
    }

    #[test]
    fn test_summary_and_hdf() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ScanWriter::new(dir.path(), 3).unwrap();
        let stack = small_stack();
        let mut summary = ScanSummary::new(3);
        summary.final_shape = stack.shape();
        writer.write_summary(&summary).unwrap();
        let text = std::fs::read_to_string(writer.summary_path()).unwrap();
        assert!(text.contains("scan: 3"));
        assert!(text.contains("timestamp:"));

        writer.write_hdf(&stack, &summary).unwrap();
        let file = File::open(writer.hdf_path()).unwrap();
        let mask = file.dataset("mask").unwrap().read_dyn::<u8>().unwrap();
        assert_eq!(mask.sum(), 1);
        assert_eq!(file.attr("scan").unwrap().read_scalar::<u32>().unwrap(), 3);
    }

    #[test]
    fn test_update_pynx_run() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ScanWriter::new(dir.path(), 5).unwrap();
        assert!(!writer.update_pynx_run().unwrap());

        std::fs::write(
            dir.path().join(PYNX_RUN_FILE),
            "# pynx\ndata = \"old\"\nmask = \"old\"\nnb_run = 20\n",
        )
        .unwrap();
        assert!(writer.update_pynx_run().unwrap());
        let text = std::fs::read_to_string(dir.path().join(PYNX_RUN_FILE)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "# pynx");
        assert!(lines[1].ends_with("S5_pynx.npz\""));
        assert!(lines[2].starts_with("mask = "));
        assert_eq!(lines[3], "nb_run = 20");

        std::fs::write(dir.path().join(PYNX_RUN_FILE), "only one line\n").unwrap();
        assert!(matches!(
            writer.update_pynx_run(),
            Err(WriterError::BadRunTemplate(_))
        ));
    }
}
