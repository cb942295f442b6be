use std::sync::mpsc::Sender;

use super::config::Config;
use super::crop_pad::{center_fft, fit_fft_shape, CenterFftParams};
use super::error::ProcessorError;
use super::filters::filter_stack;
use super::loader::{load_bcdi_data, reload_bcdi_data, Calibration};
use super::masking::{
    apply_aliens, apply_photon_threshold, apply_polygon, mask_zero_events, remove_nan,
};
use super::worker_status::{Stage, WorkerStatus};
use super::writer::{ScanSummary, ScanWriter};

/// The main loop of bcdi_prep for a single scan.
///
/// Loads (or reloads) the stack, crops/pads it for the FFT, masks, filters, bins the
/// stacking axis, fits the final FFT shape and writes the outputs.
pub fn process_scan(
    config: &Config,
    scan: u32,
    calibration: &Calibration,
    tx: &Sender<WorkerStatus>,
    worker_id: &usize,
) -> Result<ScanSummary, ProcessorError> {
    let status = |progress: f32, stage: Stage| WorkerStatus::new(progress, scan, *worker_id, stage);
    tx.send(status(0.0, Stage::Loading))?;

    let mut stack = match &config.reload_previous {
        Some(reload) => reload_bcdi_data(config, reload)?,
        None => load_bcdi_data(config, scan, calibration)?,
    };
    let mut summary = ScanSummary::new(scan);
    summary.input_shape = stack.shape();
    spdlog::info!("Input data shape: {:?}", summary.input_shape);

    let mut writer = ScanWriter::new(&config.get_save_directory(scan), scan)?;
    if config.save_rawdata && !config.reload_orthogonal {
        writer.write_raw_stack(&stack)?;
    }
    stack.binarize_mask();
    tx.send(status(0.2, Stage::Centering))?;

    // fix_size crops before the pivot is used, the raw Bragg pixel no longer applies
    let fix_bragg = match (config.fix_bragg, config.fix_size) {
        (Some(bragg), None) => {
            let [frame, y, x] = config.detector.bragg_to_roi(bragg)?;
            Some([stack.frame_row(frame)?, y, x])
        }
        _ => None,
    };
    let params = CenterFftParams {
        option: config.center_fft,
        centering: config.centering,
        fix_bragg,
        fix_size: config.fix_size,
        pad_size: config.pad_size,
        mask_fill: config.fill_value_mask,
    };
    let result = center_fft(&mut stack, &params)?;
    summary.shape_after_center_fft = stack.shape();
    let measured_frames = result.measured_frames(stack.shape()[0]);
    spdlog::info!("Pad width: {:?}", result.pad_width);
    spdlog::info!(
        "Data size after cropping / padding: {:?}",
        summary.shape_after_center_fft
    );
    summary.center_fft = result;
    tx.send(status(0.4, Stage::Masking))?;

    if config.mask_zero_event {
        summary.zero_event_pixels = mask_zero_events(&mut stack);
    }
    if !config.aliens.is_empty() {
        summary.alien_voxels = apply_aliens(&mut stack, &config.aliens)?;
        spdlog::info!("Masked {} voxels in alien boxes", summary.alien_voxels);
    }
    for polygon in config.mask_polygons.iter() {
        summary.polygon_voxels += apply_polygon(&mut stack, polygon)?;
    }
    stack.binarize_mask();

    summary.filtered_pixels = filter_stack(
        &mut stack,
        config.isolated_filter,
        config.medfilt_order,
        measured_frames,
    );
    if config.photon_threshold > 0.0 {
        spdlog::info!("Applying photon threshold < {}", config.photon_threshold);
        summary.threshold_voxels = apply_photon_threshold(&mut stack, config.photon_threshold);
    }
    summary.nan_voxels = remove_nan(&mut stack);
    if summary.nan_voxels > 0 {
        spdlog::warn!("Replaced {} non-finite voxels by masked zeros", summary.nan_voxels);
    }
    stack.binarize_mask();
    tx.send(status(0.6, Stage::Masking))?;

    // the detector plane was binned while loading, reloaded orthogonal data is fully binned
    let stacking_binning = config.detector.binning[0];
    if stacking_binning != 1 && !config.reload_orthogonal {
        stack.bin([stacking_binning, 1, 1])?;
        spdlog::info!(
            "Data size after binning the stacking dimension: {:?}",
            stack.shape()
        );
    }

    let [nz, ny, nx] = fit_fft_shape(&mut stack)?;
    spdlog::info!(
        "Data size after considering FFT shape requirements: {:?}",
        [nz, ny, nx]
    );
    summary.final_shape = [nz, ny, nx];
    summary.binning = config.detector.total_binning();
    summary.frames_logical = stack.frames_logical.clone();
    summary.masked_fraction = stack.mask.iter().filter(|m| **m != 0).count() as f64
        / stack.mask.len().max(1) as f64;
    tx.send(status(0.8, Stage::Saving))?;

    let comment = format!(
        "{}_{}_{}_{}{}",
        config.scan_comment(),
        nz,
        ny,
        nx,
        config.detector.binning_comment()
    );
    writer.set_comment(&comment);
    summary.comment = comment;
    spdlog::info!("Saving directory: {}", writer.save_dir().to_string_lossy());
    if config.save_to_npz {
        writer.write_npz(&stack, config.save_asint)?;
    }
    if config.save_to_hdf {
        writer.write_hdf(&stack, &summary)?;
    }
    writer.write_summary(&summary)?;
    if config.save_to_npz {
        writer.update_pynx_run()?;
    }

    tx.send(status(1.0, Stage::Saving))?;
    Ok(summary)
}

fn process_scans(
    config: &Config,
    tx: &Sender<WorkerStatus>,
    worker_id: usize,
    scans: &[u32],
) -> Result<(), ProcessorError> {
    let calibration = match config.reload_previous {
        Some(_) => Calibration::default(),
        None => Calibration::load(config)?,
    };
    for scan in scans.iter() {
        if config.does_scan_exist(*scan) {
            spdlog::info!("Processing scan {}...", scan);
            process_scan(config, *scan, &calibration, tx, &worker_id)?;
            spdlog::info!("Finished processing scan {}.", scan);
        } else {
            spdlog::info!("Scan {} does not exist, skipping...", scan);
        }
    }
    Ok(())
}

/// The function to be called by a separate thread.
/// Processes every scan of the config in sequence
pub fn process(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
) -> Result<(), ProcessorError> {
    process_scans(&config, &tx, worker_id, &config.scans)
}

/// Process a subset of scans
pub fn process_subset(
    config: Config,
    tx: Sender<WorkerStatus>,
    worker_id: usize,
    subset: Vec<u32>,
) -> Result<(), ProcessorError> {
    process_scans(&config, &tx, worker_id, &subset)
}

/// Divide the scans in to a set of subsets (per thread/worker)
pub fn create_subsets(config: &Config) -> Vec<Vec<u32>> {
    let mut subsets: Vec<Vec<u32>> = vec![Vec::new(); config.n_threads.max(1) as usize];
    let n_subsets = subsets.len();

    for (idx, scan) in config.scans.iter().enumerate() {
        subsets[idx % n_subsets].push(*scan)
    }

    subsets
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PhotonFilter;
    use crate::crop_pad::FftOption;
    use crate::error::StackError;
    use crate::detector::Detector;
    use crate::filters::IsolatedFilter;
    use crate::masking::AlienBox;
    use ndarray::Array3;
    use ndarray_npy::NpzReader;
    use std::sync::mpsc;

    #[test]
    fn test_create_subsets() {
        let config = Config {
            scans: vec![1, 2, 3, 4, 5],
            n_threads: 2,
            ..Default::default()
        };
        assert_eq!(create_subsets(&config), vec![vec![1, 3, 5], vec![2, 4]]);
    }

    fn write_scan(config: &Config, scan: u32, frames: &Array3<u32>) {
        let dir = config.get_scan_directory(scan).join(&config.data_dirname);
        std::fs::create_dir_all(&dir).unwrap();
        let file = hdf5::File::create(dir.join(format!("S{scan}.h5"))).unwrap();
        file.new_dataset_builder()
            .with_data(frames)
            .create("frames")
            .unwrap();
    }

    #[test]
    fn test_process_scan() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            scans: vec![3],
            root_folder: dir.path().to_path_buf(),
            data_dataset: String::from("frames"),
            detector: Detector {
                nb_pixel_y: 18,
                nb_pixel_x: 16,
                binning: [2, 1, 1],
                ..Default::default()
            },
            center_fft: FftOption::CropAsymZYX,
            mask_zero_event: true,
            isolated_filter: IsolatedFilter::MaskIsolated,
            aliens: vec![AlienBox([0, 1, 0, 2, 0, 2])],
            ..Default::default()
        }
        .resolve()
        .unwrap();

        let frames = Array3::<u32>::from_shape_fn((13, 18, 16), |(z, y, x)| {
            let r2 = (z as i64 - 6).pow(2) + (y as i64 - 9).pow(2) + (x as i64 - 8).pow(2);
            (1000 / (1 + r2)) as u32
        });
        write_scan(&config, 3, &frames);
        let save_dir = config.get_save_directory(3);
        std::fs::create_dir_all(&save_dir).unwrap();
        std::fs::write(
            save_dir.join(crate::constants::PYNX_RUN_FILE),
            "# run\ndata = \"\"\nmask = \"\"\n",
        )
        .unwrap();

        let (tx, rx) = mpsc::channel();
        let summary = process_scan(&config, 3, &Calibration::default(), &tx, &0).unwrap();
        // crop_asym: 13 -> 12, 18 -> 18, 16 -> 16, then 12 frames binned by 2
        assert_eq!(summary.input_shape, [13, 18, 16]);
        assert_eq!(summary.shape_after_center_fft, [12, 18, 16]);
        assert_eq!(summary.final_shape, [6, 18, 16]);
        assert_eq!(summary.comment, "_6_18_16_2_1_1");
        assert_eq!(summary.alien_voxels, 4);

        let data_path = save_dir.join("S3_pynx_6_18_16_2_1_1.npz");
        let mut npz = NpzReader::new(std::fs::File::open(&data_path).unwrap()).unwrap();
        let data: Array3<f64> = npz.by_name("data").unwrap();
        assert_eq!(data.dim(), (6, 18, 16));
        assert!(save_dir.join("S3_maskpynx_6_18_16_2_1_1.npz").exists());
        assert!(save_dir.join("S3_prep_6_18_16_2_1_1.yml").exists());
        let run = std::fs::read_to_string(save_dir.join(crate::constants::PYNX_RUN_FILE)).unwrap();
        assert!(run.contains("S3_pynx_6_18_16_2_1_1.npz"));

        let statuses: Vec<WorkerStatus> = rx.try_iter().collect();
        assert_eq!(statuses.first().map(|s| s.stage), Some(Stage::Loading));
        assert_eq!(statuses.last().map(|s| s.progress), Some(1.0));
    }

    fn peak_frames(shape: (usize, usize, usize), center: [i64; 3]) -> Array3<u32> {
        Array3::<u32>::from_shape_fn(shape, |(z, y, x)| {
            let r2 = (z as i64 - center[0]).pow(2)
                + (y as i64 - center[1]).pow(2)
                + (x as i64 - center[2]).pow(2);
            (1000 / (1 + r2)) as u32
        })
    }

    #[test]
    fn test_threshold_masks_in_loading_mode() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            scans: vec![4],
            root_folder: dir.path().to_path_buf(),
            data_dataset: String::from("frames"),
            detector: Detector {
                nb_pixel_y: 18,
                nb_pixel_x: 16,
                ..Default::default()
            },
            center_fft: FftOption::Skip,
            photon_threshold: 20.0,
            photon_filter: PhotonFilter::Loading,
            ..Default::default()
        }
        .resolve()
        .unwrap();
        write_scan(&config, 4, &peak_frames((12, 18, 16), [6, 9, 8]));

        let (tx, _rx) = mpsc::channel();
        let summary = process_scan(&config, 4, &Calibration::default(), &tx, &0).unwrap();
        assert_eq!(summary.final_shape, [12, 18, 16]);
        assert!(summary.threshold_voxels > 0);

        let mask_path = config
            .get_save_directory(4)
            .join("S4_maskpynx_12_18_16_1_1_1.npz");
        let mut npz = NpzReader::new(std::fs::File::open(&mask_path).unwrap()).unwrap();
        let mask: Array3<i8> = npz.by_name("mask").unwrap();
        // 1000 / (1 + 36 + 81 + 64) is below the threshold
        assert_eq!(mask[[0, 0, 0]], 1);
        assert_eq!(mask[[6, 9, 8]], 0);
        assert_eq!(
            mask.iter().filter(|m| **m != 0).count(),
            summary.threshold_voxels
        );
    }

    fn bragg_config(dir: &std::path::Path, fix_bragg: [usize; 3]) -> Config {
        Config {
            scans: vec![5],
            root_folder: dir.to_path_buf(),
            data_dataset: String::from("frames"),
            detector: Detector {
                nb_pixel_y: 8,
                nb_pixel_x: 8,
                ..Default::default()
            },
            center_fft: FftOption::CropSymZYX,
            excluded_frames: vec![0],
            fix_bragg: Some(fix_bragg),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    #[test]
    fn test_fix_bragg_with_excluded_frames() {
        let dir = tempfile::tempdir().unwrap();
        let config = bragg_config(dir.path(), [5, 4, 4]);
        write_scan(&config, 5, &peak_frames((10, 8, 8), [5, 4, 4]));
        let (tx, _rx) = mpsc::channel();

        // raw frame 5 is row 4 once frame 0 is dropped
        let summary = process_scan(&config, 5, &Calibration::default(), &tx, &0).unwrap();
        assert_eq!(summary.center_fft.pivot, Some([4, 4, 4]));

        let config = bragg_config(dir.path(), [9, 4, 4]);
        let summary = process_scan(&config, 5, &Calibration::default(), &tx, &0).unwrap();
        assert_eq!(summary.center_fft.pivot, Some([8, 4, 4]));

        let config = bragg_config(dir.path(), [0, 4, 4]);
        assert!(matches!(
            process_scan(&config, 5, &Calibration::default(), &tx, &0),
            Err(ProcessorError::StackError(StackError::ExcludedFrame(0)))
        ));
    }
}
