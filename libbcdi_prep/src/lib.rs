//! # bcdi_prep
//!
//! bcdi_prep preprocesses Bragg Coherent Diffraction Imaging (BCDI) detector frames
//! before phase retrieval, written in Rust. It loads the 3D diffraction stack of a
//! rocking curve, corrects every frame (linearity, flat-field, hot pixels, background,
//! photon threshold), crops or pads the stack to FFT friendly dimensions around the Bragg
//! peak, masks parasitic scattering, filters isolated pixels, and writes the data and
//! mask consumed by the phasing tool (PyNX).
//!
//! ## Installation
//!
//! The only method of install is from source.
//!
//! ### HDF5
//!
//! Raw detector stacks are read from HDF5 files, so HDF5 must be installed. Typically
//! this will be installed using a package manager (homebrew, apt, etc), and the Rust
//! libraries will auto detect the location of the HDF install. If HDF5 lives in a custom
//! location, write the following snippet into `.cargo/config.toml` in the repository:
//!
//! ```toml
//! [env]
//! HDF5_DIR="/path/to/my/hdf5/install/"
//!
//! [build]
//! rustflags="-C link-args=-Wl,-rpath,/path/to/my/hdf5/install/lib"
//! ```
//!
//! ### Building & Install
//!
//! To build and install the CLI use `cargo install --path ./bcdi_prep_cli` from the top
//! level repository.
//!
//! ## Configuration
//!
//! Make a template configuration with `bcdi_prep_cli new -p config.yml`. The YAML format
//! of a configuration file is as follows (fields left out take their default value):
//!
//! ```yml
//! scans: [11, 12]
//! root_folder: /data/experiment/
//! save_dir: null
//! data_dirname: data
//! sample_name: S
//! user_comment: ''
//! data_file_template: S{scan}.h5
//! data_dataset: /entry/data/data
//! monitor_dataset: null
//! detector:
//!   name: Maxipix
//!   nb_pixel_y: 516
//!   nb_pixel_x: 516
//!   pixel_size_y: 5.5e-5
//!   pixel_size_x: 5.5e-5
//!   roi: []
//!   binning: [1, 1, 1]
//!   preprocessing_binning: [1, 1, 1]
//! flatfield_file: null
//! hotpixels_file: null
//! background_file: null
//! linearity_coefficients: null
//! photon_threshold: 0.0
//! photon_filter: loading
//! normalize_flux: false
//! mask_zero_event: false
//! isolated_filter: skip
//! medfilt_order: 7
//! centering: max
//! fix_bragg: null
//! fix_size: null
//! center_fft: crop_asym_ZYX
//! pad_size: null
//! use_rawdata: true
//! reload_previous: null
//! reload_orthogonal: false
//! fill_value_mask: 1
//! align_q: false
//! ref_axis_q: y
//! excluded_frames: []
//! aliens: []
//! mask_polygons: []
//! save_rawdata: false
//! save_to_npz: true
//! save_to_hdf: false
//! save_asint: false
//! n_threads: 1
//! ```
//!
//! The raw data of scan `n` is read from
//! `{root_folder}/{sample_name}{n}/{data_dirname}/{data_file_template}` where `{scan}`
//! in the template is replaced by `n`. Aliens are boxes `[z0, z1, y0, y1, x0, x1]` and
//! mask polygons are given as `{plane: XY, vertices: [[x, y], ...]}`, both in the
//! coordinates of the stack after crop/pad.
//!
//! Several scans are distributed round robin over `n_threads` workers. With more than one
//! scan, only the crop/pad options which do not depend on the peak position are kept so
//! all outputs share a shape.
//!
//! To resume from a previous run, set `reload_previous` with the `data`, `mask` and
//! optional `q_values` npz files. Data already gridded in the orthonormal frame is
//! reloaded with `reload_orthogonal: true`.
//!
//! ## Output
//!
//! Outputs are written to `{root_folder}/{sample_name}{n}/pynxraw/` (detector frame) or
//! `pynx/` (orthonormal frame), unless `save_dir` is set. The comment is made of the user
//! comment, processing tags, the final shape and the binning (i.e. `_test_160_256_256_1_2_2`).
//!
//! ```text
//! S{n}_pynx{comment}.npz - data
//! S{n}_maskpynx{comment}.npz - mask
//! QxQzQy_S{n}{comment}.npz - qx, qz, qy (orthonormal data only)
//! S{n}_data_before_masking_stack.npz - data (save_rawdata)
//! S{n}_prep{comment}.h5 - data, mask, q values, frames_logical, pad_width - scan, version, comment (save_to_hdf)
//! S{n}_prep{comment}.yml - processing summary
//! ```
//!
//! When a `pynx_run.txt` exists in the save directory, its data and mask lines (lines 2
//! and 3) are pointed at the new files. The CLI also writes a log file, `bcdi_prep.log`.
pub mod binning;
pub mod center;
pub mod config;
pub mod constants;
pub mod crop_pad;
pub mod detector;
pub mod error;
pub mod fft_shape;
pub mod filters;
pub mod loader;
pub mod masking;
pub mod process;
pub mod stack;
pub mod worker_status;
pub mod writer;
