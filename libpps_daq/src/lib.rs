//! # pps_daq
//!
//! pps_daq is the timing data acquisition of the PPS detectors, written in Rust. It reads
//! CAEN V1x90 time-to-digital converters (TDCs) sitting in a VME crate, writes their raw
//! words to flat binary files rotated by trigger burst, and broadcasts the run status to
//! remote listeners over a small socket protocol.
//!
//! ## Installation
//!
//! The only method of install is from source. If you have not used Rust before, you will
//! most likely need to install the Rust tool chain. See the
//! [Rust docs](https://www.rust-lang.org/tools/install) for installation instructions.
//!
//! To build and install the CLI use `cargo install --path ./pps_daq_cli` from the top level
//! pps_daq repository. The `pps_daq_cli` binary will be installed to your cargo install
//! location (typically something like `~/.cargo/bin/`).
//!
//! ## Configuration
//!
//! A template configuration can be generated with `pps_daq_cli new -p config.yml`. The
//! YAML format of a configuration file is as follows:
//!
//! ```yml
//! output_path: /data/pps
//! transfer_path: null
//! delete_transferred: false
//! run_id: null
//! board_addresses:
//! - 11141120
//! acquisition_mode: 1
//! detection_mode: 3
//! global_mode: TriggerStart
//! triggers_per_file: 1000
//! readouts_per_poll: 5000
//! coordinator_port: 1987
//! fanout_registers:
//!   control: 4120
//!   scaler_counter: 4132
//!   tdc_lines: 4116
//!   scaler_enable_bit: 4
//!   scaler_reset_bit: 5
//!   reset_line: 2
//!   clear_line: 1
//! simulation:
//!   trigger_period_us: 1000
//!   hit_channels: [0, 1, 2, 3]
//!   trigger_limit: null
//! ```
//!
//! - `run_id`: if null, the run following the last one found in `output_path` is used.
//! - `acquisition_mode`: 0 for continuous storage, 1 for trigger matching.
//! - `detection_mode`: 0 pair, 1 trailing only, 2 leading only, 3 leading and trailing.
//! - `global_mode`: `TriggerStart` reads the trigger counter on every readout and writes a
//! trigger marker in every file each time it moves; `Continuous` only samples it when
//! polling.
//! - `triggers_per_file`: the files are rotated once a burst counted that many triggers.
//! - `readouts_per_poll`: number of readouts between two monitoring/rotation checks.
//! - `coordinator_port`: listeners can connect on this port to follow the run; null runs
//! without listeners.
//!
//! ## Output
//!
//! Each burst produces one file per board, named
//! `events_<run>_<spill>_<unix start time>_board<board>.dat`. The format is as follows:
//!
//! ```text
//! offset 0:  header, 5 little-endian u32: magic "PPS0", run id, spill id,
//!            acquisition mode, detection mode
//! offset 20: little-endian u32 TDC words, in readout order
//! ```
//!
//! The synthetic word `0xf8000000` marks a trigger counter change. Files of a run can be
//! read back as a single stream with [`burst_stack::BurstStack`], and grouped into per
//! channel measurements with [`assembler::MeasurementAssembler`].
pub mod abort;
pub mod acquisition;
pub mod assembler;
pub mod burst;
pub mod burst_stack;
pub mod config;
pub mod constants;
pub mod coordinator;
pub mod error;
pub mod file_copier;
pub mod file_header;
pub mod hardware;
pub mod listener;
pub mod message;
pub mod poller;
pub mod simulation;
pub mod status;
pub mod tdc_event;
pub mod tdc_file;
