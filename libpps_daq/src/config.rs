use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::burst_stack::latest_run_id;
use super::constants::{
    DEFAULT_COORDINATOR_PORT, DEFAULT_READOUTS_PER_POLL, DEFAULT_TRIGGERS_PER_FILE,
};
use super::error::ConfigError;
use super::hardware::FanoutRegisterMap;
use super::simulation::SimulationParameters;

/// What drives the trigger counter sampling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum GlobalAcquisitionMode {
    /// Counter read on every readout; a trigger marker is written on each change
    #[default]
    TriggerStart,
    /// Counter only read when polling, no markers
    Continuous,
}

/// Structure representing the acquisition configuration. Contains pathing, board and run
/// information. Configs are seralizable and deserializable to YAML using serde and serde_yaml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub output_path: PathBuf,
    pub transfer_path: Option<PathBuf>,
    pub delete_transferred: bool,
    pub run_id: Option<u32>,
    pub board_addresses: Vec<u32>,
    pub acquisition_mode: u32,
    pub detection_mode: u32,
    pub global_mode: GlobalAcquisitionMode,
    pub triggers_per_file: u64,
    pub readouts_per_poll: u64,
    pub coordinator_port: Option<u16>,
    pub fanout_registers: FanoutRegisterMap,
    pub simulation: SimulationParameters,
}

impl Default for Config {
    /// Generate a new Config object. Paths will be invalid
    fn default() -> Self {
        Self {
            output_path: PathBuf::from("None"),
            transfer_path: None,
            delete_transferred: false,
            run_id: None,
            board_addresses: vec![0x00aa_0000],
            acquisition_mode: 1,
            detection_mode: 3,
            global_mode: GlobalAcquisitionMode::TriggerStart,
            triggers_per_file: DEFAULT_TRIGGERS_PER_FILE,
            readouts_per_poll: DEFAULT_READOUTS_PER_POLL,
            coordinator_port: Some(DEFAULT_COORDINATOR_PORT),
            fanout_registers: FanoutRegisterMap::default(),
            simulation: SimulationParameters::default(),
        }
    }
}

impl Config {
    /// Read the configuration in a YAML file
    /// Returns a Config if successful
    pub fn read_config_file(config_path: &Path) -> Result<Self, ConfigError> {
        if !config_path.exists() {
            return Err(ConfigError::BadFilePath(config_path.to_path_buf()));
        }

        let yaml_str = std::fs::read_to_string(config_path)?;

        Ok(serde_yaml::from_str::<Self>(&yaml_str)?)
    }

    /// Write the configuration to a YAML file
    pub fn write_config_file(&self, config_path: &Path) -> Result<(), ConfigError> {
        let yaml_str = serde_yaml::to_string(self)?;
        std::fs::write(config_path, yaml_str)?;
        Ok(())
    }

    /// The run id to use: the configured one, or one past the last run in the output
    /// directory (0 for an empty directory)
    pub fn get_run_id(&self) -> Result<u32, ConfigError> {
        if let Some(run_id) = self.run_id {
            return Ok(run_id);
        }
        if !self.output_path.exists() {
            return Err(ConfigError::BadFilePath(self.output_path.clone()));
        }
        Ok(latest_run_id(&self.output_path)?.map_or(0, |last| last + 1))
    }

    pub fn get_number_of_boards(&self) -> usize {
        self.board_addresses.len()
    }

    /// Get the path to the transfer directory of a run, if transfer is enabled
    pub fn get_transfer_directory(&self, run_id: u32) -> Option<PathBuf> {
        self.transfer_path
            .as_ref()
            .map(|path| path.join(format!("run_{run_id}")))
    }
}
