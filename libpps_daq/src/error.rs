use std::path::PathBuf;
use thiserror::Error;

use super::constants::*;
use super::message::MessageKey;

#[derive(Debug, Clone, Error)]
pub enum HardwareError {
    #[error("Failed to read register at offset {0:#06x}")]
    RegisterRead(u32),
    #[error("Failed to write {word:#010x} to register at offset {offset:#06x}")]
    RegisterWrite { offset: u32, word: u32 },
    #[error("Board at base address {0:#010x} is not responding")]
    NotResponding(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModeError {
    #[error("Invalid acquisition mode {0}; expected 0 (continuous storage) or 1 (trigger matching)")]
    InvalidAcquisitionMode(u32),
    #[error("Invalid detection mode {0}; expected a value between 0 and 3")]
    InvalidDetectionMode(u32),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FileFormatError {
    #[error("Wrong magic number {0:#010x} found in file header; expected {exp:#010x}", exp=FILE_MAGIC)]
    BadMagic(u32),
    #[error("File of {0} bytes is too small to hold a header of {size} bytes", size=FILE_HEADER_SIZE)]
    TruncatedHeader(u64),
}

#[derive(Debug, Error)]
pub enum TdcFileError {
    #[error("Could not open TdcFile because file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("TdcFile has an invalid format: {0}")]
    BadFormat(#[from] FileFormatError),
    #[error("Reached end of TdcFile")]
    EndOfFile,
    #[error("TdcFile failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum AssemblerError {
    #[error("MeasurementAssembler was configured with an unusable mode: {0}")]
    Mode(#[from] ModeError),
    #[error("MeasurementAssembler failed due to TdcFile error: {0}")]
    FileError(#[from] TdcFileError),
    #[error("MeasurementAssembler failed due to BurstStack error: {0}")]
    StackError(#[from] BurstStackError),
}

#[derive(Debug, Error)]
pub enum BurstStackError {
    #[error("BurstStack failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("BurstStack did not find any files for run {0} board {1} in the output directory")]
    NoMatchingFiles(u32, usize),
    #[error("BurstStack failed due to TdcFile error: {0}")]
    FileError(#[from] TdcFileError),
}

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("Message transfer failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Received a message with unknown key {0}")]
    UnknownKey(u32),
    #[error("Message frame of {0} bytes exceeds the limit of {max} bytes", max=MAX_MESSAGE_LENGTH)]
    FrameTooLarge(u32),
    #[error("Message frame of {0} bytes is too short for its declared payload")]
    FrameTooShort(u32),
    #[error("Message string payload is not valid UTF-8: {0}")]
    BadPayload(#[from] std::string::FromUtf8Error),
    #[error("Peer closed the connection")]
    ConnectionClosed,
}

#[derive(Debug, Error)]
pub enum ListenerError {
    #[error("Listener failed due to message error: {0}")]
    Message(#[from] MessageError),
    #[error("Listener failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Listener received an invalid answer from the coordinator: {0:?}")]
    UnexpectedAnswer(MessageKey),
    #[error("Listener is not connected")]
    NotConnected,
    #[error("Coordinator disconnected")]
    MasterDisconnected,
}

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("Coordinator failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Coordinator failed due to message error: {0}")]
    Message(#[from] MessageError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse YAML: {0}")]
    ParsingError(#[from] serde_yaml::Error),
}

#[derive(Debug, Error)]
pub enum FileCopierError {
    #[error("FileCopier failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("FileCopier could not find file {0:?} to transfer")]
    BadFilePath(PathBuf),
}

#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("Acquisition cannot start: no FPGA unit provides control lines fanout to the TDCs")]
    NoTriggerFanout,
    #[error("Acquisition cannot start: no TDC board configured")]
    NoBoards,
    #[error("Acquisition failed due to invalid board mode: {0}")]
    Mode(#[from] ModeError),
    #[error("Acquisition failed to open output file {path:?}: {source}")]
    FileOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Acquisition failed because output directory {0:?} does not exist")]
    BadOutputPath(PathBuf),
    #[error("Acquisition failed due to a fatal hardware error: {0}")]
    Hardware(#[from] HardwareError),
    #[error("Acquisition failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}
