use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt::Display;
use std::io::{Read, Write};

use super::constants::FILE_MAGIC;
use super::error::{FileFormatError, ModeError};

/// Readout mode of a TDC board. Selects how words are grouped into measurements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionMode {
    ContinuousStorage,
    TriggerMatching,
}

impl AcquisitionMode {
    pub fn code(&self) -> u32 {
        match self {
            Self::ContinuousStorage => 0,
            Self::TriggerMatching => 1,
        }
    }
}

impl TryFrom<u32> for AcquisitionMode {
    type Error = ModeError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::ContinuousStorage),
            1 => Ok(Self::TriggerMatching),
            _ => Err(ModeError::InvalidAcquisitionMode(value)),
        }
    }
}

impl Display for AcquisitionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ContinuousStorage => write!(f, "Continuous storage"),
            Self::TriggerMatching => write!(f, "Trigger matching"),
        }
    }
}

/// Which signal edges a TDC board records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    Pair,
    TrailingOnly,
    LeadingOnly,
    LeadingAndTrailing,
}

impl DetectionMode {
    pub fn code(&self) -> u32 {
        match self {
            Self::Pair => 0,
            Self::TrailingOnly => 1,
            Self::LeadingOnly => 2,
            Self::LeadingAndTrailing => 3,
        }
    }
}

impl TryFrom<u32> for DetectionMode {
    type Error = ModeError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Pair),
            1 => Ok(Self::TrailingOnly),
            2 => Ok(Self::LeadingOnly),
            3 => Ok(Self::LeadingAndTrailing),
            _ => Err(ModeError::InvalidDetectionMode(value)),
        }
    }
}

impl Display for DetectionMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pair => write!(f, "Pair measurement"),
            Self::TrailingOnly => write!(f, "Trailing edge only"),
            Self::LeadingOnly => write!(f, "Leading edge only"),
            Self::LeadingAndTrailing => write!(f, "Leading and trailing edges"),
        }
    }
}

/// The fixed record at the start of every output file.
///
/// Modes are stored as their raw codes; readers must check the magic before trusting any
/// of the other fields, and convert the modes with `acquisition_mode`/`detection_mode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub run_id: u32,
    pub spill_id: u32,
    pub acq_mode: u32,
    pub det_mode: u32,
}

impl FileHeader {
    pub fn new(
        run_id: u32,
        spill_id: u32,
        acq_mode: AcquisitionMode,
        det_mode: DetectionMode,
    ) -> Self {
        Self {
            magic: FILE_MAGIC,
            run_id,
            spill_id,
            acq_mode: acq_mode.code(),
            det_mode: det_mode.code(),
        }
    }

    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, std::io::Error> {
        Ok(Self {
            magic: reader.read_u32::<LittleEndian>()?,
            run_id: reader.read_u32::<LittleEndian>()?,
            spill_id: reader.read_u32::<LittleEndian>()?,
            acq_mode: reader.read_u32::<LittleEndian>()?,
            det_mode: reader.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), std::io::Error> {
        writer.write_u32::<LittleEndian>(self.magic)?;
        writer.write_u32::<LittleEndian>(self.run_id)?;
        writer.write_u32::<LittleEndian>(self.spill_id)?;
        writer.write_u32::<LittleEndian>(self.acq_mode)?;
        writer.write_u32::<LittleEndian>(self.det_mode)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), FileFormatError> {
        if self.magic != FILE_MAGIC {
            return Err(FileFormatError::BadMagic(self.magic));
        }
        Ok(())
    }

    pub fn acquisition_mode(&self) -> Result<AcquisitionMode, ModeError> {
        AcquisitionMode::try_from(self.acq_mode)
    }

    pub fn detection_mode(&self) -> Result<DetectionMode, ModeError> {
        DetectionMode::try_from(self.det_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::FILE_HEADER_SIZE;
    use std::io::Cursor;

    #[test]
    fn test_header_layout() {
        let header = FileHeader::new(
            7,
            3,
            AcquisitionMode::TriggerMatching,
            DetectionMode::LeadingAndTrailing,
        );
        let mut buffer = Vec::new();
        header.write_to(&mut buffer).unwrap();
        assert_eq!(buffer.len() as u64, FILE_HEADER_SIZE);
        assert_eq!(&buffer[0..4], b"PPS0");
        let read_back = FileHeader::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(read_back, header);
        assert!(read_back.validate().is_ok());
    }

    #[test]
    fn test_bad_magic() {
        let mut header = FileHeader::new(
            1,
            1,
            AcquisitionMode::ContinuousStorage,
            DetectionMode::Pair,
        );
        header.magic = 0xdeadbeef;
        assert_eq!(
            header.validate(),
            Err(FileFormatError::BadMagic(0xdeadbeef))
        );
    }

    #[test]
    fn test_mode_codes() {
        assert_eq!(
            AcquisitionMode::try_from(1),
            Ok(AcquisitionMode::TriggerMatching)
        );
        assert_eq!(
            AcquisitionMode::try_from(2),
            Err(ModeError::InvalidAcquisitionMode(2))
        );
        assert_eq!(
            DetectionMode::try_from(DetectionMode::LeadingOnly.code()),
            Ok(DetectionMode::LeadingOnly)
        );
        assert_eq!(
            DetectionMode::try_from(4),
            Err(ModeError::InvalidDetectionMode(4))
        );
    }
}
