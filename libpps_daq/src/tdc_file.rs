use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt::Display;
use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::SystemTime;

use super::constants::{EVENT_WORD_SIZE, FILE_EXTENSION, FILE_HEADER_SIZE, FILE_PREFIX};
use super::error::{FileFormatError, TdcFileError};
use super::file_header::FileHeader;
use super::tdc_event::TdcEvent;

/// The name of a file written for one board during one burst:
/// `events_<run>_<spill>_<unix start time>_board<board>.dat`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstFileName {
    pub run_id: u32,
    pub spill_id: u32,
    pub start_time: i64,
    pub board: usize,
}

impl Display for BurstFileName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{FILE_PREFIX}_{}_{}_{}_board{}.{FILE_EXTENSION}",
            self.run_id, self.spill_id, self.start_time, self.board
        )
    }
}

impl FromStr for BurstFileName {
    type Err = ();
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stem = s
            .strip_suffix(FILE_EXTENSION)
            .and_then(|s| s.strip_suffix('.'))
            .and_then(|s| s.strip_prefix(FILE_PREFIX))
            .and_then(|s| s.strip_prefix('_'))
            .ok_or(())?;
        let entries: Vec<&str> = stem.split('_').collect();
        if entries.len() != 4 {
            return Err(());
        }
        let board = entries[3].strip_prefix("board").ok_or(())?;
        Ok(Self {
            run_id: entries[0].parse().map_err(|_| ())?,
            spill_id: entries[1].parse().map_err(|_| ())?,
            start_time: entries[2].parse().map_err(|_| ())?,
            board: board.parse().map_err(|_| ())?,
        })
    }
}

/// Append-only writer for one burst file.
///
/// The header is written on creation, so it always precedes the event words. Words are
/// buffered; `close` flushes them and hands back the path so the file can be transferred.
#[derive(Debug)]
pub struct TdcFileWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    words_written: u64,
}

impl TdcFileWriter {
    pub fn create(path: &Path, header: &FileHeader) -> Result<Self, std::io::Error> {
        let mut writer = BufWriter::new(File::create(path)?);
        header.write_to(&mut writer)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
            words_written: 0,
        })
    }

    pub fn write_word(&mut self, word: u32) -> Result<(), std::io::Error> {
        self.writer.write_u32::<LittleEndian>(word)?;
        self.words_written += 1;
        Ok(())
    }

    pub fn write_event(&mut self, event: &TdcEvent) -> Result<(), std::io::Error> {
        self.write_word(event.encode())
    }

    pub fn words_written(&self) -> u64 {
        self.words_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush everything to disk and release the file
    pub fn close(mut self) -> Result<PathBuf, std::io::Error> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(self.path)
    }
}

/// Sequential reader of a file written by the acquisition.
///
/// Opening validates the header; the number of events is derived from the file size.
#[derive(Debug)]
pub struct TdcFile {
    file_path: PathBuf,
    reader: BufReader<File>,
    header: FileHeader,
    number_of_events: u64,
    events_read: u64,
    write_time: Option<SystemTime>,
    is_eof: bool,
}

impl TdcFile {
    pub fn open(path: &Path) -> Result<Self, TdcFileError> {
        if !path.exists() {
            return Err(TdcFileError::BadFilePath(path.to_path_buf()));
        }

        let file = File::open(path)?;
        let metadata = file.metadata()?;
        let size_bytes = metadata.len();
        if size_bytes < FILE_HEADER_SIZE {
            return Err(FileFormatError::TruncatedHeader(size_bytes).into());
        }

        let mut reader = BufReader::new(file);
        let header = FileHeader::read_from(&mut reader)?;
        header.validate()?;

        let number_of_events = (size_bytes - FILE_HEADER_SIZE) / EVENT_WORD_SIZE;
        Ok(Self {
            file_path: path.to_path_buf(),
            reader,
            header,
            number_of_events,
            events_read: 0,
            write_time: metadata.modified().ok(),
            is_eof: number_of_events == 0,
        })
    }

    /// Read the next event word.
    ///
    /// Returns `TdcFileError::EndOfFile` once every event has been read.
    pub fn get_next_event(&mut self) -> Result<TdcEvent, TdcFileError> {
        if self.is_eof {
            return Err(TdcFileError::EndOfFile);
        }
        match self.reader.read_u32::<LittleEndian>() {
            Ok(word) => {
                self.events_read += 1;
                if self.events_read >= self.number_of_events {
                    self.is_eof = true;
                }
                Ok(TdcEvent::decode(word))
            }
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                self.is_eof = true;
                Err(TdcFileError::EndOfFile)
            }
            Err(e) => Err(TdcFileError::IOError(e)),
        }
    }

    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    pub fn get_number_of_events(&self) -> u64 {
        self.number_of_events
    }

    pub fn get_events_read(&self) -> u64 {
        self.events_read
    }

    pub fn get_filename(&self) -> &Path {
        &self.file_path
    }

    pub fn get_write_time(&self) -> Option<SystemTime> {
        self.write_time
    }

    pub fn is_eof(&self) -> bool {
        self.is_eof
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::file_header::{AcquisitionMode, DetectionMode};

    /// A scratch directory unique to one test
    pub(crate) fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("pps_daq_{}_{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn write_file(path: &Path, header: &FileHeader, words: &[u32]) {
        let mut writer = TdcFileWriter::create(path, header).unwrap();
        for word in words {
            writer.write_word(*word).unwrap();
        }
        assert_eq!(writer.words_written(), words.len() as u64);
        writer.close().unwrap();
    }

    #[test]
    fn test_write_then_read() {
        let dir = scratch_dir("write_then_read");
        let path = dir.join("run.dat");
        let header = FileHeader::new(
            7,
            3,
            AcquisitionMode::TriggerMatching,
            DetectionMode::LeadingAndTrailing,
        );
        let words: Vec<u32> = (0..25).map(|i| (i << 19) | i).collect();
        write_file(&path, &header, &words);

        let mut file = TdcFile::open(&path).unwrap();
        assert_eq!(file.header().run_id, 7);
        assert_eq!(file.header().spill_id, 3);
        assert_eq!(file.get_number_of_events(), 25);
        assert_eq!(file.get_filename(), path.as_path());
        assert!(file.get_write_time().is_some());
        let mut read_back = Vec::new();
        loop {
            match file.get_next_event() {
                Ok(event) => read_back.push(event.encode()),
                Err(TdcFileError::EndOfFile) => break,
                Err(e) => panic!("{e}"),
            }
        }
        assert_eq!(read_back, words);
        assert_eq!(file.get_events_read(), 25);
        assert!(file.is_eof());
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_corrupted_magic_is_a_format_error() {
        let dir = scratch_dir("corrupted_magic");
        let path = dir.join("bad.dat");
        let mut header = FileHeader::new(
            1,
            0,
            AcquisitionMode::ContinuousStorage,
            DetectionMode::Pair,
        );
        header.magic = 0x30535051;
        write_file(&path, &header, &[1, 2, 3]);
        match TdcFile::open(&path) {
            Err(TdcFileError::BadFormat(FileFormatError::BadMagic(magic))) => {
                assert_eq!(magic, 0x30535051)
            }
            other => panic!("Expected a format error, got {other:?}"),
        }
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_truncated_header() {
        let dir = scratch_dir("truncated_header");
        let path = dir.join("short.dat");
        std::fs::write(&path, [0x50, 0x50, 0x53, 0x30, 0x01]).unwrap();
        match TdcFile::open(&path) {
            Err(TdcFileError::BadFormat(FileFormatError::TruncatedHeader(5))) => (),
            other => panic!("Expected a truncated header, got {other:?}"),
        }
        assert!(matches!(
            TdcFile::open(&dir.join("missing.dat")),
            Err(TdcFileError::BadFilePath(_))
        ));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_burst_file_name() {
        let name = BurstFileName {
            run_id: 12,
            spill_id: 4,
            start_time: 1_700_000_000,
            board: 1,
        };
        let as_string = name.to_string();
        assert_eq!(as_string, "events_12_4_1700000000_board1.dat");
        assert_eq!(as_string.parse::<BurstFileName>(), Ok(name));
        assert!("events_12_4_board1.dat".parse::<BurstFileName>().is_err());
        assert!("run_0001.h5".parse::<BurstFileName>().is_err());
    }
}
