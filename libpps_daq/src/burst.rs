use std::path::{Path, PathBuf};
use std::time::Instant;

use super::constants::{EVENT_WORD_SIZE, FILE_HEADER_SIZE};
use super::error::AcquisitionError;
use super::file_header::{AcquisitionMode, DetectionMode, FileHeader};
use super::tdc_event::TdcEvent;
use super::tdc_file::{BurstFileName, TdcFileWriter};

/// The files of one burst, one per board, plus what the controller tracks about it.
#[derive(Debug)]
pub struct BurstState {
    spill_id: u32,
    writers: Vec<TdcFileWriter>,
    events_per_board: Vec<u64>,
    trigger_start: u32,
    started: Instant,
}

impl BurstState {
    /// Open one file per board, each starting with its header
    pub fn open(
        output_path: &Path,
        run_id: u32,
        spill_id: u32,
        board_modes: &[(AcquisitionMode, DetectionMode)],
        trigger_start: u32,
    ) -> Result<Self, AcquisitionError> {
        let start_time = time::OffsetDateTime::now_utc().unix_timestamp();
        let mut writers = Vec::with_capacity(board_modes.len());
        for (board, (acq_mode, det_mode)) in board_modes.iter().enumerate() {
            let name = BurstFileName {
                run_id,
                spill_id,
                start_time,
                board,
            };
            let path = output_path.join(name.to_string());
            let header = FileHeader::new(run_id, spill_id, *acq_mode, *det_mode);
            let writer = TdcFileWriter::create(&path, &header)
                .map_err(|source| AcquisitionError::FileOpen { path, source })?;
            writers.push(writer);
        }
        log::info!(
            "Opened burst {spill_id} of run {run_id} ({} file(s))",
            writers.len()
        );
        Ok(Self {
            spill_id,
            events_per_board: vec![0; writers.len()],
            writers,
            trigger_start,
            started: Instant::now(),
        })
    }

    /// Append words drained from a board
    pub fn write_events(
        &mut self,
        board: usize,
        events: &[TdcEvent],
    ) -> Result<(), std::io::Error> {
        let writer = &mut self.writers[board];
        for event in events.iter() {
            writer.write_event(event)?;
        }
        self.events_per_board[board] += events.len() as u64;
        Ok(())
    }

    /// Write a trigger marker into every file of the burst
    pub fn write_trigger_marker(&mut self) -> Result<(), std::io::Error> {
        for writer in self.writers.iter_mut() {
            writer.write_event(&TdcEvent::Trigger)?;
        }
        Ok(())
    }

    /// Flush and close every file.
    ///
    /// All files are closed even if one fails; the paths of those closed successfully are
    /// returned along with the first error.
    pub fn close(self) -> (Vec<PathBuf>, Option<std::io::Error>) {
        let mut paths = Vec::with_capacity(self.writers.len());
        let mut first_error = None;
        for writer in self.writers {
            match writer.close() {
                Ok(path) => paths.push(path),
                Err(e) => {
                    log::error!("Failed to close burst file: {e}");
                    first_error.get_or_insert(e);
                }
            }
        }
        (paths, first_error)
    }

    pub fn get_spill_id(&self) -> u32 {
        self.spill_id
    }

    pub fn get_events_per_board(&self) -> &[u64] {
        &self.events_per_board
    }

    /// Trigger counter value when the burst opened
    pub fn get_trigger_start(&self) -> u32 {
        self.trigger_start
    }

    pub fn get_started(&self) -> Instant {
        self.started
    }

    /// Bytes written so far, headers and markers included
    pub fn get_bytes_written(&self) -> u64 {
        self.writers
            .iter()
            .map(|w| FILE_HEADER_SIZE + w.words_written() * EVENT_WORD_SIZE)
            .sum()
    }
}
