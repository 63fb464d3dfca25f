use super::assembler::EventSource;
use super::error::{BurstStackError, TdcFileError};
use super::file_header::FileHeader;
use super::tdc_event::TdcEvent;
use super::tdc_file::{BurstFileName, TdcFile};

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

/// The files written by one board over a whole run, read back as a single stream.
///
/// The acquisition rotates its output every few thousand triggers, so a run is split
/// over many burst files. The stack orders them by spill id and moves from one to the
/// next transparently.
#[derive(Debug)]
pub struct BurstStack {
    pub file_stack: VecDeque<PathBuf>,
    active_file: TdcFile,
    pub total_stack_size_bytes: u64,
    is_ended: bool,
    run_id: u32,
    board: usize,
}

impl BurstStack {
    /// Create a new BurstStack for a run and board found in an output directory
    pub fn new(path: &Path, run_id: u32, board: usize) -> Result<Self, BurstStackError> {
        let (mut stack, bytes) = Self::get_file_stack(path, run_id, board)?;
        if let Some(file_path) = stack.pop_front() {
            Ok(BurstStack {
                file_stack: stack,
                active_file: TdcFile::open(&file_path)?,
                total_stack_size_bytes: bytes,
                is_ended: false,
                run_id,
                board,
            })
        } else {
            Err(BurstStackError::NoMatchingFiles(run_id, board))
        }
    }

    /// Get the next event in the file stack
    ///
    /// Returns a `Result<Option<TdcEvent>>`. The Option is None if the stack has
    /// no more data.
    pub fn get_next_event(&mut self) -> Result<Option<TdcEvent>, BurstStackError> {
        loop {
            if self.is_ended {
                return Ok(None);
            }

            match self.active_file.get_next_event() {
                Ok(event) => return Ok(Some(event)),
                Err(TdcFileError::EndOfFile) => {
                    self.move_to_next_file()?;
                }
                Err(e) => return Err(BurstStackError::FileError(e)),
            };
        }
    }

    /// Header of the file currently being read
    pub fn get_active_header(&self) -> &FileHeader {
        self.active_file.header()
    }

    pub fn get_run_id(&self) -> u32 {
        self.run_id
    }

    pub fn get_board(&self) -> usize {
        self.board
    }

    /// Get all of the burst files for this run and board, sorted by spill id
    fn get_file_stack(
        parent_path: &Path,
        run_id: u32,
        board: usize,
    ) -> Result<(VecDeque<PathBuf>, u64), BurstStackError> {
        let mut file_list: Vec<(u32, PathBuf)> = Vec::new();
        let mut total_stack_size_bytes = 0;
        for item in parent_path.read_dir()? {
            let item_path = item?.path();
            let name = match item_path.file_name().and_then(|n| n.to_str()) {
                Some(n) => n,
                None => continue,
            };
            if let Ok(burst) = name.parse::<BurstFileName>() {
                if burst.run_id == run_id && burst.board == board {
                    total_stack_size_bytes += item_path.metadata()?.len();
                    file_list.push((burst.spill_id, item_path));
                }
            }
        }

        if file_list.is_empty() {
            return Err(BurstStackError::NoMatchingFiles(run_id, board));
        }

        file_list.sort_by_key(|(spill, _)| *spill);
        let stack = file_list.into_iter().map(|(_, path)| path).collect();

        Ok((stack, total_stack_size_bytes))
    }

    ///Move to the next file in the stack
    fn move_to_next_file(&mut self) -> Result<(), BurstStackError> {
        loop {
            if let Some(next_file_path) = self.file_stack.pop_front() {
                let next_file = TdcFile::open(&next_file_path)?;
                if !next_file.is_eof() {
                    self.active_file = next_file;
                    return Ok(());
                }
            } else {
                self.is_ended = true;
                return Ok(());
            }
        }
    }
}

impl EventSource for BurstStack {
    type Error = BurstStackError;
    fn next_event(&mut self) -> Result<Option<TdcEvent>, Self::Error> {
        self.get_next_event()
    }
}

/// Highest run id found among the burst files of a directory, if any
pub fn latest_run_id(parent_path: &Path) -> Result<Option<u32>, std::io::Error> {
    let mut latest = None;
    for item in parent_path.read_dir()? {
        let item_path = item?.path();
        if let Some(Ok(burst)) = item_path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.parse::<BurstFileName>())
        {
            latest = latest.max(Some(burst.run_id));
        }
    }
    Ok(latest)
}
