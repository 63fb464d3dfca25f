use std::path::{Path, PathBuf};
use std::time::Instant;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::abort::AbortSignal;
use super::burst::BurstState;
use super::config::{Config, GlobalAcquisitionMode};
use super::error::AcquisitionError;
use super::file_copier::FileConsumer;
use super::file_header::{AcquisitionMode, DetectionMode};
use super::hardware::{DrainStatus, TdcBoard, TriggerFanout};
use super::status::{BurstStatus, RunStatistics, StatusSink};

/// Where the controller stands in the life of a burst
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    BurstOpen,
    Draining,
    Aborting,
}

/// The parts of the configuration the controller needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionSettings {
    pub output_path: PathBuf,
    pub run_id: u32,
    pub global_mode: GlobalAcquisitionMode,
    pub triggers_per_file: u64,
    pub readouts_per_poll: u64,
}

impl AcquisitionSettings {
    pub fn from_config(config: &Config, run_id: u32) -> Self {
        Self {
            output_path: config.output_path.clone(),
            run_id,
            global_mode: config.global_mode,
            triggers_per_file: config.triggers_per_file,
            readouts_per_poll: config.readouts_per_poll,
        }
    }
}

fn local_time_string() -> String {
    OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .format(&Rfc3339)
        .unwrap_or_else(|_| String::from("unknown time"))
}

/// Everything the acquisition loop owns: the hardware, the open burst and the counters.
///
/// The loop correlates the trigger counter of the fanout with the words drained from the
/// boards. Output is rotated into a new burst once enough triggers were counted, and the
/// closed files handed to the consumer. The run ends when a board reports the acquisition
/// stopped (asked for through the abort signal, or decided by the hardware) or on a fatal
/// error; files are closed and statistics reported in both cases.
pub struct AcquisitionContext<B, F, C, S>
where
    B: TdcBoard,
    F: TriggerFanout,
    C: FileConsumer,
    S: StatusSink,
{
    settings: AcquisitionSettings,
    boards: Vec<B>,
    fanout: Option<F>,
    consumer: C,
    sink: S,
    abort: AbortSignal,
    state: ControllerState,
    burst: Option<BurstState>,
    board_modes: Vec<(AcquisitionMode, DetectionMode)>,
    next_spill_id: u32,
    trigger_count: u32,
    is_abort_sent: bool,
    run_start: Option<Instant>,
    events_per_board: Vec<u64>,
    files_written: u64,
    bytes_written: u64,
}

impl<B, F, C, S> AcquisitionContext<B, F, C, S>
where
    B: TdcBoard,
    F: TriggerFanout,
    C: FileConsumer,
    S: StatusSink,
{
    pub fn new(
        settings: AcquisitionSettings,
        boards: Vec<B>,
        fanout: Option<F>,
        consumer: C,
        sink: S,
        abort: AbortSignal,
    ) -> Self {
        let n_boards = boards.len();
        Self {
            settings,
            boards,
            fanout,
            consumer,
            sink,
            abort,
            state: ControllerState::Idle,
            burst: None,
            board_modes: Vec::new(),
            next_spill_id: 0,
            trigger_count: 0,
            is_abort_sent: false,
            run_start: None,
            events_per_board: vec![0; n_boards],
            files_written: 0,
            bytes_written: 0,
        }
    }

    pub fn get_state(&self) -> ControllerState {
        self.state
    }

    pub fn get_boards(&self) -> &[B] {
        &self.boards
    }

    pub fn get_consumer(&self) -> &C {
        &self.consumer
    }

    pub fn get_sink(&self) -> &S {
        &self.sink
    }

    /// Last value read from the trigger counter
    pub fn get_trigger_count(&self) -> u32 {
        self.trigger_count
    }

    /// Acquire until the boards stop or a fatal error happens.
    ///
    /// Nothing is written if the setup is invalid. Once acquisition started, open files are
    /// always closed, transmitted and the statistics reported, whatever the outcome.
    pub fn run(&mut self) -> Result<RunStatistics, AcquisitionError> {
        self.validate()?;
        log::info!(
            "Starting run {} at {} with {} board(s)",
            self.settings.run_id,
            local_time_string(),
            self.boards.len()
        );

        if let Some(fanout) = self.fanout.as_mut() {
            fanout.start_scaler()?;
        }
        self.run_start = Some(Instant::now());

        let result = self.acquire();
        let close_result = self.close_burst();
        if let Some(fanout) = self.fanout.as_mut() {
            if let Err(e) = fanout.stop_scaler() {
                log::warn!("Failed to stop the trigger scaler: {e}");
            }
        }
        self.state = ControllerState::Idle;

        let stats = self.statistics();
        log::info!("Run {} ended at {}", self.settings.run_id, local_time_string());
        log::info!("{stats}");
        self.sink.run_statistics(&stats);

        match result {
            Ok(()) => {
                close_result?;
                Ok(stats)
            }
            Err(e) => {
                log::error!("Acquisition stopped on a fatal error: {e}");
                self.sink.exception(&e.to_string());
                Err(e)
            }
        }
    }

    fn validate(&mut self) -> Result<(), AcquisitionError> {
        if self.fanout.is_none() {
            return Err(AcquisitionError::NoTriggerFanout);
        }
        if self.boards.is_empty() {
            return Err(AcquisitionError::NoBoards);
        }
        if !self.settings.output_path.exists() {
            return Err(AcquisitionError::BadOutputPath(
                self.settings.output_path.clone(),
            ));
        }
        let mut modes = Vec::with_capacity(self.boards.len());
        for board in self.boards.iter() {
            let acq_mode = AcquisitionMode::try_from(board.acquisition_mode())?;
            let det_mode = DetectionMode::try_from(board.detection_mode())?;
            log::info!(
                "TDC at base address {:#010x}: {acq_mode}, {det_mode}",
                board.base_address()
            );
            modes.push((acq_mode, det_mode));
        }
        self.board_modes = modes;
        Ok(())
    }

    fn acquire(&mut self) -> Result<(), AcquisitionError> {
        self.open_burst()?;
        let mut readouts_since_poll: u64 = 0;
        loop {
            if self.abort.is_requested() && !self.is_abort_sent {
                log::info!("Stop requested, waiting for the boards to end the acquisition...");
                for board in self.boards.iter_mut() {
                    board.abort();
                }
                self.is_abort_sent = true;
                self.state = ControllerState::Aborting;
            }

            if self.settings.global_mode == GlobalAcquisitionMode::TriggerStart
                && self.sample_trigger_counter()
            {
                if let Some(burst) = self.burst.as_mut() {
                    burst.write_trigger_marker()?;
                }
            }

            for (index, board) in self.boards.iter_mut().enumerate() {
                match board.fetch_events() {
                    DrainStatus::Events(events) => {
                        if let Some(burst) = self.burst.as_mut() {
                            burst.write_events(index, &events)?;
                        }
                    }
                    DrainStatus::Advisory(e) => {
                        log::warn!("Readout of TDC {:#010x} failed: {e}", board.base_address())
                    }
                    DrainStatus::AcquisitionStop => {
                        log::info!(
                            "TDC {:#010x} reports the end of acquisition",
                            board.base_address()
                        );
                        self.state = ControllerState::Aborting;
                        return Ok(());
                    }
                    DrainStatus::Fatal(e) => {
                        self.state = ControllerState::Aborting;
                        return Err(e.into());
                    }
                }
            }

            readouts_since_poll += 1;
            if readouts_since_poll >= self.settings.readouts_per_poll {
                readouts_since_poll = 0;
                self.poll()?;
            }
        }
    }

    /// Read the trigger counter. Returns true if it moved since the last read.
    fn sample_trigger_counter(&mut self) -> bool {
        let fanout = match self.fanout.as_mut() {
            Some(f) => f,
            None => return false,
        };
        match fanout.read_scaler() {
            Ok(value) if value > self.trigger_count => {
                self.trigger_count = value;
                true
            }
            Ok(value) if value < self.trigger_count => {
                log::warn!(
                    "Trigger counter went back from {} to {value}, ignoring",
                    self.trigger_count
                );
                false
            }
            Ok(_) => false,
            Err(e) => {
                log::warn!("Failed to read the trigger counter: {e}");
                false
            }
        }
    }

    /// Periodic bookkeeping: monitoring and rotation
    fn poll(&mut self) -> Result<(), AcquisitionError> {
        if self.settings.global_mode == GlobalAcquisitionMode::Continuous {
            self.sample_trigger_counter();
        }
        self.sink.service();
        let status = match self.burst_status() {
            Some(s) => s,
            None => return Ok(()),
        };
        self.sink.monitor(&status);

        let triggers = status.triggers_in_burst;
        if self.state == ControllerState::BurstOpen
            && triggers > 0
            && triggers >= self.settings.triggers_per_file
        {
            self.rotate()?;
        }
        Ok(())
    }

    fn burst_status(&self) -> Option<BurstStatus> {
        let burst = self.burst.as_ref()?;
        let triggers_in_burst = self.trigger_count.saturating_sub(burst.get_trigger_start());
        Some(BurstStatus {
            run_id: self.settings.run_id,
            spill_id: burst.get_spill_id(),
            triggers_in_burst: triggers_in_burst as u64,
            triggers_in_run: self.trigger_count as u64,
            triggers_per_file: self.settings.triggers_per_file,
            events_per_board: burst.get_events_per_board().to_vec(),
        })
    }

    fn open_burst(&mut self) -> Result<(), AcquisitionError> {
        let spill_id = self.next_spill_id;
        self.next_spill_id += 1;
        if let Some(fanout) = self.fanout.as_mut() {
            if let Err(e) = fanout.pulse_reset_clear() {
                log::warn!("Failed to reset the TDCs before burst {spill_id}: {e}");
            }
        }
        self.burst = Some(BurstState::open(
            &self.settings.output_path,
            self.settings.run_id,
            spill_id,
            &self.board_modes,
            self.trigger_count,
        )?);
        self.state = ControllerState::BurstOpen;
        self.sink.new_burst(self.settings.run_id, spill_id);
        Ok(())
    }

    fn rotate(&mut self) -> Result<(), AcquisitionError> {
        let (triggers, elapsed) = match self.burst.as_ref() {
            Some(burst) => (
                self.trigger_count.saturating_sub(burst.get_trigger_start()),
                burst.get_started().elapsed(),
            ),
            None => return Ok(()),
        };
        self.close_burst()?;
        self.open_burst()?;

        let seconds = elapsed.as_secs_f64();
        let rate = if seconds > 0.0 {
            triggers as f64 / seconds
        } else {
            0.0
        };
        log::info!("Burst rotated after {triggers} triggers ({rate:.2} Hz)");
        self.sink.trigger_rate(rate);
        Ok(())
    }

    /// Close the open burst, if any, then hand its files to the consumer
    fn close_burst(&mut self) -> Result<(), AcquisitionError> {
        let burst = match self.burst.take() {
            Some(b) => b,
            None => return Ok(()),
        };
        if self.state != ControllerState::Aborting {
            self.state = ControllerState::Draining;
        }
        for (total, events) in self
            .events_per_board
            .iter_mut()
            .zip(burst.get_events_per_board())
        {
            *total += events;
        }
        self.bytes_written += burst.get_bytes_written();
        self.files_written += 1;

        let (paths, close_error) = burst.close();
        for path in paths.iter() {
            self.transmit(path);
        }
        match close_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    fn transmit(&mut self, path: &Path) {
        match self.consumer.transmit(path) {
            Ok(delivered) => self.sink.output_file(&delivered),
            Err(e) => {
                let message = format!("Failed to transmit {}: {e}", path.to_string_lossy());
                log::warn!("{message}");
                self.sink.exception(&message);
            }
        }
    }

    fn statistics(&self) -> RunStatistics {
        RunStatistics {
            run_id: self.settings.run_id,
            events_per_board: self.events_per_board.clone(),
            files_written: self.files_written,
            total_triggers: self.trigger_count as u64,
            elapsed: self.run_start.map(|s| s.elapsed()).unwrap_or_default(),
            bytes_written: self.bytes_written,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{HardwareError, ModeError};
    use crate::file_copier::FileCopier;
    use crate::tdc_event::TdcEvent;
    use crate::tdc_file::tests::scratch_dir;
    use crate::tdc_file::{BurstFileName, TdcFile};
    use std::collections::VecDeque;
    use std::convert::Infallible;

    /// Replays scaler reads, then keeps returning the last good count
    struct ScriptedFanout {
        reads: VecDeque<Result<u32, HardwareError>>,
        last: u32,
        resets: usize,
    }

    impl ScriptedFanout {
        fn new(counts: &[u32]) -> Self {
            Self::with_reads(counts.iter().map(|count| Ok(*count)).collect())
        }

        fn with_reads(reads: Vec<Result<u32, HardwareError>>) -> Self {
            Self {
                reads: reads.into(),
                last: 0,
                resets: 0,
            }
        }
    }

    impl TriggerFanout for ScriptedFanout {
        fn start_scaler(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }

        fn stop_scaler(&mut self) -> Result<(), HardwareError> {
            Ok(())
        }

        fn read_scaler(&mut self) -> Result<u32, HardwareError> {
            match self.reads.pop_front() {
                Some(Ok(count)) => {
                    self.last = count;
                    Ok(count)
                }
                Some(Err(e)) => Err(e),
                None => Ok(self.last),
            }
        }

        fn pulse_reset_clear(&mut self) -> Result<(), HardwareError> {
            self.resets += 1;
            Ok(())
        }
    }

    /// Replays a list of drain results, then reports the end of acquisition (or keeps
    /// returning nothing if endless, until aborted)
    struct ScriptedBoard {
        script: VecDeque<DrainStatus>,
        acquisition_mode: u32,
        endless: bool,
        is_aborted: bool,
    }

    impl ScriptedBoard {
        fn new(script: Vec<DrainStatus>) -> Self {
            Self {
                script: script.into(),
                acquisition_mode: 0,
                endless: false,
                is_aborted: false,
            }
        }
    }

    impl TdcBoard for ScriptedBoard {
        fn base_address(&self) -> u32 {
            0x00aa_0000
        }

        fn acquisition_mode(&self) -> u32 {
            self.acquisition_mode
        }

        fn detection_mode(&self) -> u32 {
            3
        }

        fn fetch_events(&mut self) -> DrainStatus {
            match self.script.pop_front() {
                Some(status) => status,
                None if self.endless && !self.is_aborted => DrainStatus::Events(vec![]),
                None => DrainStatus::AcquisitionStop,
            }
        }

        fn abort(&mut self) {
            self.is_aborted = true;
        }
    }

    #[derive(Default)]
    struct RecordingConsumer {
        transmitted: Vec<PathBuf>,
    }

    impl FileConsumer for RecordingConsumer {
        type Error = Infallible;
        fn transmit(&mut self, path: &Path) -> Result<PathBuf, Infallible> {
            self.transmitted.push(path.to_path_buf());
            Ok(path.to_path_buf())
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        log: Vec<String>,
    }

    impl StatusSink for RecordingSink {
        fn new_burst(&mut self, _run_id: u32, spill_id: u32) {
            self.log.push(format!("burst {spill_id}"));
        }

        fn trigger_rate(&mut self, _rate_hz: f64) {
            self.log.push(String::from("rate"));
        }

        fn output_file(&mut self, path: &Path) {
            let name: BurstFileName = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.parse().ok())
                .unwrap();
            self.log.push(format!("file {}", name.spill_id));
        }

        fn run_statistics(&mut self, _stats: &RunStatistics) {
            self.log.push(String::from("stats"));
        }

        fn exception(&mut self, _message: &str) {
            self.log.push(String::from("exception"));
        }
    }

    /// Keeps the full paths announced as output files
    #[derive(Default)]
    struct PathSink {
        announced: Vec<PathBuf>,
    }

    impl StatusSink for PathSink {
        fn output_file(&mut self, path: &Path) {
            self.announced.push(path.to_path_buf());
        }
    }

    type TestContext =
        AcquisitionContext<ScriptedBoard, ScriptedFanout, RecordingConsumer, RecordingSink>;

    fn settings(dir: &Path, readouts_per_poll: u64) -> AcquisitionSettings {
        AcquisitionSettings {
            output_path: dir.to_path_buf(),
            run_id: 12,
            global_mode: GlobalAcquisitionMode::TriggerStart,
            triggers_per_file: 1000,
            readouts_per_poll,
        }
    }

    fn context(
        settings: AcquisitionSettings,
        boards: Vec<ScriptedBoard>,
        fanout: Option<ScriptedFanout>,
    ) -> TestContext {
        AcquisitionContext::new(
            settings,
            boards,
            fanout,
            RecordingConsumer::default(),
            RecordingSink::default(),
            AbortSignal::new(),
        )
    }

    fn one_word(word: u32) -> DrainStatus {
        DrainStatus::Events(vec![TdcEvent::decode(word)])
    }

    fn read_words(path: &Path) -> Vec<TdcEvent> {
        let mut file = TdcFile::open(path).unwrap();
        let mut events = Vec::new();
        while let Ok(event) = file.get_next_event() {
            events.push(event);
        }
        events
    }

    #[test]
    fn test_markers_only_on_counter_change() {
        let dir = scratch_dir("acquisition_markers");
        let board = ScriptedBoard::new((1..=6).map(one_word).collect());
        let fanout = ScriptedFanout::new(&[0, 0, 0, 5, 5, 9]);
        let mut acquisition = context(settings(&dir, 5000), vec![board], Some(fanout));

        let stats = acquisition.run().unwrap();
        assert_eq!(stats.events_per_board, vec![6]);
        assert_eq!(stats.files_written, 1);
        assert_eq!(stats.total_triggers, 9);
        assert_eq!(acquisition.get_state(), ControllerState::Idle);

        let transmitted = &acquisition.get_consumer().transmitted;
        assert_eq!(transmitted.len(), 1);
        let words = read_words(&transmitted[0]);
        let markers = words.iter().filter(|e| **e == TdcEvent::Trigger).count();
        assert_eq!(markers, 2);
        // Markers precede the data drained after the counter moved
        assert_eq!(words[3], TdcEvent::Trigger);
        assert_eq!(words[4], TdcEvent::decode(4));
        assert_eq!(words[6], TdcEvent::Trigger);
        assert_eq!(words[7], TdcEvent::decode(6));
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_rotation_at_threshold() {
        let dir = scratch_dir("acquisition_rotation");
        let board = ScriptedBoard::new((1..=4).map(one_word).collect());
        let fanout = ScriptedFanout::new(&[0, 400, 1000, 1200]);
        let mut acquisition = context(settings(&dir, 1), vec![board], Some(fanout));

        let stats = acquisition.run().unwrap();
        assert_eq!(stats.files_written, 2);
        assert_eq!(stats.total_triggers, 1200);
        assert_eq!(
            acquisition.get_sink().log,
            vec!["burst 0", "file 0", "burst 1", "rate", "file 1", "stats"]
        );

        let transmitted = &acquisition.get_consumer().transmitted;
        assert_eq!(transmitted.len(), 2);
        let first = read_words(&transmitted[0]);
        let second = read_words(&transmitted[1]);
        assert_eq!(
            first,
            vec![
                TdcEvent::decode(1),
                TdcEvent::Trigger,
                TdcEvent::decode(2),
                TdcEvent::Trigger,
                TdcEvent::decode(3)
            ]
        );
        assert_eq!(second, vec![TdcEvent::Trigger, TdcEvent::decode(4)]);
        assert_eq!(TdcFile::open(&transmitted[1]).unwrap().header().spill_id, 1);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_setup_errors_write_nothing() {
        let dir = scratch_dir("acquisition_setup");
        let mut no_fanout = context(
            settings(&dir, 10),
            vec![ScriptedBoard::new(vec![])],
            None,
        );
        assert!(matches!(
            no_fanout.run(),
            Err(AcquisitionError::NoTriggerFanout)
        ));

        let mut bad_board = ScriptedBoard::new(vec![]);
        bad_board.acquisition_mode = 7;
        let mut bad_mode = context(
            settings(&dir, 10),
            vec![bad_board],
            Some(ScriptedFanout::new(&[])),
        );
        assert!(matches!(
            bad_mode.run(),
            Err(AcquisitionError::Mode(ModeError::InvalidAcquisitionMode(7)))
        ));
        assert!(bad_mode.get_sink().log.is_empty());
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_abort_request_stops_cleanly() {
        let dir = scratch_dir("acquisition_abort");
        let mut board = ScriptedBoard::new(vec![one_word(1)]);
        board.endless = true;
        let abort = AbortSignal::new();
        let mut acquisition = AcquisitionContext::new(
            settings(&dir, 10),
            vec![board],
            Some(ScriptedFanout::new(&[3])),
            RecordingConsumer::default(),
            RecordingSink::default(),
            abort.clone(),
        );
        abort.request();

        let stats = acquisition.run().unwrap();
        assert!(acquisition.get_boards()[0].is_aborted);
        assert_eq!(stats.files_written, 1);
        assert_eq!(stats.events_per_board, vec![1]);
        assert_eq!(acquisition.get_consumer().transmitted.len(), 1);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_fatal_error_still_closes_files() {
        let dir = scratch_dir("acquisition_fatal");
        let board = ScriptedBoard::new(vec![
            one_word(1),
            DrainStatus::Advisory(HardwareError::RegisterRead(0x10)),
            one_word(2),
            DrainStatus::Fatal(HardwareError::NotResponding(0x00aa_0000)),
        ]);
        let mut acquisition = context(
            settings(&dir, 5000),
            vec![board],
            Some(ScriptedFanout::new(&[])),
        );

        assert!(matches!(
            acquisition.run(),
            Err(AcquisitionError::Hardware(HardwareError::NotResponding(_)))
        ));
        assert_eq!(
            acquisition.get_sink().log,
            vec!["burst 0", "file 0", "stats", "exception"]
        );
        let transmitted = &acquisition.get_consumer().transmitted;
        assert_eq!(
            read_words(&transmitted[0]),
            vec![TdcEvent::decode(1), TdcEvent::decode(2)]
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_failed_and_decreasing_reads_keep_last_count() {
        let dir = scratch_dir("acquisition_bad_reads");
        let board = ScriptedBoard::new((1..=7).map(one_word).collect());
        let fanout = ScriptedFanout::with_reads(vec![
            Ok(0),
            Err(HardwareError::RegisterRead(0x1024)),
            Ok(5),
            Err(HardwareError::RegisterRead(0x1024)),
            Ok(3),
            Ok(5),
            Ok(9),
        ]);
        let mut acquisition = context(settings(&dir, 5000), vec![board], Some(fanout));

        let stats = acquisition.run().unwrap();
        assert_eq!(stats.total_triggers, 9);
        assert_eq!(acquisition.get_trigger_count(), 9);

        let words = read_words(&acquisition.get_consumer().transmitted[0]);
        // Only 0 -> 5 and 5 -> 9 are counter changes
        assert_eq!(
            words,
            vec![
                TdcEvent::decode(1),
                TdcEvent::decode(2),
                TdcEvent::Trigger,
                TdcEvent::decode(3),
                TdcEvent::decode(4),
                TdcEvent::decode(5),
                TdcEvent::decode(6),
                TdcEvent::Trigger,
                TdcEvent::decode(7),
            ]
        );
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_continuous_mode_rotates_without_markers() {
        let dir = scratch_dir("acquisition_continuous");
        let board = ScriptedBoard::new((1..=4).map(one_word).collect());
        let fanout = ScriptedFanout::new(&[0, 400, 1000, 1200]);
        let mut continuous = settings(&dir, 1);
        continuous.global_mode = GlobalAcquisitionMode::Continuous;
        let mut acquisition = context(continuous, vec![board], Some(fanout));

        let stats = acquisition.run().unwrap();
        assert_eq!(stats.files_written, 2);
        assert_eq!(stats.total_triggers, 1200);

        let transmitted = &acquisition.get_consumer().transmitted;
        assert_eq!(transmitted.len(), 2);
        assert_eq!(
            read_words(&transmitted[0]),
            vec![
                TdcEvent::decode(1),
                TdcEvent::decode(2),
                TdcEvent::decode(3)
            ]
        );
        assert_eq!(read_words(&transmitted[1]), vec![TdcEvent::decode(4)]);
        std::fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn test_announces_transferred_location() {
        let dir = scratch_dir("acquisition_transfer");
        let transfer = dir.join("transfer");
        let output = dir.join("output");
        std::fs::create_dir_all(&output).unwrap();
        let board = ScriptedBoard::new((1..=2).map(one_word).collect());
        let mut acquisition = AcquisitionContext::new(
            settings(&output, 10),
            vec![board],
            Some(ScriptedFanout::new(&[0])),
            FileCopier::new(&transfer, true),
            PathSink::default(),
            AbortSignal::new(),
        );

        acquisition.run().unwrap();
        let announced = &acquisition.get_sink().announced;
        assert_eq!(announced.len(), 1);
        assert!(announced[0].starts_with(&transfer));
        assert!(announced[0].exists());
        assert_eq!(read_words(&announced[0]).len(), 2);
        // The local copy is gone
        assert_eq!(std::fs::read_dir(&output).unwrap().count(), 0);
        std::fs::remove_dir_all(dir).unwrap();
    }
}
