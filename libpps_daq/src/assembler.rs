use std::collections::VecDeque;
use std::convert::Infallible;

use super::error::{AssemblerError, TdcFileError};
use super::file_header::AcquisitionMode;
use super::tdc_event::TdcEvent;
use super::tdc_file::TdcFile;

/// Anything which yields decoded events one at a time.
///
/// `Ok(None)` means the source has no more events.
pub trait EventSource {
    type Error;
    fn next_event(&mut self) -> Result<Option<TdcEvent>, Self::Error>;
}

impl EventSource for TdcFile {
    type Error = TdcFileError;
    fn next_event(&mut self) -> Result<Option<TdcEvent>, Self::Error> {
        match self.get_next_event() {
            Ok(event) => Ok(Some(event)),
            Err(TdcFileError::EndOfFile) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

impl EventSource for VecDeque<TdcEvent> {
    type Error = Infallible;
    fn next_event(&mut self) -> Result<Option<TdcEvent>, Self::Error> {
        Ok(self.pop_front())
    }
}

impl From<Infallible> for AssemblerError {
    fn from(value: Infallible) -> Self {
        match value {}
    }
}

/// A group of events belonging to one channel and one acquisition window.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Measurement {
    pub channel: u8,
    events: Vec<TdcEvent>,
    has_error: bool,
    is_complete: bool,
}

impl Measurement {
    pub fn get_events(&self) -> &[TdcEvent] {
        &self.events
    }

    /// At least one error word was found while building this measurement
    pub fn has_error(&self) -> bool {
        self.has_error
    }

    /// False when a trigger marker closed the measurement before both edges were seen
    /// (continuous storage only). Trigger matched measurements are always complete.
    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn leading_times(&self) -> Vec<u32> {
        self.times(false)
    }

    pub fn trailing_times(&self) -> Vec<u32> {
        self.times(true)
    }

    /// Difference between the first trailing and the first leading edge, in TDC bins
    pub fn time_over_threshold(&self) -> Option<i64> {
        let lead = *self.leading_times().first()?;
        let trail = *self.trailing_times().first()?;
        Some(trail as i64 - lead as i64)
    }

    fn times(&self, want_trailing: bool) -> Vec<u32> {
        self.events
            .iter()
            .filter_map(|event| match event {
                TdcEvent::TdcMeasurement { trailing, time, .. } if *trailing == want_trailing => {
                    Some(*time)
                }
                _ => None,
            })
            .collect()
    }
}

/// MeasurementAssembler groups a flat event stream into Measurements for a channel.
///
/// The grouping rule depends on the readout mode of the board which produced the data,
/// and is fixed for the lifetime of the assembler.
#[derive(Debug, Clone, Copy)]
pub struct MeasurementAssembler {
    mode: AcquisitionMode,
}

impl MeasurementAssembler {
    pub fn new(mode: AcquisitionMode) -> Self {
        Self { mode }
    }

    /// Create an assembler from a raw mode code (as stored in a file header).
    pub fn from_mode_code(code: u32) -> Result<Self, AssemblerError> {
        Ok(Self::new(AcquisitionMode::try_from(code)?))
    }

    /// Create an assembler suited to the data of a file
    pub fn for_file(file: &TdcFile) -> Result<Self, AssemblerError> {
        Self::from_mode_code(file.header().acq_mode)
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    /// Pull events from the source until a measurement for `channel` is complete.
    ///
    /// Returns `Ok(None)` if the source ran out of events before that happened; whatever
    /// was accumulated in the meantime is dropped.
    pub fn next_measurement<S>(
        &self,
        source: &mut S,
        channel: u8,
    ) -> Result<Option<Measurement>, AssemblerError>
    where
        S: EventSource,
        AssemblerError: From<S::Error>,
    {
        let measurement = match self.mode {
            AcquisitionMode::ContinuousStorage => Self::next_continuous(source, channel)?,
            AcquisitionMode::TriggerMatching => Self::next_trigger_matched(source, channel)?,
        };
        if let Some(m) = &measurement {
            if m.has_error {
                log::warn!("Measurement on channel {channel} has at least one error word.");
            }
        }
        Ok(measurement)
    }

    /// Continuous storage: done once both edges were seen, or when a trigger marker shows up
    fn next_continuous<S>(source: &mut S, channel: u8) -> Result<Option<Measurement>, AssemblerError>
    where
        S: EventSource,
        AssemblerError: From<S::Error>,
    {
        let mut measurement = Measurement {
            channel,
            ..Default::default()
        };
        let mut has_lead = false;
        let mut has_trail = false;
        loop {
            let event = match source.next_event()? {
                Some(e) => e,
                None => return Ok(None),
            };
            match event {
                TdcEvent::TdcMeasurement {
                    channel: ch,
                    trailing,
                    ..
                } => {
                    if ch != channel {
                        continue;
                    }
                    if trailing {
                        has_trail = true;
                    } else {
                        has_lead = true;
                    }
                }
                TdcEvent::TdcError { .. } => measurement.has_error = true,
                _ => (),
            }
            measurement.events.push(event);

            if has_lead && has_trail {
                measurement.is_complete = true;
                break;
            }
            if event == TdcEvent::Trigger {
                break;
            }
        }
        Ok(Some(measurement))
    }

    /// Trigger matching: everything up to the global trailer, other channels' hits removed
    fn next_trigger_matched<S>(
        source: &mut S,
        channel: u8,
    ) -> Result<Option<Measurement>, AssemblerError>
    where
        S: EventSource,
        AssemblerError: From<S::Error>,
    {
        let mut measurement = Measurement {
            channel,
            ..Default::default()
        };
        loop {
            let event = match source.next_event()? {
                Some(e) => e,
                None => return Ok(None),
            };
            match event {
                TdcEvent::TdcMeasurement { channel: ch, .. } if ch != channel => continue,
                TdcEvent::TdcError { .. } => measurement.has_error = true,
                _ => (),
            }
            measurement.events.push(event);

            if let TdcEvent::GlobalTrailer { .. } = event {
                measurement.is_complete = true;
                break;
            }
        }
        Ok(Some(measurement))
    }
}
