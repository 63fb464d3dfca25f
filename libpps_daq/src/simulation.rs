use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use super::error::HardwareError;
use super::file_header::AcquisitionMode;
use super::hardware::{DrainStatus, FanoutRegisterMap, FanoutUnit, RegisterAccess, TdcBoard};
use super::tdc_event::TdcEvent;

/// Most triggers a simulated board hands out per readout
const MAX_TRIGGERS_PER_FETCH: u64 = 64;
/// Pause of a readout finding no new trigger
const IDLE_WAIT: Duration = Duration::from_micros(200);
/// Width of the simulated pulses, in TDC bins
const PULSE_WIDTH: u32 = 40;
const TIME_MASK: u32 = 0x7ffff;

/// Parameters of the simulated crate
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SimulationParameters {
    /// Time between two triggers; 0 means triggers are only fired by hand
    pub trigger_period_us: u64,
    /// Channels hit on every trigger
    pub hit_channels: Vec<u8>,
    /// Stop the acquisition after this many triggers
    pub trigger_limit: Option<u64>,
}

impl Default for SimulationParameters {
    fn default() -> Self {
        Self {
            trigger_period_us: 1000,
            hit_channels: vec![0, 1, 2, 3],
            trigger_limit: None,
        }
    }
}

#[derive(Debug)]
struct CrateState {
    parameters: SimulationParameters,
    map: FanoutRegisterMap,
    start: Instant,
    manual_triggers: u64,
    triggers_fired: u64,
    control: u32,
    tdc_lines: u32,
    scaler_origin: u64,
    scaler_frozen: u64,
    event_origin: u64,
}

impl CrateState {
    fn advance(&mut self) {
        let mut fired = if self.parameters.trigger_period_us == 0 {
            self.manual_triggers
        } else {
            self.start.elapsed().as_micros() as u64 / self.parameters.trigger_period_us
        };
        if let Some(limit) = self.parameters.trigger_limit {
            fired = fired.min(limit);
        }
        // Never decrements
        self.triggers_fired = self.triggers_fired.max(fired);
    }

    fn is_limit_reached(&self) -> bool {
        match self.parameters.trigger_limit {
            Some(limit) => self.triggers_fired >= limit,
            None => false,
        }
    }

    fn is_scaler_enabled(&self) -> bool {
        self.control & (1 << self.map.scaler_enable_bit) != 0
    }

    fn scaler_value(&self) -> u64 {
        if self.is_scaler_enabled() {
            self.triggers_fired - self.scaler_origin
        } else {
            self.scaler_frozen
        }
    }
}

/// A VME crate living in memory: one trigger source shared by a fanout unit and any
/// number of TDC boards.
#[derive(Debug, Clone)]
pub struct SimulatedCrate {
    state: Rc<RefCell<CrateState>>,
}

impl SimulatedCrate {
    pub fn new(parameters: &SimulationParameters, map: FanoutRegisterMap) -> Self {
        Self {
            state: Rc::new(RefCell::new(CrateState {
                parameters: parameters.clone(),
                map,
                start: Instant::now(),
                manual_triggers: 0,
                triggers_fired: 0,
                control: 0,
                tdc_lines: 0,
                scaler_origin: 0,
                scaler_frozen: 0,
                event_origin: 0,
            })),
        }
    }

    /// The fanout unit of the crate, driven through its registers
    pub fn fanout(&self) -> FanoutUnit<SimulatedRegisters> {
        let map = self.state.borrow().map.clone();
        FanoutUnit::new(
            SimulatedRegisters {
                state: self.state.clone(),
            },
            map,
        )
    }

    pub fn board(
        &self,
        base_address: u32,
        acquisition_mode: u32,
        detection_mode: u32,
    ) -> SimulatedTdc {
        SimulatedTdc {
            state: self.state.clone(),
            base_address,
            acquisition_mode,
            detection_mode,
            triggers_read: 0,
            is_aborted: false,
        }
    }

    /// Fire triggers by hand (only with a trigger period of 0)
    pub fn fire_triggers(&self, n_triggers: u64) {
        self.state.borrow_mut().manual_triggers += n_triggers;
    }

    pub fn get_triggers_fired(&self) -> u64 {
        let mut state = self.state.borrow_mut();
        state.advance();
        state.triggers_fired
    }
}

/// Register file of the simulated fanout unit
#[derive(Debug)]
pub struct SimulatedRegisters {
    state: Rc<RefCell<CrateState>>,
}

impl RegisterAccess for SimulatedRegisters {
    fn read_register(&self, offset: u32) -> Result<u32, HardwareError> {
        let mut state = self.state.borrow_mut();
        state.advance();
        if offset == state.map.control {
            Ok(state.control)
        } else if offset == state.map.scaler_counter {
            Ok(state.scaler_value() as u32)
        } else if offset == state.map.tdc_lines {
            Ok(state.tdc_lines)
        } else {
            Err(HardwareError::RegisterRead(offset))
        }
    }

    fn write_register(&self, offset: u32, word: u32) -> Result<(), HardwareError> {
        let mut state = self.state.borrow_mut();
        state.advance();
        if offset == state.map.control {
            let was_enabled = state.is_scaler_enabled();
            if was_enabled && word & (1 << state.map.scaler_enable_bit) == 0 {
                state.scaler_frozen = state.scaler_value();
            }
            if word & (1 << state.map.scaler_reset_bit) != 0 {
                state.scaler_origin = state.triggers_fired;
                state.scaler_frozen = 0;
            }
            state.control = word;
            Ok(())
        } else if offset == state.map.tdc_lines {
            if word & state.map.clear_line != 0 {
                state.event_origin = state.triggers_fired;
            }
            state.tdc_lines = word;
            Ok(())
        } else {
            Err(HardwareError::RegisterWrite { offset, word })
        }
    }
}

/// A TDC board of the simulated crate.
///
/// Each trigger produces one hit per configured channel: a trigger matched block in
/// trigger matching mode, bare leading and trailing edges in continuous storage.
#[derive(Debug)]
pub struct SimulatedTdc {
    state: Rc<RefCell<CrateState>>,
    base_address: u32,
    acquisition_mode: u32,
    detection_mode: u32,
    triggers_read: u64,
    is_aborted: bool,
}

impl SimulatedTdc {
    fn trigger_block(&self, trigger: u64, event_origin: u64, channels: &[u8]) -> Vec<TdcEvent> {
        let geo = ((self.base_address >> 16) & 0x1f) as u8;
        let event_id = (trigger.saturating_sub(event_origin) & 0xfff) as u16;
        let hits: Vec<TdcEvent> = channels
            .iter()
            .flat_map(|channel| {
                let lead = (trigger as u32)
                    .wrapping_mul(37)
                    .wrapping_add(*channel as u32 * 101)
                    & TIME_MASK;
                [
                    TdcEvent::TdcMeasurement {
                        channel: *channel & 0x7f,
                        trailing: false,
                        time: lead,
                    },
                    TdcEvent::TdcMeasurement {
                        channel: *channel & 0x7f,
                        trailing: true,
                        time: (lead + PULSE_WIDTH) & TIME_MASK,
                    },
                ]
            })
            .collect();

        if self.acquisition_mode != AcquisitionMode::TriggerMatching.code() {
            return hits;
        }

        let mut block = Vec::with_capacity(hits.len() + 4);
        block.push(TdcEvent::GlobalHeader {
            event_count: (trigger as u32) & 0x3f_ffff,
            geo,
        });
        block.push(TdcEvent::TdcHeader {
            tdc: 0,
            event_id,
            bunch_id: (trigger & 0xfff) as u16,
            spare: 0,
        });
        block.extend(hits);
        block.push(TdcEvent::TdcTrailer {
            tdc: 0,
            event_id,
            word_count: (block.len() & 0xfff) as u16,
            spare: 0,
        });
        block.push(TdcEvent::GlobalTrailer {
            status: 0,
            word_count: ((block.len() + 1) & 0xffff) as u16,
            geo,
            spare: 0,
        });
        block
    }
}

impl TdcBoard for SimulatedTdc {
    fn base_address(&self) -> u32 {
        self.base_address
    }

    fn acquisition_mode(&self) -> u32 {
        self.acquisition_mode
    }

    fn detection_mode(&self) -> u32 {
        self.detection_mode
    }

    fn fetch_events(&mut self) -> DrainStatus {
        if self.is_aborted {
            return DrainStatus::AcquisitionStop;
        }
        let (fired, event_origin, channels, limit_reached) = {
            let mut state = self.state.borrow_mut();
            state.advance();
            (
                state.triggers_fired,
                state.event_origin,
                state.parameters.hit_channels.clone(),
                state.is_limit_reached(),
            )
        };

        if self.triggers_read >= fired {
            if limit_reached {
                return DrainStatus::AcquisitionStop;
            }
            std::thread::sleep(IDLE_WAIT);
            return DrainStatus::Events(vec![]);
        }

        let last = fired.min(self.triggers_read + MAX_TRIGGERS_PER_FETCH);
        let mut events = Vec::new();
        for trigger in (self.triggers_read + 1)..=last {
            events.extend(self.trigger_block(trigger, event_origin, &channels));
        }
        self.triggers_read = last;
        DrainStatus::Events(events)
    }

    fn abort(&mut self) {
        log::info!(
            "Stopping acquisition of TDC at base address {:#010x}",
            self.base_address
        );
        self.is_aborted = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::MeasurementAssembler;
    use crate::hardware::TriggerFanout;
    use std::collections::VecDeque;

    fn manual_crate(limit: Option<u64>) -> SimulatedCrate {
        SimulatedCrate::new(
            &SimulationParameters {
                trigger_period_us: 0,
                hit_channels: vec![2, 5],
                trigger_limit: limit,
            },
            FanoutRegisterMap::default(),
        )
    }

    fn drain(board: &mut SimulatedTdc) -> Vec<TdcEvent> {
        match board.fetch_events() {
            DrainStatus::Events(events) => events,
            other => panic!("Expected events, got {other:?}"),
        }
    }

    #[test]
    fn test_scaler_follows_triggers() {
        let sim = manual_crate(None);
        let mut fanout = sim.fanout();
        sim.fire_triggers(3);
        fanout.start_scaler().unwrap();
        assert_eq!(fanout.read_scaler().unwrap(), 0);
        sim.fire_triggers(4);
        assert_eq!(fanout.read_scaler().unwrap(), 4);
        fanout.stop_scaler().unwrap();
        sim.fire_triggers(2);
        assert_eq!(fanout.read_scaler().unwrap(), 4);
        assert_eq!(sim.get_triggers_fired(), 9);
    }

    #[test]
    fn test_trigger_matched_blocks_assemble() {
        let sim = manual_crate(None);
        let mut board = sim.board(0x00aa_0000, 1, 3);
        assert!(drain(&mut board).is_empty());
        sim.fire_triggers(2);
        let events = drain(&mut board);
        // 2 triggers x (4 framing words + 2 channels x 2 edges)
        assert_eq!(events.len(), 16);

        let assembler = MeasurementAssembler::from_mode_code(board.acquisition_mode()).unwrap();
        let mut source: VecDeque<TdcEvent> = events.into();
        let measurement = assembler.next_measurement(&mut source, 5).unwrap().unwrap();
        assert!(measurement.is_complete());
        assert_eq!(measurement.time_over_threshold(), Some(PULSE_WIDTH as i64));
        assert!(matches!(
            measurement.get_events().last(),
            Some(TdcEvent::GlobalTrailer { word_count: 8, .. })
        ));
    }

    #[test]
    fn test_limit_and_abort_stop_acquisition() {
        let sim = manual_crate(Some(3));
        let mut first = sim.board(0x00aa_0000, 0, 3);
        let mut second = sim.board(0x00bb_0000, 0, 3);
        sim.fire_triggers(10);
        assert_eq!(drain(&mut first).len(), 12);
        assert!(matches!(first.fetch_events(), DrainStatus::AcquisitionStop));

        second.abort();
        assert!(matches!(second.fetch_events(), DrainStatus::AcquisitionStop));
    }
}
