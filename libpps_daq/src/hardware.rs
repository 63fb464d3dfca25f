use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::constants::RESET_PULSE_US;
use super::error::HardwareError;
use super::tdc_event::TdcEvent;

/// Raw access to the registers of a board on the bus.
pub trait RegisterAccess {
    fn read_register(&self, offset: u32) -> Result<u32, HardwareError>;
    fn write_register(&self, offset: u32, word: u32) -> Result<(), HardwareError>;
}

/// The unit distributing control lines to every TDC and counting the triggers it fans out.
pub trait TriggerFanout {
    fn start_scaler(&mut self) -> Result<(), HardwareError>;
    fn stop_scaler(&mut self) -> Result<(), HardwareError>;
    fn read_scaler(&mut self) -> Result<u32, HardwareError>;
    /// Raise the reset and clear lines of every TDC at once
    fn pulse_reset_clear(&mut self) -> Result<(), HardwareError>;
}

/// Outcome of one readout of a TDC board.
///
/// The acquisition loop matches on this instead of relying on errors to learn that the
/// hardware halted.
#[derive(Debug, Clone)]
pub enum DrainStatus {
    /// Words read from the board, possibly none
    Events(Vec<TdcEvent>),
    /// Readout failed but acquisition can go on
    Advisory(HardwareError),
    /// The board reports the run is over
    AcquisitionStop,
    /// Readout failed and the run cannot go on
    Fatal(HardwareError),
}

/// A TDC board as seen by the acquisition.
pub trait TdcBoard {
    fn base_address(&self) -> u32;
    /// Raw acquisition mode code, as reported by the board
    fn acquisition_mode(&self) -> u32;
    /// Raw detection mode code, as reported by the board
    fn detection_mode(&self) -> u32;
    fn fetch_events(&mut self) -> DrainStatus;
    /// Ask the board to stop acquiring; the following readouts end with `AcquisitionStop`
    fn abort(&mut self);
}

/// Location of the fanout registers and bits used by the acquisition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FanoutRegisterMap {
    pub control: u32,
    pub scaler_counter: u32,
    pub tdc_lines: u32,
    pub scaler_enable_bit: u8,
    pub scaler_reset_bit: u8,
    pub reset_line: u32,
    pub clear_line: u32,
}

impl Default for FanoutRegisterMap {
    fn default() -> Self {
        Self {
            control: 0x1018,
            scaler_counter: 0x1024,
            tdc_lines: 0x1014,
            scaler_enable_bit: 4,
            scaler_reset_bit: 5,
            reset_line: 0x2,
            clear_line: 0x1,
        }
    }
}

/// A trigger fanout driven through its registers.
#[derive(Debug)]
pub struct FanoutUnit<R: RegisterAccess> {
    registers: R,
    map: FanoutRegisterMap,
    settle_time: Duration,
}

impl<R: RegisterAccess> FanoutUnit<R> {
    pub fn new(registers: R, map: FanoutRegisterMap) -> Self {
        Self {
            registers,
            map,
            settle_time: Duration::from_micros(RESET_PULSE_US),
        }
    }

    pub fn get_registers(&self) -> &R {
        &self.registers
    }

    fn set_control_bit(&self, control: u32, bit: u8, value: bool) -> u32 {
        if value {
            control | (1 << bit)
        } else {
            control & !(1 << bit)
        }
    }

    fn set_tdc_lines(&self, lines: u32) -> Result<(), HardwareError> {
        if self.registers.read_register(self.map.tdc_lines)? == lines {
            return Ok(());
        }
        self.registers.write_register(self.map.tdc_lines, lines)
    }
}

impl<R: RegisterAccess> TriggerFanout for FanoutUnit<R> {
    fn start_scaler(&mut self) -> Result<(), HardwareError> {
        // Stop and reset the counter first, then release the reset and enable it
        let mut control = self.registers.read_register(self.map.control)?;
        control = self.set_control_bit(control, self.map.scaler_enable_bit, false);
        control = self.set_control_bit(control, self.map.scaler_reset_bit, true);
        self.registers.write_register(self.map.control, control)?;
        std::thread::sleep(self.settle_time);
        control = self.set_control_bit(control, self.map.scaler_enable_bit, true);
        control = self.set_control_bit(control, self.map.scaler_reset_bit, false);
        self.registers.write_register(self.map.control, control)?;
        std::thread::sleep(self.settle_time);
        Ok(())
    }

    fn stop_scaler(&mut self) -> Result<(), HardwareError> {
        let control = self.registers.read_register(self.map.control)?;
        let control = self.set_control_bit(control, self.map.scaler_enable_bit, false);
        self.registers.write_register(self.map.control, control)
    }

    fn read_scaler(&mut self) -> Result<u32, HardwareError> {
        self.registers.read_register(self.map.scaler_counter)
    }

    fn pulse_reset_clear(&mut self) -> Result<(), HardwareError> {
        self.set_tdc_lines(self.map.reset_line | self.map.clear_line)?;
        std::thread::sleep(self.settle_time);
        self.set_tdc_lines(0x0)
    }
}
