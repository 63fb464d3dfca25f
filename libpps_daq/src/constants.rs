// File format
pub const FILE_MAGIC: u32 = 0x30535050; // "PPS0" in ASCII
pub const FILE_HEADER_SIZE: u64 = 20; // magic, run, spill, acq mode, det mode
pub const EVENT_WORD_SIZE: u64 = 4;
pub const FILE_PREFIX: &str = "events";
pub const FILE_EXTENSION: &str = "dat";

// TDC word layout
pub const TAG_SHIFT: u32 = 27;
pub const PAYLOAD_MASK: u32 = 0x07ff_ffff;
pub const TRIGGER_WORD: u32 = 0xf800_0000; // synthetic marker, never produced by a board
pub const NUMBER_OF_ERROR_FLAGS: usize = 15;

// Acquisition control
pub const DEFAULT_TRIGGERS_PER_FILE: u64 = 1000;
pub const DEFAULT_READOUTS_PER_POLL: u64 = 5000;
pub const FORCE_EXIT_THRESHOLD: usize = 5; // interrupts tolerated before skipping cleanup
pub const RESET_PULSE_US: u64 = 1000;

// Messaging
pub const DEFAULT_COORDINATOR_PORT: u16 = 1987;
pub const MAX_MESSAGE_LENGTH: u32 = 1 << 16;
