use bitvec::prelude::*;
use std::fmt::Display;

use super::constants::{NUMBER_OF_ERROR_FLAGS, PAYLOAD_MASK, TAG_SHIFT, TRIGGER_WORD};

// Tag values found in bits 31..27 of a TDC word
const TAG_TDC_MEASUREMENT: u32 = 0b00000;
const TAG_TDC_HEADER: u32 = 0b00001;
const TAG_TDC_TRAILER: u32 = 0b00011;
const TAG_TDC_ERROR: u32 = 0b00100;
const TAG_GLOBAL_HEADER: u32 = 0b01000;
const TAG_GLOBAL_TRAILER: u32 = 0b10000;
const TAG_ETTT: u32 = 0b10001;
const TAG_FILLER: u32 = 0b11000;
const TAG_TRIGGER: u32 = 0b11111;

// Bits of a payload which are not part of any named field
const GLOBAL_TRAILER_SPARE_MASK: u32 = 0x00e0_0000;
const TDC_WORD_SPARE_MASK: u32 = 0x0400_0000;
const TDC_ERROR_SPARE_MASK: u32 = 0x04ff_8000;

/// Meaning of each bit of the error word emitted by an HPTDC chip.
const ERROR_FLAG_NAMES: [&str; NUMBER_OF_ERROR_FLAGS] = [
    "hit lost in group 0 from read-out FIFO overflow",
    "hit lost in group 0 from L1 buffer overflow",
    "hit error detected in group 0",
    "hit lost in group 1 from read-out FIFO overflow",
    "hit lost in group 1 from L1 buffer overflow",
    "hit error detected in group 1",
    "hit lost in group 2 from read-out FIFO overflow",
    "hit lost in group 2 from L1 buffer overflow",
    "hit error detected in group 2",
    "hit lost in group 3 from read-out FIFO overflow",
    "hit lost in group 3 from L1 buffer overflow",
    "hit error detected in group 3",
    "hits rejected because of programmed event size limit",
    "event lost (trigger FIFO overflow)",
    "internal fatal chip error detected",
];

/// The kind of a TdcEvent, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    GlobalHeader,
    GlobalTrailer,
    TdcHeader,
    TdcTrailer,
    TdcMeasurement,
    TdcError,
    Filler,
    Ettt,
    Trigger,
    Unknown,
}

/// A single 32-bit word of a V1x90 TDC readout, decoded according to its tag.
///
/// Every 32-bit value decodes to exactly one variant; tags with no meaning are kept as
/// `Unknown`. Variants with unused payload bits keep them in `spare` (at their original
/// position) so that `encode` gives back the exact word that was decoded. The `Trigger`
/// variant is a marker injected by the acquisition when the trigger counter moves; it has
/// no hardware counterpart and always encodes to the same word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TdcEvent {
    GlobalHeader {
        event_count: u32,
        geo: u8,
    },
    GlobalTrailer {
        status: u8,
        word_count: u16,
        geo: u8,
        spare: u32,
    },
    TdcHeader {
        tdc: u8,
        event_id: u16,
        bunch_id: u16,
        spare: u32,
    },
    TdcTrailer {
        tdc: u8,
        event_id: u16,
        word_count: u16,
        spare: u32,
    },
    TdcMeasurement {
        channel: u8,
        trailing: bool,
        time: u32,
    },
    TdcError {
        tdc: u8,
        flags: u16,
        spare: u32,
    },
    Filler {
        spare: u32,
    },
    Ettt {
        time_tag: u32,
    },
    Trigger,
    Unknown(u32),
}

impl TdcEvent {
    /// Decode a raw word. Never fails.
    pub fn decode(word: u32) -> Self {
        let payload = word & PAYLOAD_MASK;
        match word >> TAG_SHIFT {
            TAG_TDC_MEASUREMENT => Self::TdcMeasurement {
                trailing: (payload >> 26) & 0x1 == 1,
                channel: ((payload >> 19) & 0x7f) as u8,
                time: payload & 0x7ffff,
            },
            TAG_TDC_HEADER => Self::TdcHeader {
                tdc: ((payload >> 24) & 0x3) as u8,
                event_id: ((payload >> 12) & 0xfff) as u16,
                bunch_id: (payload & 0xfff) as u16,
                spare: payload & TDC_WORD_SPARE_MASK,
            },
            TAG_TDC_TRAILER => Self::TdcTrailer {
                tdc: ((payload >> 24) & 0x3) as u8,
                event_id: ((payload >> 12) & 0xfff) as u16,
                word_count: (payload & 0xfff) as u16,
                spare: payload & TDC_WORD_SPARE_MASK,
            },
            TAG_TDC_ERROR => Self::TdcError {
                tdc: ((payload >> 24) & 0x3) as u8,
                flags: (payload & 0x7fff) as u16,
                spare: payload & TDC_ERROR_SPARE_MASK,
            },
            TAG_GLOBAL_HEADER => Self::GlobalHeader {
                event_count: (payload >> 5) & 0x3f_ffff,
                geo: (payload & 0x1f) as u8,
            },
            TAG_GLOBAL_TRAILER => Self::GlobalTrailer {
                status: ((payload >> 24) & 0x7) as u8,
                word_count: ((payload >> 5) & 0xffff) as u16,
                geo: (payload & 0x1f) as u8,
                spare: payload & GLOBAL_TRAILER_SPARE_MASK,
            },
            TAG_ETTT => Self::Ettt { time_tag: payload },
            TAG_FILLER => Self::Filler { spare: payload },
            TAG_TRIGGER => Self::Trigger,
            _ => Self::Unknown(word),
        }
    }

    /// Encode the event back into its raw word.
    pub fn encode(&self) -> u32 {
        match *self {
            Self::TdcMeasurement {
                channel,
                trailing,
                time,
            } => {
                (TAG_TDC_MEASUREMENT << TAG_SHIFT)
                    | ((trailing as u32) << 26)
                    | (((channel as u32) & 0x7f) << 19)
                    | (time & 0x7ffff)
            }
            Self::TdcHeader {
                tdc,
                event_id,
                bunch_id,
                spare,
            } => {
                (TAG_TDC_HEADER << TAG_SHIFT)
                    | (spare & TDC_WORD_SPARE_MASK)
                    | (((tdc as u32) & 0x3) << 24)
                    | (((event_id as u32) & 0xfff) << 12)
                    | ((bunch_id as u32) & 0xfff)
            }
            Self::TdcTrailer {
                tdc,
                event_id,
                word_count,
                spare,
            } => {
                (TAG_TDC_TRAILER << TAG_SHIFT)
                    | (spare & TDC_WORD_SPARE_MASK)
                    | (((tdc as u32) & 0x3) << 24)
                    | (((event_id as u32) & 0xfff) << 12)
                    | ((word_count as u32) & 0xfff)
            }
            Self::TdcError { tdc, flags, spare } => {
                (TAG_TDC_ERROR << TAG_SHIFT)
                    | (spare & TDC_ERROR_SPARE_MASK)
                    | (((tdc as u32) & 0x3) << 24)
                    | ((flags as u32) & 0x7fff)
            }
            Self::GlobalHeader { event_count, geo } => {
                (TAG_GLOBAL_HEADER << TAG_SHIFT)
                    | ((event_count & 0x3f_ffff) << 5)
                    | ((geo as u32) & 0x1f)
            }
            Self::GlobalTrailer {
                status,
                word_count,
                geo,
                spare,
            } => {
                (TAG_GLOBAL_TRAILER << TAG_SHIFT)
                    | (((status as u32) & 0x7) << 24)
                    | (spare & GLOBAL_TRAILER_SPARE_MASK)
                    | ((word_count as u32) << 5)
                    | ((geo as u32) & 0x1f)
            }
            Self::Ettt { time_tag } => (TAG_ETTT << TAG_SHIFT) | (time_tag & PAYLOAD_MASK),
            Self::Filler { spare } => (TAG_FILLER << TAG_SHIFT) | (spare & PAYLOAD_MASK),
            Self::Trigger => TRIGGER_WORD,
            Self::Unknown(word) => word,
        }
    }

    pub fn kind(&self) -> EventKind {
        match self {
            Self::GlobalHeader { .. } => EventKind::GlobalHeader,
            Self::GlobalTrailer { .. } => EventKind::GlobalTrailer,
            Self::TdcHeader { .. } => EventKind::TdcHeader,
            Self::TdcTrailer { .. } => EventKind::TdcTrailer,
            Self::TdcMeasurement { .. } => EventKind::TdcMeasurement,
            Self::TdcError { .. } => EventKind::TdcError,
            Self::Filler { .. } => EventKind::Filler,
            Self::Ettt { .. } => EventKind::Ettt,
            Self::Trigger => EventKind::Trigger,
            Self::Unknown(_) => EventKind::Unknown,
        }
    }

    /// Channel of a measurement word. None for every other kind.
    pub fn channel(&self) -> Option<u8> {
        match self {
            Self::TdcMeasurement { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    /// True for the trailing-edge measurement of a channel
    pub fn is_trailing(&self) -> bool {
        matches!(self, Self::TdcMeasurement { trailing: true, .. })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::TdcError { .. })
    }

    /// Human readable names of the error bits set in a TdcError word.
    pub fn error_descriptions(&self) -> Vec<&'static str> {
        match self {
            Self::TdcError { flags, .. } => flags.view_bits::<Lsb0>()[..NUMBER_OF_ERROR_FLAGS]
                .iter_ones()
                .map(|bit| ERROR_FLAG_NAMES[bit])
                .collect(),
            _ => Vec::new(),
        }
    }
}

impl From<u32> for TdcEvent {
    fn from(word: u32) -> Self {
        Self::decode(word)
    }
}

impl From<&TdcEvent> for u32 {
    fn from(event: &TdcEvent) -> Self {
        event.encode()
    }
}

impl Display for TdcEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GlobalHeader { event_count, geo } => {
                write!(f, "Global header -- event count: {event_count} geo: {geo}")
            }
            Self::GlobalTrailer {
                status,
                word_count,
                geo,
                ..
            } => write!(
                f,
                "Global trailer -- status: {status:#05b} word count: {word_count} geo: {geo}"
            ),
            Self::TdcHeader {
                tdc,
                event_id,
                bunch_id,
                ..
            } => write!(
                f,
                "TDC header -- tdc: {tdc} event id: {event_id} bunch id: {bunch_id}"
            ),
            Self::TdcTrailer {
                tdc,
                event_id,
                word_count,
                ..
            } => write!(
                f,
                "TDC trailer -- tdc: {tdc} event id: {event_id} word count: {word_count}"
            ),
            Self::TdcMeasurement {
                channel,
                trailing,
                time,
            } => write!(
                f,
                "TDC measurement -- channel: {channel} edge: {} time: {time}",
                if *trailing { "trailing" } else { "leading" }
            ),
            Self::TdcError { tdc, flags, .. } => {
                write!(f, "TDC error -- tdc: {tdc} flags: {flags:#017b}")
            }
            Self::Filler { .. } => write!(f, "Filler"),
            Self::Ettt { time_tag } => write!(f, "Extended trigger time tag -- {time_tag}"),
            Self::Trigger => write!(f, "Trigger"),
            Self::Unknown(word) => write!(f, "Unknown word {word:#010x}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_measurement() {
        // trailing edge, channel 12, time 0x1234
        let word = (1 << 26) | (12 << 19) | 0x1234;
        let event = TdcEvent::decode(word);
        assert_eq!(
            event,
            TdcEvent::TdcMeasurement {
                channel: 12,
                trailing: true,
                time: 0x1234
            }
        );
        assert_eq!(event.channel(), Some(12));
        assert!(event.is_trailing());
    }

    #[test]
    fn test_decode_headers_and_trailers() {
        let global_header = TdcEvent::decode(0x4000_0000 | (42 << 5) | 3);
        assert_eq!(
            global_header,
            TdcEvent::GlobalHeader {
                event_count: 42,
                geo: 3
            }
        );
        assert_eq!(global_header.channel(), None);

        let global_trailer = TdcEvent::decode(0x8000_0000 | (0b101 << 24) | (17 << 5) | 3);
        assert_eq!(
            global_trailer,
            TdcEvent::GlobalTrailer {
                status: 0b101,
                word_count: 17,
                geo: 3,
                spare: 0
            }
        );

        let tdc_header = TdcEvent::decode(0x0800_0000 | (2 << 24) | (100 << 12) | 55);
        assert_eq!(tdc_header.kind(), EventKind::TdcHeader);
        let tdc_trailer = TdcEvent::decode(0x1800_0000 | (2 << 24) | (100 << 12) | 9);
        assert_eq!(
            tdc_trailer,
            TdcEvent::TdcTrailer {
                tdc: 2,
                event_id: 100,
                word_count: 9,
                spare: 0
            }
        );
        assert_eq!(TdcEvent::decode(0xc000_0000).kind(), EventKind::Filler);
        assert_eq!(
            TdcEvent::decode(0x8800_00ff),
            TdcEvent::Ettt { time_tag: 0xff }
        );
    }

    #[test]
    fn test_unknown_tags_do_not_fail() {
        for tag in [0b00010u32, 0b00101, 0b01111, 0b11110] {
            let word = (tag << TAG_SHIFT) | 0x1;
            assert_eq!(TdcEvent::decode(word), TdcEvent::Unknown(word));
        }
    }

    #[test]
    fn test_trigger_marker() {
        assert_eq!(TdcEvent::Trigger.encode(), TRIGGER_WORD);
        assert_eq!(TdcEvent::decode(TRIGGER_WORD), TdcEvent::Trigger);
        // Any payload under the reserved tag is still a trigger marker
        assert_eq!(TdcEvent::decode(TRIGGER_WORD | 0x42), TdcEvent::Trigger);
    }

    #[test]
    fn test_error_descriptions() {
        let event = TdcEvent::TdcError {
            tdc: 1,
            flags: (1 << 0) | (1 << 13),
            spare: 0,
        };
        assert!(event.is_error());
        assert_eq!(
            event.error_descriptions(),
            vec![
                "hit lost in group 0 from read-out FIFO overflow",
                "event lost (trigger FIFO overflow)"
            ]
        );
        assert!(TdcEvent::Trigger.error_descriptions().is_empty());
    }

    proptest! {
        #[test]
        fn decode_then_encode_is_identity(word in any::<u32>()) {
            prop_assume!(word >> TAG_SHIFT != TAG_TRIGGER);
            prop_assert_eq!(TdcEvent::decode(word).encode(), word);
        }

        #[test]
        fn trigger_tag_always_decodes_to_marker(payload in 0u32..=PAYLOAD_MASK) {
            let word = (TAG_TRIGGER << TAG_SHIFT) | payload;
            prop_assert_eq!(TdcEvent::decode(word), TdcEvent::Trigger);
        }
    }
}
