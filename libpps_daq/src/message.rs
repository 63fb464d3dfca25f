use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fmt::Display;
use std::io::{Cursor, ErrorKind, Read, Write};

use super::constants::MAX_MESSAGE_LENGTH;
use super::error::MessageError;

const INT_PRESENT: u8 = 0x1;
const STRING_PRESENT: u8 = 0x2;
/// key + flags
const MIN_BODY_LENGTH: u32 = 5;

/// The fixed namespace of message keys shared by the coordinator and its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKey {
    Invalid,
    RemoveListener,
    MasterBroadcast,
    MasterDisconnect,
    SetListenerId,
    ListenerDeleted,
    NewBurst,
    TriggerRate,
    OutputFile,
    RunStatistics,
    Exception,
}

impl MessageKey {
    pub fn code(&self) -> u32 {
        match self {
            Self::Invalid => 0,
            Self::RemoveListener => 1,
            Self::MasterBroadcast => 2,
            Self::MasterDisconnect => 3,
            Self::SetListenerId => 4,
            Self::ListenerDeleted => 5,
            Self::NewBurst => 6,
            Self::TriggerRate => 7,
            Self::OutputFile => 8,
            Self::RunStatistics => 9,
            Self::Exception => 10,
        }
    }
}

impl TryFrom<u32> for MessageKey {
    type Error = MessageError;
    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Invalid),
            1 => Ok(Self::RemoveListener),
            2 => Ok(Self::MasterBroadcast),
            3 => Ok(Self::MasterDisconnect),
            4 => Ok(Self::SetListenerId),
            5 => Ok(Self::ListenerDeleted),
            6 => Ok(Self::NewBurst),
            7 => Ok(Self::TriggerRate),
            8 => Ok(Self::OutputFile),
            9 => Ok(Self::RunStatistics),
            10 => Ok(Self::Exception),
            _ => Err(MessageError::UnknownKey(value)),
        }
    }
}

/// A key with an optional integer and an optional string payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub key: MessageKey,
    pub int_value: Option<i64>,
    pub string_value: Option<String>,
}

impl Message {
    pub fn new(key: MessageKey) -> Self {
        Self {
            key,
            int_value: None,
            string_value: None,
        }
    }

    pub fn with_int(key: MessageKey, value: i64) -> Self {
        Self {
            key,
            int_value: Some(value),
            string_value: None,
        }
    }

    pub fn with_string(key: MessageKey, value: &str) -> Self {
        Self {
            key,
            int_value: None,
            string_value: Some(value.to_string()),
        }
    }

    /// Length of the frame body, i.e. everything after the length prefix
    fn body_length(&self) -> usize {
        let mut length = MIN_BODY_LENGTH as usize;
        if self.int_value.is_some() {
            length += 8;
        }
        if let Some(s) = &self.string_value {
            length += s.len();
        }
        length
    }
}

impl Display for Message {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.key)?;
        if let Some(value) = self.int_value {
            write!(f, " [{value}]")?;
        }
        if let Some(value) = &self.string_value {
            write!(f, " \"{value}\"")?;
        }
        Ok(())
    }
}

/// Write one length-prefixed frame
pub fn write_message<W: Write>(writer: &mut W, message: &Message) -> Result<(), MessageError> {
    let length = message.body_length();
    if length > MAX_MESSAGE_LENGTH as usize {
        return Err(MessageError::FrameTooLarge(length as u32));
    }

    let mut frame: Vec<u8> = Vec::with_capacity(length + 4);
    frame.write_u32::<LittleEndian>(length as u32)?;
    frame.write_u32::<LittleEndian>(message.key.code())?;
    let mut flags = 0u8;
    if message.int_value.is_some() {
        flags |= INT_PRESENT;
    }
    if message.string_value.is_some() {
        flags |= STRING_PRESENT;
    }
    frame.write_u8(flags)?;
    if let Some(value) = message.int_value {
        frame.write_i64::<LittleEndian>(value)?;
    }
    if let Some(value) = &message.string_value {
        frame.extend_from_slice(value.as_bytes());
    }

    writer.write_all(&frame)?;
    writer.flush()?;
    Ok(())
}

/// Read one length-prefixed frame.
///
/// A stream closed cleanly before the length prefix gives `MessageError::ConnectionClosed`.
pub fn read_message<R: Read>(reader: &mut R) -> Result<Message, MessageError> {
    let length = match reader.read_u32::<LittleEndian>() {
        Ok(l) => l,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
            return Err(MessageError::ConnectionClosed)
        }
        Err(e) => return Err(MessageError::IOError(e)),
    };
    if length > MAX_MESSAGE_LENGTH {
        return Err(MessageError::FrameTooLarge(length));
    }
    if length < MIN_BODY_LENGTH {
        return Err(MessageError::FrameTooShort(length));
    }

    let mut body = vec![0u8; length as usize];
    reader.read_exact(&mut body)?;
    let mut cursor = Cursor::new(body);

    let key = MessageKey::try_from(cursor.read_u32::<LittleEndian>()?)?;
    let flags = cursor.read_u8()?;
    let int_value = if flags & INT_PRESENT != 0 {
        match cursor.read_i64::<LittleEndian>() {
            Ok(v) => Some(v),
            Err(_) => return Err(MessageError::FrameTooShort(length)),
        }
    } else {
        None
    };
    let string_value = if flags & STRING_PRESENT != 0 {
        let start = cursor.position() as usize;
        let body = cursor.into_inner();
        Some(String::from_utf8(body[start..].to_vec())?)
    } else {
        None
    };

    Ok(Message {
        key,
        int_value,
        string_value,
    })
}
