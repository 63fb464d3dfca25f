use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use super::error::{ListenerError, MessageError};
use super::message::{read_message, write_message, Message, MessageKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
}

/// A remote observer of the acquisition, connected to the coordinator.
///
/// The session only becomes usable once the coordinator assigned it an id. After a
/// `MasterDisconnect` (or a closed socket) nothing more is written on the session.
#[derive(Debug)]
pub struct Listener {
    stream: TcpStream,
    listener_id: i64,
    state: SessionState,
}

impl Listener {
    /// Connect to a coordinator and wait for it to assign an id
    pub fn connect<A: ToSocketAddrs>(address: A) -> Result<Self, ListenerError> {
        let stream = TcpStream::connect(address)?;
        let mut listener = Self {
            stream,
            listener_id: -1,
            state: SessionState::Connecting,
        };
        listener.announce()?;
        log::info!(
            "Connected to coordinator at {}, received id {}",
            listener.peer_address()?,
            listener.listener_id
        );
        Ok(listener)
    }

    fn announce(&mut self) -> Result<(), ListenerError> {
        let answer = match read_message(&mut self.stream) {
            Ok(m) => m,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e.into());
            }
        };
        match (answer.key, answer.int_value) {
            (MessageKey::SetListenerId, Some(id)) => {
                self.listener_id = id;
                self.state = SessionState::Connected;
                Ok(())
            }
            (key, _) => {
                self.state = SessionState::Disconnected;
                Err(ListenerError::UnexpectedAnswer(key))
            }
        }
    }

    pub fn get_id(&self) -> i64 {
        self.listener_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    pub fn peer_address(&self) -> Result<SocketAddr, ListenerError> {
        Ok(self.stream.peer_addr()?)
    }

    /// Limit how long `receive` blocks; `None` blocks forever
    pub fn set_read_timeout(&self, timeout: Option<Duration>) -> Result<(), ListenerError> {
        Ok(self.stream.set_read_timeout(timeout)?)
    }

    pub fn send(&mut self, message: &Message) -> Result<(), ListenerError> {
        if !self.is_connected() {
            return Err(ListenerError::NotConnected);
        }
        Ok(write_message(&mut self.stream, message)?)
    }

    /// Block until the coordinator sends something.
    ///
    /// A `MasterDisconnect` ends the session and is reported as `ListenerError::MasterDisconnected`.
    pub fn receive(&mut self) -> Result<Message, ListenerError> {
        if !self.is_connected() {
            return Err(ListenerError::NotConnected);
        }
        match read_message(&mut self.stream) {
            Ok(message) if message.key == MessageKey::MasterDisconnect => {
                log::warn!("Coordinator disconnected!");
                self.state = SessionState::Disconnected;
                Err(ListenerError::MasterDisconnected)
            }
            Ok(message) => Ok(message),
            Err(MessageError::ConnectionClosed) => {
                self.state = SessionState::Disconnected;
                Err(MessageError::ConnectionClosed.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Ask the coordinator to forget this listener.
    ///
    /// Failures are logged; the session is only marked disconnected once the coordinator
    /// confirmed the removal.
    pub fn disconnect(&mut self) {
        if !self.is_connected() {
            return;
        }
        log::info!("Disconnecting listener {} from coordinator", self.listener_id);
        if let Err(e) = write_message(
            &mut self.stream,
            &Message::with_int(MessageKey::RemoveListener, self.listener_id),
        ) {
            log::error!("Failed to send removal request: {e}");
        }
        // Broadcasts may still be queued ahead of the answer
        loop {
            match read_message(&mut self.stream) {
                Ok(answer) => match answer.key {
                    MessageKey::ListenerDeleted | MessageKey::MasterDisconnect => {
                        self.state = SessionState::Disconnected;
                        break;
                    }
                    _ => continue,
                },
                Err(e) => {
                    log::error!("Failed to receive removal confirmation: {e}");
                    break;
                }
            }
        }
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        self.disconnect();
    }
}
