use fxhash::FxHashMap;
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use super::error::{CoordinatorError, MessageError};
use super::message::{read_message, write_message, Message, MessageKey};
use super::poller::Poller;
use super::status::{BurstStatus, RunStatistics, StatusSink};

const ACCEPT_TOKEN: usize = 0;
const SOCKET_TIMEOUT: Duration = Duration::from_secs(1);

/// The master end of the messaging protocol.
///
/// Accepts listeners, hands out ids, answers their removal requests and broadcasts the
/// acquisition status to all of them. Nothing here blocks for long: `service_listeners` is
/// meant to be called from inside the acquisition loop.
pub struct Coordinator {
    server: TcpListener,
    sessions: FxHashMap<i64, TcpStream>,
    next_id: i64,
    poller: Poller,
}

impl Coordinator {
    pub fn bind<A: ToSocketAddrs>(address: A) -> Result<Self, CoordinatorError> {
        let server = TcpListener::bind(address)?;
        server.set_nonblocking(true)?;
        log::info!("Coordinator listening on {}", server.local_addr()?);
        Ok(Self {
            server,
            sessions: FxHashMap::default(),
            next_id: 1,
            poller: Poller::new(),
        })
    }

    pub fn local_address(&self) -> Result<SocketAddr, CoordinatorError> {
        Ok(self.server.local_addr()?)
    }

    pub fn number_of_listeners(&self) -> usize {
        self.sessions.len()
    }

    pub fn listener_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.sessions.keys().copied().collect();
        ids.sort();
        ids
    }

    /// Accept new listeners and answer pending requests, waiting at most `timeout`
    pub fn service_listeners(&mut self, timeout: Duration) -> Result<(), CoordinatorError> {
        self.poller.clear();
        self.poller.register(&self.server, ACCEPT_TOKEN);
        for (id, stream) in self.sessions.iter() {
            self.poller.register(stream, *id as usize);
        }

        let ready = self.poller.poll(timeout)?;
        if ready.is_ready(ACCEPT_TOKEN) {
            self.accept_pending()?;
        }
        let requests: Vec<i64> = ready
            .iter()
            .filter(|token| *token != ACCEPT_TOKEN)
            .map(|token| token as i64)
            .collect();
        for id in requests {
            self.handle_request(id);
        }
        Ok(())
    }

    fn accept_pending(&mut self) -> Result<(), CoordinatorError> {
        loop {
            let (mut stream, address) = match self.server.accept() {
                Ok(s) => s,
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            };
            stream.set_nonblocking(false)?;
            stream.set_read_timeout(Some(SOCKET_TIMEOUT))?;
            stream.set_write_timeout(Some(SOCKET_TIMEOUT))?;

            let id = self.next_id;
            self.next_id += 1;
            match write_message(&mut stream, &Message::with_int(MessageKey::SetListenerId, id)) {
                Ok(()) => {
                    log::info!("New listener {id} connected from {address}");
                    self.sessions.insert(id, stream);
                }
                Err(e) => log::warn!("Failed to register listener from {address}: {e}"),
            }
        }
    }

    fn handle_request(&mut self, id: i64) {
        let stream = match self.sessions.get_mut(&id) {
            Some(s) => s,
            None => return,
        };
        match read_message(stream) {
            Ok(message) if message.key == MessageKey::RemoveListener => {
                if let Err(e) =
                    write_message(stream, &Message::with_int(MessageKey::ListenerDeleted, id))
                {
                    log::warn!("Failed to confirm removal of listener {id}: {e}");
                }
                self.sessions.remove(&id);
                log::info!("Listener {id} disconnected");
            }
            Ok(message) => log::warn!("Ignoring message {message} from listener {id}"),
            Err(MessageError::ConnectionClosed) => {
                self.sessions.remove(&id);
                log::info!("Listener {id} closed its connection");
            }
            Err(e) => {
                self.sessions.remove(&id);
                log::warn!("Dropping listener {id}: {e}");
            }
        }
    }

    /// Send a message to every listener, dropping those which cannot be reached.
    ///
    /// Returns the number of listeners the message was delivered to.
    pub fn broadcast(&mut self, message: &Message) -> usize {
        let mut failed: Vec<i64> = Vec::new();
        for (id, stream) in self.sessions.iter_mut() {
            if let Err(e) = write_message(stream, message) {
                log::warn!("Failed to send {message} to listener {id}: {e}");
                failed.push(*id);
            }
        }
        for id in failed.iter() {
            self.sessions.remove(id);
        }
        self.sessions.len()
    }

    /// Tell every listener the coordinator is going away and forget them
    pub fn shutdown(&mut self) {
        if self.sessions.is_empty() {
            return;
        }
        log::info!(
            "Disconnecting {} listener(s) from the coordinator",
            self.sessions.len()
        );
        self.broadcast(&Message::new(MessageKey::MasterDisconnect));
        self.sessions.clear();
    }
}

impl Drop for Coordinator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl StatusSink for Coordinator {
    fn service(&mut self) {
        if let Err(e) = self.service_listeners(Duration::ZERO) {
            log::warn!("Coordinator failed to service listeners: {e}");
        }
    }

    fn new_burst(&mut self, run_id: u32, spill_id: u32) {
        self.broadcast(&Message {
            key: MessageKey::NewBurst,
            int_value: Some(spill_id as i64),
            string_value: Some(format!("run {run_id}")),
        });
    }

    fn trigger_rate(&mut self, rate_hz: f64) {
        self.broadcast(&Message {
            key: MessageKey::TriggerRate,
            int_value: Some(rate_hz.round() as i64),
            string_value: Some(format!("{rate_hz:.2}")),
        });
    }

    fn monitor(&mut self, status: &BurstStatus) {
        let events: Vec<String> = status
            .events_per_board
            .iter()
            .map(|e| e.to_string())
            .collect();
        self.broadcast(&Message {
            key: MessageKey::MasterBroadcast,
            int_value: Some(status.triggers_in_burst as i64),
            string_value: Some(format!(
                "run {} spill {} triggers {}/{} total {} events {}",
                status.run_id,
                status.spill_id,
                status.triggers_in_burst,
                status.triggers_per_file,
                status.triggers_in_run,
                events.join(",")
            )),
        });
    }

    fn output_file(&mut self, path: &Path) {
        self.broadcast(&Message::with_string(
            MessageKey::OutputFile,
            &path.to_string_lossy(),
        ));
    }

    fn run_statistics(&mut self, stats: &RunStatistics) {
        self.broadcast(&Message {
            key: MessageKey::RunStatistics,
            int_value: Some(stats.total_triggers as i64),
            string_value: Some(stats.to_string()),
        });
    }

    fn exception(&mut self, message: &str) {
        self.broadcast(&Message::with_string(MessageKey::Exception, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ListenerError;
    use crate::listener::Listener;
    use std::thread;

    fn service_until<F: Fn(&Coordinator) -> bool>(coordinator: &mut Coordinator, done: F) {
        for _ in 0..200 {
            if done(coordinator) {
                return;
            }
            coordinator.service_listeners(Duration::from_millis(25)).unwrap();
        }
        panic!("Coordinator did not reach the expected state");
    }

    #[test]
    fn test_listener_lifecycle() {
        let mut coordinator = Coordinator::bind("127.0.0.1:0").unwrap();
        let address = coordinator.local_address().unwrap();
        let handle = thread::spawn(move || {
            let mut listener = Listener::connect(address).unwrap();
            let id = listener.get_id();
            let message = listener.receive().unwrap();
            listener.disconnect();
            (id, message, listener.is_connected())
        });

        service_until(&mut coordinator, |c| c.number_of_listeners() == 1);
        assert_eq!(coordinator.listener_ids(), vec![1]);
        StatusSink::new_burst(&mut coordinator, 4, 2);
        service_until(&mut coordinator, |c| c.number_of_listeners() == 0);

        let (id, message, connected) = handle.join().unwrap();
        assert_eq!(id, 1);
        assert_eq!(message.key, MessageKey::NewBurst);
        assert_eq!(message.int_value, Some(2));
        assert_eq!(message.string_value.as_deref(), Some("run 4"));
        assert!(!connected);
    }

    #[test]
    fn test_shutdown_disconnects_everyone() {
        let mut coordinator = Coordinator::bind("127.0.0.1:0").unwrap();
        let address = coordinator.local_address().unwrap();
        let handles: Vec<_> = (0..2)
            .map(|_| {
                thread::spawn(move || {
                    let mut listener = Listener::connect(address).unwrap();
                    matches!(listener.receive(), Err(ListenerError::MasterDisconnected))
                })
            })
            .collect();

        service_until(&mut coordinator, |c| c.number_of_listeners() == 2);
        assert_eq!(coordinator.listener_ids(), vec![1, 2]);
        coordinator.shutdown();
        assert_eq!(coordinator.number_of_listeners(), 0);
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }

    #[test]
    fn test_closed_session_is_dropped() {
        let mut coordinator = Coordinator::bind("127.0.0.1:0").unwrap();
        let mut raw = TcpStream::connect(coordinator.local_address().unwrap()).unwrap();
        service_until(&mut coordinator, |c| c.number_of_listeners() == 1);
        let welcome = read_message(&mut raw).unwrap();
        assert_eq!(welcome, Message::with_int(MessageKey::SetListenerId, 1));
        drop(raw);
        service_until(&mut coordinator, |c| c.number_of_listeners() == 0);
        assert_eq!(
            coordinator.broadcast(&Message::new(MessageKey::MasterBroadcast)),
            0
        );
    }
}
