use bit_set::BitSet;
use std::io::ErrorKind;
use std::os::fd::AsRawFd;
use std::time::Duration;

/// Tokens of the sources found readable by one call to `Poller::poll`.
#[derive(Debug, Clone, Default)]
pub struct ReadySet {
    ready: BitSet,
}

impl ReadySet {
    pub fn is_ready(&self, token: usize) -> bool {
        self.ready.contains(token)
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.ready.iter()
    }

    pub fn len(&self) -> usize {
        self.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ready.is_empty()
    }
}

/// Readiness multiplexing over `poll(2)`.
///
/// Sources are registered with a token; a source which hung up or errored is reported as
/// ready so that the following read surfaces the problem.
#[derive(Default)]
pub struct Poller {
    fds: Vec<libc::pollfd>,
    tokens: Vec<usize>,
}

impl Poller {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<S: AsRawFd>(&mut self, source: &S, token: usize) {
        self.fds.push(libc::pollfd {
            fd: source.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        self.tokens.push(token);
    }

    pub fn clear(&mut self) {
        self.fds.clear();
        self.tokens.clear();
    }

    /// Wait at most `timeout` for a registered source to become readable. A zero timeout
    /// only samples the current state.
    pub fn poll(&mut self, timeout: Duration) -> Result<ReadySet, std::io::Error> {
        let mut ready = ReadySet::default();
        if self.fds.is_empty() {
            return Ok(ready);
        }

        let timeout_ms = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
        // Safety: the pointer and length describe self.fds, which outlives the call
        let n_ready = unsafe {
            libc::poll(
                self.fds.as_mut_ptr(),
                self.fds.len() as libc::nfds_t,
                timeout_ms,
            )
        };
        if n_ready < 0 {
            let error = std::io::Error::last_os_error();
            if error.kind() == ErrorKind::Interrupted {
                return Ok(ready);
            }
            return Err(error);
        }

        for (fd, token) in self.fds.iter().zip(self.tokens.iter()) {
            if fd.revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0 {
                ready.ready.insert(*token);
            }
        }
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::net::{TcpListener, TcpStream};

    #[test]
    fn test_poll_reports_readable_sockets() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        let (accepted, _) = server.accept().unwrap();

        let mut poller = Poller::new();
        poller.register(&accepted, 7);
        assert!(poller.poll(Duration::ZERO).unwrap().is_empty());

        client.write_all(&[1, 2, 3]).unwrap();
        let ready = poller.poll(Duration::from_secs(5)).unwrap();
        assert!(ready.is_ready(7));
        assert_eq!(ready.iter().collect::<Vec<usize>>(), vec![7]);

        poller.clear();
        assert!(poller.poll(Duration::ZERO).unwrap().is_empty());
    }

    #[test]
    fn test_pending_connection_is_ready() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut poller = Poller::new();
        poller.register(&server, 0);
        assert_eq!(poller.poll(Duration::ZERO).unwrap().len(), 0);
        let _client = TcpStream::connect(server.local_addr().unwrap()).unwrap();
        assert!(poller.poll(Duration::from_secs(5)).unwrap().is_ready(0));
    }
}
