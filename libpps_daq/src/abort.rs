use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use super::constants::FORCE_EXIT_THRESHOLD;

static INTERRUPT_COUNTER: OnceLock<Arc<AtomicUsize>> = OnceLock::new();

/// Process-wide cancellation counter.
///
/// Each interrupt adds one request. The acquisition checks the count at loop boundaries:
/// the first request stops the boards, so the run ends through their acquisition-stop status.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    counter: Arc<AtomicUsize>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a cancellation request and return the number of requests so far
    pub fn request(&self) -> usize {
        self.counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn requests(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }

    pub fn is_requested(&self) -> bool {
        self.requests() > 0
    }
}

extern "C" fn interrupt_handler(_signal: libc::c_int) {
    if let Some(counter) = INTERRUPT_COUNTER.get() {
        let previous = counter.fetch_add(1, Ordering::SeqCst);
        if previous >= FORCE_EXIT_THRESHOLD {
            let message = b"\nToo many interrupts, forcing exit without cleanup\n";
            // Only async-signal-safe calls from here
            unsafe {
                libc::write(
                    libc::STDERR_FILENO,
                    message.as_ptr() as *const libc::c_void,
                    message.len(),
                );
                libc::_exit(1);
            }
        }
    }
}

/// Route SIGINT to the process-wide abort signal.
///
/// Every call returns a handle on the same counter.
pub fn install_interrupt_handler() -> Result<AbortSignal, std::io::Error> {
    let counter = INTERRUPT_COUNTER
        .get_or_init(|| Arc::new(AtomicUsize::new(0)))
        .clone();
    let previous = unsafe {
        libc::signal(
            libc::SIGINT,
            interrupt_handler as *const () as libc::sighandler_t,
        )
    };
    if previous == libc::SIG_ERR {
        return Err(std::io::Error::last_os_error());
    }
    Ok(AbortSignal { counter })
}
