//! Ctrl-C / SIGTERM handling for the probe loop.
//!
//! A signal only sets an atomic flag; the loop checks it between
//! iterations, so the command in flight always completes and the partial
//! report is still printed.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Set from the signal handler.
static SIGNALLED: AtomicBool = AtomicBool::new(false);
/// Number of the most recent signal, 0 if none.
static LAST_SIGNAL: AtomicI32 = AtomicI32::new(0);

/// Signals that stop the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    /// SIGINT (Ctrl+C).
    Interrupt,
    /// SIGTERM.
    Terminate,
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalKind::Interrupt => write!(f, "SIGINT"),
            SignalKind::Terminate => write!(f, "SIGTERM"),
        }
    }
}

/// Stop request shared between the signal handler and the probe loop.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    manual: Arc<AtomicBool>,
}

impl StopSignal {
    /// Install SIGINT/SIGTERM handlers and return a handle to the flag.
    ///
    /// On non-Unix platforms only manual requests are supported.
    pub fn install() -> std::io::Result<Self> {
        #[cfg(unix)]
        register_unix_handlers()?;
        Ok(Self::default())
    }

    /// Whether the probe should stop.
    #[inline]
    pub fn requested(&self) -> bool {
        self.manual.load(Ordering::Relaxed) || SIGNALLED.load(Ordering::Relaxed)
    }

    /// Request a stop without a signal.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn request(&self) {
        debug!("Manual stop requested");
        self.manual.store(true, Ordering::Relaxed);
    }

    /// The signal that triggered the stop, if any.
    pub fn received(&self) -> Option<SignalKind> {
        #[cfg(unix)]
        {
            match LAST_SIGNAL.load(Ordering::Relaxed) {
                libc::SIGINT => Some(SignalKind::Interrupt),
                libc::SIGTERM => Some(SignalKind::Terminate),
                _ => None,
            }
        }
        #[cfg(not(unix))]
        {
            None
        }
    }
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn register_unix_handlers() -> std::io::Result<()> {
    use std::os::raw::c_int;

    extern "C" fn on_signal(signum: c_int) {
        // Only atomics: this runs in signal context.
        LAST_SIGNAL.store(signum, Ordering::Relaxed);
        SIGNALLED.store(true, Ordering::Relaxed);
    }

    for signum in [libc::SIGINT, libc::SIGTERM] {
        // SAFETY: `on_signal` is async-signal-safe and lives for the whole program.
        let previous = unsafe { libc::signal(signum, on_signal as libc::sighandler_t) };
        if previous == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }

    debug!("SIGINT/SIGTERM handlers registered");
    Ok(())
}
