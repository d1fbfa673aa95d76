//! Best-effort real-time priority for the probe thread.
//!
//! Raising the priority keeps the host side of the measurement quiet, so
//! the delays the probe reports come from the driver rather than from the
//! OS scheduler. Missing privileges are a warning, not a failure, unless
//! `fail_fast` is set.

use cmdq_common::config::{RealtimeConfig, SchedPolicy};
use cmdq_common::{CmdqError, CmdqResult};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What real-time setup actually achieved.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RealtimeStatus {
    /// Whether memory was locked.
    pub memory_locked: bool,
    /// Applied scheduler policy.
    pub scheduler_policy: Option<SchedPolicy>,
    /// Applied scheduler priority.
    pub scheduler_priority: Option<u8>,
    /// CPUs the thread is pinned to.
    pub cpus: Option<Vec<usize>>,
}

/// Apply the real-time configuration to the calling thread.
///
/// # Errors
///
/// Returns an error when `fail_fast` is set and privileges are missing, or
/// when the OS rejects a parameter for a reason other than permissions.
pub fn init_realtime(config: &RealtimeConfig) -> CmdqResult<RealtimeStatus> {
    if !config.enabled {
        info!("Real-time scheduling disabled in configuration");
        return Ok(RealtimeStatus::default());
    }

    if config.fail_fast {
        validate_rt_capabilities(config)?;
    }

    let memory_locked = if config.lock_memory {
        lock_memory()?
    } else {
        false
    };
    let (scheduler_policy, scheduler_priority) = set_scheduler(config.policy, config.priority)?;
    let cpus = set_cpu_affinity(&config.cpus)?;

    let status = RealtimeStatus {
        memory_locked,
        scheduler_policy,
        scheduler_priority,
        cpus,
    };
    info!(?status, "Real-time setup complete");
    Ok(status)
}

#[cfg(target_os = "linux")]
fn lock_memory() -> CmdqResult<bool> {
    use nix::sys::mman::{mlockall, MlockAllFlags};

    match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
        Ok(()) => {
            debug!("Memory locked");
            Ok(true)
        }
        Err(nix::errno::Errno::EPERM | nix::errno::Errno::ENOMEM) => {
            warn!("mlockall not permitted (missing CAP_IPC_LOCK?), continuing unlocked");
            Ok(false)
        }
        Err(e) => Err(CmdqError::Realtime(format!("mlockall failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn lock_memory() -> CmdqResult<bool> {
    warn!("mlockall not available on this platform");
    Ok(false)
}

#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
fn set_scheduler(policy: SchedPolicy, priority: u8) -> CmdqResult<(Option<SchedPolicy>, Option<u8>)> {
    let linux_policy = match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::Rr => libc::SCHED_RR,
        SchedPolicy::Other => {
            debug!("Keeping SCHED_OTHER");
            return Ok((Some(SchedPolicy::Other), None));
        }
    };

    let clamped = priority.clamp(1, 99);
    if clamped != priority {
        warn!(requested = priority, clamped, "Scheduler priority clamped to 1-99");
    }

    let param = libc::sched_param {
        sched_priority: i32::from(clamped),
    };
    // SAFETY: pid 0 targets the calling thread and `param` outlives the call.
    let result = unsafe { libc::sched_setscheduler(0, linux_policy, &param) };

    if result == -1 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::EPERM) {
            warn!(
                ?policy,
                priority = clamped,
                "Could not raise thread priority (missing CAP_SYS_NICE?), continuing at normal priority"
            );
            return Ok((None, None));
        }
        return Err(CmdqError::Realtime(format!("sched_setscheduler failed: {err}")));
    }

    info!(?policy, priority = clamped, "Thread priority raised");
    Ok((Some(policy), Some(clamped)))
}

#[cfg(not(target_os = "linux"))]
fn set_scheduler(policy: SchedPolicy, priority: u8) -> CmdqResult<(Option<SchedPolicy>, Option<u8>)> {
    warn!(?policy, priority, "Real-time scheduling not available on this platform");
    Ok((None, None))
}

#[cfg(target_os = "linux")]
fn set_cpu_affinity(cpus: &[usize]) -> CmdqResult<Option<Vec<usize>>> {
    use nix::sched::{sched_setaffinity, CpuSet};
    use nix::unistd::Pid;

    if cpus.is_empty() {
        return Ok(None);
    }

    let mut cpu_set = CpuSet::new();
    for &cpu in cpus {
        cpu_set
            .set(cpu)
            .map_err(|e| CmdqError::Realtime(format!("invalid CPU index {cpu}: {e}")))?;
    }

    match sched_setaffinity(Pid::from_raw(0), &cpu_set) {
        Ok(()) => {
            info!(?cpus, "CPU affinity set");
            Ok(Some(cpus.to_vec()))
        }
        Err(nix::errno::Errno::EINVAL) => {
            warn!(?cpus, "CPU set not usable on this machine, affinity unchanged");
            Ok(None)
        }
        Err(e) => Err(CmdqError::Realtime(format!("sched_setaffinity failed: {e}"))),
    }
}

#[cfg(not(target_os = "linux"))]
fn set_cpu_affinity(cpus: &[usize]) -> CmdqResult<Option<Vec<usize>>> {
    if !cpus.is_empty() {
        warn!("CPU affinity not available on this platform");
    }
    Ok(None)
}

/// Real-time related limits of the current process.
#[derive(Debug, Clone, Default)]
pub struct RtCapabilities {
    /// Whether running as root.
    pub is_root: bool,
    /// RLIMIT_RTPRIO soft limit.
    pub rtprio_limit: Option<u64>,
    /// RLIMIT_MEMLOCK soft limit.
    pub memlock_limit: Option<u64>,
}

impl RtCapabilities {
    /// Whether an RT scheduling policy is likely to be granted.
    #[must_use]
    pub fn can_use_rt_scheduling(&self) -> bool {
        self.is_root || self.rtprio_limit.is_some_and(|l| l > 0)
    }

    /// Whether mlockall is likely to succeed.
    #[must_use]
    pub fn can_lock_memory(&self) -> bool {
        #[cfg(unix)]
        {
            self.is_root || self.memlock_limit == Some(libc::RLIM_INFINITY)
        }
        #[cfg(not(unix))]
        {
            self.is_root
        }
    }
}

/// Query the process limits relevant to real-time setup.
#[cfg(target_os = "linux")]
#[allow(unsafe_code)]
#[must_use]
pub fn check_rt_capabilities() -> RtCapabilities {
    // SAFETY: geteuid has no preconditions.
    let mut caps = RtCapabilities {
        is_root: unsafe { libc::geteuid() } == 0,
        ..Default::default()
    };

    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `rlim` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_RTPRIO, &mut rlim) } == 0 {
        caps.rtprio_limit = Some(rlim.rlim_cur);
    }
    // SAFETY: as above.
    if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut rlim) } == 0 {
        caps.memlock_limit = Some(rlim.rlim_cur);
    }

    caps
}

/// Query the process limits relevant to real-time setup.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn check_rt_capabilities() -> RtCapabilities {
    RtCapabilities::default()
}

/// Check up front that the configured RT features can be granted.
///
/// # Errors
///
/// Returns [`CmdqError::Realtime`] listing every unmet requirement.
pub fn validate_rt_capabilities(config: &RealtimeConfig) -> CmdqResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let caps = check_rt_capabilities();
    let mut issues = Vec::new();

    if config.policy != SchedPolicy::Other && !caps.can_use_rt_scheduling() {
        issues.push(format!(
            "cannot use SCHED_{:?}: RLIMIT_RTPRIO={:?}, root={}",
            config.policy, caps.rtprio_limit, caps.is_root
        ));
    }
    if config.lock_memory && !caps.can_lock_memory() {
        issues.push(format!(
            "cannot lock memory: RLIMIT_MEMLOCK={:?}, root={}",
            caps.memlock_limit, caps.is_root
        ));
    }

    if issues.is_empty() {
        debug!("Real-time capabilities available");
        Ok(())
    } else {
        Err(CmdqError::Realtime(issues.join("; ")))
    }
}
