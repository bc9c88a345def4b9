#![deny(unsafe_code)]

//! Process scheduling priority helpers.
//!
//! Scanning runs in the background next to whatever the host is serving,
//! so the agent lowers its CPU priority and can move its I/O to the idle
//! class.

use tracing::{info, warn};

const IOPRIO_WHO_PROCESS: i32 = 1;
const IOPRIO_CLASS_IDLE: i32 = 3;
const IOPRIO_CLASS_SHIFT: i32 = 13;

/// Apply the `[system]` priority settings to the calling process.
///
/// Both calls are best-effort: failures are logged as warnings but do not
/// prevent the agent from running.
pub fn lower_process_priority(system: &config::System) {
    if system.nice > 0 {
        set_nice(system.nice);
    }
    if system.idle_io {
        set_ionice_idle();
    }
}

/// Increase the nice value of the calling process.
///
/// `nice()` can legitimately return -1 as a new nice value, so errors are
/// detected via errno rather than the return value.
fn set_nice(inc: i32) {
    #[allow(unsafe_code)]
    unsafe {
        *libc::__errno_location() = 0;
    }

    #[allow(unsafe_code)]
    let ret = unsafe { libc::nice(inc) };

    #[allow(unsafe_code)]
    let errno = unsafe { *libc::__errno_location() };

    if errno != 0 {
        let err = std::io::Error::from_raw_os_error(errno);
        warn!(%err, inc, "failed to set nice value");
    } else {
        info!(nice = ret, "process nice value set");
    }
}

/// `ioprio` value for the idle class. The idle class has no levels.
const fn idle_ioprio() -> i32 {
    IOPRIO_CLASS_IDLE << IOPRIO_CLASS_SHIFT
}

fn set_ionice_idle() {
    #[allow(unsafe_code)]
    let ret = unsafe { libc::syscall(libc::SYS_ioprio_set, IOPRIO_WHO_PROCESS, 0, idle_ioprio()) };

    if ret < 0 {
        let err = std::io::Error::last_os_error();
        warn!(%err, "failed to set I/O priority to IDLE class");
    } else {
        info!("I/O scheduling class set to IDLE");
    }
}
