//! Process liveness checks shared by lock-staleness and daemon-singleton code.

/// Check if a process with the given PID is alive.
///
/// Uses `libc::kill` with signal 0, which checks existence and permission to
/// signal without actually delivering a signal.
pub fn is_process_alive(pid: u32) -> bool {
    match i32::try_from(pid) {
        // SAFETY: kill(pid, 0) only checks process existence, it does not
        // deliver a signal.
        Ok(pid_i32) => unsafe { libc::kill(pid_i32, 0) == 0 },
        Err(_) => false,
    }
}
