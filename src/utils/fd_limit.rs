//! File descriptor budget for the hashing stage (Unix).

/// Descriptors a hashing worker may hold at once: the open file plus its mapping.
pub const FDS_PER_WORKER: usize = 2;

/// Share of the soft limit the workers may use; the rest stays with stdio, logging, the walk.
const FD_LIMIT_FRACTION: f64 = 0.5;

/// Soft `RLIMIT_NOFILE`, or `None` when unlimited or unavailable.
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    use std::mem::MaybeUninit;
    let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) } != 0 {
        return None;
    }
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    if cur == libc::RLIM_INFINITY || cur > i64::MAX as u64 {
        return None;
    }
    Some(cur)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Largest hashing worker count that fits the descriptor budget, at least 1.
pub fn max_workers_by_fd_limit() -> Option<usize> {
    let budget = (max_open_fds()? as f64 * FD_LIMIT_FRACTION) as usize;
    Some((budget / FDS_PER_WORKER).max(1))
}
