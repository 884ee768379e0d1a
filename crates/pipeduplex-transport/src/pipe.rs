use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use crate::error::{Result, TransportError};
use crate::handle::{PipeDirection, PipeHandle, MIN_HANDLE_FD};
use crate::traits::{Close, Drain};

const DRAIN_BACKOFF_START: Duration = Duration::from_micros(100);
const DRAIN_BACKOFF_MAX: Duration = Duration::from_millis(10);

/// One end of an anonymous pipe. Implements `Read` or `Write` depending on
/// its direction.
///
/// Reading from a write-only end (or writing to a read-only one) fails with
/// `ErrorKind::Unsupported`. The descriptor is released on [`Close::close`]
/// or on drop, whichever comes first.
pub struct PipeEnd {
    file: Option<File>,
    direction: PipeDirection,
    read_timeout: Option<Duration>,
}

/// Create an in-process pipe, returning `(reader, writer)`.
pub fn anonymous_pipe() -> Result<(PipeEnd, PipeEnd)> {
    let (read, write) = raw_pipe().map_err(TransportError::Create)?;
    Ok((
        PipeEnd::from_owned(read, PipeDirection::In),
        PipeEnd::from_owned(write, PipeDirection::Out),
    ))
}

impl PipeEnd {
    pub(crate) fn from_owned(fd: OwnedFd, direction: PipeDirection) -> Self {
        Self {
            file: Some(File::from(fd)),
            direction,
            read_timeout: None,
        }
    }

    /// Take ownership of an inherited pipe descriptor.
    ///
    /// The descriptor must be open and its access mode must match
    /// `direction`. It is marked close-on-exec so it does not leak further
    /// down the process tree.
    pub fn attach(handle: PipeHandle, direction: PipeDirection) -> Result<Self> {
        let fd = handle.as_raw();
        let attach_err = |source: io::Error| TransportError::Attach { fd, source };

        let actual = access_direction(fd).map_err(attach_err)?;
        if actual != direction {
            return Err(TransportError::WrongDirection {
                expected: direction,
                actual,
            });
        }
        set_cloexec(fd, true).map_err(attach_err)?;

        // SAFETY: `fd` is open (checked above) and was inherited from the
        // parent for this purpose; `PipeHandle` is consumed here, so no
        // other owner is created for it within this process.
        let owned = unsafe { OwnedFd::from_raw_fd(fd) };
        debug!(fd, %direction, "attached pipe end");
        Ok(Self::from_owned(owned, direction))
    }

    /// Which way bytes flow through this end.
    pub fn direction(&self) -> PipeDirection {
        self.direction
    }

    /// The underlying descriptor, or `None` once closed.
    pub fn raw_fd(&self) -> Option<RawFd> {
        self.file.as_ref().map(AsRawFd::as_raw_fd)
    }

    /// Bound each blocking read. `None` blocks indefinitely.
    ///
    /// A read that sees no data in time fails with `ErrorKind::TimedOut`.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Current read timeout.
    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Number of bytes written into the pipe and not yet read.
    pub fn pending_bytes(&self) -> Result<usize> {
        let fd = self.raw_fd().ok_or(TransportError::Closed)?;
        Ok(pending_bytes(fd)?)
    }

    fn file_for(&mut self, wanted: PipeDirection) -> io::Result<&mut File> {
        if self.direction != wanted {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("pipe end is {}", self.direction),
            ));
        }
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "pipe end closed"))
    }
}

impl Read for PipeEnd {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let timeout = self.read_timeout;
        let file = self.file_for(PipeDirection::In)?;
        if let Some(timeout) = timeout {
            let revents = poll_fd(file.as_raw_fd(), libc::POLLIN, Some(timeout))?;
            if revents == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("no pipe data within {timeout:?}"),
                ));
            }
        }
        file.read(buf)
    }
}

impl Write for PipeEnd {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file_for(PipeDirection::Out)?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_for(PipeDirection::Out)?.flush()
    }
}

impl Drain for PipeEnd {
    fn wait_for_drain(&mut self, timeout: Option<Duration>) -> Result<()> {
        if self.direction != PipeDirection::Out {
            return Err(TransportError::WrongDirection {
                expected: PipeDirection::Out,
                actual: self.direction,
            });
        }
        let fd = self.raw_fd().ok_or(TransportError::Closed)?;

        let started = Instant::now();
        let mut backoff = DRAIN_BACKOFF_START;
        loop {
            // POLLERR on a write end means every reader is gone.
            let revents = poll_fd(fd, libc::POLLOUT, Some(Duration::ZERO))?;
            if revents & libc::POLLERR != 0 {
                return Err(TransportError::BrokenPipe);
            }

            let pending = pending_bytes(fd)?;
            if pending == 0 {
                trace!(fd, elapsed = ?started.elapsed(), "pipe drained");
                return Ok(());
            }

            if let Some(timeout) = timeout {
                if started.elapsed() >= timeout {
                    return Err(TransportError::DrainTimeout { pending, timeout });
                }
            }

            std::thread::sleep(backoff);
            backoff = (backoff * 2).min(DRAIN_BACKOFF_MAX);
        }
    }
}

impl Close for PipeEnd {
    fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            debug!(fd = file.as_raw_fd(), direction = %self.direction, "closing pipe end");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.file.is_none()
    }
}

impl std::fmt::Debug for PipeEnd {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeEnd")
            .field("fd", &self.raw_fd())
            .field("direction", &self.direction)
            .field("read_timeout", &self.read_timeout)
            .finish()
    }
}

/// Create a pipe whose descriptors are close-on-exec and above the
/// standard stream range.
pub(crate) fn raw_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: `fds` is a valid writable array of two descriptors.
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    // SAFETY: both descriptors were just returned by pipe2(2) and are owned
    // by nobody else.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };

    Ok((above_stdio(read)?, above_stdio(write)?))
}

/// Move a descriptor out of the 0-2 range if it landed there.
fn above_stdio(fd: OwnedFd) -> io::Result<OwnedFd> {
    if fd.as_raw_fd() >= MIN_HANDLE_FD {
        return Ok(fd);
    }
    // SAFETY: F_DUPFD_CLOEXEC on an open descriptor returns a new
    // descriptor or -1; it does not touch memory.
    let dup = unsafe { libc::fcntl(fd.as_raw_fd(), libc::F_DUPFD_CLOEXEC, MIN_HANDLE_FD) };
    if dup < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: `dup` is a fresh descriptor returned by fcntl above.
    Ok(unsafe { OwnedFd::from_raw_fd(dup) })
}

/// Set or clear `FD_CLOEXEC`.
///
/// Only calls fcntl(2), so it is safe to use between fork and exec.
pub(crate) fn set_cloexec(fd: RawFd, enabled: bool) -> io::Result<()> {
    // SAFETY: F_GETFD/F_SETFD only read and write descriptor flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFD) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    let wanted = if enabled {
        flags | libc::FD_CLOEXEC
    } else {
        flags & !libc::FD_CLOEXEC
    };
    if wanted == flags {
        return Ok(());
    }
    // SAFETY: see above.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFD, wanted) };
    if rc < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

fn access_direction(fd: RawFd) -> io::Result<PipeDirection> {
    let mut stat = std::mem::MaybeUninit::<libc::stat>::uninit();
    // SAFETY: fstat writes one `stat` through the provided pointer.
    let rc = unsafe { libc::fstat(fd, stat.as_mut_ptr()) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: fstat succeeded, so `stat` is initialized.
    let mode = unsafe { stat.assume_init() }.st_mode;
    if mode & libc::S_IFMT != libc::S_IFIFO {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "descriptor is not a pipe",
        ));
    }

    // SAFETY: F_GETFL only reads the descriptor status flags.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    match flags & libc::O_ACCMODE {
        libc::O_RDONLY => Ok(PipeDirection::In),
        libc::O_WRONLY => Ok(PipeDirection::Out),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "pipe descriptor is open for both reading and writing",
        )),
    }
}

fn pending_bytes(fd: RawFd) -> io::Result<usize> {
    let mut pending: libc::c_int = 0;
    // SAFETY: FIONREAD writes a single c_int through the provided pointer.
    let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut pending as *mut libc::c_int) };
    if rc < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(pending.max(0) as usize)
}

/// Wait for `events` on `fd`. Returns the reported events, 0 on timeout.
fn poll_fd(fd: RawFd, events: libc::c_short, timeout: Option<Duration>) -> io::Result<libc::c_short> {
    let timeout_ms = match timeout {
        None => -1,
        Some(timeout) if timeout.is_zero() => 0,
        Some(timeout) => timeout.as_millis().clamp(1, libc::c_int::MAX as u128) as libc::c_int,
    };

    let mut pfd = libc::pollfd {
        fd,
        events,
        revents: 0,
    };
    loop {
        // SAFETY: `pfd` is a valid pollfd and the count is 1.
        let rc = unsafe { libc::poll(&mut pfd, 1, timeout_ms) };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(err);
        }
        return Ok(if rc == 0 { 0 } else { pfd.revents });
    }
}
