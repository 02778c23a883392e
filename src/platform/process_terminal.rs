//! Terminal device primitives: tty detection, raw mode, window size, job control.

use std::fs::{File, OpenOptions};
use std::io;

#[cfg(unix)]
pub use std::os::fd::RawFd;
#[cfg(not(unix))]
pub type RawFd = i32;

#[cfg(unix)]
use libc::c_int;

#[cfg(unix)]
pub const STDIN_FD: RawFd = libc::STDIN_FILENO;
#[cfg(unix)]
pub const STDOUT_FD: RawFd = libc::STDOUT_FILENO;
#[cfg(not(unix))]
pub const STDIN_FD: RawFd = 0;
#[cfg(not(unix))]
pub const STDOUT_FD: RawFd = 1;

#[cfg(unix)]
pub fn is_terminal(fd: RawFd) -> bool {
    unsafe { libc::isatty(fd) == 1 }
}

#[cfg(not(unix))]
pub fn is_terminal(_fd: RawFd) -> bool {
    false
}

#[cfg(unix)]
fn get_termios(fd: c_int) -> io::Result<libc::termios> {
    let mut termios = unsafe { std::mem::zeroed::<libc::termios>() };
    let result = unsafe { libc::tcgetattr(fd, &mut termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(termios)
}

#[cfg(unix)]
fn set_termios(fd: c_int, termios: &libc::termios) -> io::Result<()> {
    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, termios) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Line discipline captured before switching a terminal to raw mode.
#[cfg(unix)]
#[derive(Clone, Copy)]
pub struct SavedTerminalState {
    fd: RawFd,
    termios: libc::termios,
}

#[cfg(not(unix))]
#[derive(Clone, Copy)]
pub struct SavedTerminalState {
    fd: RawFd,
}

impl SavedTerminalState {
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl std::fmt::Debug for SavedTerminalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedTerminalState")
            .field("fd", &self.fd)
            .finish_non_exhaustive()
    }
}

/// Put `fd` into raw mode and return the previous state.
#[cfg(unix)]
pub fn enable_raw_mode(fd: RawFd) -> io::Result<SavedTerminalState> {
    let original = get_termios(fd)?;
    let mut raw = original;
    unsafe {
        libc::cfmakeraw(&mut raw);
    }
    set_termios(fd, &raw)?;
    Ok(SavedTerminalState {
        fd,
        termios: original,
    })
}

#[cfg(not(unix))]
pub fn enable_raw_mode(_fd: RawFd) -> io::Result<SavedTerminalState> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "raw mode is only supported on Unix platforms",
    ))
}

/// Discard unread input, then restore the saved line discipline.
#[cfg(unix)]
pub fn restore_mode(state: &SavedTerminalState) -> io::Result<()> {
    let _ = unsafe { libc::tcflush(state.fd, libc::TCIFLUSH) };
    set_termios(state.fd, &state.termios)
}

#[cfg(not(unix))]
pub fn restore_mode(_state: &SavedTerminalState) -> io::Result<()> {
    Ok(())
}

/// Columns and rows of the terminal behind `fd`.
#[cfg(unix)]
pub fn window_size(fd: RawFd) -> io::Result<(u16, u16)> {
    let mut size = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let result = unsafe { libc::ioctl(fd, libc::TIOCGWINSZ, &mut size) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    if size.ws_col == 0 || size.ws_row == 0 {
        return Err(io::Error::other("terminal reported a zero window size"));
    }
    Ok((size.ws_col, size.ws_row))
}

#[cfg(not(unix))]
pub fn window_size(_fd: RawFd) -> io::Result<(u16, u16)> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "window size is only supported on Unix platforms",
    ))
}

/// Wait up to `timeout_ms` for `fd` to become readable.
#[cfg(unix)]
pub fn poll_readable(fd: RawFd, timeout_ms: i32) -> io::Result<bool> {
    let mut fds = libc::pollfd {
        fd,
        events: libc::POLLIN,
        revents: 0,
    };
    let result = unsafe { libc::poll(&mut fds, 1, timeout_ms) };
    if result < 0 {
        let err = io::Error::last_os_error();
        if err.kind() == io::ErrorKind::Interrupted {
            return Ok(false);
        }
        return Err(err);
    }
    if result > 0 && fds.revents & (libc::POLLERR | libc::POLLNVAL) != 0 {
        return Err(io::Error::other(format!(
            "poll(POLLIN) returned revents=0x{:x}",
            fds.revents
        )));
    }
    Ok(result > 0 && fds.revents & (libc::POLLIN | libc::POLLHUP) != 0)
}

#[cfg(unix)]
pub fn read_fd(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        let result = unsafe { libc::read(fd, buf.as_mut_ptr() as *mut libc::c_void, buf.len()) };
        if result >= 0 {
            return Ok(result as usize);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

/// Open the controlling terminal for reading and writing.
pub fn open_tty() -> io::Result<File> {
    #[cfg(unix)]
    {
        OpenOptions::new().read(true).write(true).open("/dev/tty")
    }
    #[cfg(not(unix))]
    {
        OpenOptions::new().read(true).write(true).open("CONIN$")
    }
}

#[cfg(unix)]
pub fn file_fd(file: &File) -> RawFd {
    use std::os::fd::AsRawFd;
    file.as_raw_fd()
}

#[cfg(not(unix))]
pub fn file_fd(_file: &File) -> RawFd {
    -1
}

/// Stop the process group with SIGTSTP and block until SIGCONT arrives.
#[cfg(unix)]
pub fn suspend_process() -> io::Result<()> {
    use crate::platform::signals::{SignalKind, SignalStream};

    let stream = SignalStream::new(&[SignalKind::Continue])?;
    let result = unsafe { libc::kill(0, libc::SIGTSTP) };
    if result != 0 {
        return Err(io::Error::last_os_error());
    }
    stream.next();
    Ok(())
}

#[cfg(not(unix))]
pub fn suspend_process() -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "suspend is only supported on Unix platforms",
    ))
}

pub fn suspend_supported() -> bool {
    cfg!(unix)
}
