use std::fs::OpenOptions;
use std::io::{self, BufRead, BufReader, Read, Write};
use std::mem::MaybeUninit;
use std::os::unix::io::{AsRawFd, RawFd};

use libc::{c_int, tcsetattr, termios, ECHO, ECHONL, TCSANOW};
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Echo is off while this is alive.
struct HiddenInput {
    fd: RawFd,
    term_orig: termios,
    restored: bool,
}

impl HiddenInput {
    fn new(fd: RawFd) -> Result<HiddenInput> {
        let term_orig = safe_tcgetattr(fd).map_err(Error::NotATerminal)?;
        let mut term = term_orig;

        // Hide the password, including the final NL. We print that one ourselves.
        term.c_lflag &= !(ECHO | ECHONL);

        io_result(unsafe { tcsetattr(fd, TCSANOW, &term) })?;
        debug!(fd, "terminal echo disabled");

        Ok(HiddenInput {
            fd,
            term_orig,
            restored: false,
        })
    }

    /// Puts the saved attributes back, reporting failure to the caller.
    fn restore(mut self) -> io::Result<()> {
        self.restored = true;
        io_result(unsafe { tcsetattr(self.fd, TCSANOW, &self.term_orig) })?;
        debug!(fd = self.fd, "terminal attributes restored");
        Ok(())
    }
}

impl Drop for HiddenInput {
    fn drop(&mut self) {
        if self.restored {
            return;
        }

        // Set the mode back to normal.
        if let Err(err) = io_result(unsafe { tcsetattr(self.fd, TCSANOW, &self.term_orig) }) {
            warn!(fd = self.fd, %err, "failed to restore terminal attributes");
        }
    }
}

/// Turns a C function return into an IO Result.
fn io_result(ret: c_int) -> io::Result<()> {
    match ret {
        0 => Ok(()),
        _ => Err(io::Error::last_os_error()),
    }
}

fn safe_tcgetattr(fd: c_int) -> io::Result<termios> {
    let mut term = MaybeUninit::<termios>::uninit();
    io_result(unsafe { ::libc::tcgetattr(fd, term.as_mut_ptr()) })?;
    Ok(unsafe { term.assume_init() })
}

/// Reads a password from the TTY.
///
/// Newlines and carriage returns are trimmed from the end of the resulting `String`.
///
/// # Errors
///
/// Returns [`Error::Io`] if `/dev/tty` cannot be opened or used, and
/// [`Error::NotATerminal`] if it is not a terminal.
pub fn from_tty() -> Result<Zeroizing<String>> {
    prompt_tty("")
}

/// Writes `prompt` to the TTY, then reads a password from it.
///
/// # Errors
///
/// Same as [`from_tty`].
pub fn prompt_tty(prompt: &str) -> Result<Zeroizing<String>> {
    let tty = OpenOptions::new().read(true).write(true).open("/dev/tty")?;
    let fd = tty.as_raw_fd();
    let mut reader = BufReader::new(&tty);
    let mut output = &tty;

    read_hidden(fd, prompt, &mut reader, &mut output)
}

/// Reads a password from standard input, which must be a terminal.
///
/// The newline that follows the hidden input goes to standard output.
///
/// # Errors
///
/// Returns [`Error::NotATerminal`] if stdin is redirected, or [`Error::Io`]
/// if reading or writing fails.
pub fn from_stdin() -> Result<Zeroizing<String>> {
    prompt_stdin("")
}

/// Writes `prompt` to standard output, then reads a password from standard input.
///
/// # Errors
///
/// Same as [`from_stdin`].
pub fn prompt_stdin(prompt: &str) -> Result<Zeroizing<String>> {
    let stdin = io::stdin();
    let fd = stdin.as_raw_fd();
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut output = stdout.lock();

    read_hidden(fd, prompt, &mut reader, &mut output)
}

/// Reads a password from an open terminal handle.
///
/// `output` receives the newline printed after the hidden input; it is
/// usually the same terminal. In canonical mode the terminal delivers one
/// line per read, so nothing after the password is consumed from `input`.
///
/// # Errors
///
/// Returns [`Error::NotATerminal`] if `input` has no terminal attributes,
/// or [`Error::Io`] if reading, writing or changing the attributes fails.
/// Echo is restored before either is returned.
pub fn from_terminal<T>(input: &mut T, output: &mut impl Write) -> Result<Zeroizing<String>>
where
    T: AsRawFd + Read,
{
    prompt_from_terminal("", input, output)
}

/// Writes `prompt` to `output` while echo is still on, then reads a
/// password from `input` like [`from_terminal`].
///
/// # Errors
///
/// Same as [`from_terminal`]. A failed prompt write is an [`Error::Io`]
/// and leaves the terminal untouched.
pub fn prompt_from_terminal<T>(
    prompt: &str,
    input: &mut T,
    output: &mut impl Write,
) -> Result<Zeroizing<String>>
where
    T: AsRawFd + Read,
{
    let fd = input.as_raw_fd();
    let mut reader = BufReader::new(input);

    read_hidden(fd, prompt, &mut reader, output)
}

/// Reads from `reader` while echo is disabled on `fd`.
fn read_hidden(
    fd: RawFd,
    prompt: &str,
    reader: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Zeroizing<String>> {
    if !prompt.is_empty() {
        output.write_all(prompt.as_bytes())?;
        output.flush()?;
    }

    let hidden_input = HiddenInput::new(fd)?;
    let password = crate::from_bufread(reader);
    let restored = hidden_input.restore();

    // The user's ENTER was not echoed, so move to the next line for them.
    let newline = output.write_all(b"\n").and_then(|()| output.flush());

    let password = password?;
    restored?;
    newline?;
    Ok(password)
}
