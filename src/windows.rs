use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::os::windows::io::{AsRawHandle, FromRawHandle};

use tracing::{debug, warn};
use windows_sys::core::PCSTR;
use windows_sys::Win32::Foundation::{GENERIC_READ, GENERIC_WRITE, HANDLE, INVALID_HANDLE_VALUE};
use windows_sys::Win32::Storage::FileSystem::{
    CreateFileA, FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
};
use windows_sys::Win32::System::Console::{
    GetConsoleMode, SetConsoleMode, CONSOLE_MODE, ENABLE_ECHO_INPUT, ENABLE_LINE_INPUT,
    ENABLE_PROCESSED_INPUT,
};
use zeroize::Zeroizing;

use crate::{Error, Result};

/// Echo is off while this is alive.
struct HiddenInput {
    mode: CONSOLE_MODE,
    handle: HANDLE,
    restored: bool,
}

impl HiddenInput {
    fn new(handle: HANDLE) -> Result<HiddenInput> {
        let mut mode = 0;

        // Get the old mode, so that we can reset back to it when we are done.
        if unsafe { GetConsoleMode(handle, &mut mode as *mut CONSOLE_MODE) } == 0 {
            return Err(Error::NotATerminal(io::Error::last_os_error()));
        }

        // Drop echo but keep reading line by line, so backspace still works.
        let new_mode_flags =
            (mode & !ENABLE_ECHO_INPUT) | ENABLE_LINE_INPUT | ENABLE_PROCESSED_INPUT;
        if unsafe { SetConsoleMode(handle, new_mode_flags) } == 0 {
            return Err(io::Error::last_os_error().into());
        }
        debug!("console echo disabled");

        Ok(HiddenInput {
            mode,
            handle,
            restored: false,
        })
    }

    /// Puts the saved mode back, reporting failure to the caller.
    fn restore(mut self) -> io::Result<()> {
        self.restored = true;
        if unsafe { SetConsoleMode(self.handle, self.mode) } == 0 {
            return Err(io::Error::last_os_error());
        }
        debug!("console mode restored");
        Ok(())
    }
}

impl Drop for HiddenInput {
    fn drop(&mut self) {
        if self.restored {
            return;
        }

        // Set the mode back to normal.
        if unsafe { SetConsoleMode(self.handle, self.mode) } == 0 {
            let err = io::Error::last_os_error();
            warn!(%err, "failed to restore console mode");
        }
    }
}

/// Reads a password from the TTY.
///
/// Newlines and carriage returns are trimmed from the end of the resulting `String`.
///
/// # Errors
///
/// Returns [`Error::Io`] if the console cannot be opened or read, and
/// [`Error::NotATerminal`] if `CONIN$` is not a console.
pub fn from_tty() -> Result<Zeroizing<String>> {
    prompt_tty("")
}

/// Writes `prompt` to the console, then reads a password from it.
///
/// # Errors
///
/// Same as [`from_tty`].
pub fn prompt_tty(prompt: &str) -> Result<Zeroizing<String>> {
    let handle = unsafe {
        CreateFileA(
            b"CONIN$\x00".as_ptr() as PCSTR,
            GENERIC_READ | GENERIC_WRITE,
            FILE_SHARE_READ | FILE_SHARE_WRITE,
            std::ptr::null(),
            OPEN_EXISTING,
            0,
            INVALID_HANDLE_VALUE,
        )
    };

    if handle == INVALID_HANDLE_VALUE {
        return Err(io::Error::last_os_error().into());
    }

    let mut reader = BufReader::new(unsafe { File::from_raw_handle(handle as _) });
    // Prompt and newline go to the console itself, otherwise whatever is
    // printed next will be on the same line.
    let mut output = OpenOptions::new().write(true).open("CONOUT$")?;

    read_hidden(handle, prompt, &mut reader, &mut output)
}

/// Reads a password from standard input, which must be a console.
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
    let handle = stdin.as_raw_handle() as HANDLE;
    let mut reader = stdin.lock();
    let stdout = io::stdout();
    let mut output = stdout.lock();

    read_hidden(handle, prompt, &mut reader, &mut output)
}

/// Reads a password from an open console handle.
///
/// `output` receives the newline printed after the hidden input.
///
/// # Errors
///
/// Returns [`Error::NotATerminal`] if `input` is not a console, or
/// [`Error::Io`] if reading, writing or changing the mode fails.
/// Echo is restored before either is returned.
pub fn from_terminal<T>(input: &mut T, output: &mut impl Write) -> Result<Zeroizing<String>>
where
    T: AsRawHandle + Read,
{
    prompt_from_terminal("", input, output)
}

/// Writes `prompt` to `output` while echo is still on, then reads a
/// password from `input` like [`from_terminal`].
///
/// # Errors
///
/// Same as [`from_terminal`].
pub fn prompt_from_terminal<T>(
    prompt: &str,
    input: &mut T,
    output: &mut impl Write,
) -> Result<Zeroizing<String>>
where
    T: AsRawHandle + Read,
{
    let handle = input.as_raw_handle() as HANDLE;
    let mut reader = BufReader::new(input);

    read_hidden(handle, prompt, &mut reader, output)
}

fn read_hidden(
    handle: HANDLE,
    prompt: &str,
    reader: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Zeroizing<String>> {
    if !prompt.is_empty() {
        output.write_all(prompt.as_bytes())?;
        output.flush()?;
    }

    let hidden_input = HiddenInput::new(handle)?;
    let password = crate::from_bufread(reader);
    let restored = hidden_input.restore();

    let newline = output.write_all(b"\n").and_then(|()| output.flush());

    let password = password?;
    restored?;
    newline?;
    Ok(password)
}
