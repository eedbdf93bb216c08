//! Read passwords without displaying them on the terminal.
//! Works on Unix-like OSes and Windows.
//!
//! Echo is switched off for the duration of the read and switched back on
//! before any result, successful or not, is handed back. A single newline is
//! then written to the terminal, since the one typed by the user was hidden.
//!
//! # Usage
//!
//! Read a password:
//!
//!```rust,no_run
//! let passwd = hushline::from_tty()?;
//! # Ok::<(), hushline::Error>(())
//!```
//!
//! Show a prompt on the same terminal first:
//!
//!```rust,no_run
//! let passwd = hushline::prompt_tty("Please enter a password: ")?;
//! # Ok::<(), hushline::Error>(())
//!```
//!
//! # Capacity
//!
//! A password holds at most [`DEFAULT_CAPACITY`]` - 1` bytes. Longer lines
//! are cut at that limit. The rest of the line is left unread.
//!
//! # Concurrency
//!
//! Terminal attributes belong to the device, not to the caller. Two threads
//! reading from the same terminal at once will race on them; serialize access.

use std::io::{self, BufRead, Read};

use tracing::trace;
use zeroize::Zeroizing;

mod error;

#[cfg(target_family = "unix")]
mod unix;
#[cfg(target_family = "unix")]
use unix as sys;

#[cfg(target_family = "windows")]
mod windows;
#[cfg(target_family = "windows")]
use windows as sys;

pub use error::{Error, Result};
pub use sys::{from_stdin, from_terminal, from_tty, prompt_from_terminal, prompt_stdin, prompt_tty};

/// Size of the password buffer, counting the terminator slot.
pub const DEFAULT_CAPACITY: usize = 30;

const CTRL_U: u8 = 0x15;

/// Reads a password from an `impl BufRead`.
///
/// This only reads the first line from the reader, up to
/// [`DEFAULT_CAPACITY`]` - 1` bytes.
///
/// # Errors
///
/// Returns [`Error::Io`] if reading fails or if the line is not valid UTF-8.
pub fn from_bufread(reader: &mut impl BufRead) -> Result<Zeroizing<String>> {
    from_bufread_with_capacity(reader, DEFAULT_CAPACITY)
}

/// Reads a password of at most `capacity - 1` bytes from an `impl BufRead`.
///
/// Trailing newlines and carriage returns are trimmed. If the line is longer
/// than the limit it is truncated and the remaining bytes stay in `reader`.
/// A multi-byte character split by the limit is dropped whole.
///
/// # Errors
///
/// Returns [`Error::Io`] if reading fails or if the line is not valid UTF-8.
pub fn from_bufread_with_capacity(
    reader: &mut impl BufRead,
    capacity: usize,
) -> Result<Zeroizing<String>> {
    let limit = capacity.saturating_sub(1);
    let mut line = Zeroizing::new(Vec::with_capacity(limit));
    let read = reader
        .by_ref()
        .take(limit as u64)
        .read_until(b'\n', &mut line)?;

    let truncated = limit > 0
        && read == limit
        && line.last() != Some(&b'\n')
        && !consume_line_end(reader)?;
    if truncated {
        trace!(capacity, "password truncated to buffer capacity");
    }

    while matches!(line.last(), Some(b'\n' | b'\r')) {
        line.pop();
    }

    // Ctrl-U should remove the line in terminals.
    if let Some(last_ctrl_u_index) = line.iter().rposition(|&b| b == CTRL_U) {
        line.drain(..=last_ctrl_u_index);
    }

    into_password(std::mem::take(&mut *line), truncated)
}

/// Consumes the terminator of a line that filled the buffer exactly.
///
/// Returns `false` if more line data follows, which is left in `reader`.
fn consume_line_end(reader: &mut impl BufRead) -> io::Result<bool> {
    let (ends_line, terminator_len, split_crlf) = match reader.fill_buf()? {
        [] => (true, 0, false),
        [b'\n', ..] => (true, 1, false),
        [b'\r', b'\n', ..] => (true, 2, false),
        // CR is the last buffered byte, its LF comes with the next fill.
        [b'\r'] => (true, 1, true),
        _ => (false, 0, false),
    };
    reader.consume(terminator_len);

    if split_crlf {
        if let [b'\n', ..] = reader.fill_buf()? {
            reader.consume(1);
        }
    }

    Ok(ends_line)
}

fn into_password(bytes: Vec<u8>, truncated: bool) -> Result<Zeroizing<String>> {
    match String::from_utf8(bytes) {
        Ok(password) => Ok(Zeroizing::new(password)),
        Err(err) => {
            let utf8_error = err.utf8_error();
            let mut bytes = Zeroizing::new(err.into_bytes());

            if truncated && utf8_error.error_len().is_none() {
                bytes.truncate(utf8_error.valid_up_to());
                return into_password(std::mem::take(&mut *bytes), false);
            }

            Err(io::Error::new(io::ErrorKind::InvalidData, "password is not valid UTF-8").into())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, BufRead, Cursor};

    use super::{from_bufread, from_bufread_with_capacity, Error, DEFAULT_CAPACITY};

    fn mock_input_crlf() -> Cursor<&'static [u8]> {
        Cursor::new(&b"A mocked response.\r\nAnother mocked response.\r\n"[..])
    }

    fn mock_input_lf() -> Cursor<&'static [u8]> {
        Cursor::new(&b"A mocked response.\nAnother mocked response.\n"[..])
    }

    fn read(input: &[u8]) -> String {
        super::from_bufread(&mut Cursor::new(input)).unwrap().to_string()
    }

    #[test]
    fn can_read_from_redirected_input_many_times() {
        let mut reader_crlf = mock_input_crlf();

        let response = super::from_bufread(&mut reader_crlf).unwrap();
        assert_eq!(*response, "A mocked response.");
        let response = super::from_bufread(&mut reader_crlf).unwrap();
        assert_eq!(*response, "Another mocked response.");

        let mut reader_lf = mock_input_lf();
        let response = super::from_bufread(&mut reader_lf).unwrap();
        assert_eq!(*response, "A mocked response.");
        let response = super::from_bufread(&mut reader_lf).unwrap();
        assert_eq!(*response, "Another mocked response.");
    }

    #[test]
    fn strips_line_terminators() {
        assert_eq!(read(b"secret123\n"), "secret123");
        assert_eq!(read(b"abc\r\n"), "abc");
        assert_eq!(read(b"abc\r"), "abc");
        assert_eq!(read(b"no terminator"), "no terminator");
    }

    #[test]
    fn empty_line_and_eof_give_empty_password() {
        assert_eq!(read(b"\n"), "");
        assert_eq!(read(b"\r\n"), "");
        assert_eq!(read(b""), "");
    }

    #[test]
    fn short_lines_come_back_whole() {
        let alphabet = "abcdefghijklmnopqrstuvwxyz0123456789";
        for len in 0..=DEFAULT_CAPACITY - 1 {
            let expected = &alphabet[..len];
            for terminator in ["\n", "\r\n", "\r"] {
                let input = format!("{expected}{terminator}");
                assert_eq!(read(input.as_bytes()), expected, "{input:?}");
            }
        }
    }

    #[test]
    fn lines_filling_the_buffer_leave_the_next_line_intact() {
        for terminator in ["\n", "\r\n"] {
            for len in [28, 29] {
                let line = "a".repeat(len);
                let input = format!("{line}{terminator}next{terminator}");
                let mut reader = Cursor::new(input.as_bytes());

                assert_eq!(*from_bufread(&mut reader).unwrap(), line, "{input:?}");
                assert_eq!(*from_bufread(&mut reader).unwrap(), "next", "{input:?}");
            }
        }
    }

    #[test]
    fn empty_line_after_a_full_buffer_is_kept() {
        let line = "a".repeat(29);
        let input = format!("{line}\n\nnext\n");
        let mut reader = Cursor::new(input.as_bytes());

        assert_eq!(*from_bufread(&mut reader).unwrap(), line);
        assert_eq!(*from_bufread(&mut reader).unwrap(), "");
        assert_eq!(*from_bufread(&mut reader).unwrap(), "next");
    }

    #[test]
    fn crlf_split_across_fills_is_consumed_whole() {
        let line = "a".repeat(29);
        let input = format!("{line}\r\nnext\n");
        // The first fill ends right after the CR.
        let mut reader = io::BufReader::with_capacity(30, Cursor::new(input.as_bytes()));

        assert_eq!(*from_bufread(&mut reader).unwrap(), line);
        assert_eq!(*from_bufread(&mut reader).unwrap(), "next");
    }

    #[test]
    fn long_lines_are_truncated_to_capacity() {
        let input = "x".repeat(40) + "\n";
        let password = read(input.as_bytes());
        assert_eq!(password.len(), DEFAULT_CAPACITY - 1);
        assert_eq!(password, "x".repeat(29));
    }

    #[test]
    fn truncation_leaves_the_rest_of_the_line_unread() {
        let mut reader = Cursor::new(&b"0123456789abcdefghijklmnopqrstuvwxyz\nnext\n"[..]);
        let password = from_bufread(&mut reader).unwrap();
        assert_eq!(*password, "0123456789abcdefghijklmnopqrs");

        let mut rest = String::new();
        reader.read_line(&mut rest).unwrap();
        assert_eq!(rest, "tuvwxyz\n");
    }

    #[test]
    fn truncation_never_splits_a_character() {
        let input = "é".repeat(15) + "\n";
        let password = read(input.as_bytes());
        assert_eq!(password, "é".repeat(14));
    }

    #[test]
    fn ctrl_u_discards_what_was_typed_before_it() {
        assert_eq!(read(b"wrong\x15right\n"), "right");
        assert_eq!(read(b"a\x15b\x15c\n"), "c");
        assert_eq!(read(b"gone\x15\n"), "");
    }

    #[test]
    fn invalid_utf8_is_an_io_error() {
        let err = from_bufread(&mut Cursor::new(&b"\xff\xfe\n"[..])).unwrap_err();
        match err {
            Error::Io(err) => assert_eq!(err.kind(), io::ErrorKind::InvalidData),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn tiny_capacities_read_nothing() {
        let mut reader = Cursor::new(&b"secret\n"[..]);
        assert_eq!(*from_bufread_with_capacity(&mut reader, 0).unwrap(), "");
        assert_eq!(*from_bufread_with_capacity(&mut reader, 1).unwrap(), "");
        assert_eq!(reader.position(), 0);
        assert_eq!(*from_bufread_with_capacity(&mut reader, 4).unwrap(), "sec");
    }

    #[test]
    fn read_errors_surface_as_io() {
        struct Broken;

        impl io::Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "device gone"))
            }
        }

        let err = from_bufread(&mut io::BufReader::new(Broken)).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
