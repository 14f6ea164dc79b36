//! The interactive shell: a byte-oriented, locally echoed line editor.
//!
//! Input is handled one byte at a time. Multi-byte characters are
//! echoed as they arrive, and backspace removes a single byte, so
//! erasing a non-ASCII character takes several keystrokes.

use log::{debug, warn};

use crate::router::{ChannelEvent, SessionChannel};
use crate::{CommandProcessor, Result};

/// Moves the cursor back, blanks the cell, moves back again.
pub const ERASE: &[u8] = &[0x08, b' ', 0x08];

/// What the terminal should see after a byte was typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Edit {
    /// Show the byte.
    Echo(u8),
    /// Remove the last byte shown.
    Erase,
    /// A line was completed.
    Submit(String),
    /// Enter was pressed on an empty line.
    EmptyLine,
    /// Nothing to show.
    None,
}

/// The command being typed.
#[derive(Debug, Default)]
pub struct LineEditor {
    buffer: Vec<u8>,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buffer
    }

    pub fn feed(&mut self, byte: u8) -> Edit {
        match byte {
            b'\r' | b'\n' => {
                if self.buffer.is_empty() {
                    Edit::EmptyLine
                } else {
                    let line = String::from_utf8_lossy(&self.buffer).into_owned();
                    self.buffer.clear();
                    Edit::Submit(line)
                }
            }
            0x7f | 0x08 => {
                if self.buffer.pop().is_some() {
                    Edit::Erase
                } else {
                    Edit::None
                }
            }
            byte => {
                self.buffer.push(byte);
                Edit::Echo(byte)
            }
        }
    }
}

/// Converts bare `\n` to `\r\n`, since no terminal driver does it on
/// this side of the channel.
pub fn to_crlf(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut previous = 0;
    for &byte in text.as_bytes() {
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        previous = byte;
    }
    out
}

/// Runs the shell until the peer stops sending.
pub async fn run<C: SessionChannel>(channel: &mut C, processor: &dyn CommandProcessor) -> Result<()> {
    let mut editor = LineEditor::new();
    channel.write(&to_crlf(&processor.prompt())).await?;

    loop {
        let data = match channel.recv().await {
            Ok(Some(ChannelEvent::Data(data))) => data,
            Ok(Some(ChannelEvent::Start(mode))) => {
                debug!("ignoring {:?} in shell", mode);
                continue;
            }
            Ok(Some(ChannelEvent::Eof)) | Ok(None) => return Ok(()),
            Err(e) => {
                warn!("error reading from channel: {}", e);
                return Ok(());
            }
        };

        let mut echo = Vec::with_capacity(data.len());
        for &byte in data.iter() {
            match editor.feed(byte) {
                Edit::Echo(byte) => echo.push(byte),
                Edit::Erase => echo.extend_from_slice(ERASE),
                Edit::Submit(command) => {
                    let result = processor.execute(&command);
                    echo.extend_from_slice(b"\r\n");
                    echo.extend(to_crlf(&result.output));
                    echo.extend_from_slice(b"\r\n");
                    echo.extend(to_crlf(&processor.prompt()));
                }
                Edit::EmptyLine => {
                    echo.extend_from_slice(b"\r\n");
                    echo.extend(to_crlf(&processor.prompt()));
                }
                Edit::None => {}
            }
        }
        if !echo.is_empty() {
            channel.write(&echo).await?;
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::router::testing::*;

    fn feed_all(editor: &mut LineEditor, input: &[u8]) -> Vec<Edit> {
        input.iter().map(|&b| editor.feed(b)).collect()
    }

    #[test]
    fn carriage_return_submits_line() {
        let mut editor = LineEditor::new();
        let edits = feed_all(&mut editor, b"echo hi\r");
        let submitted: Vec<_> = edits
            .iter()
            .filter_map(|e| match e {
                Edit::Submit(line) => Some(line.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(submitted, ["echo hi"]);
        assert!(editor.buffer().is_empty());
    }

    #[test]
    fn backspace_drops_last_byte() {
        let mut editor = LineEditor::new();
        feed_all(&mut editor, b"abc");
        assert_eq!(editor.feed(0x7f), Edit::Erase);
        assert_eq!(editor.buffer(), b"ab");
        assert_eq!(editor.feed(0x08), Edit::Erase);
        assert_eq!(editor.buffer(), b"a");
    }

    #[test]
    fn backspace_on_empty_buffer_is_noop() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed(0x7f), Edit::None);
        assert_eq!(editor.feed(0x08), Edit::None);
        assert!(editor.buffer().is_empty());
    }

    #[test]
    fn empty_line_submits_nothing() {
        let mut editor = LineEditor::new();
        assert_eq!(editor.feed(b'\n'), Edit::EmptyLine);
        assert_eq!(editor.feed(b'\r'), Edit::EmptyLine);
    }

    #[test]
    fn crlf_conversion() {
        assert_eq!(to_crlf("a\nb\r\nc"), b"a\r\nb\r\nc");
        assert_eq!(to_crlf(""), b"");
    }

    #[tokio::test]
    async fn shell_session_transcript() {
        let processor = Recorder::default();
        let mut channel = ScriptedChannel::new([
            data(b"ab"),
            exec("not a line"),
            data(&[0x7f, 0x7f, 0x7f]),
            data(b"\r\r\n"),
            data(b"fail x\nup"),
            data(b"time\r"),
        ]);
        run(&mut channel, &processor).await.unwrap();

        assert_eq!(processor.commands(), ["fail x", "uptime"]);
        let mut expected = b"> ab".to_vec();
        expected.extend_from_slice(ERASE);
        expected.extend_from_slice(ERASE);
        expected.extend_from_slice(b"\r\n> \r\n> \r\n> ");
        expected.extend_from_slice(b"fail x\r\nfailed fail x\r\n> up");
        expected.extend_from_slice(b"time\r\nok uptime\r\n> ");
        assert_eq!(channel.output(), String::from_utf8(expected).unwrap());
        assert!(!channel.closed);
    }

    #[tokio::test]
    async fn read_error_ends_shell_quietly() {
        let processor = Recorder::default();
        let mut channel = ScriptedChannel::new([data(b"partial")]);
        channel.events.push_back(Err("broken pipe".into()));
        channel.events.push_back(Ok(data(b"\r")));
        run(&mut channel, &processor).await.unwrap();

        assert!(processor.commands().is_empty());
        assert_eq!(channel.events.len(), 1);
    }
}
