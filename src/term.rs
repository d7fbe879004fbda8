use std::io::{self, IsTerminal, Read, Stdin, Stdout, Write};
use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyEvent},
    terminal,
};
use log::debug;

use crate::console::Console;

/// Exit status after an interrupt: 128 + SIGINT.
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// Console attached to the process's standard streams.
///
/// If stdin is an interactive terminal, it is placed in raw mode only while a key is polled or
/// read, so characters arrive unbuffered and `Ctrl+C` still raises `SIGINT` while the program
/// computes. Otherwise bytes are read from stdin as-is.
pub struct TerminalConsole {
    input: Input,
    stdout: Stdout,
    /// Character already taken from the input source by `key_available`.
    pending: Option<u8>,
    poll_timeout: Duration,
}

enum Input {
    Terminal,
    Piped { stdin: Stdin, eof: bool },
}

/// Raw mode is enabled for the lifetime of this value.
///
/// Must only be created if terminal is NOT in raw mode.
struct RawMode;

impl RawMode {
    fn enable() -> io::Result<Self> {
        debug_assert!(
            !terminal::is_raw_mode_enabled().is_ok_and(|is| is),
            "terminal should not be in raw mode to enable raw mode",
        );
        terminal::enable_raw_mode()?;
        Ok(RawMode)
    }
}

impl Drop for RawMode {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

impl TerminalConsole {
    pub fn new(poll_timeout: Duration) -> Self {
        let input = if io::stdin().is_terminal() {
            debug!("stdin is a terminal, reading key events");
            Input::Terminal
        } else {
            Input::Piped {
                stdin: io::stdin(),
                eof: false,
            }
        };
        Self {
            input,
            stdout: io::stdout(),
            pending: None,
            poll_timeout,
        }
    }

    /// Take a character from the input source if one arrives within `timeout`.
    ///
    /// Piped input ignores `timeout` and blocks, as it cannot be polled portably.
    fn poll(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        match &mut self.input {
            Input::Terminal => {
                let _raw_mode = RawMode::enable()?;
                if !event::poll(timeout)? {
                    return Ok(None);
                }
                Ok(key_byte(event::read()?))
            }
            Input::Piped { stdin, eof } => read_piped(stdin, eof),
        }
    }
}

fn read_piped(stdin: &mut Stdin, eof: &mut bool) -> io::Result<Option<u8>> {
    if *eof {
        return Ok(None);
    }
    let mut buf = [0; 1];
    if stdin.read(&mut buf)? == 0 {
        *eof = true;
        return Ok(None);
    }
    Ok(Some(buf[0]))
}

impl Console for TerminalConsole {
    fn key_available(&mut self) -> bool {
        if self.pending.is_none() {
            // Polling failure is the same as no key
            self.pending = self.poll(self.poll_timeout).ok().flatten();
        }
        self.pending.is_some()
    }

    fn read_char(&mut self) -> io::Result<u8> {
        if let Some(ch) = self.pending.take() {
            return Ok(ch);
        }
        match &mut self.input {
            // Events are consumed until one is a character
            Input::Terminal => {
                let _raw_mode = RawMode::enable()?;
                loop {
                    if let Some(ch) = key_byte(event::read()?) {
                        return Ok(ch);
                    }
                }
            }
            Input::Piped { stdin, eof } => read_piped(stdin, eof)?
                .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "end of input")),
        }
    }

    fn write_char(&mut self, ch: u8) -> io::Result<()> {
        self.stdout.write_all(&[ch])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()
    }
}

/// Convert a terminal event into the byte a program would read.
///
/// Key releases, non-ASCII characters and keys without a character are ignored.
///
/// `Ctrl+C` will always return the terminal to normal state and exit.
fn key_byte(event: Event) -> Option<u8> {
    use event::{KeyCode, KeyEventKind, KeyModifiers as Mod};

    let Event::Key(KeyEvent {
        code,
        modifiers,
        kind,
        ..
    }) = event
    else {
        return None;
    };
    if matches!(kind, KeyEventKind::Release) {
        return None;
    }

    let byte = match (modifiers, code) {
        (Mod::CONTROL, KeyCode::Char('c')) => interrupt(),
        (_, KeyCode::Enter) => b'\n',
        (_, KeyCode::Tab) => b'\t',
        (_, KeyCode::Backspace) => 0x08,
        (_, KeyCode::Esc) => 0x1B,
        (Mod::NONE | Mod::SHIFT, KeyCode::Char(ch)) if ch.is_ascii() => ch as u8,
        _ => return None,
    };
    Some(byte)
}

/// Restore the terminal and exit.
pub fn interrupt() -> ! {
    let _ = terminal::disable_raw_mode();
    println!();
    std::process::exit(INTERRUPT_EXIT_CODE);
}

/// Exit through [`interrupt`] on `SIGINT` or `SIGTERM`.
///
/// While a key is being polled or read, `Ctrl+C` arrives as a key instead, and is handled by
/// the console.
pub fn install_interrupt_handler() -> io::Result<()> {
    use signal_hook::{
        consts::{SIGINT, SIGTERM},
        iterator::Signals,
    };

    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            interrupt();
        }
    });
    Ok(())
}
