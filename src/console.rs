use std::collections::VecDeque;
use std::io;

/// Character device used by keyboard polling and trap routines.
///
/// Input is never echoed by the console itself.
pub trait Console {
    /// Whether a character can be read without blocking (or within a short timeout).
    ///
    /// Failures to poll must be reported as `false`.
    fn key_available(&mut self) -> bool;

    /// Read one character, blocking until it is available.
    fn read_char(&mut self) -> io::Result<u8>;

    fn write_char(&mut self, ch: u8) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn write_str(&mut self, string: &str) -> io::Result<()> {
        for byte in string.bytes() {
            self.write_char(byte)?;
        }
        Ok(())
    }
}

impl<C> Console for &mut C
where
    C: Console + ?Sized,
{
    fn key_available(&mut self) -> bool {
        (**self).key_available()
    }
    fn read_char(&mut self) -> io::Result<u8> {
        (**self).read_char()
    }
    fn write_char(&mut self, ch: u8) -> io::Result<()> {
        (**self).write_char(ch)
    }
    fn flush(&mut self) -> io::Result<()> {
        (**self).flush()
    }
}

/// Console reading from a fixed input script and capturing all output.
#[derive(Debug, Default)]
pub struct BufferConsole {
    input: VecDeque<u8>,
    output: Vec<u8>,
    /// Number of times `flush` was called.
    flushes: usize,
}

impl BufferConsole {
    pub fn new(input: impl AsRef<[u8]>) -> Self {
        Self {
            input: input.as_ref().iter().copied().collect(),
            ..Default::default()
        }
    }

    /// Append characters to the end of the input script.
    pub fn push_input(&mut self, input: impl AsRef<[u8]>) {
        self.input.extend(input.as_ref());
    }

    pub fn output(&self) -> &[u8] {
        &self.output
    }

    pub fn output_str(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Characters not yet read.
    pub fn remaining_input(&self) -> usize {
        self.input.len()
    }
}

impl Console for BufferConsole {
    fn key_available(&mut self) -> bool {
        !self.input.is_empty()
    }

    fn read_char(&mut self) -> io::Result<u8> {
        self.input
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "console input exhausted"))
    }

    fn write_char(&mut self, ch: u8) -> io::Result<()> {
        self.output.push(ch);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        Ok(())
    }
}
