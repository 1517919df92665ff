//! Colored terminal output for packaging runs.
//!
//! Progress and produced bundles go to stdout, warnings and errors to
//! stderr. `--quiet` silences everything but errors.

use crate::context::Warning;
use crate::error::Error;
use crate::packager::PackagedBundle;
use std::fmt::Display;
use std::io::{self, Write};
use termcolor::{Buffer, BufferWriter, Color, ColorChoice, ColorSpec, WriteColor};

/// Writes one marked line: a bold colored mark followed by the message.
fn write_line(
    buffer: &mut Buffer,
    mark: &str,
    color: Color,
    tint_message: bool,
    message: &dyn Display,
) -> io::Result<()> {
    buffer.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(buffer, "{mark}")?;
    buffer.reset()?;
    if tint_message {
        buffer.set_color(ColorSpec::new().set_fg(Some(color)))?;
    }
    writeln!(buffer, " {message}")?;
    buffer.reset()
}

fn write_bundle(buffer: &mut Buffer, bundle: &PackagedBundle) -> io::Result<()> {
    buffer.set_color(ColorSpec::new().set_fg(Some(Color::Green)).set_bold(true))?;
    write!(buffer, "✓ {:<14}", bundle.target.to_string())?;
    buffer.reset()?;
    writeln!(buffer, " {}", bundle.path.display())
}

fn write_error(buffer: &mut Buffer, error: &Error) -> io::Result<()> {
    write_line(
        buffer,
        "✗",
        Color::Red,
        true,
        &format_args!("{} error: {error}", error.category()),
    )
}

/// Terminal printer for one CLI invocation
#[derive(Debug)]
pub struct OutputManager {
    stdout: BufferWriter,
    stderr: BufferWriter,
    quiet: bool,
}

impl OutputManager {
    /// Create a printer; `quiet` keeps only errors.
    pub fn new(quiet: bool) -> Self {
        Self {
            stdout: BufferWriter::stdout(ColorChoice::Auto),
            stderr: BufferWriter::stderr(ColorChoice::Auto),
            quiet,
        }
    }

    /// A step that is about to start.
    pub fn progress(&self, message: &str) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut buffer = self.stdout.buffer();
        write_line(&mut buffer, "⋯", Color::Magenta, false, &message)?;
        self.stdout.print(&buffer)
    }

    /// A non-fatal problem recorded while packaging.
    pub fn warning(&self, warning: &Warning) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut buffer = self.stderr.buffer();
        write_line(&mut buffer, "⚠", Color::Yellow, true, warning)?;
        self.stderr.print(&buffer)
    }

    /// A finished bundle: its target and final path on one line.
    pub fn bundle(&self, bundle: &PackagedBundle) -> io::Result<()> {
        if self.quiet {
            return Ok(());
        }
        let mut buffer = self.stdout.buffer();
        write_bundle(&mut buffer, bundle)?;
        self.stdout.print(&buffer)
    }

    /// The error that ended the run, prefixed with its failure class.
    ///
    /// Always printed. There is nowhere left to report a failing stderr, so
    /// that failure is only logged.
    pub fn failure(&self, error: &Error) {
        let mut buffer = self.stderr.buffer();
        let printed = write_error(&mut buffer, error).and_then(|()| self.stderr.print(&buffer));
        if let Err(e) = printed {
            log::error!("could not report '{error}': {e}");
        }
    }
}
