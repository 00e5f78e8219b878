use std::fmt;
use std::io::Write;

use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::util::errors::NgenResult;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Verbosity {
    Verbose,
    Normal,
    Quiet,
}

/// Terminal status output: colored one-line status verbs on stderr, in the
/// familiar right-aligned style.
pub struct Shell {
    err: StandardStream,
    verbosity: Verbosity,
}

impl Shell {
    pub fn new(verbosity: Verbosity) -> Shell {
        Shell {
            err: StandardStream::stderr(ColorChoice::Auto),
            verbosity,
        }
    }

    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    fn print(
        &mut self,
        status: &dyn fmt::Display,
        message: Option<&dyn fmt::Display>,
        color: Color,
    ) -> NgenResult<()> {
        self.err
            .set_color(ColorSpec::new().set_bold(true).set_fg(Some(color)))?;
        write!(self.err, "{:>12}", status)?;
        self.err.reset()?;
        match message {
            Some(message) => writeln!(self.err, " {}", message)?,
            None => write!(self.err, " ")?,
        }
        Ok(())
    }

    pub fn status<T, U>(&mut self, status: T, message: U) -> NgenResult<()>
    where
        T: fmt::Display,
        U: fmt::Display,
    {
        if self.verbosity == Verbosity::Quiet {
            return Ok(());
        }
        self.print(&status, Some(&message), Color::Green)
    }

    pub fn verbose_status<T, U>(&mut self, status: T, message: U) -> NgenResult<()>
    where
        T: fmt::Display,
        U: fmt::Display,
    {
        if self.verbosity != Verbosity::Verbose {
            return Ok(());
        }
        self.print(&status, Some(&message), Color::Cyan)
    }

    pub fn warn<T: fmt::Display>(&mut self, message: T) -> NgenResult<()> {
        if self.verbosity == Verbosity::Quiet {
            return Ok(());
        }
        self.print(&"warning", Some(&message), Color::Yellow)
    }

    pub fn error<T: fmt::Display>(&mut self, message: T) -> NgenResult<()> {
        self.print(&"error", Some(&message), Color::Red)
    }
}
