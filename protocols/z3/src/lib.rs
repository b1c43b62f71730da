// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

#![doc = include_str!("../README.md")]

pub mod audio;
pub mod board;
pub mod controller;
pub mod ctl;
pub mod fpga;
pub mod latch;
pub mod pll;
pub mod scan;
pub mod stc;
pub mod video;

#[cfg(test)]
mod mock;

use {
    std::{thread, time::Duration},
    tracing::debug,
};

/// The cause of error.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The peripheral is not mapped nor registered.
    NoDevice,
    /// The offset or the value is outside of valid window.
    OutOfRange,
    /// The transaction in bus exhausted retries.
    IoFailure,
    /// The video decoder detects no signal.
    NoSignal,
    /// The video decoder could not determine any standard.
    FormatUnrecognized,
    /// The given configuration text or value is malformed.
    InvalidInput,
    /// The wait is interrupted.
    Cancelled,
}

/// The error reported by any operation in the crate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{msg}")]
pub struct Error {
    kind: ErrorKind,
    msg: String,
}

impl Error {
    pub fn new(kind: ErrorKind, msg: &str) -> Self {
        Self {
            kind,
            msg: msg.to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

/// The trait for window of 16 bit registers in memory-mapped I/O.
pub trait RegisterWindow {
    /// The size of window in byte unit.
    fn size(&self) -> usize;

    /// Read the register at the byte offset.
    fn read(&self, offset: usize) -> Result<u16, Error>;

    /// Write the register at the byte offset.
    fn write(&mut self, offset: usize, value: u16) -> Result<(), Error>;
}

impl<T: RegisterWindow + ?Sized> RegisterWindow for Box<T> {
    fn size(&self) -> usize {
        (**self).size()
    }

    fn read(&self, offset: usize) -> Result<u16, Error> {
        (**self).read(offset)
    }

    fn write(&mut self, offset: usize, value: u16) -> Result<(), Error> {
        (**self).write(offset, value)
    }
}

/// Check the byte offset against the size of window. The offset should be aligned to 16 bit.
pub fn check_window_offset(offset: usize, size: usize) -> Result<(), Error> {
    if offset % 2 > 0 || offset + 2 > size {
        let msg = format!(
            "Offset 0x{:08x} exceeds the window of 0x{:08x} bytes",
            offset, size
        );
        Err(Error::new(ErrorKind::OutOfRange, &msg))
    } else {
        Ok(())
    }
}

/// The trait for free running counter of 32 bit in other hardware block.
pub trait FreeRunningCounter {
    /// Read current value of the counter. None when the hardware block is not available.
    fn read(&self) -> Option<u32>;
}

/// The trait for device with byte-addressed registers in serial bus such as I2C.
pub trait RegisterBus {
    /// Write single register.
    fn write_register(&mut self, offset: u8, value: u8) -> Result<(), Error>;

    /// Read registers successively from the offset.
    fn read_registers(&mut self, offset: u8, values: &mut [u8]) -> Result<(), Error>;
}

impl<T: RegisterBus + ?Sized> RegisterBus for Box<T> {
    fn write_register(&mut self, offset: u8, value: u8) -> Result<(), Error> {
        (**self).write_register(offset, value)
    }

    fn read_registers(&mut self, offset: u8, values: &mut [u8]) -> Result<(), Error> {
        (**self).read_registers(offset, values)
    }
}

/// The trait for full-duplex transfer of 16 bit words in serial bus such as SPI.
pub trait WordTransfer {
    /// Transmit the words and receive the same number of words.
    fn transfer(&mut self, tx: &[u16], rx: &mut [u16]) -> Result<(), Error>;
}

/// The trait for wait between hardware operations.
pub trait Sleeper {
    /// Sleep for the duration. The error of Cancelled is returned when interrupted.
    fn sleep(&self, duration: Duration) -> Result<(), Error>;
}

/// The sleeper by the current thread, never interrupted.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Error> {
        thread::sleep(duration);
        Ok(())
    }
}

/// Run the operation till it succeeds up to the number of attempts, with the backoff after each
/// failure. The error of IoFailure is returned when it exhausts the attempts. The interrupted
/// backoff stops the attempts.
pub fn retry<T, F>(
    attempts: usize,
    backoff: Duration,
    sleeper: &dyn Sleeper,
    label: &str,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Result<T, Error>,
{
    let mut count = 0;
    loop {
        match op() {
            Ok(val) => break Ok(val),
            Err(err) if err.is(ErrorKind::NoDevice) => break Err(err),
            Err(err) => {
                count += 1;
                debug!(label, count, attempts, error = %err, "retry");
                if count >= attempts {
                    let msg = format!("{} failed after {} attempts: {}", label, count, err);
                    break Err(Error::new(ErrorKind::IoFailure, &msg));
                }
                if !backoff.is_zero() {
                    if let Err(err) = sleeper.sleep(backoff) {
                        break Err(err);
                    }
                }
            }
        }
    }
}

fn item_to_label<T: Copy + Eq>(item: &T, items: &[T], labels: &[&'static str]) -> &'static str {
    items
        .iter()
        .zip(labels)
        .find(|(i, _)| item.eq(i))
        .map(|(_, &label)| label)
        .unwrap_or("unknown")
}

// Case-insensitive match against the prefix of text, thus trailing newline is allowed.
fn label_to_item<T: Copy + Eq>(text: &str, items: &[T], labels: &[&str], kind: &str) -> Result<T, Error> {
    items
        .iter()
        .zip(labels)
        .find(|(_, label)| {
            text.len() >= label.len()
                && text.as_bytes()[..label.len()].eq_ignore_ascii_case(label.as_bytes())
        })
        .map(|(&item, _)| item)
        .ok_or_else(|| {
            let msg = format!("Invalid {}: {}", kind, text.trim_end());
            Error::new(ErrorKind::InvalidInput, &msg)
        })
}
