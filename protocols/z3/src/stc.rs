// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Protocol about System Time Clock (STC).
//!
//! The FPGA runs STC as MPEG-2 system clock; 33 bit base in 90 kHz and 9 bit extension in
//! 27 MHz. The write operation to the register of extension latches the whole counter, then the
//! base is read from three registers. The base is extended to 64 bit by software with detection
//! of wrap around.
//!
//! The detection assumes that the counter wraps around at most once between two samples. The
//! base wraps around every 26.5 hours, thus the caller should sample more frequently than it.
//! When the assumption is not satisfied, the extended value silently loses the periods.

use {
    super::{fpga::*, *},
    std::{
        fmt,
        time::{SystemTime, UNIX_EPOCH},
    },
};

/// The number of bits in base of STC.
pub const STC_BASE_BITS: u32 = 33;
/// The number of bits in auxiliary 27 MHz counter.
pub const AUX_COUNTER_BITS: u32 = 32;

/// The extension of free running counter which wraps around.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WrapExtender {
    bits: u32,
    previous: Option<u64>,
    accumulated: u64,
}

impl WrapExtender {
    pub const fn new(bits: u32) -> Self {
        Self {
            bits,
            previous: None,
            accumulated: 0,
        }
    }

    /// The accumulated value of periods.
    pub fn accumulated(&self) -> u64 {
        self.accumulated
    }

    /// Extend the raw value of counter. The transition of the most significant bit from 1 to 0
    /// is regarded as one wrap around. The first value is returned as is.
    pub fn extend(&mut self, raw: u64) -> u64 {
        let mask = (1u64 << self.bits) - 1;
        let raw = raw & mask;
        let msb = self.bits - 1;

        if let Some(prev) = self.previous {
            if (prev >> msb) & 1 == 1 && (raw >> msb) & 1 == 0 {
                self.accumulated += 1 << self.bits;
            }
        }
        self.previous = Some(raw);

        raw + self.accumulated
    }
}

/// The snapshot of hardware counters.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StcSnapshot {
    /// The base of STC in 90 kHz, 33 bit.
    pub base: u64,
    /// The extension of STC in 27 MHz.
    pub ext: u16,
    /// The wall clock at the snapshot.
    pub wall_clock: SystemTime,
    /// The counter of 27 MHz in transport processing subsystem.
    pub stc0_27mhz: Option<u32>,
    /// The counter of 27 MHz in general purpose timer.
    pub gptimer_27mhz: Option<u32>,
}

/// The timestamp reconstructed from the snapshot.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StcTimestamp {
    /// The base extended to 64 bit.
    pub base: u64,
    pub ext: u16,
    pub wall_clock: SystemTime,
    /// The counter of 27 MHz, extended to 64 bit. Zero unless available.
    pub stc0_27mhz: u64,
    /// Zero unless available.
    pub gptimer_27mhz: u32,
}

impl StcTimestamp {
    /// The wall clock in nanoseconds since UNIX epoch.
    pub fn wall_clock_ns(&self) -> u128 {
        self.wall_clock
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default()
    }
}

impl fmt::Display for StcTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:>10}:{:03} {} {} {}",
            self.base,
            self.ext,
            self.wall_clock_ns(),
            self.stc0_27mhz,
            self.gptimer_27mhz
        )
    }
}

/// The protocol implementation to read STC.
#[derive(Default, Debug)]
pub struct StcProtocol;

impl StcProtocol {
    /// Take snapshot of counters. The caller should have exclusive access to the window so that
    /// the sequence of operations is not interleaved.
    pub fn read_snapshot<W: RegisterWindow + ?Sized>(
        window: &mut W,
        stc0: Option<&dyn FreeRunningCounter>,
        gptimer: Option<&dyn FreeRunningCounter>,
    ) -> Result<StcSnapshot, Error> {
        let wall_clock = SystemTime::now();

        // Any value latches the counter.
        window.write(STC_EXT_OFFSET, 0)?;

        let stc0_27mhz = stc0.and_then(|counter| counter.read());
        let gptimer_27mhz = gptimer.and_then(|counter| counter.read());

        let mut base = (window.read(STC_BASE_H_OFFSET)? & STC_BASE_H_MASK) as u64;
        base = (base << 16) | window.read(STC_BASE_M_OFFSET)? as u64;
        base = (base << 16) | window.read(STC_BASE_L_OFFSET)? as u64;

        let ext = window.read(STC_EXT_OFFSET)?;

        Ok(StcSnapshot {
            base,
            ext,
            wall_clock,
            stc0_27mhz,
            gptimer_27mhz,
        })
    }
}

/// The state to reconstruct timestamp from snapshots.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TimestampReconstructor {
    base: WrapExtender,
    stc0_27mhz: WrapExtender,
}

impl Default for TimestampReconstructor {
    fn default() -> Self {
        Self {
            base: WrapExtender::new(STC_BASE_BITS),
            stc0_27mhz: WrapExtender::new(AUX_COUNTER_BITS),
        }
    }
}

impl TimestampReconstructor {
    pub fn reconstruct(&mut self, snapshot: &StcSnapshot) -> StcTimestamp {
        let base = self.base.extend(snapshot.base);
        let stc0_27mhz = snapshot
            .stc0_27mhz
            .map(|raw| self.stc0_27mhz.extend(raw as u64))
            .unwrap_or_default();

        StcTimestamp {
            base,
            ext: snapshot.ext,
            wall_clock: snapshot.wall_clock,
            stc0_27mhz,
            gptimer_27mhz: snapshot.gptimer_27mhz.unwrap_or_default(),
        }
    }

    /// Take snapshot and reconstruct timestamp.
    pub fn sample<W: RegisterWindow + ?Sized>(
        &mut self,
        window: &mut W,
        stc0: Option<&dyn FreeRunningCounter>,
        gptimer: Option<&dyn FreeRunningCounter>,
    ) -> Result<StcTimestamp, Error> {
        StcProtocol::read_snapshot(window, stc0, gptimer).map(|snapshot| self.reconstruct(&snapshot))
    }
}
