// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Protocol about latch registers.
//!
//! The latches are write-only, thus the value is cached in software. The read operation at the
//! offset of first latch returns the state of input port instead.

use super::*;

/// The physical address of the window for latch registers.
pub const LATCH_BASE_ADDR: u64 = 0x01000000;
/// The size of window for latch registers.
pub const LATCH_WINDOW_SIZE: usize = 0x10000;

pub const LATCH1_OFFSET: usize = 0x00;
pub const LATCH2_OFFSET: usize = 0x08;

pub const LATCH1_RESETN: u16 = 1 << 0;
pub const LATCH1_ASI_IN_ASI: u16 = 1 << 1;
pub const LATCH1_ASI_OUT_ASI: u16 = 1 << 2;
pub const LATCH1_LED0_G: u16 = 1 << 8;
pub const LATCH1_LED0_R: u16 = 1 << 9;
pub const LATCH1_LED1_G: u16 = 1 << 10;
pub const LATCH1_LED1_R: u16 = 1 << 11;
pub const LATCH1_FPGA_PROG: u16 = 1 << 13;
pub const LATCH1_AIC_DIS: u16 = 1 << 14;
pub const LATCH1_DM814X: u16 = 1 << 15;

pub const LATCH2_SI_20BIT: u16 = 1 << 0;
/// The group of serial output.
pub const LATCH2_SO_MASK: u16 = 0xff80;

/// Set in input port when FPGA finishes configuration.
pub const INPUT_FPGA_DONE: u16 = 1 << 7;
/// Set in input port when SDI receiver locks.
pub const INPUT_SI_LOCKED: u16 = 1 << 3;

/// The latch register.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Latch {
    Latch1,
    Latch2,
}

impl Latch {
    pub fn offset(&self) -> usize {
        match self {
            Self::Latch1 => LATCH1_OFFSET,
            Self::Latch2 => LATCH2_OFFSET,
        }
    }
}

/// The cache of latch registers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LatchState {
    pub latch1: u16,
    pub latch2: u16,
    /// Whether the second latch is available in the board.
    pub has_latch2: bool,
}

impl Default for LatchState {
    fn default() -> Self {
        Self::new(false)
    }
}

impl LatchState {
    /// The initial state before board identification. FPGA keeps configuration.
    pub fn new(dm814x: bool) -> Self {
        Self {
            latch1: LATCH1_FPGA_PROG | if dm814x { LATCH1_DM814X } else { 0 },
            latch2: 0,
            has_latch2: false,
        }
    }

    pub fn value(&self, latch: Latch) -> u16 {
        match latch {
            Latch::Latch1 => self.latch1,
            Latch::Latch2 => self.latch2,
        }
    }
}

/// The protocol implementation for latch registers.
#[derive(Default, Debug)]
pub struct LatchProtocol;

impl LatchProtocol {
    /// Write the value to the latch and cache it. When the board has no second latch, the value
    /// for it is just cached.
    pub fn write<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &mut LatchState,
        latch: Latch,
        value: u16,
    ) -> Result<(), Error> {
        match latch {
            Latch::Latch1 => {
                state.latch1 = value;
                window.write(LATCH1_OFFSET, value)
            }
            Latch::Latch2 => {
                state.latch2 = value;
                if state.has_latch2 {
                    window.write(LATCH2_OFFSET, value)
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Update the bits in the mask, then write it.
    pub fn update<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &mut LatchState,
        latch: Latch,
        mask: u16,
        value: u16,
    ) -> Result<(), Error> {
        let val = (state.value(latch) & !mask) | (value & mask);
        Self::write(window, state, latch, val)
    }

    /// Set or clear all of bits in the mask.
    pub fn set_flag<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &mut LatchState,
        latch: Latch,
        mask: u16,
        enable: bool,
    ) -> Result<(), Error> {
        Self::update(window, state, latch, mask, if enable { mask } else { 0 })
    }

    /// Read input port.
    pub fn read_input<W: RegisterWindow + ?Sized>(window: &W) -> Result<u16, Error> {
        window.read(LATCH1_OFFSET)
    }

    /// Whether FPGA finishes configuration or not.
    pub fn read_fpga_done<W: RegisterWindow + ?Sized>(window: &W) -> Result<bool, Error> {
        Self::read_input(window).map(|val| val & INPUT_FPGA_DONE > 0)
    }

    /// Select 20 bit width of SDI input interface, or 10 bit.
    pub fn set_si_20bit<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &mut LatchState,
        enable: bool,
    ) -> Result<(), Error> {
        Self::set_flag(window, state, Latch::Latch2, LATCH2_SI_20BIT, enable)
    }

    /// Update the group of serial output.
    pub fn set_serial_output<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &mut LatchState,
        value: u16,
    ) -> Result<(), Error> {
        Self::update(window, state, Latch::Latch2, LATCH2_SO_MASK, value)
    }
}
