// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Protocol about registers in FPGA.
//!
//! The FPGA is mapped to memory by General Purpose Memory Controller (GPMC) of SoC. Its
//! registers are 16 bit width and addressed by byte offset.

use super::*;

/// The physical address of the window for FPGA registers.
pub const FPGA_BASE_ADDR: u64 = 0x02000000;
/// The size of window for FPGA registers.
pub const FPGA_WINDOW_SIZE: usize = 0x01000000;

pub const VERSION_OFFSET: usize = 0x00;
pub const SDI_OUT_OFFSET: usize = 0x02;
pub const AUDIO_HDMI_OFFSET: usize = 0x04;
pub const PLL_CTRL_OFFSET: usize = 0x06;
pub const STC_EXT_OFFSET: usize = 0x08;
pub const STC_BASE_L_OFFSET: usize = 0x0a;
pub const STC_BASE_M_OFFSET: usize = 0x0c;
pub const STC_BASE_H_OFFSET: usize = 0x0e;
pub const ASI_CTL_OFFSET: usize = 0x10;
pub const TSO_PCR_DELTA_LOW_OFFSET: usize = 0x30;
pub const TSO_PCR_DELTA_MID_OFFSET: usize = 0x32;
pub const TSO_PCR_DELTA_HIGH_OFFSET: usize = 0x34;
pub const TSO_PCR_PID_OFFSET: usize = 0x36;

/// The high register of STC base carries the most significant bit only.
pub const STC_BASE_H_MASK: u16 = 0x0001;

/// Set when the clock synthesizer locks to reference.
pub const PLL_CTRL_LOCK_MASK: u16 = 0x8000;

// Retries to read the delta till two samples are the same.
const PCR_DELTA_STABLE_RETRIES: usize = 3;

/// Registers in FPGA which are simply read and written by user.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FpgaRegister {
    /// Routing of Asynchronous Serial Interface.
    AsiCtl,
    /// Routing of Serial Digital Interface output.
    SdiOut,
    /// Packet identifier of PCR in transport stream output.
    TsoPcrPid,
}

impl FpgaRegister {
    pub fn offset(&self) -> usize {
        match self {
            Self::AsiCtl => ASI_CTL_OFFSET,
            Self::SdiOut => SDI_OUT_OFFSET,
            Self::TsoPcrPid => TSO_PCR_PID_OFFSET,
        }
    }
}

/// The protocol implementation for registers in FPGA.
#[derive(Default, Debug)]
pub struct FpgaProtocol;

impl FpgaProtocol {
    /// Read the version of FPGA bitstream.
    pub fn read_version<W: RegisterWindow + ?Sized>(window: &W) -> Result<u16, Error> {
        window.read(VERSION_OFFSET)
    }

    /// Whether the clock synthesizer locks or not.
    pub fn read_pll_lock<W: RegisterWindow + ?Sized>(window: &W) -> Result<bool, Error> {
        window
            .read(PLL_CTRL_OFFSET)
            .map(|val| val & PLL_CTRL_LOCK_MASK > 0)
    }

    /// Write the selector of reference and divider for the clock synthesizer.
    pub fn write_pll_ctrl<W: RegisterWindow + ?Sized>(
        window: &mut W,
        value: u16,
    ) -> Result<(), Error> {
        window.write(PLL_CTRL_OFFSET, value)
    }

    pub fn read_register<W: RegisterWindow + ?Sized>(
        window: &W,
        reg: FpgaRegister,
    ) -> Result<u16, Error> {
        window.read(reg.offset())
    }

    pub fn write_register<W: RegisterWindow + ?Sized>(
        window: &mut W,
        reg: FpgaRegister,
        value: u16,
    ) -> Result<(), Error> {
        window.write(reg.offset(), value)
    }

    /// Read the delta between PCR in transport stream output and STC, in 27 MHz ticks. The low
    /// and middle registers are read as one 32 bit word, then the signed high register is added
    /// with 16 bit shift. The middle register overlaps the high register in the sum.
    pub fn read_pcr_delta<W: RegisterWindow + ?Sized>(window: &W) -> Result<i64, Error> {
        let low = window.read(TSO_PCR_DELTA_LOW_OFFSET)? as i64;
        let mid = window.read(TSO_PCR_DELTA_MID_OFFSET)? as i64;
        let high = window.read(TSO_PCR_DELTA_HIGH_OFFSET)? as i16 as i64;
        Ok((high << 16) + ((mid << 16) | low))
    }

    /// Read the delta till the subsequent sample equals to the first sample. The registers are
    /// not latched, thus the sample can be torn while the counter runs.
    pub fn read_stable_pcr_delta<W: RegisterWindow + ?Sized>(window: &W) -> Result<i64, Error> {
        let first = Self::read_pcr_delta(window)?;
        for _ in 0..PCR_DELTA_STABLE_RETRIES {
            if Self::read_pcr_delta(window)? == first {
                return Ok(first);
            }
        }
        Err(Error::new(ErrorKind::InvalidInput, "PCR delta value not stable"))
    }
}
