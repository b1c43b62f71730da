// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Protocol about audio routing in FPGA.
//!
//! The FPGA routes audio from HDMI receiver to serial interface of SoC. When the audio codec in
//! the board is disabled, the FPGA drives the serial interface. When the codec is external
//! master, the FPGA generates bit clock by dividing master clock.

use {
    super::{fpga::*, *},
    tracing::debug,
};

/// The source of audio in HDMI.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioSource {
    Disable,
    Enable,
}

impl Default for AudioSource {
    fn default() -> Self {
        Self::Enable
    }
}

const AUDIO_SOURCES: &[AudioSource] = &[AudioSource::Disable, AudioSource::Enable];
const AUDIO_SOURCE_LABELS: &[&str] = &["disable", "enable"];

impl AudioSource {
    pub fn label(&self) -> &'static str {
        item_to_label(self, AUDIO_SOURCES, AUDIO_SOURCE_LABELS)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        label_to_item(text, AUDIO_SOURCES, AUDIO_SOURCE_LABELS, "audio source")
    }
}

/// The pair of channels for audio input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AudioInput {
    Channel12,
    Channel34,
    Channel56,
    Channel78,
}

impl Default for AudioInput {
    fn default() -> Self {
        Self::Channel12
    }
}

const AUDIO_INPUTS: &[AudioInput] = &[
    AudioInput::Channel12,
    AudioInput::Channel34,
    AudioInput::Channel56,
    AudioInput::Channel78,
];
const AUDIO_INPUT_LABELS: &[&str] = &["1+2", "3+4", "5+6", "7+8"];

impl AudioInput {
    pub fn label(&self) -> &'static str {
        item_to_label(self, AUDIO_INPUTS, AUDIO_INPUT_LABELS)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        label_to_item(text, AUDIO_INPUTS, AUDIO_INPUT_LABELS, "audio input")
    }
}

/// Nominal rate of sampling clock when codec is external master.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ExtMasterRate {
    R16000,
    R24000,
    R32000,
    R48000,
}

impl Default for ExtMasterRate {
    fn default() -> Self {
        Self::R48000
    }
}

const EXT_MASTER_RATES: &[ExtMasterRate] = &[
    ExtMasterRate::R16000,
    ExtMasterRate::R24000,
    ExtMasterRate::R32000,
    ExtMasterRate::R48000,
];
const EXT_MASTER_RATE_VALUES: &[u32] = &[16000, 24000, 32000, 48000];
const EXT_MASTER_DIVIDER_MASKS: &[u16] = &[0x5000, 0x4000, 0x3000, 0x2000];

impl ExtMasterRate {
    pub fn rate(&self) -> u32 {
        EXT_MASTER_RATES
            .iter()
            .zip(EXT_MASTER_RATE_VALUES)
            .find(|(r, _)| self.eq(r))
            .map(|(_, &rate)| rate)
            .unwrap_or_default()
    }

    pub fn from_rate(rate: u32) -> Result<Self, Error> {
        EXT_MASTER_RATES
            .iter()
            .zip(EXT_MASTER_RATE_VALUES)
            .find(|(_, r)| **r == rate)
            .map(|(&item, _)| item)
            .ok_or_else(|| {
                let msg = format!("Unsupported rate for external master: {}", rate);
                Error::new(ErrorKind::InvalidInput, &msg)
            })
    }

    /// The mask of divider for bit clock.
    pub fn divider_mask(&self) -> u16 {
        EXT_MASTER_RATES
            .iter()
            .zip(EXT_MASTER_DIVIDER_MASKS)
            .find(|(r, _)| self.eq(r))
            .map(|(_, &mask)| mask)
            .unwrap_or_default()
    }
}

const AIC_DISABLED_ROUTE: u16 = 0x0103;
const AIC_DISABLED_SOURCE_ENABLE: u16 = 0x0010;
const EXT_MASTER_ROUTE: u16 = 0x0012;

/// The state of audio routing.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct AudioState {
    pub source: AudioSource,
    pub input: AudioInput,
    pub ext_master: bool,
    pub ext_master_rate: ExtMasterRate,
}

impl AudioState {
    /// The value of AUDIO_HDMI register.
    pub fn audio_hdmi_value(&self, aic_disabled: bool) -> u16 {
        if aic_disabled {
            let src = if self.source == AudioSource::Enable {
                AIC_DISABLED_SOURCE_ENABLE
            } else {
                0
            };
            AIC_DISABLED_ROUTE | src
        } else if self.ext_master {
            self.ext_master_rate.divider_mask() | EXT_MASTER_ROUTE
        } else {
            0
        }
    }
}

/// The protocol implementation for audio routing.
#[derive(Default, Debug)]
pub struct AudioProtocol;

impl AudioProtocol {
    /// Write AUDIO_HDMI register according to the state.
    pub fn update<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &AudioState,
        aic_disabled: bool,
    ) -> Result<(), Error> {
        let value = state.audio_hdmi_value(aic_disabled);
        debug!(value, aic_disabled, "audio route");
        window.write(AUDIO_HDMI_OFFSET, value)
    }
}
