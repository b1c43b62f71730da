// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Protocol about identification of board.
//!
//! The identifier of board is wired to one GPIO line through four LEDs driven by the first
//! latch. Each bit is sampled by lighting one LED. The sampling is done several times and the
//! value is decided by majority vote.

use {
    super::{latch::*, *},
    std::time::Duration,
    tracing::debug,
};

/// The identifier of board.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BoardId {
    /// Not identified yet.
    None,
    /// The module without application board.
    ModuleOnly,
    App02,
    /// The board with FPGA, clock synthesizer and SDI.
    App31,
    App21,
    Other(u16),
}

impl Default for BoardId {
    fn default() -> Self {
        Self::None
    }
}

impl From<u16> for BoardId {
    fn from(val: u16) -> Self {
        match val {
            0xffff => Self::None,
            0 => Self::ModuleOnly,
            1 => Self::App02,
            2 => Self::App31,
            8 => Self::App21,
            _ => Self::Other(val),
        }
    }
}

impl From<BoardId> for u16 {
    fn from(id: BoardId) -> Self {
        match id {
            BoardId::None => 0xffff,
            BoardId::ModuleOnly => 0,
            BoardId::App02 => 1,
            BoardId::App31 => 2,
            BoardId::App21 => 8,
            BoardId::Other(val) => val,
        }
    }
}

impl BoardId {
    /// Whether the board has FPGA window, the second latch, the clock synthesizer and SDI.
    pub fn has_sdi(&self) -> bool {
        *self == Self::App31
    }

    /// Whether the audio codec in the board can be disabled.
    pub fn can_disable_aic(&self) -> bool {
        *self == Self::App31 || *self == Self::App02
    }
}

/// The trait for GPIO line to which the identifier is wired.
pub trait BoardIdInput {
    fn read_level(&mut self) -> Result<bool, Error>;
}

const MAX_ROUNDS: usize = 8;
const ENOUGH_VOTES: usize = 3;
const ID_MASK: u8 = 0x0f;

// From the most significant bit.
const ID_BIT_LEDS: [u16; 4] = [LATCH1_LED1_R, LATCH1_LED1_G, LATCH1_LED0_R, LATCH1_LED0_G];
const LED_DURATION: Duration = Duration::from_millis(50);

/// Decide the identifier by majority vote of samples. Sampling stops when any value gets enough
/// votes. When counts are even, the value of last sample is preferred, then the lower value.
pub fn vote_board_id<F>(mut sample: F) -> Result<u8, Error>
where
    F: FnMut() -> Result<u8, Error>,
{
    let mut counts = [0usize; 16];
    let mut last = 0;

    for _ in 0..MAX_ROUNDS {
        last = sample()? & ID_MASK;
        counts[last as usize] += 1;
        if counts[last as usize] >= ENOUGH_VOTES {
            break;
        }
    }

    let id = (0..counts.len()).fold(last as usize, |id, i| {
        if counts[i] > counts[id] {
            i
        } else {
            id
        }
    });

    Ok(id as u8)
}

/// The protocol implementation for identification of board.
#[derive(Default, Debug)]
pub struct BoardIdProtocol;

impl BoardIdProtocol {
    /// Sample four bits of identifier once.
    pub fn sample_once<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &mut LatchState,
        input: &mut dyn BoardIdInput,
        sleeper: &dyn Sleeper,
    ) -> Result<u8, Error> {
        ID_BIT_LEDS.iter().try_fold(0u8, |val, &led| {
            LatchProtocol::set_flag(window, state, Latch::Latch1, led, true)?;
            let _ = sleeper.sleep(LED_DURATION);
            let level = input.read_level()?;
            LatchProtocol::set_flag(window, state, Latch::Latch1, led, false)?;
            Ok((val << 1) | level as u8)
        })
    }

    /// Detect the identifier of board.
    pub fn detect<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &mut LatchState,
        input: &mut dyn BoardIdInput,
        sleeper: &dyn Sleeper,
    ) -> Result<BoardId, Error> {
        let val = vote_board_id(|| Self::sample_once(window, state, input, sleeper))?;
        let id = BoardId::from(val as u16);
        debug!(?id, "board identified");
        Ok(id)
    }
}
