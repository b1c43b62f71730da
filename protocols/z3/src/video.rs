// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Detection of video standard by decoders.
//!
//! The decoder measures timing of incoming signal, then the measurement is classified into one
//! of standards. The measurement may take time to converge, thus it is retried several times.

pub mod adv9880;
pub mod gv7601;

use {
    super::*,
    std::{fmt, time::Duration},
    tracing::debug,
};

/// The standard of video signal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VideoStandard {
    P720_60,
    I1080_60,
    I1080_50,
    P720_50,
    P1080_25,
    P1080_30,
    P1080_24,
    P480_60,
    P576_50,
    Ntsc,
    Pal,
    P1080_50,
    P1080_60,
}

pub const VIDEO_STANDARDS: &[VideoStandard] = &[
    VideoStandard::P720_60,
    VideoStandard::I1080_60,
    VideoStandard::I1080_50,
    VideoStandard::P720_50,
    VideoStandard::P1080_25,
    VideoStandard::P1080_30,
    VideoStandard::P1080_24,
    VideoStandard::P480_60,
    VideoStandard::P576_50,
    VideoStandard::Ntsc,
    VideoStandard::Pal,
    VideoStandard::P1080_50,
    VideoStandard::P1080_60,
];

const VIDEO_STANDARD_NAMES: &[&str] = &[
    "720P-60", "1080I-30", "1080I-25", "720P-50", "1080P-25", "1080P-30", "1080P-24", "480P-60",
    "576P-50", "NTSC", "PAL", "1080P-50", "1080P-60",
];

impl VideoStandard {
    pub fn name(&self) -> &'static str {
        item_to_label(self, VIDEO_STANDARDS, VIDEO_STANDARD_NAMES)
    }

    /// The period of frame as pair of numerator and denominator in second.
    pub fn frame_period(&self) -> (u32, u32) {
        match self {
            Self::P720_60 | Self::P480_60 | Self::P1080_60 => (1, 60),
            Self::I1080_60 | Self::P1080_30 => (1, 30),
            Self::I1080_50 | Self::P1080_25 | Self::Pal => (1, 25),
            Self::P720_50 | Self::P576_50 | Self::P1080_50 => (1, 50),
            Self::P1080_24 => (1, 24),
            Self::Ntsc => (1001, 30000),
        }
    }

    /// The total number of lines in frame.
    pub fn frame_lines(&self) -> u32 {
        match self {
            Self::P720_60 | Self::P720_50 => 750,
            Self::P480_60 | Self::Ntsc => 525,
            Self::P576_50 | Self::Pal => 625,
            _ => 1125,
        }
    }

    /// Whether the standard is in standard definition.
    pub fn is_sd(&self) -> bool {
        match self {
            Self::Ntsc | Self::Pal | Self::P480_60 | Self::P576_50 => true,
            _ => false,
        }
    }

    pub fn is_interlaced(&self) -> bool {
        match self {
            Self::I1080_60 | Self::I1080_50 | Self::Ntsc | Self::Pal => true,
            _ => false,
        }
    }
}

impl fmt::Display for VideoStandard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The measurement of timing in incoming signal.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct VideoTimingMeasurement {
    /// The total number of lines per frame, or per field for some decoders.
    pub lines_per_frame: u16,
    /// The number of words per line, or the number of 27 MHz clocks per line.
    pub words_per_line: u32,
    pub interlaced: bool,
    /// The estimated frames per 1000 seconds. Zero unless available.
    pub fps_1000: u32,
}

/// The hint to select variant of format for the standard.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VariantHint {
    Unspecified,
    /// The signal has native tri-level sync.
    NativeSync,
    /// The signal has bi-level sync as VESA timing.
    BiLevelSync,
    /// 8 bit interface as BT.656.
    NarrowInterface,
    /// 16 bit interface as BT.1120.
    WideInterface,
}

impl Default for VariantHint {
    fn default() -> Self {
        Self::Unspecified
    }
}

/// The result of detection.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Detection {
    pub standard: VideoStandard,
    pub hint: VariantHint,
    pub measurement: VideoTimingMeasurement,
}

/// The number of attempts to classify the measurement.
pub const DETECTION_ATTEMPTS: usize = 4;
/// The interval between attempts.
pub const DETECTION_INTERVAL: Duration = Duration::from_millis(50);

/// The trait for decoder to detect video standard.
pub trait VideoDecoder {
    /// The wait before the first access to decoder.
    fn settle_delay(&self) -> Duration {
        Duration::ZERO
    }

    /// Whether the decoder detects any sync or not.
    fn sync_detected(&mut self) -> Result<bool, Error>;

    fn measure(&mut self) -> Result<VideoTimingMeasurement, Error>;

    fn classify(&self, measurement: &VideoTimingMeasurement) -> Option<VideoStandard>;

    fn variant_hint(
        &self,
        _standard: &VideoStandard,
        _measurement: &VideoTimingMeasurement,
    ) -> VariantHint {
        VariantHint::Unspecified
    }

    /// Configure the decoder for the detected standard.
    fn finalize(&mut self, _detection: &Detection, _sleeper: &dyn Sleeper) -> Result<(), Error> {
        Ok(())
    }

    /// Detect video standard. The NoSignal error is returned without retry when no sync is
    /// detected. The FormatUnrecognized error is returned when every attempt fails. The
    /// interrupted wait stops the detection with the Cancelled error.
    fn detect(&mut self, sleeper: &dyn Sleeper) -> Result<Detection, Error> {
        let delay = self.settle_delay();
        if !delay.is_zero() {
            sleeper.sleep(delay)?;
        }

        if !self.sync_detected()? {
            return Err(Error::new(ErrorKind::NoSignal, "No sync detected"));
        }

        let mut measurement = VideoTimingMeasurement::default();
        for i in 0..DETECTION_ATTEMPTS {
            if i > 0 {
                sleeper.sleep(DETECTION_INTERVAL)?;
            }

            measurement = self.measure()?;
            debug!(attempt = i, ?measurement, "measured");

            if let Some(standard) = self.classify(&measurement) {
                let detection = Detection {
                    standard,
                    hint: self.variant_hint(&standard, &measurement),
                    measurement,
                };
                self.finalize(&detection, sleeper)?;
                debug!(standard = standard.name(), hint = ?detection.hint, "detected");
                return Ok(detection);
            }
        }

        let msg = format!(
            "Video standard unrecognized: lines {}, words per line {}, interlaced {}, fps {}.{:03}",
            measurement.lines_per_frame,
            measurement.words_per_line,
            measurement.interlaced,
            measurement.fps_1000 / 1000,
            measurement.fps_1000 % 1000
        );
        Err(Error::new(ErrorKind::FormatUnrecognized, &msg))
    }
}
