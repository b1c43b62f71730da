// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Protocol implementation for Analog Devices ADV9880, the receiver of HDMI and component video.
//!
//! The number of lines per vertical sync is measured by the chip. For digital input, the frame
//! rate is estimated from video identification code in AVI InfoFrame of CEA-861, then the number
//! of 27 MHz clocks per line is calculated from them.

use {
    super::*,
    std::{ops::RangeInclusive, time::Duration},
};

/// The address in I2C bus.
pub const ADV9880_ADDR: u16 = 0x4c;

const HPLL_PRE_COAST: u8 = 0x13;
const HPLL_POST_COAST: u8 = 0x14;
const SYNC_DETECT_2: u8 = 0x16;
const LINES_PER_VSYNC_HIGH: u8 = 0x17;
const LINES_PER_VSYNC_LOW: u8 = 0x18;
const CLAMP_START: u8 = 0x19;
const CLAMP_WIDTH: u8 = 0x1a;
const HS_DELAY: u8 = 0x29;
const HDMI_STATUS_1: u8 = 0x2f;
const AVI_INFOFRAME_VIDEO_ID: u8 = 0x84;

const SYNC_DETECT_2_SYNC_LOCK: u8 = 0x02;
const HDMI_STATUS_1_DE: u8 = 0x40;
const LINES_PER_VSYNC_MSB_MASK: u16 = 0x0f00;
const VIDEO_ID_MASK: u8 = 0x7f;

const READ_ATTEMPTS: usize = 5;
const WRITE_ATTEMPTS: usize = 3;
const WRITE_BACKOFF: Duration = Duration::from_millis(10);
const SETTLE_DELAY: Duration = Duration::from_millis(100);

const LINES_1080P: RangeInclusive<u16> = 1122..=1125;
const LINES_1080I: RangeInclusive<u16> = 562..=563;
const LINES_720P: RangeInclusive<u16> = 746..=750;
const LINES_720P_NATIVE: u16 = 750;

const CLOCKS_PER_SECOND: u64 = 27_000_000;
const DEFAULT_FPS_1000: u32 = 60000;

/// The type of input.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Adv9880Input {
    /// HDMI.
    Digital,
    /// Component video.
    Analog,
}

impl Default for Adv9880Input {
    fn default() -> Self {
        Self::Digital
    }
}

const INPUTS: &[Adv9880Input] = &[Adv9880Input::Digital, Adv9880Input::Analog];
const INPUT_LABELS: &[&str] = &["digital", "analog"];

impl Adv9880Input {
    pub fn label(&self) -> &'static str {
        item_to_label(self, INPUTS, INPUT_LABELS)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        label_to_item(text, INPUTS, INPUT_LABELS, "input of ADV9880")
    }
}

/// The nominal frame rate for video identification code of CEA-861, in frames per 1000 seconds.
pub fn cea861_fps_1000(video_id: u8) -> u32 {
    match video_id {
        2 | 3 | 4 | 5 | 16 => 60000,
        19 | 20 | 31 | 39 => 50000,
        32 | 60 => 24000,
        33 | 61 => 25000,
        34 | 62 => 30000,
        _ => 0,
    }
}

/// Classify the measurement. The ranges of clocks per line are for 27 MHz.
pub fn classify(m: &VideoTimingMeasurement) -> Option<VideoStandard> {
    let lines = m.lines_per_frame;
    let clocks = m.words_per_line;
    let fps = m.fps_1000;

    if LINES_1080P.contains(&lines) {
        if (24800..=25200).contains(&fps) {
            return Some(VideoStandard::P1080_25);
        } else if (29700..=30300).contains(&fps) {
            return Some(VideoStandard::P1080_30);
        } else if (49500..=50500).contains(&fps) {
            return Some(VideoStandard::P1080_50);
        } else if (59400..=60600).contains(&fps) {
            return Some(VideoStandard::P1080_60);
        } else if (23700..=24300).contains(&fps) {
            return Some(VideoStandard::P1080_24);
        }
    }

    if LINES_1080I.contains(&lines) {
        if clocks == 0 || (0x310..=0x330).contains(&clocks) {
            Some(VideoStandard::I1080_60)
        } else if (0x3b0..=0x3d0).contains(&clocks) {
            Some(VideoStandard::I1080_50)
        } else {
            None
        }
    } else if LINES_720P.contains(&lines) {
        if clocks == 0 || (0x248..=0x268).contains(&clocks) {
            Some(VideoStandard::P720_60)
        } else if (0x2c0..=0x2e0).contains(&clocks) {
            Some(VideoStandard::P720_50)
        } else {
            None
        }
    } else {
        // VESA timing has one line less.
        match lines {
            524 | 525 => Some(VideoStandard::P480_60),
            624 | 625 => Some(VideoStandard::P576_50),
            262 | 263 => Some(VideoStandard::Ntsc),
            312 | 313 => Some(VideoStandard::Pal),
            _ => None,
        }
    }
}

/// The parameters of format depending on sync of signal.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FormatParams {
    pub avid_start_lsb: u8,
    pub avid_stop_lsb: u8,
    pub clamp_start: u8,
    pub clamp_width: u8,
    pub hpll_pre_coast: u8,
    pub hpll_post_coast: u8,
}

// The low pulse of bi-level sync is twice as long as tri-level sync.
const BI_LEVEL_AVID_OFFSET: u8 = 44;

impl FormatParams {
    /// 720P with tri-level sync.
    pub const NATIVE_720P: Self = Self {
        avid_start_lsb: 0x04,
        avid_stop_lsb: 0x08,
        clamp_start: 0x32,
        clamp_width: 0x20,
        hpll_pre_coast: 0x01,
        hpll_post_coast: 0x00,
    };

    /// 720P with bi-level sync as Enhanced Definition.
    pub const BI_LEVEL_720P: Self = Self {
        avid_start_lsb: Self::NATIVE_720P.avid_start_lsb.wrapping_sub(BI_LEVEL_AVID_OFFSET),
        avid_stop_lsb: Self::NATIVE_720P.avid_stop_lsb.wrapping_sub(BI_LEVEL_AVID_OFFSET),
        clamp_start: 0x06,
        clamp_width: 0x10,
        hpll_pre_coast: 0x03,
        hpll_post_coast: 0x0c,
    };

    pub fn for_hint(hint: &VariantHint) -> Option<Self> {
        match hint {
            VariantHint::NativeSync => Some(Self::NATIVE_720P),
            VariantHint::BiLevelSync => Some(Self::BI_LEVEL_720P),
            _ => None,
        }
    }
}

/// The decoder in I2C bus.
#[derive(Debug)]
pub struct Adv9880<B: RegisterBus> {
    bus: B,
    input: Adv9880Input,
    format: Option<FormatParams>,
}

impl<B: RegisterBus> Adv9880<B> {
    pub fn new(bus: B, input: Adv9880Input) -> Self {
        Self {
            bus,
            input,
            format: None,
        }
    }

    pub fn input(&self) -> Adv9880Input {
        self.input
    }

    pub fn set_input(&mut self, input: Adv9880Input) {
        self.input = input;
    }

    /// The parameters of format programmed at the last detection.
    pub fn format(&self) -> Option<FormatParams> {
        self.format
    }

    fn read_register(&mut self, offset: u8) -> Result<u8, Error> {
        let label = format!("ADV9880 read 0x{:02x}", offset);
        let bus = &mut self.bus;
        retry(READ_ATTEMPTS, Duration::ZERO, &ThreadSleeper, &label, || {
            let mut val = [0];
            bus.read_registers(offset, &mut val).map(|_| val[0])
        })
    }

    fn write_register(&mut self, sleeper: &dyn Sleeper, offset: u8, value: u8) -> Result<(), Error> {
        let label = format!("ADV9880 write 0x{:02x} <= 0x{:02x}", offset, value);
        let bus = &mut self.bus;
        retry(WRITE_ATTEMPTS, WRITE_BACKOFF, sleeper, &label, || {
            bus.write_register(offset, value)
        })
    }

    fn write_format(&mut self, sleeper: &dyn Sleeper, params: &FormatParams) -> Result<(), Error> {
        [
            (CLAMP_START, params.clamp_start),
            (CLAMP_WIDTH, params.clamp_width),
            (HPLL_PRE_COAST, params.hpll_pre_coast),
            (HPLL_POST_COAST, params.hpll_post_coast),
            (HS_DELAY, params.avid_start_lsb & 0xfe),
        ]
        .iter()
        .try_for_each(|&(offset, value)| self.write_register(sleeper, offset, value))
    }
}

impl<B: RegisterBus> VideoDecoder for Adv9880<B> {
    fn settle_delay(&self) -> Duration {
        SETTLE_DELAY
    }

    fn sync_detected(&mut self) -> Result<bool, Error> {
        match self.input {
            Adv9880Input::Analog => self
                .read_register(SYNC_DETECT_2)
                .map(|val| val & SYNC_DETECT_2_SYNC_LOCK > 0),
            Adv9880Input::Digital => self
                .read_register(HDMI_STATUS_1)
                .map(|val| val & HDMI_STATUS_1_DE > 0),
        }
    }

    fn measure(&mut self) -> Result<VideoTimingMeasurement, Error> {
        let high = self.read_register(LINES_PER_VSYNC_HIGH)? as u16;
        let low = self.read_register(LINES_PER_VSYNC_LOW)? as u16;
        let lines_per_frame = ((high << 8) & LINES_PER_VSYNC_MSB_MASK) | low;

        let mut m = VideoTimingMeasurement {
            lines_per_frame,
            ..Default::default()
        };

        if self.input == Adv9880Input::Digital {
            let video_id = self.read_register(AVI_INFOFRAME_VIDEO_ID)? & VIDEO_ID_MASK;
            m.fps_1000 = match cea861_fps_1000(video_id) {
                0 => DEFAULT_FPS_1000,
                fps => fps,
            };
            if lines_per_frame > 0 {
                let clocks_per_line = CLOCKS_PER_SECOND / lines_per_frame as u64;
                m.words_per_line = (clocks_per_line * 1000 / m.fps_1000 as u64) as u32;
            }
        }

        Ok(m)
    }

    fn classify(&self, measurement: &VideoTimingMeasurement) -> Option<VideoStandard> {
        classify(measurement)
    }

    fn variant_hint(
        &self,
        standard: &VideoStandard,
        measurement: &VideoTimingMeasurement,
    ) -> VariantHint {
        match standard {
            VideoStandard::P720_60 if measurement.lines_per_frame == LINES_720P_NATIVE => {
                VariantHint::NativeSync
            }
            VideoStandard::P720_60 => VariantHint::BiLevelSync,
            _ => VariantHint::Unspecified,
        }
    }

    fn finalize(&mut self, detection: &Detection, sleeper: &dyn Sleeper) -> Result<(), Error> {
        if let Some(params) = FormatParams::for_hint(&detection.hint) {
            self.write_format(sleeper, &params)?;
            self.format = Some(params);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::mock::*};

    fn measurement(lines_per_frame: u16, words_per_line: u32, fps_1000: u32) -> VideoTimingMeasurement {
        VideoTimingMeasurement {
            lines_per_frame,
            words_per_line,
            interlaced: false,
            fps_1000,
        }
    }

    #[test]
    fn classify_progressive_1080() {
        assert_eq!(classify(&measurement(1125, 0, 25000)), Some(VideoStandard::P1080_25));
        assert_eq!(classify(&measurement(1124, 0, 30300)), Some(VideoStandard::P1080_30));
        assert_eq!(classify(&measurement(1122, 0, 49500)), Some(VideoStandard::P1080_50));
        assert_eq!(classify(&measurement(1125, 0, 60000)), Some(VideoStandard::P1080_60));
        assert_eq!(classify(&measurement(1125, 0, 24000)), Some(VideoStandard::P1080_24));
        assert_eq!(classify(&measurement(1125, 0, 0)), None);
        assert_eq!(classify(&measurement(1126, 0, 60000)), None);
    }

    #[test]
    fn classify_by_clocks_per_line() {
        assert_eq!(classify(&measurement(562, 0, 0)), Some(VideoStandard::I1080_60));
        assert_eq!(classify(&measurement(563, 0x31f, 60000)), Some(VideoStandard::I1080_60));
        assert_eq!(classify(&measurement(562, 0x3c0, 50000)), Some(VideoStandard::I1080_50));
        assert_eq!(classify(&measurement(562, 0x350, 50000)), None);
        assert_eq!(classify(&measurement(750, 0x258, 60000)), Some(VideoStandard::P720_60));
        assert_eq!(classify(&measurement(746, 0, 0)), Some(VideoStandard::P720_60));
        assert_eq!(classify(&measurement(750, 0x2d0, 50000)), Some(VideoStandard::P720_50));
    }

    #[test]
    fn classify_standard_definition() {
        assert_eq!(classify(&measurement(524, 0, 0)), Some(VideoStandard::P480_60));
        assert_eq!(classify(&measurement(625, 0, 0)), Some(VideoStandard::P576_50));
        assert_eq!(classify(&measurement(263, 0, 0)), Some(VideoStandard::Ntsc));
        assert_eq!(classify(&measurement(312, 0, 0)), Some(VideoStandard::Pal));
        assert_eq!(classify(&measurement(0, 0, 0)), None);
    }

    #[test]
    fn video_id_to_fps() {
        assert_eq!(cea861_fps_1000(16), 60000);
        assert_eq!(cea861_fps_1000(39), 50000);
        assert_eq!(cea861_fps_1000(60), 24000);
        assert_eq!(cea861_fps_1000(1), 0);
    }

    fn sync_and_lines(bus: &mut MockBus, lines: u16) {
        bus.set(HDMI_STATUS_1, HDMI_STATUS_1_DE);
        bus.set(SYNC_DETECT_2, SYNC_DETECT_2_SYNC_LOCK);
        bus.set(LINES_PER_VSYNC_HIGH, (lines >> 8) as u8 | 0xf0);
        bus.set(LINES_PER_VSYNC_LOW, lines as u8);
    }

    #[test]
    fn detect_digital_1080i50() {
        let mut bus = MockBus::default();
        sync_and_lines(&mut bus, 562);
        bus.set(AVI_INFOFRAME_VIDEO_ID, 0x80 | 20);
        let mut decoder = Adv9880::new(bus, Adv9880Input::Digital);
        let sleeper = RecordingSleeper::default();

        let detection = decoder.detect(&sleeper).unwrap();
        assert_eq!(detection.standard, VideoStandard::I1080_50);
        assert_eq!(detection.measurement.lines_per_frame, 562);
        assert_eq!(detection.measurement.fps_1000, 50000);
        assert_eq!(detection.measurement.words_per_line, 960);
        assert_eq!(detection.hint, VariantHint::Unspecified);
        assert_eq!(sleeper.durations(), vec![Duration::from_millis(100)]);
    }

    #[test]
    fn detect_analog_720p_variants() {
        let mut bus = MockBus::default();
        sync_and_lines(&mut bus, 750);
        let mut decoder = Adv9880::new(bus, Adv9880Input::Analog);
        let sleeper = RecordingSleeper::default();

        let detection = decoder.detect(&sleeper).unwrap();
        assert_eq!(detection.standard, VideoStandard::P720_60);
        assert_eq!(detection.hint, VariantHint::NativeSync);
        assert_eq!(decoder.format(), Some(FormatParams::NATIVE_720P));
        assert_eq!(decoder.bus.last_write(CLAMP_START), Some(0x32));
        assert_eq!(decoder.bus.last_write(HS_DELAY), Some(0x04));

        sync_and_lines(&mut decoder.bus, 748);
        let detection = decoder.detect(&sleeper).unwrap();
        assert_eq!(detection.hint, VariantHint::BiLevelSync);
        assert_eq!(decoder.format(), Some(FormatParams::BI_LEVEL_720P));
        assert_eq!(FormatParams::BI_LEVEL_720P.avid_start_lsb, 0xd8);
        assert_eq!(FormatParams::BI_LEVEL_720P.avid_stop_lsb, 0xdc);
        assert_eq!(decoder.bus.last_write(HPLL_POST_COAST), Some(0x0c));
    }

    #[test]
    fn detect_without_sync() {
        let mut bus = MockBus::default();
        bus.set(HDMI_STATUS_1, 0x00);
        let mut decoder = Adv9880::new(bus, Adv9880Input::Digital);
        let sleeper = RecordingSleeper::default();

        let err = decoder.detect(&sleeper).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSignal);
        assert_eq!(decoder.bus.attempts, 1);
    }

    #[test]
    fn read_retries() {
        let mut bus = MockBus::default();
        sync_and_lines(&mut bus, 525);
        bus.fail(SYNC_DETECT_2, 4);
        let mut decoder = Adv9880::new(bus, Adv9880Input::Analog);
        let sleeper = RecordingSleeper::default();
        let detection = decoder.detect(&sleeper).unwrap();
        assert_eq!(detection.standard, VideoStandard::P480_60);

        decoder.bus.fail(SYNC_DETECT_2, 5);
        let err = decoder.detect(&sleeper).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
    }

    #[test]
    fn input_labels() {
        assert_eq!(Adv9880Input::parse("analog"), Ok(Adv9880Input::Analog));
        assert_eq!(Adv9880Input::Digital.label(), "digital");
    }
}
