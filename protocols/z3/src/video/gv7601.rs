// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Protocol implementation for Gennum GV7601, the receiver of SDI.
//!
//! The registers are 16 bit width and accessed by SPI with command word. The chip measures the
//! number of words per line and the number of lines per frame, and detects interlaced scan.

use {
    super::*,
    tracing::{debug, warn},
};

const COMMAND_READ: u16 = 0x9000;
const COMMAND_WRITE: u16 = 0x1000;
const OFFSET_MASK: u16 = 0x0fff;

const WORDS_PER_ACTLINE: u16 = 0x001f;
const WORDS_PER_LINE: u16 = 0x0020;
const LINES_PER_FRAME: u16 = 0x0021;
const STD_LOCK: u16 = 0x0022;
const HVLOCK: u16 = 0x0023;
const ANC_CONFIG: u16 = 0x0037;
const HD_AUDIO_CONFIG: u16 = 0x0200;
const HD_AUDIO_STATUS: u16 = 0x0206;
const SD_AUDIO_CONFIG: u16 = 0x0400;
const SD_AUDIO_STATUS: u16 = 0x0402;

const WORDS_PER_LINE_MASK: u16 = 0x3fff;
const LINES_PER_FRAME_MASK: u16 = 0x07ff;
const STD_LOCK_ACT_LINES_MASK: u16 = 0x07ff;
const STD_LOCK_INT_PROG: u16 = 0x1000;
const HVLOCK_VLOCK: u16 = 0x0001;
const HVLOCK_HLOCK: u16 = 0x0002;

// 16 bit right-justified.
const SD_AUDIO_CONFIG_VALUE: u16 = 0xaaaa;
const HD_AUDIO_CONFIG_VALUE: u16 = 0x0aa4;

const ANC_CONFIG_SD: u16 = 2;
const ANC_CONFIG_HD: u16 = 0;

/// Classify the measurement by the number of words per line.
pub fn classify(m: &VideoTimingMeasurement) -> Option<VideoStandard> {
    let lines = m.lines_per_frame;
    let words = m.words_per_line;

    match (m.interlaced, lines) {
        (_, 0) => None,
        (true, 525) => Some(VideoStandard::Ntsc),
        (true, 625) => Some(VideoStandard::Pal),
        (false, 525) => Some(VideoStandard::P480_60),
        (false, 625) => Some(VideoStandard::P576_50),
        (false, 749..=750) => {
            if words > 1650 {
                Some(VideoStandard::P720_50)
            } else {
                Some(VideoStandard::P720_60)
            }
        }
        (false, 1124..=1125) => {
            if words >= 2200 + 550 {
                Some(VideoStandard::P1080_24)
            } else if words >= 2200 + 440 {
                Some(VideoStandard::P1080_25)
            } else {
                Some(VideoStandard::P1080_60)
            }
        }
        (true, 1124..=1125) => {
            if words >= 2200 + 440 {
                Some(VideoStandard::I1080_50)
            } else {
                Some(VideoStandard::I1080_60)
            }
        }
        _ => None,
    }
}

/// The receiver in SPI bus.
#[derive(Debug)]
pub struct Gv7601<T: WordTransfer> {
    spi: T,
}

impl<T: WordTransfer> Gv7601<T> {
    pub fn new(spi: T) -> Self {
        Self { spi }
    }

    pub fn read_register(&mut self, offset: u16) -> Result<u16, Error> {
        let tx = [COMMAND_READ | (offset & OFFSET_MASK), 0];
        let mut rx = [0; 2];
        self.spi.transfer(&tx, &mut rx).map(|_| rx[1])
    }

    pub fn write_register(&mut self, offset: u16, value: u16) -> Result<(), Error> {
        let tx = [COMMAND_WRITE | (offset & OFFSET_MASK), value];
        let mut rx = [0; 2];
        self.spi.transfer(&tx, &mut rx)
    }

    // The mismatch is just reported.
    fn write_and_check(&mut self, offset: u16, value: u16) -> Result<(), Error> {
        self.write_register(offset, value)?;
        let readback = self.read_register(offset)?;
        if readback != value {
            warn!(offset, value, readback, "readback mismatch");
        }
        Ok(())
    }
}

impl<T: WordTransfer> VideoDecoder for Gv7601<T> {
    fn sync_detected(&mut self) -> Result<bool, Error> {
        self.read_register(HVLOCK)
            .map(|val| val & (HVLOCK_VLOCK | HVLOCK_HLOCK) == (HVLOCK_VLOCK | HVLOCK_HLOCK))
    }

    fn measure(&mut self) -> Result<VideoTimingMeasurement, Error> {
        let std_lock = self.read_register(STD_LOCK)?;
        let words_per_actline = self.read_register(WORDS_PER_ACTLINE)? & WORDS_PER_LINE_MASK;
        let words_per_line = self.read_register(WORDS_PER_LINE)? & WORDS_PER_LINE_MASK;
        let lines_per_frame = self.read_register(LINES_PER_FRAME)? & LINES_PER_FRAME_MASK;
        let sd_audio_status = self.read_register(SD_AUDIO_STATUS)?;
        let hd_audio_status = self.read_register(HD_AUDIO_STATUS)?;

        debug!(
            words_per_actline,
            words_per_line,
            act_lines = std_lock & STD_LOCK_ACT_LINES_MASK,
            lines_per_frame,
            std_lock,
            sd_audio_status,
            hd_audio_status,
            "timing"
        );

        Ok(VideoTimingMeasurement {
            lines_per_frame,
            words_per_line: words_per_line as u32,
            interlaced: std_lock & STD_LOCK_INT_PROG > 0,
            fps_1000: 0,
        })
    }

    fn classify(&self, measurement: &VideoTimingMeasurement) -> Option<VideoStandard> {
        classify(measurement)
    }

    fn variant_hint(&self, standard: &VideoStandard, _: &VideoTimingMeasurement) -> VariantHint {
        match standard {
            VideoStandard::Ntsc | VideoStandard::Pal => VariantHint::NarrowInterface,
            _ => VariantHint::WideInterface,
        }
    }

    fn finalize(&mut self, detection: &Detection, _: &dyn Sleeper) -> Result<(), Error> {
        self.write_and_check(SD_AUDIO_CONFIG, SD_AUDIO_CONFIG_VALUE)?;
        self.write_and_check(HD_AUDIO_CONFIG, HD_AUDIO_CONFIG_VALUE)?;

        let anc_config = if detection.hint == VariantHint::NarrowInterface {
            ANC_CONFIG_SD
        } else {
            ANC_CONFIG_HD
        };
        self.write_register(ANC_CONFIG, anc_config)
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::mock::*};

    fn measurement(lines_per_frame: u16, words_per_line: u32, interlaced: bool) -> VideoTimingMeasurement {
        VideoTimingMeasurement {
            lines_per_frame,
            words_per_line,
            interlaced,
            fps_1000: 0,
        }
    }

    #[test]
    fn classify_by_words_per_line() {
        assert_eq!(classify(&measurement(1125, 2200 + 450, false)), Some(VideoStandard::P1080_25));
        assert_eq!(classify(&measurement(1125, 2750, false)), Some(VideoStandard::P1080_24));
        assert_eq!(classify(&measurement(1124, 2200, false)), Some(VideoStandard::P1080_60));
        assert_eq!(classify(&measurement(1125, 2640, true)), Some(VideoStandard::I1080_50));
        assert_eq!(classify(&measurement(1125, 2200, true)), Some(VideoStandard::I1080_60));
        assert_eq!(classify(&measurement(750, 1980, false)), Some(VideoStandard::P720_50));
        assert_eq!(classify(&measurement(749, 1650, false)), Some(VideoStandard::P720_60));
        assert_eq!(classify(&measurement(750, 1650, true)), None);
    }

    #[test]
    fn classify_standard_definition() {
        assert_eq!(classify(&measurement(525, 1716, true)), Some(VideoStandard::Ntsc));
        assert_eq!(classify(&measurement(625, 1728, true)), Some(VideoStandard::Pal));
        assert_eq!(classify(&measurement(525, 858, false)), Some(VideoStandard::P480_60));
        assert_eq!(classify(&measurement(625, 864, false)), Some(VideoStandard::P576_50));
        assert_eq!(classify(&measurement(0, 0, false)), None);
    }

    #[test]
    fn determinism() {
        let m = measurement(1125, 2200 + 450, false);
        let results: Vec<_> = (0..8).map(|_| classify(&m)).collect();
        assert!(results.iter().all(|r| *r == Some(VideoStandard::P1080_25)));
    }

    fn locked(spi: &mut MockWordDevice, lines: u16, words: u16, interlaced: bool) {
        spi.set(HVLOCK, HVLOCK_VLOCK | HVLOCK_HLOCK);
        spi.set(LINES_PER_FRAME, lines);
        spi.set(WORDS_PER_LINE, words);
        spi.set(STD_LOCK, if interlaced { STD_LOCK_INT_PROG } else { 0 });
    }

    #[test]
    fn detect_hd() {
        let mut spi = MockWordDevice::default();
        locked(&mut spi, 1125, 2200, false);
        let mut decoder = Gv7601::new(spi);
        let sleeper = RecordingSleeper::default();

        let detection = decoder.detect(&sleeper).unwrap();
        assert_eq!(detection.standard, VideoStandard::P1080_60);
        assert_eq!(detection.hint, VariantHint::WideInterface);
        assert_eq!(
            decoder.spi.writes,
            vec![
                (SD_AUDIO_CONFIG, 0xaaaa),
                (HD_AUDIO_CONFIG, 0x0aa4),
                (ANC_CONFIG, 0),
            ]
        );
        assert!(sleeper.durations().is_empty());
    }

    #[test]
    fn detect_sd() {
        let mut spi = MockWordDevice::default();
        locked(&mut spi, 625, 1728, true);
        let mut decoder = Gv7601::new(spi);
        let sleeper = RecordingSleeper::default();

        let detection = decoder.detect(&sleeper).unwrap();
        assert_eq!(detection.standard, VideoStandard::Pal);
        assert_eq!(detection.hint, VariantHint::NarrowInterface);
        assert_eq!(decoder.spi.get(ANC_CONFIG), 2);
    }

    #[test]
    fn detect_without_lock() {
        let mut spi = MockWordDevice::default();
        locked(&mut spi, 1125, 2200, false);
        spi.set(HVLOCK, HVLOCK_VLOCK);
        let mut decoder = Gv7601::new(spi);
        let sleeper = RecordingSleeper::default();

        let err = decoder.detect(&sleeper).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoSignal);
        assert_eq!(decoder.spi.transfers, 1);
    }

    #[test]
    fn detect_without_lines() {
        let mut spi = MockWordDevice::default();
        locked(&mut spi, 0, 0, false);
        let mut decoder = Gv7601::new(spi);
        let sleeper = RecordingSleeper::default();

        let err = decoder.detect(&sleeper).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FormatUnrecognized);
        assert_eq!(sleeper.total(), DETECTION_INTERVAL * 3);
        assert!(decoder.spi.writes.is_empty());
    }

    #[test]
    fn command_words() {
        let mut spi = MockWordDevice::default();
        spi.set(0x0123, 0xbeef);
        let mut decoder = Gv7601::new(spi);
        assert_eq!(decoder.read_register(0xf123), Ok(0xbeef));
        decoder.write_register(0x0456, 0x1234).unwrap();
        assert_eq!(decoder.spi.get(0x0456), 0x1234);
    }
}
