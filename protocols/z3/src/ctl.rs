// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! The control plane in text.
//!
//! Each knob is addressed by name. The read operation returns formatted text, and the write
//! operation parses text then applies it to the controller.

use {
    super::{audio::*, board::*, controller::*, fpga::*, latch::*, pll::*, *},
    tracing::debug,
};

/// The knob of control plane.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Knob {
    Latch1,
    Latch2,
    BoardId,
    Stc,
    AsiCtl,
    SdiOut,
    TsoPcrPid,
    PllSetting,
    PllLoadPf,
    PllLock,
    Version,
    PllLoadScan,
    TsoPcrDelta,
    AudioSrc,
    AudioInput,
    FpgaProg,
    FpgaDone,
    VidinRef,
    AicDisable,
    AicExtMaster,
    AicExtMasterRate,
}

pub const KNOBS: &[Knob] = &[
    Knob::Latch1,
    Knob::Latch2,
    Knob::BoardId,
    Knob::Stc,
    Knob::AsiCtl,
    Knob::SdiOut,
    Knob::TsoPcrPid,
    Knob::PllSetting,
    Knob::PllLoadPf,
    Knob::PllLock,
    Knob::Version,
    Knob::PllLoadScan,
    Knob::TsoPcrDelta,
    Knob::AudioSrc,
    Knob::AudioInput,
    Knob::FpgaProg,
    Knob::FpgaDone,
    Knob::VidinRef,
    Knob::AicDisable,
    Knob::AicExtMaster,
    Knob::AicExtMasterRate,
];

const KNOB_NAMES: &[&str] = &[
    "latch1",
    "latch2",
    "board_id",
    "stc",
    "asi_ctl",
    "sdi_out",
    "tso_pcr_pid",
    "pll_setting",
    "pll_load_pf",
    "pll_lock",
    "version",
    "pll_load_scan",
    "tso_pcr_delta",
    "audio_src",
    "audio_input",
    "fpga_prog",
    "fpga_done",
    "vidin_ref",
    "aic_disable",
    "aic_ext_master",
    "aic_ext_master_rate",
];

impl Knob {
    pub fn name(&self) -> &'static str {
        item_to_label(self, KNOBS, KNOB_NAMES)
    }

    /// Find the knob by exact name.
    pub fn from_name(name: &str) -> Result<Self, Error> {
        let name = name.trim();
        KNOBS
            .iter()
            .zip(KNOB_NAMES)
            .find(|(_, n)| **n == name)
            .map(|(&knob, _)| knob)
            .ok_or_else(|| {
                let msg = format!("No such knob: {}", name);
                Error::new(ErrorKind::NoDevice, &msg)
            })
    }

    pub fn is_writable(&self) -> bool {
        match self {
            Self::Stc
            | Self::PllLock
            | Self::Version
            | Self::TsoPcrDelta
            | Self::FpgaDone => false,
            _ => true,
        }
    }
}

fn invalid_value(text: &str) -> Error {
    let msg = format!("Invalid value: {}", text);
    Error::new(ErrorKind::InvalidInput, &msg)
}

fn parse_radix(text: &str, digits: &str, radix: u32) -> Result<u32, Error> {
    if digits.is_empty() {
        Err(invalid_value(text))
    } else {
        u32::from_str_radix(digits, radix).map_err(|_| invalid_value(text))
    }
}

/// Parse integer. The prefix of 0x means hexadecimal, the leading zero means octal, else
/// decimal.
pub fn parse_auto_radix(text: &str) -> Result<u32, Error> {
    let text = text.trim();
    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        parse_radix(text, digits, 16)
    } else if text.len() > 1 && text.starts_with('0') {
        parse_radix(text, &text[1..], 8)
    } else {
        parse_radix(text, text, 10)
    }
}

/// Parse integer. The prefix of 0x means hexadecimal, else decimal.
pub fn parse_hex_or_decimal(text: &str) -> Result<u32, Error> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) => parse_radix(text, digits, 16),
        None => parse_radix(text, text, 10),
    }
}

/// Parse integer. The prefix of 0x means hexadecimal, else binary.
pub fn parse_hex_or_binary(text: &str) -> Result<u32, Error> {
    let text = text.trim();
    match text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        Some(digits) => parse_radix(text, digits, 16),
        None => parse_radix(text, text, 2),
    }
}

fn parse_register(text: &str) -> Result<u16, Error> {
    let val = parse_auto_radix(text)?;
    if val > u16::MAX as u32 {
        let msg = format!("Value out of 16 bit: {}", text.trim());
        Err(Error::new(ErrorKind::InvalidInput, &msg))
    } else {
        Ok(val as u16)
    }
}

fn parse_flag(text: &str) -> Result<bool, Error> {
    parse_auto_radix(text).map(|val| val > 0)
}

fn register_text(value: u16) -> String {
    format!("0x{:04x}", value)
}

fn flag_text(value: bool) -> String {
    format!("{}", value as u8)
}

/// The protocol implementation for control plane.
#[derive(Default, Debug)]
pub struct CtlProtocol;

impl CtlProtocol {
    /// Read the knob in text.
    pub fn read(ctl: &Z3Controller, knob: Knob) -> Result<String, Error> {
        let text = match knob {
            Knob::Latch1 => register_text(ctl.latch(Latch::Latch1)?),
            Knob::Latch2 => register_text(ctl.latch(Latch::Latch2)?),
            Knob::BoardId => register_text(u16::from(ctl.board_id()?)),
            Knob::Stc => ctl.sample_stc()?.to_string(),
            Knob::AsiCtl => register_text(ctl.read_register(FpgaRegister::AsiCtl)?),
            Knob::SdiOut => register_text(ctl.read_register(FpgaRegister::SdiOut)?),
            Knob::TsoPcrPid => register_text(ctl.read_register(FpgaRegister::TsoPcrPid)?),
            Knob::PllSetting => ctl.pll_state()?.preset.label().to_string(),
            Knob::PllLoadPf => format!("{}", ctl.pll_state()?.load_pf),
            Knob::PllLock => flag_text(ctl.pll_locked()?),
            Knob::Version => register_text(ctl.version()?),
            Knob::PllLoadScan => ctl.last_scan().to_string(),
            Knob::TsoPcrDelta => format!("{}", ctl.pcr_delta()?),
            Knob::AudioSrc => ctl.audio_state()?.source.label().to_string(),
            Knob::AudioInput => ctl.audio_state()?.input.label().to_string(),
            Knob::FpgaProg => register_text(ctl.latch(Latch::Latch1)?),
            Knob::FpgaDone => register_text(ctl.fpga_done()? as u16),
            Knob::VidinRef => ctl.pll_state()?.vidin_reference.label().to_string(),
            Knob::AicDisable => flag_text(ctl.aic_disabled()?),
            Knob::AicExtMaster => flag_text(ctl.audio_state()?.ext_master),
            Knob::AicExtMasterRate => format!("{}", ctl.audio_state()?.ext_master_rate.rate()),
        };
        Ok(text)
    }

    /// Parse the text and write it to the knob.
    pub fn write(ctl: &Z3Controller, knob: Knob, text: &str) -> Result<(), Error> {
        if !knob.is_writable() {
            let msg = format!("Knob is read-only: {}", knob.name());
            return Err(Error::new(ErrorKind::InvalidInput, &msg));
        }

        debug!(knob = knob.name(), text = text.trim_end(), "write knob");

        match knob {
            Knob::Latch1 => ctl.write_latch(Latch::Latch1, parse_register(text)?),
            Knob::Latch2 => ctl.write_latch(Latch::Latch2, parse_register(text)?),
            Knob::BoardId => {
                let val = parse_hex_or_binary(text)?;
                if val > u16::MAX as u32 {
                    return Err(invalid_value(text.trim()));
                }
                ctl.set_board_id(BoardId::from(val as u16))
            }
            Knob::AsiCtl => ctl.write_register(FpgaRegister::AsiCtl, parse_register(text)?),
            Knob::SdiOut => ctl.write_register(FpgaRegister::SdiOut, parse_register(text)?),
            Knob::TsoPcrPid => ctl.write_register(FpgaRegister::TsoPcrPid, parse_register(text)?),
            Knob::PllSetting => ctl.configure_pll(PllPreset::parse(text)?),
            Knob::PllLoadPf => ctl.set_pll_load_capacitance(parse_hex_or_decimal(text)?),
            Knob::PllLoadScan => ctl.scan_load_capacitance().map(|_| ()),
            Knob::AudioSrc => ctl.set_audio_source(AudioSource::parse(text)?),
            Knob::AudioInput => ctl.set_audio_input(AudioInput::parse(text)?),
            Knob::FpgaProg => ctl.set_fpga_prog(parse_flag(text)?),
            Knob::VidinRef => ctl.set_vidin_reference(VidinReference::parse(text)?),
            Knob::AicDisable => ctl.set_aic_disable(parse_flag(text)?),
            Knob::AicExtMaster => ctl.set_aic_ext_master(parse_flag(text)?),
            Knob::AicExtMasterRate => ctl.set_aic_ext_master_rate(parse_auto_radix(text)?),
            Knob::Stc | Knob::PllLock | Knob::Version | Knob::TsoPcrDelta | Knob::FpgaDone => {
                Ok(())
            }
        }
    }

    /// Run the command; `NAME` to read, `NAME=VALUE` to write. The text of knob is returned
    /// for both.
    pub fn execute(ctl: &Z3Controller, command: &str) -> Result<String, Error> {
        match command.split_once('=') {
            Some((name, value)) => {
                let knob = Knob::from_name(name)?;
                Self::write(ctl, knob, value)?;
                // The scan is expensive and the write gives its result.
                if knob == Knob::PllLoadScan {
                    Ok(ctl.last_scan().to_string())
                } else {
                    Self::read(ctl, knob)
                }
            }
            None => Self::read(ctl, Knob::from_name(command)?),
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::mock::*};

    #[test]
    fn knob_names() {
        assert_eq!(KNOBS.len(), KNOB_NAMES.len());
        assert_eq!(Knob::from_name("pll_load_scan"), Ok(Knob::PllLoadScan));
        assert_eq!(Knob::from_name("aic_ext_master\n"), Ok(Knob::AicExtMaster));
        assert_eq!(Knob::AicExtMasterRate.name(), "aic_ext_master_rate");
        assert_eq!(
            Knob::from_name("pll").unwrap_err().kind(),
            ErrorKind::NoDevice
        );
    }

    #[test]
    fn integer_parsers() {
        assert_eq!(parse_auto_radix("0x1f\n"), Ok(0x1f));
        assert_eq!(parse_auto_radix("017"), Ok(0o17));
        assert_eq!(parse_auto_radix("0"), Ok(0));
        assert_eq!(parse_auto_radix("42"), Ok(42));
        assert!(parse_auto_radix("").is_err());
        assert!(parse_auto_radix("0x").is_err());
        assert!(parse_auto_radix("-1").is_err());
        assert!(parse_auto_radix("08").is_err());

        assert_eq!(parse_hex_or_decimal("0x0c"), Ok(12));
        assert_eq!(parse_hex_or_decimal("010"), Ok(10));

        assert_eq!(parse_hex_or_binary("0x8"), Ok(8));
        assert_eq!(parse_hex_or_binary("10"), Ok(2));
        assert!(parse_hex_or_binary("12").is_err());

        assert_eq!(
            parse_register("65536").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(parse_register("0xffff"), Ok(0xffff));
    }

    #[test]
    fn latch_knobs() {
        let f = fixture(BoardId::App31);
        CtlProtocol::write(&f.controller, Knob::Latch1, "0x0101\n").unwrap();
        assert_eq!(f.latch.lock().unwrap().last_write(LATCH1_OFFSET), Some(0x0101));
        assert_eq!(CtlProtocol::read(&f.controller, Knob::Latch1), Ok("0x0101".to_string()));

        CtlProtocol::write(&f.controller, Knob::FpgaProg, "1").unwrap();
        assert_eq!(CtlProtocol::read(&f.controller, Knob::FpgaProg), Ok("0x2101".to_string()));

        f.latch.lock().unwrap().set(LATCH1_OFFSET, INPUT_FPGA_DONE);
        assert_eq!(CtlProtocol::read(&f.controller, Knob::FpgaDone), Ok("0x0001".to_string()));

        let err = CtlProtocol::write(&f.controller, Knob::Latch2, "70000").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn read_only_knobs() {
        let f = fixture(BoardId::App31);
        [Knob::Stc, Knob::PllLock, Knob::Version, Knob::TsoPcrDelta, Knob::FpgaDone]
            .iter()
            .for_each(|&knob| {
                let err = CtlProtocol::write(&f.controller, knob, "1").unwrap_err();
                assert_eq!(err.kind(), ErrorKind::InvalidInput);
            });
    }

    #[test]
    fn board_id_knob() {
        let f = fixture(BoardId::None);
        assert_eq!(CtlProtocol::read(&f.controller, Knob::BoardId), Ok("0xffff".to_string()));

        CtlProtocol::write(&f.controller, Knob::BoardId, "10").unwrap();
        assert_eq!(f.controller.board_id(), Ok(BoardId::App31));
        assert_eq!(f.pll.lock().unwrap().writes.len(), 18);

        CtlProtocol::write(&f.controller, Knob::BoardId, "0x8").unwrap();
        assert_eq!(CtlProtocol::read(&f.controller, Knob::BoardId), Ok("0x0008".to_string()));
    }

    #[test]
    fn pll_knobs() {
        let f = fixture(BoardId::App31);
        assert_eq!(
            CtlProtocol::read(&f.controller, Knob::PllSetting),
            Ok("vidin_74m176".to_string())
        );

        CtlProtocol::write(&f.controller, Knob::PllSetting, "VIDIN_27M\n").unwrap();
        assert_eq!(f.fpga.lock().unwrap().last_write(PLL_CTRL_OFFSET), Some(0x0011));
        CtlProtocol::write(&f.controller, Knob::VidinRef, "vidin1").unwrap();
        assert_eq!(f.fpga.lock().unwrap().last_write(PLL_CTRL_OFFSET), Some(0x0111));
        assert_eq!(CtlProtocol::read(&f.controller, Knob::VidinRef), Ok("vidin1".to_string()));

        CtlProtocol::write(&f.controller, Knob::PllLoadPf, "0x20").unwrap();
        assert_eq!(CtlProtocol::read(&f.controller, Knob::PllLoadPf), Ok("20".to_string()));

        let err = CtlProtocol::write(&f.controller, Knob::PllSetting, "vidin_1m").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        assert_eq!(CtlProtocol::read(&f.controller, Knob::PllLoadScan), Ok("-1 -1".to_string()));
        assert_eq!(CtlProtocol::read(&f.controller, Knob::PllLock), Ok("0".to_string()));
    }

    #[test]
    fn fpga_knobs() {
        let f = fixture(BoardId::App31);
        CtlProtocol::write(&f.controller, Knob::TsoPcrPid, "0x1ffe").unwrap();
        assert_eq!(f.fpga.lock().unwrap().last_write(TSO_PCR_PID_OFFSET), Some(0x1ffe));

        f.fpga.lock().unwrap().set(TSO_PCR_DELTA_HIGH_OFFSET, 0xffff);
        f.fpga.lock().unwrap().set(TSO_PCR_DELTA_MID_OFFSET, 0x0000);
        f.fpga.lock().unwrap().set(TSO_PCR_DELTA_LOW_OFFSET, 0xfffe);
        assert_eq!(CtlProtocol::read(&f.controller, Knob::TsoPcrDelta), Ok("-2".to_string()));

        let f = fixture(BoardId::App02);
        let err = CtlProtocol::read(&f.controller, Knob::Version).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoDevice);
    }

    #[test]
    fn audio_knobs() {
        let f = fixture(BoardId::App31);
        assert_eq!(CtlProtocol::read(&f.controller, Knob::AudioSrc), Ok("enable".to_string()));
        CtlProtocol::write(&f.controller, Knob::AudioInput, "3+4\n").unwrap();
        assert_eq!(CtlProtocol::read(&f.controller, Knob::AudioInput), Ok("3+4".to_string()));

        CtlProtocol::write(&f.controller, Knob::AicExtMaster, "1").unwrap();
        CtlProtocol::write(&f.controller, Knob::AicExtMasterRate, "32000").unwrap();
        assert_eq!(f.fpga.lock().unwrap().last_write(AUDIO_HDMI_OFFSET), Some(0x3012));
        assert_eq!(
            CtlProtocol::read(&f.controller, Knob::AicExtMasterRate),
            Ok("32000".to_string())
        );

        let err = CtlProtocol::write(&f.controller, Knob::AicExtMasterRate, "44100").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        CtlProtocol::write(&f.controller, Knob::AicDisable, "1").unwrap();
        assert_eq!(CtlProtocol::read(&f.controller, Knob::AicDisable), Ok("1".to_string()));
    }

    #[test]
    fn commands() {
        let f = fixture(BoardId::App31);
        assert_eq!(
            CtlProtocol::execute(&f.controller, "audio_src=disable"),
            Ok("disable".to_string())
        );
        assert_eq!(CtlProtocol::execute(&f.controller, "latch2"), Ok("0x0000".to_string()));
        assert_eq!(
            CtlProtocol::execute(&f.controller, "unknown=1").unwrap_err().kind(),
            ErrorKind::NoDevice
        );
    }
}
