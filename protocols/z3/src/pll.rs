// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Protocol about clock synthesizer.
//!
//! Texas Instruments CDCE925 is programmed over I2C so that:
//!
//! * Y0: 27.000 MHz
//! * Y3: 12.288 MHz
//! * Y5: pixel clock for video input or output
//!
//! FPGA selects the reference for the synthesizer and the divider for the pixel clock.

use {
    super::{fpga::*, video::VideoStandard, *},
    std::time::Duration,
    tracing::debug,
};

/// The preset of pixel clock generated by the synthesizer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PllPreset {
    None,
    /// 74.25 MHz, locked to video input.
    Vidin74m25,
    /// 74.176 MHz, locked to video input.
    Vidin74m176,
    /// 148.5 MHz, locked to video input.
    Vidin148m5,
    /// 148.352 MHz, locked to video input.
    Vidin148m352,
    /// 27 MHz, locked to video input.
    Vidin27m,
    /// 13.5 MHz, locked to video input.
    Vidin13m5,
    /// 74.176 MHz for video output, with VCXO disabled.
    Vidout74m176,
    /// 27 MHz for video output, bypassing PLL.
    Vidout27m,
    /// All of outputs are disabled.
    OutputDisable,
}

impl Default for PllPreset {
    fn default() -> Self {
        Self::Vidin74m176
    }
}

const PLL_PRESETS: &[PllPreset] = &[
    PllPreset::None,
    PllPreset::Vidin74m25,
    PllPreset::Vidin74m176,
    PllPreset::Vidin148m5,
    PllPreset::Vidin148m352,
    PllPreset::Vidin27m,
    PllPreset::Vidin13m5,
    PllPreset::Vidout74m176,
    PllPreset::Vidout27m,
    PllPreset::OutputDisable,
];

const PLL_PRESET_LABELS: &[&str] = &[
    "none",
    "vidin_74m25",
    "vidin_74m176",
    "vidin_148m5",
    "vidin_148m352",
    "vidin_27m",
    "vidin_13m5",
    "vidout_74m176",
    "vidout_27m",
    "output_disable",
];

impl PllPreset {
    pub fn label(&self) -> &'static str {
        item_to_label(self, PLL_PRESETS, PLL_PRESET_LABELS)
    }

    /// Parse the name of preset. The comparison is case-insensitive against the prefix.
    pub fn parse(text: &str) -> Result<Self, Error> {
        label_to_item(text, PLL_PRESETS, PLL_PRESET_LABELS, "PLL setting")
    }

    /// The sequence of register writes to the synthesizer.
    pub fn register_sequence(&self, load_pf: u8) -> Vec<(u8, u8)> {
        let mut seq = Vec::with_capacity(18);

        // The video output requires steady clock, thus VCXO is disabled.
        seq.push((0x01, if *self == Self::Vidout74m176 { 0x00 } else { 0x04 }));
        seq.push((0x02, if *self == Self::OutputDisable { 0x80 } else { 0x34 }));
        seq.push((0x04, 0x02));
        seq.push((LOAD_CAPACITANCE_REG, load_pf * LOAD_CAPACITANCE_UNIT));
        seq.push((0x06, 0x60));
        seq.push((0x14, if *self == Self::OutputDisable { 0x80 } else { 0x6d }));
        seq.extend_from_slice(&[(0x16, 0x29), (0x17, 0x09), (0x18, 0x60), (0x19, 0x04), (0x1a, 0x82)]);

        let pll2 = match self {
            Self::Vidout27m => [0xef, 0x08, 0x01],
            Self::OutputDisable => [0x80, 0x08, 0x01],
            Self::Vidin148m5 | Self::Vidin148m352 => [0x6f, 0x00, 0x01],
            _ => [0x6f, 0x08, 0x03],
        };
        seq.extend([0x24, 0x26, 0x27].iter().copied().zip(pll2.iter().copied()));

        let pll2_freq = match self {
            Self::Vidin74m25 => [0xff, 0xc7, 0xc2, 0x07],
            Self::Vidin148m5 => [0xaf, 0x50, 0x02, 0xc9],
            Self::Vidin148m352 => [0x9c, 0x4d, 0xea, 0xa9],
            _ => [0xea, 0x66, 0xe2, 0x07],
        };
        seq.extend((0x28..0x2c).zip(pll2_freq.iter().copied()));

        seq
    }

    /// The divider of pixel clock in FPGA.
    pub fn divider(&self) -> u16 {
        match self {
            Self::Vidin13m5 => 0x01,
            Self::Vidin27m => 0x11,
            Self::Vidin148m5 | Self::Vidin148m352 => 0x3b,
            _ => 0x2a,
        }
    }

    /// The preset for pixel clock of video input in the standard. The decoders can not
    /// distinguish the rate divided by 1.001, thus the integer rate is chosen.
    pub fn for_standard(standard: &VideoStandard) -> Self {
        match standard {
            VideoStandard::P1080_50 | VideoStandard::P1080_60 => Self::Vidin148m5,
            VideoStandard::P480_60 | VideoStandard::P576_50 => Self::Vidin27m,
            VideoStandard::Ntsc | VideoStandard::Pal => Self::Vidin13m5,
            _ => Self::Vidin74m25,
        }
    }
}

/// The video input to which the synthesizer locks.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum VidinReference {
    Vidin0,
    Vidin1,
}

impl Default for VidinReference {
    fn default() -> Self {
        Self::Vidin0
    }
}

const VIDIN_REFERENCES: &[VidinReference] = &[VidinReference::Vidin0, VidinReference::Vidin1];
const VIDIN_REFERENCE_LABELS: &[&str] = &["vidin0", "vidin1"];

impl VidinReference {
    pub fn label(&self) -> &'static str {
        item_to_label(self, VIDIN_REFERENCES, VIDIN_REFERENCE_LABELS)
    }

    pub fn parse(text: &str) -> Result<Self, Error> {
        label_to_item(text, VIDIN_REFERENCES, VIDIN_REFERENCE_LABELS, "video reference")
    }

    fn bits(&self) -> u16 {
        match self {
            Self::Vidin0 => 0x0000,
            Self::Vidin1 => 0x0100,
        }
    }
}

/// The register for load capacitance of crystal.
pub const LOAD_CAPACITANCE_REG: u8 = 0x05;
/// The maximum load capacitance in pF.
pub const LOAD_CAPACITANCE_MAX: u8 = 20;
/// The default load capacitance in pF.
pub const LOAD_CAPACITANCE_DEFAULT: u8 = 6;
const LOAD_CAPACITANCE_UNIT: u8 = 8;

/// The state of synthesizer and relevant register in FPGA.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct PllState {
    /// The preset committed by the last successful configuration.
    pub preset: PllPreset,
    /// The load capacitance in pF.
    pub load_pf: u8,
    pub vidin_reference: VidinReference,
    pub divider: u16,
}

impl Default for PllState {
    fn default() -> Self {
        Self {
            preset: Default::default(),
            load_pf: LOAD_CAPACITANCE_DEFAULT,
            vidin_reference: Default::default(),
            divider: PllPreset::default().divider(),
        }
    }
}

impl PllState {
    /// The value of PLL_CTRL register in FPGA.
    pub fn ctrl(&self) -> u16 {
        self.vidin_reference.bits() | self.divider
    }
}

/// The protocol implementation for CDCE925.
#[derive(Default, Debug)]
pub struct Cdce925Protocol;

impl Cdce925Protocol {
    /// The address in I2C bus.
    pub const ADDRESS: u16 = 0x64;

    /// The flag in offset for byte operation.
    pub const BYTE_OPERATION: u8 = 0x80;

    const WRITE_ATTEMPTS: usize = 3;
    const WRITE_BACKOFF: Duration = Duration::from_millis(10);

    /// Write single register with retries.
    pub fn write_register<B: RegisterBus + ?Sized>(
        bus: &mut B,
        sleeper: &dyn Sleeper,
        offset: u8,
        value: u8,
    ) -> Result<(), Error> {
        let label = format!("PLL 0x{:02x} <= 0x{:02x}", offset, value);
        let res = retry(Self::WRITE_ATTEMPTS, Self::WRITE_BACKOFF, sleeper, &label, || {
            bus.write_register(offset | Self::BYTE_OPERATION, value)
        });
        debug!(offset, value, ok = res.is_ok(), "PLL write");
        res
    }

    /// Write the load capacitance in pF.
    pub fn write_load_capacitance<B: RegisterBus + ?Sized>(
        bus: &mut B,
        sleeper: &dyn Sleeper,
        load_pf: u8,
    ) -> Result<(), Error> {
        Self::write_register(
            bus,
            sleeper,
            LOAD_CAPACITANCE_REG,
            load_pf * LOAD_CAPACITANCE_UNIT,
        )
    }
}

/// The configurator of synthesizer and FPGA for pixel clock.
#[derive(Default, Debug)]
pub struct PllConfigurator;

impl PllConfigurator {
    /// Program the synthesizer for the preset. Any write is attempted even if the former fails,
    /// then the divider is written to FPGA. The preset is committed to the state only when all
    /// writes succeed.
    pub fn configure<B, W>(
        bus: Option<&mut B>,
        window: &mut W,
        sleeper: &dyn Sleeper,
        state: &mut PllState,
        preset: PllPreset,
    ) -> Result<(), Error>
    where
        B: RegisterBus + ?Sized,
        W: RegisterWindow + ?Sized,
    {
        let bus = bus.ok_or_else(|| Error::new(ErrorKind::NoDevice, "PLL is not available"))?;

        let seq = preset.register_sequence(state.load_pf);
        let count = seq.len();
        let errors: Vec<Error> = seq
            .into_iter()
            .filter_map(|(offset, value)| {
                Cdce925Protocol::write_register(&mut *bus, sleeper, offset, value).err()
            })
            .collect();

        state.divider = preset.divider();
        let ctrl_res = FpgaProtocol::write_pll_ctrl(window, state.ctrl());

        if let Some(err) = errors.first() {
            let msg = format!(
                "{} of {} writes failed for {}: {}",
                errors.len(),
                count,
                preset.label(),
                err
            );
            Err(Error::new(err.kind(), &msg))
        } else {
            ctrl_res.map(|_| state.preset = preset)
        }
    }

    /// Set load capacitance of crystal. The value larger than maximum is clamped. The register is
    /// written only when the synthesizer is available.
    pub fn set_load_capacitance<B: RegisterBus + ?Sized>(
        bus: Option<&mut B>,
        sleeper: &dyn Sleeper,
        state: &mut PllState,
        value: u32,
    ) -> Result<(), Error> {
        let val = (value & 0xffff) as u16;
        state.load_pf = if val > LOAD_CAPACITANCE_MAX as u16 {
            debug!(
                value,
                max = LOAD_CAPACITANCE_MAX,
                "load capacitance too large, clamped"
            );
            LOAD_CAPACITANCE_MAX
        } else {
            val as u8
        };

        match bus {
            Some(bus) => Cdce925Protocol::write_load_capacitance(bus, sleeper, state.load_pf),
            None => Ok(()),
        }
    }

    /// Select the video input as reference.
    pub fn set_vidin_reference<W: RegisterWindow + ?Sized>(
        window: &mut W,
        state: &mut PllState,
        reference: VidinReference,
    ) -> Result<(), Error> {
        state.vidin_reference = reference;
        FpgaProtocol::write_pll_ctrl(window, state.ctrl())
    }
}
