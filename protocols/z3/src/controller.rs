// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! The controller of peripherals in the board.
//!
//! Each peripheral is behind its own lock. The locks are always taken in the order of board,
//! latch, FPGA, synthesizer bus, PLL state, audio state, then STC state.

use {
    super::{audio::*, board::*, fpga::*, latch::*, pll::*, scan::*, stc::*, video::*, *},
    std::sync::{Mutex, MutexGuard},
    tracing::{debug, warn},
};

/// The window for registers, shared between threads.
pub type SharedWindow = Box<dyn RegisterWindow + Send>;
/// The device in I2C bus, shared between threads.
pub type SharedBus = Box<dyn RegisterBus + Send>;
/// The free running counter, shared between threads.
pub type SharedCounter = Box<dyn FreeRunningCounter + Send + Sync>;

/// The set of peripherals for the controller.
pub struct Peripherals {
    pub latch: SharedWindow,
    /// Accessible when the board carries it.
    pub fpga: Option<SharedWindow>,
    /// The bus for clock synthesizer, accessible when the board carries it.
    pub pll: Option<SharedBus>,
    pub stc0: Option<SharedCounter>,
    pub gptimer: Option<SharedCounter>,
    pub sleeper: Box<dyn Sleeper + Send + Sync>,
    /// Whether the SoC is DM814x.
    pub dm814x: bool,
}

struct LatchPort {
    window: SharedWindow,
    state: LatchState,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, Error> {
    mutex
        .lock()
        .map_err(|_| Error::new(ErrorKind::IoFailure, "Peripheral lock is poisoned"))
}

fn no_fpga() -> Error {
    Error::new(ErrorKind::NoDevice, "FPGA is not available")
}

fn counter_ref(counter: &Option<SharedCounter>) -> Option<&dyn FreeRunningCounter> {
    counter
        .as_deref()
        .map(|c| c as &dyn FreeRunningCounter)
}

/// The controller.
pub struct Z3Controller {
    board: Mutex<BoardId>,
    latch: Mutex<LatchPort>,
    fpga: Mutex<Option<SharedWindow>>,
    pll_bus: Mutex<Option<SharedBus>>,
    pll: Mutex<PllState>,
    audio: Mutex<AudioState>,
    stc: Mutex<TimestampReconstructor>,
    stc0: Option<SharedCounter>,
    gptimer: Option<SharedCounter>,
    scanner: LoadCapacitanceScanner,
    sleeper: Box<dyn Sleeper + Send + Sync>,
}

impl Z3Controller {
    pub fn new(peripherals: Peripherals) -> Self {
        let Peripherals {
            latch,
            fpga,
            pll,
            stc0,
            gptimer,
            sleeper,
            dm814x,
        } = peripherals;

        Self {
            board: Mutex::new(Default::default()),
            latch: Mutex::new(LatchPort {
                window: latch,
                state: LatchState::new(dm814x),
            }),
            fpga: Mutex::new(fpga),
            pll_bus: Mutex::new(pll),
            pll: Default::default(),
            audio: Default::default(),
            stc: Default::default(),
            stc0,
            gptimer,
            scanner: Default::default(),
            sleeper,
        }
    }

    fn sleeper(&self) -> &dyn Sleeper {
        &*self.sleeper
    }

    pub fn board_id(&self) -> Result<BoardId, Error> {
        lock(&self.board).map(|board| *board)
    }

    /// Set the identifier of board, then initialize the clock synthesizer with current preset
    /// when the board carries it.
    pub fn set_board_id(&self, id: BoardId) -> Result<(), Error> {
        {
            let mut board = lock(&self.board)?;
            let mut latch = lock(&self.latch)?;
            *board = id;
            latch.state.has_latch2 = id.has_sdi();
        }
        debug!(?id, "board");

        if self.pll_present()? {
            let preset = lock(&self.pll)?.preset;
            if let Err(err) = self.configure_pll(preset) {
                warn!(error = %err, "PLL initialization failed");
            }
        }

        Ok(())
    }

    /// Identify board by LEDs and GPIO line.
    pub fn identify_board(&self, input: &mut dyn BoardIdInput) -> Result<BoardId, Error> {
        let id = {
            let mut latch = lock(&self.latch)?;
            let LatchPort { window, state } = &mut *latch;
            BoardIdProtocol::detect(window, state, input, self.sleeper())?
        };
        self.set_board_id(id)?;
        Ok(id)
    }

    /// The cached value of latch.
    pub fn latch(&self, latch: Latch) -> Result<u16, Error> {
        lock(&self.latch).map(|port| port.state.value(latch))
    }

    pub fn write_latch(&self, latch: Latch, value: u16) -> Result<(), Error> {
        let mut port = lock(&self.latch)?;
        let LatchPort { window, state } = &mut *port;
        LatchProtocol::write(window, state, latch, value)
    }

    pub fn update_latch(&self, latch: Latch, mask: u16, value: u16) -> Result<(), Error> {
        let mut port = lock(&self.latch)?;
        let LatchPort { window, state } = &mut *port;
        LatchProtocol::update(window, state, latch, mask, value)
    }

    pub fn set_si_20bit(&self, enable: bool) -> Result<(), Error> {
        let mut port = lock(&self.latch)?;
        let LatchPort { window, state } = &mut *port;
        LatchProtocol::set_si_20bit(window, state, enable)
    }

    pub fn set_serial_output(&self, value: u16) -> Result<(), Error> {
        let mut port = lock(&self.latch)?;
        let LatchPort { window, state } = &mut *port;
        LatchProtocol::set_serial_output(window, state, value)
    }

    pub fn set_fpga_prog(&self, enable: bool) -> Result<(), Error> {
        self.latch_flag(LATCH1_FPGA_PROG, enable)
    }

    fn latch_flag(&self, mask: u16, enable: bool) -> Result<(), Error> {
        let mut port = lock(&self.latch)?;
        let LatchPort { window, state } = &mut *port;
        LatchProtocol::set_flag(window, state, Latch::Latch1, mask, enable)
    }

    pub fn fpga_done(&self) -> Result<bool, Error> {
        let port = lock(&self.latch)?;
        LatchProtocol::read_fpga_done(&port.window)
    }

    fn with_fpga<T, F>(&self, op: F) -> Result<T, Error>
    where
        F: FnOnce(&mut dyn RegisterWindow) -> Result<T, Error>,
    {
        if !self.board_id()?.has_sdi() {
            return Err(no_fpga());
        }
        let mut fpga = lock(&self.fpga)?;
        match fpga.as_mut() {
            Some(window) => op(window),
            None => Err(no_fpga()),
        }
    }

    pub fn version(&self) -> Result<u16, Error> {
        self.with_fpga(|window| FpgaProtocol::read_version(window))
    }

    pub fn read_register(&self, reg: FpgaRegister) -> Result<u16, Error> {
        self.with_fpga(|window| FpgaProtocol::read_register(window, reg))
    }

    pub fn write_register(&self, reg: FpgaRegister, value: u16) -> Result<(), Error> {
        self.with_fpga(|window| FpgaProtocol::write_register(window, reg, value))
    }

    pub fn pcr_delta(&self) -> Result<i64, Error> {
        self.with_fpga(|window| FpgaProtocol::read_stable_pcr_delta(window))
    }

    /// Take snapshot of STC and reconstruct timestamp.
    pub fn sample_stc(&self) -> Result<StcTimestamp, Error> {
        self.with_fpga(|window| {
            let mut stc = lock(&self.stc)?;
            stc.sample(window, counter_ref(&self.stc0), counter_ref(&self.gptimer))
        })
    }

    /// Whether the clock synthesizer is accessible.
    pub fn pll_present(&self) -> Result<bool, Error> {
        if self.board_id()?.has_sdi() {
            lock(&self.pll_bus).map(|bus| bus.is_some())
        } else {
            Ok(false)
        }
    }

    pub fn pll_state(&self) -> Result<PllState, Error> {
        lock(&self.pll).map(|state| *state)
    }

    pub fn configure_pll(&self, preset: PllPreset) -> Result<(), Error> {
        let present = self.pll_present()?;
        self.with_fpga(|window| {
            let mut bus = lock(&self.pll_bus)?;
            let mut state = lock(&self.pll)?;
            let bus = if present { bus.as_mut() } else { None };
            PllConfigurator::configure(bus, window, self.sleeper(), &mut state, preset)
        })
    }

    pub fn set_pll_load_capacitance(&self, value: u32) -> Result<(), Error> {
        let present = self.pll_present()?;
        let mut bus = lock(&self.pll_bus)?;
        let mut state = lock(&self.pll)?;
        let bus = if present { bus.as_mut() } else { None };
        PllConfigurator::set_load_capacitance(bus, self.sleeper(), &mut state, value)
    }

    pub fn set_vidin_reference(&self, reference: VidinReference) -> Result<(), Error> {
        self.with_fpga(|window| {
            let mut state = lock(&self.pll)?;
            PllConfigurator::set_vidin_reference(window, &mut state, reference)
        })
    }

    pub fn pll_locked(&self) -> Result<bool, Error> {
        self.with_fpga(|window| FpgaProtocol::read_pll_lock(window))
    }

    /// Scan load capacitance. The other access to FPGA and synthesizer waits till it finishes.
    pub fn scan_load_capacitance(&self) -> Result<ScanResult, Error> {
        if !self.pll_present()? {
            return Err(Error::new(ErrorKind::NoDevice, "PLL is not available"));
        }
        self.with_fpga(|window| {
            let mut bus = lock(&self.pll_bus)?;
            let bus = bus
                .as_mut()
                .ok_or_else(|| Error::new(ErrorKind::NoDevice, "PLL is not available"))?;
            let configured = lock(&self.pll)?.load_pf;

            let mut target = SynthesizerTarget {
                bus,
                window: &*window,
                sleeper: self.sleeper(),
            };
            self.scanner.scan(&mut target, self.sleeper(), configured)
        })
    }

    pub fn last_scan(&self) -> ScanResult {
        self.scanner.last_result()
    }

    pub fn audio_state(&self) -> Result<AudioState, Error> {
        lock(&self.audio).map(|state| *state)
    }

    /// Whether the audio codec is disabled. Always false unless the board supports it.
    pub fn aic_disabled(&self) -> Result<bool, Error> {
        if self.board_id()?.can_disable_aic() {
            self.latch(Latch::Latch1)
                .map(|val| val & LATCH1_AIC_DIS > 0)
        } else {
            Ok(false)
        }
    }

    /// Write routing of audio. Nothing is written unless FPGA is available.
    pub fn update_audio(&self) -> Result<(), Error> {
        let aic_disabled = self.aic_disabled()?;
        let has_fpga = self.board_id()?.has_sdi();
        let mut fpga = lock(&self.fpga)?;
        let audio = lock(&self.audio)?;
        match fpga.as_mut() {
            Some(window) if has_fpga => AudioProtocol::update(window, &audio, aic_disabled),
            _ => Ok(()),
        }
    }

    fn modify_audio<F: FnOnce(&mut AudioState)>(&self, modify: F) -> Result<(), Error> {
        lock(&self.audio).map(|mut state| modify(&mut *state))?;
        self.update_audio()
    }

    pub fn set_audio_source(&self, source: AudioSource) -> Result<(), Error> {
        self.modify_audio(|state| state.source = source)
    }

    pub fn set_audio_input(&self, input: AudioInput) -> Result<(), Error> {
        self.modify_audio(|state| state.input = input)
    }

    pub fn set_aic_ext_master(&self, enable: bool) -> Result<(), Error> {
        self.modify_audio(|state| state.ext_master = enable)
    }

    pub fn set_aic_ext_master_rate(&self, rate: u32) -> Result<(), Error> {
        let rate = ExtMasterRate::from_rate(rate)?;
        self.modify_audio(|state| state.ext_master_rate = rate)
    }

    /// Disable the audio codec. The request is ignored unless the board supports it.
    pub fn set_aic_disable(&self, disable: bool) -> Result<(), Error> {
        if !self.board_id()?.can_disable_aic() {
            debug!("AIC disable is not supported by the board");
            return Ok(());
        }
        self.latch_flag(LATCH1_AIC_DIS, disable)?;
        self.update_audio()
    }

    /// Apply the detected standard to the interface of SDI input, then configure the clock
    /// synthesizer for it if requested.
    pub fn apply_video_detection(
        &self,
        detection: &Detection,
        configure_pll: bool,
    ) -> Result<(), Error> {
        match detection.hint {
            VariantHint::NarrowInterface => self.set_si_20bit(false)?,
            VariantHint::WideInterface => self.set_si_20bit(true)?,
            _ => (),
        }

        if configure_pll && self.pll_present()? {
            self.configure_pll(PllPreset::for_standard(&detection.standard))?;
        }

        Ok(())
    }

    /// Detect video standard by the decoder, then apply it.
    pub fn detect_video(
        &self,
        decoder: &mut dyn VideoDecoder,
        configure_pll: bool,
    ) -> Result<Detection, Error> {
        let detection = decoder.detect(self.sleeper())?;
        self.apply_video_detection(&detection, configure_pll)?;
        Ok(detection)
    }
}
