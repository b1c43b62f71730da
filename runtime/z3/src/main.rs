// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2021 Takashi Sakamoto
// Copyright (c) 2026 z3-board-ctl-services contributors
mod devmem;
mod gpio;
mod i2c;
mod spi;

use {
    clap::Parser,
    devmem::*,
    glib::ControlFlow,
    gpio::*,
    i2c::*,
    nix::sys::signal,
    protocols::{
        board::*,
        controller::*,
        ctl::*,
        fpga::*,
        latch::*,
        video::{adv9880::*, gv7601::*, *},
        *,
    },
    runtime_core::{cmdline::*, dispatcher::*, LogLevel, *},
    spi::*,
    std::{convert::TryFrom, sync::mpsc, time::Duration},
    tracing::{debug, debug_span, warn, Level},
    z3_board_protocols as protocols,
};

// The free running counters in the other hardware blocks of TI816x.
const TPPSS_STC0_27MHZ_ADDR: u64 = 0x4a080818;
const GPTIMER2_TCRR_ADDR: u64 = 0x4804003c;

enum Event {
    Shutdown,
    Timer,
}

struct Z3Runtime {
    controller: Z3Controller,
    decoders: Vec<Box<dyn VideoDecoder + Send>>,
    board_id_input: Option<SysfsGpio>,
    board_id: Option<u16>,
    detect_video: bool,
    commands: Vec<String>,
    monitor_interval: Option<Duration>,
    sleeper: InterruptibleSleeper,
    rx: mpsc::Receiver<Event>,
    tx: mpsc::SyncSender<Event>,
    dispatchers: Vec<Dispatcher>,
}

impl Drop for Z3Runtime {
    fn drop(&mut self) {
        // At first, stop all of dispatchers to avoid queueing new events.
        for dispatcher in &mut self.dispatchers {
            dispatcher.stop();
        }

        // Next, consume all events in queue to release blocked thread for sender.
        for _ in self.rx.try_iter() {}

        // Finally finish threads.
        self.dispatchers.clear();
    }
}

impl RuntimeOperation<Arguments> for Z3Runtime {
    fn new(args: Arguments, log_level: Option<LogLevel>) -> Result<Self, Error> {
        if let Some(level) = log_level {
            let fmt_level = match level {
                LogLevel::Debug => Level::DEBUG,
            };
            tracing_subscriber::fmt().with_max_level(fmt_level).init();
        }

        let latch = MemWindow::open(&args.mem_device, LATCH_BASE_ADDR, LATCH_WINDOW_SIZE)?;
        let fpga = MemWindow::open(&args.mem_device, FPGA_BASE_ADDR, FPGA_WINDOW_SIZE)
            .map_err(|err| warn!(error = %err, "FPGA window is not available"))
            .ok();

        let pll = I2cDevice::open(&args.i2c_bus, args.pll_addr)
            .map_err(|err| warn!(error = %err, "clock synthesizer is not available"))
            .ok();

        let (stc0, gptimer) = if args.aux_counters {
            let stc0 = MemCounter::open(&args.mem_device, TPPSS_STC0_27MHZ_ADDR)?;
            let gptimer = MemCounter::open(&args.mem_device, GPTIMER2_TCRR_ADDR)?;
            (
                Some(Box::new(stc0) as SharedCounter),
                Some(Box::new(gptimer) as SharedCounter),
            )
        } else {
            (None, None)
        };

        let sleeper = InterruptibleSleeper::default();

        let controller = Z3Controller::new(Peripherals {
            latch: Box::new(latch),
            fpga: fpga.map(|window| Box::new(window) as SharedWindow),
            pll: pll.map(|bus| Box::new(bus) as SharedBus),
            stc0,
            gptimer,
            sleeper: Box::new(sleeper.clone()),
            dm814x: args.dm814x,
        });

        let mut decoders: Vec<Box<dyn VideoDecoder + Send>> = Vec::new();
        if let Some(input) = args.adv9880_input {
            let bus = I2cDevice::open(&args.i2c_bus, args.adv9880_addr)?;
            decoders.push(Box::new(Adv9880::new(bus, input)));
        }
        if let Some(path) = &args.spi_device {
            let spi = SpiDevice::open(path)?;
            decoders.push(Box::new(Gv7601::new(spi)));
        }

        let board_id_input = args.board_id_gpio.map(SysfsGpio::open).transpose()?;

        // Use uni-directional channel for communication to child threads.
        let (tx, rx) = mpsc::sync_channel(32);

        Ok(Z3Runtime {
            controller,
            decoders,
            board_id_input,
            board_id: args.board_id,
            detect_video: args.detect_video,
            commands: args.commands,
            monitor_interval: args.monitor_ms.map(Duration::from_millis),
            sleeper,
            rx,
            tx,
            dispatchers: Vec::new(),
        })
    }

    fn listen(&mut self) -> Result<(), Error> {
        self.launch_system_event_dispatcher()?;

        let enter = debug_span!("board").entered();
        if let Some(val) = self.board_id {
            self.controller.set_board_id(BoardId::from(val))?;
        } else if let Some(input) = &mut self.board_id_input {
            self.controller.identify_board(input)?;
        }
        debug!(board = ?self.controller.board_id()?, "board");
        enter.exit();

        if self.detect_video {
            let enter = debug_span!("video").entered();
            self.detect_video_standard()?;
            enter.exit();
        }

        let enter = debug_span!("commands").entered();
        let commands = self.commands.clone();
        commands
            .iter()
            .try_for_each(|command| self.execute_command(command))?;
        enter.exit();

        if let Some(interval) = self.monitor_interval {
            self.start_interval_timer(interval)?;
        }

        Ok(())
    }

    fn run(&mut self) -> Result<(), Error> {
        if self.monitor_interval.is_none() {
            return Ok(());
        }

        let enter = debug_span!("event").entered();

        loop {
            let ev = match self.rx.recv() {
                Ok(ev) => ev,
                Err(_) => continue,
            };

            match ev {
                Event::Shutdown => break,
                Event::Timer => {
                    let _enter = debug_span!("timer").entered();
                    self.monitor();
                }
            }
        }

        enter.exit();

        Ok(())
    }
}

impl Z3Runtime {
    const SYSTEM_DISPATCHER_NAME: &'static str = "system event dispatcher";
    const TIMER_DISPATCHER_NAME: &'static str = "interval timer dispatcher";

    fn launch_system_event_dispatcher(&mut self) -> Result<(), Error> {
        let name = Self::SYSTEM_DISPATCHER_NAME.to_string();
        let mut dispatcher = Dispatcher::run(name)?;

        // Any wait in progress is cancelled as well.
        let tx = self.tx.clone();
        let sleeper = self.sleeper.clone();
        dispatcher.attach_signal_handler(signal::Signal::SIGINT, move || {
            sleeper.interrupt();
            let _ = tx.send(Event::Shutdown);
            ControlFlow::Break
        });

        self.dispatchers.push(dispatcher);

        Ok(())
    }

    fn start_interval_timer(&mut self, interval: Duration) -> Result<(), Error> {
        let mut dispatcher = Dispatcher::run(Self::TIMER_DISPATCHER_NAME.to_string())?;
        let tx = self.tx.clone();
        dispatcher.attach_interval_handler(interval, move || {
            let _ = tx.send(Event::Timer);
            ControlFlow::Continue
        });

        self.dispatchers.push(dispatcher);

        Ok(())
    }

    fn detect_video_standard(&mut self) -> Result<(), Error> {
        let mut last_err = None;
        for decoder in &mut self.decoders {
            match self.controller.detect_video(&mut **decoder, true) {
                Ok(detection) => {
                    println!("video: {}", detection.standard);
                    return Ok(());
                }
                Err(err) if err.is(ErrorKind::Cancelled) => return Err(err),
                Err(err) => {
                    warn!(error = %err, "video detection failed");
                    last_err = Some(err);
                }
            }
        }
        last_err.map_or(Ok(()), Err)
    }

    fn execute_command(&self, command: &str) -> Result<(), Error> {
        let text = CtlProtocol::execute(&self.controller, command)?;
        println!("{}: {}", command_name(command), text);
        Ok(())
    }

    fn monitor(&self) {
        monitored_knobs(&self.commands)
            .into_iter()
            .for_each(|knob| match CtlProtocol::read(&self.controller, knob) {
                Ok(text) => println!("{}: {}", knob.name(), text),
                Err(err) => warn!(knob = knob.name(), error = %err, "monitor failed"),
            });
    }
}

// NAME or NAME=VALUE.
fn command_name(command: &str) -> &str {
    command.split('=').next().unwrap_or(command).trim()
}

// Knobs without value are read repeatedly.
fn monitored_knobs(commands: &[String]) -> Vec<Knob> {
    commands
        .iter()
        .filter(|command| !command.contains('='))
        .filter_map(|command| Knob::from_name(command).ok())
        .collect()
}

fn parse_integer(text: &str) -> Result<u16, String> {
    parse_auto_radix(text)
        .map_err(|e| e.to_string())
        .and_then(|val| u16::try_from(val).map_err(|e| e.to_string()))
}

fn parse_adv9880_input(text: &str) -> Result<Adv9880Input, String> {
    Adv9880Input::parse(text).map_err(|e| e.to_string())
}

struct Z3ServiceCmd;

#[derive(Parser, Default, Clone)]
#[clap(name = "z3-board-ctl-service")]
struct Arguments {
    /// The path to special file for physical memory.
    #[clap(long, default_value = "/dev/mem")]
    mem_device: String,

    /// The path to special file for I2C bus to which the clock synthesizer and ADV9880 connect.
    #[clap(long, default_value = "/dev/i2c-1")]
    i2c_bus: String,

    /// The address of clock synthesizer in I2C bus.
    #[clap(long, default_value = "0x64", value_parser = parse_integer)]
    pll_addr: u16,

    /// The address of ADV9880 in I2C bus.
    #[clap(long, default_value = "0x4c", value_parser = parse_integer)]
    adv9880_addr: u16,

    /// The input of ADV9880, 'digital' or 'analog'. ADV9880 is not used unless given.
    #[clap(long, value_parser = parse_adv9880_input)]
    adv9880_input: Option<Adv9880Input>,

    /// The path to special file for spidev to which GV7601 connects.
    #[clap(long)]
    spi_device: Option<String>,

    /// The identifier of board, instead of identification.
    #[clap(long, value_parser = parse_integer)]
    board_id: Option<u16>,

    /// The number of GPIO line wired to the identifier of board.
    #[clap(long)]
    board_id_gpio: Option<u32>,

    /// The SoC is DM814x.
    #[clap(long)]
    dm814x: bool,

    /// Read free running counters in TI816x for STC.
    #[clap(long)]
    aux_counters: bool,

    /// Detect video standard and configure the clock synthesizer for it.
    #[clap(long)]
    detect_video: bool,

    /// The interval in milliseconds to read the knobs given without value.
    #[clap(long)]
    monitor_ms: Option<u64>,

    /// The level to debug runtime, disabled as a default.
    #[clap(long, short, value_enum)]
    log_level: Option<LogLevel>,

    /// The commands for knobs; NAME to read, NAME=VALUE to write.
    commands: Vec<String>,
}

impl ServiceCmd<Arguments, Arguments, Z3Runtime> for Z3ServiceCmd {
    fn params(args: &Arguments) -> (Arguments, Option<LogLevel>) {
        (args.clone(), args.log_level)
    }
}

fn main() {
    Z3ServiceCmd::run()
}
