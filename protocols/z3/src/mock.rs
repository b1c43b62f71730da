// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Doubles of hardware for tests.

use {
    super::*,
    std::{
        cell::RefCell,
        collections::{HashMap, VecDeque},
        sync::{Arc, Mutex},
    },
};

/// The register window backed by memory. Queued values are returned by read operations in
/// order, then the last value is kept.
#[derive(Debug)]
pub struct MemoryWindow {
    size: usize,
    regs: RefCell<HashMap<usize, VecDeque<u16>>>,
    pub writes: Vec<(usize, u16)>,
}

impl MemoryWindow {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            regs: Default::default(),
            writes: Default::default(),
        }
    }

    pub fn queue(&mut self, offset: usize, values: &[u16]) {
        self.regs
            .borrow_mut()
            .entry(offset)
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn set(&mut self, offset: usize, value: u16) {
        let mut regs = self.regs.borrow_mut();
        let entry = regs.entry(offset).or_default();
        entry.clear();
        entry.push_back(value);
    }

    pub fn last_write(&self, offset: usize) -> Option<u16> {
        self.writes
            .iter()
            .rev()
            .find(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
    }
}

impl RegisterWindow for MemoryWindow {
    fn size(&self) -> usize {
        self.size
    }

    fn read(&self, offset: usize) -> Result<u16, Error> {
        check_window_offset(offset, self.size)?;
        let mut regs = self.regs.borrow_mut();
        let val = match regs.get_mut(&offset) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().copied().unwrap_or_default(),
            None => 0,
        };
        Ok(val)
    }

    fn write(&mut self, offset: usize, value: u16) -> Result<(), Error> {
        check_window_offset(offset, self.size)?;
        self.writes.push((offset, value));
        Ok(())
    }
}

/// The device in byte-oriented bus. The write to register is reflected to read.
#[derive(Default, Debug)]
pub struct MockBus {
    regs: HashMap<u8, VecDeque<u8>>,
    failures: HashMap<u8, usize>,
    pub writes: Vec<(u8, u8)>,
    pub attempts: usize,
}

impl MockBus {
    pub fn queue(&mut self, offset: u8, values: &[u8]) {
        self.regs
            .entry(offset)
            .or_default()
            .extend(values.iter().copied());
    }

    pub fn set(&mut self, offset: u8, value: u8) {
        let entry = self.regs.entry(offset).or_default();
        entry.clear();
        entry.push_back(value);
    }

    /// Any transaction at the offset fails for the count.
    pub fn fail(&mut self, offset: u8, count: usize) {
        self.failures.insert(offset, count);
    }

    pub fn last_write(&self, offset: u8) -> Option<u8> {
        self.writes
            .iter()
            .rev()
            .find(|(o, _)| *o == offset)
            .map(|(_, v)| *v)
    }

    fn check_failure(&mut self, offset: u8) -> Result<(), Error> {
        self.attempts += 1;
        match self.failures.get_mut(&offset) {
            Some(count) if *count > 0 => {
                *count -= 1;
                Err(Error::new(ErrorKind::IoFailure, "nack"))
            }
            _ => Ok(()),
        }
    }
}

impl RegisterBus for MockBus {
    fn write_register(&mut self, offset: u8, value: u8) -> Result<(), Error> {
        self.check_failure(offset)?;
        self.writes.push((offset, value));
        self.set(offset, value);
        Ok(())
    }

    fn read_registers(&mut self, offset: u8, values: &mut [u8]) -> Result<(), Error> {
        self.check_failure(offset)?;
        values.iter_mut().enumerate().for_each(|(i, v)| {
            let pos = offset.wrapping_add(i as u8);
            *v = match self.regs.get_mut(&pos) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
                Some(queue) => queue.front().copied().unwrap_or_default(),
                None => 0,
            };
        });
        Ok(())
    }
}

/// The device with registers of 16 bit word, accessed by command word in the first word of
/// transfer.
#[derive(Default, Debug)]
pub struct MockWordDevice {
    regs: HashMap<u16, u16>,
    pub writes: Vec<(u16, u16)>,
    pub transfers: usize,
}

impl MockWordDevice {
    pub fn set(&mut self, offset: u16, value: u16) {
        self.regs.insert(offset, value);
    }

    pub fn get(&self, offset: u16) -> u16 {
        self.regs.get(&offset).copied().unwrap_or_default()
    }
}

impl WordTransfer for MockWordDevice {
    fn transfer(&mut self, tx: &[u16], rx: &mut [u16]) -> Result<(), Error> {
        self.transfers += 1;
        let cmd = tx[0];
        let offset = cmd & 0x0fff;
        if cmd & 0x8000 > 0 {
            rx[0] = 0;
            rx[1..].iter_mut().enumerate().for_each(|(i, w)| {
                *w = self.get(offset + i as u16);
            });
        } else {
            tx[1..].iter().enumerate().for_each(|(i, &w)| {
                self.regs.insert(offset + i as u16, w);
                self.writes.push((offset + i as u16, w));
            });
        }
        Ok(())
    }
}

/// The sleeper to record requested durations. It can be configured to be interrupted.
#[derive(Default, Debug)]
pub struct RecordingSleeper {
    durations: Mutex<Vec<Duration>>,
    cancel_at: Option<usize>,
}

impl RecordingSleeper {
    /// The sleep is interrupted at the given count of call, starting from zero.
    pub fn cancelled_at(count: usize) -> Self {
        Self {
            durations: Default::default(),
            cancel_at: Some(count),
        }
    }

    pub fn durations(&self) -> Vec<Duration> {
        self.durations
            .lock()
            .map(|durations| durations.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.durations().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Error> {
        let mut durations = self.durations.lock().unwrap();
        let count = durations.len();
        durations.push(duration);
        if self.cancel_at == Some(count) {
            Err(Error::new(ErrorKind::Cancelled, "interrupted"))
        } else {
            Ok(())
        }
    }
}

/// The double shared with test body after it is moved to the code under test.
#[derive(Debug)]
pub struct Shared<T>(pub Arc<Mutex<T>>);

impl<T> Shared<T> {
    pub fn new(inner: T) -> (Self, Arc<Mutex<T>>) {
        let inner = Arc::new(Mutex::new(inner));
        (Self(inner.clone()), inner)
    }
}

impl<T: RegisterWindow> RegisterWindow for Shared<T> {
    fn size(&self) -> usize {
        self.0.lock().unwrap().size()
    }

    fn read(&self, offset: usize) -> Result<u16, Error> {
        self.0.lock().unwrap().read(offset)
    }

    fn write(&mut self, offset: usize, value: u16) -> Result<(), Error> {
        self.0.lock().unwrap().write(offset, value)
    }
}

impl<T: RegisterBus> RegisterBus for Shared<T> {
    fn write_register(&mut self, offset: u8, value: u8) -> Result<(), Error> {
        self.0.lock().unwrap().write_register(offset, value)
    }

    fn read_registers(&mut self, offset: u8, values: &mut [u8]) -> Result<(), Error> {
        self.0.lock().unwrap().read_registers(offset, values)
    }
}

/// The controller with doubles of peripherals, for the board.
pub struct Fixture {
    pub controller: crate::controller::Z3Controller,
    pub latch: Arc<Mutex<MemoryWindow>>,
    pub fpga: Arc<Mutex<MemoryWindow>>,
    pub pll: Arc<Mutex<MockBus>>,
}

pub fn fixture(board: crate::board::BoardId) -> Fixture {
    use crate::{controller::*, fpga::FPGA_WINDOW_SIZE, latch::LATCH_WINDOW_SIZE};

    let (latch_window, latch) = Shared::new(MemoryWindow::new(LATCH_WINDOW_SIZE));
    let (fpga_window, fpga) = Shared::new(MemoryWindow::new(FPGA_WINDOW_SIZE));
    let (pll_bus, pll) = Shared::new(MockBus::default());

    let controller = Z3Controller::new(Peripherals {
        latch: Box::new(latch_window),
        fpga: Some(Box::new(fpga_window)),
        pll: Some(Box::new(pll_bus)),
        stc0: None,
        gptimer: None,
        sleeper: Box::new(RecordingSleeper::default()),
        dm814x: false,
    });
    controller.set_board_id(board).unwrap();

    Fixture {
        controller,
        latch,
        fpga,
        pll,
    }
}
