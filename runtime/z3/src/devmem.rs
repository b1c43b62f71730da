// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

use {
    memmap2::{MmapOptions, MmapRaw},
    std::fs::{File, OpenOptions},
    z3_board_protocols::*,
};

fn open_mem_device(path: &str) -> Result<File, Error> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| {
            let msg = format!("Fail to open {}: {}", path, e);
            Error::new(ErrorKind::NoDevice, &msg)
        })
}

fn map_region(file: &File, path: &str, base: u64, size: usize) -> Result<MmapRaw, Error> {
    MmapOptions::new()
        .offset(base)
        .len(size)
        .map_raw(file)
        .map_err(|e| {
            let msg = format!(
                "Fail to map 0x{:08x}-0x{:08x} in {}: {}",
                base,
                base + size as u64,
                path,
                e
            );
            Error::new(ErrorKind::NoDevice, &msg)
        })
}

/// The window of 16 bit registers mapped from physical memory.
pub struct MemWindow {
    mmap: MmapRaw,
    size: usize,
}

impl MemWindow {
    pub fn open(path: &str, base: u64, size: usize) -> Result<Self, Error> {
        let file = open_mem_device(path)?;
        let mmap = map_region(&file, path, base, size)?;
        Ok(Self { mmap, size })
    }
}

impl RegisterWindow for MemWindow {
    fn size(&self) -> usize {
        self.size
    }

    fn read(&self, offset: usize) -> Result<u16, Error> {
        check_window_offset(offset, self.size)?;
        // The offset is aligned and inside of the mapping.
        let val = unsafe { (self.mmap.as_ptr().add(offset) as *const u16).read_volatile() };
        Ok(val)
    }

    fn write(&mut self, offset: usize, value: u16) -> Result<(), Error> {
        check_window_offset(offset, self.size)?;
        unsafe { (self.mmap.as_mut_ptr().add(offset) as *mut u16).write_volatile(value) };
        Ok(())
    }
}

/// The free running counter of 32 bit mapped from physical memory.
pub struct MemCounter {
    mmap: MmapRaw,
}

impl MemCounter {
    pub fn open(path: &str, addr: u64) -> Result<Self, Error> {
        if addr % 4 > 0 {
            let msg = format!("Counter at 0x{:08x} is not aligned", addr);
            return Err(Error::new(ErrorKind::OutOfRange, &msg));
        }
        let file = open_mem_device(path)?;
        let mmap = map_region(&file, path, addr, 4)?;
        Ok(Self { mmap })
    }
}

impl FreeRunningCounter for MemCounter {
    fn read(&self) -> Option<u32> {
        let val = unsafe { (self.mmap.as_ptr() as *const u32).read_volatile() };
        Some(val)
    }
}
