// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

use {
    std::{
        fs::{File, OpenOptions},
        io::{Read, Write},
        os::unix::io::AsRawFd,
    },
    tracing::debug,
    z3_board_protocols::*,
};

// I2C_SLAVE in linux/i2c-dev.h.
nix::ioctl_write_int_bad!(i2c_set_slave, 0x0703);

/// The device in I2C bus, accessed by i2c-dev.
pub struct I2cDevice {
    file: File,
    addr: u16,
}

impl I2cDevice {
    pub fn open(path: &str, addr: u16) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                let msg = format!("Fail to open {}: {}", path, e);
                Error::new(ErrorKind::NoDevice, &msg)
            })?;

        unsafe { i2c_set_slave(file.as_raw_fd(), addr as libc::c_int) }.map_err(|e| {
            let msg = format!("Fail to select 0x{:02x} in {}: {}", addr, path, e);
            Error::new(ErrorKind::NoDevice, &msg)
        })?;

        debug!(path, addr, "I2C device");

        Ok(Self { file, addr })
    }

    fn io_error(&self, op: &str, offset: u8, e: std::io::Error) -> Error {
        let msg = format!("I2C {} at 0x{:02x}:0x{:02x}: {}", op, self.addr, offset, e);
        Error::new(ErrorKind::IoFailure, &msg)
    }
}

impl RegisterBus for I2cDevice {
    fn write_register(&mut self, offset: u8, value: u8) -> Result<(), Error> {
        self.file
            .write_all(&[offset, value])
            .map_err(|e| self.io_error("write", offset, e))
    }

    fn read_registers(&mut self, offset: u8, values: &mut [u8]) -> Result<(), Error> {
        self.file
            .write_all(&[offset])
            .map_err(|e| self.io_error("write", offset, e))?;
        self.file
            .read_exact(values)
            .map_err(|e| self.io_error("read", offset, e))
    }
}
