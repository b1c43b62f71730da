// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

use {
    std::{
        fs::{File, OpenOptions},
        os::unix::io::AsRawFd,
    },
    tracing::debug,
    z3_board_protocols::*,
};

const SPI_IOC_MAGIC: u8 = b'k';

// struct spi_ioc_transfer in linux/spi/spidev.h.
#[repr(C)]
#[derive(Default, Debug, Copy, Clone)]
pub struct SpiIocTransfer {
    tx_buf: u64,
    rx_buf: u64,
    len: u32,
    speed_hz: u32,
    delay_usecs: u16,
    bits_per_word: u8,
    cs_change: u8,
    tx_nbits: u8,
    rx_nbits: u8,
    word_delay_usecs: u8,
    pad: u8,
}

nix::ioctl_write_buf!(spi_message, SPI_IOC_MAGIC, 0, SpiIocTransfer);
nix::ioctl_write_ptr!(spi_write_mode, SPI_IOC_MAGIC, 1, u8);
nix::ioctl_write_ptr!(spi_write_bits_per_word, SPI_IOC_MAGIC, 3, u8);
nix::ioctl_write_ptr!(spi_write_max_speed_hz, SPI_IOC_MAGIC, 4, u32);

/// The device in SPI bus, accessed by spidev with 16 bit word.
pub struct SpiDevice {
    file: File,
}

impl SpiDevice {
    const MODE: u8 = 0;
    const BITS_PER_WORD: u8 = 16;
    const SPEED_HZ: u32 = 1_000_000;

    pub fn open(path: &str) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| {
                let msg = format!("Fail to open {}: {}", path, e);
                Error::new(ErrorKind::NoDevice, &msg)
            })?;

        let fd = file.as_raw_fd();
        unsafe {
            spi_write_mode(fd, &Self::MODE)
                .and_then(|_| spi_write_bits_per_word(fd, &Self::BITS_PER_WORD))
                .and_then(|_| spi_write_max_speed_hz(fd, &Self::SPEED_HZ))
        }
        .map_err(|e| {
            let msg = format!("Fail to configure {}: {}", path, e);
            Error::new(ErrorKind::NoDevice, &msg)
        })?;

        debug!(path, speed_hz = Self::SPEED_HZ, "SPI device");

        Ok(Self { file })
    }
}

impl WordTransfer for SpiDevice {
    fn transfer(&mut self, tx: &[u16], rx: &mut [u16]) -> Result<(), Error> {
        if tx.len() != rx.len() {
            let msg = format!("Mismatched length of words: {} {}", tx.len(), rx.len());
            return Err(Error::new(ErrorKind::InvalidInput, &msg));
        }

        let xfer = SpiIocTransfer {
            tx_buf: tx.as_ptr() as u64,
            rx_buf: rx.as_mut_ptr() as u64,
            len: (tx.len() * std::mem::size_of::<u16>()) as u32,
            speed_hz: Self::SPEED_HZ,
            bits_per_word: Self::BITS_PER_WORD,
            ..Default::default()
        };

        // The buffers live till the ioctl returns.
        unsafe { spi_message(self.file.as_raw_fd(), &[xfer]) }
            .map(|_| ())
            .map_err(|e| {
                let msg = format!("SPI transfer failed: {}", e);
                Error::new(ErrorKind::IoFailure, &msg)
            })
    }
}
