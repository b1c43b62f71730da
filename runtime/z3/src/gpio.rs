// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

use {
    std::{fs, path::PathBuf},
    z3_board_protocols::{board::BoardIdInput, *},
};

/// The GPIO line in sysfs, wired to the identifier of board.
pub struct SysfsGpio {
    value: PathBuf,
}

impl SysfsGpio {
    const SYSFS_GPIO: &'static str = "/sys/class/gpio";

    pub fn open(line: u32) -> Result<Self, Error> {
        let dir = PathBuf::from(Self::SYSFS_GPIO).join(format!("gpio{}", line));

        if !dir.exists() {
            fs::write(PathBuf::from(Self::SYSFS_GPIO).join("export"), line.to_string())
                .map_err(|e| {
                    let msg = format!("Fail to export GPIO {}: {}", line, e);
                    Error::new(ErrorKind::NoDevice, &msg)
                })?;
        }

        fs::write(dir.join("direction"), "in").map_err(|e| {
            let msg = format!("Fail to configure GPIO {} as input: {}", line, e);
            Error::new(ErrorKind::NoDevice, &msg)
        })?;

        Ok(Self {
            value: dir.join("value"),
        })
    }
}

impl BoardIdInput for SysfsGpio {
    fn read_level(&mut self) -> Result<bool, Error> {
        fs::read_to_string(&self.value)
            .map(|text| text.trim() == "1")
            .map_err(|e| {
                let msg = format!("Fail to read {}: {}", self.value.display(), e);
                Error::new(ErrorKind::IoFailure, &msg)
            })
    }
}
