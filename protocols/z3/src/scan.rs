// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

//! Calibration of load capacitance for crystal of clock synthesizer.
//!
//! The load capacitance is swept from 0 to 20 pF by 2 pF, and the lock state of synthesizer is
//! sampled at each step. The locking region is assumed to be contiguous, thus the sweep stops at
//! the first unlock after any lock. Another locking region beyond the gap is not found.

use {
    super::{fpga::*, pll::*, *},
    std::{fmt, sync::Mutex, time::Duration},
    tracing::{debug, debug_span},
};

/// The trait for the target of calibration.
pub trait LoadCapacitanceTarget {
    /// Write the load capacitance in pF.
    fn write_load_capacitance(&mut self, load_pf: u8) -> Result<(), Error>;

    /// Whether the synthesizer locks or not.
    fn is_locked(&mut self) -> Result<bool, Error>;
}

/// The clock synthesizer and its lock detector in FPGA.
pub struct SynthesizerTarget<'a, B: RegisterBus + ?Sized, W: RegisterWindow + ?Sized> {
    pub bus: &'a mut B,
    pub window: &'a W,
    pub sleeper: &'a dyn Sleeper,
}

impl<'a, B, W> LoadCapacitanceTarget for SynthesizerTarget<'a, B, W>
where
    B: RegisterBus + ?Sized,
    W: RegisterWindow + ?Sized,
{
    fn write_load_capacitance(&mut self, load_pf: u8) -> Result<(), Error> {
        Cdce925Protocol::write_load_capacitance(&mut *self.bus, self.sleeper, load_pf)
    }

    fn is_locked(&mut self) -> Result<bool, Error> {
        FpgaProtocol::read_pll_lock(self.window)
    }
}

/// The range of load capacitance in which the synthesizer locks.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ScanResult {
    pub min_locking_value: Option<u8>,
    pub max_locking_value: Option<u8>,
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let to_int = |val: Option<u8>| val.map(|v| v as i32).unwrap_or(-1);
        write!(
            f,
            "{} {}",
            to_int(self.min_locking_value),
            to_int(self.max_locking_value)
        )
    }
}

#[derive(Debug, Default)]
struct ScanState {
    result: ScanResult,
    scanned: bool,
}

const SCAN_STEP: usize = 2;
const FIRST_SETTLE: Duration = Duration::from_millis(200);
const SETTLE: Duration = Duration::from_millis(100);

/// The scanner. Only one scan runs at once; the other request blocks till it finishes.
#[derive(Debug, Default)]
pub struct LoadCapacitanceScanner {
    state: Mutex<ScanState>,
}

impl LoadCapacitanceScanner {
    /// Sweep the load capacitance, then restore the configured value. The restore is performed
    /// even if the sweep fails or is interrupted.
    pub fn scan(
        &self,
        target: &mut dyn LoadCapacitanceTarget,
        sleeper: &dyn Sleeper,
        configured: u8,
    ) -> Result<ScanResult, Error> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| Error::new(ErrorKind::IoFailure, "Scanner state is poisoned"))?;

        let _enter = debug_span!("load-scan").entered();

        state.result = ScanResult::default();
        state.scanned = false;

        let mut io_error = None;
        let mut cancelled = None;

        for (i, load_pf) in (0..=LOAD_CAPACITANCE_MAX).step_by(SCAN_STEP).enumerate() {
            if let Err(err) = target.write_load_capacitance(load_pf) {
                io_error.get_or_insert(err);
            }

            let settle = if i == 0 { FIRST_SETTLE } else { SETTLE };
            if let Err(err) = sleeper.sleep(settle) {
                cancelled = Some(err);
                break;
            }

            let locked = target.is_locked().unwrap_or_else(|err| {
                io_error.get_or_insert(err);
                false
            });
            debug!(load_pf, locked, "lock sampled");

            if locked {
                state.result.min_locking_value.get_or_insert(load_pf);
                state.result.max_locking_value = Some(load_pf);
            } else if state.result.min_locking_value.is_some() {
                break;
            }
        }

        if let Err(err) = target.write_load_capacitance(configured) {
            io_error.get_or_insert(err);
        }
        let _ = sleeper.sleep(SETTLE);

        if let Some(err) = cancelled {
            return Err(err);
        }

        state.scanned = true;

        match io_error {
            Some(err) => {
                let msg = format!("Scan of load capacitance failed: {}", err);
                Err(Error::new(ErrorKind::IoFailure, &msg))
            }
            None => Ok(state.result),
        }
    }

    /// The result of last scan.
    pub fn last_result(&self) -> ScanResult {
        self.state
            .lock()
            .map(|state| state.result)
            .unwrap_or_default()
    }

    /// Whether any scan finished without interruption.
    pub fn is_scanned(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.scanned)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod test {
    use {super::*, crate::mock::*};

    struct LockRegion {
        range: std::ops::RangeInclusive<u8>,
        current: u8,
        writes: Vec<u8>,
        fail_write: bool,
    }

    impl LockRegion {
        fn new(range: std::ops::RangeInclusive<u8>, current: u8) -> Self {
            Self {
                range,
                current,
                writes: Vec::new(),
                fail_write: false,
            }
        }
    }

    impl LoadCapacitanceTarget for LockRegion {
        fn write_load_capacitance(&mut self, load_pf: u8) -> Result<(), Error> {
            self.writes.push(load_pf);
            if self.fail_write && load_pf == 4 {
                Err(Error::new(ErrorKind::IoFailure, "nack"))
            } else {
                self.current = load_pf;
                Ok(())
            }
        }

        fn is_locked(&mut self) -> Result<bool, Error> {
            Ok(self.range.contains(&self.current))
        }
    }

    #[test]
    fn contiguous_region() {
        let scanner = LoadCapacitanceScanner::default();
        let mut target = LockRegion::new(6..=14, 8);
        let sleeper = RecordingSleeper::default();

        let res = scanner.scan(&mut target, &sleeper, 8).unwrap();
        assert_eq!(res.min_locking_value, Some(6));
        assert_eq!(res.max_locking_value, Some(14));
        assert_eq!(res.to_string(), "6 14");
        assert_eq!(scanner.last_result(), res);
        assert!(scanner.is_scanned());

        // Stopped at 16 pF, then restored.
        assert_eq!(target.writes, vec![0, 2, 4, 6, 8, 10, 12, 14, 16, 8]);
        assert_eq!(target.current, 8);

        let durations = sleeper.durations();
        assert_eq!(durations[0], Duration::from_millis(200));
        assert!(durations[1..].iter().all(|&d| d == Duration::from_millis(100)));
    }

    #[test]
    fn second_region_missed() {
        struct TwoRegions(u8);

        impl LoadCapacitanceTarget for TwoRegions {
            fn write_load_capacitance(&mut self, load_pf: u8) -> Result<(), Error> {
                self.0 = load_pf;
                Ok(())
            }

            fn is_locked(&mut self) -> Result<bool, Error> {
                Ok((2..=4).contains(&self.0) || (10..=20).contains(&self.0))
            }
        }

        let scanner = LoadCapacitanceScanner::default();
        let sleeper = RecordingSleeper::default();
        let res = scanner.scan(&mut TwoRegions(6), &sleeper, 6).unwrap();
        assert_eq!(res.min_locking_value, Some(2));
        assert_eq!(res.max_locking_value, Some(4));
    }

    #[test]
    fn no_lock() {
        let scanner = LoadCapacitanceScanner::default();
        let mut target = LockRegion::new(1..=0, 6);
        let sleeper = RecordingSleeper::default();

        let res = scanner.scan(&mut target, &sleeper, 6).unwrap();
        assert_eq!(res, ScanResult::default());
        assert_eq!(res.to_string(), "-1 -1");
        assert_eq!(target.writes.len(), 12);
        assert_eq!(target.current, 6);
    }

    #[test]
    fn restored_after_failure() {
        let scanner = LoadCapacitanceScanner::default();
        let mut target = LockRegion::new(6..=14, 10);
        target.fail_write = true;
        let sleeper = RecordingSleeper::default();

        let err = scanner.scan(&mut target, &sleeper, 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(target.writes.last(), Some(&10));
        assert_eq!(target.current, 10);
    }

    #[test]
    fn restored_after_cancellation() {
        let scanner = LoadCapacitanceScanner::default();
        let mut target = LockRegion::new(6..=14, 12);
        let sleeper = RecordingSleeper::cancelled_at(2);

        let err = scanner.scan(&mut target, &sleeper, 12).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Cancelled);
        assert_eq!(target.writes, vec![0, 2, 4, 12]);
        assert_eq!(target.current, 12);
        assert!(!scanner.is_scanned());
    }

    struct SlowTarget<'a> {
        id: usize,
        current: u8,
        log: &'a Mutex<Vec<(usize, u8)>>,
    }

    impl LoadCapacitanceTarget for SlowTarget<'_> {
        fn write_load_capacitance(&mut self, load_pf: u8) -> Result<(), Error> {
            self.log.lock().unwrap().push((self.id, load_pf));
            self.current = load_pf;
            std::thread::sleep(Duration::from_millis(1));
            Ok(())
        }

        fn is_locked(&mut self) -> Result<bool, Error> {
            Ok((6..=14).contains(&self.current))
        }
    }

    #[test]
    fn concurrent_scans_serialized() {
        let scanner = LoadCapacitanceScanner::default();
        let log = Mutex::new(Vec::new());
        let configured = [8, 10];

        std::thread::scope(|s| {
            for (id, &load_pf) in configured.iter().enumerate() {
                let scanner = &scanner;
                let log = &log;
                s.spawn(move || {
                    let mut target = SlowTarget {
                        id,
                        current: load_pf,
                        log,
                    };
                    let sleeper = RecordingSleeper::default();
                    scanner.scan(&mut target, &sleeper, load_pf).unwrap()
                });
            }
        });

        // Each scan writes 0 to 16 pF, then restores.
        let log = log.into_inner().unwrap();
        assert_eq!(log.len(), 20);
        let (first, second) = log.split_at(10);
        let first_id = first[0].0;
        assert!(first.iter().all(|&(id, _)| id == first_id));
        assert!(second.iter().all(|&(id, _)| id != first_id));
        assert_eq!(first[9], (first_id, configured[first_id]));
        assert_eq!(second[0].1, 0);
        assert_eq!(second[9].1, configured[1 - first_id]);
    }

    #[test]
    fn synthesizer_target() {
        let mut bus = MockBus::default();
        let mut window = MemoryWindow::new(FPGA_WINDOW_SIZE);
        window.set(PLL_CTRL_OFFSET, 0x802a);
        let sleeper = RecordingSleeper::default();

        let mut target = SynthesizerTarget {
            bus: &mut bus,
            window: &window,
            sleeper: &sleeper,
        };
        target.write_load_capacitance(20).unwrap();
        assert_eq!(target.is_locked(), Ok(true));
        assert_eq!(bus.last_write(0x85), Some(160));
    }
}
