// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2020 Takashi Sakamoto
// Copyright (c) 2026 z3-board-ctl-services contributors

use {
    glib::{source, ControlFlow, MainContext, MainLoop, Source},
    nix::sys::signal,
    std::{
        sync::{Arc, Condvar, Mutex, PoisonError},
        thread,
        time::Duration,
    },
    tracing::warn,
    z3_board_protocols::{Error, ErrorKind, Sleeper},
};

/// The sleeper to be interrupted from the other thread, typically by the handler of signal.
/// Once interrupted, any subsequent sleep fails immediately.
#[derive(Default, Debug, Clone)]
pub struct InterruptibleSleeper(Arc<(Mutex<bool>, Condvar)>);

impl InterruptibleSleeper {
    pub fn interrupt(&self) {
        let (interrupted, cond) = &*self.0;
        if let Ok(mut interrupted) = interrupted.lock() {
            *interrupted = true;
        }
        cond.notify_all();
    }

    pub fn is_interrupted(&self) -> bool {
        let (interrupted, _) = &*self.0;
        interrupted.lock().map(|flag| *flag).unwrap_or(true)
    }
}

fn poisoned<T>(_: PoisonError<T>) -> Error {
    Error::new(ErrorKind::IoFailure, "Interruption state is poisoned")
}

impl Sleeper for InterruptibleSleeper {
    fn sleep(&self, duration: Duration) -> Result<(), Error> {
        let (interrupted, cond) = &*self.0;
        let guard = interrupted.lock().map_err(poisoned)?;
        let (guard, _) = cond
            .wait_timeout_while(guard, duration, |interrupted| !*interrupted)
            .map_err(poisoned)?;

        if *guard {
            Err(Error::new(ErrorKind::Cancelled, "Interrupted by signal"))
        } else {
            Ok(())
        }
    }
}

pub struct Dispatcher {
    name: String,
    th: Option<thread::JoinHandle<()>>,
    ev_loop: Arc<MainLoop>,
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.ev_loop.quit();

        if let Some(th) = self.th.take() {
            if th.join().is_err() {
                warn!(name = %self.name, "Fail to join thread");
            }
        }
    }
}

impl Dispatcher {
    pub fn run(name: String) -> Result<Dispatcher, Error> {
        // Use own context.
        let ctx = MainContext::new();
        let ev_loop = Arc::new(MainLoop::new(Some(&ctx), false));

        // launch one thread to dispatch all events.
        let l = ev_loop.clone();
        let th = thread::Builder::new()
            .name(name.clone())
            .spawn(move || l.run())
            .map_err(|e| {
                let msg = format!("Fail to launch thread for {}: {}", name, e);
                Error::new(ErrorKind::NoDevice, &msg)
            })?;

        // The loop runs soon after the thread starts.
        while !ev_loop.is_running() {
            thread::sleep(Duration::from_millis(10));
        }

        let th = Some(th);
        Ok(Dispatcher { name, th, ev_loop })
    }

    pub fn stop(&mut self) {
        self.ev_loop.quit();
    }

    pub fn is_running(&self) -> bool {
        self.ev_loop.is_running()
    }

    fn attach_src_to_ctx(&mut self, src: &Source) {
        let ctx = self.ev_loop.context();
        src.attach(Some(&ctx));
    }

    pub fn attach_signal_handler<F>(&mut self, signum: signal::Signal, cb: F)
    where
        F: FnMut() -> ControlFlow + Send + 'static,
    {
        let src =
            source::unix_signal_source_new(signum as i32, None, source::Priority::DEFAULT_IDLE, cb);

        self.attach_src_to_ctx(&src);
    }

    pub fn attach_interval_handler<F>(&mut self, interval: Duration, cb: F)
    where
        F: FnMut() -> ControlFlow + Send + 'static,
    {
        let src = source::timeout_source_new(interval, None, source::Priority::DEFAULT_IDLE, cb);

        self.attach_src_to_ctx(&src);
    }
}
