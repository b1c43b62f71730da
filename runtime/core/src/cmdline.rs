// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (c) 2022 Takashi Sakamoto
// Copyright (c) 2026 z3-board-ctl-services contributors

use {
    super::{LogLevel, RuntimeOperation},
    clap::Parser,
    z3_board_protocols::{Error, ErrorKind},
};

pub trait ServiceCmd<A, T, R>: Sized
where
    A: Parser,
    R: RuntimeOperation<T>,
{
    fn params(args: &A) -> (T, Option<LogLevel>);

    fn run() {
        let code = A::try_parse()
            .map_err(|err| err.to_string())
            .map(|args| Self::params(&args))
            .and_then(|(params, log_level)| {
                R::new(params, log_level)
                    .and_then(|mut runtime| {
                        runtime.listen()?;
                        runtime.run()?;
                        Ok(libc::EXIT_SUCCESS)
                    })
                    .map_err(|err| specific_err_to_string(&err))
            })
            .unwrap_or_else(|msg| {
                eprintln!("{}", msg);
                libc::EXIT_FAILURE
            });

        std::process::exit(code)
    }
}

fn specific_err_to_string(e: &Error) -> String {
    let (domain, cause) = match e.kind() {
        ErrorKind::NoDevice => ("Linux file operation error", "Device is not available"),
        ErrorKind::OutOfRange => ("Register access error", "Offset is out of window"),
        ErrorKind::IoFailure => ("Bus transaction error", "Transaction failed"),
        ErrorKind::NoSignal => ("Video decoder error", "No signal detected"),
        ErrorKind::FormatUnrecognized => ("Video decoder error", "Standard unrecognized"),
        ErrorKind::InvalidInput => ("Control operation error", "Invalid value"),
        ErrorKind::Cancelled => ("Runtime error", "Interrupted"),
    };
    format!("{}: {}, {}", domain, cause, e)
}
