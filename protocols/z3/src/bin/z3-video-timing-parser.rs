// SPDX-License-Identifier: LGPL-3.0-or-later
// Copyright (c) 2026 z3-board-ctl-services contributors

use z3_board_protocols::{
    pll::PllPreset,
    video::{adv9880, gv7601, VideoStandard, VideoTimingMeasurement},
};

fn parse_integer(arg: &str, name: &str) -> Result<u32, String> {
    let res = match arg.strip_prefix("0x") {
        Some(digits) => u32::from_str_radix(digits, 16),
        None => arg.parse::<u32>(),
    };
    res.map_err(|e| format!("Invalid argument for {}: {}, {}", name, arg, e))
}

fn parse_args(args: &[String]) -> Result<(String, VideoTimingMeasurement), String> {
    if args.len() < 4 {
        return Err("At least four arguments are required".to_string());
    }

    let decoder = args[0].to_lowercase();

    let lines = parse_integer(&args[1], "LINES")?;
    if lines > u16::MAX as u32 {
        return Err(format!("LINES too large: {}", lines));
    }
    let words = parse_integer(&args[2], "WORDS")?;
    let interlaced = match args[3].as_str() {
        "i" | "interlaced" | "1" => true,
        "p" | "progressive" | "0" => false,
        arg => Err(format!("Invalid argument for SCAN: {}", arg))?,
    };

    let fps_1000 = match args.get(4) {
        Some(arg) if decoder == "adv9880" => {
            let vid = parse_integer(arg, "VID")?;
            if vid > u8::MAX as u32 {
                return Err(format!("VID too large: {}", vid));
            }
            adv9880::cea861_fps_1000(vid as u8)
        }
        Some(arg) => Err(format!("Unexpected argument: {}", arg))?,
        None => 0,
    };

    let measurement = VideoTimingMeasurement {
        lines_per_frame: lines as u16,
        words_per_line: words,
        interlaced,
        fps_1000,
    };

    Ok((decoder, measurement))
}

fn classify(decoder: &str, measurement: &VideoTimingMeasurement) -> Result<VideoStandard, String> {
    let standard = match decoder {
        "adv9880" => adv9880::classify(measurement),
        "gv7601" => gv7601::classify(measurement),
        _ => Err(format!("Unsupported decoder: {}", decoder))?,
    };
    standard.ok_or_else(|| format!("Unrecognized: {:?}", measurement))
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let code = parse_args(&args)
        .and_then(|(decoder, measurement)| classify(&decoder, &measurement))
        .map(|standard| {
            println!("standard: {}", standard);
            let (num, denom) = standard.frame_period();
            println!("  frame period: {}/{} sec", num, denom);
            println!("  frame lines: {}", standard.frame_lines());
            println!("  interlaced: {}", standard.is_interlaced());
            println!("  pll preset: {}", PllPreset::for_standard(&standard).label());
            0
        })
        .unwrap_or_else(|msg| {
            eprintln!("{}", msg);
            print_help();
            1
        });

    std::process::exit(code)
}

fn print_help() {
    print!(
        r###"
Usage:
  z3-video-timing-parser DECODER LINES WORDS SCAN [VID]

  where:
    DECODER:    The name of decoder, 'adv9880' or 'gv7601'.
    LINES:      The number of lines per frame measured by the decoder.
    WORDS:      The number of words per line, or the number of 27 MHz clocks per line for
                'adv9880'.
    SCAN:       'i' for interlaced, 'p' for progressive.
    VID:        The video identification code in AVI InfoFrame, only for 'adv9880'.
"###
    );
}
