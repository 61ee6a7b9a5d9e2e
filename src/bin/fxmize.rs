//! fxmize — convert a `.xm` file into a compact fxm image on stdout.
//!
//! Usage:
//!   fxmize song.xm > song.fxm
//!   fxmize --delta-samples song.xm > song.fxm
//!   fxmize --zero-all-waveforms song.xm > template.fxm

use std::io::Write;
use std::{env, fs, process};

use femtoxm::{dump_fxm, load_xm, DumpOptions};

fn main() {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut options = DumpOptions::default();
    let mut path = None;
    for arg in &args {
        match arg.as_str() {
            "--delta-samples" => options.delta_samples = true,
            "--zero-all-waveforms" => options.zero_waveforms = true,
            other if !other.starts_with("--") => path = Some(other),
            other => {
                eprintln!("unknown option {other}");
                process::exit(1);
            }
        }
    }
    let Some(path) = path else {
        eprintln!("Usage: fxmize [--delta-samples] [--zero-all-waveforms] <file.xm>");
        process::exit(1);
    };

    let data = fs::read(path).unwrap_or_else(|e| {
        eprintln!("failed to read {path}: {e}");
        process::exit(1);
    });
    let module = load_xm(&data).unwrap_or_else(|e| {
        eprintln!("failed to parse {path}: {e}");
        process::exit(1);
    });

    eprintln!("Name:        {}", module.name);
    eprintln!("Tracker:     {}", module.tracker_name);
    eprintln!("Channels:    {}", module.num_channels);
    eprintln!("Patterns:    {}", module.patterns.len());
    eprintln!("Instruments: {}", module.instruments.len());
    eprintln!("Samples:     {}", module.samples.len());

    let image = dump_fxm(&module, options);
    eprintln!(
        "{} bytes in, {} bytes out ({:.1}%)",
        data.len(),
        image.len(),
        100.0 * image.len() as f64 / data.len() as f64
    );
    std::io::stdout().write_all(&image).unwrap_or_else(|e| {
        eprintln!("failed to write output: {e}");
        process::exit(1);
    });
}
