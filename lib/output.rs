//! Plain-text output.
//!
//! - Samples: one sample per line, site 0 first, outcomes separated by single
//!   spaces (e.g. `0 1 1 0`).
//! - Amplitudes: one amplitude per line in configuration order, written as the
//!   real part with ten decimal places followed by a zero imaginary part
//!   (e.g. `-0.7071067812 0.0000000000`). Two files are written: one with
//!   signed amplitudes and one with their moduli.
//! - Observables: `S2S3: <value>` and `H: <value>` with twenty decimal places.

use std::{
    fs,
    io::{ BufWriter, Write },
    path::{ Path, PathBuf },
};
use log::info;
use thiserror::Error;
use crate::sampler::Sample;

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
pub type OutputResult<T> = Result<T, OutputError>;

/// Write one sample per line.
pub fn write_samples<W>(out: &mut W, samples: &[Sample]) -> OutputResult<()>
where W: Write
{
    for sample in samples.iter() {
        writeln!(out, "{sample}")?;
    }
    Ok(())
}

/// Write one amplitude per line.
pub fn write_amplitudes<W>(out: &mut W, amps: &[f64]) -> OutputResult<()>
where W: Write
{
    for a in amps.iter() {
        writeln!(out, "{a:.10} 0.0000000000")?;
    }
    Ok(())
}

/// Write the exact values of the `S2S3` correlator and the energy.
pub fn write_observables<W>(out: &mut W, s2s3: f64, energy: f64)
    -> OutputResult<()>
where W: Write
{
    writeln!(out, "S2S3: {s2s3:.20}")?;
    writeln!(out, "H: {energy:.20}")?;
    Ok(())
}

/// A directory holding the output files of a run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputDir {
    path: PathBuf,
}

impl OutputDir {
    pub const SAMPLES: &'static str = "Samples.txt";
    pub const AMPLITUDES: &'static str = "Amplitudes.txt";
    pub const AMPLITUDES_UNSIGNED: &'static str = "AmplitudesP.txt";
    pub const OBSERVABLES: &'static str = "Observables.txt";

    /// Use `path` as the output directory, creating it if it doesn't exist.
    pub fn new<P>(path: P) -> OutputResult<Self>
    where P: AsRef<Path>
    {
        let path = path.as_ref().to_path_buf();
        fs::create_dir_all(&path)?;
        Ok(Self { path })
    }

    fn create(&self, name: &str) -> OutputResult<BufWriter<fs::File>> {
        info!(file = name; "writing output");
        Ok(BufWriter::new(fs::File::create(self.path.join(name))?))
    }

    /// Write samples to `Samples.txt`.
    pub fn write_samples(&self, samples: &[Sample]) -> OutputResult<()> {
        let mut out = self.create(Self::SAMPLES)?;
        write_samples(&mut out, samples)?;
        out.flush()?;
        Ok(())
    }

    /// Write signed amplitudes to `Amplitudes.txt` and their moduli to
    /// `AmplitudesP.txt`.
    pub fn write_amplitudes(&self, signed: &[f64], unsigned: &[f64])
        -> OutputResult<()>
    {
        let mut out = self.create(Self::AMPLITUDES)?;
        write_amplitudes(&mut out, signed)?;
        out.flush()?;
        let mut out = self.create(Self::AMPLITUDES_UNSIGNED)?;
        write_amplitudes(&mut out, unsigned)?;
        out.flush()?;
        Ok(())
    }

    /// Write observables to `Observables.txt`.
    pub fn write_observables(&self, s2s3: f64, energy: f64) -> OutputResult<()> {
        let mut out = self.create(Self::OBSERVABLES)?;
        write_observables(&mut out, s2s3, energy)?;
        out.flush()?;
        Ok(())
    }
}
