//! Checks of sampled data against exact amplitudes.
//!
//! Two kinds of check are provided:
//! - [`frequency_check`] compares how often each configuration was sampled
//!   with its Born-rule probability, both configuration by configuration and
//!   through a χ² goodness-of-fit test;
//! - [`observable_check`] averages a *local estimator* of an observable over
//!   the samples and tracks the relative error against the exact value as more
//!   samples are included.
//!
//! The local estimator of an operator `O` on configuration `s` is
//!
//! ```text
//!   O_loc(s) = Σ_{s'} ⟨s|O|s'⟩ ψ(s') / ψ(s)
//! ```
//!
//! whose average over configurations drawn from |ψ(s)|² is ⟨ψ|O|ψ⟩. Here
//! amplitudes are taken to be real, as they are for the ground state of the
//! Heisenberg chain.

use std::{ fmt, str::FromStr };
use rustc_hash::{ FxHashMap as HashMap, FxHashSet as HashSet };
use statrs::distribution::{ ChiSquared, ContinuousCDF };
use thiserror::Error;
use crate::sampler::Sample;

#[derive(Debug, Error)]
pub enum VerifyError {
    /// Returned when a check is given no samples.
    #[error("no samples given")]
    EmptySamples,

    /// Returned when a sample or amplitude vector has the wrong size.
    #[error("size mismatch: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// Returned when a local estimator needs to divide by a zero amplitude.
    #[error("sampled configuration {0} has zero amplitude")]
    ZeroAmplitude(String),

    /// Returned when a configuration holds an outcome other than 0 or 1.
    #[error("invalid outcome {val} on site {site}")]
    InvalidOutcome { site: usize, val: u8 },

    /// Returned when an operator does not fit on the sampled chain.
    #[error("operator on site {site} does not fit a chain of {n} sites")]
    SiteOutOfRange { site: usize, n: usize },

    /// Returned when an unknown operator name is parsed.
    #[error("unknown operator {0:?}")]
    UnknownOperator(String),

    /// Returned when the expected value of an observable is zero, so that
    /// relative errors are undefined.
    #[error("expected value is zero")]
    ZeroExpected,

    #[error("statistics error: {0}")]
    Statistics(String),
}
use VerifyError::*;
pub type VerifyResult<T> = Result<T, VerifyError>;

/// Result of a [`frequency_check`].
#[derive(Clone, Debug, PartialEq)]
pub struct FrequencyReport {
    /// Every configuration as a bitstring, in amplitude order.
    pub configs: Vec<String>,
    /// Number of times each configuration was sampled.
    pub actual: Vec<usize>,
    /// Expected number of occurrences of each configuration, rounded down.
    pub expected: Vec<usize>,
    /// Total number of samples.
    pub num_samples: usize,
    /// Indices of configurations whose counts deviate from the expected number
    /// by more than the allowed number of standard deviations.
    pub outliers: Vec<usize>,
    /// χ² statistic over all configurations with an expected count of at least
    /// 5, with the remainder pooled into a single bin.
    pub chi2: f64,
    /// Degrees of freedom of the χ² test.
    pub dof: usize,
    /// Probability of a χ² statistic at least as large as `chi2`.
    pub p_value: f64,
}

impl FrequencyReport {
    /// Return `true` if no configuration is an outlier and the χ² test does
    /// not reject at significance level `alpha`.
    pub fn passes(&self, alpha: f64) -> bool {
        self.outliers.is_empty() && self.p_value >= alpha
    }
}

impl fmt::Display for FrequencyReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (k, config) in self.configs.iter().enumerate() {
            writeln!(f, "Number of occurrences of {}: {}", config, self.actual[k])?;
            writeln!(f, "Number of expected occurrences of {}: {}", config, self.expected[k])?;
            writeln!(f, "-------------------------------------------")?;
        }
        write!(f, "chi2 = {:.4} (dof = {}, p = {:.4})", self.chi2, self.dof, self.p_value)
    }
}

fn bitstring(index: usize, n: usize) -> String {
    (0..n).map(|k| if index >> (n - 1 - k) & 1 == 1 { '1' } else { '0' }).collect()
}

fn config_index(bits: &[u8]) -> usize {
    bits.iter().fold(0, |acc, b| (acc << 1) | usize::from(*b))
}

// number of sites implied by an amplitude vector of length `len`
fn num_sites(len: usize) -> VerifyResult<usize> {
    if len.is_power_of_two() {
        Ok(len.trailing_zeros() as usize)
    } else {
        Err(LengthMismatch { expected: len.next_power_of_two(), got: len })
    }
}

/// Compare the frequencies of sampled configurations with the Born-rule
/// probabilities `probs`, given in amplitude order.
///
/// A configuration with zero probability is an outlier if it was sampled at
/// all. Any other configuration is an outlier if its count deviates from `M p`
/// by more than `n_sigma` standard deviations `sqrt(M p (1 - p))`, with the
/// standard deviation floored at one count.
pub fn frequency_check(samples: &[Sample], probs: &[f64], n_sigma: f64)
    -> VerifyResult<FrequencyReport>
{
    if samples.is_empty() { return Err(EmptySamples); }
    let n = num_sites(probs.len())?;
    let num_samples = samples.len();
    let mut counts: HashMap<usize, usize> = HashMap::default();
    for sample in samples.iter() {
        if sample.n() != n {
            return Err(LengthMismatch { expected: n, got: sample.n() });
        }
        let k =
            sample.index()
            .ok_or(LengthMismatch { expected: n, got: sample.n() })?;
        *counts.entry(k).or_insert(0) += 1;
    }

    let m = num_samples as f64;
    let configs: Vec<String> =
        (0..probs.len()).map(|k| bitstring(k, n)).collect();
    let actual: Vec<usize> =
        (0..probs.len()).map(|k| counts.get(&k).copied().unwrap_or(0)).collect();
    let expected: Vec<usize> =
        probs.iter().map(|p| (m * p).floor() as usize).collect();
    let outliers: Vec<usize> =
        probs.iter().zip(&actual).enumerate()
        .filter(|(_, (p, c))| {
            if **p <= 0.0 {
                **c > 0
            } else {
                let sigma = (m * *p * (1.0 - *p)).sqrt().max(1.0);
                (**c as f64 - m * *p).abs() > n_sigma * sigma
            }
        })
        .map(|(k, _)| k)
        .collect();

    let mut chi2: f64 = 0.0;
    let mut bins: usize = 0;
    let mut pooled_obs: f64 = 0.0;
    let mut pooled_exp: f64 = 0.0;
    for (p, c) in probs.iter().zip(&actual) {
        let e = m * p;
        if e >= 5.0 {
            chi2 += (*c as f64 - e).powi(2) / e;
            bins += 1;
        } else {
            pooled_obs += *c as f64;
            pooled_exp += e;
        }
    }
    if pooled_exp >= 5.0 {
        chi2 += (pooled_obs - pooled_exp).powi(2) / pooled_exp;
        bins += 1;
    }
    let dof = bins.saturating_sub(1);
    let p_value =
        if dof == 0 {
            1.0
        } else {
            ChiSquared::new(dof as f64)
                .map_err(|e| Statistics(e.to_string()))?
                .sf(chi2)
        };

    Ok(FrequencyReport {
        configs,
        actual,
        expected,
        num_samples,
        outliers,
        chi2,
        dof,
        p_value,
    })
}

/// Two-site operators with a local estimator.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum LocalOp {
    /// S<sup>z</sup><sub>1</sub> S<sup>z</sup><sub>2</sub> on the second and
    /// third sites only.
    S2S3,
    /// Σ<sub>j</sub> S<sup>z</sup><sub>j</sub> S<sup>z</sup><sub>j+1</sub>
    SzSz,
    /// Σ<sub>j</sub> S<sup>+</sup><sub>j</sub> S<sup>-</sup><sub>j+1</sub>
    SpSm,
    /// Σ<sub>j</sub> S<sup>-</sup><sub>j</sub> S<sup>+</sup><sub>j+1</sub>
    SmSp,
}

impl LocalOp {
    /// Return the operator's name as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::S2S3 => "S2S3",
            Self::SzSz => "SzSz",
            Self::SpSm => "S+S-",
            Self::SmSp => "S-S+",
        }
    }
}

impl FromStr for LocalOp {
    type Err = VerifyError;

    fn from_str(s: &str) -> VerifyResult<Self> {
        match s {
            "S2S3" => Ok(Self::S2S3),
            "SzSz" => Ok(Self::SzSz),
            "S+S-" => Ok(Self::SpSm),
            "S-S+" => Ok(Self::SmSp),
            _ => Err(UnknownOperator(s.to_string())),
        }
    }
}

impl fmt::Display for LocalOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Return the configuration connected to `bits` by applying the spin-flip
/// part of `op` on sites `j` and `j + 1`, i.e. `bits` with those two sites set
/// to `10` for [`LocalOp::SpSm`] or `01` for [`LocalOp::SmSp`].
///
/// Diagonal operators leave `bits` unchanged.
pub fn transform(bits: &[u8], j: usize, op: LocalOp) -> VerifyResult<Vec<u8>> {
    if j + 1 >= bits.len() {
        return Err(SiteOutOfRange { site: j + 1, n: bits.len() });
    }
    let mut new = bits.to_vec();
    match op {
        LocalOp::SpSm => { new[j] = 1; new[j + 1] = 0; },
        LocalOp::SmSp => { new[j] = 0; new[j + 1] = 1; },
        LocalOp::S2S3 | LocalOp::SzSz => { },
    }
    Ok(new)
}

fn zz(a: u8, b: u8) -> f64 { if a == b { 0.25 } else { -0.25 } }

/// Evaluate the local estimator of `op` on the configuration `bits`, using the
/// real amplitudes `amps` in amplitude order.
pub fn convert(op: LocalOp, bits: &[u8], amps: &[f64]) -> VerifyResult<f64> {
    let n = num_sites(amps.len())?;
    if bits.len() != n {
        return Err(LengthMismatch { expected: n, got: bits.len() });
    }
    if let Some((site, val)) =
        bits.iter().copied().enumerate().find(|(_, b)| *b > 1)
    {
        return Err(InvalidOutcome { site, val });
    }
    match op {
        LocalOp::S2S3 => {
            if n < 3 { return Err(SiteOutOfRange { site: 2, n }); }
            Ok(zz(bits[1], bits[2]))
        },
        LocalOp::SzSz => {
            Ok(bits.windows(2).map(|w| zz(w[0], w[1])).sum())
        },
        LocalOp::SpSm | LocalOp::SmSp => {
            let pattern: [u8; 2] =
                if op == LocalOp::SpSm { [0, 1] } else { [1, 0] };
            let org = amps[config_index(bits)];
            let mut total: f64 = 0.0;
            for j in 0..n - 1 {
                if bits[j..j + 2] != pattern { continue; }
                if org == 0.0 {
                    return Err(ZeroAmplitude(
                        bits.iter().map(|b| b.to_string()).collect()
                    ));
                }
                total += amps[config_index(&transform(bits, j, op)?)] / org;
            }
            Ok(total)
        },
    }
}

/// Evaluate the local estimator of the Heisenberg energy with coupling
/// `j_coupling`; see [`heisenberg_energy`][crate::observable::heisenberg_energy].
pub fn local_energy(bits: &[u8], amps: &[f64], j_coupling: f64)
    -> VerifyResult<f64>
{
    let zz = convert(LocalOp::SzSz, bits, amps)?;
    let pm = convert(LocalOp::SpSm, bits, amps)?;
    let mp = convert(LocalOp::SmSp, bits, amps)?;
    Ok(j_coupling * (zz + 0.5 * (pm + mp)))
}

/// Observables that can be estimated from samples.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum Observable {
    /// ⟨S<sup>z</sup><sub>1</sub> S<sup>z</sup><sub>2</sub>⟩
    S2S3,
    /// Heisenberg energy with the given coupling.
    Energy(f64),
}

impl Observable {
    /// Evaluate the local estimator of `self` on a single configuration.
    pub fn local(&self, bits: &[u8], amps: &[f64]) -> VerifyResult<f64> {
        match self {
            Self::S2S3 => convert(LocalOp::S2S3, bits, amps),
            Self::Energy(j_coupling) => local_energy(bits, amps, *j_coupling),
        }
    }
}

/// Result of an [`observable_check`].
#[derive(Clone, Debug, PartialEq)]
pub struct ObservableReport {
    /// Relative error of the running average after each requested number of
    /// samples.
    pub errors: Vec<(usize, f64)>,
    /// Average of the local estimator over all samples.
    pub mean: f64,
    /// Relative error of `mean`.
    pub final_error: f64,
}

/// Average the local estimator of `observable` over `samples` and compare with
/// its exact value `expected`.
///
/// The relative error of the running average is recorded after the first `m`
/// samples for every `m` in `checkpoints` no larger than the number of
/// samples.
pub fn observable_check(
    observable: Observable,
    samples: &[Sample],
    amps: &[f64],
    expected: f64,
    checkpoints: &[usize],
) -> VerifyResult<ObservableReport>
{
    if samples.is_empty() { return Err(EmptySamples); }
    if expected == 0.0 { return Err(ZeroExpected); }
    let rel_err = |avg: f64| (expected - avg).abs() / expected.abs();
    let marks: HashSet<usize> = checkpoints.iter().copied().collect();
    let mut errors: Vec<(usize, f64)> = Vec::with_capacity(checkpoints.len());
    let mut total: f64 = 0.0;
    for (k, sample) in samples.iter().enumerate() {
        total += observable.local(sample.bits(), amps)?;
        let m = k + 1;
        if marks.contains(&m) {
            errors.push((m, rel_err(total / m as f64)));
        }
    }
    let mean = total / samples.len() as f64;
    Ok(ObservableReport { errors, mean, final_error: rel_err(mean) })
}
