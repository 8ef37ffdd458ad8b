use flexi_logger::{ Logger, detailed_format };
use log::info;
use nalgebra as na;
use ndarray as nd;
use mps_sampler::{
    amplitude::{ AmplitudeConfig, Amplitudes },
    config::RunConfig,
    environment::Environment,
    mps::ChainState,
    observable::{ SpinOp, heisenberg_energy, s2s3 },
    output::OutputDir,
    sampler::{ Sampler, SamplerConfig },
    verify::{ Observable, frequency_check, observable_check },
};

const N: usize = 5;
const NUM_SAMPLES: usize = 20000;
const STORE_AMPLITUDES: bool = true;
const J: f64 = 1.0;
const SEED: u64 = 10546;
const SVD_EPS: f64 = 1e-12;
const OUTDIR: &str = "Data";

// dense matrix of a product of single-site operators on an N-site chain, with
// site 0 as the leftmost tensor factor
fn site_ops(n: usize, ops: &[(usize, SpinOp)]) -> nd::Array2<f64> {
    (0..n)
        .map(|k| {
            ops.iter()
                .find(|(site, _)| *site == k)
                .map(|(_, op)| op.matrix())
                .unwrap_or_else(|| SpinOp::Id.matrix())
        })
        .fold(nd::Array2::eye(1), |acc, op| nd::linalg::kron(&acc, &op))
}

fn heisenberg_matrix(n: usize, j_coupling: f64) -> nd::Array2<f64> {
    let d = 1_usize << n;
    let mut h: nd::Array2<f64> = nd::Array2::zeros((d, d));
    for j in 0..n - 1 {
        h = h
            + site_ops(n, &[(j, SpinOp::Sz), (j + 1, SpinOp::Sz)])
            + site_ops(n, &[(j, SpinOp::SPlus), (j + 1, SpinOp::SMinus)]) * 0.5
            + site_ops(n, &[(j, SpinOp::SMinus), (j + 1, SpinOp::SPlus)]) * 0.5;
    }
    h * j_coupling
}

// exact ground state by full diagonalization
fn ground_state(n: usize, j_coupling: f64) -> anyhow::Result<(f64, Vec<f64>)> {
    let h = heisenberg_matrix(n, j_coupling);
    let d = h.nrows();
    let eig = na::SymmetricEigen::new(na::DMatrix::from_fn(d, d, |i, j| h[[i, j]]));
    let (k0, e0) =
        eig.eigenvalues.iter().copied().enumerate()
        .min_by(|(_, a), (_, b)| a.total_cmp(b))
        .ok_or_else(|| anyhow::anyhow!("empty spectrum"))?;
    let psi: Vec<f64> = eig.eigenvectors.column(k0).iter().copied().collect();
    Ok((e0, psi))
}

fn main() -> anyhow::Result<()> {
    let _logger =
        Logger::try_with_env_or_str("info")?
        .format(detailed_format)
        .start()?;

    let run = RunConfig {
        num_samples: NUM_SAMPLES,
        n: N,
        store_amplitudes: STORE_AMPLITUDES,
    };

    let (e0, psi) = ground_state(N, J)?;
    info!(n = N, e0 = e0; "found exact ground state");
    let state: ChainState<f64> = ChainState::from_vector(N, psi, Some(SVD_EPS))?;
    run.validate(state.n())?;
    info!(max_bond_dim = state.max_bond_dim(); "factored ground state");

    let env = Environment::build(&state)?;
    let sampler = Sampler::new(&state, &env, SamplerConfig::default())?;
    let samples = sampler.sample_par(run.num_samples, SEED)?;

    let corr = s2s3(&state)?;
    let energy = heisenberg_energy(&state, J)?;
    info!(s2s3 = corr, energy = energy; "computed observables");

    let outdir = OutputDir::new(OUTDIR)?;
    outdir.write_samples(&samples)?;
    outdir.write_observables(corr, energy)?;

    if run.store_amplitudes {
        let amps = Amplitudes::extract(&state, &AmplitudeConfig::default())?;
        let signed = amps.signed();
        outdir.write_amplitudes(&signed, &amps.unsigned())?;

        let freq = frequency_check(&samples, &amps.probs(), 3.0)?;
        info!(
            outliers = freq.outliers.len(),
            chi2 = freq.chi2,
            dof = freq.dof,
            p_value = freq.p_value;
            "frequency check"
        );
        let checkpoints: Vec<usize> = (100..run.num_samples).step_by(100).collect();
        for (name, observable, expected) in [
            ("S2S3", Observable::S2S3, corr),
            ("H", Observable::Energy(J), energy),
        ] {
            let report =
                observable_check(observable, &samples, &signed, expected, &checkpoints)?;
            info!(
                observable = name,
                mean = report.mean,
                final_error = report.final_error;
                "observable check"
            );
        }
    }
    Ok(())
}
