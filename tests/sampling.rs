use float_cmp::assert_approx_eq;
use num_complex::Complex64 as C64;
use rand::{ SeedableRng, rngs::StdRng };
use mps_sampler::{
    amplitude::{ AmplitudeConfig, Amplitudes },
    environment::Environment,
    mps::ChainState,
    observable::{ heisenberg_energy, s2s3 },
    sampler::{ Sample, Sampler, SamplerConfig },
    verify::{ Observable, frequency_check, observable_check },
};

const SAMPLES: usize = 100_000;

fn draw_with(state: &ChainState<f64>, m: usize, seed: u64, config: SamplerConfig)
    -> Vec<Sample>
{
    let env = Environment::build(state).unwrap();
    let sampler = Sampler::new(state, &env, config).unwrap();
    sampler.sample_par(m, seed).unwrap()
}

fn draw(state: &ChainState<f64>, m: usize, seed: u64) -> Vec<Sample> {
    draw_with(state, m, seed, SamplerConfig::default())
}

fn probs(state: &ChainState<f64>) -> Vec<f64> {
    Amplitudes::extract(state, &AmplitudeConfig::default()).unwrap().probs()
}

#[test]
fn sparse_state_frequencies_within_three_sigma() {
    // (|000⟩ + 2|011⟩ + 3|111⟩) / √14
    let psi = [1.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0];
    let state: ChainState<f64> = ChainState::from_vector(3, psi, None).unwrap();
    let samples = draw(&state, SAMPLES, 10546);
    let report = frequency_check(&samples, &probs(&state), 3.0).unwrap();
    assert!(report.outliers.is_empty(), "{report}");
    assert_eq!(report.actual.iter().sum::<usize>(), SAMPLES);
    for k in [1, 2, 4, 5, 6] {
        assert_eq!(report.actual[k], 0);
    }
    assert!(report.p_value > 1e-4, "{report}");
}

#[test]
fn random_chain_frequencies_agree() {
    let mut rng = StdRng::seed_from_u64(10546);
    let state: ChainState<f64> = ChainState::random(5, 4, &mut rng).unwrap();
    // outcomes with conditional probability below the certainty threshold are
    // never drawn, so keep it well below 1 / SAMPLES
    let config = SamplerConfig { certainty_eps: 1e-9, ..SamplerConfig::default() };
    let samples = draw_with(&state, SAMPLES, 1, config);
    let report = frequency_check(&samples, &probs(&state), 4.0).unwrap();
    assert!(report.passes(1e-4), "{report}");
    // every sample carries its exact probability
    let p = probs(&state);
    for sample in samples.iter().take(1000) {
        assert_approx_eq!(f64, sample.prob(), p[sample.index().unwrap()], epsilon = 1e-10);
    }
}

#[test]
fn complex_chain_frequencies_agree() {
    let psi: Vec<C64> = vec![
        C64::new(1.0, 0.0),
        C64::new(0.0, 1.0),
        C64::new(0.5, -0.5),
        C64::new(0.0, 0.0),
        C64::new(1.0, 1.0),
        C64::new(0.0, -2.0),
        C64::new(0.3, 0.4),
        C64::new(-1.0, 0.0),
    ];
    let state: ChainState<C64> = ChainState::from_vector(3, psi, None).unwrap();
    let env = Environment::build(&state).unwrap();
    let sampler = Sampler::new(&state, &env, SamplerConfig::default()).unwrap();
    let samples = sampler.sample_par(SAMPLES, 10546).unwrap();
    let p = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap().probs();
    let report = frequency_check(&samples, &p, 3.0).unwrap();
    assert!(report.outliers.is_empty(), "{report}");
    assert_eq!(report.actual[3], 0);
    assert!(report.p_value > 1e-4, "{report}");
    for sample in samples.iter().take(1000) {
        let k = sample.index().unwrap();
        assert_approx_eq!(f64, sample.prob(), p[k], epsilon = 1e-10);
    }
}

#[test]
fn parallel_matches_sequential() {
    let mut rng = StdRng::seed_from_u64(10546);
    let state: ChainState<f64> = ChainState::random(6, 3, &mut rng).unwrap();
    let env = Environment::build(&state).unwrap();
    let sampler = Sampler::new(&state, &env, SamplerConfig::default()).unwrap();
    let par = sampler.sample_par(200, 42).unwrap();
    let seq: Vec<Sample> =
        (0..200_u64)
        .map(|k| sampler.sample(&mut StdRng::seed_from_u64(42 + k)).unwrap())
        .collect();
    assert_eq!(par, seq);
}

#[test]
fn bit_order_round_trip() {
    let state: ChainState<f64> = ChainState::product([0, 1]).unwrap();
    let samples = draw(&state, 10, 0);
    assert!(samples.iter().all(|s| s.to_string() == "0 1" && s.index() == Some(1)));
    let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
    assert_eq!(amps.index_of(&[0, 1]), Some(1));
    assert_approx_eq!(f64, amps.get(1).unwrap(), 1.0);
}

#[test]
fn w_state_observables() {
    // (|001⟩ + |010⟩ + |100⟩) / √3 is an eigenstate of the Heisenberg chain
    let psi = [0.0, 1.0, 1.0, 0.0, 1.0, 0.0, 0.0, 0.0];
    let state: ChainState<f64> = ChainState::from_vector(3, psi, None).unwrap();
    let energy = heisenberg_energy(&state, 1.0).unwrap();
    let corr = s2s3(&state).unwrap();
    assert_approx_eq!(f64, energy, 0.5, epsilon = 1e-12);
    assert_approx_eq!(f64, corr, -1.0 / 12.0, epsilon = 1e-12);

    let amps = Amplitudes::extract(&state, &AmplitudeConfig::default()).unwrap();
    let signed = amps.signed();
    let samples = draw(&state, SAMPLES, 7);
    let checkpoints: Vec<usize> = (100..SAMPLES).step_by(100).collect();

    let report =
        observable_check(Observable::Energy(1.0), &samples, &signed, energy, &checkpoints)
        .unwrap();
    assert_eq!(report.errors.len(), checkpoints.len());
    assert!(report.errors.iter().all(|(_, err)| *err < 1e-10));

    let report =
        observable_check(Observable::S2S3, &samples, &signed, corr, &checkpoints)
        .unwrap();
    assert!(report.final_error < 0.05, "{report:?}");
}
