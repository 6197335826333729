//! Builds a model from an optional JSON config and runs one batch through it.
//!
//! ```text
//! RUST_LOG=debug densenet_demo [config.json] [batch_size]
//! ```

use std::env;
use std::process::ExitCode;

use densenet_lstm::{DenseNet, DenseNetConfig, Mode, Result, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

fn run() -> Result<()> {
    let mut args = env::args().skip(1);

    let config = match args.next() {
        Some(path) => DenseNetConfig::from_json_file(&path)?,
        None => DenseNetConfig::default().with_seed(0),
    };
    let batch_size = args.next().and_then(|s| s.parse().ok()).unwrap_or(4usize);

    let mut model = DenseNet::new(config)?;
    println!("{}", model.summary()?);

    let side = model.config().input_size;
    let mut rng = StdRng::seed_from_u64(model.config().seed.unwrap_or(0));
    let normal = Normal::new(0.0f32, 1.0).map_err(|e| densenet_lstm::Error::Layer(e.to_string()))?;
    let pixels = (0..batch_size * 3 * side * side)
        .map(|_| normal.sample(&mut rng))
        .collect();
    let images = Tensor::from_vec(pixels, &[batch_size, 3, side, side])?;

    let seed = model.init_hidden_starter(batch_size);
    let log_probs = model.forward(&images, &seed, Mode::Inference)?;

    for (i, row) in log_probs.data().outer_iter().enumerate() {
        let (class, score) = row
            .iter()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (c, &v)| if v > best.1 { (c, v) } else { best });
        println!("sample {}: class {} (p = {:.4})", i, class, score.exp());
    }

    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}
