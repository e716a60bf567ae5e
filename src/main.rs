//! Image-to-image GAN trainer
//!
//! CLI for training the GAN on paired samples stored as CSV (one flattened
//! sample per row, channel-major) and for writing default settings files.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ndarray::Array2;
use tch::{Device, Tensor};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use img2img_gan::{Gan, GanSettings, SampleShape};

/// Conditional image-to-image GAN
#[derive(Parser)]
#[command(name = "img2img-gan")]
#[command(version = "0.1.0")]
#[command(about = "Train a conditional image-to-image GAN")]
struct Cli {
    /// Path to settings file (JSON or TOML)
    #[arg(short, long, default_value = "gan.json")]
    config: String,

    /// Verbosity level
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default settings file
    Init {
        /// Output settings file path
        #[arg(short, long, default_value = "gan.json")]
        output: String,
    },

    /// Train on paired input/target CSVs
    Train {
        /// Path to input samples CSV
        #[arg(short, long)]
        inputs: String,

        /// Path to target samples CSV
        #[arg(short, long)]
        targets: String,

        /// Sample width
        #[arg(long)]
        width: i64,

        /// Sample height
        #[arg(long)]
        height: i64,

        /// Sample channel depth
        #[arg(long, default_value = "1")]
        depth: i64,

        /// Number of training epochs
        #[arg(short, long, default_value = "100")]
        epochs: usize,

        /// Number of batches per epoch
        #[arg(short, long, default_value = "1")]
        batches: usize,

        /// Min-max normalize targets to [-1, 1] before training
        #[arg(long)]
        normalize: bool,

        /// Device: "cpu" or "cuda"
        #[arg(long, default_value = "cpu")]
        device: String,

        /// Write generated outputs for the training inputs to this CSV
        #[arg(short, long)]
        output: Option<String>,

        /// Write the per-epoch loss history to this CSV
        #[arg(short, long)]
        metrics: Option<String>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match cli.verbosity.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Init { output } => init_settings(&output),
        Commands::Train {
            inputs,
            targets,
            width,
            height,
            depth,
            epochs,
            batches,
            normalize,
            device,
            output,
            metrics,
        } => train(
            &cli.config,
            &inputs,
            &targets,
            SampleShape::new(width, height, depth),
            epochs,
            batches,
            normalize,
            &device,
            output.as_deref(),
            metrics.as_deref(),
        ),
    }
}

/// Write a default settings file, format chosen by extension
fn init_settings(path: &str) -> Result<()> {
    let settings = GanSettings::default();
    if path.ends_with(".toml") {
        settings.save_toml(path)?;
    } else {
        settings.save_json(path)?;
    }
    info!("Created default settings at {}", path);
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn train(
    config_path: &str,
    inputs_path: &str,
    targets_path: &str,
    shape: SampleShape,
    epochs: usize,
    batches: usize,
    normalize: bool,
    device: &str,
    output_path: Option<&str>,
    metrics_path: Option<&str>,
) -> Result<()> {
    let settings = if std::path::Path::new(config_path).exists() {
        if config_path.ends_with(".toml") {
            GanSettings::from_toml(config_path)?
        } else {
            GanSettings::from_json(config_path)?
        }
    } else {
        info!("Settings file not found, using defaults");
        GanSettings::default()
    };

    let device = parse_device(device);
    info!("Using device: {:?}", device);

    info!("Loading inputs from {}", inputs_path);
    let x = load_samples(inputs_path, shape)?;
    info!("Loading targets from {}", targets_path);
    let mut y = load_samples(targets_path, shape)?;

    if normalize {
        min_max_normalize(&mut y);
        info!("Targets normalized to [-1, 1]");
    }

    let x = to_tensor(&x, shape, device)?;
    let y = to_tensor(&y, shape, device)?;
    info!("Loaded {} sample pairs", x.size()[0]);

    let mut gan = Gan::new(shape, settings, device)?;
    gan.summary();

    let history = gan.train(&x, &y, epochs, batches, None)?;
    info!(
        "Training complete. d_loss={:.4}, g_mse={:.4}, g_adv={:.4}",
        history.latest_d_loss().unwrap_or(f64::NAN),
        history.latest_g_mse().unwrap_or(f64::NAN),
        history.latest_g_adv().unwrap_or(f64::NAN)
    );

    if let Some(path) = metrics_path {
        history.save_csv(path)?;
        info!("Saved loss history to {}", path);
    }

    if let Some(path) = output_path {
        let generated = gan.generate(&x);
        write_samples(path, &generated)?;
        info!("Saved generated outputs to {}", path);
    }

    Ok(())
}

/// Resolve a device name, falling back to CPU when CUDA is unavailable
fn parse_device(name: &str) -> Device {
    match name.to_lowercase().as_str() {
        "cuda" | "gpu" => {
            if tch::Cuda::is_available() {
                Device::Cuda(0)
            } else {
                warn!("CUDA requested but not available, falling back to CPU");
                Device::Cpu
            }
        }
        _ => Device::Cpu,
    }
}

/// Load flattened samples from a headerless CSV, one sample per row
fn load_samples(path: &str, shape: SampleShape) -> Result<Array2<f32>> {
    let expected = shape.num_elements() as usize;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)?;

    let mut values = Vec::new();
    let mut count = 0;
    for record in reader.records() {
        let record = record?;
        if record.len() != expected {
            anyhow::bail!(
                "Row {} in {} has {} values, expected {}",
                count,
                path,
                record.len(),
                expected
            );
        }
        for field in record.iter() {
            values.push(field.trim().parse::<f32>()?);
        }
        count += 1;
    }
    if count == 0 {
        anyhow::bail!("No samples in {}", path);
    }

    Ok(Array2::from_shape_vec((count, expected), values)?)
}

/// Scale all values into [-1, 1] with a single global min-max range
fn min_max_normalize(data: &mut Array2<f32>) {
    let mut min_val = f32::MAX;
    let mut max_val = f32::MIN;
    for &val in data.iter() {
        min_val = min_val.min(val);
        max_val = max_val.max(val);
    }

    let range = max_val - min_val;
    if range > 0.0 {
        data.mapv_inplace(|v| 2.0 * (v - min_val) / range - 1.0);
    } else {
        data.fill(0.0);
    }
}

/// View a (count, width*height*depth) array as a 4-D training tensor
fn to_tensor(data: &Array2<f32>, shape: SampleShape, device: Device) -> Result<Tensor> {
    let count = data.nrows() as i64;
    let [depth, height, width] = shape.chw();
    let slice = data
        .as_slice()
        .context("Sample array is not in standard layout")?;
    Ok(Tensor::from_slice(slice)
        .view([count, depth, height, width])
        .to_device(device))
}

/// Write a 4-D batch of samples as one flattened row per sample
fn write_samples(path: &str, samples: &Tensor) -> Result<()> {
    let count = samples.size()[0];
    let flat = samples.reshape([count, -1]);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    for i in 0..count {
        let row: Vec<f32> = Vec::try_from(flat.get(i)).context("Sample extraction failed")?;
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}
