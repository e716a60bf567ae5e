//! GAN wrapper combining Generator and Discriminator
//!
//! Owns the three computation graphs of the model: the standalone
//! generator, the standalone discriminator, and the composite graph
//! (generator feeding the discriminator). The composite's discriminator
//! path shares the standalone discriminator's parameters, so freezing the
//! discriminator store is what keeps composite updates from touching them.

use tch::{nn, nn::Module, Device, Tensor};
use tracing::info;

use crate::training::{Trainer, TrainingHistory};
use crate::utils::{GanSettings, SampleShape};

use super::discriminator::{Discriminator, DiscriminatorConfig};
use super::generator::{Generator, GeneratorConfig};

/// Conditional image-to-image GAN
pub struct Gan {
    settings: GanSettings,
    shape: SampleShape,
    device: Device,
    gen_vs: nn::VarStore,
    disc_vs: nn::VarStore,
    generator: Generator,
    discriminator: Discriminator,
}

impl Gan {
    /// Create a new GAN for samples of the given shape
    ///
    /// # Arguments
    ///
    /// * `shape` - `(width, height)` or `(width, height, depth)` of one sample
    /// * `settings` - Hyperparameters; unset keys take the documented defaults
    /// * `device` - Device to create the networks on
    pub fn new(
        shape: impl Into<SampleShape>,
        settings: GanSettings,
        device: Device,
    ) -> anyhow::Result<Self> {
        let shape = shape.into();
        settings.validate()?;

        // The generator halves each spatial dim `g_stages` times, the
        // discriminator twice; both must divide evenly for the conv
        // stacks to line back up.
        let g_factor = 1i64 << settings.g_stages;
        if shape.width % g_factor != 0 || shape.height % g_factor != 0 {
            anyhow::bail!(
                "Sample dims {}x{} must be divisible by 2^g_stages = {}",
                shape.width,
                shape.height,
                g_factor
            );
        }
        if shape.width % 4 != 0 || shape.height % 4 != 0 {
            anyhow::bail!(
                "Sample dims {}x{} must be divisible by 4 for the discriminator",
                shape.width,
                shape.height
            );
        }

        let gen_vs = nn::VarStore::new(device);
        let disc_vs = nn::VarStore::new(device);

        let generator = Generator::new(
            &gen_vs.root(),
            GeneratorConfig {
                shape,
                ksize: settings.g_ksize,
                depth: settings.g_depth,
                stages: settings.g_stages,
                activation: settings.g_activation,
                input_mask: settings.input_mask,
            },
        );
        let discriminator = Discriminator::new(
            &disc_vs.root(),
            DiscriminatorConfig {
                shape,
                ksize: settings.d_ksize,
                depth: settings.d_depth,
                activation: settings.d_activation,
                output_activation: settings.d_output_activation,
            },
        );

        Ok(Self {
            settings,
            shape,
            device,
            gen_vs,
            disc_vs,
            generator,
            discriminator,
        })
    }

    /// Create a GAN with default settings
    pub fn with_defaults(shape: impl Into<SampleShape>, device: Device) -> anyhow::Result<Self> {
        Self::new(shape, GanSettings::default(), device)
    }

    /// Composite graph forward pass: generator output and the
    /// discriminator's verdict on it
    pub fn composite_forward(&self, xs: &Tensor) -> (Tensor, Tensor) {
        let output = self.generator.forward(xs);
        let verdict = self.discriminator.forward(&output);
        (output, verdict)
    }

    /// Enable or disable gradient updates for every discriminator parameter
    ///
    /// Must be disabled while the composite graph is optimized so generator
    /// updates can never mutate the shared discriminator parameters, and
    /// re-enabled for direct discriminator updates. This is a mode switch on
    /// shared state, not a lock: the graphs must not be used concurrently
    /// from multiple threads.
    pub fn set_discriminator_trainable(&mut self, enabled: bool) {
        if enabled {
            self.disc_vs.unfreeze();
        } else {
            self.disc_vs.freeze();
        }
    }

    /// Build a fresh optimizer over the generator's parameters
    pub fn gen_optimizer(&self) -> anyhow::Result<nn::Optimizer> {
        self.settings
            .g_optimizer
            .build(&self.gen_vs, self.settings.g_weight_decay())
    }

    /// Build a fresh optimizer over the discriminator's parameters
    pub fn disc_optimizer(&self) -> anyhow::Result<nn::Optimizer> {
        self.settings
            .d_optimizer
            .build(&self.disc_vs, self.settings.d_weight_decay())
    }

    /// Run the generator forward without tracking gradients
    ///
    /// Accepts a single sample of shape (depth, height, width) - a batch
    /// axis is added and stripped again - or an already-batched 4-D tensor,
    /// in which case the full generated batch is returned.
    pub fn generate(&self, xs: &Tensor) -> Tensor {
        let single = xs.dim() == 3;
        let batched = if single {
            xs.unsqueeze(0)
        } else {
            xs.shallow_clone()
        };
        let output = tch::no_grad(|| self.generator.forward(&batched));
        if single {
            output.squeeze_dim(0)
        } else {
            output
        }
    }

    /// Run the discriminator forward on an already-batched tensor,
    /// returning one verdict per sample. No reshaping is performed.
    pub fn discriminate(&self, xs: &Tensor) -> Tensor {
        tch::no_grad(|| self.discriminator.forward(xs))
    }

    /// Train on paired inputs and targets
    ///
    /// Inputs and targets are reshaped to (count, depth, height, width) and
    /// must hold the same number of samples. Each epoch either updates the
    /// discriminator or the generator, then re-evaluates both losses on the
    /// whole dataset; `callback`, when given, receives
    /// `(epoch, [g_loss_mse, g_loss_adversarial], d_loss)` once per epoch.
    pub fn train(
        &mut self,
        x: &Tensor,
        y: &Tensor,
        epochs: usize,
        batches: usize,
        callback: Option<&mut dyn FnMut(usize, [f64; 2], f64)>,
    ) -> anyhow::Result<TrainingHistory> {
        let mut trainer = Trainer::new();
        trainer.train(self, x, y, epochs, batches, callback)?;
        Ok(trainer.into_history())
    }

    /// Log a parameter summary of all three graphs
    pub fn summary(&self) {
        let gen_total = log_variables("generator", &self.gen_vs);
        let disc_total = log_variables("discriminator", &self.disc_vs);
        info!(
            "composite: generator -> discriminator, {} parameters total",
            gen_total + disc_total
        );
    }

    /// Named discriminator parameters, sorted by name
    pub fn discriminator_variables(&self) -> Vec<(String, Tensor)> {
        sorted_variables(&self.disc_vs)
    }

    /// Named generator parameters, sorted by name
    pub fn generator_variables(&self) -> Vec<(String, Tensor)> {
        sorted_variables(&self.gen_vs)
    }

    /// Get the generator network
    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    /// Get the discriminator network
    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    /// Get the settings the model was built with
    pub fn settings(&self) -> &GanSettings {
        &self.settings
    }

    /// Get the sample shape
    pub fn shape(&self) -> SampleShape {
        self.shape
    }

    /// Get the device the model lives on
    pub fn device(&self) -> Device {
        self.device
    }
}

fn sorted_variables(vs: &nn::VarStore) -> Vec<(String, Tensor)> {
    let mut variables: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
    variables.sort_by(|a, b| a.0.cmp(&b.0));
    variables
}

fn log_variables(name: &str, vs: &nn::VarStore) -> i64 {
    let mut total = 0;
    info!("{} parameters:", name);
    for (var_name, tensor) in sorted_variables(vs) {
        let count: i64 = tensor.size().iter().product();
        info!("  {:<24} {:?} ({})", var_name, tensor.size(), count);
        total += count;
    }
    info!("{} total: {}", name, total);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Kind;

    fn small_settings() -> GanSettings {
        GanSettings {
            g_ksize: 3,
            g_depth: 8,
            d_ksize: 3,
            d_depth: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_gan_creation() {
        let gan = Gan::new((8, 8, 1), small_settings(), Device::Cpu).unwrap();

        assert_eq!(gan.shape(), SampleShape::new(8, 8, 1));
        assert_eq!(gan.generator().config().depth, 8);
        assert_eq!(gan.discriminator().config().depth, 8);
    }

    #[test]
    fn test_gan_rejects_indivisible_shape() {
        // 6 is not divisible by 2^3
        assert!(Gan::new((6, 6, 1), small_settings(), Device::Cpu).is_err());
    }

    #[test]
    fn test_generate_single_sample() {
        let gan = Gan::new((8, 8, 1), small_settings(), Device::Cpu).unwrap();

        let sample = Tensor::randn([1, 8, 8], (Kind::Float, Device::Cpu));
        let output = gan.generate(&sample);

        assert_eq!(output.size(), vec![1, 8, 8]);
    }

    #[test]
    fn test_generate_batch() {
        let gan = Gan::new((8, 8, 1), small_settings(), Device::Cpu).unwrap();

        let batch = Tensor::randn([5, 1, 8, 8], (Kind::Float, Device::Cpu));
        let output = gan.generate(&batch);

        assert_eq!(output.size(), vec![5, 1, 8, 8]);
    }

    #[test]
    fn test_discriminate_returns_probabilities() {
        let gan = Gan::new((8, 8, 1), small_settings(), Device::Cpu).unwrap();

        let batch = Tensor::randn([7, 1, 8, 8], (Kind::Float, Device::Cpu));
        let probs = gan.discriminate(&batch);

        assert_eq!(probs.size(), vec![7, 1]);
        let min_val: f64 = probs.min().double_value(&[]);
        let max_val: f64 = probs.max().double_value(&[]);
        assert!(min_val >= 0.0 && max_val <= 1.0);
    }

    #[test]
    fn test_composite_shares_discriminator_parameters() {
        let gan = Gan::new((8, 8, 1), small_settings(), Device::Cpu).unwrap();

        let batch = Tensor::randn([3, 1, 8, 8], (Kind::Float, Device::Cpu));
        let (output, verdict) = gan.composite_forward(&batch);

        // The composite's verdict equals the standalone discriminator run
        // on the composite's generator output: one set of parameters.
        let direct = gan.discriminator().forward(&output);
        let verdict_values: Vec<f32> = Vec::try_from(verdict.flatten(0, -1)).unwrap();
        let direct_values: Vec<f32> = Vec::try_from(direct.flatten(0, -1)).unwrap();
        assert_eq!(verdict_values, direct_values);
    }

    #[test]
    fn test_trainable_toggle_propagates() {
        let mut gan = Gan::new((8, 8, 1), small_settings(), Device::Cpu).unwrap();

        gan.set_discriminator_trainable(false);
        for (_, tensor) in gan.discriminator_variables() {
            assert!(!tensor.requires_grad());
        }

        gan.set_discriminator_trainable(true);
        for (_, tensor) in gan.discriminator_variables() {
            assert!(tensor.requires_grad());
        }
    }
}
