//! Discriminator network
//!
//! Classifies an image as ground truth or generator output, producing a
//! scalar verdict per sample. With the default sigmoid output activation the
//! verdict is a probability in [0, 1].

use tch::{nn, nn::Module, Tensor};

use crate::utils::{Activation, SampleShape};

/// Units in the hidden dense layer
const HIDDEN_UNITS: i64 = 256;

/// Discriminator network configuration
#[derive(Debug, Clone)]
pub struct DiscriminatorConfig {
    /// Shape of one input sample
    pub shape: SampleShape,
    /// Convolution kernel size (odd, same-padded)
    pub ksize: i64,
    /// Working channel depth of the conv stack
    pub depth: i64,
    /// Activation after the convolutions and the hidden dense layer
    pub activation: Activation,
    /// Activation on the output unit
    pub output_activation: Activation,
}

impl Default for DiscriminatorConfig {
    fn default() -> Self {
        Self {
            shape: SampleShape::new(32, 32, 1),
            ksize: 5,
            depth: 32,
            activation: Activation::LeakyRelu,
            output_activation: Activation::Sigmoid,
        }
    }
}

/// Discriminator network
///
/// Architecture:
/// 1. 2 x (same-padded Conv2d + 2x average-pool downsample)
/// 2. Flatten
/// 3. Dense layer of 256 units
/// 4. Dense output unit with the configured output activation
#[derive(Debug)]
pub struct Discriminator {
    config: DiscriminatorConfig,
    conv1: nn::Conv2D,
    conv2: nn::Conv2D,
    fc1: nn::Linear,
    fc2: nn::Linear,
    flat_size: i64,
}

impl Discriminator {
    /// Create a new Discriminator network
    pub fn new(vs: &nn::Path, config: DiscriminatorConfig) -> Self {
        let conv_config = nn::ConvConfig {
            padding: config.ksize / 2,
            ..Default::default()
        };

        let conv1 = nn::conv2d(
            vs / "conv1",
            config.shape.depth,
            config.depth,
            config.ksize,
            conv_config,
        );
        let conv2 = nn::conv2d(vs / "conv2", config.depth, config.depth, config.ksize, conv_config);

        // Two 2x pools quarter each spatial dimension
        let flat_size = config.depth * (config.shape.height / 4) * (config.shape.width / 4);

        let fc1 = nn::linear(vs / "fc1", flat_size, HIDDEN_UNITS, Default::default());
        let fc2 = nn::linear(vs / "fc2", HIDDEN_UNITS, 1, Default::default());

        Self {
            config,
            conv1,
            conv2,
            fc1,
            fc2,
            flat_size,
        }
    }

    /// Get configuration
    pub fn config(&self) -> &DiscriminatorConfig {
        &self.config
    }
}

impl Module for Discriminator {
    /// Forward pass on a batch of shape (batch, depth, height, width),
    /// returning one verdict per sample of shape (batch, 1)
    fn forward(&self, xs: &Tensor) -> Tensor {
        let act = self.config.activation;

        let x = act.apply(&self.conv1.forward(xs));
        let x = x.avg_pool2d([2, 2], [2, 2], [0, 0], false, true, None::<i64>);
        let x = act.apply(&self.conv2.forward(&x));
        let x = x.avg_pool2d([2, 2], [2, 2], [0, 0], false, true, None::<i64>);

        let batch_size = x.size()[0];
        let x = x.view([batch_size, self.flat_size]);

        let x = act.apply(&self.fc1.forward(&x));
        self.config.output_activation.apply(&self.fc2.forward(&x))
    }
}
