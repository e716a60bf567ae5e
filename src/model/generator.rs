//! Generator network
//!
//! Maps an input image to an output image of the same shape through a
//! convolutional encoder (downsampling) and a symmetric decoder
//! (upsampling). With input masking enabled, the generator only fills in
//! positions where the input is exactly zero; nonzero input positions pass
//! through untouched.

use tch::{nn, nn::Module, Kind, Tensor};

use crate::utils::{Activation, SampleShape};

/// Generator network configuration
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Shape of one input/output sample
    pub shape: SampleShape,
    /// Convolution kernel size (odd, same-padded)
    pub ksize: i64,
    /// Working channel depth of the conv stack
    pub depth: i64,
    /// Number of encode/decode stages (each halves/doubles spatial dims)
    pub stages: i64,
    /// Activation after every convolution, including the output projection
    pub activation: Activation,
    /// Pass input values through wherever the input is nonzero
    pub input_mask: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            shape: SampleShape::new(32, 32, 1),
            ksize: 5,
            depth: 64,
            stages: 3,
            activation: Activation::LeakyRelu,
            input_mask: false,
        }
    }
}

/// Generator network
///
/// Architecture:
/// 1. `stages` x (same-padded Conv2d + 2x average-pool downsample)
/// 2. `stages` x (same-padded Conv2d + 2x nearest upsample)
/// 3. One fusing Conv2d at working depth
/// 4. Output Conv2d projecting to the sample depth
#[derive(Debug)]
pub struct Generator {
    config: GeneratorConfig,
    encoder: Vec<nn::Conv2D>,
    decoder: Vec<nn::Conv2D>,
    fuse: nn::Conv2D,
    project: nn::Conv2D,
}

impl Generator {
    /// Create a new Generator network
    pub fn new(vs: &nn::Path, config: GeneratorConfig) -> Self {
        let conv_config = nn::ConvConfig {
            padding: config.ksize / 2,
            ..Default::default()
        };

        let mut encoder = Vec::with_capacity(config.stages as usize);
        for stage in 0..config.stages {
            let in_channels = if stage == 0 {
                config.shape.depth
            } else {
                config.depth
            };
            encoder.push(nn::conv2d(
                vs / format!("enc{}", stage + 1),
                in_channels,
                config.depth,
                config.ksize,
                conv_config,
            ));
        }

        let mut decoder = Vec::with_capacity(config.stages as usize);
        for stage in 0..config.stages {
            decoder.push(nn::conv2d(
                vs / format!("dec{}", stage + 1),
                config.depth,
                config.depth,
                config.ksize,
                conv_config,
            ));
        }

        let fuse = nn::conv2d(vs / "fuse", config.depth, config.depth, config.ksize, conv_config);
        let project = nn::conv2d(
            vs / "project",
            config.depth,
            config.shape.depth,
            config.ksize,
            conv_config,
        );

        Self {
            config,
            encoder,
            decoder,
            fuse,
            project,
        }
    }

    /// Raw encoder/decoder forward pass, before input masking
    ///
    /// Input and output are both of shape (batch, depth, height, width).
    fn raw_forward(&self, xs: &Tensor) -> Tensor {
        let act = self.config.activation;

        let mut x = xs.shallow_clone();
        for conv in &self.encoder {
            x = act.apply(&conv.forward(&x));
            x = x.avg_pool2d([2, 2], [2, 2], [0, 0], false, true, None::<i64>);
        }
        for conv in &self.decoder {
            x = act.apply(&conv.forward(&x));
            let size = x.size();
            let (height, width) = (size[2], size[3]);
            x = x.upsample_nearest2d([height * 2, width * 2], None::<f64>, None::<f64>);
        }
        x = act.apply(&self.fuse.forward(&x));
        act.apply(&self.project.forward(&x))
    }

    /// Blend the raw output with the input: positions where the input is
    /// exactly zero take the generated value, all others pass through.
    fn apply_mask(&self, xs: &Tensor, raw: &Tensor) -> Tensor {
        let fill = xs.eq(0.).to_kind(Kind::Float);
        xs + fill * raw
    }

    /// Get configuration
    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }
}

impl Module for Generator {
    fn forward(&self, xs: &Tensor) -> Tensor {
        let raw = self.raw_forward(xs);
        if self.config.input_mask {
            self.apply_mask(xs, &raw)
        } else {
            raw
        }
    }
}
