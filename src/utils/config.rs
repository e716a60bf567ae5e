//! Hyperparameter settings for the GAN
//!
//! Provides the full set of recognized options with documented defaults,
//! JSON/TOML load/save, and validation.

use serde::{Deserialize, Serialize};
use tch::nn::OptimizerConfig;
use tch::{nn, Tensor};

/// Spatial shape of one sample: width, height and channel depth.
///
/// Constructible from a `(width, height)` pair (depth defaults to 1) or a
/// full `(width, height, depth)` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleShape {
    pub width: i64,
    pub height: i64,
    pub depth: i64,
}

impl SampleShape {
    /// Create a shape with explicit channel depth
    pub fn new(width: i64, height: i64, depth: i64) -> Self {
        Self {
            width,
            height,
            depth,
        }
    }

    /// Number of scalar values in one sample
    pub fn num_elements(&self) -> i64 {
        self.width * self.height * self.depth
    }

    /// Per-sample tensor dimensions in (channels, height, width) layout
    pub fn chw(&self) -> [i64; 3] {
        [self.depth, self.height, self.width]
    }
}

impl From<(i64, i64)> for SampleShape {
    fn from((width, height): (i64, i64)) -> Self {
        Self::new(width, height, 1)
    }
}

impl From<(i64, i64, i64)> for SampleShape {
    fn from((width, height, depth): (i64, i64, i64)) -> Self {
        Self::new(width, height, depth)
    }
}

/// Activation function applied after a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    LeakyRelu,
    Relu,
    Sigmoid,
    Tanh,
    /// Identity, no nonlinearity
    Linear,
}

impl Activation {
    /// Apply the activation to a tensor
    pub fn apply(&self, xs: &Tensor) -> Tensor {
        match self {
            Activation::LeakyRelu => xs.leaky_relu(),
            Activation::Relu => xs.relu(),
            Activation::Sigmoid => xs.sigmoid(),
            Activation::Tanh => xs.tanh(),
            Activation::Linear => xs.shallow_clone(),
        }
    }
}

/// Optimizer selection for a network
///
/// Each `build` call constructs a fresh optimizer over the given variable
/// store, so optimizer state is never shared between networks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OptimizerKind {
    Adam { lr: f64 },
    Sgd { lr: f64 },
}

impl OptimizerKind {
    /// Build a fresh optimizer over the store's trainable variables
    pub fn build(&self, vs: &nn::VarStore, weight_decay: f64) -> anyhow::Result<nn::Optimizer> {
        let optimizer = match self {
            OptimizerKind::Adam { lr } => nn::Adam {
                wd: weight_decay,
                ..Default::default()
            }
            .build(vs, *lr)?,
            OptimizerKind::Sgd { lr } => nn::Sgd {
                wd: weight_decay,
                ..Default::default()
            }
            .build(vs, *lr)?,
        };
        Ok(optimizer)
    }

    /// Learning rate carried by this optimizer
    pub fn learning_rate(&self) -> f64 {
        match self {
            OptimizerKind::Adam { lr } | OptimizerKind::Sgd { lr } => *lr,
        }
    }
}

/// Weight regularization, resolved to optimizer weight decay
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regularizer {
    L2 { weight: f64 },
}

impl Regularizer {
    pub fn weight_decay(&self) -> f64 {
        match self {
            Regularizer::L2 { weight } => *weight,
        }
    }
}

/// Full GAN hyperparameter set
///
/// Unset keys in a settings file fall back to the documented defaults by
/// key presence: an explicitly supplied `false` or `0.0` is preserved.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GanSettings {
    /// Keep the input value in the output wherever the input is nonzero
    pub input_mask: bool,
    /// Discriminator evaluation loss below which discriminator updates pause
    pub d_loss_target: f64,

    /// Generator optimizer (default Adam, lr 1e-3)
    pub g_optimizer: OptimizerKind,
    /// Generator convolution kernel size (odd)
    pub g_ksize: i64,
    /// Generator working channel depth
    pub g_depth: i64,
    /// Number of encode/decode stages in the generator
    pub g_stages: i64,
    /// Activation after every generator convolution
    pub g_activation: Activation,
    /// Generator weight regularization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub g_regularizer: Option<Regularizer>,

    /// Discriminator optimizer (default plain SGD, lr 1e-2)
    pub d_optimizer: OptimizerKind,
    /// Discriminator convolution kernel size (odd)
    pub d_ksize: i64,
    /// Discriminator working channel depth
    pub d_depth: i64,
    /// Activation after discriminator convolutions and the hidden dense layer
    pub d_activation: Activation,
    /// Activation on the discriminator output unit (default sigmoid)
    pub d_output_activation: Activation,
    /// Discriminator weight regularization
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d_regularizer: Option<Regularizer>,
}

impl Default for GanSettings {
    fn default() -> Self {
        Self {
            input_mask: false,
            d_loss_target: 0.3,
            g_optimizer: OptimizerKind::Adam { lr: 1e-3 },
            g_ksize: 5,
            g_depth: 64,
            g_stages: 3,
            g_activation: Activation::LeakyRelu,
            g_regularizer: None,
            d_optimizer: OptimizerKind::Sgd { lr: 1e-2 },
            d_ksize: 5,
            d_depth: 32,
            d_activation: Activation::LeakyRelu,
            d_output_activation: Activation::Sigmoid,
            d_regularizer: None,
        }
    }
}

impl GanSettings {
    /// Create settings with all defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Load settings from a JSON file
    pub fn from_json(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: GanSettings = serde_json::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a JSON file
    pub fn save_json(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load settings from a TOML file
    pub fn from_toml(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings: GanSettings = toml::from_str(&content)?;
        Ok(settings)
    }

    /// Save settings to a TOML file
    pub fn save_toml(&self, path: &str) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Weight decay for the generator optimizer
    pub fn g_weight_decay(&self) -> f64 {
        self.g_regularizer.map_or(0.0, |r| r.weight_decay())
    }

    /// Weight decay for the discriminator optimizer
    pub fn d_weight_decay(&self) -> f64 {
        self.d_regularizer.map_or(0.0, |r| r.weight_decay())
    }

    /// Validate the hyperparameter set
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.g_ksize < 1 || self.g_ksize % 2 == 0 {
            anyhow::bail!("Generator kernel size must be odd and >= 1");
        }
        if self.d_ksize < 1 || self.d_ksize % 2 == 0 {
            anyhow::bail!("Discriminator kernel size must be odd and >= 1");
        }
        if self.g_depth <= 0 || self.d_depth <= 0 {
            anyhow::bail!("Channel depths must be > 0");
        }
        if self.g_stages < 1 {
            anyhow::bail!("Generator must have at least one encode/decode stage");
        }
        if !self.d_loss_target.is_finite() || self.d_loss_target < 0.0 {
            anyhow::bail!("Discriminator loss target must be finite and >= 0");
        }
        if self.g_optimizer.learning_rate() <= 0.0 || self.d_optimizer.learning_rate() <= 0.0 {
            anyhow::bail!("Learning rates must be > 0");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::Device;

    #[test]
    fn test_settings_defaults() {
        let settings = GanSettings::default();
        assert!(!settings.input_mask);
        assert_eq!(settings.d_loss_target, 0.3);
        assert_eq!(settings.g_ksize, 5);
        assert_eq!(settings.g_depth, 64);
        assert_eq!(settings.d_depth, 32);
        assert_eq!(settings.g_activation, Activation::LeakyRelu);
        assert_eq!(settings.d_output_activation, Activation::Sigmoid);
        assert!(settings.g_regularizer.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_settings_json_roundtrip() {
        let settings = GanSettings::default();
        let json = serde_json::to_string(&settings).unwrap();
        let loaded: GanSettings = serde_json::from_str(&json).unwrap();

        assert_eq!(loaded.d_loss_target, settings.d_loss_target);
        assert_eq!(loaded.g_optimizer, settings.g_optimizer);
    }

    #[test]
    fn test_settings_merge_by_presence() {
        // An explicit zero/false must survive the default merge; only
        // absent keys fall back.
        let json = r#"{"d_loss_target": 0.0, "input_mask": true, "g_depth": 16}"#;
        let settings: GanSettings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.d_loss_target, 0.0);
        assert!(settings.input_mask);
        assert_eq!(settings.g_depth, 16);
        // Untouched keys keep their defaults
        assert_eq!(settings.d_depth, 32);
        assert_eq!(settings.g_ksize, 5);
    }

    #[test]
    fn test_settings_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gan.json");
        let path = path.to_str().unwrap();

        let mut settings = GanSettings::default();
        settings.g_ksize = 3;
        settings.save_json(path).unwrap();

        let loaded = GanSettings::from_json(path).unwrap();
        assert_eq!(loaded.g_ksize, 3);
    }

    #[test]
    fn test_settings_validation() {
        let mut settings = GanSettings::default();
        assert!(settings.validate().is_ok());

        settings.g_ksize = 4;
        assert!(settings.validate().is_err());

        settings.g_ksize = 5;
        settings.g_stages = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_shape_from_tuples() {
        let shape: SampleShape = (8, 8).into();
        assert_eq!(shape.depth, 1);

        let shape: SampleShape = (16, 8, 3).into();
        assert_eq!(shape.num_elements(), 16 * 8 * 3);
        assert_eq!(shape.chw(), [3, 8, 16]);
    }

    #[test]
    fn test_optimizer_builds_fresh_instances() {
        let vs = nn::VarStore::new(Device::Cpu);
        let _w = vs.root().zeros("w", &[4]);

        let kind = OptimizerKind::Adam { lr: 1e-3 };
        assert!(kind.build(&vs, 0.0).is_ok());
        // A second build must succeed independently of the first
        assert!(kind.build(&vs, 0.1).is_ok());
    }

    #[test]
    fn test_activation_apply() {
        let xs = Tensor::from_slice(&[-1.0f32, 0.0, 2.0]);
        let out = Activation::Relu.apply(&xs);
        let values: Vec<f32> = Vec::try_from(out).unwrap();
        assert_eq!(values, vec![0.0, 0.0, 2.0]);

        let out = Activation::Sigmoid.apply(&xs);
        let values: Vec<f32> = Vec::try_from(out).unwrap();
        assert!(values.iter().all(|v| (0.0..=1.0).contains(v)));
    }
}
