//! # Conditional Image-to-Image GAN
//!
//! This crate trains a conditional image-to-image generative adversarial
//! network: a generator maps an input image to a same-shape output, a
//! discriminator learns to tell generator output from ground-truth
//! targets, and the two are optimized against each other with a per-epoch
//! gating rule that pauses discriminator updates once it is good enough.
//!
//! Tensor math, autodiff and optimizer steps are delegated to libtorch
//! through the `tch` crate.
//!
//! ## Modules
//!
//! - `model`: Generator, Discriminator and the GAN wrapper with its
//!   composite graph
//! - `training`: Adversarial training loop, losses and history
//! - `data`: Batch partitioning
//! - `utils`: Hyperparameter settings and shapes
//!
//! ## Example
//!
//! ```no_run
//! use img2img_gan::{Gan, GanSettings};
//! use tch::{Device, Kind, Tensor};
//!
//! let mut gan = Gan::new((32, 32, 1), GanSettings::default(), Device::Cpu)?;
//! let x = Tensor::zeros([16, 1, 32, 32], (Kind::Float, Device::Cpu));
//! let y = Tensor::ones([16, 1, 32, 32], (Kind::Float, Device::Cpu));
//! let history = gan.train(&x, &y, 10, 4, None)?;
//! println!("final d_loss: {:?}", history.latest_d_loss());
//! # Ok::<(), anyhow::Error>(())
//! ```

pub mod data;
pub mod model;
pub mod training;
pub mod utils;

pub use data::BatchPlan;
pub use model::{Discriminator, Gan, Generator};
pub use training::{Trainer, TrainingHistory, UpdateBranch};
pub use utils::{Activation, GanSettings, OptimizerKind, Regularizer, SampleShape};
