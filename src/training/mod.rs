//! Training module
//!
//! This module provides:
//! - The adversarial training loop with its per-epoch gating rule
//! - Loss functions and label conventions
//! - Per-epoch training history

mod losses;
mod metrics;
mod trainer;

pub use losses::{
    adversarial_loss, composite_loss, reconstruction_loss, GENERATED_LABEL, REAL_LABEL,
    RECONSTRUCTION_WEIGHT,
};
pub use metrics::{TrainingHistory, UpdateBranch};
pub use trainer::{
    discriminator_step, generator_step, should_update_discriminator, Trainer,
};
