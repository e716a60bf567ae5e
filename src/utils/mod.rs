//! Utility module
//!
//! This module provides:
//! - Hyperparameter settings with defaults and file load/save
//! - Sample shape handling

mod config;

pub use config::{Activation, GanSettings, OptimizerKind, Regularizer, SampleShape};
