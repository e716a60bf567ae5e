//! Data handling for the training loop
//!
//! This module provides batch partitioning; sample loading and
//! normalization live with the callers that own the data format.

mod batches;

pub use batches::BatchPlan;
