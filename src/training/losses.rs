//! Loss functions for adversarial training
//!
//! Binary cross-entropy over discriminator probabilities plus the weighted
//! reconstruction objective for the composite graph.

use tch::{Reduction, Tensor};

/// Label assigned to ground-truth targets when training the discriminator.
///
/// Note the polarity: this implementation labels real targets 0 and
/// generated output 1, the reverse of the common GAN convention. The
/// gating heuristic and the generator's fooling objective are calibrated
/// against it, so it must not be flipped in isolation.
pub const REAL_LABEL: f64 = 0.0;

/// Label assigned to generator output when training the discriminator
pub const GENERATED_LABEL: f64 = 1.0;

/// Weight of the reconstruction term in the composite loss
pub const RECONSTRUCTION_WEIGHT: f64 = 1e4;

/// Binary cross-entropy between discriminator probabilities and a constant
/// label
pub fn adversarial_loss(probs: &Tensor, label: f64) -> Tensor {
    let targets = Tensor::full_like(probs, label);
    probs.binary_cross_entropy::<Tensor>(&targets, None, Reduction::Mean)
}

/// Mean squared error between generator output and the ground-truth target
pub fn reconstruction_loss(output: &Tensor, target: &Tensor) -> Tensor {
    output.mse_loss(target, Reduction::Mean)
}

/// Composite objective: weighted reconstruction plus the adversarial term
/// pushing the discriminator's verdict toward `label`
///
/// Returns `(total, reconstruction, adversarial)`; the individual terms are
/// unweighted.
pub fn composite_loss(
    output: &Tensor,
    target: &Tensor,
    verdict: &Tensor,
    label: f64,
) -> (Tensor, Tensor, Tensor) {
    let mse = reconstruction_loss(output, target);
    let adv = adversarial_loss(verdict, label);
    let total = &mse * RECONSTRUCTION_WEIGHT + &adv;
    (total, mse, adv)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    #[test]
    fn test_adversarial_loss_scalar() {
        let probs = Tensor::rand([4, 1], (Kind::Float, Device::Cpu));
        let loss = adversarial_loss(&probs, GENERATED_LABEL);

        assert_eq!(loss.size(), Vec::<i64>::new());
        assert!(loss.double_value(&[]) >= 0.0);
    }

    #[test]
    fn test_adversarial_loss_confident_predictions() {
        // Probabilities matching the label produce a near-zero loss
        let probs = Tensor::full([4, 1], 0.999, (Kind::Float, Device::Cpu));
        let matched = adversarial_loss(&probs, GENERATED_LABEL);
        let mismatched = adversarial_loss(&probs, REAL_LABEL);

        assert!(matched.double_value(&[]) < 0.01);
        assert!(mismatched.double_value(&[]) > 1.0);
    }

    #[test]
    fn test_reconstruction_loss() {
        let output = Tensor::zeros([2, 1, 4, 4], (Kind::Float, Device::Cpu));
        let target = Tensor::ones([2, 1, 4, 4], (Kind::Float, Device::Cpu));
        let loss = reconstruction_loss(&output, &target);

        assert!((loss.double_value(&[]) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_composite_loss_weighting() {
        let output = Tensor::zeros([2, 1, 4, 4], (Kind::Float, Device::Cpu));
        let target = Tensor::ones([2, 1, 4, 4], (Kind::Float, Device::Cpu));
        let verdict = Tensor::full([2, 1], 0.5, (Kind::Float, Device::Cpu));

        let (total, mse, adv) = composite_loss(&output, &target, &verdict, REAL_LABEL);

        let expected = mse.double_value(&[]) * RECONSTRUCTION_WEIGHT + adv.double_value(&[]);
        assert!((total.double_value(&[]) - expected).abs() < 1e-3);
    }
}
