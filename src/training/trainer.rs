//! Adversarial training loop
//!
//! Each epoch either strengthens the discriminator or the generator, never
//! both: the discriminator is updated until its evaluation loss drops to
//! the configured target, after which epochs switch to composite
//! (generator) updates until the discriminator falls behind again. Epoch 0
//! always updates the discriminator so the gating loss is initialized.

use indicatif::{ProgressBar, ProgressStyle};
use tch::{nn, nn::Module, Kind, Tensor};
use tracing::{info, warn};

use crate::data::BatchPlan;
use crate::model::Gan;

use super::losses::{adversarial_loss, composite_loss, GENERATED_LABEL, REAL_LABEL};
use super::metrics::{TrainingHistory, UpdateBranch};

/// Decide which branch an epoch runs
///
/// Epoch 0 always updates the discriminator; afterwards the discriminator
/// is updated only while its last evaluation loss exceeds the target. A
/// loss exactly at the target switches to the generator.
pub fn should_update_discriminator(epoch: usize, d_loss: Option<f64>, target: f64) -> bool {
    epoch == 0 || d_loss.map_or(true, |loss| loss > target)
}

/// One discriminator update on a batch: an optimizer step on the real
/// targets labeled `REAL_LABEL`, then one on generated output labeled
/// `GENERATED_LABEL`. The generator runs without gradients.
///
/// Returns the two batch losses.
pub fn discriminator_step(
    model: &mut Gan,
    opt: &mut nn::Optimizer,
    batch_x: &Tensor,
    batch_y: &Tensor,
) -> (f64, f64) {
    model.set_discriminator_trainable(true);

    let fakes = tch::no_grad(|| model.generator().forward(batch_x));

    let real_loss = adversarial_loss(&model.discriminator().forward(batch_y), REAL_LABEL);
    opt.zero_grad();
    real_loss.backward();
    opt.step();

    let fake_loss = adversarial_loss(&model.discriminator().forward(&fakes), GENERATED_LABEL);
    opt.zero_grad();
    fake_loss.backward();
    opt.step();

    (real_loss.double_value(&[]), fake_loss.double_value(&[]))
}

/// One composite update on a batch: the generator is pushed toward the
/// target image and toward a `REAL_LABEL` verdict, with the discriminator
/// frozen so the shared parameters cannot move.
///
/// Returns the total batch loss.
pub fn generator_step(
    model: &mut Gan,
    opt: &mut nn::Optimizer,
    batch_x: &Tensor,
    batch_y: &Tensor,
) -> f64 {
    model.set_discriminator_trainable(false);

    let (output, verdict) = model.composite_forward(batch_x);
    let (total, _mse, _adv) = composite_loss(&output, batch_y, &verdict, REAL_LABEL);
    opt.zero_grad();
    total.backward();
    opt.step();

    model.set_discriminator_trainable(true);
    total.double_value(&[])
}

/// Adversarial trainer holding the gating state and the epoch history
#[derive(Debug, Default)]
pub struct Trainer {
    history: TrainingHistory,
    d_loss: Option<f64>,
    g_loss_mse: Option<f64>,
    g_loss_adv: Option<f64>,
}

impl Trainer {
    /// Create a new trainer with empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest discriminator evaluation loss
    pub fn d_loss(&self) -> Option<f64> {
        self.d_loss
    }

    /// Latest composite reconstruction loss
    pub fn g_loss_mse(&self) -> Option<f64> {
        self.g_loss_mse
    }

    /// Latest composite adversarial loss
    pub fn g_loss_adversarial(&self) -> Option<f64> {
        self.g_loss_adv
    }

    /// Get the recorded history
    pub fn history(&self) -> &TrainingHistory {
        &self.history
    }

    /// Consume the trainer, returning the recorded history
    pub fn into_history(self) -> TrainingHistory {
        self.history
    }

    /// Run the adversarial loop
    ///
    /// # Arguments
    ///
    /// * `model` - GAN to train
    /// * `x` - Input samples, reshaped to (count, depth, height, width)
    /// * `y` - Target samples, same count and shape as `x`
    /// * `epochs` - Number of epochs
    /// * `batches` - Number of batches per epoch; each holds
    ///   `floor(count / batches)` samples and trailing remainder samples
    ///   are dropped
    /// * `callback` - Invoked once per epoch with
    ///   `(epoch, [g_loss_mse, g_loss_adversarial], d_loss)`
    pub fn train(
        &mut self,
        model: &mut Gan,
        x: &Tensor,
        y: &Tensor,
        epochs: usize,
        batches: usize,
        mut callback: Option<&mut dyn FnMut(usize, [f64; 2], f64)>,
    ) -> anyhow::Result<()> {
        let device = model.device();
        let [depth, height, width] = model.shape().chw();
        let x = x.to_device(device).reshape([-1, depth, height, width]);
        let y = y.to_device(device).reshape([-1, depth, height, width]);

        let count = x.size()[0];
        if count != y.size()[0] {
            anyhow::bail!(
                "Input and target sample counts differ: {} vs {}",
                count,
                y.size()[0]
            );
        }
        let plan = BatchPlan::new(count as usize, batches)?;
        if plan.dropped() > 0 {
            warn!(
                "Batch partition drops {} trailing samples ({} batches of {})",
                plan.dropped(),
                plan.num_batches(),
                plan.batch_size()
            );
        }

        // Both optimizers are built while the discriminator is trainable;
        // the generator branch re-freezes it around every composite step.
        model.set_discriminator_trainable(true);
        let mut d_opt = model.disc_optimizer()?;
        let mut g_opt = model.gen_optimizer()?;

        let d_loss_target = model.settings().d_loss_target;
        info!(
            "Starting adversarial training: {} epochs, {} batches of {} samples",
            epochs,
            plan.num_batches(),
            plan.batch_size()
        );

        for epoch in 0..epochs {
            let update_disc = should_update_discriminator(epoch, self.d_loss, d_loss_target);
            let branch = if update_disc {
                UpdateBranch::Discriminator
            } else {
                UpdateBranch::Generator
            };

            let pb = ProgressBar::new(plan.num_batches() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                    .unwrap()
                    .progress_chars("##-"),
            );

            for (start, len) in plan.ranges() {
                let batch_x = x.narrow(0, start, len);
                let batch_y = y.narrow(0, start, len);

                let batch_loss = if update_disc {
                    let (real_loss, fake_loss) =
                        discriminator_step(model, &mut d_opt, &batch_x, &batch_y);
                    real_loss + fake_loss
                } else {
                    generator_step(model, &mut g_opt, &batch_x, &batch_y)
                };

                pb.set_message(format!("{}: {:.4}", branch, batch_loss));
                pb.inc(1);
            }
            pb.finish_and_clear();

            let (d_loss, real_acc, fake_acc, g_mse, g_adv) = evaluate(model, &x, &y);
            self.d_loss = Some(d_loss);
            self.g_loss_mse = Some(g_mse);
            self.g_loss_adv = Some(g_adv);
            self.history
                .record_epoch(branch, d_loss, g_mse, g_adv, real_acc, fake_acc);

            info!(
                "Epoch {}/{} [{}]: d_loss={:.4}, g_mse={:.4}, g_adv={:.4}",
                epoch + 1,
                epochs,
                branch,
                d_loss,
                g_mse,
                g_adv
            );

            if !self.history.is_balanced(10) {
                warn!("Adversarial balance drifting; consider adjusting learning rates.");
            }

            if let Some(cb) = callback.as_mut() {
                cb(epoch, [g_mse, g_adv], d_loss);
            }
        }

        Ok(())
    }
}

/// Whole-dataset evaluation at the end of an epoch
///
/// The discriminator is scored on the concatenation of generated output
/// (labeled `GENERATED_LABEL`) and the ground-truth targets (labeled
/// `REAL_LABEL`); that loss drives the next epoch's gating decision. The
/// composite graph is scored against the targets with label
/// `GENERATED_LABEL`, matching the original evaluation convention rather
/// than the fooling label used for updates.
///
/// Returns `(d_loss, real_acc, fake_acc, g_mse, g_adv)`.
fn evaluate(model: &Gan, x: &Tensor, y: &Tensor) -> (f64, f64, f64, f64, f64) {
    tch::no_grad(|| {
        let device = model.device();
        let count = x.size()[0];

        let fakes = model.generator().forward(x);
        let eval_x = Tensor::cat(&[&fakes, y], 0);
        let eval_labels = Tensor::cat(
            &[
                Tensor::full([count, 1], GENERATED_LABEL, (Kind::Float, device)),
                Tensor::full([count, 1], REAL_LABEL, (Kind::Float, device)),
            ],
            0,
        );

        let probs = model.discriminator().forward(&eval_x);
        let d_loss = probs
            .binary_cross_entropy::<Tensor>(&eval_labels, None, tch::Reduction::Mean)
            .double_value(&[]);

        // Generated samples carry label 1, targets label 0
        let fake_acc = probs
            .narrow(0, 0, count)
            .ge(0.5)
            .to_kind(Kind::Float)
            .mean(Kind::Float)
            .double_value(&[]);
        let real_acc = probs
            .narrow(0, count, count)
            .lt(0.5)
            .to_kind(Kind::Float)
            .mean(Kind::Float)
            .double_value(&[]);

        let verdict = model.discriminator().forward(&fakes);
        let g_mse = fakes
            .mse_loss(y, tch::Reduction::Mean)
            .double_value(&[]);
        let g_adv = adversarial_loss(&verdict, GENERATED_LABEL).double_value(&[]);

        (d_loss, real_acc, fake_acc, g_mse, g_adv)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::GanSettings;
    use tch::Device;

    fn small_settings() -> GanSettings {
        GanSettings {
            g_ksize: 3,
            g_depth: 8,
            d_ksize: 3,
            d_depth: 8,
            ..Default::default()
        }
    }

    fn small_gan() -> Gan {
        Gan::new((8, 8, 1), small_settings(), Device::Cpu).unwrap()
    }

    fn snapshot(variables: &[(String, Tensor)]) -> Vec<(String, Vec<f32>)> {
        variables
            .iter()
            .map(|(name, tensor)| {
                let values: Vec<f32> = Vec::try_from(tensor.flatten(0, -1)).unwrap();
                (name.clone(), values)
            })
            .collect()
    }

    #[test]
    fn test_gating_epoch_zero_always_discriminator() {
        assert!(should_update_discriminator(0, None, 0.3));
        // A pre-set loss below the target does not override epoch 0
        assert!(should_update_discriminator(0, Some(0.0), 0.3));
    }

    #[test]
    fn test_gating_boundary() {
        // Missing loss after epoch 0 still forces a discriminator update
        assert!(should_update_discriminator(1, None, 0.3));
        // Above target: keep training the discriminator
        assert!(should_update_discriminator(1, Some(0.31), 0.3));
        // At or below target: switch to the generator
        assert!(!should_update_discriminator(1, Some(0.3), 0.3));
        assert!(!should_update_discriminator(1, Some(0.1), 0.3));
    }

    #[test]
    fn test_generator_step_leaves_discriminator_untouched() {
        let mut gan = small_gan();
        let x = Tensor::randn([2, 1, 8, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::randn([2, 1, 8, 8], (Kind::Float, Device::Cpu));

        let mut g_opt = gan.gen_optimizer().unwrap();
        let disc_before = snapshot(&gan.discriminator_variables());
        let gen_before = snapshot(&gan.generator_variables());

        generator_step(&mut gan, &mut g_opt, &x, &y);

        // Discriminator parameters are bit-identical after a composite step
        assert_eq!(snapshot(&gan.discriminator_variables()), disc_before);
        // The generator itself did move
        assert_ne!(snapshot(&gan.generator_variables()), gen_before);
    }

    #[test]
    fn test_discriminator_step_updates_parameters() {
        let mut gan = small_gan();
        let x = Tensor::randn([2, 1, 8, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::randn([2, 1, 8, 8], (Kind::Float, Device::Cpu));

        let mut d_opt = gan.disc_optimizer().unwrap();
        let before = snapshot(&gan.discriminator_variables());

        discriminator_step(&mut gan, &mut d_opt, &x, &y);

        assert_ne!(snapshot(&gan.discriminator_variables()), before);
    }

    #[test]
    fn test_train_end_to_end() {
        let mut gan = small_gan();

        // 4 all-zero inputs mapping to all-one targets
        let x = Tensor::zeros([4, 1, 8, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::ones([4, 1, 8, 8], (Kind::Float, Device::Cpu));

        let mut calls = Vec::new();
        let mut callback = |epoch: usize, g_losses: [f64; 2], d_loss: f64| {
            calls.push((epoch, g_losses, d_loss));
        };

        let history = gan.train(&x, &y, 2, 1, Some(&mut callback)).unwrap();

        assert_eq!(history.num_epochs(), 2);
        assert_eq!(history.branches[0], UpdateBranch::Discriminator);
        assert!(history.latest_d_loss().unwrap().is_finite());
        assert!(history.latest_g_mse().unwrap().is_finite());
        assert!(history.latest_g_adv().unwrap().is_finite());

        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, 0);
        assert_eq!(calls[1].0, 1);
        assert!(calls[1].2.is_finite());

        // Inference on a single sample after training
        let sample = Tensor::zeros([1, 8, 8], (Kind::Float, Device::Cpu));
        let output = gan.generate(&sample);
        assert_eq!(output.size(), vec![1, 8, 8]);
        let values: Vec<f32> = Vec::try_from(output.flatten(0, -1)).unwrap();
        assert!(values.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_train_branch_switching() {
        // An unreachable target keeps every post-zero epoch on the
        // generator branch
        let mut settings = small_settings();
        settings.d_loss_target = 1e9;
        let mut gan = Gan::new((8, 8, 1), settings, Device::Cpu).unwrap();

        let x = Tensor::randn([4, 1, 8, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::randn([4, 1, 8, 8], (Kind::Float, Device::Cpu));

        let history = gan.train(&x, &y, 3, 2, None).unwrap();
        assert_eq!(
            history.branches,
            vec![
                UpdateBranch::Discriminator,
                UpdateBranch::Generator,
                UpdateBranch::Generator
            ]
        );

        // A zero target (explicitly set, not defaulted) pins every epoch
        // to the discriminator branch
        let mut settings = small_settings();
        settings.d_loss_target = 0.0;
        let mut gan = Gan::new((8, 8, 1), settings, Device::Cpu).unwrap();

        let history = gan.train(&x, &y, 3, 2, None).unwrap();
        assert_eq!(
            history.branches,
            vec![
                UpdateBranch::Discriminator,
                UpdateBranch::Discriminator,
                UpdateBranch::Discriminator
            ]
        );
    }

    #[test]
    fn test_train_rejects_bad_arguments() {
        let mut gan = small_gan();
        let x = Tensor::zeros([4, 1, 8, 8], (Kind::Float, Device::Cpu));
        let y = Tensor::zeros([3, 1, 8, 8], (Kind::Float, Device::Cpu));

        // Mismatched sample counts
        assert!(gan.train(&x, &y, 1, 1, None).is_err());

        let y = Tensor::zeros([4, 1, 8, 8], (Kind::Float, Device::Cpu));
        // Zero batches
        assert!(gan.train(&x, &y, 1, 0, None).is_err());
        // More batches than samples
        assert!(gan.train(&x, &y, 1, 5, None).is_err());
    }
}
