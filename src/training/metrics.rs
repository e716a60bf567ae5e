//! Training history for monitoring adversarial progress

use std::fmt;
use std::str::FromStr;

/// Which network a given epoch updated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateBranch {
    Discriminator,
    Generator,
}

impl fmt::Display for UpdateBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateBranch::Discriminator => write!(f, "discriminator"),
            UpdateBranch::Generator => write!(f, "generator"),
        }
    }
}

impl FromStr for UpdateBranch {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "discriminator" => Ok(UpdateBranch::Discriminator),
            "generator" => Ok(UpdateBranch::Generator),
            other => anyhow::bail!("Unknown update branch: {}", other),
        }
    }
}

/// Per-epoch metrics collected during training
#[derive(Debug, Clone, Default)]
pub struct TrainingHistory {
    /// Branch taken each epoch
    pub branches: Vec<UpdateBranch>,
    /// Discriminator evaluation losses
    pub d_losses: Vec<f64>,
    /// Composite reconstruction losses
    pub g_mse_losses: Vec<f64>,
    /// Composite adversarial losses
    pub g_adv_losses: Vec<f64>,
    /// Eval-set accuracy on ground-truth targets
    pub real_accuracies: Vec<f64>,
    /// Eval-set accuracy on generated output
    pub fake_accuracies: Vec<f64>,
}

impl TrainingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one epoch
    pub fn record_epoch(
        &mut self,
        branch: UpdateBranch,
        d_loss: f64,
        g_mse: f64,
        g_adv: f64,
        real_acc: f64,
        fake_acc: f64,
    ) {
        self.branches.push(branch);
        self.d_losses.push(d_loss);
        self.g_mse_losses.push(g_mse);
        self.g_adv_losses.push(g_adv);
        self.real_accuracies.push(real_acc);
        self.fake_accuracies.push(fake_acc);
    }

    /// Number of recorded epochs
    pub fn num_epochs(&self) -> usize {
        self.d_losses.len()
    }

    pub fn latest_d_loss(&self) -> Option<f64> {
        self.d_losses.last().copied()
    }

    pub fn latest_g_mse(&self) -> Option<f64> {
        self.g_mse_losses.last().copied()
    }

    pub fn latest_g_adv(&self) -> Option<f64> {
        self.g_adv_losses.last().copied()
    }

    /// Moving average of the discriminator loss over the last `window` epochs
    pub fn d_loss_ma(&self, window: usize) -> f64 {
        moving_average(&self.d_losses, window)
    }

    /// Moving average of the adversarial loss over the last `window` epochs
    pub fn g_adv_ma(&self, window: usize) -> f64 {
        moving_average(&self.g_adv_losses, window)
    }

    /// Whether the adversarial game looks balanced
    ///
    /// A discriminator that is neither blind nor perfect keeps both
    /// eval-set accuracies in a middle band.
    pub fn is_balanced(&self, window: usize) -> bool {
        if self.num_epochs() < window {
            return true;
        }

        let real = moving_average(&self.real_accuracies, window);
        let fake = moving_average(&self.fake_accuracies, window);
        (0.3..0.9).contains(&real) && (0.3..0.9).contains(&fake)
    }

    /// Save the history to a CSV file
    pub fn save_csv(&self, path: &str) -> anyhow::Result<()> {
        let mut writer = csv::Writer::from_path(path)?;

        writer.write_record([
            "epoch",
            "branch",
            "d_loss",
            "g_loss_mse",
            "g_loss_adversarial",
            "real_acc",
            "fake_acc",
        ])?;

        for i in 0..self.num_epochs() {
            writer.write_record([
                i.to_string(),
                self.branches[i].to_string(),
                self.d_losses[i].to_string(),
                self.g_mse_losses[i].to_string(),
                self.g_adv_losses[i].to_string(),
                self.real_accuracies[i].to_string(),
                self.fake_accuracies[i].to_string(),
            ])?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load a history from a CSV file
    pub fn load_csv(path: &str) -> anyhow::Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let mut history = Self::new();

        for result in reader.records() {
            let record = result?;
            history.branches.push(record[1].parse()?);
            history.d_losses.push(record[2].parse()?);
            history.g_mse_losses.push(record[3].parse()?);
            history.g_adv_losses.push(record[4].parse()?);
            history.real_accuracies.push(record[5].parse()?);
            history.fake_accuracies.push(record[6].parse()?);
        }

        Ok(history)
    }
}

fn moving_average(values: &[f64], window: usize) -> f64 {
    if values.is_empty() {
        return 0.0;
    }

    let n = window.min(values.len());
    let sum: f64 = values.iter().rev().take(n).sum();
    sum / n as f64
}
