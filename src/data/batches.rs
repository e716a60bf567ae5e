//! Batch partitioning for the training loop

/// Partition of a dataset into a fixed number of equally sized batches
///
/// Each of the `batches` batches holds `floor(sample_count / batches)`
/// consecutive samples; trailing samples that do not fill a batch are
/// dropped, matching the modeled training semantics.
#[derive(Debug, Clone, Copy)]
pub struct BatchPlan {
    sample_count: usize,
    batches: usize,
    batch_size: usize,
}

impl BatchPlan {
    /// Plan `batches` batches over `sample_count` samples
    pub fn new(sample_count: usize, batches: usize) -> anyhow::Result<Self> {
        if batches == 0 {
            anyhow::bail!("Batch count must be > 0");
        }
        if batches > sample_count {
            anyhow::bail!(
                "Batch count {} exceeds sample count {}",
                batches,
                sample_count
            );
        }

        Ok(Self {
            sample_count,
            batches,
            batch_size: sample_count / batches,
        })
    }

    /// Samples per batch
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Number of batches
    pub fn num_batches(&self) -> usize {
        self.batches
    }

    /// Samples covered by the partition
    pub fn covered(&self) -> usize {
        self.batches * self.batch_size
    }

    /// Trailing samples left out of every batch
    pub fn dropped(&self) -> usize {
        self.sample_count - self.covered()
    }

    /// Iterate over `(start, length)` ranges, ready for tensor narrowing
    pub fn ranges(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        let batch_size = self.batch_size;
        (0..self.batches).map(move |b| ((b * batch_size) as i64, batch_size as i64))
    }
}
