use super::{MiniBatch, RoiSampler};
use crate::{common::*, config::TrainingConfig};

/// Options of the data-feeding layer.
#[derive(Debug, Clone)]
pub struct DataLayerConfig {
    pub thresholds: RoiThresholds,
    pub fg_fraction: R64,
    pub batch_size: usize,
    pub ims_per_batch: usize,
}

impl From<&TrainingConfig> for DataLayerConfig {
    fn from(from: &TrainingConfig) -> Self {
        Self {
            thresholds: from.thresholds(),
            fg_fraction: from.fg_fraction,
            batch_size: from.batch_size.get(),
            ims_per_batch: from.ims_per_batch.get(),
        }
    }
}

/// Feeds minibatches drawn from the roidb in shuffled order.
#[derive(Debug)]
pub struct RoiDataLayer {
    roidb: Arc<Roidb>,
    sampler: RoiSampler,
    ims_per_batch: usize,
    perm: Vec<usize>,
    cursor: usize,
    epoch: usize,
    rng: StdRng,
}

impl RoiDataLayer {
    pub fn new(roidb: Arc<Roidb>, config: &DataLayerConfig, seed: u64) -> Result<Self> {
        ensure!(!roidb.is_empty(), "the data layer requires a non-empty roidb");

        let DataLayerConfig {
            thresholds,
            fg_fraction,
            batch_size,
            ims_per_batch,
        } = *config;
        let sampler = RoiSampler::new(thresholds, batch_size, ims_per_batch, fg_fraction)?;

        let mut layer = Self {
            perm: (0..roidb.len()).collect(),
            roidb,
            sampler,
            ims_per_batch,
            cursor: 0,
            epoch: 0,
            rng: StdRng::seed_from_u64(seed),
        };
        layer.perm.shuffle(&mut layer.rng);

        Ok(layer)
    }

    /// The number of completed passes over the roidb.
    pub fn epoch(&self) -> usize {
        self.epoch
    }

    /// Draws the minibatch of the next step.
    pub fn next_minibatch(&mut self) -> MiniBatch {
        let image_indices = self.next_minibatch_indices();
        let samples: Vec<_> = image_indices
            .into_iter()
            .map(|image_index| {
                let entry = &self.roidb.entries[image_index];
                (image_index, self.sampler.sample(entry, &mut self.rng))
            })
            .collect();

        MiniBatch::new(&self.roidb, &samples)
    }

    fn next_minibatch_indices(&mut self) -> Vec<usize> {
        if self.cursor + self.ims_per_batch > self.perm.len() {
            self.shuffle_roidb_indices();
        }

        let end = (self.cursor + self.ims_per_batch).min(self.perm.len());
        let indices = self.perm[self.cursor..end].to_vec();
        self.cursor = end;
        indices
    }

    fn shuffle_roidb_indices(&mut self) {
        self.perm.shuffle(&mut self.rng);
        self.cursor = 0;
        self.epoch += 1;
        debug!("start epoch {} of the data layer", self.epoch);
    }
}
