use crate::common::*;
use tch_tensor_like::TensorLike;

/// The regions sampled from one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledRois {
    /// Region indices, foreground regions first.
    pub indices: Vec<usize>,
    /// The number of leading foreground regions in `indices`.
    pub num_fg: usize,
}

/// Samples a fixed budget of regions per image with a foreground quota.
#[derive(Debug, Clone)]
pub struct RoiSampler {
    pub thresholds: RoiThresholds,
    pub rois_per_image: usize,
    pub fg_rois_per_image: usize,
}

impl RoiSampler {
    pub fn new(
        thresholds: RoiThresholds,
        batch_size: usize,
        ims_per_batch: usize,
        fg_fraction: R64,
    ) -> Result<Self> {
        ensure!(
            ims_per_batch > 0 && batch_size % ims_per_batch == 0,
            "batch_size {} must be multiple of ims_per_batch {}",
            batch_size,
            ims_per_batch
        );
        let rois_per_image = batch_size / ims_per_batch;
        let fg_rois_per_image = (fg_fraction.raw() * rois_per_image as f64).round() as usize;

        Ok(Self {
            thresholds,
            rois_per_image,
            fg_rois_per_image,
        })
    }

    /// Draws foreground regions up to the quota and fills the rest of the
    /// budget with background regions, both without replacement.
    pub fn sample<R>(&self, entry: &RoidbEntry, rng: &mut R) -> SampledRois
    where
        R: Rng,
    {
        let fg_indices = self.thresholds.fg_indices(&entry.max_overlaps);
        let num_fg = self.fg_rois_per_image.min(fg_indices.len());
        let fg_indices = fg_indices.choose_multiple(rng, num_fg).copied();

        let bg_indices = self.thresholds.bg_indices(&entry.max_overlaps);
        let num_bg = (self.rois_per_image - num_fg).min(bg_indices.len());
        let bg_indices = bg_indices.choose_multiple(rng, num_bg).copied();

        SampledRois {
            indices: fg_indices.chain(bg_indices).collect(),
            num_fg,
        }
    }
}

/// The training input of one solver step.
#[derive(Debug, TensorLike)]
pub struct MiniBatch {
    /// Indices of the images in the roidb.
    #[tensor_like(clone)]
    pub image_indices: Vec<usize>,
    /// Region corners divided by image width and height.
    pub normalized_rois: Tensor,
    /// Class labels, zero for background.
    pub labels: Tensor,
    /// Regression targets in the `4 * num_classes` columns of their class.
    pub bbox_targets: Tensor,
    pub bbox_inside_weights: Tensor,
    pub bbox_outside_weights: Tensor,
    pub num_classes: usize,
}

impl MiniBatch {
    /// Assembles the sampled regions of several images.
    pub fn new(roidb: &Roidb, samples: &[(usize, SampledRois)]) -> Self {
        let num_classes = roidb.num_classes();
        let num_cols = 4 * num_classes;
        let num_rois: usize = samples.iter().map(|(_, sample)| sample.indices.len()).sum();

        let mut normalized_rois = Vec::with_capacity(num_rois * 4);
        let mut labels = Vec::with_capacity(num_rois);
        let mut bbox_targets = vec![0f32; num_rois * num_cols];
        let mut bbox_inside_weights = vec![0f32; num_rois * num_cols];

        let rows = samples.iter().flat_map(|(image_index, sample)| {
            let entry = &roidb.entries[*image_index];
            sample
                .indices
                .iter()
                .enumerate()
                .map(move |(rank, &roi_index)| (entry, rank < sample.num_fg, roi_index))
        });

        for (row, (entry, is_fg, roi_index)) in rows.enumerate() {
            let bbox = entry.boxes[roi_index];
            let (width, height) = (entry.width as f64, entry.height as f64);

            normalized_rois.extend([
                (bbox.x1 / width) as f32,
                (bbox.y1 / height) as f32,
                (bbox.x2 / width) as f32,
                (bbox.y2 / height) as f32,
            ]);
            labels.push(if is_fg {
                entry.max_classes[roi_index] as i64
            } else {
                0
            });

            let BboxTarget { class, deltas } = entry.bbox_target(roi_index);
            if class > 0 {
                let begin = row * num_cols + 4 * class;
                izip!(&mut bbox_targets[begin..(begin + 4)], deltas)
                    .for_each(|(dst, delta)| *dst = delta as f32);
                bbox_inside_weights[begin..(begin + 4)].fill(1.0);
            }
        }

        let num_rois = num_rois as i64;
        let num_cols = num_cols as i64;
        let bbox_inside_weights = Tensor::of_slice(&bbox_inside_weights).view([num_rois, num_cols]);
        let bbox_outside_weights = bbox_inside_weights.gt(0.0).to_kind(Kind::Float);

        Self {
            image_indices: samples.iter().map(|(image_index, _)| *image_index).collect(),
            normalized_rois: Tensor::of_slice(&normalized_rois).view([num_rois, 4]),
            labels: Tensor::of_slice(&labels),
            bbox_targets: Tensor::of_slice(&bbox_targets).view([num_rois, num_cols]),
            bbox_inside_weights,
            bbox_outside_weights,
            num_classes,
        }
    }

    pub fn num_rois(&self) -> usize {
        self.labels.size1().unwrap_or(0) as usize
    }
}
