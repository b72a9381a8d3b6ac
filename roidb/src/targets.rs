//! Bounding-box regression targets and their normalization statistics.

use crate::{bbox_transform, common::*, BboxTarget, Roidb, RoidbEntry, EPS};

/// Options of regression target computation.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetOptions {
    /// Regions overlapping a ground truth box at least this much get a target.
    pub bbox_thresh: f64,
    /// If set, targets are normalized to zero mean and unit variance in place.
    pub normalize_targets: bool,
    /// If set, these `(means, stds)` are used for every class instead of
    /// statistics computed from the roidb.
    pub precomputed: Option<([f64; 4], [f64; 4])>,
}

/// Per-class means and standard deviations of regression targets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BboxNormalizationStats {
    means: Vec<[f64; 4]>,
    stds: Vec<[f64; 4]>,
}

impl BboxNormalizationStats {
    /// Repeats the given statistics for every class.
    pub fn precomputed(num_classes: usize, means: [f64; 4], stds: [f64; 4]) -> Result<Self> {
        ensure!(
            stds.iter().all(|&std| std.is_finite() && std > 0.0),
            "precomputed stds must be positive, but get {:?}",
            stds
        );

        Ok(Self {
            means: vec![means; num_classes],
            stds: vec![stds; num_classes],
        })
    }

    /// Computes statistics over the targets of foreground regions.
    ///
    /// A class without targets, or a dimension with vanishing variance, gets
    /// a unit std so that stds are never zero.
    pub fn from_roidb(roidb: &Roidb) -> Self {
        let num_classes = roidb.num_classes();
        let mut counts = vec![0usize; num_classes];
        let mut sums = vec![[0f64; 4]; num_classes];
        let mut squared_sums = vec![[0f64; 4]; num_classes];

        roidb
            .entries
            .iter()
            .flat_map(|entry| &entry.bbox_targets)
            .filter(|target| target.has_target())
            .for_each(|target| {
                let BboxTarget { class, deltas } = *target;
                counts[class] += 1;
                izip!(&mut sums[class], &mut squared_sums[class], deltas).for_each(
                    |(sum, squared_sum, delta)| {
                        *sum += delta;
                        *squared_sum += delta * delta;
                    },
                );
            });

        let (means, stds): (Vec<_>, Vec<_>) = izip!(counts, sums, squared_sums)
            .enumerate()
            .map(|(class, (count, sums, squared_sums))| {
                if count == 0 {
                    return ([0.0; 4], [1.0; 4]);
                }

                let count = count as f64;
                let mut means = [0.0; 4];
                let mut stds = [0.0; 4];

                izip!(&mut means, &mut stds, sums, squared_sums).for_each(
                    |(mean, std, sum, squared_sum)| {
                        *mean = sum / count;
                        let var = (squared_sum / count - *mean * *mean).max(0.0);
                        *std = var.sqrt();

                        if *std < EPS {
                            warn!("degenerated regression target std for class {}", class);
                            *std = 1.0;
                        }
                    },
                );

                (means, stds)
            })
            .unzip();

        Self { means, stds }
    }

    pub fn num_classes(&self) -> usize {
        self.means.len()
    }

    pub fn means(&self) -> &[[f64; 4]] {
        &self.means
    }

    pub fn stds(&self) -> &[[f64; 4]] {
        &self.stds
    }

    /// Means laid out as `num_classes * 4` values, class major.
    pub fn flat_means(&self) -> Vec<f64> {
        self.means.iter().flatten().copied().collect()
    }

    /// Stds laid out as `num_classes * 4` values, class major.
    pub fn flat_stds(&self) -> Vec<f64> {
        self.stds.iter().flatten().copied().collect()
    }

    /// Normalizes a target in place. Targets of the background class are untouched.
    pub fn normalize(&self, target: &mut BboxTarget) {
        if !target.has_target() {
            return;
        }

        let means = &self.means[target.class];
        let stds = &self.stds[target.class];
        izip!(&mut target.deltas, means, stds).for_each(|(delta, mean, std)| {
            *delta = (*delta - mean) / std;
        });
    }
}

/// Computes the regression target of every region of an entry.
///
/// Regions overlapping a ground truth box by at least `bbox_thresh` are
/// assigned to the ground truth box they overlap most. Ground truth boxes are
/// the regions with overlap 1.
pub fn compute_targets(entry: &RoidbEntry, bbox_thresh: f64) -> Vec<BboxTarget> {
    let RoidbEntry {
        ref boxes,
        ref max_overlaps,
        ref max_classes,
        ..
    } = *entry;

    let gt_boxes: Vec<_> = izip!(boxes, max_overlaps)
        .filter(|(_, &overlap)| overlap >= 1.0)
        .map(|(bbox, _)| *bbox)
        .collect();

    if gt_boxes.is_empty() {
        return vec![BboxTarget::default(); boxes.len()];
    }

    izip!(boxes, max_overlaps, max_classes)
        .map(|(bbox, &overlap, &class)| {
            if overlap < bbox_thresh {
                return BboxTarget::default();
            }

            // the first ground truth box wins ties
            let gt_box = match gt_boxes
                .iter()
                .min_by(|lhs, rhs| bbox.iou(rhs).total_cmp(&bbox.iou(lhs)))
            {
                Some(gt_box) => gt_box,
                None => return BboxTarget::default(),
            };

            BboxTarget {
                class,
                deltas: bbox_transform(bbox, gt_box),
            }
        })
        .collect()
}

/// Attaches regression targets to every entry and returns the statistics
/// used to normalize them.
pub fn add_bbox_regression_targets(
    roidb: &mut Roidb,
    options: &TargetOptions,
) -> Result<BboxNormalizationStats> {
    ensure!(
        (0.0..=1.0).contains(&options.bbox_thresh),
        "bbox_thresh must lie in [0, 1]"
    );

    roidb.entries.iter_mut().for_each(|entry| {
        entry.bbox_targets = compute_targets(entry, options.bbox_thresh);
    });

    let stats = match options.precomputed {
        Some((means, stds)) => {
            BboxNormalizationStats::precomputed(roidb.num_classes(), means, stds)?
        }
        None => BboxNormalizationStats::from_roidb(roidb),
    };

    info!("bbox target means: {:?}", stats.means());
    info!("bbox target stds: {:?}", stats.stds());

    if options.normalize_targets {
        roidb
            .entries
            .iter_mut()
            .flat_map(|entry| &mut entry.bbox_targets)
            .for_each(|target| stats.normalize(target));
    }

    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::BoxCoords;
    use approx::assert_abs_diff_eq;

    fn classes(num: usize) -> IndexSet<String> {
        (0..num).map(|index| format!("class{}", index)).collect()
    }

    #[test]
    fn stats_over_known_targets() {
        let entry = RoidbEntry {
            image: "a.jpg".into(),
            width: 10,
            height: 10,
            boxes: vec![BoxCoords::new(0.0, 0.0, 1.0, 1.0); 3],
            max_overlaps: vec![1.0, 0.8, 0.0],
            max_classes: vec![1, 1, 0],
            flipped: false,
            bbox_targets: vec![
                BboxTarget {
                    class: 1,
                    deltas: [1.0, 2.0, 3.0, 4.0],
                },
                BboxTarget {
                    class: 1,
                    deltas: [3.0, 2.0, 1.0, 0.0],
                },
                BboxTarget::default(),
            ],
        };
        let roidb = Roidb::new(classes(3), vec![entry]);
        let stats = BboxNormalizationStats::from_roidb(&roidb);

        assert_eq!(stats.num_classes(), 3);
        assert_eq!(stats.means()[1], [2.0, 2.0, 2.0, 2.0]);
        // the constant dimension falls back to a unit std
        assert_eq!(stats.stds()[1], [1.0, 1.0, 1.0, 2.0]);
        // classes without targets
        assert_eq!(stats.means()[2], [0.0; 4]);
        assert_eq!(stats.stds()[2], [1.0; 4]);
        assert_eq!(stats.flat_stds().len(), 12);
    }

    #[test]
    fn targets_point_to_best_ground_truth() {
        let gt_a = BoxCoords::new(0.0, 0.0, 9.0, 9.0);
        let gt_b = BoxCoords::new(50.0, 50.0, 59.0, 59.0);
        let near_b = BoxCoords::new(50.0, 50.0, 59.0, 60.0);
        let entry = RoidbEntry {
            image: "a.jpg".into(),
            width: 100,
            height: 100,
            boxes: vec![gt_a, gt_b, near_b, BoxCoords::new(20.0, 20.0, 30.0, 30.0)],
            max_overlaps: vec![1.0, 1.0, gt_b.iou(&near_b), 0.0],
            max_classes: vec![1, 2, 2, 0],
            flipped: false,
            bbox_targets: vec![],
        };

        let targets = compute_targets(&entry, 0.5);
        assert_eq!(targets.len(), 4);
        assert_eq!(targets[0].class, 1);
        assert_eq!(targets[0].deltas, [0.0; 4]);
        assert_eq!(targets[2].class, 2);
        assert_eq!(targets[2].deltas, bbox_transform(&near_b, &gt_b));
        assert!(!targets[3].has_target());
    }

    #[test]
    fn tie_picks_first_ground_truth() {
        let gt_a = BoxCoords::new(0.0, 0.0, 9.0, 9.0);
        let gt_b = BoxCoords::new(10.0, 0.0, 19.0, 9.0);
        let between = BoxCoords::new(5.0, 0.0, 14.0, 9.0);
        assert_eq!(between.iou(&gt_a), between.iou(&gt_b));

        let entry = RoidbEntry {
            image: "a.jpg".into(),
            width: 100,
            height: 100,
            boxes: vec![gt_a, gt_b, between],
            max_overlaps: vec![1.0, 1.0, 0.5],
            max_classes: vec![1, 1, 1],
            flipped: false,
            bbox_targets: vec![],
        };

        let targets = compute_targets(&entry, 0.5);
        assert_eq!(targets[2].deltas, bbox_transform(&between, &gt_a));
        assert_ne!(targets[2].deltas, bbox_transform(&between, &gt_b));
    }

    #[test]
    fn no_ground_truth_no_targets() {
        let entry = RoidbEntry {
            image: "a.jpg".into(),
            width: 100,
            height: 100,
            boxes: vec![BoxCoords::new(0.0, 0.0, 9.0, 9.0)],
            max_overlaps: vec![0.7],
            max_classes: vec![1],
            flipped: false,
            bbox_targets: vec![],
        };
        assert_eq!(compute_targets(&entry, 0.5), vec![BboxTarget::default()]);
    }

    #[test]
    fn normalized_targets_have_zero_mean() -> Result<()> {
        let gt = BoxCoords::new(10.0, 10.0, 29.0, 29.0);
        let boxes = vec![
            gt,
            BoxCoords::new(12.0, 10.0, 29.0, 31.0),
            BoxCoords::new(8.0, 9.0, 27.0, 29.0),
            BoxCoords::new(10.0, 13.0, 31.0, 29.0),
        ];
        let max_overlaps = boxes.iter().map(|bbox| bbox.iou(&gt)).collect();
        let entry = RoidbEntry {
            image: "a.jpg".into(),
            width: 100,
            height: 100,
            max_classes: vec![1; boxes.len()],
            boxes,
            max_overlaps,
            flipped: false,
            bbox_targets: vec![],
        };
        let mut roidb = Roidb::new(classes(2), vec![entry]);
        let options = TargetOptions {
            bbox_thresh: 0.5,
            normalize_targets: true,
            precomputed: None,
        };
        let stats = add_bbox_regression_targets(&mut roidb, &options)?;

        let targets = &roidb.entries[0].bbox_targets;
        assert!(targets.iter().all(|target| target.class == 1));
        for dim in 0..4 {
            let mean = targets.iter().map(|target| target.deltas[dim]).sum::<f64>() / 4.0;
            assert_abs_diff_eq!(mean, 0.0, epsilon = 1e-9);
        }
        assert!(stats.stds()[1].iter().all(|&std| std > 0.0));
        Ok(())
    }

    #[test]
    fn precomputed_stats_are_tiled() -> Result<()> {
        let stats = BboxNormalizationStats::precomputed(3, [0.0; 4], [0.1, 0.1, 0.2, 0.2])?;
        assert_eq!(
            stats.flat_stds(),
            vec![0.1, 0.1, 0.2, 0.2, 0.1, 0.1, 0.2, 0.2, 0.1, 0.1, 0.2, 0.2]
        );
        assert!(BboxNormalizationStats::precomputed(3, [0.0; 4], [0.1, 0.0, 0.2, 0.2]).is_err());
        Ok(())
    }
}
