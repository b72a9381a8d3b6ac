//! The network adaptor.

use crate::{common::*, data::MiniBatch};

/// A network that turns a minibatch into a scalar training loss.
pub trait Network
where
    Self: Debug,
{
    fn forward_loss(&self, batch: &MiniBatch, train: bool) -> Result<Tensor>;
}

/// A detection head working on region geometry only.
///
/// It scores and regresses regions from their normalized corners, without
/// image features. The layer names follow the Fast R-CNN heads, so
/// `bbox_pred` is the regression layer.
#[derive(Debug)]
pub struct BaselineHead {
    fc: nn::Linear,
    cls_score: nn::Linear,
    bbox_pred: nn::Linear,
    num_classes: usize,
}

impl BaselineHead {
    pub fn new<'a>(path: impl Borrow<nn::Path<'a>>, num_classes: usize, hidden_dim: usize) -> Self {
        let path = path.borrow();
        let num_classes_i64 = num_classes as i64;
        let hidden_dim = hidden_dim as i64;

        let fc = nn::linear(path / "fc", 4, hidden_dim, Default::default());
        let cls_score = nn::linear(path / "cls_score", hidden_dim, num_classes_i64, Default::default());
        let bbox_pred = nn::linear(
            path / "bbox_pred",
            hidden_dim,
            num_classes_i64 * 4,
            nn::LinearConfig {
                ws_init: nn::Init::Randn {
                    mean: 0.0,
                    stdev: 0.001,
                },
                ..Default::default()
            },
        );

        Self {
            fc,
            cls_score,
            bbox_pred,
            num_classes,
        }
    }
}

impl Network for BaselineHead {
    fn forward_loss(&self, batch: &MiniBatch, train: bool) -> Result<Tensor> {
        ensure!(
            batch.num_classes == self.num_classes,
            "the network expects {} classes, but the minibatch has {}",
            self.num_classes,
            batch.num_classes
        );
        let num_rois = batch.num_rois();
        ensure!(num_rois > 0, "the minibatch has no regions");

        let features = batch
            .normalized_rois
            .apply(&self.fc)
            .relu()
            .dropout(0.5, train);
        let cls_score = features.apply(&self.cls_score);
        let bbox_pred = features.apply(&self.bbox_pred);

        let loss_cls = cls_score.cross_entropy_for_logits(&batch.labels);
        let loss_bbox = {
            let pred = &bbox_pred * &batch.bbox_inside_weights;
            let target = &batch.bbox_targets * &batch.bbox_inside_weights;
            let loss = pred.smooth_l1_loss(&target, Reduction::None, 1.0);
            (loss * &batch.bbox_outside_weights).sum(Kind::Float) / num_rois as f64
        };

        Ok(loss_cls + loss_bbox)
    }
}
