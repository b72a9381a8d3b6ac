//! Removal of roidb entries without usable regions.

use crate::{common::*, Roidb, RoidbEntry};

/// Overlap thresholds that classify regions into foreground and background.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiThresholds {
    /// Regions overlapping at least this much are foreground.
    pub fg_thresh: R64,
    /// Inclusive lower bound of background overlaps.
    pub bg_thresh_lo: R64,
    /// Exclusive upper bound of background overlaps.
    pub bg_thresh_hi: R64,
}

impl RoiThresholds {
    pub fn is_fg(&self, overlap: f64) -> bool {
        overlap >= self.fg_thresh.raw()
    }

    pub fn is_bg(&self, overlap: f64) -> bool {
        overlap >= self.bg_thresh_lo.raw() && overlap < self.bg_thresh_hi.raw()
    }

    /// Indices of foreground regions.
    pub fn fg_indices(&self, overlaps: &[f64]) -> Vec<usize> {
        overlaps
            .iter()
            .positions(|&overlap| self.is_fg(overlap))
            .collect()
    }

    /// Indices of background regions.
    pub fn bg_indices(&self, overlaps: &[f64]) -> Vec<usize> {
        overlaps
            .iter()
            .positions(|&overlap| self.is_bg(overlap))
            .collect()
    }

    /// An entry is valid if it has at least one foreground or one background region.
    pub fn is_valid(&self, entry: &RoidbEntry) -> bool {
        entry
            .max_overlaps
            .iter()
            .any(|&overlap| self.is_fg(overlap) || self.is_bg(overlap))
    }
}

/// Drops the entries that have neither foreground nor background regions.
///
/// The order of the remaining entries is preserved. An empty result is not an
/// error here; it is up to the caller to reject it.
pub fn filter_roidb(roidb: Roidb, thresholds: &RoiThresholds) -> Roidb {
    let Roidb { classes, entries } = roidb;
    let num = entries.len();

    let entries: Vec<_> = entries
        .into_iter()
        .filter(|entry| thresholds.is_valid(entry))
        .collect();
    let num_after = entries.len();

    info!(
        "Filtered {} roidb entries: {} -> {}",
        num - num_after,
        num,
        num_after
    );

    Roidb { classes, entries }
}
