use crate::{common::*, Roidb, RoidbEntry};

impl RoidbEntry {
    /// Returns the horizontally mirrored copy of this entry.
    pub fn flipped(&self) -> Self {
        let width = self.width as f64;
        let boxes = self
            .boxes
            .iter()
            .map(|bbox| bbox.flip_horizontal(width))
            .collect();

        // regression targets are recomputed after flipping
        Self {
            boxes,
            flipped: true,
            bbox_targets: vec![],
            ..self.clone()
        }
    }
}

impl Roidb {
    /// Appends the mirrored copy of every entry, after all original entries.
    pub fn append_flipped_images(&mut self) {
        let flipped: Vec<_> = self.entries.iter().map(RoidbEntry::flipped).collect();
        debug!("appending {} flipped entries", flipped.len());
        self.entries.extend(flipped);
    }
}
