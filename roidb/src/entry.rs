//! The roidb collection and its per-image entries.

use crate::{common::*, BoxCoords};

/// The regression target of one region.
///
/// The class index 0 marks a region without regression target.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BboxTarget {
    pub class: usize,
    pub deltas: [f64; 4],
}

impl BboxTarget {
    pub fn has_target(&self) -> bool {
        self.class > 0
    }
}

/// The metadata of one training image and its candidate regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoidbEntry {
    pub image: PathBuf,
    pub width: usize,
    pub height: usize,
    /// Candidate regions, ground truth boxes included.
    pub boxes: Vec<BoxCoords>,
    /// The maximum overlap of each region against ground truth boxes.
    pub max_overlaps: Vec<f64>,
    /// The class of the ground truth box each region overlaps most.
    pub max_classes: Vec<usize>,
    #[serde(default)]
    pub flipped: bool,
    /// Per-region regression targets. It is empty until targets are computed.
    #[serde(default)]
    pub bbox_targets: Vec<BboxTarget>,
}

impl RoidbEntry {
    pub fn num_regions(&self) -> usize {
        self.boxes.len()
    }

    /// Returns the regression target of a region, or an empty target if it
    /// was never computed.
    pub fn bbox_target(&self, index: usize) -> BboxTarget {
        self.bbox_targets.get(index).copied().unwrap_or_default()
    }

    fn validate(&self, num_classes: usize) -> Result<()> {
        let num_regions = self.boxes.len();

        ensure!(
            self.width > 0 && self.height > 0,
            "image size of '{}' must be positive",
            self.image.display()
        );
        ensure!(
            self.max_overlaps.len() == num_regions && self.max_classes.len() == num_regions,
            "'{}' has {} boxes but {} overlaps and {} classes",
            self.image.display(),
            num_regions,
            self.max_overlaps.len(),
            self.max_classes.len()
        );
        ensure!(
            self.bbox_targets.is_empty() || self.bbox_targets.len() == num_regions,
            "'{}' has {} boxes but {} regression targets",
            self.image.display(),
            num_regions,
            self.bbox_targets.len()
        );
        ensure!(
            self.max_overlaps
                .iter()
                .all(|&overlap| (0.0..=1.0).contains(&overlap)),
            "overlaps of '{}' must lie in [0, 1]",
            self.image.display()
        );
        ensure!(
            self.max_classes.iter().all(|&class| class < num_classes),
            "'{}' refers to a class index out of {} classes",
            self.image.display(),
            num_classes
        );
        ensure!(
            self.bbox_targets
                .iter()
                .all(|target| target.class < num_classes),
            "'{}' has a regression target of a class index out of {} classes",
            self.image.display(),
            num_classes
        );

        Ok(())
    }
}

/// The region-of-interest database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Roidb {
    /// Class names. The first one is the background class.
    pub classes: IndexSet<String>,
    pub entries: Vec<RoidbEntry>,
}

impl Roidb {
    pub fn new(classes: IndexSet<String>, entries: Vec<RoidbEntry>) -> Self {
        Self { classes, entries }
    }

    /// Loads a roidb from a JSON file and checks its consistency.
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read roidb file '{}'", path.display()))?;
        let roidb: Self = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse roidb file '{}'", path.display()))?;
        roidb.validate()?;

        info!(
            "loaded {} roidb entries with {} classes from '{}'",
            roidb.len(),
            roidb.num_classes(),
            path.display()
        );
        Ok(roidb)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.classes.is_empty(),
            "the class list must contain at least the background class"
        );
        self.entries
            .iter()
            .try_for_each(|entry| entry.validate(self.num_classes()))
    }

    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
