use crate::{common::*, config::Resume};

/// Snapshot file naming scheme `<prefix>[_<infix>]_iter_<N>.<ext>`.
#[derive(Debug, Clone)]
pub struct SnapshotNaming {
    stem: String,
    extension: String,
    regex: Regex,
}

impl SnapshotNaming {
    pub fn new(prefix: &str, infix: &str, extension: &str) -> Result<Self> {
        ensure!(!prefix.is_empty(), "the snapshot prefix must not be empty");

        let stem = if infix.is_empty() {
            prefix.to_string()
        } else {
            format!("{}_{}", prefix, infix)
        };
        let regex = Regex::new(&format!(
            r"^{}_iter_(\d+)\.{}$",
            regex::escape(&stem),
            regex::escape(extension)
        ))?;

        Ok(Self {
            stem,
            extension: extension.to_string(),
            regex,
        })
    }

    pub fn file_name(&self, iter: usize) -> String {
        format!("{}_iter_{}.{}", self.stem, iter, self.extension)
    }

    /// Extracts the iteration from a snapshot file name.
    pub fn parse_iter(&self, file_name: &str) -> Option<usize> {
        self.regex.captures(file_name)?.get(1)?.as_str().parse().ok()
    }

    /// Finds the snapshot with the highest iteration in a directory.
    pub fn find_latest(&self, dir: &Path) -> Result<Option<(PathBuf, usize)>> {
        let pattern = format!(
            "{}/{}_iter_*.{}",
            glob::Pattern::escape(&dir.display().to_string()),
            glob::Pattern::escape(&self.stem),
            glob::Pattern::escape(&self.extension)
        );
        let paths: Vec<_> = glob::glob(&pattern)?.try_collect()?;

        let latest = paths
            .into_iter()
            .filter_map(|path| {
                let iter = self.parse_iter(path.file_name()?.to_str()?)?;
                Some((path, iter))
            })
            .max_by_key(|(_path, iter)| *iter);

        Ok(latest)
    }

    /// Picks the snapshot to resume from with specified resuming method.
    pub fn resolve_resume(&self, resume: &Resume, dir: &Path) -> Result<Option<PathBuf>> {
        let path = match resume {
            Resume::Disabled => {
                info!("snapshot loading is disabled");
                None
            }
            Resume::FromRecent => {
                let latest = self.find_latest(dir)?;
                if latest.is_none() {
                    warn!("no snapshot file found in '{}'", dir.display());
                }
                latest.map(|(path, _iter)| path)
            }
            Resume::FromFile { file } => Some(file.to_owned()),
        };

        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_with_and_without_infix() -> Result<()> {
        let naming = SnapshotNaming::new("vgg16_fast_rcnn", "", "ot")?;
        assert_eq!(naming.file_name(1000), "vgg16_fast_rcnn_iter_1000.ot");

        let naming = SnapshotNaming::new("vgg16_fast_rcnn", "voc", "ot")?;
        assert_eq!(naming.file_name(2500), "vgg16_fast_rcnn_voc_iter_2500.ot");
        Ok(())
    }

    #[test]
    fn parse_only_matching_names() -> Result<()> {
        let naming = SnapshotNaming::new("net.v1", "", "ot")?;
        assert_eq!(naming.parse_iter(&naming.file_name(42)), Some(42));
        assert_eq!(naming.parse_iter("netxv1_iter_42.ot"), None);
        assert_eq!(naming.parse_iter("net.v1_iter_42.ckpt"), None);
        assert_eq!(naming.parse_iter("net.v1_voc_iter_42.ot"), None);
        assert_eq!(naming.parse_iter("net.v1_iter_.ot"), None);
        Ok(())
    }

    #[test]
    fn latest_snapshot_wins() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let naming = SnapshotNaming::new("baseline", "", "ot")?;

        assert!(naming.find_latest(dir.path())?.is_none());

        for iter in [900, 10000, 2000] {
            fs::write(dir.path().join(naming.file_name(iter)), b"")?;
        }
        fs::write(dir.path().join("baseline_iter_99999.ckpt"), b"")?;
        fs::write(dir.path().join("other_iter_99999.ot"), b"")?;

        let (path, iter) = naming
            .find_latest(dir.path())?
            .ok_or_else(|| format_err!("no snapshot found"))?;
        assert_eq!(iter, 10000);
        assert_eq!(path, dir.path().join("baseline_iter_10000.ot"));

        let resumed = naming.resolve_resume(&Resume::FromRecent, dir.path())?;
        assert_eq!(resumed, Some(path));
        assert_eq!(naming.resolve_resume(&Resume::Disabled, dir.path())?, None);
        Ok(())
    }
}
