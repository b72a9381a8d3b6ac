//! Common imports from external crates.

pub use anyhow::{bail, ensure, format_err, Context, Error, Result};
pub use itertools::{izip, Itertools};
pub use noisy_float::prelude::*;
pub use rand::{prelude::*, rngs::StdRng, seq::SliceRandom};
pub use regex::Regex;
pub use roidb::{BboxNormalizationStats, BboxTarget, RoiThresholds, Roidb, RoidbEntry};
pub use serde::{Deserialize, Serialize};
pub use std::{
    borrow::Borrow,
    fmt::Debug,
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, Instant},
};
pub use tch::{nn, nn::OptimizerConfig as _, Device, Kind, Reduction, Tensor};
pub use tracing::{debug, error, info, info_span, warn};
