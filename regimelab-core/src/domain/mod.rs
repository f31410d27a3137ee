//! Domain types for RegimeLab

pub mod ids;
pub mod signal;
pub mod table;

pub use ids::{ConfigHash, DatasetHash, RunId};
pub use signal::{InvalidSignal, Signal};
pub use table::{FeatureRow, FeatureTable, TableError, TrainingSet};
