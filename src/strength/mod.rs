//! Password strength model
//!
//! Feature extraction, datasets, the one-vs-rest GBDT ensemble and its
//! persisted bundle, plus the training and scoring paths built on them.

pub mod autolabel;
pub mod bundle;
pub mod dataset;
pub mod ensemble;
pub mod features;
pub mod reference;
pub mod scaler;
pub mod scorer;
pub mod train;

pub use autolabel::auto_label;
pub use bundle::ModelBundle;
pub use dataset::{merge, Dataset, Label, LabeledSample};
pub use features::{FeatureExtractor, FeatureVector, OwnerContext};
pub use reference::{build_reference_dataset, ReferenceBuild};
pub use scorer::{score, score_batch, Confidence, StrengthScore};
pub use train::{fit_bundle, ModelTrainer, TrainOutcome};
