//! Inference: checkpoint loading, single-image prediction, reference links,
//! and the one-time remote checkpoint fetch.

pub mod fetch;
pub mod links;
pub mod predictor;

pub use fetch::ensure_checkpoint;
pub use links::tarantupedia_link;
pub use predictor::{PredictionResult, Predictor, SpeciesModel, TopPrediction};
