//! 行项目状态判定

pub mod classifier;

pub use classifier::{DefaultStatusClassifier, StatusClassifier, classify};
