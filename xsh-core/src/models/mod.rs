mod registry;

pub use registry::{ModelInfo, ModelRegistry};
