pub mod catalog;
pub mod labels;
pub mod model;
pub mod preprocess;

pub use catalog::ClassCatalog;
pub use labels::{Interpretation, LabelInterpreter};
pub use model::{ClassificationModel, InferenceBackend, InferenceError};
pub use preprocess::{InputTensor, PreprocessError, Preprocessed};
