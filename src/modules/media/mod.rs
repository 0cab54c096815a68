pub mod model;
pub mod storage;

pub use model::UploadConfig;
pub use storage::{BlobStore, LocalBlobStore};
