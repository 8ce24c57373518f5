pub mod config;
pub mod error;
pub mod names;
pub mod source;
pub mod types;

pub use config::StackConfig;
pub use error::{ComposeError, ComposeResult};
pub use source::{AssetSource, S3Uri};
pub use types::*;
