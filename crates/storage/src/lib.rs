pub mod error;
mod models;
mod open;
mod path;
pub mod walker;

pub use crate::models::{EntryKind, FileInfo};
pub use crate::open::open_walker;
pub use crate::path::{validate as validate_path, validate_dir};
pub use crate::walker::{ArchiveWalker, BoxSyncRead, LocalWalker, Walker};
#[cfg(feature = "mock")]
pub use crate::walker::MockWalker;
#[cfg(feature = "s3")]
pub use crate::walker::S3Walker;
use std::sync::Arc;

pub type WalkerHandle = Arc<dyn Walker + Send + Sync>;
