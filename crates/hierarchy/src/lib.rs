//! The container hierarchy imports are organised into.
//!
//! Data lands in a fixed five-level tree: group, project, subject, session
//! and acquisition. Discovery builds a [`DiscoveryContext`] for every point
//! of interest, and the [`ContainerFactory`] turns those contexts into an
//! in-memory tree of [`ContainerNode`]s, looking each one up remotely (via a
//! [`ContainerResolver`]) the first time it's seen.
//!
//! ```
//! use hoist_hierarchy::{ContainerFactory, ContainerKind, DiscoveryContext, FolderResolver};
//! use std::sync::Arc;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let output = tempfile::tempdir()?;
//! let mut factory = ContainerFactory::new(Arc::new(FolderResolver::new(output.path())?));
//! let mut ctx = DiscoveryContext::default();
//! ctx.set("group._id", "scitran")?;
//! ctx.set("project.label", "Anxiety Study")?;
//! let project = factory.resolve(&ctx, true)?.expect("project");
//! assert_eq!(factory.node(project).kind, ContainerKind::Project);
//! assert_eq!(factory.create_containers()?, 2);
//! # Ok(())
//! # }
//! # example().unwrap();
//! ```

mod context;
pub mod error;
mod factory;
mod folder;
mod kind;
mod message;
mod node;
mod resolver;
mod summary;

pub use crate::context::{DiscoveryContext, LevelMeta};
pub use crate::factory::ContainerFactory;
pub use crate::folder::FolderResolver;
pub use crate::kind::ContainerKind;
pub use crate::message::{Message, Severity};
pub use crate::node::{ContainerNode, NodeId, PackfileDescriptor, PackfileSource};
pub use crate::resolver::{ContainerResolver, ResolverHandle, UidRequest, UploadTarget, Uploader, UploaderHandle};
pub use crate::summary::{KindCount, SummaryCounts};
