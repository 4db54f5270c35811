//! modkit is a client-side lifecycle engine for mod-distribution services:
//! it discovers, installs, updates, uninstalls, and uploads user-generated
//! content against a remote catalog while keeping local state consistent.
//!
//! The engine is single-threaded and cooperative. Callers enqueue lifecycle
//! operations and drive them by calling [`Engine::pump`], typically once per
//! frame; exactly one operation transfers at a time, and every state change
//! happens inside a pump. Metadata reads go through a TTL response cache, a
//! failed transfer rolls the affected mod back to its previous state, and
//! uploads resume server-verified multipart sessions instead of restarting.
//!
//! ```no_run
//! use modkit::{Engine, GameId, ModId};
//!
//! # fn main() -> modkit::Result<()> {
//! let mut engine = Engine::new(
//!     GameId::new(7),
//!     "api-key",
//!     "https://api.example.com/v1/",
//!     "/home/player/.mods",
//! )?;
//!
//! engine.subscribe(ModId::new(42), true, None);
//! loop {
//!     engine.pump();
//!     if !engine.is_busy() && engine.queued_ids().is_empty() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod id;
pub mod installer;
pub mod lifecycle;
pub mod ops;
pub mod paths;
pub mod resolver;
pub mod scheduler;
pub mod session;
pub mod tempset;
pub mod transport;
pub mod types;
pub mod upload;

pub use cache::ResponseCache;
pub use config::EngineConfig;
pub use engine::{Engine, EngineCore, EventCallback, LogCallback, LogLevel};
pub use error::{Error, ErrorKind, Result};
pub use filter::{
    CommunityOption, CommunityOptions, MaturityOption, MaturityOptions, ModFilter,
    MonetizationOption, MonetizationOptions, OptionSet, SortField,
};
pub use id::{GameId, ModId};
pub use lifecycle::{EventType, ModCollectionEntry, ModManagementEvent, ModState};
pub use paths::{LocalPaths, MediaVariant, PathResolver};
pub use resolver::{DependencyList, DependencyNode};
pub use scheduler::{CompletionCallback, TaskScheduler};
pub use session::{AuthToken, SessionContext};
pub use tempset::TempModSetManager;
pub use transport::{HttpTransport, RequestDescriptor, Transport};
pub use types::{
    FileInfo, ModDependency, ModInfo, ModInfoList, ModProgressInfo, ProgressPhase, Rating,
    TagOption,
};
pub use upload::{UploadSession, UploadStatus};
