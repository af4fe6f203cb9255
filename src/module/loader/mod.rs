//! Remote container loading
//!
//! Resolution strategies, the deduplicating load cache, shared-scope
//! negotiation and the retrying loader that ties them together.

pub mod cache;
pub mod loader;
pub mod resolver;
pub mod shared_scope;

pub use cache::{CacheKey, LoadCache, LoadResult};
pub use loader::{LoadOptions, RemoteModuleLoader};
pub use resolver::{
    ContainerHost, ContainerResolver, EntryExports, EsmImportResolver, ResolverChain,
    ScriptTagResolver,
};
pub use shared_scope::{SharedDependency, SharedScope, SharedScopeNegotiator, SharedVersionInfo};
