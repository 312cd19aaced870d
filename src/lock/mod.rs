//! Lock file model, loading and requirements
//!
//! The lock file is the declarative description of the desired end state.
//! Once parsed it is never mutated; resolution and installation work from
//! the parsed value.

pub mod loader;
pub mod model;
pub mod requirements;

pub use loader::{load_lock, LoadedLock, LockSource, DEFAULT_LOCK_FILE};
pub use model::{
    resolve_ref, version_matches, Artifact, ArtifactId, ArtifactType, DependencyRef, GitSource,
    HttpSource, LockFile, PathSource, Scope, Source, CURRENT_LOCK_VERSION,
};
pub use requirements::{parse_requirements, Requirement};
