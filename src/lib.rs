//! skillsync - reproducible installs of AI agent artifacts
//!
//! Resolves a lock file of skills, agents, commands, hooks and MCP servers
//! against the current repository, fetches each artifact from HTTP, git or
//! a local path with integrity checks, and installs them in dependency order.

pub mod archive;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod installer;
pub mod lock;
pub mod resolver;
pub mod source;

pub use error::{SkillsyncError, SkillsyncResult};
