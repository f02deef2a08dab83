use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{Language, Outcome};
use crate::sandbox::workspace::Workspace;

/// Trait for language runners.
///
/// A runner builds and/or runs one submission inside a workspace it does not
/// own. Errors returned from `run` are infrastructure failures (I/O, missing
/// binaries) and are reported by the caller as setup failures; everything the
/// submission itself causes is expressed as an `Outcome`.
#[async_trait]
pub trait Runner: Send + Sync {
    /// Language handled by this runner
    fn language(&self) -> Language;

    /// External binaries this runner invokes
    fn binaries(&self) -> Vec<&Path>;

    /// Checks that run before any workspace exists.
    /// Returning an outcome refuses the submission without spawning anything.
    fn precheck(&self, _code: &str) -> Option<Outcome> {
        None
    }

    /// Build and run the submission inside `workspace`
    async fn run(&self, code: &str, workspace: &Workspace) -> Result<Outcome>;
}
