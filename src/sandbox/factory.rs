use std::path::PathBuf;

use crate::config::types::RunletConfig;
use crate::error::Result;
use crate::model::Language;
use crate::sandbox::runners::{JavaRunner, JavaScriptRunner, LanguageRunner, PythonRunner};
use crate::sandbox::traits::Runner;
use crate::sandbox::Limits;

/// Create the runner for a language from the configuration.
pub fn create_runner(language: Language, config: &RunletConfig) -> Result<LanguageRunner> {
    let limits = Limits::from(&config.sandbox);

    let runner = match language {
        Language::Python => LanguageRunner::Python(PythonRunner::new(&config.python, limits)?),
        Language::JavaScript => {
            LanguageRunner::JavaScript(JavaScriptRunner::new(&config.javascript, limits))
        }
        Language::Java => LanguageRunner::Java(JavaRunner::new(&config.java, limits)?),
    };

    Ok(runner)
}

/// Resolution status of one binary a runner depends on.
pub struct BinaryStatus {
    pub name: PathBuf,
    pub resolved: Option<PathBuf>,
}

/// Resolve the binaries a runner invokes against PATH.
pub fn runtime_status(runner: &dyn Runner) -> Vec<BinaryStatus> {
    runner
        .binaries()
        .into_iter()
        .map(|binary| BinaryStatus {
            name: binary.to_path_buf(),
            resolved: which::which(binary).ok(),
        })
        .collect()
}
