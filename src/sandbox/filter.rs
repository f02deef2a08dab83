use regex::Regex;

use crate::error::{Result, RunletError};

/// Textual deny-list of imports checked before a python submission runs.
///
/// This only matches literal `import x` / `from x` statements. Anything that
/// builds the module name at runtime (`__import__("o" + "s")`, `getattr`
/// tricks, aliasing through an allowed module) passes straight through. It is
/// a prefilter, not a sandbox.
#[derive(Debug, Clone)]
pub struct ImportFilter {
    rules: Vec<(String, Regex)>,
}

impl ImportFilter {
    pub fn new<S: AsRef<str>>(modules: &[S]) -> Result<Self> {
        let rules = modules
            .iter()
            .map(|module| {
                let module = module.as_ref();
                let pattern = format!(r"\b(?:import|from)\s+{}\b", regex::escape(module));
                Regex::new(&pattern)
                    .map(|re| (module.to_string(), re))
                    .map_err(|e| RunletError::Config(format!("Bad deny-list entry '{}': {}", module, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { rules })
    }

    /// Returns the first denied module the source imports, if any.
    pub fn denied_import(&self, code: &str) -> Option<&str> {
        self.rules
            .iter()
            .find(|(_, re)| re.is_match(code))
            .map(|(module, _)| module.as_str())
    }

    /// Rejection message for a denied module.
    pub fn rejection(module: &str) -> String {
        format!("Import '{}' is not allowed for security reasons", module)
    }
}
