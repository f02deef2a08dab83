use std::path::{Path, PathBuf};

use tokio::fs;

use crate::error::Result;
use crate::sandbox::workspace::Workspace;

/// File name of the generated policy inside the workspace
pub const POLICY_FILE_NAME: &str = "security.policy";

/// Render a JVM policy granting only what a submission needs.
///
/// Grants read/write below the workspace, normal exit and property reads.
/// Everything else (sockets, other paths, exec) stays denied by the
/// security manager.
pub fn render_policy(workspace_path: &Path) -> String {
    // Policy files treat backslashes as escapes.
    let root = workspace_path.display().to_string().replace('\\', "/");
    format!(
        "grant {{\n    permission java.io.FilePermission \"{root}/-\", \"read,write\";\n    permission java.lang.RuntimePermission \"exitVM\";\n    permission java.util.PropertyPermission \"*\", \"read\";\n}};\n"
    )
}

/// Write the policy into the workspace so it is removed along with it.
pub async fn generate(workspace: &Workspace) -> Result<PathBuf> {
    let path = workspace.file(POLICY_FILE_NAME);
    fs::write(&path, render_policy(workspace.path())).await?;
    Ok(path)
}
