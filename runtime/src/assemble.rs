//! External assembler invocation.
//!
//! The assembler is a separate executable discovered through the process
//! search path, invoked as `<assembler> <input-path> -g -o <output-path>`.
//! Exit code 0 is the only success; anything else (or an unreadable output
//! artifact) is a kernel-creation failure. The scratch directory is removed
//! on success and failure alike unless artifact retention is configured.

use std::fs;
use std::process::Command;

use snafu::ResultExt;

use crate::config::Config;
use crate::error::{
    ArtifactUnreadableSnafu, AssemblerFailedSnafu, AssemblerSpawnSnafu, Result, SourceStagingSnafu,
};

const SOURCE_FILE: &str = "module.hsail";
const ARTIFACT_FILE: &str = "module.brig";

/// Assemble textual kernel source into a binary artifact.
pub fn assemble(source: &str, config: &Config) -> Result<Vec<u8>> {
    let dir = tempfile::tempdir().context(SourceStagingSnafu)?;
    let source_path = dir.path().join(SOURCE_FILE);
    let artifact_path = dir.path().join(ARTIFACT_FILE);
    fs::write(&source_path, source).context(SourceStagingSnafu)?;

    tracing::debug!(assembler = %config.assembler, input = %source_path.display(), "spawning assembler");
    let output = Command::new(&config.assembler)
        .arg(&source_path)
        .arg("-g")
        .arg("-o")
        .arg(&artifact_path)
        .output()
        .context(AssemblerSpawnSnafu { assembler: config.assembler.clone() })?;

    let result = if output.status.success() {
        fs::read(&artifact_path).context(ArtifactUnreadableSnafu { path: artifact_path.clone() })
    } else {
        AssemblerFailedSnafu {
            assembler: config.assembler.clone(),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        }
        .fail()
    };

    if config.keep_artifacts {
        let kept = dir.keep();
        tracing::info!(dir = %kept.display(), "retaining kernel build artifacts");
    }

    match &result {
        Ok(binary) => tracing::debug!(bytes = binary.len(), "assembler produced binary artifact"),
        Err(error) => tracing::debug!(%error, "assembly failed"),
    }
    result
}
