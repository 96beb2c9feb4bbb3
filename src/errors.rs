use thiserror::Error;

/// Failures surfaced by the four engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The package bytes are not a readable container, or the body part is missing.
    #[error("cannot read document package: {0:#}")]
    PackageRead(anyhow::Error),
    /// Extraction or HTML conversion failed on an otherwise readable package.
    #[error("document processing failed: {0:#}")]
    Processing(anyhow::Error),
    /// Both export strategies failed; the raw-substitution cause is attached.
    #[error("export failed: {source:#}")]
    Export {
        #[source]
        source: anyhow::Error,
    },
}

impl EngineError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::PackageRead(_) => "package_read",
            Self::Processing(_) => "processing",
            Self::Export { .. } => "export",
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
