use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// Raised before any work is scheduled
    #[error("fatal configuration error: {0}")]
    Fatal(String),

    /// The store failed in a way that keeps a stage from running at all
    #[error("graph store failure: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn fatal(error: anyhow::Error) -> Self {
        Self::Fatal(format!("{:#}", error))
    }
}
