use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Invalid ignore pattern: {0}")]
    Glob(#[from] globset::Error),

    #[error("Analysis error: {0}")]
    Analysis(#[from] anyhow::Error),

    #[error("source file does not exist: {0}")]
    SourceMissing(String),

    #[error("destination already exists: {0}")]
    DestinationExists(String),

    #[error("source and destination are identical: {0}")]
    IdenticalEndpoints(String),

    #[error("operation on protected path not allowed: {0}")]
    ProtectedPath(String),

    #[error("not indexed: {0}")]
    NotFound(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("{0}")]
    General(String),
}

impl AppError {
    /// Validation failures skip a single operation; everything else is an
    /// environment or storage problem.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::SourceMissing(_)
                | Self::DestinationExists(_)
                | Self::IdenticalEndpoints(_)
                | Self::ProtectedPath(_)
        )
    }
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
