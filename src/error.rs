//! Typed errors for the ingestion pipeline.
//!
//! Everything above the pipeline uses `anyhow`; these types exist so a
//! failed file can be reported with the stage that broke.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from the document partitioner.
#[derive(Error, Debug)]
pub enum PartitionError {
    #[error("unsupported file type: {}", path.display())]
    UnsupportedType { path: PathBuf },

    #[error("cannot read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("PDF extraction failed for {}: {reason}", path.display())]
    Pdf { path: PathBuf, reason: String },
}

/// A single file's trip through partition → chunk → embed → store failed.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("partition failed for {filename}: {source}")]
    Partition {
        filename: String,
        #[source]
        source: PartitionError,
    },

    #[error("no text could be extracted from {filename}")]
    Empty { filename: String },

    #[error("storing chunks of {filename} failed: {reason}")]
    Store { filename: String, reason: String },

    #[error("partition task for {filename} panicked or was cancelled")]
    Join { filename: String },
}

impl PipelineError {
    /// The pipeline stage that failed, for logs.
    pub fn stage(&self) -> &'static str {
        match self {
            PipelineError::Partition { .. } | PipelineError::Join { .. } => "partition",
            PipelineError::Empty { .. } => "chunk",
            PipelineError::Store { .. } => "store",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let e = PipelineError::Empty {
            filename: "a.txt".into(),
        };
        assert_eq!(e.stage(), "chunk");
        assert!(e.to_string().contains("a.txt"));

        let e = PipelineError::Partition {
            filename: "b.pdf".into(),
            source: PartitionError::UnsupportedType {
                path: PathBuf::from("b.doc"),
            },
        };
        assert_eq!(e.stage(), "partition");
        assert!(e.to_string().contains("unsupported file type"));
    }
}
