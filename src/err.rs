use std::process::{ExitCode, Termination};

/// Fatal application errors.
///
/// Partial-data problems (unparsable fields, missing columns, empty overlaps)
/// never end up here; they degrade to the sentinel value at their call site.
#[derive(thiserror::Error, Debug)]
pub enum AppError {
    /// Inconsistent configuration, detected before any expensive work.
    #[error("Configuration error: {0}")]
    Config(String),
    /// A custom database shares no contigs with the reference.
    #[error("Database {database:?} and reference {reference:?} have no matching contigs")]
    DataMismatch { database: String, reference: String },
    /// An external tool exited with a code outside its allow-list.
    #[error("Command {name:?} has returned non-zero exit code [{code}]\nCommand: {command}\nDetails: {stderr}")]
    ExternalTool {
        name: String,
        code: i32,
        command: String,
        stderr: String,
    },
    /// File could not be opened or read.
    #[error("Can't open the file {path:?} ({source})")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl AppError {
    /// Shortcut for wrapping an `std::io::Error` together with the offending path.
    pub fn io<P: AsRef<std::path::Path>>(path: P, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}

impl Termination for AppError {
    fn report(self) -> ExitCode {
        match self {
            AppError::Config(_) => ExitCode::from(2),
            AppError::DataMismatch { .. } => ExitCode::from(3),
            AppError::ExternalTool { .. } => ExitCode::from(4),
            AppError::Io { .. } => ExitCode::from(5),
        }
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn data_mismatch_message() {
        let err = super::AppError::DataMismatch {
            database: "dbA".into(),
            reference: "ref.fa".into(),
        };

        assert_eq!(
            err.to_string(),
            "Database \"dbA\" and reference \"ref.fa\" have no matching contigs"
        );
    }
}
