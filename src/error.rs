use thiserror::Error;

/// Failures that abort the whole run. Anything else is wrapped in `anyhow`
/// at the call site.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A foreign key could not be resolved through the identity map of its
    /// referenced type. Either the dependency's phase has not run yet or the
    /// source data references a row that was never merged.
    #[error("no identity mapping for {model} id {foreign_id} from source {connection}")]
    MissingMapping {
        model: &'static str,
        connection: String,
        foreign_id: i64,
    },

    /// An activity-shaped row whose concrete kind cannot be determined or
    /// repaired.
    #[error("{0}")]
    UnknownActivityModel(String),

    #[error("migration command failed for database {database} ({status})")]
    MigrationFailed { database: String, status: String },
}
