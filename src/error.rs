use std::path::PathBuf;

use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum AdmissionError {
    #[snafu(display("no source for program {program} at {}", path.display()))]
    MissingSource { program: String, path: PathBuf },

    #[snafu(display("malformed record in {} (line {line}): {message}", path.display()))]
    MalformedRecord {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[snafu(display("could not open source {}: {source}", path.display()))]
    OpeningSource { path: PathBuf, source: csv::Error },

    #[snafu(display("could not write {}: {source}", path.display()))]
    WritingCsv { path: PathBuf, source: csv::Error },

    #[snafu(display("snapshot {label} is not part of the campaign"))]
    UnknownSnapshot { label: String },

    #[snafu(display("application to {program} references missing applicant {applicant_id}"))]
    OrphanApplication { applicant_id: i64, program: String },

    #[snafu(display("snapshot {label} already has passing scores"))]
    SnapshotAlreadyProcessed { label: String },

    #[snafu(display("invalid campaign configuration: {message}"))]
    InvalidConfig { message: String },

    #[snafu(display("could not read configuration {}: {source}", path.display()))]
    ReadingConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("could not parse configuration {}: {source}", path.display()))]
    ParsingConfig {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[snafu(display("database error: {source}"))]
    Database { source: sqlx::Error },

    #[snafu(display("schema migration failed: {source}"))]
    Migration { source: sqlx::migrate::MigrateError },
}

pub type AdmissionResult<T> = Result<T, AdmissionError>;
