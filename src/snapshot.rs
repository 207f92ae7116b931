use std::path::Path;

use log::{info, warn};
use rand::Rng;
use snafu::ensure;

use crate::allocator;
use crate::churn::{self, ChurnReport};
use crate::config::{Campaign, Snapshot};
use crate::error::{AdmissionError, AdmissionResult, SnapshotAlreadyProcessedSnafu};
use crate::models::{Applicant, Application, PassingScore};
use crate::source::{self, SourceRecord};
use crate::store::{AdmissionStore, UnitOfWork};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub records: usize,
    pub new_applicants: usize,
    pub new_applications: usize,
}

#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub snapshot: Snapshot,
    pub churn: Option<ChurnReport>,
    pub ingested: Vec<(String, IngestSummary)>,
    pub skipped: Vec<String>,
    pub scores: Vec<PassingScore>,
}

/// Source lists of one day, keyed by program. Programs without a list are
/// returned separately.
pub fn read_sources(
    campaign: &Campaign,
    label: &str,
    dir: &Path,
) -> AdmissionResult<(Vec<(String, Vec<SourceRecord>)>, Vec<String>)> {
    let mut found = Vec::new();
    let mut skipped = Vec::new();
    for program in &campaign.programs {
        let path = source::source_path(dir, label, &program.name);
        match source::read_program_source(&path, &program.name) {
            Ok(records) => found.push((program.name.clone(), records)),
            Err(AdmissionError::MissingSource { program, path }) => {
                warn!("day {label}: skipping {program}, {} does not exist", path.display());
                skipped.push(program);
            }
            Err(err) => return Err(err),
        }
    }
    Ok((found, skipped))
}

/// Merges one program's list into the store, creating or updating applicants
/// and their application to `program`.
pub async fn ingest<S: AdmissionStore>(
    store: &mut S,
    program: &str,
    records: &[SourceRecord],
) -> AdmissionResult<IngestSummary> {
    let mut summary = IngestSummary {
        records: records.len(),
        ..IngestSummary::default()
    };

    for record in records {
        let scores = record.scores();
        if record.total != scores.total() {
            warn!(
                "{program}: applicant {} lists total {} but components sum to {}",
                record.id,
                record.total,
                scores.total()
            );
        }

        let applicant = match store.find_applicant(record.id).await? {
            Some(existing) => Applicant { scores, ..existing },
            None => {
                summary.new_applicants += 1;
                Applicant {
                    id: record.id,
                    scores,
                }
            }
        };
        store.upsert_applicant(&applicant).await?;

        let application = match store.find_application(record.id, program).await? {
            Some(existing) => Application {
                priority: record.priority,
                consent: record.consent,
                ..existing
            },
            None => {
                summary.new_applications += 1;
                Application {
                    applicant_id: record.id,
                    program: program.to_string(),
                    priority: record.priority,
                    consent: record.consent,
                }
            }
        };
        store.upsert_application(&application).await?;
    }

    Ok(summary)
}

async fn already_processed<S: AdmissionStore>(
    store: &mut S,
    campaign: &Campaign,
    label: &str,
) -> AdmissionResult<bool> {
    for program in &campaign.programs {
        let history = store.list_passing_scores(&program.name).await?;
        if history.iter().any(|score| score.snapshot == label) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Churn, ingestion and allocation of one day as a single unit of work:
/// either everything is committed or nothing is.
pub async fn process_snapshot<U: UnitOfWork, R: Rng>(
    mut work: U,
    campaign: &Campaign,
    label: &str,
    dir: &Path,
    rng: &mut R,
) -> AdmissionResult<SnapshotOutcome> {
    let snapshot = campaign.snapshot(label)?;
    ensure!(
        !already_processed(&mut work, campaign, label).await?,
        SnapshotAlreadyProcessedSnafu { label }
    );

    let (sources, skipped) = read_sources(campaign, label, dir)?;

    let churn = if snapshot.is_initial {
        None
    } else {
        Some(churn::apply_churn(&mut work, campaign, rng).await?)
    };

    let mut ingested = Vec::with_capacity(sources.len());
    for (program, records) in &sources {
        let summary = ingest(&mut work, program, records).await?;
        info!(
            "day {label}: {program}: {} records, {} new applicants, {} new applications",
            summary.records, summary.new_applicants, summary.new_applications
        );
        ingested.push((program.clone(), summary));
    }

    let scores = allocator::record_cutoffs(&mut work, campaign, &snapshot).await?;
    work.commit().await?;

    for score in &scores {
        info!("day {label}: {} passing score {}", score.program, score.cutoff);
    }

    Ok(SnapshotOutcome {
        snapshot,
        churn,
        ingested,
        skipped,
        scores,
    })
}
