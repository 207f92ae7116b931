use std::collections::HashMap;
use std::fmt::Write;
use std::path::Path;

use chrono::{DateTime, Utc};
use snafu::ResultExt;

use crate::allocator;
use crate::config::Campaign;
use crate::error::{AdmissionResult, WritingCsvSnafu};
use crate::models::{Applicant, PassingScore, Program, RankedApplication};
use crate::store::AdmissionStore;

#[derive(Debug, Clone)]
pub struct ProgramReport {
    pub program: Program,
    pub history: Vec<PassingScore>,
    /// Consenting applicants holding a seat, in seat order.
    pub enrolled: Vec<RankedApplication>,
}

pub async fn collect<S: AdmissionStore>(
    store: &mut S,
    campaign: &Campaign,
) -> AdmissionResult<Vec<ProgramReport>> {
    let mut reports = Vec::with_capacity(campaign.programs.len());
    for program in &campaign.programs {
        let history = store.list_passing_scores(&program.name).await?;
        let mut enrolled = allocator::ranked_list(store, program).await?;
        enrolled.truncate(program.capacity);
        reports.push(ProgramReport {
            program: program.clone(),
            history,
            enrolled,
        });
    }
    Ok(reports)
}

/// Days as rows, programs as columns. Days a program has no score for are
/// shown as "-".
pub fn passing_score_table(campaign: &Campaign, reports: &[ProgramReport]) -> String {
    let mut output = String::new();

    let _ = write!(output, "| Day |");
    for report in reports {
        let _ = write!(output, " {} |", report.program.name);
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "|---|{}", "---|".repeat(reports.len()));

    for day in &campaign.days {
        let _ = write!(output, "| {} |", day.label);
        for report in reports {
            let cell = report
                .history
                .iter()
                .find(|score| score.snapshot == day.label)
                .map(|score| score.cutoff.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = write!(output, " {cell} |");
        }
        let _ = writeln!(output);
    }

    output
}

pub fn build_report(
    campaign: &Campaign,
    generated_at: DateTime<Utc>,
    reports: &[ProgramReport],
) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Admission Report");
    let _ = writeln!(output, "Generated at {}", generated_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(output);
    let _ = writeln!(output, "## Passing Scores");

    for report in reports {
        match report.history.last() {
            Some(latest) => {
                let _ = writeln!(
                    output,
                    "- {}: {} (day {}, {} seats)",
                    report.program.name, latest.cutoff, latest.snapshot, report.program.capacity
                );
            }
            None => {
                let _ = writeln!(output, "- {}: no days loaded", report.program.name);
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Passing Score Dynamics");
    let _ = write!(output, "{}", passing_score_table(campaign, reports));

    let _ = writeln!(output);
    let _ = writeln!(output, "## Enrolled Applicants");

    for report in reports {
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "### {} ({}/{} seats)",
            report.program.name,
            report.enrolled.len(),
            report.program.capacity
        );
        if report.enrolled.is_empty() {
            let _ = writeln!(output, "No consenting applicants.");
            continue;
        }
        for application in &report.enrolled {
            let _ = writeln!(
                output,
                "- ID {}: total {} (priority {})",
                application.applicant_id, application.total, application.priority
            );
        }
    }

    output
}

/// Every applicant with their scores and, per program, priority and consent.
pub struct OverallList {
    pub programs: Vec<String>,
    pub applicants: Vec<Applicant>,
    applications: HashMap<(i64, usize), (i32, bool)>,
}

impl OverallList {
    pub async fn collect<S: AdmissionStore>(
        store: &mut S,
        campaign: &Campaign,
    ) -> AdmissionResult<Self> {
        let applicants = store.list_applicants().await?;
        let mut applications = HashMap::new();
        for (index, program) in campaign.programs.iter().enumerate() {
            for consent in [true, false] {
                for application in store.list_applications(&program.name, consent).await? {
                    applications.insert(
                        (application.applicant_id, index),
                        (application.priority, consent),
                    );
                }
            }
        }

        Ok(OverallList {
            programs: campaign.programs.iter().map(|p| p.name.clone()).collect(),
            applicants,
            applications,
        })
    }

    pub fn header(&self) -> Vec<String> {
        let mut header: Vec<String> = ["ID", "Physics", "Russian", "Math", "Individual", "Total"]
            .iter()
            .map(|name| name.to_string())
            .collect();
        for program in &self.programs {
            header.push(format!("{program} Priority"));
            header.push(format!("{program} Consent"));
        }
        header
    }

    pub fn rows(&self) -> Vec<Vec<String>> {
        self.applicants
            .iter()
            .map(|applicant| {
                let scores = applicant.scores;
                let mut row = vec![
                    applicant.id.to_string(),
                    scores.physics.to_string(),
                    scores.russian.to_string(),
                    scores.math.to_string(),
                    scores.individual.to_string(),
                    applicant.total().to_string(),
                ];
                for index in 0..self.programs.len() {
                    match self.applications.get(&(applicant.id, index)) {
                        Some((priority, consent)) => {
                            row.push(priority.to_string());
                            row.push(consent.to_string());
                        }
                        None => {
                            row.push("-".to_string());
                            row.push("-".to_string());
                        }
                    }
                }
                row
            })
            .collect()
    }

    pub fn write_csv(&self, path: &Path) -> AdmissionResult<()> {
        let mut writer = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
        writer
            .write_record(self.header())
            .context(WritingCsvSnafu { path })?;
        for row in self.rows() {
            writer.write_record(&row).context(WritingCsvSnafu { path })?;
        }
        writer
            .flush()
            .map_err(csv::Error::from)
            .context(WritingCsvSnafu { path })?;
        Ok(())
    }
}
