use log::info;
use rand::Rng;

use crate::config::Campaign;
use crate::error::AdmissionResult;
use crate::models::{Applicant, Scores};
use crate::store::AdmissionStore;

pub const MUTATION_PROBABILITY: f64 = 0.20;
pub const CONSENT_FLIP_PROBABILITY: f64 = 0.10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChurnReport {
    pub deleted: usize,
    pub mutated: usize,
    pub consent_flips: usize,
}

/// Inclusive range for the number of applicants dropped out of `population`:
/// 5% to 10%, both rounded down.
pub fn deletion_bounds(population: usize) -> (usize, usize) {
    (population * 5 / 100, population * 10 / 100)
}

fn perturb<R: Rng>(scores: Scores, rng: &mut R) -> Scores {
    Scores {
        physics: (scores.physics + rng.random_range(-5..=5)).max(0),
        russian: (scores.russian + rng.random_range(-5..=5)).max(0),
        math: (scores.math + rng.random_range(-5..=5)).max(0),
        individual: (scores.individual + rng.random_range(-2..=2)).max(0),
    }
}

/// Drops a random share of applicants (with their applications), then nudges
/// scores and consents of a random share of the survivors.
pub async fn apply_churn<S: AdmissionStore, R: Rng>(
    store: &mut S,
    campaign: &Campaign,
    rng: &mut R,
) -> AdmissionResult<ChurnReport> {
    let mut report = ChurnReport::default();

    let applicants = store.list_applicants().await?;
    if applicants.is_empty() {
        return Ok(report);
    }

    let (low, high) = deletion_bounds(applicants.len());
    let amount = rng.random_range(low..=high);
    for index in rand::seq::index::sample(rng, applicants.len(), amount) {
        store.delete_applicant(applicants[index].id).await?;
    }
    report.deleted = amount;

    for applicant in store.list_applicants().await? {
        if !rng.random_bool(MUTATION_PROBABILITY) {
            continue;
        }
        let updated = Applicant {
            id: applicant.id,
            scores: perturb(applicant.scores, rng),
        };
        store.upsert_applicant(&updated).await?;
        report.mutated += 1;

        for program in &campaign.programs {
            let Some(mut application) = store.find_application(applicant.id, &program.name).await?
            else {
                continue;
            };
            if rng.random_bool(CONSENT_FLIP_PROBABILITY) {
                application.consent = !application.consent;
                store.upsert_application(&application).await?;
                report.consent_flips += 1;
            }
        }
    }

    info!(
        "churn: deleted {} of {} applicants, mutated {}, flipped {} consents",
        report.deleted,
        applicants.len(),
        report.mutated,
        report.consent_flips
    );
    Ok(report)
}
