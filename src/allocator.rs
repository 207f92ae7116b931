use std::cmp::Reverse;

use log::debug;

use crate::config::{Campaign, Snapshot};
use crate::error::AdmissionResult;
use crate::models::{Cutoff, PassingScore, Program, RankedApplication};
use crate::store::AdmissionStore;

/// Seat order: priority ascending, then total descending, then applicant id.
pub fn rank(applications: &mut [RankedApplication]) {
    applications.sort_by_key(|application| {
        (
            application.priority,
            Reverse(application.total),
            application.applicant_id,
        )
    });
}

/// Total of the applicant taking the last seat, or `Insufficient` when the
/// consenting applicants do not outnumber the seats.
pub fn cutoff(ranked: &[RankedApplication], capacity: usize) -> Cutoff {
    if capacity == 0 || ranked.len() <= capacity {
        return Cutoff::Insufficient;
    }
    Cutoff::Score(ranked[capacity - 1].total)
}

/// Consenting applications of `program` in seat order.
pub async fn ranked_list<S: AdmissionStore>(
    store: &mut S,
    program: &Program,
) -> AdmissionResult<Vec<RankedApplication>> {
    let mut applications = store.list_applications(&program.name, true).await?;
    rank(&mut applications);
    Ok(applications)
}

/// Cutoffs of every program on the current data, without recording them.
pub async fn current_cutoffs<S: AdmissionStore>(
    store: &mut S,
    campaign: &Campaign,
) -> AdmissionResult<Vec<(String, Cutoff)>> {
    let mut cutoffs = Vec::with_capacity(campaign.programs.len());
    for program in &campaign.programs {
        let ranked = ranked_list(store, program).await?;
        let value = cutoff(&ranked, program.capacity);
        debug!(
            "{}: {} consenting for {} seats, cutoff {value}",
            program.name,
            ranked.len(),
            program.capacity
        );
        cutoffs.push((program.name.clone(), value));
    }
    Ok(cutoffs)
}

/// Appends one passing score per program for `snapshot`.
pub async fn record_cutoffs<S: AdmissionStore>(
    store: &mut S,
    campaign: &Campaign,
    snapshot: &Snapshot,
) -> AdmissionResult<Vec<PassingScore>> {
    let mut recorded = Vec::with_capacity(campaign.programs.len());
    for (program, cutoff) in current_cutoffs(store, campaign).await? {
        let score = PassingScore {
            program,
            snapshot: snapshot.label.clone(),
            snapshot_ordinal: snapshot.ordinal as i32,
            cutoff,
        };
        store.append_passing_score(&score).await?;
        recorded.push(score);
    }
    Ok(recorded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Applicant, Application, Scores};
    use crate::store::MemoryStore;

    fn entry(applicant_id: i64, priority: i32, total: i32) -> RankedApplication {
        RankedApplication {
            applicant_id,
            priority,
            total,
        }
    }

    fn ranked(mut applications: Vec<RankedApplication>) -> Vec<RankedApplication> {
        rank(&mut applications);
        applications
    }

    #[test]
    fn cutoff_follows_priority_before_score() {
        let list = ranked(vec![entry(1, 1, 150), entry(2, 2, 200), entry(3, 3, 180)]);
        let order: Vec<i64> = list.iter().map(|a| a.applicant_id).collect();
        assert_eq!(order, vec![1, 2, 3]);
        assert_eq!(cutoff(&list, 2), Cutoff::Score(200));
    }

    #[test]
    fn equal_priority_prefers_higher_total() {
        let list = ranked(vec![entry(1, 1, 150), entry(2, 1, 180)]);
        assert_eq!(cutoff(&list, 1), Cutoff::Score(180));
    }

    #[test]
    fn exactly_one_spare_applicant_gives_kth_score() {
        let list = ranked(vec![
            entry(1, 1, 240),
            entry(2, 1, 230),
            entry(3, 2, 250),
            entry(4, 2, 100),
        ]);
        assert_eq!(cutoff(&list, 3), Cutoff::Score(250));
    }

    #[test]
    fn too_few_consents_is_insufficient() {
        let list = ranked(vec![entry(1, 1, 240), entry(2, 1, 230)]);
        assert_eq!(cutoff(&list, 2), Cutoff::Insufficient);
        assert_eq!(cutoff(&list, 5), Cutoff::Insufficient);
        assert_eq!(cutoff(&[], 1), Cutoff::Insufficient);
    }

    #[test]
    fn full_ties_fall_back_to_applicant_id() {
        let list = ranked(vec![entry(9, 1, 200), entry(4, 1, 200), entry(6, 1, 200)]);
        let order: Vec<i64> = list.iter().map(|a| a.applicant_id).collect();
        assert_eq!(order, vec![4, 6, 9]);
    }

    #[tokio::test]
    async fn recomputing_on_unchanged_data_is_stable() {
        let campaign = Campaign::builtin();
        let mut store = MemoryStore::new();
        for id in 1..=60 {
            let scores = Scores {
                physics: (id * 7 % 101) as i32,
                russian: (id * 13 % 101) as i32,
                math: (id * 29 % 101) as i32,
                individual: (id % 11) as i32,
            };
            store.upsert_applicant(&Applicant { id, scores }).await.unwrap();
            for (index, program) in campaign.programs.iter().enumerate() {
                store
                    .upsert_application(&Application {
                        applicant_id: id,
                        program: program.name.clone(),
                        priority: ((id as usize + index) % 4 + 1) as i32,
                        consent: id % 3 != 0,
                    })
                    .await
                    .unwrap();
            }
        }

        let first = current_cutoffs(&mut store, &campaign).await.unwrap();
        let second = current_cutoffs(&mut store, &campaign).await.unwrap();
        assert_eq!(first, second);
        // 40 consenting applicants fill ITSS and IB but not PM or IVT
        assert_eq!(first[0], ("PM".to_string(), Cutoff::Insufficient));
        assert_eq!(first[1], ("IVT".to_string(), Cutoff::Insufficient));
        assert!(matches!(first[2].1, Cutoff::Score(_)));
        assert!(matches!(first[3].1, Cutoff::Score(_)));
    }

    #[tokio::test]
    async fn records_one_score_per_program() {
        let campaign = Campaign::builtin();
        let snapshot = campaign.snapshot("02.08").unwrap();
        let mut store = MemoryStore::new();
        let recorded = record_cutoffs(&mut store, &campaign, &snapshot).await.unwrap();
        assert_eq!(recorded.len(), 4);
        for program in &campaign.programs {
            let history = store.list_passing_scores(&program.name).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].snapshot_ordinal, 1);
            assert_eq!(history[0].cutoff, Cutoff::Insufficient);
        }
    }
}
