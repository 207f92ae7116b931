use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::info;
use rand::seq::SliceRandom;
use rand::Rng;

use crate::config::Campaign;
use crate::error::AdmissionResult;
use crate::models::{Program, Scores};
use crate::overlap::{self, OverlapInput, Reconstruction};
use crate::source::{self, SourceRecord};

/// A generated applicant. Consent is drawn once per applicant and repeated on
/// every one of their applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticApplicant {
    pub id: i64,
    pub scores: Scores,
    pub consent: bool,
    /// Program index to priority.
    pub priorities: BTreeMap<usize, i32>,
}

impl SyntheticApplicant {
    pub fn applies_to(&self, program: usize) -> bool {
        self.priorities.contains_key(&program)
    }

    fn sample<R: Rng>(id: i64, mask: u32, rng: &mut R) -> Self {
        let scores = Scores {
            physics: rng.random_range(0..=100),
            russian: rng.random_range(0..=100),
            math: rng.random_range(0..=100),
            individual: rng.random_range(0..=10),
        };
        let consent = rng.random::<bool>();

        let programs = overlap::members(mask);
        let mut ranks: Vec<i32> = (1..=programs.len() as i32).collect();
        ranks.shuffle(rng);

        SyntheticApplicant {
            id,
            scores,
            consent,
            priorities: programs.into_iter().zip(ranks).collect(),
        }
    }
}

/// Creates `count(S)` applicants for every populated subset `S`, numbering
/// them from 1.
pub fn synthesize<R: Rng>(reconstruction: &Reconstruction, rng: &mut R) -> Vec<SyntheticApplicant> {
    let mut applicants = Vec::with_capacity(reconstruction.applicant_total() as usize);
    let mut next_id = 1i64;
    for (mask, count) in reconstruction.populated() {
        for _ in 0..count {
            applicants.push(SyntheticApplicant::sample(next_id, mask, rng));
            next_id += 1;
        }
    }
    applicants
}

/// Final-day correction: makes sure every program has at least one more
/// consenting applicant than it has seats, as far as its applicant pool
/// allows. Returns how many applicants were switched per program.
pub fn ensure_consents<R: Rng>(
    applicants: &mut [SyntheticApplicant],
    programs: &[Program],
    rng: &mut R,
) -> Vec<usize> {
    let mut flipped = Vec::with_capacity(programs.len());
    for (index, program) in programs.iter().enumerate() {
        let consenting = applicants
            .iter()
            .filter(|applicant| applicant.applies_to(index) && applicant.consent)
            .count();
        if consenting > program.capacity {
            flipped.push(0);
            continue;
        }

        let candidates: Vec<usize> = applicants
            .iter()
            .enumerate()
            .filter(|(_, applicant)| applicant.applies_to(index) && !applicant.consent)
            .map(|(position, _)| position)
            .collect();
        let wanted = program.capacity + 1 - consenting;
        let amount = wanted.min(candidates.len());
        for picked in rand::seq::index::sample(rng, candidates.len(), amount) {
            applicants[candidates[picked]].consent = true;
        }
        info!(
            "{}: switched {amount} applicants to consenting ({consenting} consented, {} seats)",
            program.name, program.capacity
        );
        flipped.push(amount);
    }
    flipped
}

#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    /// Apply [`ensure_consents`] when generating the campaign's last day.
    pub consent_fix: bool,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        GenerateOptions { consent_fix: true }
    }
}

pub fn generate_day<R: Rng>(
    campaign: &Campaign,
    label: &str,
    options: GenerateOptions,
    rng: &mut R,
) -> AdmissionResult<Vec<SyntheticApplicant>> {
    let snapshot = campaign.snapshot(label)?;
    let input = OverlapInput::from_day(campaign, campaign.day(label)?)?;
    let reconstruction = overlap::reconstruct(&input);
    reconstruction.warn_clipped(campaign, label);

    let mut applicants = synthesize(&reconstruction, rng);
    if snapshot.is_final && options.consent_fix {
        ensure_consents(&mut applicants, &campaign.programs, rng);
    }

    info!("day {label}: generated {} applicants", applicants.len());
    Ok(applicants)
}

/// Source rows for one program, in applicant id order.
pub fn records_for(applicants: &[SyntheticApplicant], program: usize) -> Vec<SourceRecord> {
    applicants
        .iter()
        .filter_map(|applicant| {
            let priority = *applicant.priorities.get(&program)?;
            Some(SourceRecord {
                id: applicant.id,
                consent: applicant.consent,
                priority,
                physics: applicant.scores.physics,
                russian: applicant.scores.russian,
                math: applicant.scores.math,
                individual: applicant.scores.individual,
                total: applicant.scores.total(),
            })
        })
        .collect()
}

pub fn write_day(
    campaign: &Campaign,
    label: &str,
    applicants: &[SyntheticApplicant],
    out_dir: &Path,
) -> AdmissionResult<Vec<PathBuf>> {
    let mut written = Vec::with_capacity(campaign.programs.len());
    for (index, program) in campaign.programs.iter().enumerate() {
        let path = source::source_path(out_dir, label, &program.name);
        source::write_program_source(&path, &records_for(applicants, index))?;
        written.push(path);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::config::{DaySpec, OverlapEntry};

    fn program(name: &str, capacity: usize) -> Program {
        Program {
            name: name.to_string(),
            capacity,
        }
    }

    fn consents(applicants: &[SyntheticApplicant]) -> Vec<bool> {
        applicants.iter().map(|applicant| applicant.consent).collect()
    }

    #[test]
    fn synthesizes_exact_membership_per_subset() {
        let input = OverlapInput::new(3, [(0b011, 4), (0b111, 1), (0b110, 2)]);
        let reconstruction = overlap::reconstruct(&input);
        let mut rng = StdRng::seed_from_u64(7);
        let applicants = synthesize(&reconstruction, &mut rng);

        assert_eq!(applicants.len() as u64, reconstruction.applicant_total());
        for mask in 0..8u32 {
            let realised = applicants
                .iter()
                .filter(|applicant| {
                    applicant.priorities.keys().fold(0u32, |acc, index| acc | (1 << index)) == mask
                })
                .count() as u64;
            assert_eq!(realised, reconstruction.count(mask), "subset {mask:b}");
        }
    }

    #[test]
    fn applicants_have_bounded_scores_and_permuted_priorities() {
        // Only the four-way count is given and every other aggregate reads as
        // zero. Pairs come out at +50; triples and singletons at -50, clipped.
        let reconstruction = overlap::reconstruct(&OverlapInput::new(4, [(0b1111, 50)]));
        let clipped = reconstruction.clipped();
        assert_eq!(clipped.len(), 8);
        assert!(clipped
            .iter()
            .all(|(mask, value)| matches!(mask.count_ones(), 1 | 3) && *value == -50));

        let mut rng = StdRng::seed_from_u64(11);
        let applicants = synthesize(&reconstruction, &mut rng);
        assert_eq!(applicants.len(), 50 + 6 * 50);

        for (position, applicant) in applicants.iter().enumerate() {
            assert_eq!(applicant.id, position as i64 + 1);
            let scores = applicant.scores;
            assert!((0..=100).contains(&scores.physics));
            assert!((0..=100).contains(&scores.russian));
            assert!((0..=100).contains(&scores.math));
            assert!((0..=10).contains(&scores.individual));

            let mut ranks: Vec<i32> = applicant.priorities.values().copied().collect();
            ranks.sort_unstable();
            assert!(ranks.len() == 2 || ranks.len() == 4);
            assert_eq!(ranks, (1..=ranks.len() as i32).collect::<Vec<_>>());
        }
        let full = applicants
            .iter()
            .filter(|applicant| applicant.priorities.len() == 4)
            .count();
        assert_eq!(full, 50);
    }

    #[test]
    fn same_seed_gives_same_applicants() {
        let reconstruction = overlap::reconstruct(&OverlapInput::new(2, [(0b11, 20)]));
        let first = synthesize(&reconstruction, &mut StdRng::seed_from_u64(3));
        let second = synthesize(&reconstruction, &mut StdRng::seed_from_u64(3));
        assert_eq!(first, second);
    }

    #[test]
    fn consent_fix_leaves_one_spare_consent() {
        let programs = vec![program("A", 3), program("B", 1)];
        let mut applicants: Vec<SyntheticApplicant> = (1..=10)
            .map(|id| SyntheticApplicant {
                id,
                scores: Scores::default(),
                consent: false,
                priorities: [(0, 1)].into_iter().collect(),
            })
            .collect();
        applicants[0].priorities.insert(1, 2);
        applicants[0].consent = true;
        applicants[1].priorities.insert(1, 2);
        applicants[1].consent = true;

        let mut rng = StdRng::seed_from_u64(5);
        let flipped = ensure_consents(&mut applicants, &programs, &mut rng);

        assert_eq!(flipped, vec![2, 0]);
        let consenting_a = applicants
            .iter()
            .filter(|applicant| applicant.applies_to(0) && applicant.consent)
            .count();
        assert_eq!(consenting_a, 4);
    }

    #[test]
    fn consent_fix_stops_when_pool_is_exhausted() {
        let programs = vec![program("A", 5)];
        let mut applicants: Vec<SyntheticApplicant> = (1..=3)
            .map(|id| SyntheticApplicant {
                id,
                scores: Scores::default(),
                consent: false,
                priorities: [(0, 1)].into_iter().collect(),
            })
            .collect();
        let flipped = ensure_consents(&mut applicants, &programs, &mut StdRng::seed_from_u64(1));
        assert_eq!(flipped, vec![3]);
        assert!(applicants.iter().all(|applicant| applicant.consent));
    }

    #[test]
    fn final_day_is_corrected_and_written_per_program() {
        let campaign = Campaign {
            programs: vec![program("A", 5), program("B", 5)],
            days: vec![
                DaySpec {
                    label: "d1".to_string(),
                    overlaps: vec![],
                },
                DaySpec {
                    label: "d2".to_string(),
                    overlaps: vec![OverlapEntry {
                        programs: vec!["A".to_string(), "B".to_string()],
                        count: 12,
                    }],
                },
            ],
        };
        let mut rng = StdRng::seed_from_u64(21);
        let applicants = generate_day(&campaign, "d2", GenerateOptions::default(), &mut rng).unwrap();
        assert_eq!(applicants.len(), 12);
        assert!(applicants.iter().filter(|applicant| applicant.consent).count() > 5);

        let dir = source::tests::scratch_dir("generate");
        let written = write_day(&campaign, "d2", &applicants, &dir).unwrap();
        assert_eq!(written.len(), 2);
        let rows = source::read_program_source(&written[1], "B").unwrap();
        assert_eq!(rows.len(), 12);
        assert!(rows.iter().all(|row| row.total == row.scores().total()));

        assert!(generate_day(&campaign, "d1", GenerateOptions::default(), &mut rng)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn consents_are_left_alone_before_the_last_day_or_when_disabled() {
        let overlaps = || {
            vec![OverlapEntry {
                programs: vec!["A".to_string(), "B".to_string()],
                count: 12,
            }]
        };
        let campaign = Campaign {
            programs: vec![program("A", 100), program("B", 100)],
            days: vec![
                DaySpec {
                    label: "d1".to_string(),
                    overlaps: overlaps(),
                },
                DaySpec {
                    label: "d2".to_string(),
                    overlaps: overlaps(),
                },
            ],
        };
        let plain = |label: &str| {
            let input = OverlapInput::from_day(&campaign, campaign.day(label).unwrap()).unwrap();
            synthesize(&overlap::reconstruct(&input), &mut StdRng::seed_from_u64(8))
        };

        let first = generate_day(
            &campaign,
            "d1",
            GenerateOptions::default(),
            &mut StdRng::seed_from_u64(8),
        )
        .unwrap();
        assert_eq!(consents(&first), consents(&plain("d1")));

        let unfixed = generate_day(
            &campaign,
            "d2",
            GenerateOptions { consent_fix: false },
            &mut StdRng::seed_from_u64(8),
        )
        .unwrap();
        assert_eq!(consents(&unfixed), consents(&plain("d2")));

        // 12 applicants can never exceed 100 seats, so the fix consents all
        let fixed = generate_day(
            &campaign,
            "d2",
            GenerateOptions::default(),
            &mut StdRng::seed_from_u64(8),
        )
        .unwrap();
        assert!(fixed.iter().all(|applicant| applicant.consent));
    }
}
