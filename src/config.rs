use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use snafu::{ensure, OptionExt, ResultExt};

use crate::error::{
    AdmissionResult, InvalidConfigSnafu, ParsingConfigSnafu, ReadingConfigSnafu,
    UnknownSnapshotSnafu,
};
use crate::models::Program;

/// Subsets are enumerated as bit masks, so the program count stays small.
pub const MAX_PROGRAMS: usize = 16;

/// Largest accepted overlap count. Inclusion–exclusion sums up to
/// `2^MAX_PROGRAMS` signed counts, which must stay within `i64`.
pub const MAX_OVERLAP_COUNT: u64 = (i64::MAX as u64) >> MAX_PROGRAMS;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    pub programs: Vec<Program>,
    pub days: Vec<DaySpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySpec {
    pub label: String,
    #[serde(default)]
    pub overlaps: Vec<OverlapEntry>,
}

/// Number of applicants who applied to at least every program listed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapEntry {
    pub programs: Vec<String>,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub label: String,
    pub ordinal: usize,
    pub is_initial: bool,
    pub is_final: bool,
}

impl Campaign {
    pub fn load(path: Option<&Path>) -> AdmissionResult<Self> {
        let campaign = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).context(ReadingConfigSnafu { path })?;
                serde_json::from_str(&raw).context(ParsingConfigSnafu { path })?
            }
            None => Self::builtin(),
        };
        campaign.validate()?;
        Ok(campaign)
    }

    pub fn validate(&self) -> AdmissionResult<()> {
        ensure!(
            !self.programs.is_empty(),
            InvalidConfigSnafu {
                message: "at least one program is required"
            }
        );
        ensure!(
            self.programs.len() <= MAX_PROGRAMS,
            InvalidConfigSnafu {
                message: format!("at most {MAX_PROGRAMS} programs are supported")
            }
        );

        let mut names = HashSet::new();
        for program in &self.programs {
            ensure!(
                names.insert(program.name.as_str()),
                InvalidConfigSnafu {
                    message: format!("program {} is listed twice", program.name)
                }
            );
            ensure!(
                program.capacity > 0,
                InvalidConfigSnafu {
                    message: format!("program {} needs a positive capacity", program.name)
                }
            );
        }

        ensure!(
            !self.days.is_empty(),
            InvalidConfigSnafu {
                message: "at least one day is required"
            }
        );

        let mut labels = HashSet::new();
        for day in &self.days {
            ensure!(
                labels.insert(day.label.as_str()),
                InvalidConfigSnafu {
                    message: format!("day {} is listed twice", day.label)
                }
            );

            let mut seen = HashSet::new();
            for entry in &day.overlaps {
                let mask = self.mask_of(&entry.programs).map_err(|message| {
                    InvalidConfigSnafu {
                        message: format!("day {}: {message}", day.label),
                    }
                    .build()
                })?;
                ensure!(
                    mask.count_ones() >= 2,
                    InvalidConfigSnafu {
                        message: format!(
                            "day {}: overlap {:?} needs at least two distinct programs",
                            day.label, entry.programs
                        )
                    }
                );
                ensure!(
                    entry.count <= MAX_OVERLAP_COUNT,
                    InvalidConfigSnafu {
                        message: format!(
                            "day {}: overlap {:?} count {} exceeds {MAX_OVERLAP_COUNT}",
                            day.label, entry.programs, entry.count
                        )
                    }
                );
                ensure!(
                    seen.insert(mask),
                    InvalidConfigSnafu {
                        message: format!(
                            "day {}: overlap {:?} is listed twice",
                            day.label, entry.programs
                        )
                    }
                );
            }
        }

        Ok(())
    }

    pub fn program_index(&self, name: &str) -> Option<usize> {
        self.programs.iter().position(|program| program.name == name)
    }

    /// Bit mask of a program list, bit `i` standing for `programs[i]`.
    pub fn mask_of(&self, names: &[String]) -> Result<u32, String> {
        names.iter().try_fold(0u32, |mask, name| {
            self.program_index(name)
                .map(|index| mask | (1 << index))
                .ok_or_else(|| format!("unknown program {name}"))
        })
    }

    pub fn snapshot(&self, label: &str) -> AdmissionResult<Snapshot> {
        let ordinal = self
            .days
            .iter()
            .position(|day| day.label == label)
            .context(UnknownSnapshotSnafu { label })?;

        Ok(Snapshot {
            label: label.to_string(),
            ordinal,
            is_initial: ordinal == 0,
            is_final: ordinal + 1 == self.days.len(),
        })
    }

    pub fn day(&self, label: &str) -> AdmissionResult<&DaySpec> {
        self.days
            .iter()
            .find(|day| day.label == label)
            .context(UnknownSnapshotSnafu { label })
    }

    /// Four programs over four days of intake.
    pub fn builtin() -> Self {
        let programs = [("PM", 40), ("IVT", 50), ("ITSS", 30), ("IB", 20)]
            .into_iter()
            .map(|(name, capacity)| Program {
                name: name.to_string(),
                capacity,
            })
            .collect();

        let pairs = [
            ("01.08", [22, 17, 20, 19, 22, 17]),
            ("02.08", [190, 190, 150, 190, 140, 120]),
            ("03.08", [760, 600, 470, 750, 460, 500]),
            ("04.08", [1090, 1110, 1070, 1050, 1040, 1090]),
        ];
        let triples = [[5, 5, 5, 5], [70, 70, 70, 50], [500, 260, 300, 250], [1020, 1020, 1000, 1040]];
        let quads = [3, 50, 200, 1000];

        let pair_sets = [
            ["PM", "IVT"],
            ["PM", "ITSS"],
            ["PM", "IB"],
            ["IVT", "ITSS"],
            ["IVT", "IB"],
            ["ITSS", "IB"],
        ];
        let triple_sets = [
            ["PM", "IVT", "ITSS"],
            ["PM", "IVT", "IB"],
            ["PM", "ITSS", "IB"],
            ["IVT", "ITSS", "IB"],
        ];

        let entry = |names: &[&str], count: u64| OverlapEntry {
            programs: names.iter().map(|name| name.to_string()).collect(),
            count,
        };

        let days = pairs
            .iter()
            .zip(triples.iter())
            .zip(quads.iter())
            .map(|(((label, pair_counts), triple_counts), quad)| {
                let mut overlaps: Vec<OverlapEntry> = pair_sets
                    .iter()
                    .zip(pair_counts.iter())
                    .map(|(names, count)| entry(&names[..], *count))
                    .collect();
                overlaps.extend(
                    triple_sets
                        .iter()
                        .zip(triple_counts.iter())
                        .map(|(names, count)| entry(&names[..], *count)),
                );
                overlaps.push(entry(&["PM", "IVT", "ITSS", "IB"][..], *quad));
                DaySpec {
                    label: label.to_string(),
                    overlaps,
                }
            })
            .collect();

        Campaign { programs, days }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_programs() -> Campaign {
        Campaign {
            programs: vec![
                Program {
                    name: "A".to_string(),
                    capacity: 1,
                },
                Program {
                    name: "B".to_string(),
                    capacity: 1,
                },
            ],
            days: vec![DaySpec {
                label: "d1".to_string(),
                overlaps: vec![OverlapEntry {
                    programs: vec!["A".to_string(), "B".to_string()],
                    count: 3,
                }],
            }],
        }
    }

    #[test]
    fn builtin_campaign_is_valid() {
        let campaign = Campaign::builtin();
        campaign.validate().unwrap();
        assert_eq!(campaign.programs.len(), 4);
        assert_eq!(campaign.days.len(), 4);
        assert!(campaign.days.iter().all(|day| day.overlaps.len() == 11));
    }

    #[test]
    fn first_and_last_days_are_marked() {
        let campaign = Campaign::builtin();
        let first = campaign.snapshot("01.08").unwrap();
        assert!(first.is_initial && !first.is_final);
        let last = campaign.snapshot("04.08").unwrap();
        assert_eq!(last.ordinal, 3);
        assert!(last.is_final && !last.is_initial);
        assert!(campaign.snapshot("05.08").is_err());
    }

    #[test]
    fn rejects_single_program_overlap() {
        let mut campaign = two_programs();
        campaign.days[0].overlaps.push(OverlapEntry {
            programs: vec!["A".to_string(), "A".to_string()],
            count: 1,
        });
        assert!(campaign.validate().is_err());
    }

    #[test]
    fn rejects_unknown_program_and_zero_capacity() {
        let mut campaign = two_programs();
        campaign.days[0].overlaps[0].programs[1] = "C".to_string();
        assert!(campaign.validate().is_err());

        let mut campaign = two_programs();
        campaign.programs[0].capacity = 0;
        assert!(campaign.validate().is_err());
    }

    #[test]
    fn rejects_overlap_counts_that_overflow() {
        let mut campaign = two_programs();
        campaign.days[0].overlaps[0].count = MAX_OVERLAP_COUNT;
        campaign.validate().unwrap();

        campaign.days[0].overlaps[0].count = u64::MAX;
        let err = campaign.validate().unwrap_err();
        assert!(matches!(err, crate::error::AdmissionError::InvalidConfig { .. }));
    }

    #[test]
    fn parses_json_campaign() {
        let raw = r#"{
            "programs": [{"name": "A", "capacity": 1}, {"name": "B", "capacity": 1}],
            "days": [{"label": "d1", "overlaps": [{"programs": ["A", "B"], "count": 3}]}]
        }"#;
        let campaign: Campaign = serde_json::from_str(raw).unwrap();
        assert_eq!(campaign, two_programs());
        assert_eq!(campaign.mask_of(&["B".to_string()]), Ok(0b10));
    }
}
