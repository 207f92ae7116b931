//! Reconstruction of exact program-membership counts from "at least these
//! programs" intersection counts, by inclusion–exclusion over the subset
//! lattice.
//!
//! Subsets of the campaign's programs are bit masks: bit `i` is set when
//! `campaign.programs[i]` belongs to the subset.

use std::collections::BTreeMap;

use log::warn;

use crate::config::{Campaign, DaySpec};
use crate::error::{AdmissionResult, InvalidConfigSnafu};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverlapInput {
    program_count: usize,
    given: BTreeMap<u32, u64>,
}

impl OverlapInput {
    /// Subsets with fewer than two programs are ignored: their aggregates are
    /// always derived, never supplied.
    pub fn new(program_count: usize, given: impl IntoIterator<Item = (u32, u64)>) -> Self {
        let given = given
            .into_iter()
            .filter(|(mask, _)| mask.count_ones() >= 2)
            .collect();
        OverlapInput {
            program_count,
            given,
        }
    }

    pub fn from_day(campaign: &Campaign, day: &DaySpec) -> AdmissionResult<Self> {
        let mut given = Vec::with_capacity(day.overlaps.len());
        for entry in &day.overlaps {
            let mask = campaign
                .mask_of(&entry.programs)
                .map_err(|message| InvalidConfigSnafu { message }.build())?;
            given.push((mask, entry.count));
        }
        Ok(Self::new(campaign.programs.len(), given))
    }

    pub fn program_count(&self) -> usize {
        self.program_count
    }

    #[cfg(test)]
    pub fn given(&self, mask: u32) -> u64 {
        self.given.get(&mask).copied().unwrap_or(0)
    }

    pub fn supplied(&self) -> impl Iterator<Item = (u32, u64)> + '_ {
        self.given.iter().map(|(mask, count)| (*mask, *count))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconstruction {
    exact: Vec<i64>,
}

pub fn reconstruct(input: &OverlapInput) -> Reconstruction {
    let subsets = 1u32 << input.program_count();
    let mut exact = vec![0i64; subsets as usize];

    // The empty set stays at zero: without a population size there is no
    // aggregate that could pin down applicants outside every program.
    for subset in 1..subsets {
        exact[subset as usize] = input
            .supplied()
            .filter(|(superset, _)| superset & subset == subset)
            .map(|(superset, count)| {
                let count = i64::try_from(count).unwrap_or(i64::MAX);
                let distance = superset.count_ones() - subset.count_ones();
                if distance % 2 == 0 {
                    count
                } else {
                    -count
                }
            })
            .fold(0i64, i64::saturating_add);
    }

    Reconstruction { exact }
}

impl Reconstruction {
    /// Unclipped inclusion–exclusion result for `mask`.
    pub fn raw(&self, mask: u32) -> i64 {
        self.exact.get(mask as usize).copied().unwrap_or(0)
    }

    /// Number of applicants whose program set is exactly `mask`.
    pub fn count(&self, mask: u32) -> u64 {
        self.raw(mask).max(0) as u64
    }

    /// Subsets whose exact count came out negative and were clipped to zero.
    pub fn clipped(&self) -> Vec<(u32, i64)> {
        self.exact
            .iter()
            .enumerate()
            .filter(|(_, value)| **value < 0)
            .map(|(mask, value)| (mask as u32, *value))
            .collect()
    }

    /// Every subset including the empty one, smallest first and in
    /// lexicographic order of their members within one size.
    pub fn subsets(&self) -> Vec<u32> {
        let mut masks: Vec<u32> = (0..self.exact.len() as u32).collect();
        masks.sort_by_key(|mask| (mask.count_ones(), members(*mask)));
        masks
    }

    pub fn populated(&self) -> Vec<(u32, u64)> {
        self.subsets()
            .into_iter()
            .map(|mask| (mask, self.count(mask)))
            .filter(|(_, count)| *count > 0)
            .collect()
    }

    pub fn applicant_total(&self) -> u64 {
        (0..self.exact.len() as u32).map(|mask| self.count(mask)).sum()
    }

    pub fn warn_clipped(&self, campaign: &Campaign, label: &str) {
        for (mask, value) in self.clipped() {
            let names: Vec<&str> = members(mask)
                .into_iter()
                .filter_map(|index| campaign.programs.get(index))
                .map(|program| program.name.as_str())
                .collect();
            warn!(
                "day {label}: inconsistent overlap input, exact count for {{{}}} is {value}, using 0",
                names.join(", ")
            );
        }
    }
}

/// Program indices contained in `mask`, ascending.
pub fn members(mask: u32) -> Vec<usize> {
    (0..u32::BITS as usize)
        .filter(|index| mask & (1 << index) != 0)
        .collect()
}
