//! Record access needed by the snapshot pipeline, plus an in-memory backend.
//! The Postgres backend lives in `db.rs`.

use std::collections::BTreeMap;

use snafu::ensure;

use crate::error::{AdmissionResult, OrphanApplicationSnafu, SnapshotAlreadyProcessedSnafu};
use crate::models::{Applicant, Application, PassingScore, RankedApplication};

#[allow(async_fn_in_trait)]
pub trait AdmissionStore {
    async fn find_applicant(&mut self, id: i64) -> AdmissionResult<Option<Applicant>>;

    async fn upsert_applicant(&mut self, applicant: &Applicant) -> AdmissionResult<()>;

    async fn find_application(
        &mut self,
        applicant_id: i64,
        program: &str,
    ) -> AdmissionResult<Option<Application>>;

    /// Fails when the applicant does not exist.
    async fn upsert_application(&mut self, application: &Application) -> AdmissionResult<()>;

    /// Removes the applicant together with all of their applications.
    async fn delete_applicant(&mut self, id: i64) -> AdmissionResult<()>;

    /// All applicants, by ascending id.
    async fn list_applicants(&mut self) -> AdmissionResult<Vec<Applicant>>;

    async fn list_applications(
        &mut self,
        program: &str,
        consent: bool,
    ) -> AdmissionResult<Vec<RankedApplication>>;

    async fn append_passing_score(&mut self, score: &PassingScore) -> AdmissionResult<()>;

    /// Passing scores of one program in snapshot order.
    async fn list_passing_scores(&mut self, program: &str) -> AdmissionResult<Vec<PassingScore>>;

    /// Deletes every applicant, application and passing score.
    async fn clear(&mut self) -> AdmissionResult<()>;
}

/// A store whose writes become visible only once committed. Dropping it
/// without committing discards every write.
#[allow(async_fn_in_trait)]
pub trait UnitOfWork: AdmissionStore + Sized {
    async fn commit(self) -> AdmissionResult<()>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryStore {
    applicants: BTreeMap<i64, Applicant>,
    applications: BTreeMap<(i64, String), Application>,
    passing_scores: Vec<PassingScore>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) -> MemoryUnitOfWork<'_> {
        let working = self.clone();
        MemoryUnitOfWork {
            target: self,
            working,
        }
    }

    #[cfg(test)]
    pub fn application_count(&self) -> usize {
        self.applications.len()
    }

    #[cfg(test)]
    pub fn applications(&self) -> impl Iterator<Item = &Application> {
        self.applications.values()
    }
}

impl AdmissionStore for MemoryStore {
    async fn find_applicant(&mut self, id: i64) -> AdmissionResult<Option<Applicant>> {
        Ok(self.applicants.get(&id).cloned())
    }

    async fn upsert_applicant(&mut self, applicant: &Applicant) -> AdmissionResult<()> {
        self.applicants.insert(applicant.id, applicant.clone());
        Ok(())
    }

    async fn find_application(
        &mut self,
        applicant_id: i64,
        program: &str,
    ) -> AdmissionResult<Option<Application>> {
        Ok(self
            .applications
            .get(&(applicant_id, program.to_string()))
            .cloned())
    }

    async fn upsert_application(&mut self, application: &Application) -> AdmissionResult<()> {
        ensure!(
            self.applicants.contains_key(&application.applicant_id),
            OrphanApplicationSnafu {
                applicant_id: application.applicant_id,
                program: application.program.as_str(),
            }
        );
        self.applications.insert(
            (application.applicant_id, application.program.clone()),
            application.clone(),
        );
        Ok(())
    }

    async fn delete_applicant(&mut self, id: i64) -> AdmissionResult<()> {
        self.applicants.remove(&id);
        self.applications
            .retain(|(applicant_id, _), _| *applicant_id != id);
        Ok(())
    }

    async fn list_applicants(&mut self) -> AdmissionResult<Vec<Applicant>> {
        Ok(self.applicants.values().cloned().collect())
    }

    async fn list_applications(
        &mut self,
        program: &str,
        consent: bool,
    ) -> AdmissionResult<Vec<RankedApplication>> {
        Ok(self
            .applications
            .values()
            .filter(|application| application.program == program && application.consent == consent)
            .filter_map(|application| {
                let applicant = self.applicants.get(&application.applicant_id)?;
                Some(RankedApplication {
                    applicant_id: application.applicant_id,
                    priority: application.priority,
                    total: applicant.total(),
                })
            })
            .collect())
    }

    async fn append_passing_score(&mut self, score: &PassingScore) -> AdmissionResult<()> {
        ensure!(
            !self
                .passing_scores
                .iter()
                .any(|existing| existing.program == score.program
                    && existing.snapshot == score.snapshot),
            SnapshotAlreadyProcessedSnafu {
                label: score.snapshot.as_str(),
            }
        );
        self.passing_scores.push(score.clone());
        Ok(())
    }

    async fn list_passing_scores(&mut self, program: &str) -> AdmissionResult<Vec<PassingScore>> {
        let mut scores: Vec<PassingScore> = self
            .passing_scores
            .iter()
            .filter(|score| score.program == program)
            .cloned()
            .collect();
        scores.sort_by_key(|score| score.snapshot_ordinal);
        Ok(scores)
    }

    async fn clear(&mut self) -> AdmissionResult<()> {
        *self = MemoryStore::default();
        Ok(())
    }
}

pub struct MemoryUnitOfWork<'a> {
    target: &'a mut MemoryStore,
    working: MemoryStore,
}

impl AdmissionStore for MemoryUnitOfWork<'_> {
    async fn find_applicant(&mut self, id: i64) -> AdmissionResult<Option<Applicant>> {
        self.working.find_applicant(id).await
    }

    async fn upsert_applicant(&mut self, applicant: &Applicant) -> AdmissionResult<()> {
        self.working.upsert_applicant(applicant).await
    }

    async fn find_application(
        &mut self,
        applicant_id: i64,
        program: &str,
    ) -> AdmissionResult<Option<Application>> {
        self.working.find_application(applicant_id, program).await
    }

    async fn upsert_application(&mut self, application: &Application) -> AdmissionResult<()> {
        self.working.upsert_application(application).await
    }

    async fn delete_applicant(&mut self, id: i64) -> AdmissionResult<()> {
        self.working.delete_applicant(id).await
    }

    async fn list_applicants(&mut self) -> AdmissionResult<Vec<Applicant>> {
        self.working.list_applicants().await
    }

    async fn list_applications(
        &mut self,
        program: &str,
        consent: bool,
    ) -> AdmissionResult<Vec<RankedApplication>> {
        self.working.list_applications(program, consent).await
    }

    async fn append_passing_score(&mut self, score: &PassingScore) -> AdmissionResult<()> {
        self.working.append_passing_score(score).await
    }

    async fn list_passing_scores(&mut self, program: &str) -> AdmissionResult<Vec<PassingScore>> {
        self.working.list_passing_scores(program).await
    }

    async fn clear(&mut self) -> AdmissionResult<()> {
        self.working.clear().await
    }
}

impl UnitOfWork for MemoryUnitOfWork<'_> {
    async fn commit(self) -> AdmissionResult<()> {
        *self.target = self.working;
        Ok(())
    }
}
