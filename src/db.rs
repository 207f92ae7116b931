use snafu::ResultExt;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use uuid::Uuid;

use crate::error::{
    AdmissionError, AdmissionResult, DatabaseSnafu, MigrationSnafu, OrphanApplicationSnafu,
    SnapshotAlreadyProcessedSnafu,
};
use crate::models::{Applicant, Application, Cutoff, PassingScore, RankedApplication, Scores};
use crate::store::{AdmissionStore, UnitOfWork};

pub async fn init_db(pool: &PgPool) -> AdmissionResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context(MigrationSnafu)?;
    Ok(())
}

/// One Postgres transaction. Rolled back when dropped without `commit`.
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PgUnitOfWork {
    pub async fn begin(pool: &PgPool) -> AdmissionResult<Self> {
        let tx = pool.begin().await.context(DatabaseSnafu)?;
        Ok(PgUnitOfWork { tx })
    }
}

fn applicant_from_row(row: &PgRow) -> Applicant {
    Applicant {
        id: row.get("id"),
        scores: Scores {
            physics: row.get("physics"),
            russian: row.get("russian"),
            math: row.get("math"),
            individual: row.get("individual"),
        },
    }
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_foreign_key_violation())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

impl AdmissionStore for PgUnitOfWork {
    async fn find_applicant(&mut self, id: i64) -> AdmissionResult<Option<Applicant>> {
        let row = sqlx::query(
            r#"
            SELECT id, physics, russian, math, individual
            FROM admission.applicants
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *self.tx)
        .await
        .context(DatabaseSnafu)?;

        Ok(row.as_ref().map(applicant_from_row))
    }

    async fn upsert_applicant(&mut self, applicant: &Applicant) -> AdmissionResult<()> {
        sqlx::query(
            r#"
            INSERT INTO admission.applicants (id, physics, russian, math, individual, total)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET physics = EXCLUDED.physics,
                russian = EXCLUDED.russian,
                math = EXCLUDED.math,
                individual = EXCLUDED.individual,
                total = EXCLUDED.total
            "#,
        )
        .bind(applicant.id)
        .bind(applicant.scores.physics)
        .bind(applicant.scores.russian)
        .bind(applicant.scores.math)
        .bind(applicant.scores.individual)
        .bind(applicant.total())
        .execute(&mut *self.tx)
        .await
        .context(DatabaseSnafu)?;
        Ok(())
    }

    async fn find_application(
        &mut self,
        applicant_id: i64,
        program: &str,
    ) -> AdmissionResult<Option<Application>> {
        let row = sqlx::query(
            r#"
            SELECT applicant_id, program, priority, consent
            FROM admission.applications
            WHERE applicant_id = $1 AND program = $2
            "#,
        )
        .bind(applicant_id)
        .bind(program)
        .fetch_optional(&mut *self.tx)
        .await
        .context(DatabaseSnafu)?;

        Ok(row.map(|row| Application {
            applicant_id: row.get("applicant_id"),
            program: row.get("program"),
            priority: row.get("priority"),
            consent: row.get("consent"),
        }))
    }

    async fn upsert_application(&mut self, application: &Application) -> AdmissionResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO admission.applications (id, applicant_id, program, priority, consent)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (applicant_id, program) DO UPDATE
            SET priority = EXCLUDED.priority, consent = EXCLUDED.consent
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(application.applicant_id)
        .bind(&application.program)
        .bind(application.priority)
        .bind(application.consent)
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_foreign_key_violation(&err) => OrphanApplicationSnafu {
                applicant_id: application.applicant_id,
                program: application.program.as_str(),
            }
            .fail(),
            Err(err) => Err(AdmissionError::Database { source: err }),
        }
    }

    async fn delete_applicant(&mut self, id: i64) -> AdmissionResult<()> {
        sqlx::query("DELETE FROM admission.applicants WHERE id = $1")
            .bind(id)
            .execute(&mut *self.tx)
            .await
            .context(DatabaseSnafu)?;
        Ok(())
    }

    async fn list_applicants(&mut self) -> AdmissionResult<Vec<Applicant>> {
        let rows = sqlx::query(
            r#"
            SELECT id, physics, russian, math, individual
            FROM admission.applicants
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *self.tx)
        .await
        .context(DatabaseSnafu)?;

        Ok(rows.iter().map(applicant_from_row).collect())
    }

    async fn list_applications(
        &mut self,
        program: &str,
        consent: bool,
    ) -> AdmissionResult<Vec<RankedApplication>> {
        let rows = sqlx::query(
            r#"
            SELECT a.applicant_id, a.priority, e.total
            FROM admission.applications a
            JOIN admission.applicants e ON e.id = a.applicant_id
            WHERE a.program = $1 AND a.consent = $2
            ORDER BY a.priority, e.total DESC, a.applicant_id
            "#,
        )
        .bind(program)
        .bind(consent)
        .fetch_all(&mut *self.tx)
        .await
        .context(DatabaseSnafu)?;

        Ok(rows
            .iter()
            .map(|row| RankedApplication {
                applicant_id: row.get("applicant_id"),
                priority: row.get("priority"),
                total: row.get("total"),
            })
            .collect())
    }

    async fn append_passing_score(&mut self, score: &PassingScore) -> AdmissionResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO admission.passing_scores
            (id, program, snapshot, snapshot_ordinal, score)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&score.program)
        .bind(&score.snapshot)
        .bind(score.snapshot_ordinal)
        .bind(score.cutoff.as_column())
        .execute(&mut *self.tx)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => SnapshotAlreadyProcessedSnafu {
                label: score.snapshot.as_str(),
            }
            .fail(),
            Err(err) => Err(AdmissionError::Database { source: err }),
        }
    }

    async fn list_passing_scores(&mut self, program: &str) -> AdmissionResult<Vec<PassingScore>> {
        let rows = sqlx::query(
            r#"
            SELECT program, snapshot, snapshot_ordinal, score
            FROM admission.passing_scores
            WHERE program = $1
            ORDER BY snapshot_ordinal
            "#,
        )
        .bind(program)
        .fetch_all(&mut *self.tx)
        .await
        .context(DatabaseSnafu)?;

        Ok(rows
            .iter()
            .map(|row| PassingScore {
                program: row.get("program"),
                snapshot: row.get("snapshot"),
                snapshot_ordinal: row.get("snapshot_ordinal"),
                cutoff: Cutoff::from_column(row.get("score")),
            })
            .collect())
    }

    async fn clear(&mut self) -> AdmissionResult<()> {
        sqlx::query("DELETE FROM admission.passing_scores")
            .execute(&mut *self.tx)
            .await
            .context(DatabaseSnafu)?;
        sqlx::query("DELETE FROM admission.applicants")
            .execute(&mut *self.tx)
            .await
            .context(DatabaseSnafu)?;
        Ok(())
    }
}

impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> AdmissionResult<()> {
        self.tx.commit().await.context(DatabaseSnafu)
    }
}
