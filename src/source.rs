use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Deserializer, Serialize};
use snafu::{ensure, ResultExt};

use crate::error::{
    AdmissionResult, MalformedRecordSnafu, MissingSourceSnafu, OpeningSourceSnafu,
    WritingCsvSnafu,
};
use crate::models::Scores;

/// One row of a per-program source list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRecord {
    #[serde(rename = "ID")]
    pub id: i64,
    #[serde(rename = "Consent", deserialize_with = "deserialize_consent")]
    pub consent: bool,
    #[serde(rename = "Priority")]
    pub priority: i32,
    #[serde(rename = "Physics")]
    pub physics: i32,
    #[serde(rename = "Russian")]
    pub russian: i32,
    #[serde(rename = "Math")]
    pub math: i32,
    #[serde(rename = "Individual")]
    pub individual: i32,
    #[serde(rename = "Total")]
    pub total: i32,
}

impl SourceRecord {
    pub fn scores(&self) -> Scores {
        Scores {
            physics: self.physics,
            russian: self.russian,
            math: self.math,
            individual: self.individual,
        }
    }

    fn check(&self) -> Result<(), String> {
        if self.id <= 0 {
            return Err(format!("applicant id must be positive, got {}", self.id));
        }
        if self.priority <= 0 {
            return Err(format!("priority must be positive, got {}", self.priority));
        }
        let scores = self.scores();
        if [scores.physics, scores.russian, scores.math, scores.individual]
            .iter()
            .any(|value| *value < 0)
        {
            return Err(format!("negative score component for applicant {}", self.id));
        }
        Ok(())
    }
}

fn deserialize_consent<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "consent must be true or false, got {other:?}"
        ))),
    }
}

pub fn source_path(dir: &Path, day: &str, program: &str) -> PathBuf {
    dir.join(format!("{day}_{program}.csv"))
}

/// Reads a whole source list; any bad row rejects the list.
pub fn read_program_source(path: &Path, program: &str) -> AdmissionResult<Vec<SourceRecord>> {
    ensure!(path.exists(), MissingSourceSnafu { program, path });

    let mut reader = csv::Reader::from_path(path).context(OpeningSourceSnafu { path })?;
    let headers = reader
        .headers()
        .map_err(|err| {
            MalformedRecordSnafu {
                path,
                line: 1u64,
                message: err.to_string(),
            }
            .build()
        })?
        .clone();

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result.map_err(|err| {
            let line = err.position().map(|position| position.line()).unwrap_or(0);
            MalformedRecordSnafu {
                path,
                line,
                message: err.to_string(),
            }
            .build()
        })?;
        let line = row.position().map(|position| position.line()).unwrap_or(0);
        let record: SourceRecord = row
            .deserialize(Some(&headers))
            .map_err(|err| {
                MalformedRecordSnafu {
                    path,
                    line,
                    message: err.to_string(),
                }
                .build()
            })?;
        record.check().map_err(|message| {
            MalformedRecordSnafu {
                path,
                line,
                message,
            }
            .build()
        })?;
        records.push(record);
    }

    debug!("read {} records for {program} from {}", records.len(), path.display());
    Ok(records)
}

pub fn write_program_source(path: &Path, records: &[SourceRecord]) -> AdmissionResult<()> {
    let mut writer = csv::Writer::from_path(path).context(WritingCsvSnafu { path })?;
    for record in records {
        writer.serialize(record).context(WritingCsvSnafu { path })?;
    }
    writer
        .flush()
        .map_err(csv::Error::from)
        .context(WritingCsvSnafu { path })?;
    Ok(())
}
