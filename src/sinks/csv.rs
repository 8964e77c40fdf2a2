use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, ensure};
use itertools::Itertools;
use tracing::info;

use super::ResultSink;
use crate::report::{ScoreReport, format_score};

/// Field written for a submission that produced no score.
pub const UNSCORED: &str = "-1";

/// Submitter ids and their per-lab scores. Field `n - 1` holds lab `n`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreTable {
    /// Rows in file order.
    rows: Vec<(String, Vec<String>)>,
}

impl ScoreTable {
    /// Parses `submitter,score,score,...` lines.
    pub fn parse(contents: &str) -> Self {
        let rows = contents
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                let mut fields = line.split(',');
                let submitter = fields.next().unwrap_or_default().trim().to_string();
                (submitter, fields.map(|f| f.trim().to_string()).collect())
            })
            .collect();
        Self { rows }
    }

    /// Reads the table at `path`, or an empty table if there is none.
    pub fn read(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Could not read score table {}", path.display()))?;
        Ok(Self::parse(&contents))
    }

    /// Scores recorded for `submitter`.
    pub fn scores(&self, submitter: &str) -> Option<&[String]> {
        self.rows
            .iter()
            .find(|(id, _)| id == submitter)
            .map(|(_, scores)| scores.as_slice())
    }

    /// Pads every row to at least `width` fields.
    fn pad(&mut self, width: usize) {
        for (_, scores) in &mut self.rows {
            if scores.len() < width {
                scores.resize(width, String::new());
            }
        }
    }

    /// Sets the lab `lab_number` field of `submitter`, adding the row if new.
    fn set(&mut self, submitter: &str, lab_number: u32, value: String) {
        let index = lab_number as usize - 1;
        let position = match self.rows.iter().position(|(id, _)| id == submitter) {
            Some(position) => position,
            None => {
                self.rows.push((submitter.to_string(), Vec::new()));
                self.rows.len() - 1
            }
        };
        let row = &mut self.rows[position].1;
        if row.len() <= index {
            row.resize(index + 1, String::new());
        }
        row[index] = value;
    }

    /// Records every report's score under its lab.
    pub fn record(&mut self, lab_number: u32, reports: &[ScoreReport]) -> Result<()> {
        ensure!(lab_number > 0, "lab 0 has no column in the score table");
        self.pad(lab_number as usize);

        for report in reports {
            ensure!(
                report.lab_number() > 0,
                "{} was submitted for lab 0, which has no column in the score table",
                report.submitter_id()
            );
            let value = report
                .result()
                .final_score()
                .map(format_score)
                .unwrap_or_else(|| UNSCORED.to_string());
            self.set(report.submitter_id(), report.lab_number(), value);
        }

        Ok(())
    }

    /// Renders the table back to text.
    pub fn to_csv(&self) -> String {
        self.rows
            .iter()
            .map(|(id, scores)| format!("{id},{}\n", scores.iter().join(",")))
            .collect()
    }
}

/// Keeps a running score table on disk.
pub struct CsvSink {
    /// Score table file; nothing is written when unset.
    path:       Option<PathBuf>,
    /// Lab being graded; every row is padded to this many fields.
    lab_number: u32,
}

impl CsvSink {
    /// Persists scores for `lab_number` to `path`.
    pub fn new(path: Option<PathBuf>, lab_number: u32) -> Self {
        Self { path, lab_number }
    }
}

impl ResultSink for CsvSink {
    fn name(&self) -> &str {
        "csv"
    }

    fn handle_batch(&mut self, reports: &[ScoreReport]) -> Result<()> {
        let Some(path) = self.path.as_deref().filter(|p| !p.as_os_str().is_empty()) else {
            return Ok(());
        };

        let mut table = ScoreTable::read(path)?;
        table.record(self.lab_number, reports)?;
        fs::write(path, table.to_csv())
            .with_context(|| format!("Could not write score table {}", path.display()))?;

        info!("Scores for {} submissions saved to {}", reports.len(), path.display());
        Ok(())
    }
}
