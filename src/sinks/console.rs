use std::io::{self, Stdout, Write};

use anyhow::{Context, Result};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Panel, Style, object::Rows},
};

use super::ResultSink;
use crate::report::{ScoreReport, format_score};

/// One row of the overview table.
#[derive(Tabled)]
struct OverviewRow {
    /// Submitter id.
    #[tabled(rename = "Submitter")]
    submitter: String,
    /// Score, blank when there is none.
    #[tabled(rename = "Score")]
    score:     String,
    /// Short status.
    #[tabled(rename = "Status")]
    status:    String,
}

impl From<&ScoreReport> for OverviewRow {
    fn from(report: &ScoreReport) -> Self {
        let result = report.result();
        let status = if result.load_error().is_some() {
            "failed to load"
        } else if result.is_fully_correct() {
            "correct"
        } else if result.final_score().is_none() {
            "not graded"
        } else {
            "incorrect"
        };

        Self {
            submitter: report.submitter_id().to_string(),
            score:     result.final_score().map(format_score).unwrap_or_default(),
            status:    status.to_string(),
        }
    }
}

/// Prints each report, and optionally an overview table.
pub struct ConsoleSink<W = Stdout> {
    /// Render the one-line form even for incorrect submissions.
    prefer_short: bool,
    /// Print an overview table after the reports.
    overview:     bool,
    /// Where output goes.
    out:          W,
}

impl ConsoleSink<Stdout> {
    /// Prints to standard output.
    pub fn stdout(prefer_short: bool, overview: bool) -> Self {
        Self::with_writer(prefer_short, overview, io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    /// Prints to `out`.
    pub fn with_writer(prefer_short: bool, overview: bool, out: W) -> Self {
        Self {
            prefer_short,
            overview,
            out,
        }
    }

    /// The underlying writer.
    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Renders the overview table.
    fn overview_table(reports: &[ScoreReport]) -> String {
        let rows: Vec<OverviewRow> = reports.iter().map(OverviewRow::from).collect();
        let lab = reports
            .first()
            .map(|r| format!("Lab {:03} overview", r.lab_number()))
            .unwrap_or_else(|| "Overview".to_string());
        let graded = reports.iter().filter(|r| r.result().final_score().is_some()).count();

        Table::new(rows)
            .with(Style::modern())
            .with(Panel::header(lab))
            .with(Panel::footer(format!("{graded} of {} graded", reports.len())))
            .with(Modify::new(Rows::first()).with(Alignment::center()))
            .to_string()
    }
}

impl<W: Write> ResultSink for ConsoleSink<W> {
    fn name(&self) -> &str {
        "console"
    }

    fn handle_batch(&mut self, reports: &[ScoreReport]) -> Result<()> {
        for report in reports {
            writeln!(self.out, "{}", report.render(self.prefer_short))
                .context("Could not write report to console")?;
        }

        if self.overview && !reports.is_empty() {
            writeln!(self.out, "{}", Self::overview_table(reports))
                .context("Could not write overview to console")?;
        }

        self.out.flush().context("Could not flush console")
    }
}
