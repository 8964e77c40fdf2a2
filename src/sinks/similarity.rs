use std::fs;

use anyhow::Result;
use itertools::Itertools;
use similar::TextDiff;
use tracing::{debug, warn};

use super::ResultSink;
use crate::report::ScoreReport;

/// Ratio at or above which two submissions are flagged.
pub const DEFAULT_THRESHOLD: f32 = 0.9;

/// Two submissions whose normalised sources are alike.
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarPair {
    /// Submitter id of the earlier file.
    pub first:  String,
    /// Submitter id of the later file.
    pub second: String,
    /// Line similarity, `0.0..=1.0`.
    pub ratio:  f32,
}

/// Strips `//` comments, surrounding whitespace and blank lines.
pub fn normalise(source: &str) -> String {
    source
        .lines()
        .map(|line| line.split_once("//").map_or(line, |(code, _)| code).trim())
        .filter(|line| !line.is_empty())
        .join("\n")
}

/// Every pair in `sources` whose similarity reaches `threshold`.
pub fn similar_pairs(sources: &[(String, String)], threshold: f32) -> Vec<SimilarPair> {
    sources
        .iter()
        .tuple_combinations()
        .filter_map(|((first, a), (second, b))| {
            let ratio = TextDiff::from_lines(a.as_str(), b.as_str()).ratio();
            (ratio >= threshold).then(|| SimilarPair {
                first: first.clone(),
                second: second.clone(),
                ratio,
            })
        })
        .collect()
}

/// Flags pairs of submissions that look alike. Runs offline over the batch
/// and has no effect on scores.
pub struct SimilaritySink {
    /// Flagging threshold.
    threshold: f32,
    /// Pairs flagged by the last batch.
    flagged:   Vec<SimilarPair>,
}

impl Default for SimilaritySink {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl SimilaritySink {
    /// Flags pairs at or above `threshold`.
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            flagged: Vec::new(),
        }
    }

    /// Pairs flagged by the last batch.
    pub fn flagged(&self) -> &[SimilarPair] {
        &self.flagged
    }
}

impl ResultSink for SimilaritySink {
    fn name(&self) -> &str {
        "similarity"
    }

    fn handle_batch(&mut self, reports: &[ScoreReport]) -> Result<()> {
        let sources: Vec<(String, String)> = reports
            .iter()
            .filter_map(|report| match fs::read_to_string(report.source_path()) {
                Ok(source) => Some((report.submitter_id().to_string(), normalise(&source))),
                Err(e) => {
                    debug!("Skipping {} in similarity scan: {e}", report.source_path().display());
                    None
                }
            })
            .filter(|(_, source)| !source.is_empty())
            .collect();

        self.flagged = similar_pairs(&sources, self.threshold);
        for pair in &self.flagged {
            warn!(
                "Lab from {} and {} might be similar ({:.0}% alike)",
                pair.first,
                pair.second,
                pair.ratio * 100.0
            );
        }
        Ok(())
    }
}
