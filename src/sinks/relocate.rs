use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Result, bail};
use tracing::{debug, error, info};

use super::ResultSink;
use crate::report::ScoreReport;

/// Moves graded submission files into a "finished" directory.
pub struct RelocateSink {
    /// Destination directory. Nothing moves unless it already exists.
    destination: Option<PathBuf>,
}

impl RelocateSink {
    /// Moves files into `destination`.
    pub fn new(destination: Option<PathBuf>) -> Self {
        Self { destination }
    }

    /// The destination, if it is an existing directory.
    fn existing_destination(&self) -> Option<&Path> {
        self.destination.as_deref().filter(|dir| dir.is_dir())
    }
}

impl ResultSink for RelocateSink {
    fn name(&self) -> &str {
        "relocate"
    }

    fn handle_batch(&mut self, reports: &[ScoreReport]) -> Result<()> {
        let Some(destination) = self.existing_destination() else {
            debug!("No finished-labs directory, leaving submissions in place");
            return Ok(());
        };

        let mut failed = Vec::new();
        for report in reports {
            let source = report.source_path();
            let Some(file_name) = source.file_name() else {
                continue;
            };
            let target = destination.join(file_name);

            if let Err(e) = fs::rename(source, &target) {
                error!("Could not move {} to {}: {e}", source.display(), target.display());
                failed.push(source.display().to_string());
            }
        }

        info!(
            "Moved {} submissions to {}",
            reports.len() - failed.len(),
            destination.display()
        );
        if !failed.is_empty() {
            bail!("could not move {}", failed.join(", "));
        }
        Ok(())
    }
}
