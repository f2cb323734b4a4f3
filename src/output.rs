//! Download artifact for a finished report.
//!
//! The artifact is exactly what the user saw: [`FormattedReport::render`]
//! as UTF-8 plain text, under the name [`FormattedReport::file_name`].

use crate::error::RexError;
use crate::report::{FormattedReport, ReportId};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// MIME type of the downloaded file.
pub const REPORT_MIME: &str = "text/plain";

/// A report ready to be offered for download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportArtifact {
    pub id: ReportId,
    pub file_name: String,
    pub mime_type: String,
    pub content: String,
}

impl From<&FormattedReport> for ReportArtifact {
    fn from(report: &FormattedReport) -> Self {
        Self {
            id: report.id,
            file_name: report.file_name(),
            mime_type: REPORT_MIME.to_string(),
            content: report.render(),
        }
    }
}

impl ReportArtifact {
    /// Write the artifact into `dir`, returning the final path.
    ///
    /// Uses atomic write (temp file + rename) to prevent partial files. A
    /// report generated within the same second as an earlier one replaces it.
    pub async fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf, RexError> {
        let dir = dir.as_ref();
        let path = dir.join(&self.file_name);

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| RexError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        let tmp_path = path.with_extension("txt.tmp");
        tokio::fs::write(&tmp_path, self.content.as_bytes())
            .await
            .map_err(|e| RexError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        tokio::fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| RexError::OutputWriteFailed {
                path: path.clone(),
                source: e,
            })?;

        info!("Wrote {} ({} bytes)", path.display(), self.content.len());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn report() -> FormattedReport {
        let at = Local
            .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
            .single()
            .unwrap();
        FormattedReport::at(&at, "## Diagnosis\nNo malignancy.\n")
    }

    #[test]
    fn artifact_mirrors_rendered_report() {
        let r = report();
        let a = ReportArtifact::from(&r);
        assert_eq!(a.file_name, "pathology_report_20240309_140507.txt");
        assert_eq!(a.mime_type, "text/plain");
        assert_eq!(a.content, r.render());
    }

    #[tokio::test]
    async fn write_to_creates_file_with_exact_content() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/reports");
        let a = ReportArtifact::from(&report());

        let path = a.write_to(&target).await.expect("write should succeed");

        assert_eq!(path, target.join("pathology_report_20240309_140507.txt"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), a.content);
        assert!(!path.with_extension("txt.tmp").exists());
    }
}
