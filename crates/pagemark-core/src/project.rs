//! On-disk layout of an annotation project.
//!
//! ```text
//! <root>/<sha>/<sha>.pdf
//! <root>/<sha>/pdf_structure.json
//! <root>/<sha>/<annotator>_annotations.json
//! <root>/status/<annotator>.json
//! ```

use crate::annotation::{AnnotationFile, AnnotatorStatus};
use crate::error::PagemarkError;
use crate::model::TokenPage;
use std::path::{Path, PathBuf};

const STRUCTURE_FILE: &str = "pdf_structure.json";
const STATUS_DIR: &str = "status";
const ANNOTATIONS_SUFFIX: &str = "_annotations.json";

#[derive(Debug, Clone)]
pub struct ProjectFolder {
    root: PathBuf,
}

impl ProjectFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        ProjectFolder { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn paper_dir(&self, sha: &str) -> PathBuf {
        self.root.join(sha)
    }

    pub fn pdf_path(&self, sha: &str) -> PathBuf {
        self.paper_dir(sha).join(format!("{sha}.pdf"))
    }

    pub fn structure_path(&self, sha: &str) -> PathBuf {
        self.paper_dir(sha).join(STRUCTURE_FILE)
    }

    pub fn annotations_path(&self, sha: &str, annotator: &str) -> PathBuf {
        self.paper_dir(sha).join(format!("{annotator}{ANNOTATIONS_SUFFIX}"))
    }

    pub fn status_path(&self, annotator: &str) -> PathBuf {
        self.root.join(STATUS_DIR).join(format!("{annotator}.json"))
    }

    /// Papers in the project: sub-directories holding a structure file,
    /// sorted by sha.
    pub fn papers(&self) -> Result<Vec<String>, PagemarkError> {
        let mut papers = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if entry.path().join(STRUCTURE_FILE).is_file() {
                papers.push(name);
            }
        }
        papers.sort();
        Ok(papers)
    }

    /// Annotators with a status file, sorted.
    pub fn annotators(&self) -> Result<Vec<String>, PagemarkError> {
        let dir = self.root.join(STATUS_DIR);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let mut annotators = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                annotators.push(stem.to_string());
            }
        }
        annotators.sort();
        Ok(annotators)
    }

    pub fn load_structure(&self, sha: &str) -> Result<Vec<TokenPage>, PagemarkError> {
        let content = std::fs::read_to_string(self.structure_path(sha))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// The annotator's file for a paper, or `None` if they never saved one.
    pub fn load_annotations(
        &self,
        sha: &str,
        annotator: &str,
    ) -> Result<Option<AnnotationFile>, PagemarkError> {
        let path = self.annotations_path(sha, annotator);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// Replace the annotator's file for a paper.
    pub fn save_annotations(
        &self,
        sha: &str,
        annotator: &str,
        file: &AnnotationFile,
    ) -> Result<(), PagemarkError> {
        let path = self.annotations_path(sha, annotator);
        let json = serde_json::to_string_pretty(file)?;
        std::fs::write(&path, json)?;
        tracing::debug!(path = %path.display(), "annotations saved");
        Ok(())
    }

    pub fn load_status(&self, annotator: &str) -> Result<AnnotatorStatus, PagemarkError> {
        let content = std::fs::read_to_string(self.status_path(annotator))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Papers assigned to `annotator`, skipping junk and, unless
    /// `include_unfinished`, anything not marked finished.
    pub fn papers_for(
        &self,
        annotator: &str,
        include_unfinished: bool,
    ) -> Result<Vec<String>, PagemarkError> {
        let status = self.load_status(annotator)?;
        Ok(status
            .into_iter()
            .filter(|(_, s)| !s.junk && (include_unfinished || s.finished))
            .map(|(sha, _)| sha)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::{Label, Region};
    use crate::geometry::Bounds;
    use tempfile::TempDir;

    fn project() -> (TempDir, ProjectFolder) {
        let dir = TempDir::new().unwrap();
        let folder = ProjectFolder::new(dir.path());
        for sha in ["aaa", "bbb"] {
            std::fs::create_dir_all(folder.paper_dir(sha)).unwrap();
            std::fs::write(folder.structure_path(sha), "[]").unwrap();
        }
        std::fs::create_dir_all(folder.paper_dir("not-a-paper")).unwrap();
        std::fs::create_dir_all(dir.path().join(STATUS_DIR)).unwrap();
        std::fs::write(
            folder.status_path("mark"),
            r#"{
                "aaa": {"finished": true, "junk": false, "annotations": 3, "comments": ""},
                "bbb": {"finished": false, "junk": false, "annotations": 0, "comments": ""},
                "ccc": {"finished": true, "junk": true, "annotations": 1, "comments": "scan"}
            }"#,
        )
        .unwrap();
        (dir, folder)
    }

    #[test]
    fn test_lists_papers_and_annotators() {
        let (_dir, folder) = project();
        assert_eq!(folder.papers().unwrap(), vec!["aaa", "bbb"]);
        assert_eq!(folder.annotators().unwrap(), vec!["mark"]);
    }

    #[test]
    fn test_papers_for_filters_status() {
        let (_dir, folder) = project();
        assert_eq!(folder.papers_for("mark", false).unwrap(), vec!["aaa"]);
        assert_eq!(folder.papers_for("mark", true).unwrap(), vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_annotations_round_trip_through_disk() {
        let (_dir, folder) = project();
        assert!(folder.load_annotations("aaa", "mark").unwrap().is_none());

        let mut file = AnnotationFile::default();
        file.add_annotation(
            0,
            Label::new("Title", "#f00"),
            Bounds {
                left: 1.0,
                top: 2.0,
                right: 3.0,
                bottom: 4.0,
            },
            Region::FreeForm,
        );
        folder.save_annotations("aaa", "mark", &file).unwrap();

        let loaded = folder.load_annotations("aaa", "mark").unwrap().unwrap();
        assert_eq!(loaded.annotations, file.annotations);
    }

    #[test]
    fn test_missing_status_is_an_error() {
        let (_dir, folder) = project();
        assert!(folder.papers_for("nobody", false).is_err());
    }
}
