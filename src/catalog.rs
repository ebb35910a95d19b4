//! Static presale catalog backed by a directory of JSON files.
//!
//! Each `<slug>.json` file holds one [`PresaleRecord`]. Broken files are
//! logged and skipped so a single bad record never hides the rest.

use crate::types::PresaleRecord;
use anyhow::{Context, Result};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Loader for the on-disk presale catalog.
#[derive(Debug, Clone)]
pub struct PresaleCatalog {
    dir: PathBuf,
}

impl PresaleCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Load every record in the catalog, newest first.
    #[instrument(skip(self), fields(dir = %self.dir.display()))]
    pub async fn load(&self) -> Result<Vec<PresaleRecord>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("Failed to read catalog directory {}", self.dir.display()))?;

        let mut paths = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .context("Failed to list catalog directory")?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        // read_dir order is platform dependent
        paths.sort();

        let mut records = Vec::with_capacity(paths.len());
        for path in paths {
            match Self::read_record(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping presale file {}: {:#}", path.display(), e),
            }
        }

        sort_newest_first(&mut records);
        info!("Loaded {} presale records", records.len());
        Ok(records)
    }

    /// Look up a single record by slug.
    #[instrument(skip(self))]
    pub async fn find_by_slug(&self, slug: &str) -> Result<Option<PresaleRecord>> {
        if slug.is_empty() || slug.contains(['/', '\\']) || slug.contains("..") {
            debug!("Rejected suspicious slug {:?}", slug);
            return Ok(None);
        }

        let path = self.dir.join(format!("{}.json", slug));
        let exists = tokio::fs::try_exists(&path)
            .await
            .with_context(|| format!("Failed to check presale file {}", path.display()))?;
        if !exists {
            return Ok(None);
        }

        Self::read_record(&path).await.map(Some)
    }

    async fn read_record(path: &Path) -> Result<PresaleRecord> {
        let content = tokio::fs::read_to_string(path)
            .await
            .context("Failed to read file")?;
        let mut record: PresaleRecord =
            serde_json::from_str(&content).context("Failed to parse presale JSON")?;

        if record.slug.is_empty() {
            record.slug = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
        }
        record.validate()?;

        debug!("Read presale {} ({})", record.slug, record.symbol);
        Ok(record)
    }
}

/// Sort by listing date descending. Undated records go last, in their
/// original order.
pub fn sort_newest_first(records: &mut [PresaleRecord]) {
    records.sort_by(|a, b| match (a.listed_at(), b.listed_at()) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(slug: &str, date: &str) -> PresaleRecord {
        serde_json::from_value(serde_json::json!({
            "slug": slug,
            "title": slug,
            "symbol": slug.to_uppercase(),
            "status": "Live",
            "date": date,
        }))
        .unwrap()
    }

    #[test]
    fn test_sort_newest_first_with_undated_last() {
        let mut records = vec![
            record("old", "2024-01-01"),
            record("nodate-a", "soon"),
            record("new", "2025-03-01T12:00:00Z"),
            record("nodate-b", "tbd"),
            record("mid", "2024-08-15"),
        ];

        sort_newest_first(&mut records);

        let slugs: Vec<_> = records.iter().map(|r| r.slug.as_str()).collect();
        assert_eq!(slugs, vec!["new", "mid", "old", "nodate-a", "nodate-b"]);
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let catalog = PresaleCatalog::new("/definitely/not/a/real/catalog/dir");
        assert!(catalog.load().await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_slug_rejects_traversal() {
        let catalog = PresaleCatalog::new(std::env::temp_dir());
        assert!(catalog.find_by_slug("../etc/passwd").await.unwrap().is_none());
        assert!(catalog.find_by_slug("a/b").await.unwrap().is_none());
        assert!(catalog.find_by_slug("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_by_slug_reports_io_errors() {
        // A regular file where the directory should be: the lookup fails with
        // "not a directory" rather than "not found"
        let file = std::env::temp_dir().join(format!("presale-not-a-dir-{:016x}", rand::random::<u64>()));
        std::fs::write(&file, "{}").unwrap();
        let catalog = PresaleCatalog::new(&file);

        let result = catalog.find_by_slug("best-wallet").await;
        std::fs::remove_file(&file).unwrap();

        let err = result.unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to check presale file"));
        assert_eq!(catalog.dir(), file.as_path());
    }
}
