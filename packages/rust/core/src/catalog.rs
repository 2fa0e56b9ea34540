//! Seed catalog: the curated list of exam domains and the documentation URLs
//! backing each domain.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use certcorpus_shared::{CorpusError, Result};
use certcorpus_storage::SeedMeta;

use crate::pipeline::IngestTarget;

/// Top-level seed catalog for one certification exam.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedCatalog {
    /// Exam identifier, e.g. `ASSOC_DEV_PY`.
    pub exam_code: String,
    pub domains: Vec<ExamDomain>,
}

/// One scored exam domain with its seed URLs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExamDomain {
    pub id: i64,
    pub name: String,
    pub seed_urls: Vec<SeedUrl>,
}

/// A single curated documentation URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedUrl {
    pub id: String,
    pub url: String,
    pub source_type: String,
}

impl SeedCatalog {
    /// Load a catalog from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CorpusError::io(path, e))?;
        let catalog: SeedCatalog = serde_json::from_str(&raw).map_err(|e| {
            CorpusError::validation(format!("invalid seed catalog {}: {e}", path.display()))
        })?;

        if catalog.domains.is_empty() {
            return Err(CorpusError::validation(format!(
                "seed catalog {} has no domains",
                path.display()
            )));
        }

        info!(
            exam_code = %catalog.exam_code,
            domains = catalog.domains.len(),
            urls = catalog.url_count(),
            "seed catalog loaded"
        );
        Ok(catalog)
    }

    pub fn url_count(&self) -> usize {
        self.domains.iter().map(|d| d.seed_urls.len()).sum()
    }

    /// Flatten the catalog into ingest targets, each tagged with its domain
    /// provenance. Duplicate URLs across domains keep the first occurrence.
    pub fn targets(&self) -> Vec<IngestTarget> {
        let mut seen = std::collections::HashSet::new();
        let mut targets = Vec::new();
        for domain in &self.domains {
            for seed in &domain.seed_urls {
                if !seen.insert(seed.url.as_str()) {
                    continue;
                }
                targets.push(IngestTarget {
                    url: seed.url.clone(),
                    seed: Some(SeedMeta {
                        exam_code: Some(self.exam_code.clone()),
                        domain_id: Some(domain.id),
                        domain_name: Some(domain.name.clone()),
                        seed_id: Some(seed.id.clone()),
                    }),
                });
            }
        }
        targets
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG_JSON: &str = r#"{
        "exam_code": "ASSOC_DEV_PY",
        "domains": [
            {
                "id": 1,
                "name": "MongoDB Overview and the Document Model",
                "seed_urls": [
                    {
                        "id": "document-model",
                        "url": "https://docs.example.com/manual/core/document/",
                        "source_type": "manual"
                    }
                ]
            },
            {
                "id": 2,
                "name": "CRUD",
                "seed_urls": [
                    {
                        "id": "insert-one",
                        "url": "https://docs.example.com/manual/reference/method/db.collection.insertOne/",
                        "source_type": "reference"
                    },
                    {
                        "id": "document-model-dup",
                        "url": "https://docs.example.com/manual/core/document/",
                        "source_type": "manual"
                    }
                ]
            }
        ]
    }"#;

    #[test]
    fn parses_catalog_and_flattens_targets() {
        let catalog: SeedCatalog = serde_json::from_str(CATALOG_JSON).expect("parse");
        assert_eq!(catalog.exam_code, "ASSOC_DEV_PY");
        assert_eq!(catalog.url_count(), 3);

        // Duplicate URL across domains is ingested once, under the first domain.
        let targets = catalog.targets();
        assert_eq!(targets.len(), 2);
        let first = targets[0].seed.as_ref().expect("seed meta");
        assert_eq!(first.exam_code.as_deref(), Some("ASSOC_DEV_PY"));
        assert_eq!(first.domain_id, Some(1));
        assert_eq!(first.seed_id.as_deref(), Some("document-model"));
        assert_eq!(targets[1].seed.as_ref().unwrap().domain_id, Some(2));
    }

    #[test]
    fn load_rejects_missing_file_and_empty_domains() {
        let missing = Path::new("/nonexistent/catalog.json");
        assert!(SeedCatalog::load(missing).is_err());

        let dir = std::env::temp_dir().join(format!("certcorpus-catalog-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("empty.json");
        std::fs::write(&path, r#"{"exam_code": "X", "domains": []}"#).unwrap();
        let err = SeedCatalog::load(&path).unwrap_err();
        assert!(err.to_string().contains("no domains"));
        let _ = std::fs::remove_dir_all(dir);
    }
}
