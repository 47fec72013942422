//! Policy and permission ingestion into the per-package policy documents.

use std::path::{Path, PathBuf};

use hcpp_core::capability::extract_requested;
use hcpp_core::segment::{DEFAULT_MAX_WORDS, segment_policy};
use hcpp_core::{PolicyDocument, fields};
use hcpp_store::{Collection, DocumentStore, Filter};
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::AiError;
use crate::ocr::OcrEngine;

#[derive(Debug, Clone)]
pub struct PolicyIngestConfig {
    pub collection: String,
    /// `<package>.txt` policy texts.
    pub txt_dir: PathBuf,
    /// `<package>/pp_<n>.png` policy screenshots.
    pub png_dir: PathBuf,
    /// `<package>/*.png` permission-dialog screenshots.
    pub permission_dir: PathBuf,
    pub max_words: usize,
}

impl PolicyIngestConfig {
    /// Default layout under one data directory.
    pub fn under(root: &Path, collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            txt_dir: root.join("pp_txt"),
            png_dir: root.join("pp_png"),
            permission_dir: root.join("permission_png"),
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub processed: usize,
    pub skipped: usize,
    /// Images the OCR engine failed on.
    pub ocr_failures: usize,
    /// Packages with screenshots but no policy document to update.
    pub missing_documents: usize,
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, AiError> {
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(AiError::io(dir))? {
        paths.push(entry.map_err(AiError::io(dir))?.path());
    }
    paths.sort();
    Ok(paths)
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn has_segments(docs: &Collection<'_, PolicyDocument>, package: &str) -> Result<bool, AiError> {
    Ok(docs.exists(
        &Filter::eq(fields::PACKAGE, package).and(Filter::non_empty_array(fields::PP_SEGMENTS)),
    )?)
}

/// Split every `<package>.txt` policy into line-aligned segments and store them.
pub fn segment_policies(store: &dyn DocumentStore, config: &PolicyIngestConfig) -> Result<IngestStats, AiError> {
    let docs: Collection<'_, PolicyDocument> = Collection::new(store, &config.collection);
    let mut stats = IngestStats::default();
    info!(dir = %config.txt_dir.display(), "segmenting policy texts");

    for path in sorted_entries(&config.txt_dir)? {
        let Some(package) = file_name(&path).and_then(|n| n.strip_suffix(".txt")) else {
            continue;
        };
        if has_segments(&docs, package)? {
            info!(package, "skip, policy already segmented");
            stats.skipped += 1;
            continue;
        }
        let text = std::fs::read_to_string(&path).map_err(AiError::io(&path))?;
        let segments = segment_policy(&text, config.max_words);
        info!(package, segments = segments.len(), "stored segmented policy");
        docs.insert(&PolicyDocument::with_segments(package, segments))?;
        stats.processed += 1;
    }
    Ok(stats)
}

/// Numeric page index of a `pp_<n>.png` screenshot.
fn page_number(name: &str) -> Option<u32> {
    name.strip_prefix("pp_")?.strip_suffix(".png")?.parse().ok()
}

/// OCR each package's policy screenshots, one segment per page.
///
/// A page the engine fails on becomes an empty segment.
pub async fn ocr_policies(
    store: &dyn DocumentStore,
    ocr: &dyn OcrEngine,
    config: &PolicyIngestConfig,
) -> Result<IngestStats, AiError> {
    let docs: Collection<'_, PolicyDocument> = Collection::new(store, &config.collection);
    let mut stats = IngestStats::default();
    info!(dir = %config.png_dir.display(), "transcribing policy screenshots");

    for dir in sorted_entries(&config.png_dir)? {
        if !dir.is_dir() {
            continue;
        }
        let Some(package) = file_name(&dir) else {
            continue;
        };
        if has_segments(&docs, package)? {
            stats.skipped += 1;
            continue;
        }

        let mut pages: Vec<(u32, PathBuf)> = sorted_entries(&dir)?
            .into_iter()
            .filter_map(|p| Some((page_number(file_name(&p)?)?, p)))
            .collect();
        pages.sort_by_key(|(n, _)| *n);

        let mut segments = Vec::with_capacity(pages.len());
        for (_, image) in &pages {
            match ocr.read_text(image, true).await {
                Ok(lines) => segments.push(lines.join("\n").trim().to_string()),
                Err(e) => {
                    error!(image = %image.display(), error = %e, "OCR failed");
                    stats.ocr_failures += 1;
                    segments.push(String::new());
                }
            }
        }
        docs.insert(&PolicyDocument::with_segments(package, segments))?;
        info!(package, pages = pages.len(), "inserted OCR policy");
        stats.processed += 1;
    }
    Ok(stats)
}

/// OCR each package's permission dialogs and record the requested capabilities
/// on its existing policy document.
pub async fn ocr_permissions(
    store: &dyn DocumentStore,
    ocr: &dyn OcrEngine,
    config: &PolicyIngestConfig,
) -> Result<IngestStats, AiError> {
    let docs: Collection<'_, PolicyDocument> = Collection::new(store, &config.collection);
    let mut stats = IngestStats::default();
    info!(dir = %config.permission_dir.display(), "transcribing permission screenshots");

    for (idx, dir) in sorted_entries(&config.permission_dir)?.into_iter().enumerate() {
        if !dir.is_dir() {
            continue;
        }
        let Some(package) = file_name(&dir) else {
            continue;
        };
        let Some((id, doc)) = docs.find_one(&Filter::eq(fields::PACKAGE, package))? else {
            warn!(n = idx + 1, package, "no policy document to attach permissions to");
            stats.missing_documents += 1;
            continue;
        };
        if doc.has_permissions() {
            info!(n = idx + 1, package, "skip, permissions already extracted");
            stats.skipped += 1;
            continue;
        }

        let mut pages = Vec::new();
        for image in sorted_entries(&dir)? {
            let is_png = file_name(&image).is_some_and(|n| n.to_ascii_lowercase().ends_with(".png"));
            if !is_png {
                continue;
            }
            match ocr.read_text(&image, false).await {
                Ok(lines) => pages.push(lines.join("\n")),
                Err(e) => {
                    error!(image = %image.display(), error = %e, "OCR failed");
                    stats.ocr_failures += 1;
                }
            }
        }

        let requested = extract_requested(&pages.join("\n"));
        let mut set = hcpp_store::Document::new();
        set.insert(fields::REQUESTED_PERMISSIONS.into(), json!(requested));
        docs.set_fields(id, set)?;
        info!(package, permissions = ?requested, "stored requested permissions");
        stats.processed += 1;
    }
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OcrError;
    use async_trait::async_trait;
    use hcpp_store::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Returns canned lines per image file name; unknown names fail.
    struct CannedOcr {
        pages: HashMap<&'static str, Vec<&'static str>>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl OcrEngine for CannedOcr {
        async fn read_text(&self, image: &Path, _paragraph: bool) -> Result<Vec<String>, OcrError> {
            let name = image.file_name().unwrap().to_str().unwrap().to_string();
            self.seen.lock().unwrap().push(name.clone());
            match self.pages.get(name.as_str()) {
                Some(lines) => Ok(lines.iter().map(|l| l.to_string()).collect()),
                None => Err(OcrError::Failed {
                    path: image.to_path_buf(),
                    status: 1,
                    stderr: "unreadable".into(),
                }),
            }
        }
    }

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"").unwrap();
    }

    fn config(tmp: &TempDir) -> PolicyIngestConfig {
        let cfg = PolicyIngestConfig::under(tmp.path(), "RQ3");
        std::fs::create_dir_all(&cfg.txt_dir).unwrap();
        std::fs::create_dir_all(&cfg.png_dir).unwrap();
        std::fs::create_dir_all(&cfg.permission_dir).unwrap();
        cfg
    }

    #[test]
    fn segments_text_policies_once() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        std::fs::write(cfg.txt_dir.join("com.a.txt"), "We collect steps.\nWe never sell data.").unwrap();
        std::fs::write(cfg.txt_dir.join("readme.md"), "ignored").unwrap();
        let store = MemoryStore::new();

        let stats = segment_policies(&store, &cfg).unwrap();
        assert_eq!(stats.processed, 1);
        let again = segment_policies(&store, &cfg).unwrap();
        assert_eq!(again.processed, 0);
        assert_eq!(again.skipped, 1);

        let docs: Collection<'_, PolicyDocument> = Collection::new(&store, "RQ3");
        let (_, doc) = docs.find_one(&Filter::All).unwrap().unwrap();
        assert_eq!(doc.package, "com.a");
        assert_eq!(
            doc.pp_segments.unwrap(),
            vec!["We collect steps. We never sell data."]
        );
    }

    #[test]
    fn page_numbers_sort_numerically() {
        assert_eq!(page_number("pp_10.png"), Some(10));
        assert_eq!(page_number("pp_x.png"), None);
        assert_eq!(page_number("shot_1.png"), None);
    }

    #[tokio::test]
    async fn ocr_policies_orders_pages_and_blanks_failures() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        for name in ["pp_10.png", "pp_2.png", "pp_1.png", "cover.png"] {
            touch(&cfg.png_dir.join("com.b").join(name));
        }
        let ocr = CannedOcr {
            pages: HashMap::from([
                ("pp_1.png", vec!["First page", " text "]),
                ("pp_2.png", vec!["Second page"]),
            ]),
            seen: Mutex::new(Vec::new()),
        };
        let store = MemoryStore::new();

        let stats = ocr_policies(&store, &ocr, &cfg).await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.ocr_failures, 1);
        assert_eq!(*ocr.seen.lock().unwrap(), vec!["pp_1.png", "pp_2.png", "pp_10.png"]);

        let docs: Collection<'_, PolicyDocument> = Collection::new(&store, "RQ3");
        let (_, doc) = docs.find_one(&Filter::eq(fields::PACKAGE, "com.b")).unwrap().unwrap();
        assert_eq!(
            doc.pp_segments.unwrap(),
            vec!["First page\n text".to_string(), "Second page".into(), String::new()]
        );
    }

    #[tokio::test]
    async fn permissions_attach_to_existing_documents_only() {
        let tmp = TempDir::new().unwrap();
        let cfg = config(&tmp);
        touch(&cfg.permission_dir.join("com.c").join("1.png"));
        touch(&cfg.permission_dir.join("com.c").join("notes.txt"));
        touch(&cfg.permission_dir.join("com.missing").join("1.png"));

        let store = MemoryStore::new();
        let docs: Collection<'_, PolicyDocument> = Collection::new(&store, "RQ3");
        docs.insert(&PolicyDocument::with_segments("com.c", vec!["text".into()])).unwrap();

        let ocr = CannedOcr {
            pages: HashMap::from([(
                "1.png",
                vec!["Allowed to read", "Steps", "Sleep", "Steps", "12 apps", "Manage app", "Weight"],
            )]),
            seen: Mutex::new(Vec::new()),
        };

        let stats = ocr_permissions(&store, &ocr, &cfg).await.unwrap();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.missing_documents, 1);
        assert_eq!(docs.count(&Filter::All).unwrap(), 1);

        let (_, doc) = docs.find_one(&Filter::eq(fields::PACKAGE, "com.c")).unwrap().unwrap();
        assert_eq!(doc.requested_permissions.unwrap(), vec!["Steps", "Sleep"]);
        assert_eq!(doc.pp_segments.unwrap(), vec!["text"]);

        let again = ocr_permissions(&store, &ocr, &cfg).await.unwrap();
        assert_eq!(again.skipped, 1);
    }
}
