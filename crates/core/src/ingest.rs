use crate::chunking::{chunk_text, ChunkingConfig};
use crate::embeddings::Embedder;
use crate::error::IngestError;
use crate::extractor::extract_document_text;
use crate::models::{BulkFailure, DocumentChunk};
use crate::traits::DocumentIndex;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// Outcome of indexing one document. `indexed < chunk_count` means the
/// document is only partially searchable and must be reported as such.
#[derive(Debug)]
pub struct IngestionReport {
    pub document_name: String,
    pub chunk_count: usize,
    pub indexed: usize,
    pub failures: Vec<BulkFailure>,
}

impl IngestionReport {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

pub struct FolderReport {
    pub reports: Vec<IngestionReport>,
    pub skipped_files: Vec<SkippedPdf>,
}

pub fn discover_pdf_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn document_name_for(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))
}

/// Chunks, embeds, and bulk-indexes `text` under `document_name`.
///
/// A name that is already present in the index is rejected before any
/// chunking or embedding work happens.
pub async fn ingest_text<E, S>(
    index: &S,
    embedder: &E,
    document_name: &str,
    text: &str,
    chunking: ChunkingConfig,
) -> Result<IngestionReport, IngestError>
where
    E: Embedder,
    S: DocumentIndex,
{
    index.ensure_index().await.map_err(IngestError::Indexing)?;

    if index
        .document_exists(document_name)
        .await
        .map_err(IngestError::Indexing)?
    {
        return Err(IngestError::DuplicateDocument(document_name.to_string()));
    }

    let chunks = chunk_text(text, chunking)?;
    if chunks.is_empty() {
        return Ok(IngestionReport {
            document_name: document_name.to_string(),
            chunk_count: 0,
            indexed: 0,
            failures: Vec::new(),
        });
    }

    let embeddings = embedder.embed_batch(&chunks).await?;
    let ingested_at = Utc::now();

    let records: Vec<DocumentChunk> = chunks
        .into_iter()
        .zip(embeddings)
        .enumerate()
        .map(|(position, (text, embedding))| DocumentChunk {
            chunk_id: format!("{document_name}_{position}"),
            document_name: document_name.to_string(),
            text,
            embedding,
            ingested_at,
        })
        .collect();

    let chunk_count = records.len();
    let (indexed, failures) = index
        .bulk_index(&records)
        .await
        .map_err(IngestError::Indexing)?;

    if failures.is_empty() {
        info!(document = document_name, chunks = chunk_count, "document indexed");
    } else {
        warn!(
            document = document_name,
            indexed,
            failed = failures.len(),
            "document partially indexed"
        );
    }

    Ok(IngestionReport {
        document_name: document_name.to_string(),
        chunk_count,
        indexed,
        failures,
    })
}

/// Extracts a PDF and indexes it under its file name.
pub async fn ingest_file<E, S>(
    index: &S,
    embedder: &E,
    path: &Path,
    chunking: ChunkingConfig,
) -> Result<IngestionReport, IngestError>
where
    E: Embedder,
    S: DocumentIndex,
{
    let document_name = document_name_for(path)?;
    let text = extract_document_text(path)?;
    ingest_text(index, embedder, &document_name, &text, chunking).await
}

/// Ingests every PDF under `folder` recursively. Per-file failures are
/// collected and skipped rather than aborting the run.
pub async fn ingest_folder<E, S>(
    index: &S,
    embedder: &E,
    folder: &Path,
    chunking: ChunkingConfig,
) -> Result<FolderReport, IngestError>
where
    E: Embedder,
    S: DocumentIndex,
{
    let files = discover_pdf_files(folder);
    if files.is_empty() {
        return Err(IngestError::InvalidParameter(format!(
            "no pdf files found in {}",
            folder.display()
        )));
    }

    let mut reports = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match ingest_file(index, embedder, &path, chunking).await {
            Ok(report) => reports.push(report),
            Err(error) => skipped_files.push(SkippedPdf {
                path,
                reason: error.to_string(),
            }),
        }
    }

    Ok(FolderReport {
        reports,
        skipped_files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EmbedError, SearchError};
    use crate::models::SearchHit;
    use async_trait::async_trait;
    use std::fs::{self, File};
    use std::io::Write;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeEmbedder {
        dimension: usize,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        fn dimensions(&self) -> usize {
            self.dimension
        }

        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbedError> {
            Ok(vec![0.1; self.dimension])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbedError> {
            Ok(texts.iter().map(|_| vec![0.1; self.dimension]).collect())
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        existing: Vec<String>,
        bulk_failures: Vec<BulkFailure>,
        recorded: Mutex<Vec<DocumentChunk>>,
    }

    #[async_trait]
    impl DocumentIndex for FakeIndex {
        async fn ensure_index(&self) -> Result<(), SearchError> {
            Ok(())
        }

        async fn document_exists(&self, document_name: &str) -> Result<bool, SearchError> {
            Ok(self.existing.iter().any(|name| name == document_name))
        }

        async fn list_document_names(&self) -> Result<Vec<String>, SearchError> {
            Ok(self.existing.clone())
        }

        async fn bulk_index(
            &self,
            chunks: &[DocumentChunk],
        ) -> Result<(usize, Vec<BulkFailure>), SearchError> {
            self.recorded.lock().unwrap().extend(chunks.iter().cloned());
            Ok((
                chunks.len() - self.bulk_failures.len(),
                self.bulk_failures.clone(),
            ))
        }

        async fn delete_by_document_name(&self, _document_name: &str) -> Result<(), SearchError> {
            Ok(())
        }

        async fn hybrid_search(
            &self,
            _query_text: &str,
            _query_embedding: &[f32],
            _top_k: usize,
        ) -> Result<Vec<SearchHit>, SearchError> {
            Ok(Vec::new())
        }
    }

    fn thousand_tokens() -> String {
        (0..1000).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ")
    }

    #[tokio::test]
    async fn duplicate_document_names_are_rejected_before_any_work() {
        let index = FakeIndex {
            existing: vec!["manual.pdf".to_string()],
            ..FakeIndex::default()
        };
        let embedder = FakeEmbedder { dimension: 4 };

        let result = ingest_text(
            &index,
            &embedder,
            "manual.pdf",
            "some text",
            ChunkingConfig::default(),
        )
        .await;

        assert!(matches!(result, Err(IngestError::DuplicateDocument(name)) if name == "manual.pdf"));
        assert!(index.recorded.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn chunk_ids_follow_name_and_ordinal() {
        let index = FakeIndex::default();
        let embedder = FakeEmbedder { dimension: 4 };

        let report = ingest_text(
            &index,
            &embedder,
            "manual.pdf",
            &thousand_tokens(),
            ChunkingConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(report.chunk_count, 5);
        assert_eq!(report.indexed, 5);
        assert!(!report.is_partial());

        let recorded = index.recorded.lock().unwrap();
        let ids: Vec<&str> = recorded.iter().map(|chunk| chunk.chunk_id.as_str()).collect();
        assert_eq!(
            ids,
            vec![
                "manual.pdf_0",
                "manual.pdf_1",
                "manual.pdf_2",
                "manual.pdf_3",
                "manual.pdf_4"
            ]
        );
        assert!(recorded.iter().all(|chunk| chunk.document_name == "manual.pdf"));
        assert!(recorded.iter().all(|chunk| chunk.embedding.len() == 4));
    }

    #[tokio::test]
    async fn bulk_failures_mark_the_report_partial() {
        let index = FakeIndex {
            bulk_failures: vec![BulkFailure {
                chunk_id: "manual.pdf_2".to_string(),
                reason: "mapper_parsing_exception".to_string(),
            }],
            ..FakeIndex::default()
        };
        let embedder = FakeEmbedder { dimension: 4 };

        let report = ingest_text(
            &index,
            &embedder,
            "manual.pdf",
            &thousand_tokens(),
            ChunkingConfig::default(),
        )
        .await
        .unwrap();

        assert!(report.is_partial());
        assert_eq!(report.chunk_count, 5);
        assert_eq!(report.indexed, 4);
        assert_eq!(report.failures[0].chunk_id, "manual.pdf_2");
    }

    #[tokio::test]
    async fn empty_documents_index_nothing() {
        let index = FakeIndex::default();
        let embedder = FakeEmbedder { dimension: 4 };

        let report = ingest_text(&index, &embedder, "empty.pdf", "", ChunkingConfig::default())
            .await
            .unwrap();

        assert_eq!(report.chunk_count, 0);
        assert_eq!(report.indexed, 0);
        assert!(!report.is_partial());
    }

    #[test]
    fn discover_pdf_files_is_recursive_and_sorted() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let base = dir.path();
        let nested = base.join("nested");
        fs::create_dir(&nested)?;

        File::create(base.join("b.pdf")).and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(nested.join("a.pdf"))
            .and_then(|mut file| file.write_all(b"%PDF-1.4\n%fake"))?;
        File::create(base.join("notes.txt")).and_then(|mut file| file.write_all(b"plain"))?;

        let files = discover_pdf_files(base);
        assert_eq!(files.len(), 2);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn folder_ingestion_skips_unreadable_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        fs::write(dir.path().join("unreadable.pdf"), b"%PDF-1.4\n%broken")?;

        let index = FakeIndex::default();
        let embedder = FakeEmbedder { dimension: 4 };

        let report = ingest_folder(
            &index,
            &embedder,
            dir.path(),
            ChunkingConfig::default(),
        )
        .await?;

        assert!(report.reports.is_empty());
        assert_eq!(report.skipped_files.len(), 1);
        assert_eq!(
            report.skipped_files[0]
                .path
                .file_name()
                .and_then(|name| name.to_str()),
            Some("unreadable.pdf")
        );
        Ok(())
    }

    #[tokio::test]
    async fn folder_ingestion_fails_without_pdfs() -> Result<(), Box<dyn std::error::Error>> {
        let dir = tempdir()?;
        let index = FakeIndex::default();
        let embedder = FakeEmbedder { dimension: 4 };

        let result = ingest_folder(&index, &embedder, dir.path(), ChunkingConfig::default()).await;
        assert!(matches!(result, Err(IngestError::InvalidParameter(_))));
        Ok(())
    }
}
