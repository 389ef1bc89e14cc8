use crate::config::toml_config::{LoadConfig, MapperConfig};
use crate::core::export;
use crate::core::extract::Extractor;
use crate::core::resolve::Resolver;
use crate::domain::model::{FilingReference, RawPair};
use crate::domain::ports::{DocumentFetcher, ExtractOutput, Pipeline, ResolveOutput, RunReport, Storage};
use crate::utils::error::{MappingError, Result};
use std::sync::Arc;
use tokio::task::JoinSet;

/// Fetches each filing, extracts its pairs, resolves the whole set and
/// writes the archive through `storage`.
pub struct MappingPipeline<S: Storage, F: DocumentFetcher + 'static> {
    storage: S,
    fetcher: Arc<F>,
    references: Vec<FilingReference>,
    extractor: Arc<Extractor>,
    resolver: Resolver,
    concurrency: usize,
    load: LoadConfig,
}

impl<S: Storage, F: DocumentFetcher + 'static> MappingPipeline<S, F> {
    pub fn new(
        storage: S,
        fetcher: F,
        references: Vec<FilingReference>,
        config: &MapperConfig,
    ) -> Result<Self> {
        Ok(Self {
            storage,
            fetcher: Arc::new(fetcher),
            references,
            extractor: Arc::new(Extractor::new(&config.extract.rules)?),
            resolver: Resolver::new(config.resolve.clone()),
            concurrency: config.concurrent_documents().max(1),
            load: config.load.clone(),
        })
    }

    pub fn references(&self) -> &[FilingReference] {
        &self.references
    }
}

/// Per-document worker. Document level failures are counted, never returned.
async fn process_document<F: DocumentFetcher + 'static>(
    fetcher: Arc<F>,
    extractor: Arc<Extractor>,
    reference: FilingReference,
) -> Result<(Vec<RawPair>, RunReport)> {
    let mut report = RunReport {
        documents: 1,
        ..RunReport::default()
    };

    let bytes = match fetcher.fetch(&reference).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("⚠️ Skipping {}: {}", reference.locator, e);
            report.fetch_failures += 1;
            return Ok((Vec::new(), report));
        }
    };

    let locator = reference.locator.clone();
    let extraction =
        tokio::task::spawn_blocking(move || extractor.extract_document(&bytes, &reference)).await?;

    match extraction {
        Ok(extraction) => {
            if extraction.captions == 0 {
                report.without_caption += 1;
            }
            if extraction.ambiguous > 0 {
                tracing::debug!(
                    "{} caption(s) in {} without a CUSIP value",
                    extraction.ambiguous,
                    locator
                );
                report.ambiguous_captions += 1;
            }
            if !extraction.pairs.is_empty() {
                report.with_pairs += 1;
            }
            Ok((extraction.pairs, report))
        }
        Err(e @ MappingError::MalformedDocument { .. }) => {
            tracing::warn!("⚠️ {}", e);
            report.malformed += 1;
            Ok((Vec::new(), report))
        }
        Err(e) => Err(e),
    }
}

#[async_trait::async_trait]
impl<S: Storage, F: DocumentFetcher + 'static> Pipeline for MappingPipeline<S, F> {
    async fn extract(&self) -> Result<ExtractOutput> {
        tracing::debug!(
            "Extracting {} documents with {} workers",
            self.references.len(),
            self.concurrency
        );

        let mut output = ExtractOutput::default();
        let mut tasks = JoinSet::new();

        for reference in self.references.iter().cloned() {
            if tasks.len() >= self.concurrency {
                if let Some(joined) = tasks.join_next().await {
                    let (pairs, report) = joined??;
                    output.pairs.extend(pairs);
                    output.report.merge(&report);
                }
            }
            tasks.spawn(process_document(
                Arc::clone(&self.fetcher),
                Arc::clone(&self.extractor),
                reference,
            ));
        }

        while let Some(joined) = tasks.join_next().await {
            let (pairs, report) = joined??;
            output.pairs.extend(pairs);
            output.report.merge(&report);
        }

        Ok(output)
    }

    async fn transform(&self, data: ExtractOutput) -> Result<ResolveOutput> {
        let mappings = self.resolver.resolve(&data.pairs)?;
        Ok(ResolveOutput {
            mappings,
            raw_pairs: data.pairs,
            report: data.report,
        })
    }

    async fn load(&self, result: ResolveOutput) -> Result<String> {
        let output_path = format!("{}/{}", self.load.output_path, self.load.archive_name);

        let zip_data = export::build_archive(&result, &self.load)?;

        // The archive is byte-stable, so an unchanged corpus leaves the previous file alone.
        if let Ok(previous) = self.storage.read_file(&self.load.archive_name).await {
            if previous == zip_data {
                tracing::info!("💾 {} is unchanged, not rewriting it", output_path);
                return Ok(output_path);
            }
        }

        tracing::debug!("Writing ZIP file ({} bytes) to storage", zip_data.len());
        self.storage
            .write_file(&self.load.archive_name, &zip_data)
            .await?;

        Ok(output_path)
    }
}
