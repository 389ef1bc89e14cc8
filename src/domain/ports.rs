use crate::domain::model::{CanonicalMapping, Cik, FilingReference, RawPair};
use crate::utils::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

pub trait Storage: Send + Sync {
    fn read_file(&self, path: &str) -> impl std::future::Future<Output = Result<Vec<u8>>> + Send;
    fn write_file(
        &self,
        path: &str,
        data: &[u8],
    ) -> impl std::future::Future<Output = Result<()>> + Send;
}

/// Yields the raw bytes of one filing. Retries and rate limiting are the fetcher's concern.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    async fn fetch(&self, reference: &FilingReference) -> Result<Vec<u8>>;
}

/// Everything the extract phase collected, before reconciliation.
#[derive(Debug, Clone, Default)]
pub struct ExtractOutput {
    pub pairs: Vec<RawPair>,
    pub report: RunReport,
}

/// The resolved mapping handed to the load phase, with the audit trail.
#[derive(Debug, Clone, Default)]
pub struct ResolveOutput {
    pub mappings: BTreeMap<Cik, CanonicalMapping>,
    pub raw_pairs: Vec<RawPair>,
    pub report: RunReport,
}

/// Per-document outcome counters of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunReport {
    pub documents: usize,
    pub with_pairs: usize,
    pub without_caption: usize,
    pub ambiguous_captions: usize,
    pub malformed: usize,
    pub fetch_failures: usize,
}

impl RunReport {
    pub fn merge(&mut self, other: &RunReport) {
        self.documents += other.documents;
        self.with_pairs += other.with_pairs;
        self.without_caption += other.without_caption;
        self.ambiguous_captions += other.ambiguous_captions;
        self.malformed += other.malformed;
        self.fetch_failures += other.fetch_failures;
    }
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn extract(&self) -> Result<ExtractOutput>;
    async fn transform(&self, data: ExtractOutput) -> Result<ResolveOutput>;
    async fn load(&self, result: ResolveOutput) -> Result<String>;
}
