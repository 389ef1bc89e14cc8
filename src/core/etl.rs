use crate::domain::ports::{Pipeline, RunReport};
use crate::utils::error::Result;
use crate::utils::monitor::RunMonitor;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
    monitor: RunMonitor,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self::new_with_monitoring(pipeline, false)
    }

    pub fn new_with_monitoring(pipeline: P, monitoring: bool) -> Self {
        Self {
            pipeline,
            monitor: RunMonitor::new(monitoring),
        }
    }

    /// Runs extract, transform and load; returns where the archive was written.
    pub async fn run(&self) -> Result<String> {
        tracing::info!("🚀 Starting CIK to CUSIP mapping run");

        let extracted = self.pipeline.extract().await?;
        tracing::info!(
            "📥 Extracted {} pairs from {} documents",
            extracted.pairs.len(),
            extracted.report.documents
        );
        log_report(&extracted.report);
        self.monitor.phase_finished("extract", extracted.pairs.len());

        let resolved = self.pipeline.transform(extracted).await?;
        let conflicted = resolved
            .mappings
            .values()
            .filter(|m| m.has_conflicts())
            .count();
        tracing::info!(
            "🔗 Resolved {} CIKs ({} with conflicting history)",
            resolved.mappings.len(),
            conflicted
        );
        self.monitor.phase_finished("transform", resolved.mappings.len());

        let output_path = self.pipeline.load(resolved).await?;
        tracing::info!("💾 Output saved to: {}", output_path);
        self.monitor.phase_finished("load", 1);

        self.monitor.log_final_stats();
        Ok(output_path)
    }
}

fn log_report(report: &RunReport) {
    tracing::info!(
        "📄 Documents: {} with pairs, {} without a CUSIP caption, {} with ambiguous captions",
        report.with_pairs,
        report.without_caption,
        report.ambiguous_captions
    );
    if report.malformed > 0 || report.fetch_failures > 0 {
        tracing::warn!(
            "⚠️ Skipped {} malformed documents and {} failed fetches",
            report.malformed,
            report.fetch_failures
        );
    }
}
