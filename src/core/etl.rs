use crate::core::Pipeline;
use crate::utils::error::Result;
use std::time::Instant;

pub struct EtlEngine<P: Pipeline> {
    pipeline: P,
}

impl<P: Pipeline> EtlEngine<P> {
    pub fn new(pipeline: P) -> Self {
        Self { pipeline }
    }

    pub async fn run(&self) -> Result<String> {
        let started = Instant::now();
        tracing::info!("🚀 Starting import");

        // Extract
        let table = self.pipeline.extract().await?;
        tracing::info!(
            "📥 Extracted {} rows across {} columns",
            table.rows.len(),
            table.headers.len()
        );

        // Transform
        let result = self.pipeline.transform(table).await?;
        tracing::info!(
            "🔄 Cleaned {} rows for {} selected columns",
            result.records.len(),
            result.columns.len()
        );

        // Load
        let output_path = self.pipeline.load(result).await?;
        tracing::info!(
            "💾 Output saved to {} in {:.2?}",
            output_path,
            started.elapsed()
        );

        Ok(output_path)
    }
}
