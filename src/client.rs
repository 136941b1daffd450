//! Query execution seam between workloads and a graph database.

use async_trait::async_trait;

/// Runs rendered queries against a graph database.
#[async_trait]
pub trait QueryClient: Send + Sync + 'static {
    /// Run `query` and drain its result; returns the number of rows read.
    async fn execute(&self, query: &str) -> anyhow::Result<usize>;

    /// Run `query` and read one id path per row from the list column `column`.
    ///
    /// Rows whose list is empty are skipped.
    async fn fetch_id_paths(&self, query: &str, column: &str) -> anyhow::Result<Vec<Vec<String>>>;
}
