//! Full runs of the graph query workload against in-memory clients.

use async_trait::async_trait;
use graph_loadtest::{GraphQueryWorkload, IdSource, QueryClient};
use loadtest_framework::{NoopSink, Phase, WorkloadConfig, WorkloadRunner, WorkloadStatus};
use loadtest_sampler::{IdChainSampler, SamplerConfig, SamplingStrategy};
use loadtest_template::QueryTemplate;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Serves fixed id paths and records every executed query.
#[derive(Default)]
struct MemoryClient {
    paths: Vec<Vec<String>>,
    executed: Mutex<Vec<String>>,
    fail: bool,
}

impl MemoryClient {
    fn with_paths(paths: &[&[&str]]) -> Self {
        Self {
            paths: paths
                .iter()
                .map(|path| path.iter().map(|id| id.to_string()).collect())
                .collect(),
            ..Default::default()
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueryClient for MemoryClient {
    async fn execute(&self, query: &str) -> anyhow::Result<usize> {
        self.executed.lock().unwrap().push(query.to_string());
        if self.fail {
            anyhow::bail!("Neo.ClientError.Statement.SyntaxError");
        }
        Ok(1)
    }

    async fn fetch_id_paths(
        &self,
        _query: &str,
        _column: &str,
    ) -> anyhow::Result<Vec<Vec<String>>> {
        Ok(self.paths.clone())
    }
}

fn build_runner(
    template: &str,
    client: Arc<MemoryClient>,
    config: WorkloadConfig,
) -> WorkloadRunner<GraphQueryWorkload<MemoryClient>> {
    let sampler_config = SamplerConfig::default()
        .with_strategy(SamplingStrategy::Fixed)
        .with_seed(42);
    let workload = GraphQueryWorkload::new(
        QueryTemplate::compile(template).unwrap(),
        Arc::new(IdChainSampler::new(sampler_config.clone())),
        client,
        sampler_config.rng(),
    )
    .with_id_source(IdSource {
        query: "MATCH p = (a)-[:KNOWS*2]->() RETURN [n IN nodes(p) | id(n)] AS ids".to_string(),
        column: "ids".to_string(),
    });
    WorkloadRunner::new(config, Arc::new(workload), Arc::new(NoopSink))
}

fn short_config(qps: f64, duration: Duration) -> WorkloadConfig {
    WorkloadConfig::new(qps, duration)
        .with_check_interval(Duration::from_millis(50))
        .with_shutdown_timeout(Duration::from_secs(1))
}

#[tokio::test]
async fn test_measurement_runs_queries_rendered_from_loaded_ids() {
    let client = Arc::new(MemoryClient::with_paths(&[&["1", "2", "3"]]));
    let runner = build_runner(
        "MATCH (a)-->(b) WHERE id(a) = %1$s AND id(b) = %2$s RETURN b",
        Arc::clone(&client),
        short_config(50.0, Duration::from_millis(500)),
    );

    let report = runner.run().await.unwrap();
    assert!(report.passed());
    assert!(report.warmup.is_none());

    let summary = report.measurement.unwrap();
    assert_eq!(summary.phase, Phase::Measurement);
    assert_eq!(summary.status, WorkloadStatus::Completed);
    assert_eq!(summary.workload, "graph-query");
    assert_eq!(summary.metrics.errors, 0);
    assert!(summary.metrics.success > 0);

    let executed = client.executed();
    assert_eq!(executed.len() as u64, summary.metrics.success);
    assert!(executed
        .iter()
        .all(|q| q == "MATCH (a)-->(b) WHERE id(a) = 1 AND id(b) = 2 RETURN b"));
}

#[tokio::test]
async fn test_warmup_then_measurement_share_loaded_ids() {
    let client = Arc::new(MemoryClient::with_paths(&[&["7", "8"], &["7", "9"]]));
    let config =
        short_config(40.0, Duration::from_millis(300)).with_warmup(Duration::from_millis(200));
    let runner = build_runner("g.V(%s).out().hasId(%-1$s)", Arc::clone(&client), config);

    let report = runner.run().await.unwrap();
    assert!(report.passed());
    let phases: Vec<Phase> = report.summaries().map(|s| s.phase).collect();
    assert_eq!(phases, vec![Phase::Warmup, Phase::Measurement]);
    assert!(report
        .summaries()
        .all(|s| s.status == WorkloadStatus::Completed));

    let executed = client.executed();
    assert!(!executed.is_empty());
    assert!(executed.iter().all(|q| q == "g.V(7).out().hasId(8)"));
}

#[tokio::test]
async fn test_depth_up_placeholders_read_the_bottom_of_loaded_paths() {
    let client = Arc::new(MemoryClient::with_paths(&[&["1", "2", "3", "4"]]));
    let runner = build_runner(
        "MATCH (a)-->(b) WHERE id(a) = %-2$s AND id(b) = %-1$s RETURN b",
        Arc::clone(&client),
        short_config(50.0, Duration::from_millis(300)),
    );

    let report = runner.run().await.unwrap();
    assert!(report.passed());

    let executed = client.executed();
    assert!(!executed.is_empty());
    assert!(executed
        .iter()
        .all(|q| q == "MATCH (a)-->(b) WHERE id(a) = 3 AND id(b) = 4 RETURN b"));
}

#[tokio::test]
async fn test_failing_queries_abort_on_error_threshold() {
    let client = Arc::new(MemoryClient::with_paths(&[&["1", "2"]]).failing());
    let config = short_config(200.0, Duration::from_secs(10)).with_error_abort_threshold(5);
    let runner = build_runner("g.V(%s)", Arc::clone(&client), config);

    let report = runner.run().await.unwrap();
    assert!(!report.passed());
    assert_eq!(report.final_status(), Some(WorkloadStatus::Aborted));

    let summary = report.measurement.unwrap();
    assert!(summary.is_aborted());
    assert!(summary.metrics.errors > 5);
    assert!(summary.abort_reason.is_some());
    assert!(summary
        .errors
        .iter()
        .any(|e| e.contains("Neo.ClientError.Statement.SyntaxError")));
    assert!(summary.metrics.elapsed_secs < 10.0);
}

#[tokio::test]
async fn test_run_without_ids_fails_before_dispatch() {
    let client = Arc::new(MemoryClient::default());
    let runner = build_runner(
        "g.V(%s)",
        Arc::clone(&client),
        short_config(10.0, Duration::from_millis(200)),
    );

    let err = runner.run().await.unwrap_err();
    assert!(err.to_string().contains("No ids loaded"));
    assert!(client.executed().is_empty());
}

#[tokio::test]
async fn test_summary_json_is_written() {
    let client = Arc::new(MemoryClient::with_paths(&[&["1"]]));
    let runner = build_runner("g.V(%s)", client, short_config(20.0, Duration::from_millis(200)));
    let report = runner.run().await.unwrap();
    let summary = report.measurement.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("summary.json");
    summary.write_json(&path).unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(value["workload"], "graph-query");
    assert_eq!(value["status"], "completed");
    assert_eq!(value["metrics"]["errors"], 0);
}
