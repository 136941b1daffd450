//! Neo4j query client.
//!
//! Wraps a pooled `neo4rs` graph handle behind [`QueryClient`].

use crate::client::QueryClient;
use crate::Neo4jOpts;
use anyhow::{Context, Result};
use async_trait::async_trait;
use neo4rs::{ConfigBuilder, Graph, Query, Row};

/// [`QueryClient`] backed by a Neo4j connection pool.
pub struct Neo4jClient {
    graph: Graph,
}

impl Neo4jClient {
    /// Create a new Neo4j Graph connection and check that it answers.
    pub async fn connect(opts: &Neo4jOpts) -> Result<Self> {
        let config = ConfigBuilder::default()
            .uri(&opts.neo4j_uri)
            .user(opts.neo4j_username.clone())
            .password(opts.neo4j_password.clone())
            .db(opts.neo4j_database.clone())
            .max_connections(opts.neo4j_max_connections)
            .build()?;

        let graph = Graph::connect(config)?;
        let client = Self { graph };
        client
            .execute("RETURN 1")
            .await
            .with_context(|| format!("Failed to connect to Neo4j at {}", opts.neo4j_uri))?;
        tracing::info!("Connected to Neo4j at {}", opts.neo4j_uri);
        Ok(client)
    }
}

#[async_trait]
impl QueryClient for Neo4jClient {
    async fn execute(&self, query: &str) -> Result<usize> {
        let mut result = self.graph.execute(Query::new(query.to_string())).await?;
        let mut rows = 0;
        while result.next().await?.is_some() {
            rows += 1;
        }
        Ok(rows)
    }

    async fn fetch_id_paths(&self, query: &str, column: &str) -> Result<Vec<Vec<String>>> {
        let mut result = self
            .graph
            .execute(Query::new(query.to_string()))
            .await
            .with_context(|| format!("Failed to run id query: {query}"))?;

        let mut paths = Vec::new();
        while let Some(row) = result.next().await? {
            let ids = ids_from_row(&row, column)?;
            if !ids.is_empty() {
                paths.push(ids);
            }
        }

        tracing::debug!("Id query returned {} paths", paths.len());
        Ok(paths)
    }
}

/// Read a list of ids that may be strings (element ids, keys) or integers (`id(n)`).
fn ids_from_row(row: &Row, column: &str) -> Result<Vec<String>> {
    if let Ok(ids) = row.get::<Vec<String>>(column) {
        return Ok(ids);
    }
    let ids: Vec<i64> = row
        .get(column)
        .with_context(|| format!("Column '{column}' is not a list of ids"))?;
    Ok(ids.into_iter().map(|id| id.to_string()).collect())
}
