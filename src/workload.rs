//! Graph query workload: sample an id chain, render the template, run it.

use crate::client::QueryClient;
use async_trait::async_trait;
use loadtest_framework::{Workload, WorkloadError};
use loadtest_sampler::{IdChainSampler, SamplerError};
use loadtest_template::QueryTemplate;
use rand::rngs::StdRng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::info;

/// Query used to load id paths before a run.
#[derive(Debug, Clone)]
pub struct IdSource {
    pub query: String,
    /// List column holding one id path per row.
    pub column: String,
}

/// Runs one templated query per call against ids sampled from the topology.
pub struct GraphQueryWorkload<C> {
    template: QueryTemplate,
    sampler: Arc<IdChainSampler<String>>,
    client: Arc<C>,
    id_source: Option<IdSource>,
    rng: Mutex<StdRng>,
}

impl<C: QueryClient> GraphQueryWorkload<C> {
    pub fn new(
        template: QueryTemplate,
        sampler: Arc<IdChainSampler<String>>,
        client: Arc<C>,
        rng: StdRng,
    ) -> Self {
        Self {
            template,
            sampler,
            client,
            id_source: None,
            rng: Mutex::new(rng),
        }
    }

    /// Load id paths with `source` during pre-processing.
    pub fn with_id_source(mut self, source: IdSource) -> Self {
        self.id_source = Some(source);
        self
    }

    pub fn template(&self) -> &QueryTemplate {
        &self.template
    }

    pub fn sampler(&self) -> &IdChainSampler<String> {
        &self.sampler
    }

    /// Run the id query and add its paths to the sampler.
    pub async fn load_ids(&self, source: &IdSource) -> anyhow::Result<usize> {
        let paths = self
            .client
            .fetch_id_paths(&source.query, &source.column)
            .await?;
        Ok(self.sampler.add_paths(&paths))
    }

    /// Deepest id of a freshly sampled chain.
    pub fn vid(&self) -> Option<String> {
        self.sampler.vid(&mut *self.rng())
    }

    /// Id `depth` hops below the top-level parent of a freshly sampled chain.
    pub fn vid_at(&self, depth: usize) -> Option<String> {
        self.sampler.id_at_depth(&mut *self.rng(), depth)
    }

    /// Render the template against a freshly sampled chain.
    pub fn next_query(&self) -> Result<String, SamplerError> {
        let length = self.template.chain_length_for(self.sampler.depth());
        let chain = self.sampler.sample_chain(&mut *self.rng(), length)?;
        Ok(self.template.render(&chain))
    }

    fn rng(&self) -> MutexGuard<'_, StdRng> {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl<C: QueryClient> Workload for GraphQueryWorkload<C> {
    type Prepared = String;

    fn name(&self) -> &str {
        "graph-query"
    }

    async fn pre_process(&self) -> anyhow::Result<()> {
        if let Some(source) = &self.id_source {
            // warmup and measurement share the sampler; load once
            if !self.sampler.ids_exist() {
                let loaded = self.load_ids(source).await?;
                info!("Loaded {loaded} id paths from the id query");
            }
        }
        if !self.sampler.ids_exist() {
            anyhow::bail!("No ids loaded; provide an id query or id paths");
        }
        info!(
            "Sampler holds {} ids ({} relationships, depth {}); template needs chains of {}",
            self.sampler.id_count(),
            self.sampler.relationship_count(),
            self.sampler.depth(),
            self.template.chain_length_for(self.sampler.depth())
        );
        Ok(())
    }

    async fn pre_call(&self) -> Result<String, WorkloadError> {
        self.next_query()
            .map_err(|e| WorkloadError::Failed(anyhow::Error::new(e)))
    }

    async fn call(&self, query: String) -> Result<(), WorkloadError> {
        self.client.execute(&query).await?;
        Ok(())
    }
}
