//! Rule download and compilation.
//!
//! [`RuleFetcher`] talks to the collector; [`RuleSource`] is the seam the
//! startup loop and the [`RuleUpdater`](crate::processors::RuleUpdater) use so
//! they can be exercised without a network.

use super::RuleSet;
use async_trait::async_trait;
use kanau::processor::Processor;
use pdvstate_sdk::client::{ClientError, CollectorClient};
use thiserror::Error;
use tracing::{debug, info};

/// Errors that can occur while retrieving a rule set or its version.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Transport failure, non-2xx status or an unparsable body.
    #[error("collector request failed: {0}")]
    Client(#[from] ClientError),
}

/// Anything that can report the published rule version and produce a
/// compiled rule set.
#[async_trait]
pub trait RuleSource: Send + Sync {
    /// Version string of the rule set currently published.
    async fn current_version(&self) -> Result<String, FetchError>;

    /// Download and compile the published rule set.
    async fn fetch(&self) -> Result<RuleSet, FetchError>;
}

/// Request for the plaintext rule-set version.
#[derive(Debug, Clone, Copy)]
pub struct FetchRuleVersion;

/// Request for the full rule document, compiled into a [`RuleSet`].
#[derive(Debug, Clone, Copy)]
pub struct FetchRuleSet;

/// Retrieves rule sets from the collector. Holds no shared state.
#[derive(Debug, Clone)]
pub struct RuleFetcher {
    client: CollectorClient,
}

impl RuleFetcher {
    pub fn new(client: CollectorClient) -> Self {
        Self { client }
    }
}

impl Processor<FetchRuleVersion> for RuleFetcher {
    type Output = String;
    type Error = FetchError;
    #[tracing::instrument(skip_all, err, name = "HTTP:FetchRuleVersion")]
    async fn process(&self, _query: FetchRuleVersion) -> Result<String, FetchError> {
        let version = self.client.rules_version().await?;
        debug!(%version, "Fetched published rule version");
        Ok(version)
    }
}

impl Processor<FetchRuleSet> for RuleFetcher {
    type Output = RuleSet;
    type Error = FetchError;
    #[tracing::instrument(skip_all, err, name = "HTTP:FetchRuleSet")]
    async fn process(&self, _query: FetchRuleSet) -> Result<RuleSet, FetchError> {
        let document = self.client.rules().await?;
        let rule_set = RuleSet::compile(document);
        info!(
            version = %rule_set.version,
            channels = rule_set.rules.len(),
            disabled_rules = rule_set.disabled_rules(),
            "Compiled rule set"
        );
        Ok(rule_set)
    }
}

#[async_trait]
impl RuleSource for RuleFetcher {
    async fn current_version(&self) -> Result<String, FetchError> {
        self.process(FetchRuleVersion).await
    }

    async fn fetch(&self) -> Result<RuleSet, FetchError> {
        self.process(FetchRuleSet).await
    }
}
