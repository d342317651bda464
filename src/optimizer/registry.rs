//! Registry of every interceptor created by the host, so one commit point can
//! persist all of them at the end of a request.

use super::interceptor::PublishInterceptor;
use crate::error::Result;
use crate::relation::CommitReport;
use std::sync::Arc;
use tracing::debug;

#[derive(Default)]
pub struct TargetRegistry {
    targets: Vec<Arc<PublishInterceptor>>,
}

impl TargetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, target: Arc<PublishInterceptor>) {
        debug!("Registered optimizing target {}", target_name(&target));
        self.targets.push(target);
    }

    pub fn registered(&self) -> &[Arc<PublishInterceptor>] {
        &self.targets
    }

    pub fn get(&self, name: &str) -> Option<Arc<PublishInterceptor>> {
        self.targets
            .iter()
            .find(|target| target_name(target) == name)
            .cloned()
    }

    /// Persist every registered target in registration order, stopping at the first failure
    pub async fn persist_all(&self) -> Result<Vec<CommitReport>> {
        let mut reports = Vec::with_capacity(self.targets.len());
        for target in &self.targets {
            reports.push(target.persist().await?);
        }
        Ok(reports)
    }
}

fn target_name(target: &PublishInterceptor) -> &str {
    crate::target::Publishable::name(target)
}
