use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;

use crate::jobs::model::Job;
use crate::jobs::store::JobStore;

/// Executes one job type. Handlers own success/failure reporting: call
/// `update_progress` at milestones and exactly one of
/// `complete_job`/`fail_job` before returning, or return an `Err` (the
/// worker records it via `fail_job`).
#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, store: Arc<dyn JobStore>, job: Job) -> Result<()>;
}

/// Map from job-type name to its handler, populated once at startup.
/// The queue itself has no built-in knowledge of any job type.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler; a duplicate job type is a startup error.
    pub fn register(&mut self, job_type: &str, handler: Arc<dyn JobHandler>) -> Result<()> {
        if self.handlers.contains_key(job_type) {
            bail!("handler already registered for job type '{job_type}'");
        }
        self.handlers.insert(job_type.to_string(), handler);
        Ok(())
    }

    pub fn lookup(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }

    pub fn job_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoopHandler;

    #[async_trait]
    impl JobHandler for NoopHandler {
        async fn run(&self, _store: Arc<dyn JobStore>, _job: Job) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry.register("demo", Arc::new(NoopHandler)).unwrap();
        assert!(registry.register("demo", Arc::new(NoopHandler)).is_err());
    }

    #[test]
    fn lookup_unknown_type_returns_none() {
        let registry = HandlerRegistry::new();
        assert!(registry.lookup("ghost").is_none());
    }

    #[test]
    fn job_types_are_sorted() {
        let mut registry = HandlerRegistry::new();
        registry.register("beta", Arc::new(NoopHandler)).unwrap();
        registry.register("alpha", Arc::new(NoopHandler)).unwrap();
        assert_eq!(registry.job_types(), vec!["alpha", "beta"]);
    }
}
