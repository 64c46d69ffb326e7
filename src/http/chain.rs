//! Middleware chain assembly.
//!
//! # Responsibilities
//! - Decide which cross-cutting stages run and in which order
//! - Freeze that order once at boot
//!
//! # Design Decisions
//! - Index 0 is the outermost stage (sees the request first)
//! - CORS is inserted before everything so preflights never hit a redirect
//! - Request-id tagging follows CORS so every logged line carries the id

use serde::Serialize;

use crate::config::PolicySnapshot;

/// One request-processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MiddlewareStage {
    Cors,
    RequestId,
    RequestLogging,
    SslRedirect,
    ExceptionRouting,
    Timeout,
}

/// Ordered, immutable list of stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiddlewareChain {
    stages: Vec<MiddlewareStage>,
}

impl MiddlewareChain {
    pub fn assemble(policy: &PolicySnapshot) -> Self {
        let mut stages = vec![MiddlewareStage::RequestLogging];
        if policy.ssl.force_ssl {
            stages.push(MiddlewareStage::SslRedirect);
        }
        stages.push(MiddlewareStage::ExceptionRouting);
        stages.push(MiddlewareStage::Timeout);

        let mut chain = Self { stages };
        chain.insert_before(0, MiddlewareStage::Cors);
        chain.insert_after(MiddlewareStage::Cors, MiddlewareStage::RequestId);
        chain
    }

    pub fn stages(&self) -> &[MiddlewareStage] {
        &self.stages
    }

    pub fn position(&self, stage: MiddlewareStage) -> Option<usize> {
        self.stages.iter().position(|s| *s == stage)
    }

    pub fn contains(&self, stage: MiddlewareStage) -> bool {
        self.position(stage).is_some()
    }

    fn insert_before(&mut self, index: usize, stage: MiddlewareStage) {
        self.stages.insert(index.min(self.stages.len()), stage);
    }

    fn insert_after(&mut self, anchor: MiddlewareStage, stage: MiddlewareStage) {
        let index = self.position(anchor).map_or(self.stages.len(), |i| i + 1);
        self.stages.insert(index, stage);
    }
}

#[cfg(test)]
mod tests {
    use super::MiddlewareStage::*;
    use super::*;
    use crate::config::{load, EnvVars, Environment};

    #[test]
    fn production_order() {
        let policy = load(Environment::Production, &EnvVars::default()).unwrap();
        let chain = MiddlewareChain::assemble(&policy);
        assert_eq!(
            chain.stages(),
            &[Cors, RequestId, RequestLogging, SslRedirect, ExceptionRouting, Timeout]
        );
    }

    #[test]
    fn ssl_stage_only_when_forced() {
        for env in [Environment::Development, Environment::Test] {
            let policy = load(env, &EnvVars::default()).unwrap();
            let chain = MiddlewareChain::assemble(&policy);
            assert!(!chain.contains(SslRedirect));
            assert_eq!(chain.position(Cors), Some(0));
            assert_eq!(chain.position(RequestId), Some(1));
        }
    }
}
