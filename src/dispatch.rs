//! Named limiter dispatch.
//!
//! A [`Dispatcher`] maps route names to limiters and turns a limiter's
//! boolean answer into a [`Decision`]. It is an ordinary owned value; nothing
//! here is global.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, trace};

use crate::error::{RatekeeperError, Result};
use crate::ratelimit::{Algorithm, Limiter, LimiterSpec};

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admitted,
    Rejected,
}

impl Decision {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Decision::Admitted)
    }
}

impl From<bool> for Decision {
    fn from(admitted: bool) -> Self {
        if admitted {
            Decision::Admitted
        } else {
            Decision::Rejected
        }
    }
}

/// Routes admission checks to limiters by name.
#[derive(Default)]
pub struct Dispatcher {
    limiters: BTreeMap<String, Arc<dyn Limiter>>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build every limiter in `specs` and register it under its name.
    ///
    /// Leaky buckets and fixed windows start their background tasks here, so
    /// this must run inside a tokio runtime when the specs include them.
    pub fn from_specs(specs: &[LimiterSpec]) -> Result<Self> {
        let mut dispatcher = Self::new();
        for spec in specs {
            let limiter = spec.settings.build()?;
            dispatcher.register(spec.name.clone(), limiter)?;
        }

        info!(limiters = dispatcher.len(), "Dispatcher ready");
        Ok(dispatcher)
    }

    /// Register a limiter. Names must be unique.
    pub fn register(&mut self, name: impl Into<String>, limiter: Arc<dyn Limiter>) -> Result<()> {
        let name = name.into();
        if self.limiters.contains_key(&name) {
            return Err(RatekeeperError::DuplicateLimiter(name));
        }

        debug!(
            name = %name,
            algorithm = %limiter.algorithm(),
            "Registered limiter"
        );
        self.limiters.insert(name, limiter);
        Ok(())
    }

    /// Run the admission check of the limiter registered under `name`.
    ///
    /// For a leaky bucket this waits until the caller is served.
    pub async fn check(&self, name: &str) -> Result<Decision> {
        let limiter = self
            .limiters
            .get(name)
            .ok_or_else(|| RatekeeperError::UnknownLimiter(name.to_string()))?;

        let decision = Decision::from(limiter.allow().await);
        trace!(name = %name, decision = ?decision, "Admission decision");
        Ok(decision)
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Limiter>> {
        self.limiters.get(name)
    }

    /// Registered names with their algorithms, sorted by name.
    pub fn entries(&self) -> impl Iterator<Item = (&str, Algorithm)> {
        self.limiters
            .iter()
            .map(|(name, limiter)| (name.as_str(), limiter.algorithm()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.limiters.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}
