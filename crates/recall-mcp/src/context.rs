//! Gateway startup context.
//!
//! Roots and settings are resolved once at startup (environment over
//! saved path settings over cwd-relative defaults) and the full recall
//! service is constructed from them. There is no per-call workspace
//! switching; one gateway process serves one store.

use crate::error::{Error, Result};
use recall::paths::Roots;
use recall::settings::Settings;
use recall::Service;
use std::path::Path;
use std::sync::Arc;

/// Environment variable carrying the gateway auth token (only checked
/// when `authentication.enabled` is set; token verification itself is
/// the transport owner's concern).
pub const ENV_AUTH_TOKEN: &str = "RECALL_AUTH_TOKEN";

/// The initialized gateway context.
pub struct Context {
    service: Arc<Service>,
    roots: Roots,
}

impl Context {
    /// Resolve roots and settings from `base`, enforce the auth knob,
    /// and open the service.
    ///
    /// # Errors
    ///
    /// Path validation failures, the missing-token condition, and
    /// store-open failures.
    pub async fn initialize(base: &Path) -> Result<Self> {
        let roots = Roots::resolve(base).map_err(Error::Core)?;
        let settings = Settings::load(&roots.data);

        if settings.authentication.enabled && std::env::var(ENV_AUTH_TOKEN).is_err() {
            return Err(Error::MissingAuthToken(ENV_AUTH_TOKEN));
        }

        let service = Service::open(roots.clone(), settings).await?;
        tracing::info!(
            memories = %roots.memories.display(),
            tasks = %roots.tasks.display(),
            data = %roots.data.display(),
            "recall gateway initialized"
        );

        Ok(Self {
            service: Arc::new(service),
            roots,
        })
    }

    /// The running service.
    #[must_use]
    pub fn service(&self) -> Arc<Service> {
        Arc::clone(&self.service)
    }

    /// The resolved roots.
    #[must_use]
    pub fn roots(&self) -> &Roots {
        &self.roots
    }
}
