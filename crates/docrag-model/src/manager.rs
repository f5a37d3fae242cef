//! Model session manager.
//!
//! Sessions are cached by task in a bounded LRU cache with an idle TTL.
//! Concurrent first requests for the same task share a single load, and a
//! failed load is reported to every waiter without being cached.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use tracing::{debug, info, warn};

use crate::config::{ModelTask, SessionConfig};
use crate::error::{ModelError, ModelResult};
use crate::registry::ModelRegistry;
use crate::session::{ModelSession, SessionLoader};

pub struct ModelSessionManager {
    registry: Arc<ModelRegistry>,
    loader: Arc<dyn SessionLoader>,
    sessions: Cache<ModelTask, Arc<ModelSession>>,
    load_timeout: Duration,
}

impl std::fmt::Debug for ModelSessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSessionManager")
            .field("resident", &self.sessions.entry_count())
            .field("load_timeout", &self.load_timeout)
            .finish()
    }
}

impl ModelSessionManager {
    pub fn new(
        registry: ModelRegistry,
        loader: Arc<dyn SessionLoader>,
        config: &SessionConfig,
    ) -> Self {
        let sessions = Cache::builder()
            .max_capacity(config.session_capacity)
            .time_to_idle(config.idle_ttl())
            .eviction_policy(EvictionPolicy::lru())
            .eviction_listener(
                |task: Arc<ModelTask>, session: Arc<ModelSession>, cause: RemovalCause| {
                    debug!(task = %task, ?cause, "Evicting model session");
                    session.close();
                },
            )
            .build();

        Self {
            registry: Arc::new(registry),
            loader,
            sessions,
            load_timeout: config.load_timeout(),
        }
    }

    /// Get the session for a task, loading it on first use.
    ///
    /// `name` selects a registry entry; `None` uses the task default. A name
    /// that differs from the resident session replaces it.
    pub async fn try_get_instance(
        &self,
        task: ModelTask,
        name: Option<&str>,
    ) -> ModelResult<Arc<ModelSession>> {
        if let Some(name) = name {
            if let Some(resident) = self.sessions.get(&task).await {
                let descriptor = resident.descriptor();
                if descriptor.name != name && descriptor.model_id != name {
                    info!(
                        task = %task,
                        from = %descriptor.model_id,
                        to = name,
                        "Replacing model session"
                    );
                    self.sessions.invalidate(&task).await;
                }
            }
        }

        let registry = Arc::clone(&self.registry);
        let loader = Arc::clone(&self.loader);
        let name = name.map(str::to_string);
        let timeout = self.load_timeout;

        let init = async move {
            info!(task = %task, "Opening model session");
            let handle = tokio::task::spawn_blocking(move || {
                let descriptor = registry.resolve(task, name.as_deref())?;
                loader.load(&descriptor)
            });

            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(result)) => result.map(Arc::new),
                Ok(Err(join)) => Err(ModelError::SessionUnavailable {
                    task,
                    reason: format!("loader panicked: {join}"),
                }),
                Err(_) => Err(ModelError::LoadTimeout {
                    task,
                    secs: timeout.as_secs(),
                }),
            }
        };

        self.sessions
            .try_get_with(task, init)
            .await
            .map_err(|e| ModelError::SessionUnavailable {
                task,
                reason: e.to_string(),
            })
    }

    /// Like [`Self::try_get_instance`], but absent means "feature unavailable".
    pub async fn get_instance(
        &self,
        task: ModelTask,
        name: Option<&str>,
    ) -> Option<Arc<ModelSession>> {
        match self.try_get_instance(task, name).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!(task = %task, error = %e, "Model session not initialized");
                None
            }
        }
    }

    pub fn contains(&self, task: ModelTask) -> bool {
        self.sessions.contains_key(&task)
    }

    /// Close and drop a resident session.
    pub async fn evict(&self, task: ModelTask) {
        self.sessions.invalidate(&task).await;
    }

    /// Apply pending evictions and expirations now.
    pub async fn run_pending_tasks(&self) {
        self.sessions.run_pending_tasks().await;
    }

    pub fn resident_count(&self) -> u64 {
        self.sessions.entry_count()
    }
}
