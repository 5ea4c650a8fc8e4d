//! Wires configuration, credentials and one client per backend service.

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use futures::future::join_all;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::{
  ApiClient, ApiError, CredentialProvider, Endpoint, Params, ReqwestTransport, Transport,
};
use crate::config::{Config, ServiceName};
use crate::db::{layered_provider, CredentialStore};
use crate::services::{
  DeliverableService, DisputeService, MediaService, NotificationService, PaymentService,
  SocialService,
};

/// Overrides any stored credential when set.
pub const TOKEN_ENV: &str = "NILBX_AUTH_TOKEN";

const HEALTH: Endpoint = Endpoint::get("health", "/health").public();

/// Result of probing one service.
#[derive(Debug)]
pub struct HealthReport {
  pub service: ServiceName,
  pub url: String,
  pub outcome: Result<(), ApiError>,
}

impl HealthReport {
  pub fn is_healthy(&self) -> bool {
    self.outcome.is_ok()
  }
}

/// All service clients sharing one transport and credential source.
pub struct App<T: Transport = ReqwestTransport> {
  pub payments: PaymentService<T>,
  pub deliverables: DeliverableService<T>,
  pub disputes: DisputeService<T>,
  pub social: SocialService<T>,
  pub notifications: Arc<NotificationService<T>>,
  pub media: MediaService<T>,
  store: Option<Arc<CredentialStore>>,
  token_key: String,
}

impl App<ReqwestTransport> {
  /// Build the production stack: reqwest transport plus env/store credentials.
  pub fn new(config: &Config) -> Result<Self> {
    let mut builder = ReqwestTransport::builder().timeout(config.http.timeout());
    if let Some(agent) = &config.http.user_agent {
      builder = builder.user_agent(agent.clone());
    }
    let transport = Arc::new(builder.build()?);

    let store = open_store(config);
    let credentials = layered_provider(
      std::env::var(TOKEN_ENV).ok(),
      store.clone(),
      &config.auth.storage_key,
    );

    let mut app = Self::with_transport(config, transport, credentials)?;
    app.store = store;
    Ok(app)
  }
}

impl<T: Transport> App<T> {
  pub fn with_transport(
    config: &Config,
    transport: Arc<T>,
    credentials: CredentialProvider,
  ) -> Result<Self> {
    let client = |name: ServiceName| -> Result<ApiClient<T>> {
      let client = ApiClient::builder(&config.services.get(name).url, Arc::clone(&transport))
        .cache_ttl(config.cache_ttl(name))
        .credentials(Arc::clone(&credentials))
        .build()
        .map_err(|e| eyre!("Failed to configure {} client: {}", name.as_str(), e))?;
      Ok(client)
    };

    Ok(Self {
      payments: PaymentService::new(client(ServiceName::Payments)?),
      deliverables: DeliverableService::new(client(ServiceName::Deliverables)?),
      disputes: DisputeService::new(client(ServiceName::Disputes)?),
      social: SocialService::new(client(ServiceName::Social)?),
      notifications: Arc::new(NotificationService::new(client(ServiceName::Notifications)?)),
      media: MediaService::new(client(ServiceName::Media)?),
      store: None,
      token_key: config.auth.storage_key.clone(),
    })
  }

  fn client(&self, name: ServiceName) -> &ApiClient<T> {
    match name {
      ServiceName::Payments => self.payments.client(),
      ServiceName::Deliverables => self.deliverables.client(),
      ServiceName::Disputes => self.disputes.client(),
      ServiceName::Social => self.social.client(),
      ServiceName::Notifications => self.notifications.client(),
      ServiceName::Media => self.media.client(),
    }
  }

  /// Probe `GET /health` on every service concurrently.
  pub async fn health_check(&self) -> Vec<HealthReport> {
    let probes = ServiceName::ALL.into_iter().map(|name| async move {
      let client = self.client(name);
      let outcome = client
        .request::<Value>(&HEALTH, &Params::new(), None)
        .await
        .map(|_| ());
      HealthReport {
        service: name,
        url: client.base_url().to_string(),
        outcome,
      }
    });
    join_all(probes).await
  }

  /// Store a new credential and drop every cached response.
  pub fn login(&self, token: &str) -> Result<()> {
    if token.trim().is_empty() {
      return Err(eyre!("Token must not be empty"));
    }
    self.require_store()?.set(&self.token_key, token.trim())?;
    self.clear_caches();
    info!("Stored credential under '{}'", self.token_key);
    Ok(())
  }

  /// Remove the stored credential. Returns whether one existed.
  pub fn logout(&self) -> Result<bool> {
    let removed = self.require_store()?.remove(&self.token_key)?;
    self.clear_caches();
    Ok(removed)
  }

  pub fn clear_caches(&self) {
    for name in ServiceName::ALL {
      self.client(name).invalidate(None);
    }
  }

  fn require_store(&self) -> Result<&CredentialStore> {
    self
      .store
      .as_deref()
      .ok_or_else(|| eyre!("Credential store is not available"))
  }

  #[cfg(test)]
  fn with_store(mut self, store: Arc<CredentialStore>) -> Self {
    self.store = Some(store);
    self
  }
}

fn open_store(config: &Config) -> Option<Arc<CredentialStore>> {
  let opened = match &config.auth.store_path {
    Some(path) => CredentialStore::open_at(path),
    None => CredentialStore::open(),
  };
  match opened {
    Ok(store) => Some(Arc::new(store)),
    Err(err) => {
      warn!(error = %err, "credential store unavailable, continuing without it");
      None
    }
  }
}
