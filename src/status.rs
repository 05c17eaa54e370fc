//! Live account health probing.
//!
//! [`AccountStatusProber::refresh`] asks the platform for the current phone
//! and WABA state and folds the answer into the organization's persisted
//! configuration. The persisted copy is a cache: later readers fall back to
//! it when a live probe fails, they never crash on its absence.

use tracing::warn;

use crate::config::{AccountMetadata, ConfigStore};
use crate::error::Error;
use crate::graph::GraphClient;
use crate::OrganizationId;

/// Queries the platform for live account health and normalizes it.
#[derive(Clone)]
pub struct AccountStatusProber<S> {
    graph: GraphClient,
    store: S,
}

impl<S: ConfigStore> AccountStatusProber<S> {
    pub fn new(graph: GraphClient, store: S) -> Self {
        Self { graph, store }
    }

    /// Probes the platform with the organization's stored credentials and
    /// merges the result into the persisted metadata.
    ///
    /// The phone-number read is required: an auth rejection surfaces as
    /// [`Error::CredentialsInvalid`] so the caller can prompt for
    /// reconfiguration rather than "try again". The WABA review read is an
    /// independent probe: if it fails, the last persisted review status is
    /// kept rather than failing the whole refresh.
    pub async fn refresh(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<AccountMetadata, Error> {
        let mut config = self
            .store
            .get(organization_id)
            .await?
            .ok_or_else(|| Error::NotConfigured(organization_id.clone()))?;
        if !config.is_configured() {
            // A partial physical write gates the same as no record.
            return Err(Error::NotConfigured(organization_id.clone()));
        }

        let (metadata, review) = futures::join!(
            self.graph.phone_number_metadata(&config.credentials),
            self.graph.account_review_status(&config.credentials),
        );

        let mut metadata = metadata?;
        metadata.account_review_status = match review {
            Ok(status) => status,
            Err(err) => {
                warn!(
                    organization = %organization_id,
                    "review status probe failed, keeping last persisted value: {err}"
                );
                config.account_metadata.account_review_status
            }
        };

        config.account_metadata = metadata.clone();
        self.store.set(config).await?;
        Ok(metadata)
    }
}
