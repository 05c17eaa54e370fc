//! Per-organization integration configuration and its store.
//!
//! [`IntegrationConfig`] is the single persisted record per organization:
//! credentials plus the account metadata and business profile derived from
//! them. [`ConfigStore`] is the persistence seam: the crate ships
//! [`MemoryConfigStore`], and a host CRM can plug its own backing store in.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::credentials::CredentialBundle;
use crate::error::Error;
use crate::OrganizationId;

/// Live health of the linked phone number and business account, as reported
/// by the platform.
///
/// This is a cache, not authoritative state: readers must tolerate it being
/// stale or absent and fall back to defaults ([`QualityRating::Unknown`],
/// [`AccountReviewStatus::Unknown`]).
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct AccountMetadata {
    /// International-format display number, e.g. `+1 555-123-4567`.
    #[serde(default)]
    pub display_phone_number: Option<String>,

    /// The business display name, as approved during verification.
    #[serde(default)]
    pub verified_name: Option<String>,

    /// Messaging reputation score assigned by the platform.
    #[serde(default)]
    pub quality_rating: QualityRating,

    /// Review state of the display name (`APPROVED`, `PENDING`, ...).
    #[serde(default)]
    pub name_status: Option<String>,

    /// Code-verification state of the number itself.
    #[serde(default)]
    pub number_status: Option<String>,

    /// Review status of the WhatsApp Business Account.
    #[serde(default)]
    pub account_review_status: AccountReviewStatus,

    /// Current messaging limit tier, e.g. `TIER_1K`.
    #[serde(default)]
    pub messaging_limit_tier: Option<String>,
}

/// Platform-assigned health score for a phone number's messaging reputation.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QualityRating {
    Green,
    Yellow,
    Red,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Review status of a WhatsApp Business Account.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountReviewStatus {
    Approved,
    Pending,
    Rejected,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Business vertical, as the platform enumerates it.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Vertical {
    Auto,
    Beauty,
    Apparel,
    Edu,
    Entertain,
    EventPlan,
    Finance,
    Grocery,
    Govt,
    Hotel,
    Health,
    Nonprofit,
    ProfServices,
    Retail,
    Travel,
    Restaurant,
    NotABiz,
    Other,
    #[default]
    #[serde(other)]
    Undefined,
}

/// Maximum number of websites the platform accepts on a business profile.
pub const MAX_PROFILE_WEBSITES: usize = 2;

/// The organization's public business profile on WhatsApp.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct BusinessProfile {
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// At most [`MAX_PROFILE_WEBSITES`] entries.
    #[serde(default)]
    pub websites: Vec<String>,
    #[serde(default)]
    pub vertical: Vertical,
}

impl BusinessProfile {
    /// A profile counts as filled in when either free-text field is set.
    pub fn is_completed(&self) -> bool {
        self.about.as_deref().is_some_and(|s| !s.is_empty())
            || self.description.as_deref().is_some_and(|s| !s.is_empty())
    }
}

/// A partial business-profile update. `None` fields are left untouched;
/// this is the only partial write the store supports.
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug, Default)]
#[serde(rename_all = "camelCase")]
pub struct BusinessProfilePatch {
    #[serde(default)]
    pub about: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub websites: Option<Vec<String>>,
    #[serde(default)]
    pub vertical: Option<Vertical>,
}

impl BusinessProfilePatch {
    pub(crate) fn apply(self, profile: &mut BusinessProfile) {
        if let Some(about) = self.about {
            profile.about = Some(about);
        }
        if let Some(address) = self.address {
            profile.address = Some(address);
        }
        if let Some(description) = self.description {
            profile.description = Some(description);
        }
        if let Some(email) = self.email {
            profile.email = Some(email);
        }
        if let Some(websites) = self.websites {
            profile.websites = websites;
        }
        if let Some(vertical) = self.vertical {
            profile.vertical = vertical;
        }
    }
}

/// The persisted integration record for one organization.
///
/// Created on first successful credential validation; replaced wholesale on
/// reconfiguration; never deleted. The only field with partial-update
/// semantics is [`IntegrationConfig::business_profile`].
#[derive(Serialize, Deserialize, PartialEq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct IntegrationConfig {
    pub organization_id: OrganizationId,
    pub credentials: CredentialBundle,
    /// Which exchange path produced the credentials: the redirect-based
    /// embedded-signup flow (`true`) or manual entry (`false`).
    pub is_embedded_signup: bool,
    pub account_metadata: AccountMetadata,
    pub business_profile: BusinessProfile,
    /// Unix seconds of the last write.
    pub updated_at: i64,
}

impl IntegrationConfig {
    pub fn new(
        organization_id: OrganizationId,
        credentials: CredentialBundle,
        is_embedded_signup: bool,
    ) -> Self {
        Self {
            organization_id,
            credentials,
            is_embedded_signup,
            account_metadata: AccountMetadata::default(),
            business_profile: BusinessProfile::default(),
            updated_at: unix_now(),
        }
    }

    /// Whether the credential bundle is fully present. Partial physical
    /// writes may exist in the store during setup, but they never pass this
    /// gate.
    pub fn is_configured(&self) -> bool {
        self.credentials.is_complete()
    }

    /// A copy safe to return across the service boundary: the access token
    /// is masked, everything else is intact.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.credentials.access_token = crate::mask_token(&self.credentials.access_token);
        copy
    }

    pub(crate) fn touch(&mut self) {
        self.updated_at = unix_now();
    }
}

pub(crate) fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

/// Persistence seam for [`IntegrationConfig`], keyed by organization.
///
/// Implementations must serialize writes for the same organization
/// (last-write-wins is acceptable) and must not require any
/// cross-organization coordination. The bundled [`MemoryConfigStore`]
/// satisfies both; a host CRM can substitute its own backing store.
pub trait ConfigStore: Clone + Send + Sync + 'static {
    /// Fetch the organization's configuration, `None` if setup never
    /// completed a write.
    fn get(
        &self,
        organization_id: &OrganizationId,
    ) -> impl Future<Output = Result<Option<IntegrationConfig>, Error>> + Send;

    /// Full replace, never a merge, so stale credentials cannot survive a
    /// reconfiguration.
    fn set(&self, config: IntegrationConfig) -> impl Future<Output = Result<(), Error>> + Send;

    /// Patch the business profile, the only field with independent
    /// post-setup edits. Fails with [`Error::NotConfigured`] when there is
    /// no record to patch.
    fn patch_business_profile(
        &self,
        organization_id: &OrganizationId,
        patch: BusinessProfilePatch,
    ) -> impl Future<Output = Result<IntegrationConfig, Error>> + Send;
}

/// In-memory [`ConfigStore`], suitable for tests and single-process
/// deployments.
///
/// A single `RwLock` guards the map; no guard is ever held across an await,
/// so writes serialize per key with last-write-wins and cross-organization
/// contention is bounded by a map operation.
#[derive(Clone, Default)]
pub struct MemoryConfigStore {
    inner: Arc<RwLock<HashMap<OrganizationId, IntegrationConfig>>>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl fmt::Debug for MemoryConfigStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConfigStore").finish_non_exhaustive()
    }
}

impl ConfigStore for MemoryConfigStore {
    async fn get(
        &self,
        organization_id: &OrganizationId,
    ) -> Result<Option<IntegrationConfig>, Error> {
        Ok(self.inner.read().await.get(organization_id).cloned())
    }

    async fn set(&self, mut config: IntegrationConfig) -> Result<(), Error> {
        config.touch();
        self.inner
            .write()
            .await
            .insert(config.organization_id.clone(), config);
        Ok(())
    }

    async fn patch_business_profile(
        &self,
        organization_id: &OrganizationId,
        patch: BusinessProfilePatch,
    ) -> Result<IntegrationConfig, Error> {
        let mut map = self.inner.write().await;
        let config = map
            .get_mut(organization_id)
            .ok_or_else(|| Error::NotConfigured(organization_id.clone()))?;
        patch.apply(&mut config.business_profile);
        config.touch();
        Ok(config.clone())
    }
}
