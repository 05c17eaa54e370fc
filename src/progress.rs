//! Setup progress derivation.
//!
//! A pure function from the persisted configuration (or its absence) and
//! the latest status probe to the discrete onboarding state that drives the
//! setup wizard and gates feature availability. No I/O, no hidden state:
//! the same inputs always produce the same [`SetupProgress`].

use serde::{Deserialize, Serialize};

use crate::config::{AccountMetadata, AccountReviewStatus, IntegrationConfig, QualityRating};

/// The wizard step an organization should be shown next.
///
/// Selection is a strict priority chain evaluated top to bottom: the first
/// unmet condition wins, so stale leftovers from a prior configuration can
/// never skip a step.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Debug)]
#[serde(rename_all = "snake_case")]
pub enum SetupStep {
    /// Link an account: no complete credential bundle yet.
    Authorization,
    /// Credentials present, but no phone number is visible yet.
    PhoneNumber,
    /// Optional, skippable: fill in the public business profile.
    BusinessProfile,
    Complete,
}

/// Derived onboarding state. Recomputed on demand, never persisted.
#[derive(Serialize, Deserialize, PartialEq, Eq, Clone, Debug)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct SetupProgress {
    pub is_configured: bool,
    pub has_phone_number: bool,
    pub has_business_profile: bool,
    pub account_status: AccountReviewStatus,
    pub quality_rating: QualityRating,
    pub step: SetupStep,
}

/// Derives [`SetupProgress`] from the persisted config and the latest
/// probe result.
///
/// `live_metadata` takes precedence when present; otherwise the last
/// persisted metadata is used. Both may be absent, in which case status and
/// quality
/// report `Unknown` rather than failing.
pub fn derive(
    config: Option<&IntegrationConfig>,
    live_metadata: Option<&AccountMetadata>,
) -> SetupProgress {
    let metadata = live_metadata.or(config.map(|c| &c.account_metadata));

    let is_configured = config.is_some_and(IntegrationConfig::is_configured);
    let has_phone_number = metadata
        .and_then(|m| m.display_phone_number.as_deref())
        .is_some_and(|n| !n.is_empty());
    let has_business_profile = config.is_some_and(|c| c.business_profile.is_completed());

    let step = if !is_configured {
        SetupStep::Authorization
    } else if !has_phone_number {
        SetupStep::PhoneNumber
    } else if !has_business_profile {
        SetupStep::BusinessProfile
    } else {
        SetupStep::Complete
    };

    SetupProgress {
        is_configured,
        has_phone_number,
        has_business_profile,
        account_status: metadata
            .map(|m| m.account_review_status)
            .unwrap_or_default(),
        quality_rating: metadata.map(|m| m.quality_rating).unwrap_or_default(),
        step,
    }
}
