//! Provider settlement profiles
//!
//! Providers disagree on what "paid" looks like. Most send a dedicated
//! payment-success event; some only ever report "subscription created" or
//! "active" and expect the backend to settle on that. The profile records
//! which convention a provider follows so the reconciler treats activation
//! events correctly: settling for the former kind would double-charge once
//! the payment event arrives.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Settlement behavior of one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderProfile {
    /// Provider slug as carried in notifications
    pub slug: String,
    /// True when created/active events are the provider's success signal
    pub settles_on_activation: bool,
}

impl ProviderProfile {
    /// A provider that sends a separate payment-success event
    pub fn with_payment_events(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            settles_on_activation: false,
        }
    }

    /// A provider that signals success via subscription activation
    pub fn activation_settled(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            settles_on_activation: true,
        }
    }
}

/// Lookup table of provider profiles
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    profiles: HashMap<String, ProviderProfile>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a profile, replacing any previous one for the slug
    pub fn register(&mut self, profile: ProviderProfile) {
        self.profiles.insert(profile.slug.clone(), profile);
    }

    /// Looks up a provider by slug
    pub fn get(&self, slug: &str) -> Option<&ProviderProfile> {
        self.profiles.get(slug)
    }
}
