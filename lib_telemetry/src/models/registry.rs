//! # Recipient Registry
//!
//! The static routing table of known recipients. Every reading must be
//! addressed to a registered recipient; anything else is a data or
//! configuration defect and is reported as [`RoutingError::UnknownRecipient`]
//! instead of falling through to a default branch.

use std::collections::BTreeMap;

use thiserror::Error;
use url::Url;

use super::Recipient;

/// Routing failures. These are never transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingError {
    #[error("unknown recipient: {0}")]
    UnknownRecipient(String),

    #[error("duplicate recipient: {0}")]
    DuplicateRecipient(String),
}

/// Per-recipient routing data.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Route {
    /// HTTP endpoint used by the distributor topology.
    pub sink_url: Option<Url>,
}

/// Immutable table mapping each registered [`Recipient`] to its [`Route`].
#[derive(Debug, Clone, Default)]
pub struct RecipientRegistry {
    routes: BTreeMap<Recipient, Route>,
}

impl RecipientRegistry {
    /// Builds the table, rejecting duplicate recipients.
    pub fn new(entries: impl IntoIterator<Item = (Recipient, Route)>) -> Result<Self, RoutingError> {
        let mut routes = BTreeMap::new();
        for (recipient, route) in entries {
            if routes.contains_key(&recipient) {
                return Err(RoutingError::DuplicateRecipient(recipient.to_string()));
            }
            routes.insert(recipient, route);
        }
        Ok(Self { routes })
    }

    pub fn resolve(&self, recipient: &Recipient) -> Result<&Route, RoutingError> {
        self.routes
            .get(recipient)
            .ok_or_else(|| RoutingError::UnknownRecipient(recipient.to_string()))
    }

    /// Looks up a recipient from an untyped identifier (e.g. a URL path segment).
    pub fn lookup(&self, id: &str) -> Result<&Recipient, RoutingError> {
        let candidate = Recipient::new(id).map_err(|_| RoutingError::UnknownRecipient(id.to_string()))?;
        self.routes
            .get_key_value(&candidate)
            .map(|(recipient, _)| recipient)
            .ok_or_else(|| RoutingError::UnknownRecipient(id.to_string()))
    }

    pub fn recipients(&self) -> impl Iterator<Item = &Recipient> {
        self.routes.keys()
    }

    pub fn routes(&self) -> impl Iterator<Item = (&Recipient, &Route)> {
        self.routes.iter()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
