//! Client identity used by the upstream API to key its rate limits

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Opaque device identifier presented to the upstream API.
///
/// The coordinator never inspects it; it only asks the client to replace it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientIdentity(Uuid);

impl ClientIdentity {
    /// Generate a fresh random identity
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ClientIdentity {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}
