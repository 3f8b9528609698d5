//! Fallback handler for ecosystems without fix support.

use async_trait::async_trait;

use crate::model::{FixCandidate, Technology};

use super::{HandlerError, PackageHandler, UnsupportedReason};

/// Always reports the fix as unsupported, so unknown ecosystems surface as a
/// typed skip instead of a hard failure.
pub struct UnsupportedPackageHandler {
    technology: Technology,
}

impl UnsupportedPackageHandler {
    pub fn new(technology: Technology) -> Self {
        Self { technology }
    }
}

#[async_trait]
impl PackageHandler for UnsupportedPackageHandler {
    fn name(&self) -> &str {
        self.technology.as_str()
    }

    async fn update_dependency(&self, fix: &FixCandidate) -> Result<(), HandlerError> {
        Err(HandlerError::unsupported(
            fix,
            UnsupportedReason::UnknownEcosystem,
        ))
    }
}
