//! Capability-indexed, ordered provider lists.

use std::fmt;

use super::{Capability, ProviderDescriptor};

/// Startup-time registry problems.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A capability has no providers at all.
    EmptyCapability(Capability),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyCapability(capability) => {
                write!(f, "no providers registered for {capability} capability")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Fixed preference order per capability: most capable first, most available last.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    text: Vec<ProviderDescriptor>,
    image: Vec<ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider at the lowest priority of its capability.
    pub fn register(&mut self, provider: ProviderDescriptor) {
        match provider.capability() {
            Capability::Text => self.text.push(provider),
            Capability::Image => self.image.push(provider),
        }
    }

    pub fn with(mut self, provider: ProviderDescriptor) -> Self {
        self.register(provider);
        self
    }

    pub fn providers_for(&self, capability: Capability) -> &[ProviderDescriptor] {
        match capability {
            Capability::Text => &self.text,
            Capability::Image => &self.image,
        }
    }

    /// Both capabilities must have at least one provider.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for capability in [Capability::Text, Capability::Image] {
            if self.providers_for(capability).is_empty() {
                return Err(RegistryError::EmptyCapability(capability));
            }
        }
        Ok(())
    }
}
