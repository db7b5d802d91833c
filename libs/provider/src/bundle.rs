//! Edition id to provider registry.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ProviderError;
use crate::java::JavaProvider;
use crate::provider::Provider;

#[derive(Clone, Default)]
pub struct Bundle {
    providers: BTreeMap<&'static str, Arc<dyn Provider>>,
}

impl Bundle {
    pub fn new() -> Self {
        Self::default()
    }

    /// All built-in providers.
    pub fn with_defaults() -> Result<Self, ProviderError> {
        let mut bundle = Self::new();
        bundle.insert(Arc::new(JavaProvider::new()?));
        Ok(bundle)
    }

    /// Register a provider under its edition id, replacing any previous one.
    pub fn insert(&mut self, provider: Arc<dyn Provider>) {
        self.providers.insert(provider.edition().id, provider);
    }

    pub fn get(&self, edition: &str) -> Result<Arc<dyn Provider>, ProviderError> {
        self.providers
            .get(edition)
            .cloned()
            .ok_or_else(|| ProviderError::UnknownEdition(edition.to_string()))
    }

    /// Registered edition ids in sorted order.
    pub fn editions(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.keys().copied()
    }
}

impl std::fmt::Debug for Bundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_contain_java() {
        let bundle = Bundle::with_defaults().unwrap();
        assert_eq!(bundle.editions().collect::<Vec<_>>(), vec!["java"]);
        assert_eq!(bundle.get("java").unwrap().edition().name, "Minecraft: Java Edition");
    }

    #[test]
    fn test_unknown_edition() {
        let bundle = Bundle::with_defaults().unwrap();
        let err = bundle.get("bedrock").err().unwrap();
        assert!(matches!(err, ProviderError::UnknownEdition(e) if e == "bedrock"));
    }
}
