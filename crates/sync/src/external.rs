//! Narrow traits for capabilities this crate consumes but does not own.

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::warn;

use unibox_core::domain::interaction::TenantId;

/// Tenant credential lookup. Storage and encryption live elsewhere; the
/// pipeline only needs the decrypted token, and a failure here aborts the
/// run before any marketplace traffic.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get_decrypted_credentials(&self, tenant: &TenantId)
        -> anyhow::Result<SecretString>;
}

/// Product catalog lookup used to enrich classification input.
#[async_trait]
pub trait ProductContextProvider: Send + Sync {
    async fn get_product_context(&self, product_id: &str) -> anyhow::Result<String>;
}

/// Degrading wrapper: context failures are logged and become empty context,
/// never a blocked record.
pub async fn product_context_or_empty(
    provider: &dyn ProductContextProvider,
    product_id: Option<&str>,
) -> String {
    let Some(product_id) = product_id else {
        return String::new();
    };
    match provider.get_product_context(product_id).await {
        Ok(context) => context,
        Err(error) => {
            warn!(product_id, error = %error, "product context lookup failed, continuing without");
            String::new()
        }
    }
}

/// Static stores for tests and single-tenant setups.
pub mod fixed {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use secrecy::SecretString;

    use unibox_core::domain::interaction::TenantId;

    use super::{CredentialStore, ProductContextProvider};

    pub struct FixedCredentialStore {
        tokens: HashMap<String, String>,
    }

    impl FixedCredentialStore {
        pub fn new(tokens: impl IntoIterator<Item = (String, String)>) -> Self {
            Self { tokens: tokens.into_iter().collect() }
        }

        pub fn single(tenant: &str, token: &str) -> Self {
            Self::new([(tenant.to_string(), token.to_string())])
        }
    }

    #[async_trait]
    impl CredentialStore for FixedCredentialStore {
        async fn get_decrypted_credentials(
            &self,
            tenant: &TenantId,
        ) -> anyhow::Result<SecretString> {
            self.tokens
                .get(&tenant.0)
                .map(|token| SecretString::from(token.clone()))
                .ok_or_else(|| anyhow::anyhow!("no credentials for tenant `{}`", tenant.0))
        }
    }

    #[derive(Default)]
    pub struct EmptyProductContext;

    #[async_trait]
    impl ProductContextProvider for EmptyProductContext {
        async fn get_product_context(&self, _product_id: &str) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::fixed::FixedCredentialStore;
    use super::{product_context_or_empty, CredentialStore, ProductContextProvider};
    use unibox_core::domain::interaction::TenantId;

    struct FailingContext;

    #[async_trait]
    impl ProductContextProvider for FailingContext {
        async fn get_product_context(&self, _product_id: &str) -> anyhow::Result<String> {
            anyhow::bail!("catalog unavailable")
        }
    }

    #[tokio::test]
    async fn context_failures_degrade_to_empty() {
        let context = product_context_or_empty(&FailingContext, Some("p-1")).await;
        assert_eq!(context, "");

        let no_product = product_context_or_empty(&FailingContext, None).await;
        assert_eq!(no_product, "");
    }

    #[tokio::test]
    async fn fixed_store_serves_only_known_tenants() {
        let store = FixedCredentialStore::single("t-1", "tok");
        assert!(store.get_decrypted_credentials(&TenantId("t-1".to_string())).await.is_ok());
        assert!(store.get_decrypted_credentials(&TenantId("t-9".to_string())).await.is_err());
    }
}
