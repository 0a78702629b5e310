use std::collections::HashMap;

use crate::config::Config;

/// Per-tenant settings needed to locate a tenant's blocks and index
pub trait TenantConfigProvider: Send + Sync {
    /// Object prefix holding the tenant's blocks
    fn tenant_prefix(&self, tenant: &str) -> String {
        tenant.to_string()
    }

    /// Tenants with an explicit prefix override, as `(tenant, prefix)`
    fn prefix_overrides(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Provider backed by static overrides, usually from the `[tenants]` config section
#[derive(Debug, Clone, Default)]
pub struct StaticTenantConfig {
    prefixes: HashMap<String, String>,
}

impl StaticTenantConfig {
    pub fn from_config(config: &Config) -> Self {
        let prefixes = config
            .tenants
            .keys()
            .map(|tenant| (tenant.clone(), config.tenant_prefix(tenant)))
            .collect();
        Self { prefixes }
    }

    pub fn with_prefix(mut self, tenant: impl Into<String>, prefix: impl Into<String>) -> Self {
        self.prefixes.insert(tenant.into(), prefix.into());
        self
    }
}

impl TenantConfigProvider for StaticTenantConfig {
    fn tenant_prefix(&self, tenant: &str) -> String {
        self.prefixes
            .get(tenant)
            .cloned()
            .unwrap_or_else(|| tenant.to_string())
    }

    fn prefix_overrides(&self) -> Vec<(String, String)> {
        let mut overrides: Vec<_> = self
            .prefixes
            .iter()
            .map(|(tenant, prefix)| (tenant.clone(), prefix.clone()))
            .collect();
        overrides.sort();
        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_overrides() {
        let provider = StaticTenantConfig::default()
            .with_prefix("team-b", "archive/team-b")
            .with_prefix("team-a", "archive/team-a");

        assert_eq!(provider.tenant_prefix("team-a"), "archive/team-a");
        assert_eq!(provider.tenant_prefix("user-1"), "user-1");
        assert_eq!(
            provider.prefix_overrides(),
            vec![
                ("team-a".to_string(), "archive/team-a".to_string()),
                ("team-b".to_string(), "archive/team-b".to_string()),
            ]
        );
        assert!(StaticTenantConfig::default().prefix_overrides().is_empty());
    }
}
