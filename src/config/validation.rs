use super::models::{Config, StorageProvider};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{field} must be greater than zero")]
    ZeroConcurrency { field: String },

    #[error("sync_interval must be positive")]
    InvalidSyncInterval,

    #[error("Storage provider is S3 but missing credentials (access_key or secret_key)")]
    MissingS3Credentials,

    #[error("Storage provider is S3 but no bucket is configured")]
    MissingBucket,

    #[error("Tenant '{tenant}' has an empty prefix override")]
    EmptyTenantPrefix { tenant: String },

    #[error("Tenant ID '{tenant}' is not a valid object prefix")]
    InvalidTenantId { tenant: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_compactor(config)?;
    validate_storage(config)?;
    validate_tenants(config)?;
    Ok(())
}

fn validate_compactor(config: &Config) -> Result<(), ValidationError> {
    if config.compactor.tenant_concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency {
            field: "tenant_concurrency".to_string(),
        });
    }

    if config.compactor.attributes_concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency {
            field: "attributes_concurrency".to_string(),
        });
    }

    if config.compactor.sync_interval.is_zero() {
        return Err(ValidationError::InvalidSyncInterval);
    }

    Ok(())
}

/// Validate storage credentials when provider is S3
fn validate_storage(config: &Config) -> Result<(), ValidationError> {
    if config.storage.provider == StorageProvider::S3 {
        if config.storage.bucket.trim().is_empty() {
            return Err(ValidationError::MissingBucket);
        }
        if config.storage.access_key.is_none() || config.storage.secret_key.is_none() {
            return Err(ValidationError::MissingS3Credentials);
        }
    }

    Ok(())
}

fn validate_tenants(config: &Config) -> Result<(), ValidationError> {
    for tenant in &config.compactor.tenants {
        if !is_valid_tenant_id(tenant) {
            return Err(ValidationError::InvalidTenantId {
                tenant: tenant.clone(),
            });
        }
    }

    for (tenant, overrides) in &config.tenants {
        if let Some(prefix) = &overrides.prefix {
            if prefix.trim_matches('/').is_empty() {
                return Err(ValidationError::EmptyTenantPrefix {
                    tenant: tenant.clone(),
                });
            }
        }
    }

    Ok(())
}

fn is_valid_tenant_id(tenant: &str) -> bool {
    !tenant.is_empty() && tenant != "." && tenant != ".." && !tenant.contains('/')
}

#[cfg(test)]
mod tests {
    use super::super::models::*;
    use super::*;

    fn create_test_config() -> Config {
        let mut config = Config::default();
        config.compactor.tenants = vec!["user-1".to_string(), "user-2".to_string()];
        config
    }

    #[test]
    fn test_valid_config() {
        let config = create_test_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_tenant_concurrency() {
        let mut config = create_test_config();
        config.compactor.tenant_concurrency = 0;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::ZeroConcurrency { .. })));
    }

    #[test]
    fn test_zero_sync_interval() {
        let mut config = create_test_config();
        config.compactor.sync_interval = crate::humanize::HumanDuration::ZERO;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::InvalidSyncInterval)));
    }

    #[test]
    fn test_s3_credentials_missing() {
        let mut config = create_test_config();
        config.storage.provider = StorageProvider::S3;
        config.storage.access_key = None;

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::MissingS3Credentials)));
    }

    #[test]
    fn test_invalid_tenant_id() {
        let mut config = create_test_config();
        config.compactor.tenants.push("a/b".to_string());

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::InvalidTenantId { .. })));
    }

    #[test]
    fn test_empty_tenant_prefix() {
        let mut config = create_test_config();
        config.tenants.insert(
            "user-1".to_string(),
            TenantOverrides {
                prefix: Some("/".to_string()),
            },
        );

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::EmptyTenantPrefix { .. })));
    }

    #[test]
    fn test_wait_period_zero_is_allowed() {
        let mut config = create_test_config();
        config.compactor.wait_period = crate::humanize::HumanDuration::ZERO;

        assert!(validate(&config).is_ok());
    }
}
