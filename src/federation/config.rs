use crate::TimeError;

pub const DEFAULT_MAX_FEDERATES: usize = 64;

#[derive(Debug, Clone)]
pub struct FederationConfig {
    pub federation_name: String,
    pub max_federates: usize,
}

impl FederationConfig {
    /// Create a new configuration for the named federation
    pub fn new(federation_name: impl Into<String>) -> Self {
        Self {
            federation_name: federation_name.into(),
            max_federates: DEFAULT_MAX_FEDERATES,
        }
    }

    /// Cap the number of federates that may be joined at once
    pub fn with_max_federates(mut self, max_federates: usize) -> Self {
        self.max_federates = max_federates;
        self
    }

    /// Validate that all required fields have been configured
    pub fn validate(&self) -> Result<(), TimeError> {
        if self.federation_name.trim().is_empty() {
            return Err(TimeError::ConfigError(
                "Federation name must not be empty".to_string(),
            ));
        }

        if self.max_federates == 0 {
            return Err(TimeError::ConfigError(
                "At least one federate must be allowed to join".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod config_tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = FederationConfig::new("fed").with_max_federates(4);
        assert_eq!(config.federation_name, "fed");
        assert_eq!(config.max_federates, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        assert!(matches!(
            FederationConfig::new("  ").validate(),
            Err(TimeError::ConfigError(_))
        ));
        assert!(matches!(
            FederationConfig::new("fed").with_max_federates(0).validate(),
            Err(TimeError::ConfigError(_))
        ));
    }
}
