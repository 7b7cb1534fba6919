//! Business-rule constants for scoring, loadable from TOML

use crate::errors::UpliftError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Constants driving the deposit estimate, contact cost and recommendation cut
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Lower bound on the estimated deposit amount
    pub deposit_floor: f64,
    /// Lower bound of the uniform balance fraction
    pub deposit_fraction_min: f64,
    /// Upper bound (exclusive) of the uniform balance fraction
    pub deposit_fraction_max: f64,
    /// Annual value multiplier applied to the deposit (0.03 * 1.5)
    pub value_rate: f64,
    /// Cost for any contact channel missing from `contact_costs`
    pub default_contact_cost: f64,
    /// Cost per contact channel
    pub contact_costs: BTreeMap<String, f64>,
    /// Uplift quantile above which a customer is recommended
    pub recommend_quantile: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let contact_costs = [("cellular", 30.0), ("telephone", 50.0), ("unknown", 5.0)]
            .into_iter()
            .map(|(channel, cost)| (channel.to_string(), cost))
            .collect();

        Self {
            deposit_floor: 1000.0,
            deposit_fraction_min: 0.1,
            deposit_fraction_max: 0.5,
            value_rate: 0.03 * 1.5,
            default_contact_cost: 10.0,
            contact_costs,
            recommend_quantile: 0.8,
        }
    }
}

impl ScoringConfig {
    /// Load a config from a TOML file; absent keys keep their defaults
    pub fn from_toml_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        info!("Loaded scoring configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_toml_str(contents: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the constants are usable before any row is scored
    pub fn validate(&self) -> Result<(), UpliftError> {
        let fractions_ok = self.deposit_fraction_min.is_finite()
            && self.deposit_fraction_max.is_finite()
            && self.deposit_fraction_min >= 0.0
            && self.deposit_fraction_min < self.deposit_fraction_max;
        if !fractions_ok {
            return Err(UpliftError::InvalidConfig(format!(
                "deposit fraction range [{}, {}) must be non-negative and non-empty",
                self.deposit_fraction_min, self.deposit_fraction_max
            )));
        }

        if !(0.0..=1.0).contains(&self.recommend_quantile) {
            return Err(UpliftError::InvalidConfig(format!(
                "recommend_quantile {} must lie in [0, 1]",
                self.recommend_quantile
            )));
        }

        if !self.deposit_floor.is_finite() || !self.value_rate.is_finite() {
            return Err(UpliftError::InvalidConfig(
                "deposit_floor and value_rate must be finite".to_string(),
            ));
        }

        if let Some((channel, cost)) = self.contact_costs.iter().find(|(_, c)| !c.is_finite()) {
            return Err(UpliftError::InvalidConfig(format!(
                "contact cost for '{}' is not finite: {}",
                channel, cost
            )));
        }

        Ok(())
    }

    /// Cost of reaching a customer through `contact`
    pub fn contact_cost(&self, contact: Option<&str>) -> f64 {
        contact
            .and_then(|channel| self.contact_costs.get(channel))
            .copied()
            .unwrap_or(self.default_contact_cost)
    }
}
