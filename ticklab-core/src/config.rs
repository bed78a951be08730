//! Validated engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors, raised at construction time so the engine never
/// runs with nonsense parameters.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("initial capital must be positive, got {0}")]
    NonPositiveCapital(f64),
    #[error("leverage must be >= 1, got {0}")]
    InvalidLeverage(f64),
    #[error("{name} fee rate must be in [0, 1), got {rate}")]
    InvalidFeeRate { name: &'static str, rate: f64 },
    #[error("maintenance margin rate must be in (0, 1), got {0}")]
    InvalidMaintenanceMargin(f64),
    #[error("bar size must be positive, got {0}")]
    NonPositiveBarSize(f64),
    #[error("latency must be non-negative, got {0}")]
    NegativeLatency(i64),
}

/// Binance tier-1 maintenance margin rate for BTCUSDT perpetuals.
pub const DEFAULT_MAINTENANCE_MARGIN_RATE: f64 = 0.004;

const DEFAULT_MAKER_FEE: f64 = 0.0002;
const DEFAULT_TAKER_FEE: f64 = 0.0005;

/// Parameters of the simulated exchange.
///
/// `leverage == 1.0` selects spot semantics (no shorts, no margin, no
/// liquidation); anything above selects isolated-margin futures semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeConfig {
    pub initial_capital: f64,
    #[serde(default = "default_leverage")]
    pub leverage: f64,
    #[serde(default = "default_maker_fee")]
    pub maker_fee_rate: f64,
    #[serde(default = "default_taker_fee")]
    pub taker_fee_rate: f64,
    #[serde(default = "default_mmr")]
    pub maintenance_margin_rate: f64,
}

fn default_leverage() -> f64 {
    1.0
}

fn default_maker_fee() -> f64 {
    DEFAULT_MAKER_FEE
}

fn default_taker_fee() -> f64 {
    DEFAULT_TAKER_FEE
}

fn default_mmr() -> f64 {
    DEFAULT_MAINTENANCE_MARGIN_RATE
}

impl ExchangeConfig {
    /// Spot config with default maker/taker fees.
    pub fn spot(initial_capital: f64) -> Self {
        Self {
            initial_capital,
            leverage: 1.0,
            maker_fee_rate: DEFAULT_MAKER_FEE,
            taker_fee_rate: DEFAULT_TAKER_FEE,
            maintenance_margin_rate: DEFAULT_MAINTENANCE_MARGIN_RATE,
        }
    }

    /// Leveraged config with default maker/taker fees.
    pub fn leveraged(initial_capital: f64, leverage: f64) -> Self {
        Self {
            leverage,
            ..Self::spot(initial_capital)
        }
    }

    /// Legacy single-rate constructor: the one rate applies to both maker
    /// and taker fills.
    pub fn with_fee_rate(mut self, fee_rate: f64) -> Self {
        self.maker_fee_rate = fee_rate;
        self.taker_fee_rate = fee_rate;
        self
    }

    pub fn with_fees(mut self, maker: f64, taker: f64) -> Self {
        self.maker_fee_rate = maker;
        self.taker_fee_rate = taker;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_capital <= 0.0 {
            return Err(ConfigError::NonPositiveCapital(self.initial_capital));
        }
        if self.leverage < 1.0 {
            return Err(ConfigError::InvalidLeverage(self.leverage));
        }
        for (name, rate) in [
            ("maker", self.maker_fee_rate),
            ("taker", self.taker_fee_rate),
        ] {
            if !(0.0..1.0).contains(&rate) {
                return Err(ConfigError::InvalidFeeRate { name, rate });
            }
        }
        if !(self.maintenance_margin_rate > 0.0 && self.maintenance_margin_rate < 1.0) {
            return Err(ConfigError::InvalidMaintenanceMargin(
                self.maintenance_margin_rate,
            ));
        }
        Ok(())
    }

    pub fn is_leveraged(&self) -> bool {
        self.leverage > 1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_defaults_validate() {
        assert_eq!(ExchangeConfig::spot(10_000.0).validate(), Ok(()));
    }

    #[test]
    fn legacy_fee_rate_sets_both() {
        let config = ExchangeConfig::spot(10_000.0).with_fee_rate(0.001);
        assert_eq!(config.maker_fee_rate, 0.001);
        assert_eq!(config.taker_fee_rate, 0.001);
    }

    #[test]
    fn rejects_bad_capital() {
        let config = ExchangeConfig::spot(0.0);
        assert_eq!(
            config.validate(),
            Err(ConfigError::NonPositiveCapital(0.0))
        );
    }

    #[test]
    fn rejects_sub_unit_leverage() {
        let config = ExchangeConfig::leveraged(10_000.0, 0.5);
        assert_eq!(config.validate(), Err(ConfigError::InvalidLeverage(0.5)));
    }

    #[test]
    fn rejects_fee_rate_of_one() {
        let config = ExchangeConfig::spot(10_000.0).with_fees(0.0002, 1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidFeeRate { name: "taker", .. })
        ));
    }

    #[test]
    fn leverage_selects_mode() {
        assert!(!ExchangeConfig::spot(1_000.0).is_leveraged());
        assert!(ExchangeConfig::leveraged(1_000.0, 10.0).is_leveraged());
    }

    #[test]
    fn deserialization_fills_defaults() {
        let config: ExchangeConfig =
            serde_json::from_str(r#"{"initial_capital": 5000.0, "leverage": 5.0}"#).unwrap();
        assert_eq!(config.initial_capital, 5_000.0);
        assert_eq!(config.leverage, 5.0);
        assert_eq!(config.maker_fee_rate, DEFAULT_MAKER_FEE);
        assert_eq!(config.taker_fee_rate, DEFAULT_TAKER_FEE);
        assert_eq!(config.maintenance_margin_rate, DEFAULT_MAINTENANCE_MARGIN_RATE);
    }
}
