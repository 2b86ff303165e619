//! Rate provider trait and implementations.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{FxError, FxResult};

/// USD-anchored rates returned by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderRates {
    /// NGN per 1 USD.
    pub ngn_per_usd: Decimal,
    /// CNY per 1 USD.
    pub cny_per_usd: Decimal,
}

/// Trait for FX rate providers.
#[async_trait]
pub trait RateProvider: Send + Sync {
    /// Get the provider name (recorded as the rate source).
    fn name(&self) -> &str;

    /// Fetch the current USD-anchored rates.
    async fn fetch_rates(&self) -> FxResult<ProviderRates>;
}

/// Deterministic mock rates used in development and tests.
pub const MOCK_NGN_PER_USD: Decimal = Decimal::from_parts(155_000, 0, 0, false, 2);

/// Deterministic mock CNY rate.
pub const MOCK_CNY_PER_USD: Decimal = Decimal::from_parts(725, 0, 0, false, 2);

/// Deterministic rate provider for development and tests.
#[derive(Debug, Default)]
pub struct MockRateProvider;

impl MockRateProvider {
    /// Create a new mock provider.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RateProvider for MockRateProvider {
    fn name(&self) -> &str {
        "mock"
    }

    async fn fetch_rates(&self) -> FxResult<ProviderRates> {
        Ok(ProviderRates {
            ngn_per_usd: MOCK_NGN_PER_USD,
            cny_per_usd: MOCK_CNY_PER_USD,
        })
    }
}

/// Live HTTP rate provider (exchangerate-api style USD anchor endpoint).
pub struct HttpRateProvider {
    client: reqwest::Client,
    url: String,
    timeout_secs: u64,
}

impl HttpRateProvider {
    /// Create a provider for the given endpoint URL.
    ///
    /// `timeout_secs` is clamped to the 10–30 s window the external-call
    /// policy allows.
    pub fn new(url: impl Into<String>, timeout_secs: u64) -> FxResult<Self> {
        let timeout_secs = timeout_secs.clamp(10, 30);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| FxError::Provider(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            timeout_secs,
        })
    }

    fn extract_rate(body: &serde_json::Value, code: &str) -> FxResult<Decimal> {
        let raw = body
            .get("conversion_rates")
            .and_then(|r| r.get(code))
            .ok_or_else(|| FxError::RateNotAvailable(format!("missing {code} rate")))?;
        Decimal::from_str(&raw.to_string())
            .map_err(|e| FxError::Provider(format!("unparseable {code} rate: {e}")))
    }
}

#[async_trait]
impl RateProvider for HttpRateProvider {
    fn name(&self) -> &str {
        "exchangerate-api"
    }

    async fn fetch_rates(&self) -> FxResult<ProviderRates> {
        debug!(url = %self.url, "Fetching rates from provider");

        let response = self.client.get(&self.url).send().await.map_err(|e| {
            if e.is_timeout() {
                FxError::ProviderTimeout(self.timeout_secs)
            } else {
                FxError::Provider(e.to_string())
            }
        })?;

        if !response.status().is_success() {
            return Err(FxError::Provider(format!(
                "provider returned HTTP {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FxError::Provider(e.to_string()))?;

        let rates = ProviderRates {
            ngn_per_usd: Self::extract_rate(&body, "NGN")?,
            cny_per_usd: Self::extract_rate(&body, "CNY")?,
        };

        if rates.ngn_per_usd <= Decimal::ZERO || rates.cny_per_usd <= Decimal::ZERO {
            return Err(FxError::RateNotAvailable(
                "provider returned non-positive rate".to_string(),
            ));
        }

        Ok(rates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_mock_provider_is_deterministic() {
        let provider = MockRateProvider::new();
        let rates = provider.fetch_rates().await.unwrap();

        assert_eq!(rates.ngn_per_usd, dec!(1550.00));
        assert_eq!(rates.cny_per_usd, dec!(7.25));
        assert_eq!(provider.name(), "mock");
    }

    #[test]
    fn test_http_provider_timeout_clamped() {
        let p = HttpRateProvider::new("http://localhost:1/latest/USD", 5).unwrap();
        assert_eq!(p.timeout_secs, 10);

        let p = HttpRateProvider::new("http://localhost:1/latest/USD", 120).unwrap();
        assert_eq!(p.timeout_secs, 30);
    }

    #[test]
    fn test_extract_rate_from_body() {
        let body = serde_json::json!({
            "conversion_rates": {"NGN": 1550.0, "CNY": 7.25}
        });
        let ngn = HttpRateProvider::extract_rate(&body, "NGN").unwrap();
        assert_eq!(ngn, dec!(1550.0));

        assert!(HttpRateProvider::extract_rate(&body, "EUR").is_err());
    }
}
