//! Billing resolution and credit computation
//!
//! `resolve` picks the multipliers and price for one (credential, model)
//! pair; `compute_credit` turns a token count into credits:
//!
//! ```text
//! cost     = total_tokens / 1e6 * rmb_per_m_tok
//! base     = ceil(cost * 100 - eps)            (0 when cost <= 0)
//! consumed = ceil(base * model_mult * cred_mult - eps)
//! ```

mod model_config;

pub use model_config::{
    ModelBillingEntry, ModelBillingMap, parse_stored, serialize_map, validate_model_billing,
};

use serde::Serialize;

use crate::core::constants::{
    CREDIT_ROUNDING_EPSILON, CREDITS_PER_CURRENCY_UNIT, TOKENS_PER_PRICE_UNIT,
};
use crate::data::types::CredentialRow;

/// Where a multiplier or price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingSource {
    ModelConfig,
    Default,
    Missing,
}

impl BillingSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelConfig => "model_config",
            Self::Default => "default",
            Self::Missing => "missing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ResolvedBilling {
    pub credential_multiplier: f64,
    pub model_multiplier: f64,
    pub model_multiplier_source: BillingSource,
    pub rmb_per_m_tok: f64,
    pub rmb_price_source: BillingSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CreditComputation {
    pub token_cost: f64,
    pub base_credit: i64,
    pub consumed_credit: i64,
}

/// Resolve billing for `model` under `credential` (either may be absent)
pub fn resolve(credential: Option<&CredentialRow>, model: Option<&str>) -> ResolvedBilling {
    let credential_multiplier = credential
        .map(|c| c.credit_consumption_multiplier)
        .filter(|m| m.is_finite() && *m > 0.0)
        .unwrap_or(1.0);

    let entry = credential.zip(model.map(str::trim).filter(|m| !m.is_empty())).and_then(
        |(credential, model)| {
            parse_stored(credential.credit_consumption_multiplier_by_model.as_deref())
                .remove(model)
        },
    );

    match entry {
        Some(entry) => ResolvedBilling {
            credential_multiplier,
            model_multiplier: entry.multiplier,
            model_multiplier_source: BillingSource::ModelConfig,
            rmb_per_m_tok: entry.rmb_per_m_tok,
            rmb_price_source: BillingSource::ModelConfig,
        },
        None => ResolvedBilling {
            credential_multiplier,
            model_multiplier: 1.0,
            model_multiplier_source: BillingSource::Default,
            rmb_per_m_tok: 0.0,
            rmb_price_source: BillingSource::Missing,
        },
    }
}

fn ceil_credit(value: f64) -> i64 {
    if !value.is_finite() || value <= 0.0 {
        return 0;
    }
    (value - CREDIT_ROUNDING_EPSILON).ceil().max(0.0) as i64
}

pub fn compute_credit(total_tokens: i64, billing: &ResolvedBilling) -> CreditComputation {
    let token_cost = total_tokens as f64 / TOKENS_PER_PRICE_UNIT * billing.rmb_per_m_tok;
    let base_credit = if token_cost > 0.0 {
        ceil_credit(token_cost * CREDITS_PER_CURRENCY_UNIT)
    } else {
        0
    };
    let consumed_credit = ceil_credit(
        base_credit as f64 * billing.model_multiplier * billing.credential_multiplier,
    );
    CreditComputation {
        token_cost,
        base_credit,
        consumed_credit,
    }
}

/// Audit description stored on `consume` ledger rows
pub fn describe_consumption(
    credential_name: &str,
    model: Option<&str>,
    total_tokens: i64,
    billing: &ResolvedBilling,
    computation: &CreditComputation,
) -> String {
    format!(
        "Token usage: credential={} model={} totalTokens={} rmbPerMTok={} ({}) tokenCost={:.6} \
         baseCredit={} modelMultiplier={} ({}) credentialMultiplier={} consumed={}",
        credential_name,
        model.unwrap_or("-"),
        total_tokens,
        billing.rmb_per_m_tok,
        billing.rmb_price_source.as_str(),
        computation.token_cost,
        computation.base_credit,
        billing.model_multiplier,
        billing.model_multiplier_source.as_str(),
        billing.credential_multiplier,
        computation.consumed_credit,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(multiplier: f64, by_model: Option<&str>) -> CredentialRow {
        CredentialRow {
            id: "cred-1".into(),
            workspace_id: "ws".into(),
            name: "OpenAI".into(),
            credential_name: "openAIApi".into(),
            credit_consumption_multiplier: multiplier,
            credit_consumption_multiplier_by_model: by_model.map(str::to_string),
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_resolve_defaults() {
        let r = resolve(None, Some("gpt-x"));
        assert_eq!(r.credential_multiplier, 1.0);
        assert_eq!(r.model_multiplier, 1.0);
        assert_eq!(r.model_multiplier_source, BillingSource::Default);
        assert_eq!(r.rmb_per_m_tok, 0.0);
        assert_eq!(r.rmb_price_source, BillingSource::Missing);
    }

    #[test]
    fn test_resolve_model_config() {
        let cred = credential(1.5, Some(r#"{"gpt-4o": {"multiplier": 2, "rmbPerMTok": 10}}"#));
        let r = resolve(Some(&cred), Some(" gpt-4o "));
        assert_eq!(r.credential_multiplier, 1.5);
        assert_eq!(r.model_multiplier, 2.0);
        assert_eq!(r.rmb_per_m_tok, 10.0);
        assert_eq!(r.rmb_price_source, BillingSource::ModelConfig);

        let other = resolve(Some(&cred), Some("gpt-3.5"));
        assert_eq!(other.model_multiplier_source, BillingSource::Default);
        assert_eq!(other.credential_multiplier, 1.5);
    }

    #[test]
    fn test_resolve_invalid_flat_multiplier() {
        for bad in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            assert_eq!(resolve(Some(&credential(bad, None)), None).credential_multiplier, 1.0);
        }
    }

    #[test]
    fn test_resolve_legacy_entry() {
        let cred = credential(1.0, Some(r#"{"m": 3}"#));
        let r = resolve(Some(&cred), Some("m"));
        assert_eq!(r.model_multiplier, 3.0);
        assert_eq!(r.rmb_per_m_tok, 0.0);
        assert_eq!(compute_credit(1_000_000, &r).consumed_credit, 0);
    }

    #[test]
    fn test_compute_without_price_is_zero() {
        let r = resolve(None, Some("gpt-x"));
        let c = compute_credit(1_000_000, &r);
        assert_eq!(c.token_cost, 0.0);
        assert_eq!(c.base_credit, 0);
        assert_eq!(c.consumed_credit, 0);
    }

    #[test]
    fn test_compute_rounds_up() {
        let cred = credential(1.5, Some(r#"{"m": {"multiplier": 2, "rmbPerMTok": 10}}"#));
        let r = resolve(Some(&cred), Some("m"));

        // 1500 tokens at 10/MTok = 0.015 -> 1.5 -> base 2 -> 2 * 2 * 1.5 = 6
        let c = compute_credit(1500, &r);
        assert_eq!(c.base_credit, 2);
        assert_eq!(c.consumed_credit, 6);

        // Exactly one credit stays one credit
        let c = compute_credit(1000, &resolve(Some(&credential(1.0, Some(r#"{"m": {"rmbPerMTok": 10}}"#))), Some("m")));
        assert_eq!(c.base_credit, 1);
        assert_eq!(c.consumed_credit, 1);
    }

    #[test]
    fn test_compute_fractional_multiplier() {
        let cred = credential(0.25, Some(r#"{"m": {"multiplier": 1, "rmbPerMTok": 100}}"#));
        let r = resolve(Some(&cred), Some("m"));
        // 10_000 tokens -> 1.0 currency -> base 100 -> 25
        assert_eq!(compute_credit(10_000, &r).consumed_credit, 25);
        // 10 tokens -> 0.001 -> base 1 -> ceil(0.25) = 1
        assert_eq!(compute_credit(10, &r).consumed_credit, 1);
    }

    #[test]
    fn test_describe_consumption() {
        let r = resolve(None, Some("gpt-x"));
        let c = compute_credit(42, &r);
        let text = describe_consumption("OpenAI", Some("gpt-x"), 42, &r, &c);
        assert!(text.starts_with("Token usage: credential=OpenAI model=gpt-x totalTokens=42"));
        assert!(text.contains("rmbPerMTok=0 (missing)"));
        assert!(text.contains("modelMultiplier=1 (default)"));
        assert!(text.ends_with("consumed=0"));
    }
}
