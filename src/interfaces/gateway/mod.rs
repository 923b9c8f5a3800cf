//! Gateway adapters: signature checks and payload normalization per provider.
//!
//! All three providers sign the same way in principle: take every field except
//! the signature itself, drop empty values, sort by key, join as `k=v&k=v`,
//! and MAC the result with HMAC-SHA256 under the merchant secret. They differ
//! in payload encoding, in how the MAC is rendered, and in what they expect
//! back as an acknowledgement.

pub mod alipay;
pub mod hupipay;
pub mod wechat;

use crate::config::GatewaySettings;
use crate::domain::notification::Gateway;
use crate::domain::order::OrderNo;
use crate::domain::ports::{GatewayAdapter, GatewayAdapterBox, RawCallback};
use crate::error::VerificationError;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use sha2::Sha256;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

pub use alipay::AlipayAdapter;
pub use hupipay::HupiPayAdapter;
pub use wechat::WechatAdapter;

type HmacSha256 = Hmac<Sha256>;

/// Flat string fields of a callback, ordered by key.
pub type Fields = BTreeMap<String, String>;

/// Joins non-empty fields as `k=v&k=v` in key order, skipping `excluded` keys.
pub fn canonical_string(fields: &Fields, excluded: &[&str]) -> String {
    fields
        .iter()
        .filter(|(k, v)| !v.is_empty() && !excluded.contains(&k.as_str()))
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// HMAC-SHA256 of `message` under `secret`.
pub fn hmac_sha256(secret: &str, message: &str) -> Vec<u8> {
    keyed(secret)
        .map(|mut mac| {
            mac.update(message.as_bytes());
            mac.finalize().into_bytes().to_vec()
        })
        .unwrap_or_default()
}

/// Constant-time check of `expected` against the MAC of `message`.
pub fn verify_hmac(secret: &str, message: &str, expected: &[u8]) -> bool {
    keyed(secret).is_some_and(|mut mac| {
        mac.update(message.as_bytes());
        mac.verify_slice(expected).is_ok()
    })
}

fn keyed(secret: &str) -> Option<HmacSha256> {
    <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).ok()
}

pub(crate) fn required<'a>(
    fields: &'a Fields,
    gateway: Gateway,
    field: &'static str,
) -> Result<&'a str, VerificationError> {
    optional(fields, field).ok_or(VerificationError::MissingField { gateway, field })
}

pub(crate) fn optional<'a>(fields: &'a Fields, field: &str) -> Option<&'a str> {
    fields
        .get(field)
        .map(String::as_str)
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_order_no(gateway: Gateway, value: &str) -> Result<OrderNo, VerificationError> {
    OrderNo::new(value).map_err(|e| VerificationError::Malformed {
        gateway,
        reason: e.to_string(),
    })
}

pub(crate) fn parse_amount(gateway: Gateway, value: &str) -> Result<Decimal, VerificationError> {
    Decimal::from_str(value).map_err(|e| VerificationError::Malformed {
        gateway,
        reason: format!("amount `{value}`: {e}"),
    })
}

/// Rejects bodies declared with a media type the provider never sends.
///
/// A missing `Content-Type` is let through; the body parser decides.
pub(crate) fn check_content_type(
    raw: &RawCallback,
    gateway: Gateway,
    accepted: &[&str],
) -> Result<(), VerificationError> {
    let Some(content_type) = &raw.content_type else {
        return Ok(());
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    if accepted.contains(&mime.as_str()) {
        Ok(())
    } else {
        Err(VerificationError::Malformed {
            gateway,
            reason: format!("unexpected content type `{content_type}`"),
        })
    }
}

pub(crate) fn check_app(
    gateway: Gateway,
    expected: &str,
    actual: &str,
) -> Result<(), VerificationError> {
    if expected == actual {
        Ok(())
    } else {
        Err(VerificationError::AppMismatch {
            gateway,
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

/// Response body a gateway expects after delivering a callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acknowledgement {
    pub content_type: &'static str,
    pub body: String,
}

/// Builds the provider's acknowledgement. Only an `accepted` callback stops retries.
pub fn acknowledge(gateway: Gateway, accepted: bool) -> Acknowledgement {
    match gateway {
        Gateway::Alipay => Acknowledgement {
            content_type: "text/plain; charset=utf-8",
            body: if accepted { "success" } else { "fail" }.to_string(),
        },
        Gateway::Wechat => {
            let (code, msg) = if accepted {
                ("SUCCESS", "OK")
            } else {
                ("FAIL", "ERROR")
            };
            Acknowledgement {
                content_type: "text/xml; charset=utf-8",
                body: format!(
                    "<xml><return_code><![CDATA[{code}]]></return_code><return_msg><![CDATA[{msg}]]></return_msg></xml>"
                ),
            }
        }
        Gateway::HupiPay => Acknowledgement {
            content_type: "application/json",
            body: serde_json::json!({ "status": if accepted { "success" } else { "fail" } })
                .to_string(),
        },
    }
}

/// Adapters for the gateways that have credentials configured.
#[derive(Default)]
pub struct GatewayRegistry {
    adapters: HashMap<Gateway, GatewayAdapterBox>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &GatewaySettings) -> Self {
        let mut registry = Self::new();
        if let Some(alipay) = &settings.alipay {
            registry.register(Box::new(AlipayAdapter::new(&alipay.app_id, &alipay.secret)));
        }
        if let Some(wechat) = &settings.wechat {
            registry.register(Box::new(WechatAdapter::new(
                &wechat.app_id,
                &wechat.mch_id,
                &wechat.api_key,
            )));
        }
        if let Some(hupipay) = &settings.hupipay {
            registry.register(Box::new(HupiPayAdapter::new(
                &hupipay.app_id,
                &hupipay.app_secret,
            )));
        }
        registry
    }

    pub fn register(&mut self, adapter: GatewayAdapterBox) {
        self.adapters.insert(adapter.gateway(), adapter);
    }

    pub fn get(&self, gateway: Gateway) -> Result<&dyn GatewayAdapter, VerificationError> {
        self.adapters
            .get(&gateway)
            .map(|adapter| adapter.as_ref())
            .ok_or(VerificationError::NotConfigured(gateway))
    }

    pub fn configured(&self) -> Vec<Gateway> {
        let mut gateways: Vec<Gateway> = self.adapters.keys().copied().collect();
        gateways.sort();
        gateways
    }
}
