use super::{
    Fields, canonical_string, check_app, check_content_type, hmac_sha256, optional, parse_amount,
    parse_order_no, required, verify_hmac,
};
use crate::domain::notification::{Gateway, Notification, ProviderStatus};
use crate::domain::ports::{GatewayAdapter, RawCallback};
use crate::error::VerificationError;
use serde_json::Value;

const GATEWAY: Gateway = Gateway::HupiPay;
const UNSIGNED: [&str; 1] = ["hash"];

/// JSON notifications; `hash` is lowercase hex HMAC-SHA256 under the app secret.
pub struct HupiPayAdapter {
    app_id: String,
    app_secret: String,
}

impl HupiPayAdapter {
    pub fn new(app_id: &str, app_secret: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            app_secret: app_secret.to_string(),
        }
    }

    pub fn sign(&self, fields: &Fields) -> String {
        hex::encode(hmac_sha256(
            &self.app_secret,
            &canonical_string(fields, &UNSIGNED),
        ))
    }
}

/// Top-level scalars as strings. Nulls read as absent.
fn flatten(body: &[u8]) -> Result<Fields, VerificationError> {
    let malformed = |reason: String| VerificationError::Malformed {
        gateway: GATEWAY,
        reason,
    };
    let object = match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(object)) => object,
        Ok(_) => return Err(malformed("expected a JSON object".to_string())),
        Err(e) => return Err(malformed(e.to_string())),
    };

    let mut fields = Fields::new();
    for (key, value) in object {
        let value = match value {
            Value::String(s) => s,
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Null => continue,
            Value::Array(_) | Value::Object(_) => {
                return Err(malformed(format!("field `{key}` is not a scalar")));
            }
        };
        fields.insert(key, value);
    }
    Ok(fields)
}

impl GatewayAdapter for HupiPayAdapter {
    fn gateway(&self) -> Gateway {
        GATEWAY
    }

    fn verify(&self, raw: &RawCallback) -> Result<Notification, VerificationError> {
        check_content_type(raw, GATEWAY, &["application/json"])?;
        let fields = flatten(&raw.body)?;

        let hash = hex::decode(required(&fields, GATEWAY, "hash")?)
            .map_err(|_| VerificationError::BadSignature(GATEWAY))?;
        if !verify_hmac(
            &self.app_secret,
            &canonical_string(&fields, &UNSIGNED),
            &hash,
        ) {
            return Err(VerificationError::BadSignature(GATEWAY));
        }
        check_app(GATEWAY, &self.app_id, required(&fields, GATEWAY, "appid")?)?;

        let order_no = parse_order_no(GATEWAY, required(&fields, GATEWAY, "out_trade_no")?)?;
        let status = required(&fields, GATEWAY, "status")?;
        let provider_status = match status {
            "OD" => ProviderStatus::Paid,
            "CD" => ProviderStatus::Failed,
            "RD" => ProviderStatus::Refunded,
            other => {
                return Err(VerificationError::UnsupportedStatus {
                    gateway: GATEWAY,
                    status: other.to_string(),
                });
            }
        };
        let amount = optional(&fields, "total_fee")
            .map(|v| parse_amount(GATEWAY, v))
            .transpose()?;

        Ok(Notification {
            gateway: GATEWAY,
            order_no,
            provider_status,
            transaction_id: optional(&fields, "transaction_id").map(str::to_string),
            amount,
            raw_status: status.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn adapter() -> HupiPayAdapter {
        HupiPayAdapter::new("201906120001", "hupi-secret")
    }

    fn signed(adapter: &HupiPayAdapter, mut body: Value) -> RawCallback {
        let fields = flatten(body.to_string().as_bytes()).unwrap();
        body["hash"] = Value::String(adapter.sign(&fields));
        RawCallback::new(Some("application/json".to_string()), body.to_string())
    }

    fn paid_body() -> Value {
        json!({
            "appid": "201906120001",
            "out_trade_no": "PAY20250101000001",
            "transaction_id": "TXN123",
            "total_fee": "599.00",
            "status": "OD",
            "time": 1735693200,
            "nonce_str": "a1b2c3",
            "plugins": null,
        })
    }

    #[test]
    fn test_verify_paid() {
        let adapter = adapter();
        let notification = adapter.verify(&signed(&adapter, paid_body())).unwrap();

        assert_eq!(notification.gateway, Gateway::HupiPay);
        assert_eq!(notification.provider_status, ProviderStatus::Paid);
        assert_eq!(notification.transaction_id.as_deref(), Some("TXN123"));
        assert_eq!(notification.amount, Some(dec!(599.00)));
    }

    #[test]
    fn test_numbers_are_signed_as_text() {
        let fields = flatten(paid_body().to_string().as_bytes()).unwrap();
        assert_eq!(fields.get("time").map(String::as_str), Some("1735693200"));
        assert!(!fields.contains_key("plugins"));
    }

    #[test]
    fn test_tampered_status_rejected() {
        let adapter = adapter();
        let raw = signed(&adapter, paid_body());
        let mut body: Value = serde_json::from_slice(&raw.body).unwrap();
        body["status"] = json!("CD");

        let result = adapter.verify(&RawCallback::new(None, body.to_string()));
        assert_eq!(result, Err(VerificationError::BadSignature(Gateway::HupiPay)));
    }

    #[test]
    fn test_status_codes() {
        let adapter = adapter();
        for (code, expected) in [("CD", ProviderStatus::Failed), ("RD", ProviderStatus::Refunded)] {
            let mut body = paid_body();
            body["status"] = json!(code);
            let notification = adapter.verify(&signed(&adapter, body)).unwrap();
            assert_eq!(notification.provider_status, expected);
        }

        let mut body = paid_body();
        body["status"] = json!("WP");
        assert!(matches!(
            adapter.verify(&signed(&adapter, body)),
            Err(VerificationError::UnsupportedStatus { .. })
        ));
    }

    #[test]
    fn test_malformed_bodies() {
        let adapter = adapter();
        for body in ["not json", "[1,2]", r#"{"nested":{"a":1}}"#] {
            assert!(matches!(
                adapter.verify(&RawCallback::new(None, body)),
                Err(VerificationError::Malformed { .. })
            ));
        }
    }
}
