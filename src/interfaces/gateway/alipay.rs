use super::{
    Fields, canonical_string, check_app, check_content_type, hmac_sha256, optional, parse_amount,
    parse_order_no, required, verify_hmac,
};
use crate::domain::notification::{Gateway, Notification, ProviderStatus};
use crate::domain::ports::{GatewayAdapter, RawCallback};
use crate::error::VerificationError;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

const GATEWAY: Gateway = Gateway::Alipay;
const UNSIGNED: [&str; 2] = ["sign", "sign_type"];

/// Form-encoded asynchronous notifications; `sign` is base64 HMAC-SHA256.
pub struct AlipayAdapter {
    app_id: String,
    secret: String,
}

impl AlipayAdapter {
    pub fn new(app_id: &str, secret: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            secret: secret.to_string(),
        }
    }

    /// Signature Alipay would attach to `fields`.
    pub fn sign(&self, fields: &Fields) -> String {
        STANDARD.encode(hmac_sha256(&self.secret, &canonical_string(fields, &UNSIGNED)))
    }
}

impl GatewayAdapter for AlipayAdapter {
    fn gateway(&self) -> Gateway {
        GATEWAY
    }

    fn verify(&self, raw: &RawCallback) -> Result<Notification, VerificationError> {
        check_content_type(raw, GATEWAY, &["application/x-www-form-urlencoded"])?;
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_bytes(&raw.body).map_err(|e| VerificationError::Malformed {
                gateway: GATEWAY,
                reason: e.to_string(),
            })?;
        let fields: Fields = pairs.into_iter().collect();

        let signature = STANDARD
            .decode(required(&fields, GATEWAY, "sign")?)
            .map_err(|_| VerificationError::BadSignature(GATEWAY))?;
        if !verify_hmac(
            &self.secret,
            &canonical_string(&fields, &UNSIGNED),
            &signature,
        ) {
            return Err(VerificationError::BadSignature(GATEWAY));
        }
        check_app(GATEWAY, &self.app_id, required(&fields, GATEWAY, "app_id")?)?;

        let order_no = parse_order_no(GATEWAY, required(&fields, GATEWAY, "out_trade_no")?)?;
        let trade_status = required(&fields, GATEWAY, "trade_status")?;
        let provider_status = if optional(&fields, "gmt_refund").is_some() {
            ProviderStatus::Refunded
        } else {
            match trade_status {
                "TRADE_SUCCESS" | "TRADE_FINISHED" => ProviderStatus::Paid,
                "TRADE_CLOSED" => ProviderStatus::Failed,
                other => {
                    return Err(VerificationError::UnsupportedStatus {
                        gateway: GATEWAY,
                        status: other.to_string(),
                    });
                }
            }
        };
        let amount = optional(&fields, "total_amount")
            .map(|v| parse_amount(GATEWAY, v))
            .transpose()?;

        Ok(Notification {
            gateway: GATEWAY,
            order_no,
            provider_status,
            transaction_id: optional(&fields, "trade_no").map(str::to_string),
            amount,
            raw_status: trade_status.to_string(),
        })
    }
}
