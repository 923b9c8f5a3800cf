use super::{
    Fields, canonical_string, check_app, check_content_type, hmac_sha256, optional,
    parse_order_no, required, verify_hmac,
};
use crate::domain::notification::{Gateway, Notification, ProviderStatus};
use crate::domain::ports::{GatewayAdapter, RawCallback};
use crate::error::VerificationError;
use quick_xml::events::Event;
use quick_xml::reader::Reader;
use rust_decimal::Decimal;

const GATEWAY: Gateway = Gateway::Wechat;
const UNSIGNED: [&str; 1] = ["sign"];

/// XML notifications signed HMAC-SHA256 with the API key appended as `&key=`.
pub struct WechatAdapter {
    app_id: String,
    mch_id: String,
    api_key: String,
}

impl WechatAdapter {
    pub fn new(app_id: &str, mch_id: &str, api_key: &str) -> Self {
        Self {
            app_id: app_id.to_string(),
            mch_id: mch_id.to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn signing_string(&self, fields: &Fields) -> String {
        format!("{}&key={}", canonical_string(fields, &UNSIGNED), self.api_key)
    }

    /// Uppercase hex signature WeChat Pay would attach to `fields`.
    pub fn sign(&self, fields: &Fields) -> String {
        hex::encode_upper(hmac_sha256(&self.api_key, &self.signing_string(fields)))
    }

    /// Renders `fields` as a WeChat `<xml>` envelope.
    pub fn to_xml(fields: &Fields) -> String {
        let mut xml = String::from("<xml>");
        for (k, v) in fields {
            xml.push_str(&format!("<{k}><![CDATA[{v}]]></{k}>"));
        }
        xml.push_str("</xml>");
        xml
    }
}

/// Flattens `<xml><k>v</k>...</xml>`, accepting plain text or CDATA values.
fn parse_xml(body: &[u8]) -> Result<Fields, VerificationError> {
    let malformed = |reason: String| VerificationError::Malformed {
        gateway: GATEWAY,
        reason,
    };
    let text = std::str::from_utf8(body).map_err(|e| malformed(e.to_string()))?;

    let mut reader = Reader::from_str(text);
    reader.trim_text(true);

    let mut fields = Fields::new();
    let mut current: Option<String> = None;
    let mut saw_root = false;
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                if !saw_root {
                    if name != "xml" {
                        return Err(malformed(format!("unexpected root <{name}>")));
                    }
                    saw_root = true;
                } else {
                    current = Some(name);
                }
            }
            Ok(Event::Text(t)) => {
                if let Some(key) = &current {
                    let value = t.unescape().map_err(|e| malformed(e.to_string()))?;
                    fields.insert(key.clone(), value.into_owned());
                }
            }
            Ok(Event::CData(c)) => {
                if let Some(key) = &current {
                    let value = String::from_utf8_lossy(&c.into_inner()).into_owned();
                    fields.insert(key.clone(), value);
                }
            }
            Ok(Event::End(_)) => current = None,
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(malformed(e.to_string())),
        }
    }

    if !saw_root {
        return Err(malformed("missing <xml> root".to_string()));
    }
    Ok(fields)
}

impl GatewayAdapter for WechatAdapter {
    fn gateway(&self) -> Gateway {
        GATEWAY
    }

    fn verify(&self, raw: &RawCallback) -> Result<Notification, VerificationError> {
        check_content_type(raw, GATEWAY, &["text/xml", "application/xml"])?;
        let fields = parse_xml(&raw.body)?;

        let return_code = required(&fields, GATEWAY, "return_code")?;
        if return_code != "SUCCESS" {
            return Err(VerificationError::UnsupportedStatus {
                gateway: GATEWAY,
                status: format!("return_code={return_code}"),
            });
        }

        let signature = hex::decode(required(&fields, GATEWAY, "sign")?)
            .map_err(|_| VerificationError::BadSignature(GATEWAY))?;
        if !verify_hmac(&self.api_key, &self.signing_string(&fields), &signature) {
            return Err(VerificationError::BadSignature(GATEWAY));
        }
        check_app(GATEWAY, &self.app_id, required(&fields, GATEWAY, "appid")?)?;
        check_app(GATEWAY, &self.mch_id, required(&fields, GATEWAY, "mch_id")?)?;

        let order_no = parse_order_no(GATEWAY, required(&fields, GATEWAY, "out_trade_no")?)?;
        let result_code = required(&fields, GATEWAY, "result_code")?;
        let provider_status = if optional(&fields, "refund_status") == Some("SUCCESS") {
            ProviderStatus::Refunded
        } else {
            match result_code {
                "SUCCESS" => ProviderStatus::Paid,
                "FAIL" => ProviderStatus::Failed,
                other => {
                    return Err(VerificationError::UnsupportedStatus {
                        gateway: GATEWAY,
                        status: other.to_string(),
                    });
                }
            }
        };

        // total_fee is an integer number of fen.
        let amount = optional(&fields, "total_fee")
            .map(|fee| {
                fee.parse::<i64>()
                    .map(|fen| Decimal::new(fen, 2))
                    .map_err(|e| VerificationError::Malformed {
                        gateway: GATEWAY,
                        reason: format!("total_fee `{fee}`: {e}"),
                    })
            })
            .transpose()?;

        Ok(Notification {
            gateway: GATEWAY,
            order_no,
            provider_status,
            transaction_id: optional(&fields, "transaction_id").map(str::to_string),
            amount,
            raw_status: result_code.to_string(),
        })
    }
}
