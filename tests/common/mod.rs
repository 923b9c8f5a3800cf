#![allow(dead_code)]

use rust_decimal::Decimal;
use std::io::Write;
use std::sync::Arc;
use studiopay::application::PaymentServices;
use studiopay::domain::enrollment::Enrollment;
use studiopay::domain::order::{Amount, Order, OrderNo, PaymentMethod};
use studiopay::domain::ports::{EnrollmentStoreHandle, OrderStoreHandle};
use studiopay::infrastructure::in_memory::{InMemoryEnrollmentStore, InMemoryOrderStore};
use studiopay::interfaces::gateway::{
    AlipayAdapter, Fields, GatewayRegistry, HupiPayAdapter, WechatAdapter,
};
use tempfile::NamedTempFile;

pub const ALIPAY_APP_ID: &str = "2021000000000001";
pub const ALIPAY_SECRET: &str = "alipay-secret";
pub const WECHAT_APP_ID: &str = "wx0000000000000001";
pub const WECHAT_MCH_ID: &str = "1900000109";
pub const WECHAT_API_KEY: &str = "wechat-api-key";
pub const HUPI_APP_ID: &str = "201906120001";
pub const HUPI_SECRET: &str = "hupi-secret";

pub const FORM: &str = "application/x-www-form-urlencoded";
pub const XML: &str = "text/xml";
pub const JSON: &str = "application/json";

pub fn fields(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Signed Alipay form body. `app_id` is filled in unless given.
pub fn alipay_body(pairs: &[(&str, &str)]) -> String {
    let mut fields = fields(pairs);
    fields
        .entry("app_id".to_string())
        .or_insert_with(|| ALIPAY_APP_ID.to_string());
    let sign = AlipayAdapter::new(ALIPAY_APP_ID, ALIPAY_SECRET).sign(&fields);
    fields.insert("sign".to_string(), sign);
    fields.insert("sign_type".to_string(), "HMAC-SHA256".to_string());
    serde_urlencoded::to_string(&fields).unwrap()
}

/// Signed WeChat XML body with `return_code`, `appid` and `mch_id` filled in.
pub fn wechat_body(pairs: &[(&str, &str)]) -> String {
    let mut fields = fields(pairs);
    for (k, v) in [
        ("return_code", "SUCCESS"),
        ("appid", WECHAT_APP_ID),
        ("mch_id", WECHAT_MCH_ID),
        ("nonce_str", "5K8264ILTKCH16CQ"),
    ] {
        fields.entry(k.to_string()).or_insert_with(|| v.to_string());
    }
    let sign = WechatAdapter::new(WECHAT_APP_ID, WECHAT_MCH_ID, WECHAT_API_KEY).sign(&fields);
    fields.insert("sign".to_string(), sign);
    WechatAdapter::to_xml(&fields)
}

/// Signed HuPiPay JSON body with `appid` filled in.
pub fn hupipay_body(pairs: &[(&str, &str)]) -> String {
    let mut fields = fields(pairs);
    fields
        .entry("appid".to_string())
        .or_insert_with(|| HUPI_APP_ID.to_string());
    let hash = HupiPayAdapter::new(HUPI_APP_ID, HUPI_SECRET).sign(&fields);
    fields.insert("hash".to_string(), hash);
    serde_json::to_string(&fields).unwrap()
}

/// One line of a recorded-callbacks file.
pub fn callback_line(gateway: &str, content_type: &str, body: &str) -> String {
    serde_json::json!({
        "gateway": gateway,
        "content_type": content_type,
        "body": body,
    })
    .to_string()
}

pub fn registry() -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    registry.register(Box::new(AlipayAdapter::new(ALIPAY_APP_ID, ALIPAY_SECRET)));
    registry.register(Box::new(WechatAdapter::new(
        WECHAT_APP_ID,
        WECHAT_MCH_ID,
        WECHAT_API_KEY,
    )));
    registry.register(Box::new(HupiPayAdapter::new(HUPI_APP_ID, HUPI_SECRET)));
    registry
}

pub fn in_memory_services() -> PaymentServices {
    let orders: OrderStoreHandle = Arc::new(InMemoryOrderStore::new());
    let enrollments: EnrollmentStoreHandle = Arc::new(InMemoryEnrollmentStore::new());
    PaymentServices::new(orders, enrollments, registry())
}

/// Inserts a pending order and, when `enrollment` is given, an enrollment pointing at it.
pub async fn seed_order(
    services: &PaymentServices,
    order_no: &str,
    amount: Decimal,
    method: PaymentMethod,
    enrollment: Option<u64>,
) {
    let order_no = OrderNo::new(order_no).unwrap();
    services
        .orders
        .insert(Order::new(
            order_no.clone(),
            Amount::new(amount).unwrap(),
            method,
            chrono::Utc::now(),
        ))
        .await
        .unwrap();
    if let Some(id) = enrollment {
        let mut enrollment = Enrollment::new(id, amount);
        enrollment.order_no = Some(order_no);
        services.enrollments.store(enrollment).await.unwrap();
    }
}

pub async fn order(services: &PaymentServices, order_no: &str) -> Order {
    services
        .orders
        .get(&OrderNo::new(order_no).unwrap())
        .await
        .unwrap()
        .unwrap()
}

pub fn write_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{contents}").unwrap();
    file
}

/// Settings file with credentials for all three gateways.
pub fn write_config() -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    write!(
        file,
        r#"
[gateways.alipay]
app_id = "{ALIPAY_APP_ID}"
secret = "{ALIPAY_SECRET}"

[gateways.wechat]
app_id = "{WECHAT_APP_ID}"
mch_id = "{WECHAT_MCH_ID}"
api_key = "{WECHAT_API_KEY}"

[gateways.hupipay]
app_id = "{HUPI_APP_ID}"
app_secret = "{HUPI_SECRET}"
"#
    )
    .unwrap();
    file
}
