use crate::application::PaymentServices;
use crate::domain::notification::Gateway;
use crate::domain::order::{OrderNo, PaymentMethod};
use crate::domain::ports::RawCallback;
use crate::error::PaymentError;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;
use tracing::error;

pub fn router(services: PaymentServices) -> Router {
    Router::new()
        .route("/payment/:gateway/notify/", post(notify))
        .route("/payment/create/", post(create_order))
        .route("/payment/list/", get(list_orders))
        .route("/payment/orders/:order_no/", get(get_order))
        .route("/payment/orders/:order_no/refund/", post(begin_refund))
        .layer(TraceLayer::new_for_http())
        .with_state(services)
}

impl IntoResponse for PaymentError {
    fn into_response(self) -> Response {
        let status = match &self {
            PaymentError::OrderNotFound(_) | PaymentError::EnrollmentNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            PaymentError::AlreadyPaid(_)
            | PaymentError::EnrollmentClosed { .. }
            | PaymentError::ConflictingState { .. }
            | PaymentError::InvalidTransition { .. }
            | PaymentError::DuplicateOrder(_)
            | PaymentError::ConcurrentUpdate(_) => StatusCode::CONFLICT,
            PaymentError::ValidationError(_) | PaymentError::Verification(_) => {
                StatusCode::BAD_REQUEST
            }
            _ => {
                error!(error = %self, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

/// Gateways always get HTTP 200; success or failure is in the body.
async fn notify(
    State(services): State<PaymentServices>,
    Path(gateway): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(gateway) = gateway.parse::<Gateway>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let outcome = services
        .callbacks
        .handle(gateway, RawCallback::new(content_type, body.to_vec()))
        .await;
    let ack = outcome.acknowledgement;
    ([(header::CONTENT_TYPE, ack.content_type)], ack.body).into_response()
}

#[derive(Debug, Deserialize)]
struct CreateOrderParams {
    enrollment_id: u64,
    payment_method: PaymentMethod,
}

async fn create_order(
    State(services): State<PaymentServices>,
    Query(params): Query<CreateOrderParams>,
) -> Result<Response, PaymentError> {
    let order = services
        .checkout
        .open_order(params.enrollment_id, params.payment_method)
        .await?;
    Ok(Json(order).into_response())
}

async fn list_orders(State(services): State<PaymentServices>) -> Result<Response, PaymentError> {
    let orders = services.orders.get_all().await?;
    Ok(Json(orders).into_response())
}

async fn get_order(
    State(services): State<PaymentServices>,
    Path(order_no): Path<String>,
) -> Result<Response, PaymentError> {
    let order_no = OrderNo::new(order_no)?;
    let order = services
        .orders
        .get(&order_no)
        .await?
        .ok_or(PaymentError::OrderNotFound(order_no))?;
    Ok(Json(order).into_response())
}

async fn begin_refund(
    State(services): State<PaymentServices>,
    Path(order_no): Path<String>,
) -> Result<Response, PaymentError> {
    let order_no = OrderNo::new(order_no)?;
    services.engine.begin_refund(&order_no).await?;
    let order = services
        .orders
        .get(&order_no)
        .await?
        .ok_or(PaymentError::OrderNotFound(order_no))?;
    Ok(Json(order).into_response())
}
