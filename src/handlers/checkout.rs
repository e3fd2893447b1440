use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};

use crate::services::checkout::{
    BeginCheckoutRequest, CheckoutResponse, VerifyPaymentRequest, VerifyPaymentResponse,
};
use crate::{ApiResponse, ApiResult, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/checkout/orders", post(begin))
        .route("/checkout/verify", post(verify))
}

/// Creates a provider order plus a pending local order for the cart.
async fn begin(
    State(state): State<AppState>,
    Json(request): Json<BeginCheckoutRequest>,
) -> ApiResult<CheckoutResponse> {
    let response = state.services.checkout.begin(request).await?;
    Ok(Json(ApiResponse::success(response)))
}

/// Verifies the payment signature and completes the order.
async fn verify(
    State(state): State<AppState>,
    Json(request): Json<VerifyPaymentRequest>,
) -> ApiResult<VerifyPaymentResponse> {
    let response = state.services.checkout.verify_and_complete(request).await?;
    Ok(Json(ApiResponse::success(response)))
}
