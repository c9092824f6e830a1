//! Checkout sessions created by the payments edge function

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::functions::{FunctionInvokeOptions, FunctionsClient};

/// Name of the edge function creating checkout sessions
pub const CREATE_PAYMENT_SESSION: &str = "create-payment-session";

/// A fee to collect from a guardian
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRequest {
    /// Amount in the currency's minor unit
    pub amount: i64,
    pub currency: String,
    pub description: String,
    pub parent_id: String,
}

/// Checkout session returned by the function
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentSession {
    #[serde(alias = "sessionId")]
    pub session_id: String,
    #[serde(default)]
    pub url: Option<String>,
}

/// Create a checkout session for `request`, authorized as the signed-in user
pub async fn create_payment_session(
    functions: &FunctionsClient,
    access_token: &str,
    request: &PaymentRequest,
) -> Result<PaymentSession> {
    if request.amount <= 0 {
        return Err(Error::validation("amount must be positive"));
    }
    if request.currency.trim().is_empty() {
        return Err(Error::validation("currency is required"));
    }
    if request.parent_id.trim().is_empty() {
        return Err(Error::validation("parent is required"));
    }

    let options = FunctionInvokeOptions::new()
        .with_body(request)
        .with_authorization(access_token);
    let session: PaymentSession = functions.invoke(CREATE_PAYMENT_SESSION, &options).await?;

    info!(session_id = %session.session_id, parent_id = %request.parent_id, "payment session created");
    Ok(session)
}
