//! Order business logic as a Tower service.
//!
//! The processor answers with the price that should enter the aggregate.
//! Price validation happens in the consumer before the service is called.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use orderflow_core::{Order, ProcessingError};
use tower::Service;

/// Boxed future returned by processing services.
pub type ProcessingFuture = Pin<Box<dyn Future<Output = Result<f64, ProcessingError>> + Send>>;

/// Product marker that simulates a temporary failure.
pub const FAIL_TEMP: &str = "fail_temp";
/// Alternate spelling of [`FAIL_TEMP`] accepted by older producers.
pub const FAIL_TEMP_ALT: &str = "fail-temp";
/// Product marker that simulates a permanent failure.
pub const FAIL_PERM: &str = "fail_perm";

/// Applies the order business rules.
///
/// Product names are matched case-insensitively against the failure markers:
/// - `fail_temp` / `fail-temp` fail with [`ProcessingError::Transient`]
/// - `fail_perm` fails with [`ProcessingError::Rejected`]
/// - a blank product fails with [`ProcessingError::UnrecognizedProduct`]
///
/// # Errors
///
/// Returns the rule violation or simulated failure described above.
pub fn process_order(order: &Order) -> Result<f64, ProcessingError> {
    let product = order.product.trim();

    if product.is_empty() {
        return Err(ProcessingError::UnrecognizedProduct {
            product: order.product.clone(),
        });
    }
    if product.eq_ignore_ascii_case(FAIL_TEMP) || product.eq_ignore_ascii_case(FAIL_TEMP_ALT) {
        return Err(ProcessingError::Transient {
            reason: "temporary processing error".to_string(),
        });
    }
    if product.eq_ignore_ascii_case(FAIL_PERM) {
        return Err(ProcessingError::Rejected {
            reason: "permanent bad data".to_string(),
        });
    }

    Ok(order.price)
}

/// Stateless processing service running [`process_order`].
#[derive(Debug, Clone, Copy, Default)]
pub struct OrderProcessor;

impl Service<Order> for OrderProcessor {
    type Response = f64;
    type Error = ProcessingError;
    type Future = ProcessingFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, order: Order) -> Self::Future {
        let result = process_order(&order);
        Box::pin(async move { result })
    }
}
