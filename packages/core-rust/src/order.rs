//! Order events flowing through the pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ProcessingError;

/// Opaque order identifier. Also used as the broker record key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Wraps an existing identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh random (UUID v4) identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single order record.
///
/// Immutable once created: pipeline stages forward or wrap it, never edit it.
/// The JSON shape (`orderId`, `product`, `price`) matches what producers
/// publish to the orders topic. Input without an `orderId` gets a generated one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default = "OrderId::generate")]
    pub order_id: OrderId,
    pub product: String,
    pub price: f64,
}

impl Order {
    #[must_use]
    pub fn new(order_id: impl Into<OrderId>, product: impl Into<String>, price: f64) -> Self {
        Self {
            order_id: order_id.into(),
            product: product.into(),
            price,
        }
    }

    /// Returns the price if it may enter the aggregate.
    ///
    /// A price is accepted only when it is finite and not negative (`-0.0`
    /// counts as zero).
    ///
    /// # Errors
    ///
    /// Returns [`ProcessingError::InvalidPrice`] for NaN, infinite, or
    /// negative prices.
    pub fn validated_price(&self) -> Result<f64, ProcessingError> {
        if self.price.is_finite() && self.price >= 0.0 {
            Ok(self.price)
        } else {
            Err(ProcessingError::InvalidPrice { price: self.price })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_shape_is_camel_case() {
        let order = Order::new("o-1", "widget", 12.5);
        let json = serde_json::to_value(&order).unwrap();
        assert_eq!(json["orderId"], "o-1");
        assert_eq!(json["product"], "widget");
        assert_eq!(json["price"], 12.5);
    }

    #[test]
    fn parses_producer_json() {
        let order: Order =
            serde_json::from_str(r#"{"orderId":"abc","product":"fail_temp","price":3.0}"#)
                .unwrap();
        assert_eq!(order.order_id.as_str(), "abc");
        assert_eq!(order.product, "fail_temp");
    }

    #[test]
    fn valid_prices_pass() {
        assert_eq!(Order::new("a", "p", 0.0).validated_price(), Ok(0.0));
        assert_eq!(Order::new("a", "p", -0.0).validated_price(), Ok(-0.0));
        assert_eq!(Order::new("a", "p", 19.99).validated_price(), Ok(19.99));
    }

    #[test]
    fn negative_price_rejected() {
        let err = Order::new("a", "p", -5.0).validated_price().unwrap_err();
        assert!(matches!(err, ProcessingError::InvalidPrice { price } if price == -5.0));
    }

    #[test]
    fn non_finite_prices_rejected() {
        assert!(Order::new("a", "p", f64::NAN).validated_price().is_err());
        assert!(Order::new("a", "p", f64::INFINITY).validated_price().is_err());
        assert!(Order::new("a", "p", f64::NEG_INFINITY).validated_price().is_err());
    }

    #[test]
    fn generated_ids_are_distinct() {
        assert_ne!(OrderId::generate(), OrderId::generate());
    }

    #[test]
    fn missing_order_id_is_generated() {
        let a: Order = serde_json::from_str(r#"{"product":"widget","price":1.0}"#).unwrap();
        let b: Order = serde_json::from_str(r#"{"product":"widget","price":1.0}"#).unwrap();
        assert_eq!(a.order_id.as_str().len(), 36);
        assert_ne!(a.order_id, b.order_id);
    }
}
