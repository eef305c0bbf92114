//! Order lifecycle rules and checkout validation.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of wilayas (provinces) accepted in shipping addresses.
pub const WILAYA_COUNT: i16 = 58;

const ORDER_SUFFIX_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const ORDER_SUFFIX_LEN: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// # Errors
    ///
    /// Returns [`OrderError::InvalidStatus`] for unknown status strings.
    pub fn parse(value: &str) -> Result<Self, OrderError> {
        match value {
            "pending" => Ok(OrderStatus::Pending),
            "confirmed" => Ok(OrderStatus::Confirmed),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(OrderError::InvalidStatus(other.to_string())),
        }
    }

    #[must_use]
    pub fn can_transition_to(self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Confirmed | OrderStatus::Cancelled)
                | (OrderStatus::Confirmed, OrderStatus::Shipped | OrderStatus::Cancelled)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
        )
    }

    /// Validate a transition, returning the new status.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::InvalidTransition`] when `next` is not reachable.
    pub fn transition(self, next: OrderStatus) -> Result<OrderStatus, OrderError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(OrderError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("unknown order status '{0}'")]
    InvalidStatus(String),
    #[error("cannot move order from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },
    #[error("{0}")]
    Validation(String),
    #[error("cart is empty")]
    EmptyCart,
}

/// Shipping and contact details submitted at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutDetails {
    pub customer_name: String,
    pub phone: String,
    pub email: Option<String>,
    pub wilaya: i16,
    pub city: String,
    pub address_line: String,
    pub notes: Option<String>,
}

impl CheckoutDetails {
    /// Trim and validate the details, normalizing the phone number to the
    /// national `0XXXXXXXXX` form.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::Validation`] naming the first invalid field.
    pub fn normalized(self) -> Result<Self, OrderError> {
        let customer_name = self.customer_name.trim().to_string();
        if customer_name.is_empty() || customer_name.len() > 120 {
            return Err(OrderError::Validation(
                "customer_name must be 1-120 characters".to_string(),
            ));
        }

        let phone = normalize_phone(&self.phone).ok_or_else(|| {
            OrderError::Validation(format!(
                "phone must be an Algerian mobile number, got '{}'",
                self.phone
            ))
        })?;

        if !(1..=WILAYA_COUNT).contains(&self.wilaya) {
            return Err(OrderError::Validation(format!(
                "wilaya must be between 1 and {WILAYA_COUNT}, got {}",
                self.wilaya
            )));
        }

        let city = self.city.trim().to_string();
        if city.is_empty() {
            return Err(OrderError::Validation("city is required".to_string()));
        }
        let address_line = self.address_line.trim().to_string();
        if address_line.is_empty() {
            return Err(OrderError::Validation("address_line is required".to_string()));
        }

        let email = self
            .email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());
        if let Some(ref e) = email {
            if !looks_like_email(e) {
                return Err(OrderError::Validation(format!("invalid email '{e}'")));
            }
        }

        Ok(Self {
            customer_name,
            phone,
            email,
            wilaya: self.wilaya,
            city,
            address_line,
            notes: self
                .notes
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty()),
        })
    }
}

/// Accepts `05/06/07XXXXXXXX` or `+213 5/6/7XXXXXXXX` with optional spaces,
/// dots, or dashes.
#[must_use]
pub fn normalize_phone(raw: &str) -> Option<String> {
    let compact: String = raw
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.'))
        .collect();

    let national = if let Some(rest) = compact.strip_prefix("+213") {
        format!("0{rest}")
    } else if let Some(rest) = compact.strip_prefix("00213") {
        format!("0{rest}")
    } else {
        compact
    };

    let bytes = national.as_bytes();
    let valid = bytes.len() == 10
        && bytes[0] == b'0'
        && matches!(bytes[1], b'5' | b'6' | b'7')
        && bytes.iter().all(u8::is_ascii_digit);
    valid.then_some(national)
}

/// Minimal shape check; deliverability is not verified.
#[must_use]
pub fn looks_like_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !value.contains(char::is_whitespace)
}

/// Human-facing order reference, e.g. `DZ-20261016-K7QX2M`.
#[must_use]
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..ORDER_SUFFIX_LEN)
        .map(|_| {
            let idx = rng.random_range(0..ORDER_SUFFIX_ALPHABET.len());
            char::from(ORDER_SUFFIX_ALPHABET[idx])
        })
        .collect();
    format!("DZ-{}-{suffix}", now.format("%Y%m%d"))
}
