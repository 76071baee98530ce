use crate::config::AppConfig;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Checkout pricing rules: flat shipping under a threshold, flat tax rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    pub flat_shipping_cost: Decimal,
    pub free_shipping_threshold: Decimal,
    pub tax_rate: Decimal,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            flat_shipping_cost: dec!(15000),
            free_shipping_threshold: dec!(200000),
            tax_rate: dec!(0.19),
        }
    }
}

impl From<&AppConfig> for PricingPolicy {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            flat_shipping_cost: Decimal::from(cfg.flat_shipping_cost),
            free_shipping_threshold: Decimal::from(cfg.free_shipping_threshold),
            tax_rate: cfg.tax_rate_decimal(),
        }
    }
}

/// Monetary breakdown of an order; `total == subtotal + shipping + tax`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub tax_amount: Decimal,
    pub total_amount: Decimal,
}

impl PricingPolicy {
    pub fn shipping_for(&self, subtotal: Decimal) -> Decimal {
        if subtotal < self.free_shipping_threshold {
            self.flat_shipping_cost
        } else {
            Decimal::ZERO
        }
    }

    /// Tax is floored to whole currency units.
    pub fn tax_for(&self, subtotal: Decimal) -> Decimal {
        (subtotal * self.tax_rate).floor()
    }

    pub fn totals(&self, subtotal: Decimal) -> OrderTotals {
        let shipping_cost = self.shipping_for(subtotal);
        let tax_amount = self.tax_for(subtotal);
        OrderTotals {
            subtotal,
            shipping_cost,
            tax_amount,
            total_amount: subtotal + shipping_cost + tax_amount,
        }
    }
}

/// Sum of `unit_price * quantity` over snapshot lines.
pub fn subtotal<I>(lines: I) -> Decimal
where
    I: IntoIterator<Item = (Decimal, i32)>,
{
    lines
        .into_iter()
        .map(|(unit_price, quantity)| unit_price * Decimal::from(quantity))
        .sum()
}
