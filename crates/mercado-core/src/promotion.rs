//! # Promotion Rule Engine
//!
//! Pure evaluation of promotions and manual discounts against a frozen cart
//! snapshot. Nothing here reads live catalog state, so one checkout always
//! sees one consistent price set.
//!
//! ## Evaluation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Promotion Evaluation                                │
//! │                                                                         │
//! │  promotions ──► is_active_at(now)     date range, ISO weekday, hours   │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │               ordered: priority ↓, created_at ↓, id ↑                   │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │  cart ──────► rule.applies_to(cart)   per-variant condition            │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │               rule.applicable_subtotal(cart)                            │
//! │                 General  → whole cart                                  │
//! │                 Combo    → required lines, clamped to required qty      │
//! │                 Quantity → matched product lines, or whole cart         │
//! │                     │                                                   │
//! │                     ▼                                                   │
//! │               shape.apply(applicable)                                   │
//! │                 Percentage  → applicable × rate (half-up)               │
//! │                 FixedAmount → min(amount, applicable)                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::{DiscountRate, Money};
use crate::types::{cart_quantity_of, cart_subtotal, CartLine};
use crate::validation::{require_text, validate_positive_quantity, ValidationResult};

// =============================================================================
// Rules
// =============================================================================

/// Storage tag for a promotion's rule variant.
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "snake_case"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PromotionKind {
    GeneralDiscount,
    Combo,
    QuantityDiscount,
}

/// One product a combo requires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ComboRequirement {
    pub product_id: String,
    pub min_quantity: f64,
}

/// The condition a cart must meet, and which part of it gets discounted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum PromotionRule {
    /// Whole-cart discount once the subtotal reaches `min_purchase`.
    GeneralDiscount {
        #[serde(default)]
        min_purchase: Option<Money>,
    },
    /// Every required product at its minimum quantity, simultaneously.
    Combo { required: Vec<ComboRequirement> },
    /// A single product (or, without one, the whole cart) reaching a quantity.
    QuantityDiscount {
        #[serde(default)]
        product_id: Option<String>,
        min_quantity: f64,
    },
}

impl PromotionRule {
    pub fn kind(&self) -> PromotionKind {
        match self {
            PromotionRule::GeneralDiscount { .. } => PromotionKind::GeneralDiscount,
            PromotionRule::Combo { .. } => PromotionKind::Combo,
            PromotionRule::QuantityDiscount { .. } => PromotionKind::QuantityDiscount,
        }
    }

    /// Checks the condition payload itself.
    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            PromotionRule::GeneralDiscount { min_purchase } => {
                if min_purchase.is_some_and(|m| m.is_negative()) {
                    return Err(ValidationError::MustNotBeNegative {
                        field: "min_purchase".to_string(),
                    });
                }
            }
            PromotionRule::Combo { required } => {
                if required.is_empty() {
                    return Err(ValidationError::Required {
                        field: "combo products".to_string(),
                    });
                }
                for req in required {
                    require_text("combo product_id", &req.product_id)?;
                    validate_positive_quantity("combo min_quantity", req.min_quantity)?;
                }
            }
            PromotionRule::QuantityDiscount { product_id, min_quantity } => {
                if let Some(id) = product_id {
                    require_text("product_id", id)?;
                }
                validate_positive_quantity("min_quantity", *min_quantity)?;
            }
        }
        Ok(())
    }

    /// Whether the cart satisfies this rule's condition.
    pub fn applies_to(&self, cart: &[CartLine]) -> bool {
        match self {
            PromotionRule::GeneralDiscount { min_purchase } => match min_purchase {
                Some(min) => cart_subtotal(cart) >= *min,
                None => true,
            },
            PromotionRule::Combo { required } => {
                !required.is_empty()
                    && required
                        .iter()
                        .all(|req| cart_quantity_of(cart, &req.product_id) >= req.min_quantity)
            }
            PromotionRule::QuantityDiscount { product_id, min_quantity } => {
                let quantity = match product_id {
                    Some(id) => cart_quantity_of(cart, id),
                    None => cart.iter().map(|l| l.quantity).sum(),
                };
                quantity >= *min_quantity
            }
        }
    }

    /// The portion of the cart this rule is allowed to discount.
    pub fn applicable_subtotal(&self, cart: &[CartLine]) -> Money {
        match self {
            PromotionRule::GeneralDiscount { .. } => cart_subtotal(cart),
            PromotionRule::Combo { required } => required
                .iter()
                .filter_map(|req| {
                    let line = cart.iter().find(|l| l.product_id == req.product_id)?;
                    let in_cart = cart_quantity_of(cart, &req.product_id);
                    Some(line.unit_price.times_quantity(in_cart.min(req.min_quantity)))
                })
                .sum(),
            PromotionRule::QuantityDiscount { product_id, .. } => match product_id {
                Some(id) => cart
                    .iter()
                    .filter(|l| &l.product_id == id)
                    .map(CartLine::line_subtotal)
                    .sum(),
                None => cart_subtotal(cart),
            },
        }
    }

    /// Which cart products the rule touches, for display.
    pub fn affected(&self, cart: &[CartLine]) -> Vec<AffectedProduct> {
        let whole_cart = || {
            let mut seen: Vec<AffectedProduct> = Vec::new();
            for line in cart {
                if seen.iter().any(|a| a.product_id == line.product_id) {
                    continue;
                }
                let quantity = cart_quantity_of(cart, &line.product_id);
                seen.push(AffectedProduct {
                    product_id: line.product_id.clone(),
                    title: line.title.clone(),
                    quantity_in_cart: quantity,
                    discounted_quantity: quantity,
                });
            }
            seen
        };

        match self {
            PromotionRule::GeneralDiscount { .. } => whole_cart(),
            PromotionRule::QuantityDiscount { product_id: None, .. } => whole_cart(),
            PromotionRule::QuantityDiscount { product_id: Some(id), .. } => cart
                .iter()
                .find(|l| &l.product_id == id)
                .map(|line| {
                    let quantity = cart_quantity_of(cart, id);
                    vec![AffectedProduct {
                        product_id: id.clone(),
                        title: line.title.clone(),
                        quantity_in_cart: quantity,
                        discounted_quantity: quantity,
                    }]
                })
                .unwrap_or_default(),
            PromotionRule::Combo { required } => required
                .iter()
                .filter_map(|req| {
                    let line = cart.iter().find(|l| l.product_id == req.product_id)?;
                    let quantity = cart_quantity_of(cart, &req.product_id);
                    Some(AffectedProduct {
                        product_id: req.product_id.clone(),
                        title: line.title.clone(),
                        quantity_in_cart: quantity,
                        discounted_quantity: quantity.min(req.min_quantity),
                    })
                })
                .collect(),
        }
    }
}

/// The shape of a promotion's discount.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
#[ts(export)]
pub enum DiscountShape {
    Percentage(DiscountRate),
    FixedAmount(Money),
}

impl DiscountShape {
    /// Discount for a given applicable subtotal. Never exceeds it.
    pub fn apply(&self, applicable: Money) -> Money {
        let amount = match *self {
            DiscountShape::Percentage(rate) => applicable.percentage_of(rate),
            DiscountShape::FixedAmount(amount) => amount.min(applicable),
        };
        amount.non_negative()
    }

    pub fn validate(&self) -> ValidationResult<()> {
        match self {
            DiscountShape::Percentage(rate) if rate.is_zero() => Err(ValidationError::MustBePositive {
                field: "discount percentage".to_string(),
            }),
            DiscountShape::FixedAmount(amount) if !amount.is_positive() => {
                Err(ValidationError::MustBePositive {
                    field: "discount amount".to_string(),
                })
            }
            _ => Ok(()),
        }
    }
}

// =============================================================================
// Activity Window
// =============================================================================

/// When a promotion may apply. Every unset bound is unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ActivityWindow {
    #[ts(as = "Option<String>")]
    pub start_date: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub end_date: Option<NaiveDate>,
    /// ISO weekdays, 1 = Monday … 7 = Sunday. Empty means every day.
    #[serde(default)]
    pub weekdays: Vec<u8>,
    #[ts(as = "Option<String>")]
    pub hour_start: Option<NaiveTime>,
    #[ts(as = "Option<String>")]
    pub hour_end: Option<NaiveTime>,
}

impl ActivityWindow {
    pub fn validate(&self) -> ValidationResult<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(ValidationError::InvalidFormat {
                    field: "end_date".to_string(),
                    reason: "must not be before start_date".to_string(),
                });
            }
        }
        if self.weekdays.iter().any(|d| !(1..=7).contains(d)) {
            return Err(ValidationError::OutOfRange {
                field: "weekdays".to_string(),
                min: 1,
                max: 7,
            });
        }
        Ok(())
    }

    /// Whether local wall-clock time `now` falls inside the window.
    ///
    /// A time range whose start is after its end wraps past midnight.
    pub fn contains(&self, now: NaiveDateTime) -> bool {
        let today = now.date();
        if self.start_date.is_some_and(|start| today < start) {
            return false;
        }
        if self.end_date.is_some_and(|end| today > end) {
            return false;
        }

        let weekday = now.weekday().number_from_monday() as u8;
        if !self.weekdays.is_empty() && !self.weekdays.contains(&weekday) {
            return false;
        }

        let time = now.time();
        match (self.hour_start, self.hour_end) {
            (Some(start), Some(end)) if start <= end => start <= time && time <= end,
            (Some(start), Some(end)) => time >= start || time <= end,
            (Some(start), None) => time >= start,
            (None, Some(end)) => time <= end,
            (None, None) => true,
        }
    }
}

// =============================================================================
// Promotion
// =============================================================================

/// A named catalog promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Promotion {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub rule: PromotionRule,
    pub discount: DiscountShape,
    pub window: ActivityWindow,
    pub is_active: bool,
    pub max_uses_per_day: Option<u32>,
    /// Higher priorities are evaluated first.
    pub priority: i32,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// The result of evaluating one promotion against a cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Discount {
    pub promotion_id: String,
    pub amount: Money,
    pub applicable_subtotal: Money,
}

/// A cart product touched by a promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct AffectedProduct {
    pub product_id: String,
    pub title: String,
    pub quantity_in_cart: f64,
    /// Units the discount acts on (clamped for combos).
    pub discounted_quantity: f64,
}

/// A promotion that currently applies to a cart, with its estimated effect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ApplicablePromotion {
    pub promotion_id: String,
    pub name: String,
    pub kind: PromotionKind,
    pub priority: i32,
    pub estimated_discount: Money,
    pub affected: Vec<AffectedProduct>,
}

impl Promotion {
    pub fn kind(&self) -> PromotionKind {
        self.rule.kind()
    }

    /// Active flag plus date, weekday and time-of-day window.
    pub fn is_active_at(&self, now: NaiveDateTime) -> bool {
        self.is_active && self.window.contains(now)
    }

    /// Whether another use fits under the daily cap.
    pub fn has_capacity(&self, uses_today: u32) -> bool {
        self.max_uses_per_day.map_or(true, |limit| uses_today < limit)
    }

    pub fn applicable_conditions(&self, cart: &[CartLine]) -> bool {
        self.rule.applies_to(cart)
    }

    /// Discount this promotion grants on `cart`, ignoring its condition.
    pub fn discount_amount(&self, cart: &[CartLine]) -> Money {
        self.discount.apply(self.rule.applicable_subtotal(cart))
    }

    pub fn affected_products(&self, cart: &[CartLine]) -> Vec<AffectedProduct> {
        self.rule.affected(cart)
    }

    /// Condition check and discount in one step.
    ///
    /// Returns `None` when the condition fails or the discount is zero.
    pub fn evaluate(&self, cart: &[CartLine]) -> Option<Discount> {
        if !self.applicable_conditions(cart) {
            return None;
        }
        let applicable_subtotal = self.rule.applicable_subtotal(cart);
        let amount = self.discount.apply(applicable_subtotal);
        if amount.is_zero() {
            return None;
        }
        Some(Discount {
            promotion_id: self.id.clone(),
            amount,
            applicable_subtotal,
        })
    }

    pub fn validate(&self) -> ValidationResult<()> {
        require_text("name", &self.name)?;
        self.rule.validate()?;
        self.discount.validate()?;
        self.window.validate()?;
        if self.max_uses_per_day == Some(0) {
            return Err(ValidationError::MustBePositive {
                field: "max_uses_per_day".to_string(),
            });
        }
        Ok(())
    }
}

/// Evaluation order: priority descending, then newest first, then id.
pub fn evaluation_order(a: &Promotion, b: &Promotion) -> Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Promotions active at `now`, in evaluation order.
pub fn active_promotions(promotions: &[Promotion], now: NaiveDateTime) -> Vec<&Promotion> {
    let mut active: Vec<&Promotion> = promotions.iter().filter(|p| p.is_active_at(now)).collect();
    active.sort_by(|a, b| evaluation_order(a, b));
    active
}

/// Promotions that are active at `now` and discount something in `cart`.
pub fn applicable_promotions(
    promotions: &[Promotion],
    cart: &[CartLine],
    now: NaiveDateTime,
) -> Vec<ApplicablePromotion> {
    active_promotions(promotions, now)
        .into_iter()
        .filter_map(|promotion| {
            let discount = promotion.evaluate(cart)?;
            Some(ApplicablePromotion {
                promotion_id: promotion.id.clone(),
                name: promotion.name.clone(),
                kind: promotion.kind(),
                priority: promotion.priority,
                estimated_discount: discount.amount,
                affected: promotion.affected_products(cart),
            })
        })
        .collect()
}

// =============================================================================
// Manual Discounts
// =============================================================================

/// A cashier-entered discount that is not tied to a catalog promotion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "type", rename_all = "snake_case")]
#[ts(export)]
pub enum ManualDiscount {
    Percentage {
        value: DiscountRate,
        #[serde(default)]
        description: Option<String>,
    },
    FixedAmount {
        value: Money,
        #[serde(default)]
        description: Option<String>,
    },
}

/// Effect of a manual discount on a given subtotal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ManualDiscountOutcome {
    pub amount: Money,
    pub total: Money,
    /// Effective percentage of the subtotal, two decimals.
    pub effective_percentage: f64,
}

impl ManualDiscount {
    /// Validates the discount against `subtotal` and computes its amount.
    ///
    /// ## Rules
    /// - Value must be greater than zero
    /// - Percentage: 0–100 (enforced by [`DiscountRate`])
    /// - Fixed amount: must not exceed the subtotal
    ///
    /// ```rust
    /// use mercado_core::money::{DiscountRate, Money};
    /// use mercado_core::promotion::ManualDiscount;
    ///
    /// let discount = ManualDiscount::Percentage {
    ///     value: DiscountRate::from_percentage(10.0).unwrap(),
    ///     description: None,
    /// };
    /// let outcome = discount.evaluate(Money::from_minor(2000)).unwrap();
    /// assert_eq!(outcome.amount.minor_units(), 200);
    /// assert_eq!(outcome.total.minor_units(), 1800);
    /// ```
    pub fn evaluate(&self, subtotal: Money) -> ValidationResult<ManualDiscountOutcome> {
        let amount = match self {
            ManualDiscount::Percentage { value, .. } => {
                if value.is_zero() {
                    return Err(ValidationError::MustBePositive {
                        field: "discount value".to_string(),
                    });
                }
                subtotal.percentage_of(*value)
            }
            ManualDiscount::FixedAmount { value, .. } => {
                if !value.is_positive() {
                    return Err(ValidationError::MustBePositive {
                        field: "discount value".to_string(),
                    });
                }
                if *value > subtotal {
                    return Err(ValidationError::DiscountExceedsSubtotal {
                        amount: value.minor_units(),
                        subtotal: subtotal.minor_units(),
                    });
                }
                *value
            }
        };

        let effective_percentage = if subtotal.is_positive() {
            let pct = amount.minor_units() as f64 * 100.0 / subtotal.minor_units() as f64;
            (pct * 100.0).round() / 100.0
        } else {
            0.0
        };

        Ok(ManualDiscountOutcome {
            amount,
            total: (subtotal - amount).non_negative(),
            effective_percentage,
        })
    }

    /// Percentage recorded on the applied-discount row, if any.
    pub fn applied_percentage(&self) -> Option<f64> {
        match self {
            ManualDiscount::Percentage { value, .. } => Some(value.percentage()),
            ManualDiscount::FixedAmount { .. } => None,
        }
    }

    pub fn description(&self) -> String {
        match self {
            ManualDiscount::Percentage { value, description } => description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| format!("Manual discount {}%", value.percentage())),
            ManualDiscount::FixedAmount { value, description } => description
                .clone()
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| format!("Manual discount {}", value)),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn line(product_id: &str, price: i64, quantity: f64) -> CartLine {
        CartLine {
            product_id: product_id.to_string(),
            title: format!("Product {product_id}"),
            unit_price: Money::from_minor(price),
            quantity,
        }
    }

    fn promotion(id: &str, rule: PromotionRule, discount: DiscountShape) -> Promotion {
        Promotion {
            id: id.to_string(),
            name: format!("Promo {id}"),
            description: None,
            rule,
            discount,
            window: ActivityWindow::default(),
            is_active: true,
            max_uses_per_day: None,
            priority: 0,
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 9, 0, 0).unwrap(),
        }
    }

    fn pct(p: f64) -> DiscountShape {
        DiscountShape::Percentage(DiscountRate::from_percentage(p).unwrap())
    }

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_general_discount_minimum_purchase() {
        let promo = promotion(
            "g",
            PromotionRule::GeneralDiscount {
                min_purchase: Some(Money::from_minor(1500)),
            },
            pct(10.0),
        );
        let cart = vec![line("A", 1000, 2.0)];

        assert!(promo.applicable_conditions(&cart));
        assert_eq!(promo.discount_amount(&cart).minor_units(), 200);

        let small = vec![line("A", 1000, 1.0)];
        assert!(!promo.applicable_conditions(&small));
        assert!(promo.evaluate(&small).is_none());
    }

    #[test]
    fn test_general_discount_without_minimum_always_applies() {
        let promo = promotion("g", PromotionRule::GeneralDiscount { min_purchase: None }, pct(5.0));
        assert!(promo.applicable_conditions(&[line("A", 100, 1.0)]));
    }

    #[test]
    fn test_combo_clamps_to_required_quantity() {
        let promo = promotion(
            "c",
            PromotionRule::Combo {
                required: vec![ComboRequirement {
                    product_id: "A".to_string(),
                    min_quantity: 2.0,
                }],
            },
            pct(100.0),
        );
        let cart = vec![line("A", 1000, 5.0), line("B", 700, 1.0)];

        assert!(promo.applicable_conditions(&cart));
        // At most 2 × 1000 even with 5 in the cart.
        assert_eq!(promo.discount_amount(&cart).minor_units(), 2000);

        let affected = promo.affected_products(&cart);
        assert_eq!(affected.len(), 1);
        assert_eq!(affected[0].quantity_in_cart, 5.0);
        assert_eq!(affected[0].discounted_quantity, 2.0);
    }

    #[test]
    fn test_combo_requires_every_product() {
        let promo = promotion(
            "c",
            PromotionRule::Combo {
                required: vec![
                    ComboRequirement {
                        product_id: "A".to_string(),
                        min_quantity: 1.0,
                    },
                    ComboRequirement {
                        product_id: "B".to_string(),
                        min_quantity: 2.0,
                    },
                ],
            },
            pct(10.0),
        );
        assert!(!promo.applicable_conditions(&[line("A", 1000, 1.0), line("B", 500, 1.0)]));
        assert!(promo.applicable_conditions(&[line("A", 1000, 1.0), line("B", 500, 1.0), line("B", 500, 1.0)]));
    }

    #[test]
    fn test_quantity_discount_specific_product() {
        let promo = promotion(
            "q",
            PromotionRule::QuantityDiscount {
                product_id: Some("A".to_string()),
                min_quantity: 3.0,
            },
            pct(10.0),
        );
        let cart = vec![line("A", 1000, 3.0), line("B", 5000, 1.0)];
        assert!(promo.applicable_conditions(&cart));
        // Only A's full line subtotal.
        assert_eq!(promo.discount_amount(&cart).minor_units(), 300);
        assert!(!promo.applicable_conditions(&[line("A", 1000, 2.0), line("B", 5000, 5.0)]));
    }

    #[test]
    fn test_quantity_discount_sums_all_lines_without_product() {
        let promo = promotion(
            "q",
            PromotionRule::QuantityDiscount {
                product_id: None,
                min_quantity: 4.0,
            },
            pct(10.0),
        );
        let cart = vec![line("A", 1000, 2.0), line("B", 500, 2.0)];
        assert!(promo.applicable_conditions(&cart));
        assert_eq!(promo.discount_amount(&cart).minor_units(), 300);
        assert!(!promo.applicable_conditions(&[line("A", 1000, 3.0)]));
    }

    #[test]
    fn test_fixed_discount_never_exceeds_applicable() {
        let promo = promotion(
            "f",
            PromotionRule::QuantityDiscount {
                product_id: Some("A".to_string()),
                min_quantity: 1.0,
            },
            DiscountShape::FixedAmount(Money::from_minor(5000)),
        );
        let cart = vec![line("A", 1000, 1.0), line("B", 9000, 1.0)];
        assert_eq!(promo.discount_amount(&cart).minor_units(), 1000);
    }

    #[test]
    fn test_shape_apply_caps_at_subtotal() {
        let fixed = DiscountShape::FixedAmount(Money::from_minor(300));
        assert_eq!(fixed.apply(Money::from_minor(1000)).minor_units(), 300);
        assert_eq!(fixed.apply(Money::from_minor(200)).minor_units(), 200);
        assert!(fixed.apply(Money::zero()).is_zero());

        let rate = DiscountShape::Percentage(DiscountRate::from_bps(1000).unwrap());
        assert_eq!(rate.apply(Money::from_minor(1000)).minor_units(), 100);
    }

    #[test]
    fn test_discount_amount_is_idempotent() {
        let promo = promotion(
            "g",
            PromotionRule::GeneralDiscount { min_purchase: None },
            pct(12.5),
        );
        let cart = vec![line("A", 333, 3.0), line("B", 1, 0.5)];
        let first = promo.discount_amount(&cart);
        let second = promo.discount_amount(&cart);
        assert_eq!(first, second);
        assert_eq!(promo.evaluate(&cart), promo.evaluate(&cart));
    }

    #[test]
    fn test_window_date_range() {
        let mut promo = promotion("w", PromotionRule::GeneralDiscount { min_purchase: None }, pct(5.0));
        promo.window.start_date = NaiveDate::from_ymd_opt(2026, 3, 1);
        promo.window.end_date = NaiveDate::from_ymd_opt(2026, 3, 31);

        assert!(!promo.is_active_at(at(2026, 2, 28, 12, 0)));
        assert!(promo.is_active_at(at(2026, 3, 1, 0, 0)));
        assert!(promo.is_active_at(at(2026, 3, 31, 23, 59)));
        assert!(!promo.is_active_at(at(2026, 4, 1, 0, 0)));
    }

    #[test]
    fn test_window_weekdays_and_hours() {
        let mut promo = promotion("w", PromotionRule::GeneralDiscount { min_purchase: None }, pct(5.0));
        // 2026-10-12 is a Monday.
        promo.window.weekdays = vec![1, 3];
        promo.window.hour_start = NaiveTime::from_hms_opt(9, 0, 0);
        promo.window.hour_end = NaiveTime::from_hms_opt(13, 0, 0);

        assert!(promo.is_active_at(at(2026, 10, 12, 10, 30)));
        assert!(!promo.is_active_at(at(2026, 10, 12, 14, 0)));
        assert!(!promo.is_active_at(at(2026, 10, 13, 10, 30)));
        assert!(promo.is_active_at(at(2026, 10, 14, 9, 0)));
    }

    #[test]
    fn test_window_hours_wrap_past_midnight() {
        let window = ActivityWindow {
            hour_start: NaiveTime::from_hms_opt(22, 0, 0),
            hour_end: NaiveTime::from_hms_opt(2, 0, 0),
            ..ActivityWindow::default()
        };
        assert!(window.contains(at(2026, 5, 1, 23, 0)));
        assert!(window.contains(at(2026, 5, 1, 1, 0)));
        assert!(!window.contains(at(2026, 5, 1, 12, 0)));
    }

    #[test]
    fn test_inactive_flag_wins_over_window() {
        let mut promo = promotion("w", PromotionRule::GeneralDiscount { min_purchase: None }, pct(5.0));
        promo.is_active = false;
        assert!(!promo.is_active_at(at(2026, 5, 1, 12, 0)));
    }

    #[test]
    fn test_evaluation_order_is_deterministic() {
        let rule = PromotionRule::GeneralDiscount { min_purchase: None };
        let mut low = promotion("low", rule.clone(), pct(5.0));
        low.priority = 1;
        let mut old = promotion("old", rule.clone(), pct(5.0));
        old.priority = 5;
        let mut new = promotion("new", rule.clone(), pct(5.0));
        new.priority = 5;
        new.created_at = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();
        let mut twin = promotion("a-twin", rule, pct(5.0));
        twin.priority = 5;
        twin.created_at = new.created_at;

        let promos = vec![low, old, new, twin];
        let ids: Vec<&str> = active_promotions(&promos, at(2026, 5, 1, 12, 0))
            .iter()
            .map(|p| p.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a-twin", "new", "old", "low"]);
    }

    #[test]
    fn test_applicable_promotions_reports_affected_lines() {
        let promos = vec![
            promotion(
                "g",
                PromotionRule::GeneralDiscount {
                    min_purchase: Some(Money::from_minor(1500)),
                },
                pct(10.0),
            ),
            promotion(
                "q",
                PromotionRule::QuantityDiscount {
                    product_id: Some("Z".to_string()),
                    min_quantity: 1.0,
                },
                pct(10.0),
            ),
        ];
        let cart = vec![line("A", 1000, 2.0)];
        let applicable = applicable_promotions(&promos, &cart, at(2026, 5, 1, 12, 0));
        assert_eq!(applicable.len(), 1);
        assert_eq!(applicable[0].promotion_id, "g");
        assert_eq!(applicable[0].estimated_discount.minor_units(), 200);
        assert_eq!(applicable[0].affected.len(), 1);
    }

    #[test]
    fn test_daily_capacity() {
        let mut promo = promotion("g", PromotionRule::GeneralDiscount { min_purchase: None }, pct(5.0));
        assert!(promo.has_capacity(1000));
        promo.max_uses_per_day = Some(2);
        assert!(promo.has_capacity(1));
        assert!(!promo.has_capacity(2));
    }

    #[test]
    fn test_rule_payload_serde() {
        let json = r#"{"type":"combo","required":[{"product_id":"A","min_quantity":2}]}"#;
        let rule: PromotionRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.kind(), PromotionKind::Combo);

        let shape: DiscountShape = serde_json::from_str(r#"{"type":"percentage","value":10}"#).unwrap();
        assert_eq!(shape, pct(10.0));
    }

    #[test]
    fn test_rule_validation() {
        assert!(PromotionRule::Combo { required: vec![] }.validate().is_err());
        assert!(PromotionRule::QuantityDiscount {
            product_id: None,
            min_quantity: 0.0
        }
        .validate()
        .is_err());
        assert!(DiscountShape::FixedAmount(Money::zero()).validate().is_err());
    }

    #[test]
    fn test_manual_percentage_discount() {
        let discount = ManualDiscount::Percentage {
            value: DiscountRate::from_percentage(10.0).unwrap(),
            description: None,
        };
        let outcome = discount.evaluate(Money::from_minor(2000)).unwrap();
        assert_eq!(outcome.amount.minor_units(), 200);
        assert_eq!(outcome.total.minor_units(), 1800);
        assert_eq!(outcome.effective_percentage, 10.0);
        assert_eq!(discount.applied_percentage(), Some(10.0));
        assert_eq!(discount.description(), "Manual discount 10%");
    }

    #[test]
    fn test_manual_fixed_discount_bounds() {
        let over = ManualDiscount::FixedAmount {
            value: Money::from_minor(2500),
            description: None,
        };
        assert!(matches!(
            over.evaluate(Money::from_minor(2000)),
            Err(ValidationError::DiscountExceedsSubtotal { .. })
        ));

        let zero = ManualDiscount::FixedAmount {
            value: Money::zero(),
            description: None,
        };
        assert!(zero.evaluate(Money::from_minor(2000)).is_err());

        let exact = ManualDiscount::FixedAmount {
            value: Money::from_minor(2000),
            description: Some("Cortesía".to_string()),
        };
        let outcome = exact.evaluate(Money::from_minor(2000)).unwrap();
        assert_eq!(outcome.total, Money::zero());
        assert_eq!(exact.description(), "Cortesía");
    }

    #[test]
    fn test_manual_discount_request_shape() {
        let json = r#"{"type":"percentage","value":10,"description":"Cliente frecuente"}"#;
        let discount: ManualDiscount = serde_json::from_str(json).unwrap();
        assert_eq!(discount.applied_percentage(), Some(10.0));

        let too_much = r#"{"type":"percentage","value":120}"#;
        assert!(serde_json::from_str::<ManualDiscount>(too_much).is_err());
    }
}
