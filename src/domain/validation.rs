//! Order validation
//!
//! `OrderValidator` holds the compiled format rules and checks an [`Order`]
//! against every field constraint. It has no side effects: build one at
//! startup and share it by reference.

use chrono::{DateTime, Datelike, Utc};
use regex::Regex;
use std::fmt;

use super::order::{Delivery, Item, Order, Payment};

/// Locales accepted on an order
pub const SUPPORTED_LOCALES: [&str; 2] = ["en", "ru"];

/// E.164: leading '+', 7 to 15 digits, the first of them non-zero when 15
const E164_PATTERN: &str = r"^\+[1-9]?[0-9]{7,14}$";

/// Years a TIMESTAMPTZ column round-trips without loss
const DATE_CREATED_YEARS: std::ops::RangeInclusive<i32> = 1..=9999;

const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

/// A single broken field rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldViolation {
    /// Dotted path of the field, e.g. `items[0].sale`
    pub field: String,
    pub rule: &'static str,
}

impl fmt::Display for FieldViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.rule)
    }
}

/// All rule violations found on one order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{} field rule(s) violated: {}", .violations.len(), join(.violations))]
pub struct ValidationError {
    pub violations: Vec<FieldViolation>,
}

fn join(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl ValidationError {
    /// Check whether a rule on the given field was broken
    pub fn has_field(&self, field: &str) -> bool {
        self.violations.iter().any(|v| v.field == field)
    }
}

/// Stateless checker for order field rules.
#[derive(Debug, Clone)]
pub struct OrderValidator {
    phone: Regex,
    email: Regex,
}

impl OrderValidator {
    pub fn new() -> Self {
        Self {
            phone: Regex::new(E164_PATTERN).expect("Invalid E164_PATTERN constant"),
            email: Regex::new(EMAIL_PATTERN).expect("Invalid EMAIL_PATTERN constant"),
        }
    }

    /// Validate an order, collecting every violation.
    pub fn validate(&self, order: &Order) -> Result<(), ValidationError> {
        let mut report = Report::default();

        report.required("order_uid", &order.order_uid);
        report.required("track_number", &order.track_number);
        report.required("entry", &order.entry);
        report.required("customer_id", &order.customer_id);
        report.required("delivery_service", &order.delivery_service);
        report.required("shardkey", &order.shardkey);
        report.required("oof_shard", &order.oof_shard);
        report.check(
            "locale",
            SUPPORTED_LOCALES.contains(&order.locale.as_str()),
            "must be one of: en, ru",
        );
        report.check("sm_id", order.sm_id >= 1, "must be >= 1");
        report.text("internal_signature", &order.internal_signature);
        if report.check(
            "date_created",
            order.date_created != DateTime::<Utc>::default(),
            "is required",
        ) {
            report.check(
                "date_created",
                DATE_CREATED_YEARS.contains(&order.date_created.year()),
                "must fall between years 1 and 9999",
            );
        }

        self.validate_delivery(&order.delivery, &mut report);
        validate_payment(&order.payment, &mut report);

        if order.items.is_empty() {
            report.push("items", "must contain at least one item");
        }
        for (idx, item) in order.items.iter().enumerate() {
            validate_item(idx, item, &mut report);
        }

        report.finish()
    }

    fn validate_delivery(&self, delivery: &Delivery, report: &mut Report) {
        report.required("delivery.name", &delivery.name);
        report.required("delivery.zip", &delivery.zip);
        report.required("delivery.city", &delivery.city);
        report.required("delivery.address", &delivery.address);
        report.required("delivery.region", &delivery.region);

        if report.required("delivery.phone", &delivery.phone) {
            report.check(
                "delivery.phone",
                self.phone.is_match(&delivery.phone),
                "must be an E.164 phone number",
            );
        }
        if report.required("delivery.email", &delivery.email) {
            report.check(
                "delivery.email",
                self.email.is_match(&delivery.email),
                "must be an email address",
            );
        }
    }
}

impl Default for OrderValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn validate_payment(payment: &Payment, report: &mut Report) {
    report.required("payment.transaction", &payment.transaction);
    report.text("payment.request_id", &payment.request_id);
    report.required("payment.currency", &payment.currency);
    report.required("payment.provider", &payment.provider);
    report.required("payment.bank", &payment.bank);
    report.non_negative("payment.amount", payment.amount);
    report.non_negative("payment.payment_dt", payment.payment_dt);
    report.non_negative("payment.delivery_cost", payment.delivery_cost);
    report.non_negative("payment.goods_total", payment.goods_total);
    report.non_negative("payment.custom_fee", payment.custom_fee);
}

fn validate_item(idx: usize, item: &Item, report: &mut Report) {
    let field = |name: &str| format!("items[{idx}].{name}");

    report.check(&field("chrt_id"), item.chrt_id >= 1, "must be >= 1");
    report.required(&field("track_number"), &item.track_number);
    report.non_negative(&field("price"), item.price);
    report.required(&field("rid"), &item.rid);
    report.required(&field("name"), &item.name);
    report.check(
        &field("sale"),
        (0..=100).contains(&item.sale),
        "must be between 0 and 100",
    );
    report.required(&field("size"), &item.size);
    report.non_negative(&field("total_price"), item.total_price);
    report.check(&field("nm_id"), item.nm_id >= 1, "must be >= 1");
    report.required(&field("brand"), &item.brand);
    report.check(&field("status"), item.status >= 0, "must be >= 0");
}

#[derive(Default)]
struct Report {
    violations: Vec<FieldViolation>,
}

impl Report {
    fn push(&mut self, field: &str, rule: &'static str) {
        self.violations.push(FieldViolation {
            field: field.to_string(),
            rule,
        });
    }

    fn check(&mut self, field: &str, ok: bool, rule: &'static str) -> bool {
        if !ok {
            self.push(field, rule);
        }
        ok
    }

    fn required(&mut self, field: &str, value: &str) -> bool {
        self.check(field, !value.trim().is_empty(), "is required") && self.text(field, value)
    }

    /// Postgres text columns cannot hold NUL
    fn text(&mut self, field: &str, value: &str) -> bool {
        self.check(field, !value.contains('\0'), "must not contain NUL characters")
    }

    fn non_negative(&mut self, field: &str, value: i64) -> bool {
        self.check(field, value >= 0, "must be >= 0")
    }

    fn finish(self) -> Result<(), ValidationError> {
        if self.violations.is_empty() {
            Ok(())
        } else {
            Err(ValidationError {
                violations: self.violations,
            })
        }
    }
}
