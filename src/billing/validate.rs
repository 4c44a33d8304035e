// billing/validate.rs
// Input checks: line items, discounts, and required dotted paths over raw JSON ("payment.amount_paid").

use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::{AppError, AppResult};
use crate::models::{ItemCategory, LineItem, QuoteLineItem};

/// Upper bounds keep every line total and document total inside `Decimal` range.
pub const MAX_QUANTITY: Decimal = Decimal::from_parts(1_000_000, 0, 0, false, 0);
pub const MAX_UNIT_PRICE: Decimal = Decimal::from_parts(3_567_587_328, 232, 0, false, 0); // 1_000_000_000_000
pub const MAX_LINE_ITEMS: usize = 500;

/// Walk `path` through nested objects.
pub fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.as_object()?.get(key))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Returns the paths that are absent, null, blank strings or empty arrays.
pub fn missing_fields(payload: &Value, required: &[&str]) -> Vec<String> {
    required
        .iter()
        .filter(|path| lookup(payload, path).is_none_or(is_blank))
        .map(|path| path.to_string())
        .collect()
}

fn check_item(
    index: usize,
    description: &str,
    quantity: Decimal,
    unit_price: Decimal,
    category: ItemCategory,
    other_name: Option<&str>,
) -> AppResult<()> {
    let n = index + 1;
    if description.trim().is_empty() {
        return Err(AppError::validation(format!("Line item {n}: description is required")));
    }
    if quantity <= Decimal::ZERO {
        return Err(AppError::validation(format!("Line item {n}: quantity must be positive")));
    }
    if unit_price < Decimal::ZERO {
        return Err(AppError::validation(format!("Line item {n}: unit price cannot be negative")));
    }
    if quantity > MAX_QUANTITY {
        return Err(AppError::validation(format!(
            "Line item {n}: quantity cannot exceed {MAX_QUANTITY}"
        )));
    }
    if unit_price > MAX_UNIT_PRICE {
        return Err(AppError::validation(format!(
            "Line item {n}: unit price cannot exceed {MAX_UNIT_PRICE}"
        )));
    }
    if category == ItemCategory::Other && other_name.is_none_or(|name| name.trim().is_empty()) {
        return Err(AppError::validation(format!(
            "Line item {n}: other_name is required for category Other"
        )));
    }
    Ok(())
}

pub fn check_line_items(items: &[LineItem]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::validation("At least one line item is required"));
    }
    if items.len() > MAX_LINE_ITEMS {
        return Err(AppError::validation(format!(
            "A document holds at most {MAX_LINE_ITEMS} line items"
        )));
    }
    items.iter().enumerate().try_for_each(|(i, item)| {
        check_item(
            i,
            &item.description,
            item.quantity,
            item.unit_price,
            item.category,
            item.other_name.as_deref(),
        )
    })
}

pub fn check_quote_items(items: &[QuoteLineItem]) -> AppResult<()> {
    if items.is_empty() {
        return Err(AppError::validation("At least one line item is required"));
    }
    if items.len() > MAX_LINE_ITEMS {
        return Err(AppError::validation(format!(
            "A document holds at most {MAX_LINE_ITEMS} line items"
        )));
    }
    items.iter().enumerate().try_for_each(|(i, item)| {
        check_item(
            i,
            &item.description,
            item.quantity,
            item.unit_price,
            item.category,
            item.other_name.as_deref(),
        )
    })
}

pub fn check_discount(discount: Decimal) -> AppResult<()> {
    if discount < Decimal::ZERO {
        return Err(AppError::validation("Discount cannot be negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::{flat_totals, testing::line};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn line_items_must_be_present_and_sane() {
        assert!(check_line_items(&[]).is_err());
        assert!(check_line_items(&[line("Logo", dec!(1), dec!(10))]).is_ok());
        assert!(check_line_items(&[line("Logo", dec!(0), dec!(10))]).is_err());
        assert!(check_line_items(&[line(" ", dec!(1), dec!(10))]).is_err());

        let mut other = line("Misc", dec!(1), dec!(10));
        other.category = ItemCategory::Other;
        assert!(check_line_items(std::slice::from_ref(&other)).is_err());
        other.other_name = Some("Travel".into());
        assert!(check_line_items(&[other]).is_ok());
    }

    #[test]
    fn oversized_items_are_rejected_before_totals() {
        let huge = dec!(1000000000000000);
        assert!(check_line_items(&[line("Bulk", huge, huge)]).is_err());
        assert!(check_line_items(&[line("Bulk", MAX_QUANTITY + dec!(1), dec!(1))]).is_err());
        assert!(check_line_items(&[line("Bulk", dec!(1), MAX_UNIT_PRICE + dec!(0.01))]).is_err());

        let largest = vec![line("Bulk", MAX_QUANTITY, MAX_UNIT_PRICE); MAX_LINE_ITEMS];
        assert!(check_line_items(&largest).is_ok());
        let totals = flat_totals(&largest, Decimal::ZERO);
        assert_eq!(totals.subtotal, MAX_QUANTITY * MAX_UNIT_PRICE * Decimal::from(MAX_LINE_ITEMS));

        let too_many = vec![line("Pen", dec!(1), dec!(1)); MAX_LINE_ITEMS + 1];
        assert!(check_line_items(&too_many).is_err());
    }

    #[test]
    fn nested_paths_are_resolved() {
        let body = json!({ "payment": { "amount_paid": 250 } });
        assert_eq!(lookup(&body, "payment.amount_paid"), Some(&json!(250)));
        assert!(lookup(&body, "payment.details.method").is_none());
    }

    #[test]
    fn reports_each_missing_path() {
        let body = json!({
            "client": "",
            "items": [],
            "currency": "KSH",
            "payment": { "details": { "method": "cash" } }
        });
        let missing = missing_fields(
            &body,
            &["client", "items", "currency", "template", "payment", "payment.amount_paid"],
        );
        assert_eq!(missing, vec!["client", "items", "template", "payment.amount_paid"]);
    }

    #[test]
    fn zero_is_present() {
        let body = json!({ "payment": { "amount_paid": 0 } });
        assert!(missing_fields(&body, &["payment.amount_paid"]).is_empty());
    }

    #[test]
    fn scalar_in_the_middle_of_a_path_is_missing() {
        let body = json!({ "payment": 10 });
        assert_eq!(missing_fields(&body, &["payment.amount_paid"]), vec!["payment.amount_paid"]);
    }
}
