// billing/allocation.rs
// Split a payment across invoice line items (largest remainder, to the cent).

use rust_decimal::Decimal;

use super::totals::VAT_RATE;
use crate::models::LineItem;

const HUNDRED: Decimal = Decimal::ONE_HUNDRED;

/// Portion of `payment` owed to each item, proportional to its line total.
///
/// Works in whole cents: every item gets the floor of its quota, then leftover cents go
/// to the largest fractional remainders (earlier items win ties). The portions always
/// sum to `payment` rounded to cents.
pub fn split_payment(items: &[LineItem], payment: Decimal) -> Vec<Decimal> {
    let weights: Vec<Decimal> = items
        .iter()
        .map(|item| item.line_total().max(Decimal::ZERO))
        .collect();
    let total_weight: Decimal = weights.iter().copied().sum();
    let cents = (payment.round_dp(2) * HUNDRED).trunc();
    if total_weight <= Decimal::ZERO || cents <= Decimal::ZERO {
        return vec![Decimal::ZERO; items.len()];
    }

    let quotas: Vec<Decimal> = weights.iter().map(|w| cents * w / total_weight).collect();
    let mut portions: Vec<Decimal> = quotas.iter().map(|q| q.floor()).collect();
    let mut leftover = cents - portions.iter().copied().sum::<Decimal>();

    let mut order: Vec<usize> = (0..items.len()).filter(|&i| weights[i] > Decimal::ZERO).collect();
    order.sort_by(|&a, &b| {
        let ra = quotas[a] - portions[a];
        let rb = quotas[b] - portions[b];
        rb.cmp(&ra).then(a.cmp(&b))
    });
    for index in order.into_iter().cycle() {
        if leftover <= Decimal::ZERO {
            break;
        }
        portions[index] += Decimal::ONE;
        leftover -= Decimal::ONE;
    }

    portions.into_iter().map(|p| p / HUNDRED).collect()
}

/// Receipt items covering `payment`: each item keeps its unit price and gets the
/// quantity its portion buys at the VAT-inclusive price (4 dp, capped at the original).
pub fn allocate_receipt_items(items: &[LineItem], payment: Decimal) -> Vec<LineItem> {
    let portions = split_payment(items, payment);
    items
        .iter()
        .zip(portions)
        .filter_map(|(item, portion)| {
            if portion <= Decimal::ZERO {
                return None;
            }
            let gross = item.line_total() * (Decimal::ONE + VAT_RATE);
            let quantity = (item.quantity * portion / gross)
                .round_dp(4)
                .min(item.quantity);
            if quantity <= Decimal::ZERO {
                return None;
            }
            Some(LineItem {
                quantity,
                ..item.clone()
            })
        })
        .collect()
}
