use std::collections::BTreeMap;

use rust_decimal::{Decimal, RoundingStrategy};

use crate::models::{ChargeRule, ChargeType};

/// Rounds a money amount to two places, half away from zero.
pub fn round2(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Amount a single rule adds on top of `base`. Percentage values are
/// percents, so 18 means 18%.
pub fn rule_amount(base: Decimal, rule: &ChargeRule) -> Decimal {
    match rule.charge_type {
        ChargeType::Percentage => round2(base * rule.value / Decimal::ONE_HUNDRED),
        ChargeType::Fixed => round2(rule.value),
    }
}

/// Per-rule charge breakdown for `subtotal`. Inactive rules are ignored.
///
/// Each amount is rounded on its own so a preview and the booking it
/// becomes always agree to the paisa.
pub fn compute_charges(subtotal: Decimal, rules: &[ChargeRule]) -> BTreeMap<String, Decimal> {
    rules
        .iter()
        .filter(|rule| rule.active)
        .map(|rule| (rule.name.clone(), rule_amount(subtotal, rule)))
        .collect()
}

pub fn total_charges(charges: &BTreeMap<String, Decimal>) -> Decimal {
    charges.values().copied().sum()
}

/// Priced ticket block, ready to be shown as a quote or stored on a booking.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub price_per_ticket: Decimal,
    pub quantity: i32,
    pub subtotal: Decimal,
    pub charges: BTreeMap<String, Decimal>,
    pub total_amount: Decimal,
}

pub fn quote(price_per_ticket: Decimal, quantity: i32, rules: &[ChargeRule]) -> Quote {
    let subtotal = round2(price_per_ticket * Decimal::from(quantity));
    let charges = compute_charges(subtotal, rules);
    let total_amount = subtotal + total_charges(&charges);

    Quote {
        price_per_ticket,
        quantity,
        subtotal,
        charges,
        total_amount,
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    fn rules() -> Vec<ChargeRule> {
        vec![
            ChargeRule::new("GST", ChargeType::Percentage, dec!(18)),
            ChargeRule::new("Convenience_Fee", ChargeType::Fixed, dec!(20)),
        ]
    }

    #[test]
    fn gst_and_convenience_fee_on_a_thousand() {
        let charges = compute_charges(dec!(1000), &rules());

        assert_eq!(charges.len(), 2);
        assert_eq!(charges["GST"], dec!(180.00));
        assert_eq!(charges["Convenience_Fee"], dec!(20.00));
        assert_eq!(total_charges(&charges), dec!(200.00));
    }

    #[test]
    fn rounds_each_rule_half_up() {
        let rule = ChargeRule::new("GST", ChargeType::Percentage, dec!(18));

        // 0.125 * 18% = 0.0225 -> 0.02, 0.25 * 18% = 0.045 -> 0.05
        assert_eq!(rule_amount(dec!(0.125), &rule), dec!(0.02));
        assert_eq!(rule_amount(dec!(0.25), &rule), dec!(0.05));
        assert_eq!(round2(dec!(2.675)), dec!(2.68));
        assert_eq!(round2(dec!(-2.675)), dec!(-2.68));
    }

    #[test]
    fn inactive_rules_are_skipped_and_input_is_untouched() {
        let mut rules = rules();
        rules[1].active = false;
        let before = rules.clone();

        let charges = compute_charges(dec!(500), &rules);

        assert_eq!(charges.len(), 1);
        assert_eq!(charges["GST"], dec!(90.00));
        assert_eq!(rules, before);
    }

    #[test]
    fn quote_adds_charges_to_subtotal() {
        let quote = quote(dec!(499.50), 3, &rules());

        assert_eq!(quote.subtotal, dec!(1498.50));
        assert_eq!(quote.charges["GST"], dec!(269.73));
        assert_eq!(quote.total_amount, dec!(1788.23));
    }

    #[test]
    fn no_rules_means_no_charges() {
        let quote = quote(dec!(250), 2, &[]);
        assert!(quote.charges.is_empty());
        assert_eq!(quote.total_amount, dec!(500));
    }
}
