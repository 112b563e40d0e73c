//! Maturity value calculation and the fixed package table
use super::error::PolicyError;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use rust_decimal_macros::dec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Package {
    pub name: &'static str,
    pub premium: Decimal,
    pub coverage: Decimal,
    pub installment_no: u32,
}

pub const PACKAGES: [Package; 3] = [
    Package {
        name: "Silver",
        premium: dec!(11112),
        coverage: dec!(540000),
        installment_no: 18,
    },
    Package {
        name: "Gold",
        premium: dec!(10000),
        coverage: dec!(800000),
        installment_no: 20,
    },
    Package {
        name: "Platinum",
        premium: dec!(13087),
        coverage: dec!(1410000),
        installment_no: 25,
    },
];

/// Exact, case-sensitive lookup.
pub fn resolve_package(name: &str) -> Result<Package, PolicyError> {
    PACKAGES
        .iter()
        .find(|p| p.name == name)
        .copied()
        .ok_or_else(|| PolicyError::UnknownPackage(name.to_string()))
}

/// Sum of every installment compounded for its remaining number of periods:
/// `premium * (1 + rate/100)^(n - k)` for `k` in `0..n`. A non-positive
/// `profit_rate` is replaced by `default_rate`. Rounded to cents.
///
/// Evaluated as the closed geometric sum `premium * g * (g^n - 1) / (g - 1)`,
/// so the cost does not grow with `installment_no`.
pub fn calculate_maturity(
    premium: Decimal,
    installment_no: u32,
    profit_rate: Decimal,
    default_rate: Decimal,
) -> Result<Decimal, PolicyError> {
    let rate = if profit_rate <= Decimal::ZERO {
        default_rate
    } else {
        profit_rate
    };
    let growth = Decimal::ONE + rate / Decimal::ONE_HUNDRED;

    let periods = Decimal::from(installment_no);
    let matured = if growth == Decimal::ONE {
        premium.checked_mul(periods)
    } else {
        growth
            .checked_powu(u64::from(installment_no))
            .and_then(|compounded| compounded.checked_sub(Decimal::ONE))
            .and_then(|gain| gain.checked_div(growth - Decimal::ONE))
            .and_then(|series| series.checked_mul(growth))
            .and_then(|series| series.checked_mul(premium))
    }
    .ok_or(PolicyError::Overflow("maturity value"))?;

    Ok(matured.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero))
}
