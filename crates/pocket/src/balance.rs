//! Balance aggregation
//!
//! Pure read views over the proof collections. Balances are recomputed on
//! demand, never stored: a zero entry is materialized for every registered
//! mint/unit pair so consumers always see `0` instead of a missing key, and
//! proofs whose mint is no longer registered are excluded and logged rather
//! than silently inflating a balance.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::amount::Amount;
use crate::error::Error;
use crate::mint_url::MintUrl;
use crate::nuts::{CurrencyUnit, Proof};
use crate::registry::MintEntry;

/// Per-mint balances, one entry per unit the mint supports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintBalance {
    /// Mint url
    pub mint_url: MintUrl,
    /// Balance per unit; every supported unit is present, possibly zero
    pub balances: BTreeMap<CurrencyUnit, Amount>,
}

impl MintBalance {
    /// Balance for a unit, zero when the mint does not support it
    pub fn balance(&self, unit: &CurrencyUnit) -> Amount {
        self.balances.get(unit).copied().unwrap_or(Amount::ZERO)
    }
}

/// Wallet-wide balance of one unit across all mints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitBalance {
    /// Unit
    pub unit: CurrencyUnit,
    /// Total amount over all registered mints
    pub amount: Amount,
}

/// All derived balance views
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    /// Spendable balance per mint
    pub mint_balances: Vec<MintBalance>,
    /// Spendable balance per unit
    pub unit_balances: Vec<UnitBalance>,
    /// Pending balance per mint
    pub mint_pending_balances: Vec<MintBalance>,
    /// Pending balance per unit
    pub unit_pending_balances: Vec<UnitBalance>,
}

fn zero_seeded(mints: &[MintEntry]) -> Vec<MintBalance> {
    mints
        .iter()
        .map(|mint| MintBalance {
            mint_url: mint.mint_url.clone(),
            balances: mint
                .units
                .iter()
                .map(|unit| (unit.clone(), Amount::ZERO))
                .collect(),
        })
        .collect()
}

fn accumulate(
    mint_balances: &mut [MintBalance],
    unit_balances: &mut BTreeMap<CurrencyUnit, Amount>,
    proofs: &[Proof],
) -> Result<(), Error> {
    for proof in proofs {
        let Some(mint_balance) = mint_balances
            .iter_mut()
            .find(|b| b.mint_url == proof.mint_url)
        else {
            // orphaned proof, counted nowhere
            tracing::warn!(
                "Proof for unregistered mint {} excluded from balances",
                proof.mint_url
            );
            continue;
        };

        let entry = mint_balance
            .balances
            .entry(proof.unit.clone())
            .or_insert(Amount::ZERO);
        *entry = entry.checked_add(proof.amount).ok_or(Error::AmountOverflow)?;

        let unit_entry = unit_balances
            .entry(proof.unit.clone())
            .or_insert(Amount::ZERO);
        *unit_entry = unit_entry
            .checked_add(proof.amount)
            .ok_or(Error::AmountOverflow)?;
    }
    Ok(())
}

/// Compute all balance views from the live proof collections.
///
/// Idempotent: same inputs, same output.
pub fn balances(
    mints: &[MintEntry],
    spendable: &[Proof],
    pending: &[Proof],
) -> Result<Balances, Error> {
    let mut mint_balances = zero_seeded(mints);
    let mut mint_pending_balances = zero_seeded(mints);

    let mut unit_balances: BTreeMap<CurrencyUnit, Amount> = mints
        .iter()
        .flat_map(|m| m.units.iter().cloned())
        .map(|unit| (unit, Amount::ZERO))
        .collect();
    let mut unit_pending_balances = unit_balances.clone();

    accumulate(&mut mint_balances, &mut unit_balances, spendable)?;
    accumulate(&mut mint_pending_balances, &mut unit_pending_balances, pending)?;

    Ok(Balances {
        mint_balances,
        unit_balances: unit_balances
            .into_iter()
            .map(|(unit, amount)| UnitBalance { unit, amount })
            .collect(),
        mint_pending_balances,
        unit_pending_balances: unit_pending_balances
            .into_iter()
            .map(|(unit, amount)| UnitBalance { unit, amount })
            .collect(),
    })
}

/// Mints holding at least `amount` of `unit`, fullest first.
///
/// Descending order lets callers default to spending from the fullest mint,
/// which keeps value from fragmenting across mints. The sort is stable, so
/// ties keep registration order.
pub fn mints_with_enough_balance(
    mint_balances: &[MintBalance],
    amount: Amount,
    unit: &CurrencyUnit,
) -> Vec<MintBalance> {
    let mut enough: Vec<MintBalance> = mint_balances
        .iter()
        .filter(|b| b.balance(unit) >= amount)
        .cloned()
        .collect();
    enough.sort_by(|a, b| b.balance(unit).cmp(&a.balance(unit)));
    enough
}

/// The single largest holder of `unit`, if any mint is registered.
/// Ties keep the earlier-registered mint.
pub fn mint_with_max_balance<'a>(
    mint_balances: &'a [MintBalance],
    unit: &CurrencyUnit,
) -> Option<&'a MintBalance> {
    mint_balances.iter().reduce(|best, current| {
        if current.balance(unit) > best.balance(unit) {
            current
        } else {
            best
        }
    })
}
