//! Proptest generators for property-based testing.

use std::collections::BTreeSet;

use proptest::prelude::*;

use chanstore_core::{TransactionId, TransactionReason, TransactionStatus};

/// Generate a transaction reason.
pub fn transaction_reason() -> impl Strategy<Value = TransactionReason> {
    prop::sample::select(TransactionReason::ALL.to_vec())
}

/// Generate a client transaction id.
pub fn transaction_id() -> impl Strategy<Value = TransactionId> {
    "[0-9a-f]{8}-[0-9a-f]{4}".prop_map(TransactionId::new)
}

/// Generate gas prices in wei, from 1 gwei up to far beyond 64 bits.
pub fn gas_price() -> impl Strategy<Value = u128> {
    prop_oneof![
        1_000_000_000u128..=500_000_000_000u128,
        (u128::from(u64::MAX))..=u128::MAX,
    ]
}

/// Successive active sets of one channel, as small transfer indices.
pub fn active_sets(max_transfers: u8, max_rounds: usize) -> impl Strategy<Value = Vec<BTreeSet<u8>>> {
    prop::collection::vec(
        prop::collection::btree_set(0..max_transfers.max(1), 0..=(max_transfers as usize / 2)),
        1..=max_rounds.max(1),
    )
}

/// One chain-service operation on a single transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOp {
    /// Submit or resubmit at this gas price.
    Attempt { gas_price: u128 },
    /// Receipt with success status.
    Mine,
    /// Failure, with a receipt when `with_receipt`.
    Fail { with_receipt: bool },
}

impl Arbitrary for TxOp {
    type Parameters = ();
    type Strategy = BoxedStrategy<Self>;

    fn arbitrary_with(_: Self::Parameters) -> Self::Strategy {
        prop_oneof![
            3 => gas_price().prop_map(|gas_price| TxOp::Attempt { gas_price }),
            1 => Just(TxOp::Mine),
            1 => any::<bool>().prop_map(|with_receipt| TxOp::Fail { with_receipt }),
        ]
        .boxed()
    }
}

/// Expected outcome of applying one operation to a transaction model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    Accepted,
    /// The transaction does not exist yet.
    Missing,
    /// The transaction is already mined or failed.
    Rejected,
}

/// Reference model of the transaction state machine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxModel {
    pub status: Option<TransactionStatus>,
    pub gas_prices: Vec<u128>,
}

impl TxModel {
    pub fn apply(&mut self, op: &TxOp) -> TxOutcome {
        let next = match op {
            TxOp::Attempt { .. } => TransactionStatus::Submitted,
            TxOp::Mine => TransactionStatus::Mined,
            TxOp::Fail { .. } => TransactionStatus::Failed,
        };
        match (self.status, op) {
            (None, TxOp::Attempt { gas_price }) => {
                self.status = Some(next);
                self.gas_prices.push(*gas_price);
                TxOutcome::Accepted
            }
            (None, _) => TxOutcome::Missing,
            (Some(current), _) if !current.can_transition_to(next) => TxOutcome::Rejected,
            (Some(_), op) => {
                if let TxOp::Attempt { gas_price } = op {
                    self.gas_prices.push(*gas_price);
                }
                self.status = Some(next);
                TxOutcome::Accepted
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn test_model_status_never_leaves_terminal(ops in prop::collection::vec(any::<TxOp>(), 0..20)) {
            let mut model = TxModel::default();
            let mut terminal: Option<TransactionStatus> = None;

            for op in &ops {
                model.apply(op);
                if let Some(status) = terminal {
                    prop_assert_eq!(model.status, Some(status));
                } else if model.status.map_or(false, |s| s.is_terminal()) {
                    terminal = model.status;
                }
            }
        }

        #[test]
        fn test_active_sets_within_bounds(sets in active_sets(6, 4)) {
            prop_assert!(!sets.is_empty() && sets.len() <= 4);
            for set in &sets {
                prop_assert!(set.iter().all(|n| *n < 6));
            }
        }

        #[test]
        fn test_reason_strategy_parses_back(reason in transaction_reason()) {
            prop_assert_eq!(reason.as_str().parse::<TransactionReason>().unwrap(), reason);
        }
    }

    #[test]
    fn test_model_rejects_before_submission() {
        let mut model = TxModel::default();
        assert_eq!(model.apply(&TxOp::Mine), TxOutcome::Missing);
        assert_eq!(model.apply(&TxOp::Attempt { gas_price: 1 }), TxOutcome::Accepted);
        assert_eq!(model.apply(&TxOp::Fail { with_receipt: false }), TxOutcome::Accepted);
        assert_eq!(model.apply(&TxOp::Attempt { gas_price: 2 }), TxOutcome::Rejected);
        assert_eq!(model.gas_prices, vec![1]);
    }
}
