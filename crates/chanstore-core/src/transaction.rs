//! On-chain transactions submitted by the client.
//!
//! A logical transaction is identified by a client-generated
//! [`TransactionId`]. Every (re)submission is recorded as a
//! [`TransactionAttempt`]; the attempt list only grows. Status moves
//! `submitted -> mined | failed` and never back.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::types::{Address, ChannelAddress, TransactionId, TxHash};

/// Why the client submitted a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransactionReason {
    Allowance,
    ApproveTokens,
    DeployChannel,
    DeployWithDepositAlice,
    DepositA,
    DepositB,
    DisputeChannel,
    DisputeTransfer,
    DefundChannel,
    DefundTransfer,
    ExitChannel,
    SpeedUpTransaction,
    TransferTokens,
    Withdraw,
}

impl TransactionReason {
    pub const ALL: [TransactionReason; 14] = [
        TransactionReason::Allowance,
        TransactionReason::ApproveTokens,
        TransactionReason::DeployChannel,
        TransactionReason::DeployWithDepositAlice,
        TransactionReason::DepositA,
        TransactionReason::DepositB,
        TransactionReason::DisputeChannel,
        TransactionReason::DisputeTransfer,
        TransactionReason::DefundChannel,
        TransactionReason::DefundTransfer,
        TransactionReason::ExitChannel,
        TransactionReason::SpeedUpTransaction,
        TransactionReason::TransferTokens,
        TransactionReason::Withdraw,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionReason::Allowance => "allowance",
            TransactionReason::ApproveTokens => "approveTokens",
            TransactionReason::DeployChannel => "deployChannel",
            TransactionReason::DeployWithDepositAlice => "deployWithDepositAlice",
            TransactionReason::DepositA => "depositA",
            TransactionReason::DepositB => "depositB",
            TransactionReason::DisputeChannel => "disputeChannel",
            TransactionReason::DisputeTransfer => "disputeTransfer",
            TransactionReason::DefundChannel => "defundChannel",
            TransactionReason::DefundTransfer => "defundTransfer",
            TransactionReason::ExitChannel => "exitChannel",
            TransactionReason::SpeedUpTransaction => "speedUpTransaction",
            TransactionReason::TransferTokens => "transferTokens",
            TransactionReason::Withdraw => "withdraw",
        }
    }
}

impl fmt::Display for TransactionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant {
                kind: "transaction reason",
                value: s.to_string(),
            })
    }
}

/// Lifecycle status of a stored transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    #[default]
    Submitted,
    Mined,
    Failed,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Submitted => "submitted",
            TransactionStatus::Mined => "mined",
            TransactionStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Submitted)
    }

    /// Whether a transaction in `self` may move to `next`.
    ///
    /// `submitted -> submitted` is a resubmission (a new attempt).
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match (self, next) {
            (TransactionStatus::Submitted, _) => true,
            (TransactionStatus::Mined | TransactionStatus::Failed, _) => false,
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "submitted" => Ok(TransactionStatus::Submitted),
            "mined" => Ok(TransactionStatus::Mined),
            "failed" => Ok(TransactionStatus::Failed),
            other => Err(CoreError::UnknownVariant {
                kind: "transaction status",
                value: other.to_string(),
            }),
        }
    }
}

/// What a provider returns when a transaction is broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionResponse {
    pub hash: TxHash,
    pub to: Address,
    pub from: Address,
    pub data: String,
    pub value: u128,
    pub chain_id: u64,
    pub nonce: u64,
    pub gas_limit: u128,
    pub gas_price: u128,
}

/// One submission of a logical transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionAttempt {
    pub gas_limit: String,
    pub gas_price: String,
    pub transaction_hash: TxHash,
    pub created_at: i64,
}

impl TransactionAttempt {
    pub fn from_response(response: &TransactionResponse, created_at: i64) -> Self {
        Self {
            gas_limit: response.gas_limit.to_string(),
            gas_price: response.gas_price.to_string(),
            transaction_hash: response.hash.clone(),
            created_at,
        }
    }
}

/// An event log emitted by a mined transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub address: Address,
    pub topics: Vec<String>,
    pub data: String,
    pub log_index: u64,
}

/// A receipt as reported by a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    pub contract_address: Option<Address>,
    pub transaction_index: u64,
    pub root: Option<String>,
    pub gas_used: u128,
    pub cumulative_gas_used: u128,
    pub logs_bloom: String,
    pub block_hash: String,
    pub block_number: u64,
    pub logs: Vec<Log>,
    pub byzantium: bool,
    pub status: Option<u8>,
}

/// The sanitized, persisted projection of a [`TransactionReceipt`].
///
/// Gas quantities are decimal strings and the logs are reduced to a digest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransactionReceipt {
    pub transaction_hash: TxHash,
    pub contract_address: Option<Address>,
    pub transaction_index: u64,
    pub root: Option<String>,
    pub gas_used: String,
    pub cumulative_gas_used: String,
    pub logs_bloom: String,
    pub block_hash: String,
    pub block_number: u64,
    pub logs: String,
    pub byzantium: bool,
    pub status: Option<u8>,
}

impl From<&TransactionReceipt> for StoredTransactionReceipt {
    fn from(receipt: &TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash.clone(),
            contract_address: receipt.contract_address.clone(),
            transaction_index: receipt.transaction_index,
            root: receipt.root.clone(),
            gas_used: receipt.gas_used.to_string(),
            cumulative_gas_used: receipt.cumulative_gas_used.to_string(),
            logs_bloom: receipt.logs_bloom.clone(),
            block_hash: receipt.block_hash.clone(),
            block_number: receipt.block_number,
            logs: logs_digest(&receipt.logs),
            byzantium: receipt.byzantium,
            status: receipt.status,
        }
    }
}

/// Hex Blake3 digest over the logs, in order.
///
/// Every field is length-prefixed so distinct log lists never collide by
/// concatenation.
pub fn logs_digest(logs: &[Log]) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(logs.len() as u64).to_le_bytes());
    for log in logs {
        hasher.update(&log.log_index.to_le_bytes());
        update_field(&mut hasher, log.address.as_str());
        hasher.update(&(log.topics.len() as u64).to_le_bytes());
        for topic in &log.topics {
            update_field(&mut hasher, topic);
        }
        update_field(&mut hasher, &log.data);
    }
    hex::encode(hasher.finalize().as_bytes())
}

fn update_field(hasher: &mut blake3::Hasher, field: &str) {
    hasher.update(&(field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

/// An on-chain transaction with its full attempt history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub id: TransactionId,
    pub channel_address: ChannelAddress,
    pub status: TransactionStatus,
    pub reason: TransactionReason,
    pub to: Address,
    pub from: Address,
    pub data: String,
    pub value: String,
    pub chain_id: u64,
    pub nonce: u64,
    /// Ordered by submission; append-only.
    pub attempts: Vec<TransactionAttempt>,
    pub receipt: Option<StoredTransactionReceipt>,
    pub error: Option<String>,
}

impl StoredTransaction {
    pub fn latest_attempt(&self) -> Option<&TransactionAttempt> {
        self.attempts.last()
    }

    /// Hash of the most recent submission.
    pub fn transaction_hash(&self) -> Option<&TxHash> {
        self.latest_attempt().map(|a| &a.transaction_hash)
    }

    /// Submitted with no receipt yet: candidates for re-polling or re-pricing.
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Submitted && self.receipt.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn receipt(logs: Vec<Log>) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: TxHash::from("0xhash"),
            contract_address: None,
            transaction_index: 2,
            root: None,
            gas_used: u128::from(u64::MAX) + 1,
            cumulative_gas_used: 21_000,
            logs_bloom: "0x00".into(),
            block_hash: "0xblock".into(),
            block_number: 100,
            logs,
            byzantium: true,
            status: Some(1),
        }
    }

    fn log(index: u64, data: &str) -> Log {
        Log {
            address: Address::from("0xc0ffee"),
            topics: vec!["0xtopic".into()],
            data: data.into(),
            log_index: index,
        }
    }

    #[test]
    fn test_status_transitions_are_monotonic() {
        use TransactionStatus::*;
        assert!(Submitted.can_transition_to(Submitted));
        assert!(Submitted.can_transition_to(Mined));
        assert!(Submitted.can_transition_to(Failed));
        for terminal in [Mined, Failed] {
            for next in [Submitted, Mined, Failed] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_reason_parse() {
        for reason in TransactionReason::ALL {
            assert_eq!(reason.as_str().parse::<TransactionReason>().unwrap(), reason);
        }
        assert!("bogus".parse::<TransactionReason>().is_err());
    }

    #[test]
    fn test_reason_serde_matches_column_value() {
        for reason in TransactionReason::ALL {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, serde_json::Value::String(reason.as_str().to_string()));
        }
    }

    #[test]
    fn test_sanitize_receipt_stringifies_gas() {
        let stored = StoredTransactionReceipt::from(&receipt(vec![]));
        assert_eq!(stored.gas_used, "18446744073709551616");
        assert_eq!(stored.cumulative_gas_used, "21000");
        assert_eq!(stored.block_number, 100);
        assert_eq!(stored.status, Some(1));
    }

    #[test]
    fn test_logs_digest_is_order_sensitive() {
        let a = logs_digest(&[log(0, "0x01"), log(1, "0x02")]);
        let b = logs_digest(&[log(1, "0x02"), log(0, "0x01")]);
        assert_ne!(a, b);
        assert_eq!(a, logs_digest(&[log(0, "0x01"), log(1, "0x02")]));
        assert_eq!(a.len(), 64);
    }

    proptest! {
        #[test]
        fn test_sanitized_gas_is_exact_decimal(gas_used: u128, cumulative: u128) {
            let mut raw = receipt(vec![]);
            raw.gas_used = gas_used;
            raw.cumulative_gas_used = cumulative;
            let stored = StoredTransactionReceipt::from(&raw);
            prop_assert_eq!(stored.gas_used.parse::<u128>().unwrap(), gas_used);
            prop_assert_eq!(stored.cumulative_gas_used.parse::<u128>().unwrap(), cumulative);
        }
    }

    #[test]
    fn test_attempt_from_response() {
        let response = TransactionResponse {
            hash: TxHash::from("0x1"),
            to: Address::from("0xto"),
            from: Address::from("0xfrom"),
            data: "0x".into(),
            value: 0,
            chain_id: 1,
            nonce: 7,
            gas_limit: 100_000,
            gas_price: 20_000_000_000,
        };
        let attempt = TransactionAttempt::from_response(&response, 42);
        assert_eq!(attempt.gas_price, "20000000000");
        assert_eq!(attempt.gas_limit, "100000");
        assert_eq!(attempt.transaction_hash, TxHash::from("0x1"));
        assert_eq!(attempt.created_at, 42);
    }
}
