//! Wallets and the append-only ledger.
//!
//! A [`Wallet`] holds a non-negative balance per `(owner, currency)` pair.
//! Every balance change is paired with exactly one [`LedgerTransaction`]
//! carrying the same signed amount, so a wallet's balance always equals
//! the sum of its ledger entries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{Currency, DealId, TransactionId, UserId, WalletId};
use crate::error::ServiceError;

/// Balance holder for one owner and currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wallet {
    /// Wallet identifier.
    pub id: WalletId,
    /// Owning user; `None` for system-held wallets.
    pub user_id: Option<UserId>,
    /// Currency of the balance.
    pub currency: Currency,
    /// Current balance, never negative.
    pub balance: Decimal,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last balance mutation.
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Creates an empty wallet.
    #[must_use]
    pub fn new(user_id: Option<UserId>, currency: Currency) -> Self {
        let now = Utc::now();
        Self {
            id: WalletId::new(),
            user_id,
            currency,
            balance: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Kind of ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Manual or test top-up (positive).
    Deposit,
    /// Funds debited from the advertiser and held for a deal (negative).
    Escrow,
    /// Held funds credited to the channel owner (positive).
    Payout,
    /// Held funds returned to the advertiser (positive).
    Refund,
}

impl TransactionKind {
    /// Returns the stored string form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Deposit => "deposit",
            Self::Escrow => "escrow",
            Self::Payout => "payout",
            Self::Refund => "refund",
        }
    }

    /// Returns `true` if entries of this kind draw down a deal's escrow.
    #[must_use]
    pub const fn draws_escrow(self) -> bool {
        matches!(self, Self::Payout | Self::Refund)
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deposit" => Ok(Self::Deposit),
            "escrow" => Ok(Self::Escrow),
            "payout" => Ok(Self::Payout),
            "refund" => Ok(Self::Refund),
            other => Err(ServiceError::Internal(format!(
                "unknown transaction kind: {other}"
            ))),
        }
    }
}

/// Immutable ledger entry recording one wallet mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    /// Entry identifier.
    pub id: TransactionId,
    /// Wallet the entry belongs to.
    pub wallet_id: WalletId,
    /// Signed amount: positive credits, negative debits.
    pub amount: Decimal,
    /// Entry kind.
    pub kind: TransactionKind,
    /// Deal this entry was made for, if any.
    pub reference_id: Option<DealId>,
    /// Free-form description.
    pub description: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

/// Amount still held in escrow for a deal, computed from its ledger
/// entries alone: escrow debits minus payouts and refunds.
#[must_use]
pub fn held_in_escrow<'a>(entries: impl IntoIterator<Item = &'a LedgerTransaction>) -> Decimal {
    entries
        .into_iter()
        .fold(Decimal::ZERO, |held, entry| match entry.kind {
            // escrow entries are negative, payouts and refunds positive
            TransactionKind::Escrow | TransactionKind::Payout | TransactionKind::Refund => {
                held - entry.amount
            }
            TransactionKind::Deposit => held,
        })
}
