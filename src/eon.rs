use crate::error::{LedgerError, LedgerResult};
use crate::serde_helpers::{option_address, u256_dec};
use crate::transfer::Transfer;
use ethers::types::{Address, U256};
use serde::{Deserialize, Serialize};

/// Bound anchoring the wallet's starting balance at an eon checkpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct MerkleProof {
    #[serde(default)]
    pub eon_number: u64,
    #[serde(with = "u256_dec")]
    pub left: U256,
    #[serde(with = "u256_dec")]
    pub right: U256,
}

/// A confirmed deposit or withdrawal.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BalanceChange {
    #[serde(default, with = "option_address")]
    pub token: Option<Address>,
    #[serde(with = "u256_dec")]
    pub amount: U256,
    pub eon_number: u64,
    #[serde(default)]
    pub txid: Option<String>,
}

pub type Deposit = BalanceChange;
pub type Withdrawal = BalanceChange;

/// Everything the operator knows about a wallet around a checkpoint. Both the
/// `CHECKPOINT_CREATED` payload and the wallet data endpoint have this shape.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct EonRecords {
    #[serde(default, with = "option_address")]
    pub token: Option<Address>,
    #[serde(default)]
    pub merkle_proofs: Vec<MerkleProof>,
    #[serde(default)]
    pub transfers: Vec<Transfer>,
    #[serde(default)]
    pub deposits: Vec<Deposit>,
    #[serde(default)]
    pub withdrawals: Vec<Withdrawal>,
}

impl EonRecords {
    pub fn latest_proof(&self) -> Option<&MerkleProof> {
        self.merkle_proofs.iter().max_by_key(|p| p.eon_number)
    }

    /// Builds the eon of the newest merkle proof, keeping only the records
    /// tagged with that eon. Without any proof the wallet has no checkpointed
    /// balance yet and `fallback_eon_number` names the eon.
    pub fn into_latest_eon(self, fallback_eon_number: u64) -> Eon {
        let proof = self.latest_proof().copied();
        let eon_number = proof.map(|p| p.eon_number).unwrap_or(fallback_eon_number);
        Eon::from_records(
            eon_number,
            proof,
            self.transfers,
            self.deposits,
            self.withdrawals,
        )
    }
}

/// One settlement period's view of a wallet. Values are never mutated once
/// shared, updates build a new `Eon` from the old one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eon {
    eon_number: u64,
    transfers: Vec<Transfer>,
    deposits: Vec<Deposit>,
    withdrawals: Vec<Withdrawal>,
    merkle_proof: Option<MerkleProof>,
}

impl Eon {
    pub fn empty(eon_number: u64) -> Self {
        Self {
            eon_number,
            transfers: vec![],
            deposits: vec![],
            withdrawals: vec![],
            merkle_proof: None,
        }
    }

    /// Records from other eons are dropped here, accessors rely on it.
    pub fn from_records(
        eon_number: u64,
        merkle_proof: Option<MerkleProof>,
        transfers: impl IntoIterator<Item = Transfer>,
        deposits: impl IntoIterator<Item = Deposit>,
        withdrawals: impl IntoIterator<Item = Withdrawal>,
    ) -> Self {
        Self {
            eon_number,
            transfers: transfers
                .into_iter()
                .filter(|t| t.eon_number == eon_number)
                .collect(),
            deposits: deposits
                .into_iter()
                .filter(|d| d.eon_number == eon_number)
                .collect(),
            withdrawals: withdrawals
                .into_iter()
                .filter(|w| w.eon_number == eon_number)
                .collect(),
            merkle_proof,
        }
    }

    pub fn eon_number(&self) -> u64 {
        self.eon_number
    }

    pub fn transfers(&self) -> &[Transfer] {
        &self.transfers
    }

    pub fn deposits(&self) -> &[Deposit] {
        &self.deposits
    }

    pub fn withdrawals(&self) -> &[Withdrawal] {
        &self.withdrawals
    }

    pub fn merkle_proof(&self) -> Option<&MerkleProof> {
        self.merkle_proof.as_ref()
    }

    /// Copy of this eon with `transfer` replacing the entry with the same id
    /// (keeping its position), or appended when there is none.
    pub fn with_transfer(&self, transfer: Transfer) -> Self {
        let mut next = self.clone();
        match next.transfers.iter_mut().find(|t| t.id == transfer.id) {
            Some(existing) => *existing = transfer,
            None => next.transfers.push(transfer),
        }
        next
    }

    pub fn with_deposit(&self, deposit: Deposit) -> Self {
        let mut next = self.clone();
        next.deposits.push(deposit);
        next
    }

    pub fn with_withdrawal(&self, withdrawal: Withdrawal) -> Self {
        let mut next = self.clone();
        next.withdrawals.push(withdrawal);
        next
    }

    /// `right - left` of the merkle proof, zero without one.
    pub fn starting_balance(&self) -> LedgerResult<U256> {
        match &self.merkle_proof {
            None => Ok(U256::zero()),
            Some(proof) => {
                proof
                    .right
                    .checked_sub(proof.left)
                    .ok_or(LedgerError::MalformedMerkleProof {
                        left: proof.left,
                        right: proof.right,
                    })
            }
        }
    }

    pub fn total_deposits(&self) -> LedgerResult<U256> {
        sum(self.deposits.iter().map(|d| d.amount), "deposits")
    }

    pub fn total_withdrawals(&self) -> LedgerResult<U256> {
        sum(self.withdrawals.iter().map(|w| w.amount), "withdrawals")
    }

    /// Last swap leg in this eon belonging to swap `tx_id`.
    pub fn swap_by_tx_id(&self, tx_id: &str) -> Option<&Transfer> {
        self.transfers
            .iter()
            .rev()
            .find(|t| t.is_swap() && t.tx_id == tx_id)
    }
}

pub(crate) fn sum(
    mut amounts: impl Iterator<Item = U256>,
    what: &'static str,
) -> LedgerResult<U256> {
    amounts.try_fold(U256::zero(), |acc, amount| {
        acc.checked_add(amount).ok_or(LedgerError::Overflow(what))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::tests::{me, other, transfer};

    fn proof(eon_number: u64, left: u64, right: u64) -> MerkleProof {
        MerkleProof {
            eon_number,
            left: U256::from(left),
            right: U256::from(right),
        }
    }

    fn change(eon_number: u64, amount: u64) -> BalanceChange {
        BalanceChange {
            token: None,
            amount: U256::from(amount),
            eon_number,
            txid: None,
        }
    }

    #[test]
    fn starting_balance_without_proof_is_zero() {
        assert_eq!(Eon::empty(1).starting_balance().unwrap(), U256::zero());
    }

    #[test]
    fn starting_balance_is_proof_width() {
        let eon = Eon::from_records(2, Some(proof(2, 30, 100)), vec![], vec![], vec![]);
        assert_eq!(eon.starting_balance().unwrap(), U256::from(70));

        let flat = Eon::from_records(2, Some(proof(2, 5, 5)), vec![], vec![], vec![]);
        assert_eq!(flat.starting_balance().unwrap(), U256::zero());
    }

    #[test]
    fn malformed_proof_is_rejected() {
        let eon = Eon::from_records(2, Some(proof(2, 100, 30)), vec![], vec![], vec![]);
        assert!(matches!(
            eon.starting_balance(),
            Err(LedgerError::MalformedMerkleProof { .. })
        ));
    }

    #[test]
    fn construction_drops_other_eons() {
        let mut stale = transfer(1, me(), other(), 5);
        stale.eon_number = 1;
        let mut fresh = transfer(2, me(), other(), 5);
        fresh.eon_number = 2;
        let eon = Eon::from_records(
            2,
            None,
            vec![stale, fresh],
            vec![change(1, 10), change(2, 20)],
            vec![change(2, 3), change(3, 4)],
        );
        assert_eq!(eon.transfers().len(), 1);
        assert_eq!(eon.transfers()[0].id, 2);
        assert_eq!(eon.total_deposits().unwrap(), U256::from(20));
        assert_eq!(eon.total_withdrawals().unwrap(), U256::from(3));
    }

    #[test]
    fn sum_reports_overflow() {
        let amounts = [U256::MAX, U256::one()];
        assert!(matches!(
            sum(amounts.into_iter(), "deposits"),
            Err(LedgerError::Overflow("deposits"))
        ));
        assert_eq!(
            sum([U256::from(2), U256::from(3)].into_iter(), "deposits").unwrap(),
            U256::from(5)
        );
    }

    #[test]
    fn upsert_replaces_in_place() {
        let eon = Eon::empty(1)
            .with_transfer(transfer(1, me(), other(), 5))
            .with_transfer(transfer(2, me(), other(), 6));
        let updated = Transfer {
            complete: true,
            ..transfer(1, me(), other(), 5)
        };
        let next = eon.with_transfer(updated.clone());
        assert_eq!(next.transfers().len(), 2);
        assert_eq!(next.transfers()[0], updated);
        assert_eq!(next.transfers()[1].id, 2);
        // the source value is untouched
        assert!(!eon.transfers()[0].complete);

        assert_eq!(next.with_transfer(updated).transfers(), next.transfers());
    }

    #[test]
    fn latest_eon_uses_newest_proof() {
        let mut t3 = transfer(1, me(), other(), 5);
        t3.eon_number = 3;
        let mut t4 = transfer(2, me(), other(), 5);
        t4.eon_number = 4;
        let records = EonRecords {
            token: None,
            merkle_proofs: vec![proof(4, 0, 50), proof(3, 0, 10)],
            transfers: vec![t3, t4],
            deposits: vec![change(3, 1), change(4, 2)],
            withdrawals: vec![],
        };
        let eon = records.into_latest_eon(0);
        assert_eq!(eon.eon_number(), 4);
        assert_eq!(eon.merkle_proof(), Some(&proof(4, 0, 50)));
        assert_eq!(eon.transfers().len(), 1);
        assert_eq!(eon.transfers()[0].id, 2);
        assert_eq!(eon.total_deposits().unwrap(), U256::from(2));
    }

    #[test]
    fn latest_eon_without_proof_falls_back() {
        let eon = EonRecords::default().into_latest_eon(9);
        assert_eq!(eon.eon_number(), 9);
        assert!(eon.merkle_proof().is_none());
    }
}
