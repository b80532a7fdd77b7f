use crate::eon::{sum, Eon};
use crate::error::{LedgerError, LedgerResult};
use crate::hash::{address_hash, balance_marker_hash, pack_hash, Packed};
use crate::merkle::CommitmentBuilder;
use crate::storage::EonSnapshot;
use crate::transfer::{ActiveState, ActiveStateType, Transfer, WalletRef};
use ethers::types::{Address, H256, I256, U256};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SpentAndGained {
    pub spent: U256,
    pub gained: U256,
}

/// Balance accounting over one consistent eon snapshot of a wallet.
pub struct Ledger {
    wallet: WalletRef,
    contract_address: Address,
    trail_identifier: Option<u64>,
    eons: Arc<EonSnapshot>,
}

impl Ledger {
    pub fn new(
        wallet: WalletRef,
        contract_address: Address,
        trail_identifier: Option<u64>,
        eons: Arc<EonSnapshot>,
    ) -> Self {
        Self {
            wallet,
            contract_address,
            trail_identifier,
            eons,
        }
    }

    pub fn eon(&self) -> &Eon {
        &self.eons.current
    }

    pub fn previous_eon(&self) -> Option<&Eon> {
        self.eons.previous.as_deref()
    }

    pub fn eon_number(&self) -> u64 {
        self.eon().eon_number()
    }

    pub fn starting_balance(&self) -> LedgerResult<U256> {
        self.eon().starting_balance()
    }

    pub fn transfer_active_state(&self, transfer: &Transfer) -> LedgerResult<ActiveState> {
        let kind = transfer.active_state_type(&self.wallet);
        transfer
            .active_state(kind)
            .copied()
            .ok_or(LedgerError::MissingActiveState {
                id: transfer.id,
                kind,
            })
    }

    /// Matched `(out, in)` amounts of a swap accrued in the current eon only.
    pub fn current_eon_matched_amounts(&self, transfer: &Transfer) -> LedgerResult<(U256, U256)> {
        let current = transfer.matched_amounts;
        let previous = match self
            .previous_eon()
            .and_then(|eon| eon.swap_by_tx_id(&transfer.tx_id))
        {
            Some(swap) => swap.matched_amounts,
            None => return Ok((current.matched_out, current.matched_in)),
        };

        let regressed = || LedgerError::MatchedAmountsRegressed {
            tx_id: transfer.tx_id.clone(),
        };
        let matched_out = current
            .matched_out
            .checked_sub(previous.matched_out)
            .ok_or_else(regressed)?;
        let matched_in = current
            .matched_in
            .checked_sub(previous.matched_in)
            .ok_or_else(regressed)?;
        Ok((matched_out, matched_in))
    }

    /// Cumulative figures of the last transfer this wallet committed to.
    pub fn spent_and_gained(&self) -> LedgerResult<SpentAndGained> {
        let last = self
            .eon()
            .transfers()
            .iter()
            .rev()
            .find(|t| !t.is_passively_received_by(&self.wallet));
        let transfer = match last {
            Some(t) => t,
            None => return Ok(SpentAndGained::default()),
        };

        let state = self.transfer_active_state(transfer)?;
        let mut result = SpentAndGained {
            spent: state.updated_spendings,
            gained: state.updated_gains,
        };

        // An open swap leg credits what was matched so far. Earlier eons are
        // already part of the starting balance.
        let open_swap = transfer.is_swap()
            && transfer.processed
            && !transfer.complete
            && !transfer.cancelled
            && !transfer.voided;
        if open_swap
            && transfer.active_state_type(&self.wallet) == ActiveStateType::Recipient
        {
            let (_, matched_in) = self.current_eon_matched_amounts(transfer)?;
            result.gained = result
                .gained
                .checked_add(matched_in)
                .ok_or(LedgerError::Overflow("gains"))?;
        }
        Ok(result)
    }

    /// Sum of passive transfers received, these sit outside the active state.
    pub fn passively_gained(&self) -> LedgerResult<U256> {
        sum(
            self.eon()
                .transfers()
                .iter()
                .filter(|t| t.is_passively_received_by(&self.wallet))
                .map(|t| t.amount),
            "passive gains",
        )
    }

    pub fn balance(&self) -> LedgerResult<I256> {
        let state = self.spent_and_gained()?;
        let credit = sum(
            [
                self.starting_balance()?,
                self.passively_gained()?,
                state.gained,
                self.eon().total_deposits()?,
            ]
            .into_iter(),
            "balance",
        )?;
        let debit = sum(
            [state.spent, self.eon().total_withdrawals()?].into_iter(),
            "balance",
        )?;

        let credit = I256::try_from(credit).map_err(|_| LedgerError::Overflow("balance"))?;
        let debit = I256::try_from(debit).map_err(|_| LedgerError::Overflow("balance"))?;
        credit
            .checked_sub(debit)
            .ok_or(LedgerError::Overflow("balance"))
    }

    pub fn tx_set_hash(&self) -> LedgerResult<H256> {
        CommitmentBuilder::new(self.wallet, self.eon()).calculate_tx_set_hash(self.eon().transfers())
    }

    /// The value the wallet owner signs to authorize its state.
    pub fn active_state_hash(&self) -> LedgerResult<H256> {
        let trail_identifier = self.trail_identifier.ok_or(LedgerError::NotRegistered)?;
        let state = self.spent_and_gained()?;
        Ok(pack_hash(&[
            Packed::Bytes32(address_hash(self.contract_address)),
            Packed::Bytes32(address_hash(self.wallet.token)),
            Packed::Bytes32(address_hash(self.wallet.address)),
            Packed::Uint64(trail_identifier),
            Packed::Uint256(U256::from(self.eon_number())),
            Packed::Bytes32(self.tx_set_hash()?),
            Packed::Uint256(state.spent),
            Packed::Uint256(state.gained),
        ]))
    }

    pub fn balance_marker_hash(&self) -> LedgerResult<H256> {
        let balance = self.balance()?;
        if balance.is_negative() {
            return Err(LedgerError::NegativeBalance);
        }
        Ok(balance_marker_hash(
            self.contract_address,
            self.wallet.token,
            self.wallet.address,
            self.eon_number(),
            balance.into_raw(),
        ))
    }
}
