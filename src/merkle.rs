//! Commitment to a wallet's transaction set.
//!
//! Leaves are transfer hashes in insertion order, right padded to a power of
//! two with empty leaves. The tree is split at `len / 2` at every level and a
//! node commits to the height of its left child, so the result matches the
//! on-chain verifier byte for byte.

use crate::eon::Eon;
use crate::error::LedgerResult;
use crate::hash::{address_hash, pack_hash, Packed, EMPTY_HASH};
use crate::transfer::{Transfer, WalletRef};
use ethers::types::{H256, U256};

#[derive(Debug, Clone, Copy)]
pub enum Leaf<'a> {
    Transfer(&'a Transfer),
    Padding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleNode {
    pub height: u32,
    pub hash: H256,
    pub left: Option<Box<MerkleNode>>,
    pub right: Option<Box<MerkleNode>>,
}

impl MerkleNode {
    fn leaf(hash: H256) -> Self {
        Self {
            height: 0,
            hash,
            left: None,
            right: None,
        }
    }
}

/// Hashes transfers from the perspective of one wallet within one eon.
pub struct CommitmentBuilder<'a> {
    wallet: WalletRef,
    eon: &'a Eon,
}

impl<'a> CommitmentBuilder<'a> {
    pub fn new(wallet: WalletRef, eon: &'a Eon) -> Self {
        Self { wallet, eon }
    }

    pub fn transfer_hash(&self, leaf: &Leaf<'_>) -> LedgerResult<H256> {
        match leaf {
            Leaf::Padding => Ok(EMPTY_HASH),
            Leaf::Transfer(t) if t.is_swap() => self.swap_transfer_hash(t),
            Leaf::Transfer(t) => Ok(self.normal_transfer_hash(t)),
        }
    }

    pub fn normal_transfer_hash(&self, transfer: &Transfer) -> H256 {
        let nonce = if transfer.passive {
            let position = transfer.position.unwrap_or(U256::MAX);
            U256::from_big_endian(
                pack_hash(&[Packed::Uint256(position), Packed::Uint256(transfer.nonce)]).as_bytes(),
            )
        } else {
            transfer.nonce
        };

        let target = if transfer.is_outgoing_for(&self.wallet) {
            transfer.recipient.address
        } else {
            self.wallet.address
        };

        pack_hash(&[
            Packed::Bytes32(address_hash(target)),
            Packed::Uint256(transfer.amount),
            Packed::Uint64(transfer.recipient_trail_identifier),
            Packed::Uint256(nonce),
        ])
    }

    pub fn swap_transfer_hash(&self, transfer: &Transfer) -> LedgerResult<H256> {
        let fulfilled = !transfer.is_outgoing_for(&self.wallet)
            && (transfer.complete || transfer.cancelled);
        let starting_balance = if fulfilled {
            U256::MAX
        } else {
            self.eon.starting_balance()?
        };

        Ok(pack_hash(&[
            Packed::Bytes32(address_hash(transfer.wallet.token)),
            Packed::Bytes32(address_hash(transfer.recipient.token)),
            Packed::Uint64(transfer.recipient_trail_identifier),
            Packed::Uint256(transfer.amount),
            Packed::Uint256(transfer.amount_swapped),
            Packed::Uint256(starting_balance),
            Packed::Uint256(transfer.nonce),
        ]))
    }

    /// Transfers this wallet commits to, padded to the next power of two.
    pub fn padded_leaves<'t>(&self, transfers: &'t [Transfer]) -> Vec<Leaf<'t>> {
        let mut leaves: Vec<Leaf<'t>> = transfers
            .iter()
            .filter(|t| !t.is_passively_received_by(&self.wallet))
            .map(Leaf::Transfer)
            .collect();
        if !leaves.is_empty() {
            leaves.resize(leaves.len().next_power_of_two(), Leaf::Padding);
        }
        leaves
    }

    pub fn calculate_tx_set_hash(&self, transfers: &[Transfer]) -> LedgerResult<H256> {
        let leaves = self.padded_leaves(transfers);
        Ok(self.construct_merkle_tree(&leaves)?.hash)
    }

    pub fn construct_merkle_tree(&self, leaves: &[Leaf<'_>]) -> LedgerResult<MerkleNode> {
        match leaves {
            [] => Ok(MerkleNode::leaf(EMPTY_HASH)),
            [leaf] => Ok(MerkleNode::leaf(self.transfer_hash(leaf)?)),
            _ => {
                let (left, right) = leaves.split_at(leaves.len() / 2);
                let left = self.construct_merkle_tree(left)?;
                let right = self.construct_merkle_tree(right)?;
                let hash = pack_hash(&[
                    Packed::Uint32(left.height),
                    Packed::Bytes32(left.hash),
                    Packed::Bytes32(right.hash),
                ]);
                Ok(MerkleNode {
                    height: left.height + 1,
                    hash,
                    left: Some(Box::new(left)),
                    right: Some(Box::new(right)),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eon::MerkleProof;
    use crate::transfer::tests::{me, other, swap, transfer};

    fn node(left: &MerkleNode, right: H256) -> H256 {
        pack_hash(&[
            Packed::Uint32(left.height),
            Packed::Bytes32(left.hash),
            Packed::Bytes32(right),
        ])
    }

    #[test]
    fn empty_tree() {
        let eon = Eon::empty(1);
        let builder = CommitmentBuilder::new(me(), &eon);
        let root = builder.construct_merkle_tree(&[]).unwrap();
        assert_eq!(root.height, 0);
        assert_eq!(root.hash, EMPTY_HASH);
        assert_eq!(builder.calculate_tx_set_hash(&[]).unwrap(), EMPTY_HASH);
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let eon = Eon::empty(1);
        let builder = CommitmentBuilder::new(me(), &eon);
        let t = transfer(1, me(), other(), 10);
        let root = builder.construct_merkle_tree(&[Leaf::Transfer(&t)]).unwrap();
        assert_eq!(root.height, 0);
        assert_eq!(root.hash, builder.transfer_hash(&Leaf::Transfer(&t)).unwrap());
    }

    #[test]
    fn padding_hashes_to_empty() {
        let eon = Eon::empty(1);
        let builder = CommitmentBuilder::new(me(), &eon);
        assert_eq!(builder.transfer_hash(&Leaf::Padding).unwrap(), EMPTY_HASH);
    }

    #[test]
    fn pads_to_next_power_of_two() {
        let eon = Eon::empty(1);
        let builder = CommitmentBuilder::new(me(), &eon);
        let transfers: Vec<Transfer> = (1..=5).map(|i| transfer(i, me(), other(), i)).collect();
        let leaves = builder.padded_leaves(&transfers);
        assert_eq!(leaves.len(), 8);
        assert!(leaves[5..].iter().all(|l| matches!(l, Leaf::Padding)));
        assert_eq!(builder.padded_leaves(&transfers[..4]).len(), 4);
        assert_eq!(builder.padded_leaves(&transfers[..1]).len(), 1);
    }

    #[test]
    fn three_transfers_build_a_padded_four_leaf_tree() {
        let eon = Eon::empty(1);
        let builder = CommitmentBuilder::new(me(), &eon);
        let transfers: Vec<Transfer> = (1..=3).map(|i| transfer(i, me(), other(), i)).collect();
        let h: Vec<H256> = transfers
            .iter()
            .map(|t| builder.normal_transfer_hash(t))
            .collect();

        let leaves = builder.padded_leaves(&transfers);
        let root = builder.construct_merkle_tree(&leaves).unwrap();
        assert_eq!(root.height, 2);

        let left = MerkleNode::leaf(h[0]);
        let left = MerkleNode {
            height: 1,
            hash: node(&left, h[1]),
            ..MerkleNode::leaf(H256::zero())
        };
        let right_leaf = MerkleNode::leaf(h[2]);
        let right = node(&right_leaf, EMPTY_HASH);
        assert_eq!(root.hash, node(&left, right));
        assert_eq!(builder.calculate_tx_set_hash(&transfers).unwrap(), root.hash);
    }

    #[test]
    fn odd_split_puts_remainder_right() {
        let eon = Eon::empty(1);
        let builder = CommitmentBuilder::new(me(), &eon);
        let transfers: Vec<Transfer> = (1..=3).map(|i| transfer(i, me(), other(), i)).collect();
        let leaves: Vec<Leaf> = transfers.iter().map(Leaf::Transfer).collect();
        let root = builder.construct_merkle_tree(&leaves).unwrap();
        let left = root.left.as_ref().unwrap();
        let right = root.right.as_ref().unwrap();
        assert_eq!(left.height, 0);
        assert_eq!(right.height, 1);
        assert_eq!(root.height, 1);
    }

    #[test]
    fn passively_received_transfers_are_not_committed() {
        let eon = Eon::empty(1);
        let builder = CommitmentBuilder::new(me(), &eon);
        let sent = transfer(1, me(), other(), 10);
        let received = Transfer {
            passive: true,
            ..transfer(2, other(), me(), 20)
        };
        let passive_sent = Transfer {
            passive: true,
            ..transfer(3, me(), other(), 30)
        };
        let transfers = [sent, received.clone(), passive_sent];
        let leaves = builder.padded_leaves(&transfers);
        assert_eq!(leaves.len(), 2);
        let ids: Vec<u64> = leaves
            .iter()
            .filter_map(|l| match l {
                Leaf::Transfer(t) => Some(t.id),
                Leaf::Padding => None,
            })
            .collect();
        assert_eq!(ids, vec![1, 3]);

        assert_eq!(
            builder.calculate_tx_set_hash(&[received]).unwrap(),
            EMPTY_HASH
        );
    }

    #[test]
    fn passive_nonce_is_position_ordered() {
        let eon = Eon::empty(1);
        let builder = CommitmentBuilder::new(me(), &eon);
        let t = Transfer {
            passive: true,
            ..transfer(1, me(), other(), 10)
        };
        let unpositioned = builder.normal_transfer_hash(&t);
        let expected_nonce = U256::from_big_endian(
            pack_hash(&[Packed::Uint256(U256::MAX), Packed::Uint256(t.nonce)]).as_bytes(),
        );
        let expected = pack_hash(&[
            Packed::Bytes32(address_hash(other().address)),
            Packed::Uint256(t.amount),
            Packed::Uint64(t.recipient_trail_identifier),
            Packed::Uint256(expected_nonce),
        ]);
        assert_eq!(unpositioned, expected);

        let positioned = Transfer {
            position: Some(U256::from(3)),
            ..t
        };
        assert_ne!(builder.normal_transfer_hash(&positioned), unpositioned);
    }

    #[test]
    fn swap_hash_marks_fulfilled_incoming_swaps() {
        let eon = Eon::from_records(
            1,
            Some(MerkleProof {
                eon_number: 1,
                left: U256::from(10),
                right: U256::from(60),
            }),
            vec![],
            vec![],
            vec![],
        );
        let builder = CommitmentBuilder::new(me(), &eon);
        let incoming = swap(1, other(), me(), 10, 5);

        let with_balance = |starting: U256, t: &Transfer| {
            pack_hash(&[
                Packed::Bytes32(address_hash(t.wallet.token)),
                Packed::Bytes32(address_hash(t.recipient.token)),
                Packed::Uint64(t.recipient_trail_identifier),
                Packed::Uint256(t.amount),
                Packed::Uint256(t.amount_swapped),
                Packed::Uint256(starting),
                Packed::Uint256(t.nonce),
            ])
        };

        assert_eq!(
            builder.swap_transfer_hash(&incoming).unwrap(),
            with_balance(U256::from(50), &incoming)
        );
        let complete = Transfer {
            complete: true,
            ..incoming.clone()
        };
        assert_eq!(
            builder.swap_transfer_hash(&complete).unwrap(),
            with_balance(U256::MAX, &complete)
        );

        // the sender keeps its starting balance even once terminal
        let outgoing = Transfer {
            cancelled: true,
            ..swap(2, me(), other(), 10, 5)
        };
        assert_eq!(
            builder.transfer_hash(&Leaf::Transfer(&outgoing)).unwrap(),
            with_balance(U256::from(50), &outgoing)
        );
    }
}
