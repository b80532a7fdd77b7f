use ethers::types::{Address, H256, U256};
use ethers::utils::keccak256;

/// Hash of a padding leaf and of an empty transaction set.
pub const EMPTY_HASH: H256 = H256([0u8; 32]);

/// A typed value in a packed encoding, sized the way solidity's
/// `abi.encodePacked` sizes it.
#[derive(Debug, Clone, Copy)]
pub enum Packed {
    Address(Address),
    Bytes32(H256),
    Uint256(U256),
    Uint64(u64),
    Uint32(u32),
}

impl Packed {
    fn write_to(&self, out: &mut Vec<u8>) {
        match self {
            Packed::Address(a) => out.extend_from_slice(a.as_bytes()),
            Packed::Bytes32(h) => out.extend_from_slice(h.as_bytes()),
            Packed::Uint256(v) => {
                let mut word = [0u8; 32];
                v.to_big_endian(&mut word);
                out.extend_from_slice(&word);
            }
            Packed::Uint64(v) => out.extend_from_slice(&v.to_be_bytes()),
            Packed::Uint32(v) => out.extend_from_slice(&v.to_be_bytes()),
        }
    }
}

/// `keccak256(abi.encodePacked(fields...))`
pub fn pack_hash(fields: &[Packed]) -> H256 {
    let mut buf = Vec::with_capacity(fields.len() * 32);
    for field in fields {
        field.write_to(&mut buf);
    }
    H256::from(keccak256(&buf))
}

pub fn address_hash(address: Address) -> H256 {
    pack_hash(&[Packed::Address(address)])
}

/// Signable marker binding a wallet to a (non negative) balance at `eon_number`.
pub fn balance_marker_hash(
    contract_address: Address,
    token_address: Address,
    wallet_address: Address,
    eon_number: u64,
    balance: U256,
) -> H256 {
    pack_hash(&[
        Packed::Bytes32(address_hash(contract_address)),
        Packed::Bytes32(address_hash(token_address)),
        Packed::Bytes32(address_hash(wallet_address)),
        Packed::Uint256(U256::from(eon_number)),
        Packed::Uint256(balance),
    ])
}

/// Signable freeze request for a pending swap.
pub fn swap_freeze_hash(debit_token: Address, credit_token: Address, nonce: U256) -> H256 {
    pack_hash(&[
        Packed::Bytes32(address_hash(debit_token)),
        Packed::Bytes32(address_hash(credit_token)),
        Packed::Uint256(nonce),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_with_solidity_widths() {
        let fields = [
            Packed::Address(Address::from_low_u64_be(1)),
            Packed::Uint64(2),
            Packed::Uint32(3),
            Packed::Uint256(U256::from(4)),
        ];
        let mut expected = Vec::new();
        expected.extend_from_slice(Address::from_low_u64_be(1).as_bytes());
        expected.extend_from_slice(&2u64.to_be_bytes());
        expected.extend_from_slice(&3u32.to_be_bytes());
        let mut word = [0u8; 32];
        word[31] = 4;
        expected.extend_from_slice(&word);
        assert_eq!(expected.len(), 20 + 8 + 4 + 32);
        assert_eq!(pack_hash(&fields), H256::from(keccak256(&expected)));
    }

    #[test]
    fn keccak_of_empty_input() {
        // well known keccak256("")
        assert_eq!(
            format!("{:#x}", pack_hash(&[])),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn address_hash_is_keccak_of_20_bytes() {
        let a = Address::from_low_u64_be(0xdead);
        assert_eq!(address_hash(a), H256::from(keccak256(a.as_bytes())));
    }

    #[test]
    fn balance_marker_depends_on_balance() {
        let c = Address::from_low_u64_be(1);
        let t = Address::from_low_u64_be(2);
        let w = Address::from_low_u64_be(3);
        assert_ne!(
            balance_marker_hash(c, t, w, 5, U256::from(10)),
            balance_marker_hash(c, t, w, 5, U256::from(11))
        );
    }
}
