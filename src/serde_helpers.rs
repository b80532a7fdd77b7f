//! Operator JSON encodes token amounts as decimal strings and addresses with or
//! without a `0x` prefix, neither of which the `ethers` serde impls accept.

use ethers::types::{Address, U256};
use serde::{de, Deserialize, Deserializer, Serializer};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawNumber {
    Str(String),
    Num(u64),
}

fn parse_u256<E: de::Error>(raw: RawNumber) -> Result<U256, E> {
    match raw {
        RawNumber::Num(n) => Ok(U256::from(n)),
        RawNumber::Str(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x") {
                U256::from_str_radix(hex, 16).map_err(de::Error::custom)
            } else {
                U256::from_dec_str(s).map_err(de::Error::custom)
            }
        }
    }
}

/// Parses a 20 byte hex address, `0x` prefix optional.
pub fn parse_address(s: &str) -> Result<Address, String> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(hex).map_err(|e| format!("{}: {}", s, e))?;
    if bytes.len() != Address::len_bytes() {
        return Err(format!("{}: expected 20 bytes, got {}", s, bytes.len()));
    }
    Ok(Address::from_slice(&bytes))
}

pub mod u256_dec {
    use super::*;

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        parse_u256(RawNumber::deserialize(deserializer)?)
    }
}

pub mod option_u256_dec {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<U256>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<U256>, D::Error> {
        Option::<RawNumber>::deserialize(deserializer)?
            .map(parse_u256)
            .transpose()
    }
}

pub mod address {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Address, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{:#x}", value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Address, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_address(&s).map_err(de::Error::custom)
    }
}

pub mod option_address {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Address>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_str(&format!("{:#x}", v)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Address>, D::Error> {
        Option::<String>::deserialize(deserializer)?
            .map(|s| parse_address(&s).map_err(de::Error::custom))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize, Deserialize, Debug, PartialEq)]
    struct Amounts {
        #[serde(with = "u256_dec")]
        amount: U256,
        #[serde(default, with = "option_u256_dec")]
        position: Option<U256>,
        #[serde(with = "address")]
        token: Address,
    }

    #[test]
    fn accepts_decimal_hex_and_numbers() {
        let a: Amounts = serde_json::from_str(
            r#"{"amount": "1000000000000000000000", "position": 7, "token": "0x00000000000000000000000000000000000000aa"}"#,
        )
        .unwrap();
        assert_eq!(a.amount, U256::exp10(21));
        assert_eq!(a.position, Some(U256::from(7)));
        assert_eq!(a.token, Address::from_low_u64_be(0xaa));

        let b: Amounts = serde_json::from_str(
            r#"{"amount": "0xff", "token": "00000000000000000000000000000000000000AA"}"#,
        )
        .unwrap();
        assert_eq!(b.amount, U256::from(255));
        assert_eq!(b.position, None);
        assert_eq!(b.token, a.token);
    }

    #[test]
    fn rejects_short_address() {
        assert!(parse_address("0x1234").is_err());
        assert!(parse_address("not hex").is_err());
    }

    #[test]
    fn serializes_amounts_as_decimal_strings() {
        let a = Amounts {
            amount: U256::from(42),
            position: None,
            token: Address::from_low_u64_be(1),
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["amount"], "42");
        assert_eq!(json["token"], "0x0000000000000000000000000000000000000001");
    }
}
