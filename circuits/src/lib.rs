//! Reusable Groth16 circuits over the BLS12-381 scalar field.
//!
//! Each circuit implements [`circuit::Circuit`] and is made available by name
//! through a [`registry::CircuitRegistry`]. Inputs are described by
//! [`circuit::CircuitInput`], and the out-of-circuit hashing that must agree
//! with the circuits lives in [`commitment`].

pub mod circuit;
pub mod commitment;
pub mod gadgets;
pub mod hash_commit;
pub mod merkle_verify;
pub mod p256_verify;
pub mod registry;

pub use circuit::{Assignment, Circuit, CircuitInput, InputError, Synthesizer};
pub use registry::CircuitRegistry;

/// Like `#[serde(with = "::hex")]`, but tolerates and emits leading `0x`
/// prefixes
#[doc(hidden)]
pub mod serde_hex {
    use serde::{de::Error as _, Deserialize as _, Deserializer, Serializer};

    pub fn serialize<S: Serializer, T>(data: T, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: hex::ToHex,
    {
        let s = data.encode_hex::<String>();
        serializer.serialize_str(&format!("0x{}", s))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, T>(deserializer: D) -> Result<T, D::Error>
    where
        T: hex::FromHex,
        T::Error: std::fmt::Display,
    {
        let s = String::deserialize(deserializer)?;
        from_prefixed_hex(&s).map_err(D::Error::custom)
    }

    fn from_prefixed_hex<T: hex::FromHex>(s: &str) -> Result<T, T::Error> {
        match s.strip_prefix("0x") {
            Some(rest) => T::from_hex(rest),
            None => T::from_hex(s),
        }
    }

    /// The same encoding for every element of a sequence.
    pub mod vec {
        use serde::{de::Error as _, ser::SerializeSeq, Deserialize as _, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(data: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
            let mut seq = serializer.serialize_seq(Some(data.len()))?;
            for item in data {
                seq.serialize_element(&format!("0x{}", hex::encode(item)))?;
            }
            seq.end()
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Vec<Vec<u8>>, D::Error> {
            Vec::<String>::deserialize(deserializer)?
                .iter()
                .map(|s| super::from_prefixed_hex(s).map_err(D::Error::custom))
                .collect()
        }
    }

}

/// Optional big integers carried as base-10 strings.
mod decimal {
    use num_bigint::BigUint;

    fn parse<E: serde::de::Error>(s: &str) -> Result<BigUint, E> {
        BigUint::parse_bytes(s.as_bytes(), 10)
            .ok_or_else(|| E::custom(format!("invalid decimal integer {s:?}")))
    }

    pub mod option {
        use num_bigint::BigUint;
        use serde::{Deserialize as _, Deserializer, Serializer};

        use super::parse;

        pub fn serialize<S: Serializer>(
            value: &Option<BigUint>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.to_str_radix(10)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<BigUint>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|s| parse(&s))
                .transpose()
        }
    }

    pub mod option_vec {
        use num_bigint::BigUint;
        use serde::{Deserialize as _, Deserializer, Serializer};

        use super::parse;

        pub fn serialize<S: Serializer>(
            value: &Option<Vec<BigUint>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer
                    .serialize_some(&v.iter().map(|x| x.to_str_radix(10)).collect::<Vec<_>>()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<Vec<BigUint>>, D::Error> {
            Option::<Vec<String>>::deserialize(deserializer)?
                .map(|v| v.iter().map(|s| parse(s)).collect::<Result<Vec<_>, _>>())
                .transpose()
        }
    }
}
