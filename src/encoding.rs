//! Serde adapters for the JSON surfaces (call envelopes, events, snapshots).

/// Byte strings as lowercase hex.
pub(crate) mod hex_bytes {
    use std::fmt::Display;

    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S, T>(value: &T, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
        T: AsRef<[u8]>,
    {
        serializer.serialize_str(&hex::encode(value))
    }

    pub fn deserialize<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: hex::FromHex,
        T::Error: Display,
    {
        let encoded = String::deserialize(deserializer)?;
        T::from_hex(encoded.trim()).map_err(D::Error::custom)
    }
}

pub(crate) mod hex_digest_opt {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<[u8; 32]>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(bytes) => serializer.serialize_some(&hex::encode(bytes)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<[u8; 32]>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = Option::<String>::deserialize(deserializer)?;
        encoded
            .map(|s| <[u8; 32] as hex::FromHex>::from_hex(s.trim()).map_err(D::Error::custom))
            .transpose()
    }
}

/// Base-unit amounts as decimal strings. 128-bit integers do not survive
/// serde's buffered (internally tagged) enums or most JSON consumers.
pub(crate) mod amount {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use crate::units::Amount;

    pub fn serialize<S>(value: &Amount, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(value)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Amount, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        encoded.trim().parse().map_err(D::Error::custom)
    }
}
