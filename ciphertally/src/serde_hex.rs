// Fixed-size byte arrays as hex strings, for use in `#[serde(with)]`
use serde::{de, Deserialize, Deserializer, Serializer};
use std::convert::TryInto;

pub mod hex_32 {
    use super::*;

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(de::Error::custom)?;
        let len = bytes.len();
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| de::Error::invalid_length(len, &"32 bytes"))
    }
}
