use std::fmt::{Display, Formatter};
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::StoreError;

/// Collection that every guestbook record belongs to.
pub const GREETING_KIND: &str = "Greeting";

const KIND_ID_SEPARATOR: char = ':';

/// Reference to one record: a collection name plus a positive numeric id.
///
/// The string form produced by [`Key::encode`] is unpadded URL-safe base64 of
/// `<kind>:<id>`, so it can be embedded directly in a URL path segment.
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Key {
    kind: String,
    id: i64,
}

impl Key {
    /// Build a key from its parts.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` when the kind is not an identifier or the id is not positive.
    pub fn new(kind: &str, id: i64) -> Result<Self, StoreError> {
        validate_kind(kind)?;
        if id <= 0 {
            return Err(StoreError::InvalidKeyFormat(format!("key id must be positive, got {id}")));
        }
        Ok(Self { kind: kind.to_string(), id })
    }

    /// Key for a record in the `Greeting` collection.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` when the id is not positive.
    pub fn greeting(id: i64) -> Result<Self, StoreError> {
        Self::new(GREETING_KIND, id)
    }

    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn id(&self) -> i64 {
        self.id
    }

    #[must_use]
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}{KIND_ID_SEPARATOR}{}", self.kind, self.id))
    }

    /// Parse a token produced by [`Key::encode`]. Only syntax is checked.
    ///
    /// # Errors
    /// Returns `InvalidKeyFormat` when the token is not canonical base64 of `<kind>:<id>`.
    pub fn decode(token: &str) -> Result<Self, StoreError> {
        let raw = URL_SAFE_NO_PAD.decode(token).map_err(|err| {
            StoreError::InvalidKeyFormat(format!("token {token:?} is not url-safe base64: {err}"))
        })?;
        let text = String::from_utf8(raw).map_err(|_| {
            StoreError::InvalidKeyFormat(format!("token {token:?} does not decode to UTF-8"))
        })?;
        let (kind, id) = text.split_once(KIND_ID_SEPARATOR).ok_or_else(|| {
            StoreError::InvalidKeyFormat(format!("token {token:?} has no kind separator"))
        })?;
        let id = parse_canonical_id(id)?;
        Self::new(kind, id)
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl FromStr for Key {
    type Err = StoreError;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        Self::decode(token)
    }
}

impl Serialize for Key {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encode())
    }
}

impl<'de> Deserialize<'de> for Key {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let token = String::deserialize(deserializer)?;
        Self::decode(&token).map_err(serde::de::Error::custom)
    }
}

fn validate_kind(kind: &str) -> Result<(), StoreError> {
    let mut chars = kind.chars();
    let valid = chars.next().is_some_and(|first| first.is_ascii_alphabetic())
        && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKeyFormat(format!("invalid key kind: {kind:?}")))
    }
}

fn parse_canonical_id(raw: &str) -> Result<i64, StoreError> {
    let invalid = || StoreError::InvalidKeyFormat(format!("invalid key id: {raw:?}"));
    let id = raw.parse::<i64>().map_err(|_| invalid())?;
    // Rejects "+7", "007" and friends so that each key has exactly one token.
    if id.to_string() != raw {
        return Err(invalid());
    }
    Ok(id)
}
