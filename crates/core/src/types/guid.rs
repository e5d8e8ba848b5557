//! Stable string identifier type.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing a [`Guid`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GuidError {
    /// The input string is empty.
    #[error("guid cannot be empty")]
    Empty,
    /// The input string is too long.
    #[error("guid must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input contains whitespace or control characters.
    #[error("guid cannot contain whitespace or control characters")]
    InvalidCharacter,
}

/// A stable, externally visible entity identifier.
///
/// Every storefront entity carries one next to its numeric primary key. GUIDs
/// are usually UUIDs, but fixtures and imported data may prefix them (for
/// example `(1)-3f1c...`), so only the shape is validated.
///
/// ## Constraints
///
/// - Length: 1-64 characters (the width of the `guid` columns)
/// - No whitespace or control characters
///
/// ## Examples
///
/// ```
/// use sweeper_core::Guid;
///
/// assert!(Guid::parse("6f9619ff-8b86-d011-b42d-00cf4fc964ff").is_ok());
/// assert!(Guid::parse("(7)-cart").is_ok());
///
/// assert!(Guid::parse("").is_err());
/// assert!(Guid::parse("has space").is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Guid(String);

impl Guid {
    /// Maximum length of a GUID column.
    pub const MAX_LENGTH: usize = 64;

    /// Parse a `Guid` from a string.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is empty, longer than 64 characters, or
    /// contains whitespace or control characters.
    pub fn parse(s: &str) -> Result<Self, GuidError> {
        if s.is_empty() {
            return Err(GuidError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(GuidError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(GuidError::InvalidCharacter);
        }

        Ok(Self(s.to_owned()))
    }

    /// Generate a fresh random GUID (UUID v4, hyphenated, upper case).
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().hyphenated().to_string().to_uppercase())
    }

    /// Returns the GUID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Guid {
    type Err = GuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Guid {
    type Error = GuidError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Guid> for String {
    fn from(guid: Guid) -> Self {
        guid.0
    }
}

impl AsRef<str> for Guid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Guid {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Guid {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Database values are assumed valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Guid {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_guids() {
        assert!(Guid::parse("6F9619FF-8B86-D011-B42D-00CF4FC964FF").is_ok());
        assert!(Guid::parse("(3)-C").is_ok());
        assert!(Guid::parse("x").is_ok());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Guid::parse(""), Err(GuidError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = "a".repeat(Guid::MAX_LENGTH + 1);
        assert!(matches!(Guid::parse(&long), Err(GuidError::TooLong { .. })));
    }

    #[test]
    fn test_parse_whitespace() {
        assert_eq!(Guid::parse("a b"), Err(GuidError::InvalidCharacter));
        assert_eq!(Guid::parse("ab\n"), Err(GuidError::InvalidCharacter));
    }

    #[test]
    fn test_generate_is_unique_and_valid() {
        let a = Guid::generate();
        let b = Guid::generate();
        assert_ne!(a, b);
        assert!(Guid::parse(a.as_str()).is_ok());
    }

    #[test]
    fn test_serde_rejects_invalid() {
        let guid = Guid::parse("CART-1").unwrap();
        let json = serde_json::to_string(&guid).unwrap();
        assert_eq!(json, "\"CART-1\"");
        assert!(serde_json::from_str::<Guid>("\"\"").is_err());
    }
}
