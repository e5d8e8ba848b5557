//! Status enums for storefront actors.

use serde::{Deserialize, Serialize};

/// Whether a customer identity is anonymous or registered.
///
/// Anonymous customers exist only to anchor a browsing session. Registered
/// customers persist independently of any session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CustomerKind {
    Anonymous,
    Registered,
}

impl CustomerKind {
    /// Map the persisted `anonymous` flag to a kind.
    #[must_use]
    pub const fn from_anonymous(anonymous: bool) -> Self {
        if anonymous {
            Self::Anonymous
        } else {
            Self::Registered
        }
    }
}

impl std::fmt::Display for CustomerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Anonymous => write!(f, "anonymous"),
            Self::Registered => write!(f, "registered"),
        }
    }
}

impl std::str::FromStr for CustomerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anonymous" => Ok(Self::Anonymous),
            "registered" => Ok(Self::Registered),
            _ => Err(format!("invalid customer kind: {s}")),
        }
    }
}

/// Aggregate state of the carts a shopper owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CartContents {
    /// The shopper has no cart at all.
    #[default]
    NoCart,
    /// Every cart the shopper owns has zero line items.
    Empty,
    /// At least one cart has a line item.
    NonEmpty,
}

impl CartContents {
    /// Summarise the line item counts of a shopper's carts.
    #[must_use]
    pub fn from_line_item_counts<I>(counts: I) -> Self
    where
        I: IntoIterator<Item = u32>,
    {
        counts.into_iter().fold(Self::NoCart, |acc, count| match (acc, count) {
            (Self::NonEmpty, _) | (_, 1..) => Self::NonEmpty,
            _ => Self::Empty,
        })
    }

    /// Whether any cart holds a line item.
    #[must_use]
    pub const fn has_items(self) -> bool {
        matches!(self, Self::NonEmpty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_customer_kind_roundtrip() {
        for kind in [CustomerKind::Anonymous, CustomerKind::Registered] {
            assert_eq!(kind.to_string().parse::<CustomerKind>(), Ok(kind));
        }
        assert!("guest".parse::<CustomerKind>().is_err());
    }

    #[test]
    fn test_cart_contents_from_counts() {
        let cases: [(&[u32], CartContents); 4] = [
            (&[], CartContents::NoCart),
            (&[0, 0], CartContents::Empty),
            (&[0, 3], CartContents::NonEmpty),
            (&[2, 0], CartContents::NonEmpty),
        ];
        for (counts, expected) in cases {
            let contents = CartContents::from_line_item_counts(counts.iter().copied());
            assert_eq!(contents, expected, "{counts:?}");
        }
    }
}
