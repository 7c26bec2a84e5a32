//! ISBN-13 validation, ISBN-10 / EAN-13 check digits and marketplace URL synthesis.

use std::fmt;
use std::str::FromStr;

use reqwest::Url;

use crate::error::IdentifierError;
use crate::lookup::CatalogItem;

/// Marketplace product page, keyed by the 10-character legacy ISBN.
pub const MARKETPLACE_URL_PREFIX: &str = "http://www.amazon.co.jp/exec/obidos/ASIN/";
pub const MARKETPLACE_URL_SUFFIX: &str = "/ref=nosim/";

/// Leading three digits of a Bookland EAN.
pub const BOOKLAND_PREFIXES: [u64; 2] = [978, 979];

const ISBN13_LEN: usize = 13;
const PREFIX_DIVISOR: u64 = 10_000_000_000;

/// A scanned book identifier and whatever the catalog told us about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookIdentifier {
    digits: String,
    title: Option<String>,
    marketplace_url_primary: Option<Url>,
    marketplace_url_secondary: Option<Url>,
}

impl BookIdentifier {
    /// The 13 digits exactly as scanned.
    pub fn digits(&self) -> &str {
        &self.digits
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Locally derived marketplace URL. Present only for Bookland prefixes.
    pub fn marketplace_url_primary(&self) -> Option<&Url> {
        self.marketplace_url_primary.as_ref()
    }

    /// Storefront URL reported by the catalog.
    pub fn marketplace_url_secondary(&self) -> Option<&Url> {
        self.marketplace_url_secondary.as_ref()
    }

    pub fn is_bookland(&self) -> bool {
        bookland_value(&self.digits).is_some()
    }

    /// The legacy 10-character ISBN (`core9` + check character), if derivable.
    pub fn isbn10(&self) -> Option<String> {
        let value = bookland_value(&self.digits)?;
        let core = core9(value);
        Some(format!("{:09}{}", core, isbn10_check_char(core)))
    }

    /// Whether the final digit matches the EAN-13 checksum. Informational only.
    pub fn has_valid_ean13_checksum(&self) -> bool {
        ean13_check_digit(&self.digits[..ISBN13_LEN - 1])
            .map(|d| self.digits.as_bytes()[ISBN13_LEN - 1] - b'0' == d)
            .unwrap_or(false)
    }

    /// Consuming form of the fetch-completion step, for one-shot lookups.
    pub fn with_catalog_item(mut self, item: CatalogItem) -> Self {
        self.attach_catalog_item(item);
        self
    }

    /// Records the catalog's answer. The primary URL is left untouched.
    pub(crate) fn attach_catalog_item(&mut self, item: CatalogItem) {
        self.title = item.title;
        self.marketplace_url_secondary = item.storefront_url;
    }
}

impl fmt::Display for BookIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits)
    }
}

impl FromStr for BookIdentifier {
    type Err = IdentifierError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        validate(s).ok_or_else(|| IdentifierError::Invalid(s.to_string()))
    }
}

/// Accepts exactly 13 ASCII decimal digits; anything else is not a book identifier.
///
/// The primary marketplace URL is derived here, once.
pub fn validate(raw_digits: &str) -> Option<BookIdentifier> {
    if !is_thirteen_digits(raw_digits) {
        return None;
    }
    Some(BookIdentifier {
        digits: raw_digits.to_string(),
        title: None,
        marketplace_url_primary: marketplace_url(raw_digits),
        marketplace_url_secondary: None,
    })
}

/// Synthesizes the marketplace URL for a Bookland EAN, or `None`.
pub fn marketplace_url(digits: &str) -> Option<Url> {
    let core = core9(bookland_value(digits)?);
    let raw = format!(
        "{}{:09}{}{}",
        MARKETPLACE_URL_PREFIX,
        core,
        isbn10_check_char(core),
        MARKETPLACE_URL_SUFFIX
    );
    Url::parse(&raw).ok()
}

/// ISBN-10 check character over a 9-digit core: weights 10 down to 2, mod 11.
pub fn isbn10_check_char(core9: u64) -> char {
    let mut sum = 0u64;
    let mut rest = core9;
    // least-significant digit carries weight 2
    for weight in 2..=10u64 {
        sum += (rest % 10) * weight;
        rest /= 10;
    }
    match 11 - (sum % 11) {
        10 => 'X',
        11 => '0',
        d => char::from(b'0' + d as u8),
    }
}

/// EAN-13 check digit over the first 12 digits (weights 1,3,1,3...).
pub fn ean13_check_digit(first12: &str) -> Option<u8> {
    if first12.len() != ISBN13_LEN - 1 || !first12.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let sum: u32 = first12
        .bytes()
        .enumerate()
        .map(|(i, b)| u32::from(b - b'0') * if i % 2 == 0 { 1 } else { 3 })
        .sum();
    Some(((10 - sum % 10) % 10) as u8)
}

fn is_thirteen_digits(raw: &str) -> bool {
    raw.len() == ISBN13_LEN && raw.bytes().all(|b| b.is_ascii_digit())
}

fn bookland_value(raw: &str) -> Option<u64> {
    if !is_thirteen_digits(raw) {
        return None;
    }
    let value: u64 = raw.parse().ok()?;
    BOOKLAND_PREFIXES
        .contains(&(value / PREFIX_DIVISOR))
        .then_some(value)
}

fn core9(value: u64) -> u64 {
    value % PREFIX_DIVISOR / 10
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn test_validate_accepts_thirteen_digits() {
        let id = validate("9784798140628").unwrap();
        assert_eq!(id.digits(), "9784798140628");
        assert!(id.title().is_none());
        assert!(id.marketplace_url_secondary().is_none());
    }

    #[test]
    fn test_validate_rejects_other_shapes() {
        assert!(validate("").is_none());
        assert!(validate("978479814062").is_none());
        assert!(validate("97847981406281").is_none());
        assert!(validate("978479814062X").is_none());
        assert!(validate(" 978479814062").is_none());
        assert!(validate("+978479814062").is_none());
        assert!(validate("９７８４７９８１４０６２８").is_none());
    }

    #[test]
    fn test_marketplace_url_for_known_title() {
        // 4*10 + 7*9 + 9*8 + 8*7 + 1*6 + 4*5 + 0*4 + 6*3 + 2*2 = 279; 11 - 279 % 11 = 7
        let id = validate("9784798140628").unwrap();
        assert_eq!(id.isbn10().as_deref(), Some("4798140627"));
        assert_eq!(
            id.marketplace_url_primary().map(Url::as_str),
            Some("http://www.amazon.co.jp/exec/obidos/ASIN/4798140627/ref=nosim/")
        );
    }

    #[test]
    fn test_check_char_x_and_zero() {
        assert_eq!(isbn10_check_char(400_000_008), 'X');
        assert_eq!(isbn10_check_char(400_000_002), '0');
        assert_eq!(isbn10_check_char(30_640_615), '2');
    }

    #[test]
    fn test_core_is_zero_padded() {
        let url = marketplace_url("9780306406157").unwrap();
        assert_eq!(
            url.as_str(),
            "http://www.amazon.co.jp/exec/obidos/ASIN/0306406152/ref=nosim/"
        );
    }

    #[test]
    fn test_x_check_rendered_in_url() {
        let url = marketplace_url("9784000000086").unwrap();
        assert!(url.as_str().contains("/ASIN/400000008X/"));
    }

    #[test]
    fn test_non_bookland_has_no_primary_url() {
        let id = validate("4901234567894").unwrap();
        assert!(id.marketplace_url_primary().is_none());
        assert!(id.isbn10().is_none());
        assert!(!id.is_bookland());
    }

    #[test]
    fn test_ean13_check_digit() {
        assert_eq!(ean13_check_digit("978030640615"), Some(7));
        assert_eq!(ean13_check_digit("978479814062"), Some(9));
        assert_eq!(ean13_check_digit("97803064061"), None);
        assert!(validate("9780306406157").unwrap().has_valid_ean13_checksum());
        assert!(!validate("9784798140628").unwrap().has_valid_ean13_checksum());
    }

    #[test]
    fn test_from_str() {
        let id: BookIdentifier = "9784000000024".parse().unwrap();
        assert_eq!(id.to_string(), "9784000000024");
        let err = "abc".parse::<BookIdentifier>().unwrap_err();
        assert_eq!(err, IdentifierError::Invalid("abc".to_string()));
    }

    #[test]
    fn test_attach_catalog_item_keeps_primary() {
        let mut id = validate("9784798140628").unwrap();
        let primary = id.marketplace_url_primary().cloned();
        id.attach_catalog_item(CatalogItem {
            title: Some("T".to_string()),
            storefront_url: Url::parse("https://example.test/x").ok(),
        });
        assert_eq!(id.title(), Some("T"));
        assert_eq!(id.marketplace_url_primary().cloned(), primary);
        assert_eq!(
            id.marketplace_url_secondary().map(Url::as_str),
            Some("https://example.test/x")
        );
    }

    proptest! {
        #[test]
        fn prop_non_bookland_prefix_yields_no_url(prefix in 0u64..1000, rest in "[0-9]{10}") {
            prop_assume!(prefix != 978 && prefix != 979);
            let digits = format!("{:03}{}", prefix, rest);
            let id = validate(&digits).unwrap();
            prop_assert!(id.marketplace_url_primary().is_none());
        }

        #[test]
        fn prop_validate_is_deterministic(prefix in prop::sample::select(vec!["978", "979"]), rest in "[0-9]{10}") {
            let digits = format!("{}{}", prefix, rest);
            let a = validate(&digits).unwrap();
            let b = validate(&digits).unwrap();
            prop_assert!(a.marketplace_url_primary().is_some());
            prop_assert_eq!(a.marketplace_url_primary(), b.marketplace_url_primary());
        }

        #[test]
        fn prop_isbn10_is_self_consistent(core in 0u64..1_000_000_000) {
            // full ISBN-10 weighted sum (check weighted 1) is divisible by 11
            let check = match isbn10_check_char(core) {
                'X' => 10,
                c => u64::from(c.to_digit(10).unwrap()),
            };
            let mut sum = check;
            let mut rest = core;
            for weight in 2..=10u64 {
                sum += (rest % 10) * weight;
                rest /= 10;
            }
            prop_assert_eq!(sum % 11, 0);
        }
    }
}
