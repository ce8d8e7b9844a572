//! Single-value field validators and normalizers.
//!
//! Every rule here is a pure function of one cell's text. Regex rules use
//! full-match semantics; the record-level reject policy (drop the row or null
//! the cell) is chosen by the caller in [`crate::clean`] and [`crate::cast`].

use std::sync::LazyLock;

use regex::Regex;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Za-z .'-]+$"));
static TEXT_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Za-z ._'-]+$"));
static PLACE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Za-z][A-Za-z .'-]*$"));
static CATEGORY_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Za-z-]+$"));
static COUNTRY_CODE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Z]{2}$"));
static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[0-9]+$"));
static CODE_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^[A-Za-z0-9]+-[A-Za-z0-9]+$"));
static PRODUCT_CODE_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(r"^[A-Za-z0-9][A-Za-z0-9]-[A-Za-z0-9]+$"));
static EXPIRY_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^(0[1-9]|1[0-2])/\d{2}$"));
static UUID_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"^[a-fA-F0-9]{8}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{4}-[a-fA-F0-9]{12}$")
});
static DECIMAL_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^-?[0-9]*\.?[0-9]+$"));
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| compile(r"^\d{4}$"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|err| panic!("invalid built-in pattern {pattern}: {err}"))
}

/// Literal placeholders that source systems emit in place of a real null.
pub const SENTINEL_NULLS: &[&str] = &["NULL", "null", "N/A", "n/a", "NaN", "nan", "None", "none"];

pub const CARD_PROVIDERS: &[&str] = &[
    "Diners Club / Carte Blanche",
    "American Express",
    "JCB 16 digit",
    "JCB 15 digit",
    "Maestro",
    "Mastercard",
    "Discover",
    "VISA 19 digit",
    "VISA 16 digit",
    "VISA 13 digit",
];

pub const STILL_AVAILABLE: &str = "Still_available";
pub const REMOVED: &str = "Removed";
pub const AVAILABILITY_MISSPELLING: &str = "Still_avaliable";

/// Country name and ISO code pairs the user dimension may contain.
pub const COUNTRY_PAIRS: &[(&str, &str)] = &[
    ("Germany", "DE"),
    ("United Kingdom", "GB"),
    ("United States", "US"),
];

/// Regex-backed acceptance rules, one per known column shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldRule {
    Name,
    /// Free text label: letters, spaces and `._'-`.
    Text,
    Place,
    Category,
    CountryCode,
    Digits,
    Code,
    ProductCode,
    Expiry,
    Uuid,
    Decimal,
    Year,
}

impl FieldRule {
    fn regex(&self) -> &'static Regex {
        match self {
            FieldRule::Name => &*NAME_RE,
            FieldRule::Text => &*TEXT_RE,
            FieldRule::Place => &*PLACE_RE,
            FieldRule::Category => &*CATEGORY_RE,
            FieldRule::CountryCode => &*COUNTRY_CODE_RE,
            FieldRule::Digits => &*DIGITS_RE,
            FieldRule::Code => &*CODE_RE,
            FieldRule::ProductCode => &*PRODUCT_CODE_RE,
            FieldRule::Expiry => &*EXPIRY_RE,
            FieldRule::Uuid => &*UUID_RE,
            FieldRule::Decimal => &*DECIMAL_RE,
            FieldRule::Year => &*YEAR_RE,
        }
    }

    pub fn pattern(&self) -> &'static str {
        self.regex().as_str()
    }

    pub fn accepts(&self, value: &str) -> bool {
        self.regex().is_match(value)
    }

    /// Returns the value unchanged when accepted, `None` (reject) otherwise.
    pub fn check(&self, value: &str) -> Option<String> {
        self.accepts(value).then(|| value.to_string())
    }
}

pub fn is_sentinel_null(value: &str) -> bool {
    let trimmed = value.trim();
    trimmed.is_empty() || SENTINEL_NULLS.contains(&trimmed)
}

pub fn is_card_provider(value: &str) -> bool {
    CARD_PROVIDERS.contains(&value)
}

/// Corrects the known availability misspelling and rejects anything outside the two literals.
pub fn normalize_availability(value: &str) -> Option<String> {
    let trimmed = value.trim();
    let corrected = if trimmed == AVAILABILITY_MISSPELLING {
        STILL_AVAILABLE
    } else {
        trimmed
    };
    [STILL_AVAILABLE, REMOVED]
        .contains(&corrected)
        .then(|| corrected.to_string())
}

pub fn is_valid_country_pair(country: &str, code: &str) -> bool {
    COUNTRY_PAIRS
        .iter()
        .any(|(name, iso)| *name == country && *iso == code)
}

/// Lowercases, trims and folds a human name to ASCII where a decomposition exists.
pub fn normalize_name(value: &str) -> Option<String> {
    let expanded = value.trim().replace('ß', "ss");
    let folded: String = expanded
        .as_str()
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    let collapsed = folded.split_whitespace().collect::<Vec<_>>().join(" ");
    (!collapsed.is_empty()).then_some(collapsed)
}

pub fn strip_non_digits(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Strips a leading currency symbol and surrounding whitespace from a price.
pub fn strip_currency(value: &str) -> String {
    value
        .trim()
        .trim_start_matches(['£', '$', '€'])
        .trim()
        .to_string()
}

/// Removes the `?` and whitespace noise the document extraction leaves in card numbers.
pub fn strip_card_noise(value: &str) -> String {
    value
        .chars()
        .filter(|c| *c != '?' && !c.is_whitespace())
        .collect()
}
