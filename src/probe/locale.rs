//! Country-specific request headers.

const DEFAULT_ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

/// Primary language per ISO 3166-1 alpha-2 country code.
const COUNTRY_LANGUAGES: &[(&str, &str)] = &[
    ("AR", "es"),
    ("AT", "de"),
    ("AU", "en"),
    ("BE", "nl"),
    ("BR", "pt"),
    ("CA", "en"),
    ("CH", "de"),
    ("CN", "zh"),
    ("CZ", "cs"),
    ("DE", "de"),
    ("DK", "da"),
    ("ES", "es"),
    ("FI", "fi"),
    ("FR", "fr"),
    ("GB", "en"),
    ("GR", "el"),
    ("HU", "hu"),
    ("IE", "en"),
    ("IN", "hi"),
    ("IT", "it"),
    ("JP", "ja"),
    ("KR", "ko"),
    ("MX", "es"),
    ("NL", "nl"),
    ("NO", "nb"),
    ("NZ", "en"),
    ("PL", "pl"),
    ("PT", "pt"),
    ("RO", "ro"),
    ("RU", "ru"),
    ("SE", "sv"),
    ("TR", "tr"),
    ("TW", "zh"),
    ("UA", "uk"),
    ("US", "en"),
];

/// `Accept-Language` value for a country code.
///
/// Known countries get their primary language with English as a fallback.
/// Unknown or missing codes get US English.
pub fn accept_language(country_code: Option<&str>) -> String {
    let Some(code) = country_code.map(|c| c.to_ascii_uppercase()) else {
        return DEFAULT_ACCEPT_LANGUAGE.to_string();
    };

    match COUNTRY_LANGUAGES.iter().find(|(c, _)| *c == code) {
        Some((_, "en")) => format!("en-{},en;q=0.9", code),
        Some((_, lang)) => format!("{lang}-{code},{lang};q=0.9,en;q=0.8"),
        None => DEFAULT_ACCEPT_LANGUAGE.to_string(),
    }
}

/// Cookie carrying the country code, for sites that localise on it.
pub fn country_cookie(country_code: &str) -> String {
    format!("country={}", country_code.to_ascii_uppercase())
}
