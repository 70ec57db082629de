//! Phone number validation and normalisation.

const MIN_PHONE_LENGTH: usize = 8;

/// Allow-predicate applied to candidate numbers before they are used.
#[derive(Debug, Clone, Default)]
pub struct PhoneNumberParser {
    allowed_prefixes: Option<Vec<String>>,
}

impl PhoneNumberParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only accept numbers starting with one of `prefixes`.
    pub fn with_allowed_prefixes(prefixes: Vec<String>) -> Self {
        Self {
            allowed_prefixes: Some(prefixes),
        }
    }

    pub fn is_allowed(&self, phone_number: &str) -> bool {
        match &self.allowed_prefixes {
            Some(prefixes) => prefixes.iter().any(|p| phone_number.starts_with(p.as_str())),
            None => phone_number.len() >= MIN_PHONE_LENGTH,
        }
    }

    /// Allowed candidates with the international prefix ("+" or "00") removed.
    pub fn valid_phone_numbers<'a, I>(&self, candidates: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        candidates
            .into_iter()
            .filter(|n| self.is_allowed(n))
            .map(strip_international_prefix)
            .collect()
    }
}

fn strip_international_prefix(number: &str) -> String {
    if number.starts_with('+') {
        number.trim_start_matches('+').to_string()
    } else if number.starts_with("00") {
        number.trim_start_matches('0').to_string()
    } else {
        number.to_string()
    }
}

/// Bring a number into "+<country><number>" form, assuming `default_country`
/// for national numbers.
pub fn ensure_country_code(number: &str, default_country: &str) -> String {
    if number.starts_with('+') {
        number.to_string()
    } else if number.starts_with("00") {
        format!("+{}", number.trim_start_matches('0'))
    } else if number.starts_with('0') {
        format!("+{}{}", default_country, number.trim_start_matches('0'))
    } else if number.starts_with(default_country) {
        format!("+{}", number)
    } else {
        format!("+{}{}", default_country, number)
    }
}
