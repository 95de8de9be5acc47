//! Canonical channel addressing: phone-number strings to WhatsApp JIDs.

/// Address-type suffix for individual user JIDs.
pub const ADDRESS_SUFFIX: &str = "s.whatsapp.net";

/// Canonicalize a phone-number-like string into the channel's address form.
///
/// Rules, in order: a leading trunk-prefix digit is replaced by the country
/// calling code; else a leading `+` is stripped; else the input passes
/// through unchanged. The JID suffix is always appended. No validation
/// beyond this — a malformed number is forwarded as-is and surfaces as a
/// delivery error at the channel layer.
pub fn normalize_address(phone: &str, country_code: &str, trunk_prefix: &str) -> String {
    let phone = phone.trim();
    let number = if let Some(rest) = phone.strip_prefix(trunk_prefix) {
        format!("{}{}", country_code, rest)
    } else if let Some(rest) = phone.strip_prefix('+') {
        rest.to_string()
    } else {
        phone.to_string()
    };
    format!("{}@{}", number, ADDRESS_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_number_gets_country_code() {
        assert_eq!(
            normalize_address("0712345678", "254", "0"),
            "254712345678@s.whatsapp.net"
        );
    }

    #[test]
    fn international_number_loses_plus() {
        assert_eq!(
            normalize_address("+254712345678", "254", "0"),
            "254712345678@s.whatsapp.net"
        );
    }

    #[test]
    fn canonical_number_passes_through() {
        assert_eq!(
            normalize_address("254712345678", "254", "0"),
            "254712345678@s.whatsapp.net"
        );
    }

    #[test]
    fn surrounding_whitespace_is_trimmed() {
        assert_eq!(
            normalize_address(" 0712345678 ", "254", "0"),
            "254712345678@s.whatsapp.net"
        );
    }

    #[test]
    fn malformed_input_is_forwarded_as_is() {
        assert_eq!(
            normalize_address("not-a-number", "254", "0"),
            "not-a-number@s.whatsapp.net"
        );
    }
}
