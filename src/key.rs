//! Storage key decomposition
//!
//! Every key in a TSM index has the shape
//!
//! ```text
//! <series key>#!~#<field name>
//! <measurement>[,<tag>=<value>]*#!~#<field name>
//! ```
//!
//! The separator never occurs inside a legitimate series key or field name,
//! so splitting on its first occurrence is unambiguous. Measurement names may
//! contain escaped commas and spaces (`\,`, `\ `).

use std::borrow::Cow;

/// Reserved token between the series key and the field name
pub const FIELD_KEY_SEPARATOR: &[u8] = b"#!~#";

/// Split a raw storage key into `(series_key, field_name)`.
///
/// Splits on the first separator. A key without a separator is returned
/// whole as the series key with an empty field name.
///
/// ```
/// use kuba_inspect::key::split_key;
///
/// let (series, field) = split_key(b"cpu,host=a#!~#usage_idle");
/// assert_eq!(series, b"cpu,host=a");
/// assert_eq!(field, b"usage_idle");
/// ```
pub fn split_key(key: &[u8]) -> (&[u8], &[u8]) {
    match memchr::memmem::find(key, FIELD_KEY_SEPARATOR) {
        Some(pos) => (&key[..pos], &key[pos + FIELD_KEY_SEPARATOR.len()..]),
        None => (key, &[]),
    }
}

/// Build a raw storage key from its parts
pub fn join_key(series_key: &[u8], field: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(series_key.len() + FIELD_KEY_SEPARATOR.len() + field.len());
    key.extend_from_slice(series_key);
    key.extend_from_slice(FIELD_KEY_SEPARATOR);
    key.extend_from_slice(field);
    key
}

/// Extract the measurement from a series key, unescaping `\,` and `\ `.
///
/// Borrows when the name carries no escapes.
pub fn measurement(series_key: &[u8]) -> Cow<'_, [u8]> {
    let mut end = series_key.len();
    let mut escaped = false;
    let mut i = 0;
    while i < series_key.len() {
        match series_key[i] {
            b'\\' => {
                escaped = true;
                i += 2;
                continue;
            },
            b',' => {
                end = i;
                break;
            },
            _ => {},
        }
        i += 1;
    }

    let raw = &series_key[..end];
    if !escaped {
        return Cow::Borrowed(raw);
    }

    let mut name = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' && i + 1 < raw.len() && matches!(raw[i + 1], b',' | b' ') {
            name.push(raw[i + 1]);
            i += 2;
        } else {
            name.push(raw[i]);
            i += 1;
        }
    }
    Cow::Owned(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_on_separator() {
        let (series, field) = split_key(b"mem,host=a#!~#used");
        assert_eq!(series, b"mem,host=a");
        assert_eq!(field, b"used");
    }

    #[test]
    fn test_split_uses_first_separator() {
        let (series, field) = split_key(b"cpu#!~#a#!~#b");
        assert_eq!(series, b"cpu");
        assert_eq!(field, b"a#!~#b");
    }

    #[test]
    fn test_split_without_separator() {
        let (series, field) = split_key(b"cpu,host=a");
        assert_eq!(series, b"cpu,host=a");
        assert!(field.is_empty());
    }

    #[test]
    fn test_split_empty_key() {
        let (series, field) = split_key(b"");
        assert!(series.is_empty());
        assert!(field.is_empty());
    }

    #[test]
    fn test_join_reverses_split() {
        let key = join_key(b"cpu,host=a", b"value");
        assert_eq!(key, b"cpu,host=a#!~#value".to_vec());
        assert_eq!(split_key(&key), (&b"cpu,host=a"[..], &b"value"[..]));
    }

    #[test]
    fn test_measurement_plain() {
        assert_eq!(measurement(b"cpu,host=a,region=us").as_ref(), b"cpu");
        assert!(matches!(measurement(b"cpu,host=a"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_measurement_without_tags() {
        assert_eq!(measurement(b"uptime").as_ref(), b"uptime");
    }

    #[test]
    fn test_measurement_with_escapes() {
        assert_eq!(measurement(br"disk\,io,host=a").as_ref(), b"disk,io");
        assert_eq!(measurement(br"net\ rx,iface=eth0").as_ref(), b"net rx");
    }

    #[test]
    fn test_measurement_keeps_other_backslashes() {
        assert_eq!(measurement(br"a\b,t=v").as_ref(), br"a\b");
    }

    #[test]
    fn test_measurement_trailing_backslash() {
        assert_eq!(measurement(br"weird\").as_ref(), br"weird\");
    }

    #[test]
    fn test_measurement_keeps_invalid_utf8() {
        assert_eq!(measurement(b"m\xff,a=1").as_ref(), b"m\xff");
        assert_ne!(measurement(b"m\xff,a=1"), measurement(b"m\xfe,a=1"));
    }
}
