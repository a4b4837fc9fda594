//! Attribute-string tokenizer (§4.4 "Attribute tokenizer").
//!
//! Grounded on PISA's `gtf.c::split_gff`: strip trailing whitespace/`;`, then
//! repeatedly read a key (stopping at whitespace or `;`), skip separators, and read a
//! quoted or unquoted value. This is GTF's `key "value";` grammar, not GFF3's
//! `key=value;` — matching the original exactly, `=` is not a stop character, so this
//! tokenizer is not meant to (and does not) split GFF3-style attributes.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrPair {
    pub key: String,
    pub value: String,
}

/// Tokenize one GTF attribute column into key/value pairs. Empty keys are dropped (the
/// caller is expected to log a warning — see `gtf::model`).
///
/// Returns `(pairs, n_empty_keys)` so the caller can emit exactly one warning per empty
/// key without this module depending on a logging facade.
pub fn tokenize(attr: &str) -> (Vec<AttrPair>, usize) {
    let bytes = attr.as_bytes();
    let mut end = bytes.len();
    while end > 0 && (is_space(bytes[end - 1]) || bytes[end - 1] == b';') {
        end -= 1;
    }
    let bytes = &bytes[..end];

    let mut pairs = Vec::new();
    let mut empty_keys = 0usize;
    let mut i = 0usize;
    let len = bytes.len();

    while i < len {
        let key_start = i;
        while i < len && !is_space(bytes[i]) && bytes[i] != b';' {
            i += 1;
        }
        let key = &bytes[key_start..i];

        while i < len && (is_space(bytes[i]) || bytes[i] == b';') {
            i += 1;
        }

        let mut value = String::new();
        if i < len && bytes[i] == b'"' {
            i += 1;
            loop {
                if i >= len {
                    break;
                }
                if bytes[i] == b'"' {
                    i += 1; // closing quote
                    if i < len && bytes[i] == b';' {
                        i += 1;
                    }
                    break;
                }
                value.push(bytes[i] as char);
                i += 1;
            }
        } else {
            let value_start = i;
            while i < len && bytes[i] != b';' {
                i += 1;
            }
            value.push_str(std::str::from_utf8(&bytes[value_start..i]).unwrap_or(""));
            if i < len && bytes[i] == b';' {
                i += 1;
            }
        }

        while i < len && (is_space(bytes[i]) || bytes[i] == b';') {
            i += 1;
        }

        if key.is_empty() {
            empty_keys += 1;
            continue;
        }
        pairs.push(AttrPair {
            key: std::str::from_utf8(key).unwrap_or("").to_string(),
            value,
        });
    }

    (pairs, empty_keys)
}

fn is_space(b: u8) -> bool {
    b == b' ' || b == b'\t' || b == b'\r' || b == b'\n'
}
