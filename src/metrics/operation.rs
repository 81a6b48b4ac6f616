//! Canonical operation names.
//!
//! Both source systems export free-text step names such as
//! `"CZM 线切割-慢丝（可外协）"`. Merging records across systems needs one
//! name per process, so the system prefix and outsourcing annotations are
//! dropped and process variants collapse onto their family.

/// Token the source systems put in front of every step name.
const SYSTEM_PREFIX: &str = "CZM";

/// Marker found inside outsourcing annotations (`（可外协）`, `(外协)`).
const OUTSOURCING_MARKER: &str = "外协";

/// Process families whose variants (`<family>-<variant>`) merge onto the family.
static VARIANT_FAMILIES: &[&str] = &["线切割", "数控铣", "纵切车", "数控车", "车削", "锯"];

const VARIANT_SEPARATORS: &[char] = &['-', '－', '_'];

/// Maps a raw step name onto the canonical vocabulary.
///
/// Total over all input: `None` and blank strings map to `""`, unknown names
/// pass through with only prefix and annotation stripping applied. The result
/// is a fixed point, so `normalize(Some(&normalize(x))) == normalize(x)`.
pub fn normalize(raw: Option<&str>) -> String {
    let mut current = match raw {
        Some(s) => s.trim().to_string(),
        None => return String::new(),
    };

    // Every rewrite shortens the string, so this terminates.
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(name: &str) -> String {
    let stripped = strip_prefix(name.trim());
    let stripped = strip_outsourcing(stripped);
    merge_variant(stripped.trim()).to_string()
}

fn strip_prefix(name: &str) -> &str {
    match name.strip_prefix(SYSTEM_PREFIX) {
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => name,
    }
}

fn strip_outsourcing(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut rest = name;

    while let Some(open) = rest.find(['(', '（']) {
        let after_open = open + rest[open..].chars().next().map_or(1, char::len_utf8);
        let Some(close_rel) = rest[after_open..].find([')', '）']) else {
            break;
        };
        let close = after_open + close_rel;
        let close_end = close + rest[close..].chars().next().map_or(1, char::len_utf8);

        out.push_str(&rest[..open]);
        if !rest[after_open..close].contains(OUTSOURCING_MARKER) {
            out.push_str(&rest[open..close_end]);
        }
        rest = &rest[close_end..];
    }

    out.push_str(rest);
    out
}

fn merge_variant(name: &str) -> &str {
    for &family in VARIANT_FAMILIES {
        if let Some(rest) = name.strip_prefix(family) {
            if rest.starts_with(VARIANT_SEPARATORS) {
                return family;
            }
        }
    }
    name
}
