//! Deterministic byte encoding shared by every hash/id/signature computation.
//!
//! `serde_json::Value`'s object type is a `BTreeMap` by default (the
//! `preserve_order` feature, which would switch it to an `IndexMap`, is never
//! enabled anywhere in this workspace), so round-tripping a value through
//! `serde_json::to_value` and back to bytes already sorts every object's
//! keys lexicographically at every nesting level. Combined with `to_vec`'s
//! compact (whitespace-free) formatting, that gives us the canonical
//! encoding every hash/id/signature needs without a hand-rolled canonicalizer.
use serde::Serialize;

/// Encodes `value` as canonical bytes: sorted object keys at every nesting
/// level, no insignificant whitespace, UTF-8. Two semantically equal values
/// always produce byte-identical output.
///
/// # Panics
///
/// Panics if `value`'s `Serialize` impl fails, which only happens for types
/// with non-string map keys or that return an error from a custom
/// `serialize` method — neither applies to any type in this workspace.
#[must_use]
pub fn serialize<T: Serialize>(value: &T) -> Vec<u8> {
    let canonical: serde_json::Value =
        serde_json::to_value(value).expect("all wire types serialize infallibly");
    serde_json::to_vec(&canonical).expect("serde_json::Value always serializes")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Serialize;

    #[derive(Serialize)]
    struct Unordered {
        zebra: u8,
        apple: u8,
        mango: u8,
    }

    #[test]
    fn object_keys_are_sorted_regardless_of_declaration_order() {
        let value = Unordered {
            zebra: 1,
            apple: 2,
            mango: 3,
        };
        let bytes = serialize(&value);
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text, r#"{"apple":2,"mango":3,"zebra":1}"#);
    }
}
