//! Canonical byte forms.
//!
//! Text is validated and kept verbatim. Binary is opaque. Structured content
//! is parsed as JSON and re-emitted compactly; `serde_json::Map` is ordered,
//! so object keys come out sorted.

use std::borrow::Cow;

use crs_types::ContentKind;

use crate::hasher::HasherError;

/// Produce the canonical bytes for a payload of the given kind.
pub fn canonicalize(kind: ContentKind, data: &[u8]) -> Result<Cow<'_, [u8]>, HasherError> {
    match kind {
        ContentKind::Binary => Ok(Cow::Borrowed(data)),
        ContentKind::Text => {
            std::str::from_utf8(data).map_err(|e| HasherError::InvalidUtf8(e.to_string()))?;
            Ok(Cow::Borrowed(data))
        }
        ContentKind::Structured => {
            let value: serde_json::Value = serde_json::from_slice(data)
                .map_err(|e| HasherError::InvalidJson(e.to_string()))?;
            let canonical = serde_json::to_vec(&value)
                .map_err(|e| HasherError::InvalidJson(e.to_string()))?;
            Ok(Cow::Owned(canonical))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn binary_is_borrowed() {
        let data = [1u8, 2, 3];
        assert!(matches!(
            canonicalize(ContentKind::Binary, &data).unwrap(),
            Cow::Borrowed(_)
        ));
    }

    #[test]
    fn nested_keys_are_sorted() {
        let out = canonicalize(
            ContentKind::Structured,
            br#"{ "z": {"y": 1, "x": [3, 2]}, "a": null }"#,
        )
        .unwrap();
        assert_eq!(&*out, br#"{"a":null,"z":{"x":[3,2],"y":1}}"#);
    }

    #[test]
    fn invalid_json_is_rejected() {
        assert!(matches!(
            canonicalize(ContentKind::Structured, b"{not json"),
            Err(HasherError::InvalidJson(_))
        ));
    }

    proptest! {
        #[test]
        fn canonical_json_is_a_fixed_point(
            entries in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let value = serde_json::to_value(&entries).unwrap();
            let pretty = serde_json::to_vec_pretty(&value).unwrap();
            let once = canonicalize(ContentKind::Structured, &pretty).unwrap().into_owned();
            let twice = canonicalize(ContentKind::Structured, &once).unwrap().into_owned();
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn any_utf8_text_is_accepted_verbatim(s in ".*") {
            let out = canonicalize(ContentKind::Text, s.as_bytes()).unwrap();
            prop_assert_eq!(&*out, s.as_bytes());
        }
    }
}
