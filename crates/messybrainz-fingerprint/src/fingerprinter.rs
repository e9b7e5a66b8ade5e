// SPDX-License-Identifier: GPL-3.0-or-later

//! Dedup keys for canonical field sets.
//!
//! The encoding hashed here is a version tag followed by every identity field as a
//! `(name, value)` pair, sorted by name, each component prefixed with its byte length.
//! Absent values are encoded as the empty string, so the layout never depends on which
//! fields a client happened to send, and the length prefixes keep distinct field sets
//! from ever producing the same byte stream.

use std::collections::BTreeMap;

use messybrainz_domain::{CanonicalFields, Fingerprint};
use sha2::{Digest, Sha256};

/// Bumped whenever the encoding or the field set changes.
pub const ENCODING_VERSION: &str = "messybrainz-fingerprint/1";

/// Derive the fingerprint of a canonical field set.
pub fn fingerprint(fields: &CanonicalFields) -> Fingerprint {
    let mut hasher = Sha256::new();
    write_component(&mut hasher, ENCODING_VERSION);

    for (name, value) in identity_pairs(fields) {
        write_component(&mut hasher, name);
        write_component(&mut hasher, &value);
    }

    let digest: [u8; 32] = hasher.finalize().into();
    Fingerprint::from_digest(&digest)
}

fn identity_pairs(fields: &CanonicalFields) -> BTreeMap<&'static str, String> {
    let number = |value: Option<u64>| value.map(|v| v.to_string()).unwrap_or_default();

    BTreeMap::from([
        ("artist", fields.artist.clone()),
        ("duration_ms", number(fields.duration_ms)),
        ("recording_mbid", fields.recording_mbid.clone()),
        ("release", fields.release.clone()),
        ("title", fields.title.clone()),
        ("track_number", number(fields.track_number.map(u64::from))),
    ])
}

fn write_component(hasher: &mut Sha256, component: &str) {
    hasher.update((component.len() as u64).to_le_bytes());
    hasher.update(component.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Normalizer;
    use messybrainz_domain::RawRecord;

    fn canonical(artist: &str, title: &str) -> CanonicalFields {
        CanonicalFields {
            artist: artist.to_string(),
            title: title.to_string(),
            ..CanonicalFields::default()
        }
    }

    #[test]
    fn equal_fields_give_equal_fingerprints() {
        let left = fingerprint(&canonical("the beatles", "let it be"));
        let right = fingerprint(&canonical("the beatles", "let it be"));

        assert_eq!(left, right);
        assert_eq!(left.as_str().len(), Fingerprint::HEX_LEN);
    }

    #[test]
    fn hex_matches_the_sha256_digest_of_the_encoding() {
        let fields = canonical("low", "words");
        let mut encoded = Vec::new();
        for component in [
            ENCODING_VERSION,
            "artist",
            "low",
            "duration_ms",
            "",
            "recording_mbid",
            "",
            "release",
            "",
            "title",
            "words",
            "track_number",
            "",
        ] {
            encoded.extend_from_slice(&(component.len() as u64).to_le_bytes());
            encoded.extend_from_slice(component.as_bytes());
        }

        let expected = format!("{:x}", Sha256::digest(&encoded));
        assert_eq!(fingerprint(&fields).as_str(), expected);
    }

    #[test]
    fn whitespace_and_case_variants_share_a_fingerprint() {
        let normalizer = Normalizer::default();
        let left = normalizer.normalize(&RawRecord::new("The Beatles", "Let It Be"));
        let right = normalizer.normalize(&RawRecord::new("the beatles", "  let it be  "));

        assert_eq!(fingerprint(&left), fingerprint(&right));
    }

    #[test]
    fn every_identity_field_changes_the_fingerprint() {
        let base = canonical("the beatles", "let it be");
        let base_fp = fingerprint(&base);

        let variants = [
            CanonicalFields { release: "let it be".to_string(), ..base.clone() },
            CanonicalFields { recording_mbid: "mbid".to_string(), ..base.clone() },
            CanonicalFields { track_number: Some(6), ..base.clone() },
            CanonicalFields { duration_ms: Some(243_000), ..base.clone() },
            CanonicalFields { artist: "the rolling stones".to_string(), ..base.clone() },
        ];

        for variant in variants {
            assert_ne!(fingerprint(&variant), base_fp, "{variant:?} collided with base");
        }
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        // Same concatenated text, different split between artist and title.
        let left = fingerprint(&canonical("ab", "c"));
        let right = fingerprint(&canonical("a", "bc"));

        assert_ne!(left, right);
    }

    #[test]
    fn zero_and_absent_numbers_differ() {
        let absent = fingerprint(&canonical("a", "b"));
        let zero = fingerprint(&CanonicalFields {
            track_number: Some(0),
            ..canonical("a", "b")
        });

        assert_ne!(absent, zero);
    }

    #[test]
    fn track_number_and_duration_do_not_alias() {
        let as_track = fingerprint(&CanonicalFields {
            track_number: Some(7),
            ..canonical("a", "b")
        });
        let as_duration = fingerprint(&CanonicalFields {
            duration_ms: Some(7),
            ..canonical("a", "b")
        });

        assert_ne!(as_track, as_duration);
    }
}
