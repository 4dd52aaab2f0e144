//! Bundled script include library.
//!
//! Standard helper includes that ship with the compiler, so a compile unit
//! can `#include` them without a local copy. Sources are embedded at build
//! time and each entry carries a pinned FNV-1a 64 checksum of its bytes.

/// Revision of the bundled library as a whole.
///
/// Bump when any entry's source changes.
pub const LIBRARY_REVISION: u32 = 1;

/// A single bundled include.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IncludeEntry {
    /// Normalized include name, lower case without extension.
    pub name: &'static str,
    pub source: &'static str,
    /// FNV-1a 64 of the source bytes.
    pub checksum: u64,
}

impl IncludeEntry {
    const fn new(name: &'static str, source: &'static str) -> Self {
        Self {
            name,
            source,
            checksum: fnv1a(source.as_bytes()),
        }
    }

    /// Checksum of the embedded text, computed at build time.
    #[inline]
    pub fn verify(&self) -> bool {
        fnv1a(self.source.as_bytes()) == self.checksum
    }
}

/// Every bundled include, sorted by name.
pub static LIBRARY: &[IncludeEntry] = &[
    IncludeEntry::new("nw_i0_common", include_str!("../lib/nw_i0_common.nss")),
    IncludeEntry::new("nw_i0_debug", include_str!("../lib/nw_i0_debug.nss")),
    IncludeEntry::new("nw_i0_math", include_str!("../lib/nw_i0_math.nss")),
    IncludeEntry::new("nw_i0_range", include_str!("../lib/nw_i0_range.nss")),
    IncludeEntry::new("nw_i0_string", include_str!("../lib/nw_i0_string.nss")),
    IncludeEntry::new("nw_i0_time", include_str!("../lib/nw_i0_time.nss")),
    IncludeEntry::new("nw_i0_vector", include_str!("../lib/nw_i0_vector.nss")),
];

/// Find a bundled include by its normalized name.
pub fn lookup(name: &str) -> Option<&'static IncludeEntry> {
    LIBRARY
        .binary_search_by(|entry| entry.name.cmp(name))
        .ok()
        .map(|index| &LIBRARY[index])
}

/// Iterate the bundled include names in sorted order.
pub fn names() -> impl Iterator<Item = &'static str> {
    LIBRARY.iter().map(|entry| entry.name)
}

/// 64-bit FNV-1a hash.
pub const fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET_BASIS: u64 = 0xCBF2_9CE4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01B3;

    let mut hash = OFFSET_BASIS;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(PRIME);
        i += 1;
    }
    hash
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_fnv1a() {
        assert_eq!(fnv1a(b""), 0xCBF2_9CE4_8422_2325);
        assert_eq!(fnv1a(b"a"), 0xAF63_DC4C_8601_EC8C);
    }

    #[test]
    fn test_library_sorted() {
        for pair in LIBRARY.windows(2) {
            assert!(pair[0].name < pair[1].name, "{} >= {}", pair[0].name, pair[1].name);
        }
    }

    #[test]
    fn test_lookup() {
        assert_eq!(lookup("nw_i0_math").map(|e| e.name), Some("nw_i0_math"));
        assert!(lookup("NW_I0_MATH").is_none(), "lookup expects normalized names");
        assert!(lookup("nw_i0_missing").is_none());
    }

    /// Pinned sizes and checksums. A failure here means an embedded
    /// source changed and `LIBRARY_REVISION` needs a bump.
    #[test]
    #[rustfmt::skip]
    fn test_pinned_checksums() {
        let expected: &[(&str, usize, u64)] = &[
            ("nw_i0_common", 304,  0xC50C_8C0A_6F36_66AC),
            ("nw_i0_debug",  754,  0x1231_C8D2_1F3C_FAA7),
            ("nw_i0_math",   954,  0x1A23_4CAC_678A_3B40),
            ("nw_i0_range",  567,  0xEFCC_EA79_9ECE_55A5),
            ("nw_i0_string", 1324, 0xA995_1ECB_C987_C822),
            ("nw_i0_time",   571,  0xF1B2_DE8E_95A3_6977),
            ("nw_i0_vector", 608,  0x77BC_7F6B_C645_67D7),
        ];

        assert_eq!(LIBRARY.len(), expected.len());
        for (entry, (name, len, checksum)) in LIBRARY.iter().zip(expected) {
            assert_eq!(entry.name, *name);
            assert_eq!(entry.source.len(), *len, "{} length", name);
            assert_eq!(entry.checksum, *checksum, "{} checksum", name);
            assert!(entry.verify());
        }
    }
}
