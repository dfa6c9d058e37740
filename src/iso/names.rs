//! Identifier mangling for the two directory hierarchies.
//!
//! The primary (ISO-9660) tree only allows uppercase `A-Z0-9_` in 8.3 form,
//! so real names are mangled and de-duplicated per directory. The Joliet
//! tree keeps the original name in UCS-2, truncated to 64 characters.

use std::collections::HashSet;

/// Maximum Joliet identifier length in characters.
pub const JOLIET_NAME_MAX: usize = 64;

/// Characters Joliet forbids in identifiers.
const JOLIET_FORBIDDEN: &[char] = &['*', '/', ':', ';', '?', '\\'];

fn mangle(part: &str, max: usize) -> String {
    let mut out: String = part
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .take(max)
        .collect();
    if out.is_empty() {
        out.push('_');
    }
    out
}

/// Resolve a collision by replacing the tail of `base` with a counter.
fn uniquify(base: String, ext: Option<&str>, taken: &mut HashSet<String>) -> String {
    let compose = |b: &str| match ext {
        Some(e) => format!("{b}.{e}"),
        None => b.to_string(),
    };

    let candidate = compose(&base);
    if taken.insert(candidate.clone()) {
        return candidate;
    }
    for n in 1u32.. {
        let suffix = n.to_string();
        let keep = base.len().saturating_sub(suffix.len()).min(8 - suffix.len().min(8));
        let retry = compose(&format!("{}{}", &base[..keep], suffix));
        if taken.insert(retry.clone()) {
            return retry;
        }
    }
    unreachable!("counter space exhausted");
}

/// 8.3 identifier for a file, with the `;1` version suffix the primary tree
/// requires. `taken` tracks identifiers already used in the same directory.
pub fn primary_file_identifier(name: &str, taken: &mut HashSet<String>) -> String {
    let (base, ext) = match name.rsplit_once('.') {
        Some((b, e)) if !b.is_empty() => (b, e),
        _ => (name, ""),
    };
    let base = mangle(base, 8);
    let ext = mangle(ext, 3);
    format!("{};1", uniquify(base, Some(&ext), taken))
}

/// 8-character identifier for a directory.
pub fn primary_dir_identifier(name: &str, taken: &mut HashSet<String>) -> String {
    uniquify(mangle(name, 8), None, taken)
}

/// Joliet identifier: the original name with forbidden characters replaced,
/// truncated to 64 characters.
pub fn joliet_identifier(name: &str) -> String {
    name.chars()
        .map(|c| if JOLIET_FORBIDDEN.contains(&c) { '_' } else { c })
        .take(JOLIET_NAME_MAX)
        .collect()
}

/// UCS-2 big-endian encoding used by the Joliet directory records.
pub fn ucs2_be(s: &str) -> Vec<u8> {
    s.encode_utf16().flat_map(|u| u.to_be_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangles_to_8_3_uppercase() {
        let mut taken = HashSet::new();
        assert_eq!(
            primary_file_identifier("BOOTx64.efi", &mut taken),
            "BOOTX64.EFI;1"
        );
        assert_eq!(
            primary_file_identifier("OpenCore-0.9.7.zip", &mut taken),
            "OPENCORE.ZIP;1"
        );
    }

    #[test]
    fn file_without_extension_keeps_empty_ext() {
        let mut taken = HashSet::new();
        assert_eq!(primary_file_identifier("README", &mut taken), "README.;1");
    }

    #[test]
    fn collisions_get_counter_suffixes() {
        let mut taken = HashSet::new();
        let a = primary_file_identifier("configuration.plist", &mut taken);
        let b = primary_file_identifier("configuratie.plist", &mut taken);
        assert_eq!(a, "CONFIGUR.PLI;1");
        assert_ne!(a, b);
        assert!(b.ends_with(".PLI;1"));
    }

    #[test]
    fn directory_identifiers_are_truncated() {
        let mut taken = HashSet::new();
        assert_eq!(primary_dir_identifier("Resources", &mut taken), "RESOURCE");
    }

    #[test]
    fn joliet_keeps_case_and_replaces_forbidden() {
        assert_eq!(joliet_identifier("BOOTx64.efi"), "BOOTx64.efi");
        assert_eq!(joliet_identifier("a:b"), "a_b");
    }

    #[test]
    fn ucs2_is_big_endian() {
        assert_eq!(ucs2_be("A"), vec![0x00, 0x41]);
    }
}
