//! Logical name <-> on-disk name mapping for vault entries.

use unicode_normalization::UnicodeNormalization;

use super::VaultError;

/// Suffix marking a file in the vault directory as ciphertext.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Longest logical name accepted, in bytes. Keeps `name + suffix` under the
/// 255-byte component limit of common filesystems.
pub const MAX_NAME_LEN: usize = 200;

/// Reduce a user-supplied file name to a single safe path component.
///
/// Input is NFKD-decomposed first so accented letters keep their base
/// letter. Only ASCII letters, digits and `._-` survive. Path separators and
/// whitespace become `_` word breaks, and leading/trailing `.`/`_` are
/// stripped, so the result can never name a parent or hidden directory.
pub fn sanitize_file_name(raw: &str) -> Result<String, VaultError> {
    let spaced: String = raw
        .nfkd()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();
    let joined = spaced.split_ascii_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
        .collect();

    let mut name = trim_edges(&kept);
    if name.len() > MAX_NAME_LEN {
        // ASCII only, so any byte offset is a char boundary.
        name = trim_edges(&name[..MAX_NAME_LEN]);
    }

    if name.is_empty() {
        return Err(VaultError::InvalidName {
            name: raw.to_string(),
            reason: "name is empty after sanitization".to_string(),
        });
    }
    Ok(name)
}

/// Reject any name that `sanitize_file_name` would change.
///
/// Lookups never rewrite names: a caller asking for `../x` gets an error,
/// not the entry stored as `x`.
pub fn ensure_canonical(name: &str) -> Result<(), VaultError> {
    match sanitize_file_name(name) {
        Ok(clean) if clean == name => Ok(()),
        Ok(_) => Err(VaultError::InvalidName {
            name: name.to_string(),
            reason: "name contains path separators or disallowed characters".to_string(),
        }),
        Err(err) => Err(err),
    }
}

/// On-disk file name for a canonical logical name.
pub fn derive_on_disk_name(logical: &str) -> String {
    format!("{logical}{ENCRYPTED_SUFFIX}")
}

/// Logical name for an on-disk file, or `None` if it is not a vault blob.
pub fn logical_name_of(on_disk: &str) -> Option<&str> {
    on_disk
        .strip_suffix(ENCRYPTED_SUFFIX)
        .filter(|stem| !stem.is_empty())
}

fn trim_edges(s: &str) -> String {
    s.trim_matches(|c| c == '.' || c == '_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traversal_is_flattened_into_one_component() {
        assert_eq!(sanitize_file_name("../../etc/passwd").unwrap(), "etc_passwd");
        assert_eq!(
            sanitize_file_name(r"..\windows\system32").unwrap(),
            "windows_system32"
        );
    }

    #[test]
    fn whitespace_and_foreign_chars_are_normalized() {
        assert_eq!(sanitize_file_name("my report  v2.pdf").unwrap(), "my_report_v2.pdf");
        assert_eq!(sanitize_file_name("résumé.txt").unwrap(), "resume.txt");
        assert_eq!(sanitize_file_name("ﬁle Ñame.txt").unwrap(), "file_Name.txt");
        assert_eq!(sanitize_file_name(".bashrc").unwrap(), "bashrc");
    }

    #[test]
    fn empty_results_are_rejected() {
        for raw in ["", "..", "../..", "///", "   ", "日本語"] {
            let err = sanitize_file_name(raw).expect_err("should reject");
            assert!(matches!(err, VaultError::InvalidName { .. }), "{raw:?}");
        }
    }

    #[test]
    fn long_names_are_capped() {
        let raw = "a".repeat(MAX_NAME_LEN + 50);
        let name = sanitize_file_name(&raw).expect("sanitize");
        assert_eq!(name.len(), MAX_NAME_LEN);
    }

    #[test]
    fn canonical_check_rejects_rewrites() {
        ensure_canonical("a.txt").expect("canonical");
        assert!(ensure_canonical("../a.txt").is_err());
        assert!(ensure_canonical("dir/a.txt").is_err());
        assert!(ensure_canonical("").is_err());
    }

    #[test]
    fn suffix_mapping_is_reversible() {
        for name in ["a.txt", "archive.tar.gz", "x", "nested.encrypted"] {
            let disk = derive_on_disk_name(name);
            assert_eq!(logical_name_of(&disk), Some(name));
        }
        assert_ne!(derive_on_disk_name("a"), derive_on_disk_name("b"));
        assert_eq!(logical_name_of("notes.txt"), None);
        assert_eq!(logical_name_of(".encrypted"), None);
    }
}
