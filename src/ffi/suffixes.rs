//! Extension file suffixes.
//!
//! Ordered most specific first: the ABI-tagged suffix, then the stable-ABI
//! suffix where the platform has one, then the untagged suffix.

use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

/// ABI version baked into tagged suffixes
pub const ABI_VERSION: &str = "01";

/// Stable ABI suffix tag
pub const STABLE_ABI_TAG: &str = "abi1";

static EXTENSION_SUFFIXES: Lazy<Vec<String>> = Lazy::new(build_suffixes);

/// The platform tag used in tagged suffixes, e.g. `x86_64-linux`
pub fn platform_tag() -> String {
    format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS)
}

fn build_suffixes() -> Vec<String> {
    let tag = format!("dynimport-{}-{}", ABI_VERSION, platform_tag());

    #[cfg(target_os = "windows")]
    {
        vec![format!(".{}.dll", tag), ".dll".to_string()]
    }

    #[cfg(not(target_os = "windows"))]
    {
        vec![
            format!(".{}.so", tag),
            format!(".{}.so", STABLE_ABI_TAG),
            ".so".to_string(),
        ]
    }
}

/// Recognized extension file suffixes, in lookup order
pub fn extension_suffixes() -> &'static [String] {
    &EXTENSION_SUFFIXES
}

/// Whether `path` ends in one of the extension suffixes
pub fn is_extension_file(path: &Path) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    extension_suffixes()
        .iter()
        .any(|suffix| file_name.len() > suffix.len() && file_name.ends_with(suffix.as_str()))
}

/// Find the extension file for `name` in the search paths.
///
/// For each directory the suffixes are tried in order, using the module's
/// short name (the part after the last dot).
pub fn locate_extension(search_paths: &[PathBuf], name: &str) -> Option<PathBuf> {
    let short_name = name.rsplit('.').next().unwrap_or(name);
    for dir in search_paths {
        for suffix in extension_suffixes() {
            let candidate = dir.join(format!("{}{}", short_name, suffix));
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}
