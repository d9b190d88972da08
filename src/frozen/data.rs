//! Frozen module sets shipped with the runtime.

use super::{FrozenAlias, FrozenModule};

/// Always available, whatever the frozen-modules setting
pub static BOOTSTRAP_MODULES: [FrozenModule; 3] = [
    FrozenModule::new(
        "importlib._bootstrap",
        b"# core of the import system\n\
          _bootstrap_version = 1\n\
          _initialized = True\n\
          _loader_kinds = [\"builtin\", \"frozen\", \"extension\"]\n",
    ),
    FrozenModule::new(
        "importlib._bootstrap_external",
        b"# path based import machinery\n\
          _bootstrap_version = 1\n\
          MAGIC_NUMBER = 3571\n\
          SOURCE_SUFFIXES = [\".py\"]\n",
    ),
    FrozenModule::new(
        "zipimport",
        b"# archive importer\n\
          _zip_searchorder = [\"/__init__.py\", \".py\"]\n\
          MAX_COMMENT_LEN = 65535\n",
    ),
];

/// Standard library modules, gated by the frozen-modules setting
pub static STANDARD_MODULES: [FrozenModule; 6] = [
    FrozenModule::new("abc", b"__all__ = [\"ABC\", \"ABCMeta\"]\n"),
    FrozenModule::new("codecs", b"default_encoding = \"utf-8\"\n"),
    FrozenModule::package("encodings", b"_aliases_loaded = False\n"),
    FrozenModule::new("encodings.utf_8", b"name = \"utf-8\"\nbyte_order = None\n"),
    FrozenModule::new("stat", b"S_IFDIR = 16384\nS_IFREG = 32768\n"),
    FrozenModule::new("site", b"ENABLE_USER_SITE = False\nPREFIXES = []\n"),
];

/// Test modules, gated by the frozen-modules setting
pub static TEST_MODULES: [FrozenModule; 6] = [
    FrozenModule::new(
        "__hello__",
        b"initialized = True\nmessage = \"Hello world!\"\n",
    ),
    FrozenModule::new("__hello_only__", b"initialized = True\n"),
    FrozenModule::package("__phello__", b"initialized = True\n"),
    FrozenModule::new("__phello__.spam", b"initialized = True\n"),
    FrozenModule::package("__phello__.ham", b"initialized = True\n"),
    FrozenModule::excluded("__phello__.ham.eggs"),
];

/// Alternative names that redirect to a canonical entry
pub static ALIASES: [FrozenAlias; 4] = [
    FrozenAlias::new("_frozen_importlib", "importlib._bootstrap"),
    FrozenAlias::new(
        "_frozen_importlib_external",
        "importlib._bootstrap_external",
    ),
    FrozenAlias::new("__hello_alias__", "__hello__"),
    FrozenAlias::new("__phello_alias__", "__phello__"),
];
