//! Dynamic symbols of the shared objects loaded by monitored processes.
//!
//! Parsing the symbol table of a binary is expensive, while the same libraries
//! are loaded over and over by every process on the host. [`CachedSymbolsLoader`]
//! memoizes parse results per [`ObjectIdentity`], making sure a given object is
//! parsed at most once even when it's loaded by many processes at the same time.

use std::{collections::HashSet, fmt, io, path::PathBuf, sync::Arc};

use thiserror::Error;

mod cache;
mod elf;

pub use cache::CachedSymbolsLoader;
pub use elf::ElfSymbolsParser;

/// Identifies a shared object on a filesystem at a point in time.
///
/// Rewriting or replacing the file changes its `ctime`, so symbols cached for the
/// old identity are never served for the new content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectIdentity {
    pub device: u32,
    pub inode: u64,
    pub ctime: u64,
}

impl fmt::Display for ObjectIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}@{}", self.device, self.inode, self.ctime)
    }
}

/// A shared object as seen by a single load event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedObjectInfo {
    pub identity: ObjectIdentity,
    /// Path inside the mount namespace of the loading process.
    pub path: String,
    pub mount_ns: u32,
}

/// Set of symbol names, shared between all the users of a cache entry.
pub type SymbolSet = Arc<HashSet<String>>;

/// Symbols found in the dynamic symbol table of an object.
#[derive(Debug, Clone, Default)]
pub struct ObjectSymbols {
    exported: SymbolSet,
    imported: SymbolSet,
    dynamic: SymbolSet,
}

impl ObjectSymbols {
    pub fn new(exported: HashSet<String>, imported: HashSet<String>) -> Self {
        let dynamic = exported.union(&imported).cloned().collect();
        Self {
            exported: Arc::new(exported),
            imported: Arc::new(imported),
            dynamic: Arc::new(dynamic),
        }
    }

    /// Non-local symbols defined by the object, whatever their type.
    pub fn exported(&self) -> &SymbolSet {
        &self.exported
    }

    /// Symbols the object expects from other objects.
    pub fn imported(&self) -> &SymbolSet {
        &self.imported
    }

    /// Every named non-local symbol of the dynamic symbol table.
    pub fn dynamic(&self) -> &SymbolSet {
        &self.dynamic
    }
}

#[derive(Error, Debug)]
pub enum ResolutionError {
    #[error("reading shared object {path:?} failed")]
    ReadFile {
        #[source]
        source: io::Error,
        path: PathBuf,
    },
    #[error("parsing shared object {path:?} failed")]
    Parse {
        #[source]
        source: object::Error,
        path: PathBuf,
    },
    #[error("{path:?} is not an ELF object")]
    NotElf { path: PathBuf },
}

/// Extracts the symbols of a shared object. Called on cache misses only.
pub trait SymbolsParser: Send + Sync {
    fn parse(&self, info: &LoadedObjectInfo) -> Result<ObjectSymbols, ResolutionError>;
}

/// Query interface over the dynamic symbol table of loaded objects.
///
/// Errors are reference counted because a single failed resolution is reported
/// to every caller waiting for it.
pub trait DynamicSymbolsLoader: Send + Sync {
    fn dynamic_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>>;

    fn exported_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>>;

    fn imported_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>>;
}

impl<L: DynamicSymbolsLoader + ?Sized> DynamicSymbolsLoader for Arc<L> {
    fn dynamic_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>> {
        (**self).dynamic_symbols(info)
    }

    fn exported_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>> {
        (**self).exported_symbols(info)
    }

    fn imported_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>> {
        (**self).imported_symbols(info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(symbols: &[&str]) -> HashSet<String> {
        symbols.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn dynamic_symbols_are_the_union() {
        let symbols = ObjectSymbols::new(set(&["open", "close"]), set(&["malloc", "open"]));
        assert_eq!(**symbols.dynamic(), set(&["open", "close", "malloc"]));
        assert_eq!(**symbols.exported(), set(&["open", "close"]));
        assert_eq!(**symbols.imported(), set(&["malloc", "open"]));
    }

    #[test]
    fn rewritten_file_has_a_new_identity() {
        let before = ObjectIdentity {
            device: 2049,
            inode: 1,
            ctime: 100,
        };
        let after = ObjectIdentity { ctime: 101, ..before };
        assert_ne!(before, after);
        assert_eq!(before.to_string(), "2049:1@100");
    }
}
