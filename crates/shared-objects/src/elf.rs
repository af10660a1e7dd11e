use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use object::{BinaryFormat, Object, ObjectSymbol};

use crate::{LoadedObjectInfo, ObjectSymbols, ResolutionError, SymbolsParser};

/// Reads shared objects from the filesystem and parses their `.dynsym` table.
///
/// Object paths are relative to the mount namespace of the loading process.
/// When the agent runs in a different namespace, `root` must point to a view of
/// that filesystem (eg. `/proc/<pid>/root`).
#[derive(Debug, Clone)]
pub struct ElfSymbolsParser {
    root: PathBuf,
}

impl Default for ElfSymbolsParser {
    fn default() -> Self {
        Self {
            root: PathBuf::from("/"),
        }
    }
}

impl ElfSymbolsParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn host_path(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

impl SymbolsParser for ElfSymbolsParser {
    fn parse(&self, info: &LoadedObjectInfo) -> Result<ObjectSymbols, ResolutionError> {
        let path = self.host_path(&info.path);
        let data = fs::read(&path).map_err(|source| ResolutionError::ReadFile {
            source,
            path: path.clone(),
        })?;
        parse_dynamic_symbols(&data, &path)
    }
}

fn parse_dynamic_symbols(data: &[u8], path: &Path) -> Result<ObjectSymbols, ResolutionError> {
    let file = object::File::parse(data).map_err(|source| ResolutionError::Parse {
        source,
        path: path.to_path_buf(),
    })?;
    if file.format() != BinaryFormat::Elf {
        return Err(ResolutionError::NotElf {
            path: path.to_path_buf(),
        });
    }

    let mut exported = HashSet::new();
    let mut imported = HashSet::new();
    for symbol in file.dynamic_symbols() {
        let name = match symbol.name() {
            Ok(name) if !name.is_empty() => name,
            _ => continue,
        };
        // Classify by section index only: ifunc, TLS and absolute symbols are
        // defined even if they're not plain data or code.
        if symbol.is_undefined() {
            imported.insert(name.to_string());
        } else if !symbol.is_local() {
            exported.insert(name.to_string());
        }
    }
    Ok(ObjectSymbols::new(exported, imported))
}
