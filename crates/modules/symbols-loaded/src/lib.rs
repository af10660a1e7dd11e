//! Derives `SymbolsLoaded` events out of `shared_object_loaded` kernel events.
//!
//! Every time a process maps a shared object, its dynamic symbol table is checked
//! against a list of watched symbols. Objects exporting at least one of them are
//! reported, unless they're covered by the [`Whitelist`].

use std::{collections::HashSet, sync::Arc};

use shared_objects::{DynamicSymbolsLoader, LoadedObjectInfo, ObjectIdentity, ResolutionError};
use symwatch_core::pdk::{
    ConfigError, Deriver, ExtractionError, ModuleConfig, Payload, RawEvent, SingleEventDeriver,
};
use thiserror::Error;

mod whitelist;

pub use whitelist::{KNOWN_LIBRARIES_DIRS, Whitelist};

pub const MODULE_NAME: &str = "symbols-loaded";

#[derive(Clone, Debug, Default)]
pub struct Config {
    pub watched_symbols: Vec<String>,
    pub whitelist: Vec<String>,
    /// Maximum number of objects kept in the symbols cache, unbounded if missing.
    pub symbols_cache_capacity: Option<u64>,
    /// Root of the filesystem the object paths are relative to.
    pub symbols_root: String,
}

impl TryFrom<&ModuleConfig> for Config {
    type Error = ConfigError;

    fn try_from(config: &ModuleConfig) -> Result<Self, Self::Error> {
        Ok(Config {
            watched_symbols: config.get_list("watched_symbols")?,
            whitelist: config.get_list("whitelist")?,
            symbols_cache_capacity: config.optional("symbols_cache_capacity")?,
            symbols_root: config.with_default("symbols_root", String::from("/"))?,
        })
    }
}

#[derive(Error, Debug)]
pub enum DeriveError {
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error(transparent)]
    Resolution(#[from] Arc<ResolutionError>),
}

/// Checks the exported symbols of loaded shared objects against a watchlist.
pub struct SymbolsLoadedDeriver<L> {
    loader: L,
    watched_symbols: HashSet<String>,
    whitelist: Whitelist,
}

impl<L: DynamicSymbolsLoader> SymbolsLoadedDeriver<L> {
    pub fn new<W, S>(loader: L, watched_symbols: W, whitelist: Whitelist) -> Self
    where
        W: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let watched_symbols: HashSet<String> =
            watched_symbols.into_iter().map(Into::into).collect();
        if watched_symbols.is_empty() {
            log::warn!(target: MODULE_NAME, "no watched symbols, no event will be derived");
        }
        Self {
            loader,
            watched_symbols,
            whitelist,
        }
    }

    pub fn from_config(loader: L, config: &Config) -> Self {
        Self::new(
            loader,
            config.watched_symbols.iter().cloned(),
            Whitelist::new(config.whitelist.iter().cloned()),
        )
    }

    /// Wraps this deriver to produce complete events.
    pub fn into_event_deriver(self) -> SingleEventDeriver<Self> {
        SingleEventDeriver::new(MODULE_NAME, self)
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }
}

impl<L: DynamicSymbolsLoader> Deriver for SymbolsLoadedDeriver<L> {
    type Error = DeriveError;

    fn derive(&self, event: &RawEvent) -> Result<Option<Payload>, Self::Error> {
        let object = shared_object_info(event)?;

        if self.whitelist.is_whitelisted(&object.path) {
            log::trace!(target: MODULE_NAME, "{} is whitelisted", object.path);
            return Ok(None);
        }

        let exported = self.loader.exported_symbols(&object)?;

        let mut symbols: Vec<String> = self
            .watched_symbols
            .iter()
            .filter(|symbol| exported.contains(symbol.as_str()))
            .cloned()
            .collect();
        if symbols.is_empty() {
            return Ok(None);
        }
        symbols.sort_unstable();

        Ok(Some(Payload::SymbolsLoaded {
            library_path: object.path,
            symbols,
        }))
    }
}

/// Extracts the loaded shared object from a `shared_object_loaded` event.
pub fn shared_object_info(event: &RawEvent) -> Result<LoadedObjectInfo, ExtractionError> {
    let inode = event.arg_u64("inode")?;
    let device = event.arg_u32("dev")?;
    let ctime = event.arg_u64("ctime")?;
    let path = event.arg_str("pathname")?;
    Ok(LoadedObjectInfo {
        identity: ObjectIdentity {
            device,
            inode,
            ctime,
        },
        path: path.to_string(),
        mount_ns: event.header.mount_ns,
    })
}
