//! Symwatch derives security events about the shared objects loaded by the
//! processes of a host.
//!
//! The kernel instrumentation layer reports a `shared_object_loaded` event every
//! time a process maps a shared object. Symwatch inspects the dynamic symbol table
//! of the object and reports the ones exporting symbols of interest, like
//! functions commonly hooked by userland rootkits through `LD_PRELOAD`.
//!
//! The work is split between the following crates:
//!
//! - [`symwatch_core`]: raw and derived event model, the [`Deriver`](symwatch_core::pdk::Deriver)
//!   trait and the module configuration
//! - [`shared_objects`]: object identity, ELF parsing and the memoizing symbols cache
//! - [`symbols_loaded`]: the whitelist and the deriver itself
//!
//! ## Configuration
//!
//! The deriver is configured through a [`ModuleConfig`] with these fields:
//!
//! - `watched_symbols`: comma separated list of symbols to report
//! - `whitelist`: comma separated list of trusted objects. Entries starting with
//!   `/` are path prefixes, others are library names looked up in the known
//!   library directories
//! - `symbols_cache_capacity`: maximum number of objects in the symbols cache,
//!   unbounded by default
//! - `symbols_root`: root of the filesystem object paths refer to, `/` by default
//!
//! ```no_run
//! use symwatch_core::pdk::ModuleConfig;
//!
//! let config: ModuleConfig = [
//!     ("watched_symbols", "open,readdir,accept"),
//!     ("whitelist", "/opt/trusted/,libc"),
//! ]
//! .into_iter()
//! .collect();
//! let deriver = symwatch::symbols_loaded_deriver(&config).unwrap();
//! # let _ = deriver;
//! ```

use shared_objects::{CachedSymbolsLoader, ElfSymbolsParser};
use symbols_loaded::{Config, SymbolsLoadedDeriver};
use symwatch_core::pdk::{ConfigError, ModuleConfig, SingleEventDeriver};

pub use shared_objects;
pub use symbols_loaded;
pub use symwatch_core;

/// The deriver built by [`symbols_loaded_deriver`].
pub type ElfSymbolsLoadedDeriver =
    SingleEventDeriver<SymbolsLoadedDeriver<CachedSymbolsLoader<ElfSymbolsParser>>>;

/// Builds the `symbols-loaded` deriver, reading shared objects from the filesystem.
pub fn symbols_loaded_deriver(
    config: &ModuleConfig,
) -> Result<ElfSymbolsLoadedDeriver, ConfigError> {
    let config = Config::try_from(config)?;
    log::debug!(
        "{} watching {} symbols, {} whitelist entries",
        symbols_loaded::MODULE_NAME,
        config.watched_symbols.len(),
        config.whitelist.len()
    );
    let parser = ElfSymbolsParser::with_root(&config.symbols_root);
    let loader = CachedSymbolsLoader::with_capacity(parser, config.symbols_cache_capacity);
    Ok(SymbolsLoadedDeriver::from_config(loader, &config).into_event_deriver())
}

/// Init logger. We log from info level and above, hide timestamp
/// and module path.
/// If RUST_LOG is set, we assume the user wants to debug something
/// and use env_logger default behaviour.
pub fn init_logger(override_log_level: Option<log::LevelFilter>) {
    if std::env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    } else {
        let level_filter = override_log_level.unwrap_or(log::LevelFilter::Info);

        env_logger::builder().filter_level(level_filter).init();
    }
}

/// Utility function to pretty print an error with its sources.
///
/// By default Rust won't print the source of an error message, so we use
/// anyhow as an error pretty-printer.
pub fn log_error<E: std::error::Error + Send + Sync + 'static>(msg: &str, err: E) {
    log::error!("{}: {:?}", msg, anyhow::Error::from(err));
}
