use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use moka::sync::Cache;

use crate::{
    DynamicSymbolsLoader, LoadedObjectInfo, ObjectIdentity, ObjectSymbols, ResolutionError,
    SymbolSet, SymbolsParser,
};

/// Parsing slower than this is reported, since it stalls the event pipeline.
const SLOW_PARSE_THRESHOLD: Duration = Duration::from_millis(10);

/// Memoizes the output of a [`SymbolsParser`] by [`ObjectIdentity`].
///
/// - Concurrent lookups of the same identity are coalesced: a single caller runs
///   the parser while the others block until its result is available.
/// - Successful parses are kept for the lifetime of the cache, or until evicted
///   when a capacity is configured.
/// - Failures are returned to the caller but never stored, so the next lookup
///   of the same identity parses the object again.
pub struct CachedSymbolsLoader<P> {
    parser: P,
    cache: Cache<ObjectIdentity, ObjectSymbols>,
}

impl<P: SymbolsParser> CachedSymbolsLoader<P> {
    /// Creates an unbounded cache.
    pub fn new(parser: P) -> Self {
        Self::with_capacity(parser, None)
    }

    /// Creates a cache holding at most `capacity` objects, when given.
    pub fn with_capacity(parser: P, capacity: Option<u64>) -> Self {
        let mut builder = Cache::<ObjectIdentity, ObjectSymbols>::builder();
        if let Some(capacity) = capacity {
            builder = builder.max_capacity(capacity);
        }
        Self {
            parser,
            cache: builder.build(),
        }
    }

    /// Returns the symbols of the given object, parsing it on cache miss.
    pub fn resolve(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<ObjectSymbols, Arc<ResolutionError>> {
        self.cache.try_get_with(info.identity, || self.parse(info))
    }

    pub fn parser(&self) -> &P {
        &self.parser
    }

    /// Returns true if the symbols of `identity` are cached.
    pub fn contains(&self, identity: &ObjectIdentity) -> bool {
        self.cache.contains_key(identity)
    }

    fn parse(&self, info: &LoadedObjectInfo) -> Result<ObjectSymbols, ResolutionError> {
        log::debug!("loading symbols of {} ({})", info.path, info.identity);
        let now = Instant::now();
        let result = self.parser.parse(info);
        let elapsed = now.elapsed();
        if elapsed > SLOW_PARSE_THRESHOLD {
            log::warn!(
                "loading symbols of {:?} took {} millis",
                info.path,
                elapsed.as_millis()
            );
        }
        result
    }
}

impl<P: SymbolsParser> DynamicSymbolsLoader for CachedSymbolsLoader<P> {
    fn dynamic_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>> {
        self.resolve(info).map(|symbols| symbols.dynamic().clone())
    }

    fn exported_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>> {
        self.resolve(info).map(|symbols| symbols.exported().clone())
    }

    fn imported_symbols(
        &self,
        info: &LoadedObjectInfo,
    ) -> Result<SymbolSet, Arc<ResolutionError>> {
        self.resolve(info).map(|symbols| symbols.imported().clone())
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        io,
        sync::{
            Barrier,
            atomic::{AtomicUsize, Ordering},
        },
        thread,
    };

    use super::*;

    const THREADS: usize = 8;

    /// Parser counting its invocations. Fails the first `failures` calls.
    #[derive(Default)]
    struct CountingParser {
        calls: AtomicUsize,
        failures: usize,
        delay: Duration,
    }

    impl SymbolsParser for CountingParser {
        fn parse(&self, info: &LoadedObjectInfo) -> Result<ObjectSymbols, ResolutionError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            thread::sleep(self.delay);
            if call < self.failures {
                return Err(ResolutionError::ReadFile {
                    source: io::Error::from(io::ErrorKind::NotFound),
                    path: info.path.clone().into(),
                });
            }
            let exported: HashSet<String> = ["open".to_string()].into();
            let imported: HashSet<String> = ["malloc".to_string()].into();
            Ok(ObjectSymbols::new(exported, imported))
        }
    }

    fn info(inode: u64, path: &str) -> LoadedObjectInfo {
        LoadedObjectInfo {
            identity: ObjectIdentity {
                device: 1,
                inode,
                ctime: 1,
            },
            path: path.to_string(),
            mount_ns: 0,
        }
    }

    #[test]
    fn cached_after_first_parse() {
        let loader = CachedSymbolsLoader::new(CountingParser::default());
        let object = info(1, "/lib/libfoo.so");
        assert!(!loader.contains(&object.identity));
        let first = loader.exported_symbols(&object).unwrap();
        let second = loader.exported_symbols(&object).unwrap();
        assert!(first.contains("open"));
        assert!(Arc::ptr_eq(&first, &second));
        // every query is served by the same parse
        assert!(loader.imported_symbols(&object).unwrap().contains("malloc"));
        assert_eq!(loader.dynamic_symbols(&object).unwrap().len(), 2);
        assert!(loader.contains(&object.identity));
        assert_eq!(loader.parser.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn identities_are_cached_separately() {
        let loader = CachedSymbolsLoader::new(CountingParser::default());
        loader.exported_symbols(&info(1, "/lib/libfoo.so")).unwrap();
        loader.exported_symbols(&info(2, "/lib/libfoo.so")).unwrap();
        // same identity, seen from another mount namespace
        let mut other_ns = info(1, "/usr/lib/libfoo.so");
        other_ns.mount_ns = 42;
        loader.exported_symbols(&other_ns).unwrap();
        assert_eq!(loader.parser.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failures_are_not_cached() {
        let loader = CachedSymbolsLoader::new(CountingParser {
            failures: 1,
            ..Default::default()
        });
        let object = info(1, "/lib/libfoo.so");
        let err = loader.exported_symbols(&object).unwrap_err();
        assert!(matches!(*err, ResolutionError::ReadFile { .. }));
        assert!(!loader.contains(&object.identity));
        let symbols = loader.exported_symbols(&object).unwrap();
        assert!(symbols.contains("open"));
        assert_eq!(loader.parser.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn concurrent_lookups_parse_once() {
        let loader = CachedSymbolsLoader::new(CountingParser {
            delay: Duration::from_millis(50),
            ..Default::default()
        });
        let object = &info(1, "/lib/libfoo.so");
        let barrier = &Barrier::new(THREADS);
        let loader = &loader;
        let results: Vec<SymbolSet> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        loader.exported_symbols(object).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(loader.parser.calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn concurrent_lookups_share_a_failure() {
        let loader = CachedSymbolsLoader::new(CountingParser {
            failures: 1,
            delay: Duration::from_millis(200),
            ..Default::default()
        });
        let object = &info(1, "/lib/libfoo.so");
        let barrier = &Barrier::new(THREADS);
        let loader = &loader;
        let results: Vec<Result<SymbolSet, Arc<ResolutionError>>> = thread::scope(|s| {
            let handles: Vec<_> = (0..THREADS)
                .map(|_| {
                    s.spawn(move || {
                        barrier.wait();
                        loader.exported_symbols(object)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });
        assert_eq!(loader.parser.calls.load(Ordering::SeqCst), 1);
        for result in &results {
            assert!(matches!(
                result,
                Err(err) if matches!(**err, ResolutionError::ReadFile { .. })
            ));
        }
        assert!(!loader.contains(&object.identity));
        // the next lookup parses again
        assert!(loader.exported_symbols(object).unwrap().contains("open"));
        assert_eq!(loader.parser.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn bounded_cache() {
        let loader = CachedSymbolsLoader::with_capacity(CountingParser::default(), Some(16));
        for inode in 0..64 {
            loader.exported_symbols(&info(inode, "/lib/libfoo.so")).unwrap();
        }
        loader.cache.run_pending_tasks();
        assert!(loader.cache.entry_count() <= 16);
    }
}
