/// System directories where libraries are usually installed.
///
/// Most specific paths must come first: matching stops at the first directory
/// containing the object, so `/usr/lib/` must never shadow `/usr/lib/x86_64-linux-gnu/`.
pub const KNOWN_LIBRARIES_DIRS: &[&str] = &[
    "/usr/lib/x86_64-linux-gnu/",
    "/usr/lib64/",
    "/usr/lib/",
    "/lib64/",
    "/lib/",
];

/// Shared objects exempted from symbols inspection.
///
/// Entries starting with `/` are path prefixes, matched against the whole
/// object path. Any other entry is a library name, matched only below the most
/// specific [`KNOWN_LIBRARIES_DIRS`] entry containing the object.
#[derive(Debug, Clone, Default)]
pub struct Whitelist {
    path_prefixes: Vec<String>,
    /// For every known directory, the library rules joined to it.
    libraries: Vec<(&'static str, Vec<String>)>,
}

impl Whitelist {
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (path_prefixes, library_names): (Vec<String>, Vec<String>) = entries
            .into_iter()
            .map(Into::into)
            .partition(|entry| entry.starts_with('/'));

        let libraries = if library_names.is_empty() {
            Vec::new()
        } else {
            KNOWN_LIBRARIES_DIRS
                .iter()
                .map(|dir| {
                    let prefixes: Vec<String> = library_names
                        .iter()
                        .map(|name| join_library(dir, name))
                        .collect();
                    (*dir, prefixes)
                })
                .collect()
        };

        Self {
            path_prefixes,
            libraries,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.path_prefixes.is_empty() && self.libraries.is_empty()
    }

    /// Returns true if the shared object at `path` must be ignored.
    pub fn is_whitelisted(&self, path: &str) -> bool {
        if self
            .path_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return true;
        }

        // Library names only apply to the innermost known directory
        match self
            .libraries
            .iter()
            .find(|(dir, _)| path.starts_with(dir))
        {
            Some((_, prefixes)) => prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str())),
            None => false,
        }
    }
}

/// Joins a library rule to a known directory, lexically cleaning the result:
/// repeated separators and `.` are dropped, `..` removes the previous element,
/// trailing separators are trimmed.
fn join_library(dir: &str, name: &str) -> String {
    let mut elements: Vec<&str> = Vec::new();
    for element in dir.split('/').chain(name.split('/')) {
        match element {
            "" | "." => {}
            ".." => {
                // `dir` is absolute, `..` never climbs above the root
                elements.pop();
            }
            element => elements.push(element),
        }
    }
    format!("/{}", elements.join("/"))
}
