//! Plugin discovery.
//!
//! A [`PluginSource`] lists the installed plugins and where their manifests
//! live. [`DirectoryPluginSource`] scans search directories; [`StaticPluginSource`]
//! holds a fixed list (tests, embedded applications).

use super::manifest::InstalledPlugin;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Manifest file name inside a plugin directory.
pub const MANIFEST_FILE: &str = "redsun.yaml";

/// Suffix of stand-alone manifest files (`<plugin>.redsun.yaml`).
pub const MANIFEST_SUFFIX: &str = ".redsun.yaml";

/// Lists installed plugins.
pub trait PluginSource: Send + Sync {
    /// Every installed plugin, at most once per name.
    fn list_plugins(&self) -> Vec<InstalledPlugin>;
}

// =============================================================================
// Directory Source
// =============================================================================

/// Scans search directories for plugin manifests.
///
/// A search directory may contain
///
/// - plugin directories `<plugin>/redsun.yaml`, named after the directory, and
/// - stand-alone manifests `<plugin>.redsun.yaml`, named after the file.
///
/// # Search Path Priority
///
/// Search paths are processed in order, with earlier paths having higher
/// priority. If the same plugin name exists in multiple paths, the version
/// from the earlier path wins. Add user directories before system ones.
///
/// # Example
///
/// ```rust,ignore
/// let mut source = DirectoryPluginSource::new();
/// source.add_search_path("~/.config/redsun/plugins/");
/// source.add_search_path("/usr/share/redsun/plugins/");
///
/// for plugin in source.list_plugins() {
///     println!("{} ({})", plugin.name, plugin.manifest_path.display());
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DirectoryPluginSource {
    search_paths: Vec<PathBuf>,
}

impl DirectoryPluginSource {
    /// Create a source with no search paths.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a source from a list of search paths, highest priority first.
    pub fn with_paths<I, P>(paths: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut source = Self::new();
        for path in paths {
            source.add_search_path(path);
        }
        source
    }

    /// Add a search path. A leading `~` is expanded to the home directory.
    pub fn add_search_path<P: Into<PathBuf>>(&mut self, path: P) {
        self.search_paths.push(expand_home(path.into()));
    }

    /// Configured search paths in priority order.
    pub fn search_paths(&self) -> &[PathBuf] {
        &self.search_paths
    }

    fn scan_directory(path: &Path, found: &mut BTreeMap<String, (usize, PathBuf)>, priority: usize) {
        if !path.exists() {
            // Non-existent paths are silently skipped
            tracing::debug!("Plugin path does not exist: {}", path.display());
            return;
        }

        if !path.is_dir() {
            tracing::warn!("Plugin path is not a directory: {}", path.display());
            return;
        }

        let entries = match std::fs::read_dir(path) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Failed to read plugin directory {}: {}", path.display(), e);
                return;
            }
        };

        let mut candidates: Vec<(String, PathBuf)> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| manifest_candidate(&entry.path()))
            .collect();
        // read_dir order is platform dependent
        candidates.sort();

        for (name, manifest_path) in candidates {
            if let Some((existing_priority, existing_path)) = found.get(&name) {
                if *existing_priority <= priority {
                    tracing::debug!(
                        "Skipping plugin '{}' from {} (already found at {} with higher priority)",
                        name,
                        manifest_path.display(),
                        existing_path.display()
                    );
                    continue;
                }
            }
            tracing::debug!("Found plugin: {} ({})", name, manifest_path.display());
            found.insert(name, (priority, manifest_path));
        }
    }
}

impl PluginSource for DirectoryPluginSource {
    fn list_plugins(&self) -> Vec<InstalledPlugin> {
        let mut found = BTreeMap::new();
        for (priority, path) in self.search_paths.iter().enumerate() {
            Self::scan_directory(path, &mut found, priority);
        }

        found
            .into_iter()
            .map(|(name, (_, manifest_path))| InstalledPlugin { name, manifest_path })
            .collect()
    }
}

fn manifest_candidate(path: &Path) -> Option<(String, PathBuf)> {
    if path.is_dir() {
        let manifest = path.join(MANIFEST_FILE);
        let name = path.file_name()?.to_str()?.to_string();
        return manifest.is_file().then_some((name, manifest));
    }

    let file_name = path.file_name()?.to_str()?;
    let name = file_name.strip_suffix(MANIFEST_SUFFIX)?;
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), path.to_path_buf()))
}

fn expand_home(path: PathBuf) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path,
        },
        Err(_) => path,
    }
}

// =============================================================================
// Static Source
// =============================================================================

/// Fixed list of installed plugins.
#[derive(Debug, Clone, Default)]
pub struct StaticPluginSource {
    plugins: Vec<InstalledPlugin>,
}

impl StaticPluginSource {
    /// Create an empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style registration of a plugin.
    pub fn with_plugin(mut self, name: impl Into<String>, manifest_path: impl Into<PathBuf>) -> Self {
        self.add(name, manifest_path);
        self
    }

    /// Register a plugin. A later registration under the same name replaces
    /// the earlier one.
    pub fn add(&mut self, name: impl Into<String>, manifest_path: impl Into<PathBuf>) {
        let name = name.into();
        self.plugins.retain(|p| p.name != name);
        self.plugins.push(InstalledPlugin {
            name,
            manifest_path: manifest_path.into(),
        });
    }
}

impl PluginSource for StaticPluginSource {
    fn list_plugins(&self) -> Vec<InstalledPlugin> {
        self.plugins.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_plugin_dir(root: &Path, name: &str) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        let manifest = dir.join(MANIFEST_FILE);
        fs::write(&manifest, "devices: {}\n").unwrap();
        manifest
    }

    #[test]
    fn finds_plugin_dirs_and_standalone_manifests() {
        let root = tempfile::tempdir().unwrap();
        write_plugin_dir(root.path(), "redsun-mock");
        fs::write(root.path().join("extra.redsun.yaml"), "views: {}\n").unwrap();
        // neither a plugin dir nor a manifest
        fs::create_dir_all(root.path().join("not-a-plugin")).unwrap();
        fs::write(root.path().join("notes.yaml"), "").unwrap();

        let source = DirectoryPluginSource::with_paths([root.path()]);
        let names: Vec<String> = source.list_plugins().into_iter().map(|p| p.name).collect();
        assert_eq!(names, vec!["extra", "redsun-mock"]);
    }

    #[test]
    fn earlier_search_path_wins() {
        let user = tempfile::tempdir().unwrap();
        let system = tempfile::tempdir().unwrap();
        let user_manifest = write_plugin_dir(user.path(), "redsun-mock");
        write_plugin_dir(system.path(), "redsun-mock");
        write_plugin_dir(system.path(), "redsun-extra");

        let source = DirectoryPluginSource::with_paths([user.path(), system.path()]);
        let plugins = source.list_plugins();

        assert_eq!(plugins.len(), 2);
        let mock = plugins.iter().find(|p| p.name == "redsun-mock").unwrap();
        assert_eq!(mock.manifest_path, user_manifest);
    }

    #[test]
    fn missing_paths_are_skipped() {
        let source = DirectoryPluginSource::with_paths(["/nonexistent/redsun/plugins"]);
        assert!(source.list_plugins().is_empty());
    }

    #[test]
    fn tilde_expands_to_home() {
        let mut source = DirectoryPluginSource::new();
        source.add_search_path("~/plugins");
        if let Some(home) = dirs::home_dir() {
            assert_eq!(source.search_paths()[0], home.join("plugins"));
        }
    }

    #[test]
    fn static_source_replaces_same_name() {
        let source = StaticPluginSource::new()
            .with_plugin("mock", "/a/redsun.yaml")
            .with_plugin("mock", "/b/redsun.yaml");
        let plugins = source.list_plugins();
        assert_eq!(plugins.len(), 1);
        assert_eq!(plugins[0].manifest_path, PathBuf::from("/b/redsun.yaml"));
    }
}
