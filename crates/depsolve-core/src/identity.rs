//! Module and component identities.
//!
//! [`ModuleIdentifier`]s are interned process-wide so that equality between
//! two identifiers of the same module is a pointer comparison. A
//! [`ModuleVersionIdentifier`] carries a precomputed hash because it is the
//! key of most maps in the resolver.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Serialize, Serializer};

#[derive(Debug, PartialEq, Eq, Hash)]
struct ModuleKey {
    group: Box<str>,
    name: Box<str>,
}

static INTERNER: OnceLock<Mutex<HashSet<Arc<ModuleKey>>>> = OnceLock::new();

fn intern(group: &str, name: &str) -> Arc<ModuleKey> {
    let key = ModuleKey {
        group: group.into(),
        name: name.into(),
    };
    let table = INTERNER.get_or_init(|| Mutex::new(HashSet::new()));
    // A poisoned interner still holds valid entries.
    let mut table = match table.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    if let Some(existing) = table.get(&key) {
        return existing.clone();
    }
    let interned = Arc::new(key);
    table.insert(interned.clone());
    interned
}

/// The `(group, name)` identity of a logical module, independent of version.
#[derive(Clone)]
pub struct ModuleIdentifier(Arc<ModuleKey>);

impl ModuleIdentifier {
    pub fn new(group: &str, name: &str) -> Self {
        Self(intern(group, name))
    }

    /// Parse `"group:name"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (group, name) = s.split_once(':')?;
        if group.is_empty() || name.is_empty() || name.contains(':') {
            return None;
        }
        Some(Self::new(group, name))
    }

    pub fn group(&self) -> &str {
        &self.0.group
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Attach a version to this module.
    pub fn with_version(&self, version: &str) -> ModuleVersionIdentifier {
        ModuleVersionIdentifier::new(self.clone(), version)
    }
}

impl PartialEq for ModuleIdentifier {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for ModuleIdentifier {}

impl Hash for ModuleIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl Ord for ModuleIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.group(), self.name()).cmp(&(other.group(), other.name()))
    }
}

impl PartialOrd for ModuleIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleIdentifier({self})")
    }
}

impl fmt::Display for ModuleIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.group(), self.name())
    }
}

impl Serialize for ModuleIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A module at a specific version.
#[derive(Clone)]
pub struct ModuleVersionIdentifier {
    module: ModuleIdentifier,
    version: Arc<str>,
    hash: u64,
}

impl ModuleVersionIdentifier {
    pub fn new(module: ModuleIdentifier, version: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        module.hash(&mut hasher);
        version.hash(&mut hasher);
        Self {
            module,
            version: version.into(),
            hash: hasher.finish(),
        }
    }

    /// Parse `"group:name:version"`.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.splitn(3, ':');
        let group = parts.next()?;
        let name = parts.next()?;
        let version = parts.next()?;
        if group.is_empty() || name.is_empty() || version.is_empty() || version.contains(':') {
            return None;
        }
        Some(Self::new(ModuleIdentifier::new(group, name), version))
    }

    pub fn module(&self) -> &ModuleIdentifier {
        &self.module
    }

    pub fn version(&self) -> &str {
        &self.version
    }
}

impl PartialEq for ModuleVersionIdentifier {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.module == other.module && self.version == other.version
    }
}

impl Eq for ModuleVersionIdentifier {}

impl Hash for ModuleVersionIdentifier {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl Ord for ModuleVersionIdentifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.module
            .cmp(&other.module)
            .then_with(|| self.version.cmp(&other.version))
    }
}

impl PartialOrd for ModuleVersionIdentifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Debug for ModuleVersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleVersionIdentifier({self})")
    }
}

impl fmt::Display for ModuleVersionIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.module, self.version)
    }
}

impl Serialize for ModuleVersionIdentifier {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Identity of a concrete component: either a published module version or a
/// local project of the build.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComponentId {
    Module(ModuleVersionIdentifier),
    Project(Arc<str>),
}

impl ComponentId {
    pub fn project(path: &str) -> Self {
        Self::Project(path.into())
    }

    pub fn is_project(&self) -> bool {
        matches!(self, Self::Project(_))
    }
}

impl From<ModuleVersionIdentifier> for ComponentId {
    fn from(id: ModuleVersionIdentifier) -> Self {
        Self::Module(id)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Module(id) => write!(f, "{id}"),
            Self::Project(path) => write!(f, "project {path}"),
        }
    }
}

impl Serialize for ComponentId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interned_identifiers_share_storage() {
        let a = ModuleIdentifier::new("com.acme", "lib");
        let b = ModuleIdentifier::new("com.acme", "lib");
        assert!(Arc::ptr_eq(&a.0, &b.0));
        assert_eq!(a, b);
    }

    #[test]
    fn parse_module_identifier() {
        let id = ModuleIdentifier::parse("com.acme:lib").unwrap();
        assert_eq!(id.group(), "com.acme");
        assert_eq!(id.name(), "lib");
        assert!(ModuleIdentifier::parse("com.acme").is_none());
        assert!(ModuleIdentifier::parse("a:b:c").is_none());
        assert!(ModuleIdentifier::parse(":lib").is_none());
    }

    #[test]
    fn parse_module_version_identifier() {
        let id = ModuleVersionIdentifier::parse("com.acme:lib:1.0").unwrap();
        assert_eq!(id.module().to_string(), "com.acme:lib");
        assert_eq!(id.version(), "1.0");
        assert_eq!(id.to_string(), "com.acme:lib:1.0");
        assert!(ModuleVersionIdentifier::parse("com.acme:lib").is_none());
    }

    #[test]
    fn version_identifiers_with_equal_parts_hash_equally() {
        use std::collections::HashSet;
        let mut set = HashSet::new();
        set.insert(ModuleVersionIdentifier::parse("g:n:1.0").unwrap());
        assert!(set.contains(&ModuleIdentifier::new("g", "n").with_version("1.0")));
        assert!(!set.contains(&ModuleIdentifier::new("g", "n").with_version("1.1")));
    }

    #[test]
    fn project_component_display() {
        assert_eq!(ComponentId::project(":core").to_string(), "project :core");
    }
}
