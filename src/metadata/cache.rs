//! Two-tier descriptor cache.
//!
//! # Lookup Order
//! ```text
//! describe(type)
//!     → in-process table (keyed by type + flags)
//!     → persistent store (same key, stamps re-checked against sources)
//!     → rebuild from the registry, stamp sources, write both tiers
//! ```
//!
//! # Design Decisions
//! - Descriptors are immutable once built and handed out as `Arc`
//! - Keys carry a fingerprint of every contributing declaration, so a
//!   changed declaration never matches an entry built from the old one
//! - Stale stamps in either tier count as a miss, so an edited source is
//!   picked up by a long-lived process without a flush
//! - Persistent store failures are logged and never reach the caller

use dashmap::DashMap;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;

use crate::metadata::declaration::{TypeDeclaration, TypeRegistry, RESERVED_NAMESPACE};
use crate::metadata::descriptor::ObjectDescriptor;
use crate::metadata::source::{is_fresh, stamp, FsClock, SourceClock, SourceStamp};
use crate::metadata::store::{CachedDescriptor, DescriptorStore, NullStore};
use crate::observability::metrics;
use crate::routing::error::RouteResult;

#[derive(Debug, Clone)]
struct LocalEntry {
    descriptor: Arc<ObjectDescriptor>,
    stamps: Vec<SourceStamp>,
}

/// Memoizing front for descriptor construction.
#[derive(Debug)]
pub struct DescriptorCache {
    registry: TypeRegistry,
    store: Arc<dyn DescriptorStore>,
    clock: Arc<dyn SourceClock>,
    local: DashMap<String, LocalEntry>,
    check_sources: bool,
}

impl DescriptorCache {
    /// Create a cache over `registry` backed by `store`, reading times from the filesystem.
    pub fn new(registry: TypeRegistry, store: Arc<dyn DescriptorStore>) -> Self {
        Self {
            registry,
            store,
            clock: Arc::new(FsClock),
            local: DashMap::new(),
            check_sources: true,
        }
    }

    /// Cache with no persistent tier.
    pub fn in_memory(registry: TypeRegistry) -> Self {
        Self::new(registry, Arc::new(NullStore))
    }

    pub fn with_clock(mut self, clock: Arc<dyn SourceClock>) -> Self {
        self.clock = clock;
        self
    }

    /// Skip re-stat'ing sources on in-process hits.
    pub fn with_source_checks(mut self, enabled: bool) -> Self {
        self.check_sources = enabled;
        self
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Descriptor of exactly `type_name`; with `include_inherited` the
    /// members declared on ancestors are included as well.
    pub fn describe(&self, type_name: &str, include_inherited: bool) -> RouteResult<Arc<ObjectDescriptor>> {
        let key = format!(
            "{}|own|inherited={}|{}",
            type_name,
            include_inherited,
            self.fingerprint(type_name, include_inherited, false, false)?
        );
        self.lookup(&key, || self.build_own(type_name, include_inherited))
    }

    /// Merge the descriptors of the whole ancestor chain into one aggregate.
    ///
    /// Farther levels come first; closer entries are appended after them.
    /// Types in `excluded` or in the reserved namespace contribute nothing.
    pub fn describe_with_inheritance(
        &self,
        type_name: &str,
        excluded: &HashSet<String>,
        include_mixins: bool,
        include_interfaces: bool,
    ) -> RouteResult<Arc<ObjectDescriptor>> {
        let mut excluded_list: Vec<&str> = excluded.iter().map(String::as_str).collect();
        excluded_list.sort_unstable();
        let key = format!(
            "{}|tree|mixins={}|interfaces={}|excluded={}|{}",
            type_name,
            include_mixins,
            include_interfaces,
            excluded_list.join(","),
            self.fingerprint(type_name, true, include_mixins, include_interfaces)?
        );
        self.lookup(&key, || {
            self.build_tree(type_name, excluded, include_mixins, include_interfaces)
        })
    }

    /// Drop every in-process entry.
    pub fn clear_local(&self) {
        self.local.clear();
    }

    fn lookup<F>(&self, key: &str, build: F) -> RouteResult<Arc<ObjectDescriptor>>
    where
        F: FnOnce() -> RouteResult<ObjectDescriptor>,
    {
        if let Some(entry) = self.local.get(key).map(|r| r.value().clone()) {
            if !self.check_sources || is_fresh(self.clock.as_ref(), &entry.stamps) {
                metrics::record_descriptor_lookup("local", true);
                return Ok(entry.descriptor);
            }
            tracing::debug!(key = %key, "In-process descriptor stale, rebuilding");
            self.local.remove(key);
        }
        metrics::record_descriptor_lookup("local", false);

        match self.store.load(key) {
            Ok(Some(cached)) if is_fresh(self.clock.as_ref(), &cached.stamps) => {
                metrics::record_descriptor_lookup("persistent", true);
                let mut descriptor = cached.descriptor;
                descriptor.from_cache = true;
                let descriptor = Arc::new(descriptor);
                self.local.insert(
                    key.to_string(),
                    LocalEntry {
                        descriptor: descriptor.clone(),
                        stamps: cached.stamps,
                    },
                );
                return Ok(descriptor);
            }
            Ok(Some(_)) => {
                tracing::debug!(key = %key, "Persistent descriptor stale, rebuilding");
                metrics::record_descriptor_lookup("persistent", false);
            }
            Ok(None) => metrics::record_descriptor_lookup("persistent", false),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Descriptor store unavailable, rebuilding locally");
                metrics::record_descriptor_lookup("persistent", false);
            }
        }

        let descriptor = build()?;
        let stamps = stamp(self.clock.as_ref(), &descriptor.sources);

        let entry = CachedDescriptor {
            descriptor: descriptor.clone(),
            stamps: stamps.clone(),
        };
        if let Err(e) = self.store.save(key, &entry) {
            tracing::warn!(key = %key, error = %e, "Failed to persist descriptor");
        }

        let mut cached = descriptor.clone();
        cached.from_cache = true;
        self.local.insert(
            key.to_string(),
            LocalEntry {
                descriptor: Arc::new(cached),
                stamps,
            },
        );

        tracing::debug!(key = %key, methods = descriptor.methods.len(), "Descriptor built");
        Ok(Arc::new(descriptor))
    }

    fn build_own(&self, type_name: &str, include_inherited: bool) -> RouteResult<ObjectDescriptor> {
        let declaration = self.registry.lookup(type_name)?;
        let mut descriptor = ObjectDescriptor::from_declaration(&declaration);

        if include_inherited {
            for ancestor in self.ancestors(&declaration)?.iter().skip(1) {
                descriptor.inherit_members(&ObjectDescriptor::from_declaration(ancestor));
            }
        }
        Ok(descriptor)
    }

    fn build_tree(
        &self,
        type_name: &str,
        excluded: &HashSet<String>,
        include_mixins: bool,
        include_interfaces: bool,
    ) -> RouteResult<ObjectDescriptor> {
        let chain = self.ancestors(&self.registry.lookup(type_name)?)?;

        let mut aggregate: Option<ObjectDescriptor> = None;
        for level in chain.iter().rev() {
            let mut contributors = self.side_declarations(level, include_mixins, include_interfaces)?;
            contributors.push(level.clone());

            for declaration in contributors {
                let is_target = declaration.name == type_name;
                if !is_target && (declaration.is_reserved() || excluded.contains(&declaration.name)) {
                    continue;
                }
                let descriptor = ObjectDescriptor::from_declaration(&declaration);
                match aggregate.as_mut() {
                    Some(agg) => agg.merge_closer(&descriptor),
                    None => aggregate = Some(descriptor),
                }
            }
        }

        let mut descriptor = aggregate
            .unwrap_or_else(|| ObjectDescriptor::from_declaration(&TypeDeclaration::new(type_name)));
        descriptor.type_name = type_name.to_string();
        Ok(descriptor)
    }

    /// Interfaces then mixins of `level`, skipping the reserved namespace.
    fn side_declarations(
        &self,
        level: &TypeDeclaration,
        include_mixins: bool,
        include_interfaces: bool,
    ) -> RouteResult<Vec<Arc<TypeDeclaration>>> {
        let interfaces = level.interfaces.iter().filter(|_| include_interfaces);
        let mixins = level.mixins.iter().filter(|_| include_mixins);
        interfaces
            .chain(mixins)
            .filter(|name| !name.starts_with(RESERVED_NAMESPACE))
            .map(|name| self.registry.lookup(name))
            .collect()
    }

    /// Combined fingerprint of every declaration a describe would read.
    fn fingerprint(
        &self,
        type_name: &str,
        include_inherited: bool,
        include_mixins: bool,
        include_interfaces: bool,
    ) -> RouteResult<String> {
        let declaration = self.registry.lookup(type_name)?;
        let chain = if include_inherited {
            self.ancestors(&declaration)?
        } else {
            vec![declaration]
        };

        let mut hasher = Sha256::new();
        for level in &chain {
            for side in self.side_declarations(level, include_mixins, include_interfaces)? {
                hasher.update(side.fingerprint().as_bytes());
            }
            hasher.update(level.fingerprint().as_bytes());
        }
        Ok(hex::encode(&hasher.finalize()[..8]))
    }

    /// The declaration followed by its ancestors, closest first.
    ///
    /// The chain ends at the first ancestor in the reserved namespace; such
    /// types need not be declared at all.
    fn ancestors(&self, declaration: &Arc<TypeDeclaration>) -> RouteResult<Vec<Arc<TypeDeclaration>>> {
        let mut chain = vec![declaration.clone()];
        let mut seen: HashSet<String> = HashSet::from([declaration.name.clone()]);
        let mut parent = declaration.extends.clone();

        while let Some(name) = parent {
            if name.starts_with(RESERVED_NAMESPACE) {
                break;
            }
            if !seen.insert(name.clone()) {
                tracing::warn!(type_name = %declaration.name, ancestor = %name, "Inheritance cycle detected");
                break;
            }
            let ancestor = self.registry.lookup(&name)?;
            parent = ancestor.extends.clone();
            chain.push(ancestor);
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::declaration::MethodDeclaration;
    use crate::metadata::source::ManualClock;
    use crate::metadata::store::MemoryStore;
    use crate::routing::error::RouteError;

    fn registry() -> TypeRegistry {
        let registry = TypeRegistry::new();
        registry.register(
            TypeDeclaration::new("router::Resource")
                .doc("/** @auth required */")
                .method(MethodDeclaration::new("describe").doc("/** @path /describe */")),
        );
        registry.register(
            TypeDeclaration::new("Auditable")
                .source("auditable.rs")
                .doc("/** @produces xml */"),
        );
        registry.register(
            TypeDeclaration::new("Base")
                .source("base.rs")
                .extends("router::Resource")
                .doc("/** @path /base */")
                .method(MethodDeclaration::new("list").doc("/** @path /items */"))
                .method(MethodDeclaration::new("ping").doc("/** @path /ping */")),
        );
        registry.register(
            TypeDeclaration::new("Users")
                .source("users.rs")
                .extends("Base")
                .mixin("Auditable")
                .doc("/** @path /users */")
                .method(MethodDeclaration::new("list").doc("/** @path /all */")),
        );
        registry
    }

    fn clock() -> Arc<ManualClock> {
        let clock = ManualClock::new();
        for unit in ["auditable.rs", "base.rs", "users.rs"] {
            clock.set(unit, 1);
        }
        Arc::new(clock)
    }

    #[test]
    fn test_describe_own_members_only() {
        let cache = DescriptorCache::in_memory(registry()).with_clock(clock());
        let own = cache.describe("Users", false).unwrap();
        assert_eq!(own.methods.len(), 1);
        assert_eq!(own.sources, vec!["users.rs"]);

        let inherited = cache.describe("Users", true).unwrap();
        let names: Vec<&str> = inherited.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["ping", "list"]);
    }

    #[test]
    fn test_second_describe_is_cached_and_equal() {
        let cache = DescriptorCache::in_memory(registry()).with_clock(clock());
        let first = cache.describe("Users", true).unwrap();
        let second = cache.describe("Users", true).unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(*first, *second);
    }

    #[test]
    fn test_source_edit_forces_rebuild() {
        let clock = clock();
        let cache = DescriptorCache::in_memory(registry()).with_clock(clock.clone());
        cache.describe("Users", true).unwrap();
        assert!(cache.describe("Users", true).unwrap().from_cache);

        clock.touch("base.rs");
        let rebuilt = cache.describe("Users", true).unwrap();
        assert!(!rebuilt.from_cache);
        assert!(cache.describe("Users", true).unwrap().from_cache);
    }

    #[test]
    fn test_persistent_tier_shared_between_instances() {
        let clock = clock();
        let store = Arc::new(MemoryStore::new());

        let first = DescriptorCache::new(registry(), store.clone()).with_clock(clock.clone());
        assert!(!first.describe("Users", false).unwrap().from_cache);

        let second = DescriptorCache::new(registry(), store.clone()).with_clock(clock.clone());
        assert!(second.describe("Users", false).unwrap().from_cache);

        clock.touch("users.rs");
        let third = DescriptorCache::new(registry(), store).with_clock(clock);
        assert!(!third.describe("Users", false).unwrap().from_cache);
    }

    #[test]
    fn test_inheritance_merge_order() {
        let cache = DescriptorCache::in_memory(registry()).with_clock(clock());
        let merged = cache
            .describe_with_inheritance("Users", &HashSet::new(), true, false)
            .unwrap();

        assert_eq!(merged.type_name, "Users");
        let class: Vec<(&str, &str)> = merged
            .class
            .iter()
            .map(|e| (e.name.as_str(), e.value.as_str()))
            .collect();
        // Reserved router::Resource contributes nothing.
        assert_eq!(
            class,
            vec![("path", "/base"), ("produces", "xml"), ("path", "/users")]
        );
        let list: Vec<&str> = merged.method("list").unwrap().values("path").collect();
        assert_eq!(list, vec!["/items", "/all"]);
        assert!(merged.method("describe").is_none());
    }

    #[test]
    fn test_inheritance_exclusions() {
        let cache = DescriptorCache::in_memory(registry()).with_clock(clock());
        let excluded = HashSet::from(["Base".to_string()]);
        let merged = cache
            .describe_with_inheritance("Users", &excluded, false, false)
            .unwrap();

        assert_eq!(merged.class.len(), 1);
        assert!(merged.method("ping").is_none());
    }

    #[test]
    fn test_undeclared_reserved_ancestors_are_skipped() {
        let registry = TypeRegistry::new();
        registry.register(
            TypeDeclaration::new("Orders")
                .extends("router::Base")
                .mixin("router::Audited")
                .method(MethodDeclaration::new("list").doc("/** @path /orders */")),
        );
        let cache = DescriptorCache::in_memory(registry);

        let own = cache.describe("Orders", true).unwrap();
        assert_eq!(own.methods.len(), 1);
        let merged = cache
            .describe_with_inheritance("Orders", &HashSet::new(), true, true)
            .unwrap();
        assert_eq!(merged.method("list").unwrap().values("path").collect::<Vec<_>>(), vec!["/orders"]);
    }

    #[test]
    fn test_changed_declaration_misses_both_tiers() {
        let store = Arc::new(MemoryStore::new());
        let registry = TypeRegistry::new();
        registry.register(TypeDeclaration::new("Orders").doc("/** @path /old */"));

        let cache = DescriptorCache::new(registry.clone(), store.clone());
        assert!(!cache.describe("Orders", false).unwrap().from_cache);
        assert!(cache.describe("Orders", false).unwrap().from_cache);

        registry.register(TypeDeclaration::new("Orders").doc("/** @path /new */"));
        let rebuilt = cache.describe("Orders", false).unwrap();
        assert!(!rebuilt.from_cache);
        assert_eq!(rebuilt.class_values("path").collect::<Vec<_>>(), vec!["/new"]);

        let restarted = DescriptorCache::new(registry, store);
        let cached = restarted.describe("Orders", false).unwrap();
        assert!(cached.from_cache);
        assert_eq!(cached.class_values("path").collect::<Vec<_>>(), vec!["/new"]);
    }

    #[test]
    fn test_mixin_edit_changes_tree_key() {
        let registry = registry();
        let cache = DescriptorCache::in_memory(registry.clone()).with_clock(clock());
        let none = HashSet::new();
        cache.describe_with_inheritance("Users", &none, true, false).unwrap();
        assert!(cache.describe_with_inheritance("Users", &none, true, false).unwrap().from_cache);

        registry.register(
            TypeDeclaration::new("Auditable")
                .source("auditable.rs")
                .doc("/** @produces json */"),
        );
        let rebuilt = cache.describe_with_inheritance("Users", &none, true, false).unwrap();
        assert!(!rebuilt.from_cache);
        assert!(rebuilt.class_values("produces").any(|v| v == "json"));
    }

    #[test]
    fn test_unknown_type() {
        let cache = DescriptorCache::in_memory(registry());
        let err = cache.describe("Nope", false).unwrap_err();
        assert!(matches!(err, RouteError::TypeIntrospection(_)));
    }

    #[derive(Debug)]
    struct BrokenStore;

    impl DescriptorStore for BrokenStore {
        fn load(&self, _key: &str) -> Result<Option<CachedDescriptor>, crate::metadata::store::CacheError> {
            Err(crate::metadata::store::CacheError::Unavailable("down".into()))
        }

        fn save(&self, _key: &str, _entry: &CachedDescriptor) -> Result<(), crate::metadata::store::CacheError> {
            Err(crate::metadata::store::CacheError::Unavailable("down".into()))
        }
    }

    #[test]
    fn test_store_failure_falls_back_to_rebuild() {
        let cache = DescriptorCache::new(registry(), Arc::new(BrokenStore)).with_clock(clock());
        let descriptor = cache.describe("Users", false).unwrap();
        assert!(!descriptor.from_cache);
        assert_eq!(descriptor.type_name, "Users");
    }
}
