//! Amenders and the registry that maps package names to them.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::config::{AmendConfig, PackageRule};
use crate::error::Result;
use crate::patcher::PackagePatcher;

/// Package-specific edits applied through the capability API.
///
/// Amenders run on blocking worker threads, one call per resolved package
/// directory, and are never invoked in revert mode.
pub trait Amender: Send + Sync {
    fn amend(&self, patcher: &mut PackagePatcher<'_>) -> Result<()>;
}

/// Adapter for closures registered through [`AmenderRegistry::register_fn`].
struct FnAmender<F>(F);

impl<F> Amender for FnAmender<F>
where
    F: Fn(&mut PackagePatcher<'_>) -> Result<()> + Send + Sync,
{
    fn amend(&self, patcher: &mut PackagePatcher<'_>) -> Result<()> {
        (self.0)(patcher)
    }
}

/// JavaScript truthiness, used by `skip_if_present`.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

impl Amender for PackageRule {
    fn amend(&self, patcher: &mut PackagePatcher<'_>) -> Result<()> {
        if let Some(expected) = &self.expect_version {
            patcher.expect_version(expected)?;
        }

        if let Some(key) = self.skip_if_present.iter().find(|key| {
            patcher
                .get_attribute_clone(key)
                .as_ref()
                .is_some_and(is_truthy)
        }) {
            tracing::info!(
                package = patcher.package_name(),
                "\"{key}\" is already present, leaving package.json unchanged"
            );
            return Ok(());
        }

        for (key, value) in &self.set {
            patcher.set_attribute(key, value.clone())?;
        }

        for sub in &self.sub_documents {
            patcher.ensure_sub_document(sub.path.iter().cloned(), |sub_patcher| {
                for (key, value) in &sub.set {
                    sub_patcher.set_attribute(key, value.clone())?;
                }
                Ok(())
            })?;
        }
        Ok(())
    }
}

/// Ordered mapping from package name to amender.
#[derive(Clone, Default)]
pub struct AmenderRegistry {
    amenders: IndexMap<String, Arc<dyn Amender>>,
}

impl AmenderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with one declarative amender per configured package.
    pub fn from_config(config: &AmendConfig) -> Self {
        let mut registry = Self::new();
        for (name, rule) in &config.packages {
            registry.register(name.clone(), rule.clone());
        }
        registry
    }

    /// Register `amender` for `package`, replacing any previous one.
    pub fn register(&mut self, package: impl Into<String>, amender: impl Amender + 'static) {
        self.amenders.insert(package.into(), Arc::new(amender));
    }

    /// Register a closure as the amender for `package`.
    pub fn register_fn<F>(&mut self, package: impl Into<String>, amender: F)
    where
        F: Fn(&mut PackagePatcher<'_>) -> Result<()> + Send + Sync + 'static,
    {
        self.register(package, FnAmender(amender));
    }

    pub fn get(&self, package: &str) -> Option<Arc<dyn Amender>> {
        self.amenders.get(package).cloned()
    }

    pub fn contains(&self, package: &str) -> bool {
        self.amenders.contains_key(package)
    }

    /// Registered names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.amenders.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.amenders.is_empty()
    }

    pub fn len(&self) -> usize {
        self.amenders.len()
    }
}

impl std::fmt::Debug for AmenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmenderRegistry")
            .field("packages", &self.amenders.keys().collect::<Vec<_>>())
            .finish()
    }
}
