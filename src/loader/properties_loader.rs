//! Loader that serves values straight from its configuration.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use serde_json::{Map, Value};
use tracing::debug;

use crate::cache::Cache;
use crate::error::Result;
use crate::source::Properties;

use super::{KeyedLoader, LoadArgument, LoaderFactory};

/// Loader answering from a fixed `key=value` table.
///
/// When called with an argument that is a `String` or `&'static str`, the
/// argument is prepended to the loaded value. Each clone has its own load
/// counter.
#[derive(Debug)]
pub struct PropertiesLoader {
    name: String,
    values: BTreeMap<String, String>,
    loads: AtomicU64,
}

impl PropertiesLoader {
    pub fn new(name: impl Into<String>, values: BTreeMap<String, String>) -> Self {
        Self {
            name: name.into(),
            values,
            loads: AtomicU64::new(0),
        }
    }

    /// How many keys this instance was asked to load.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }

    fn lookup(&self, key: &str) -> Option<String> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        self.values.get(key).cloned()
    }
}

fn argument_text(argument: &LoadArgument) -> Option<&str> {
    argument
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| argument.downcast_ref::<&'static str>().copied())
}

impl KeyedLoader<String, String> for PropertiesLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&self, cache: &Cache<String, String>) -> Result<()> {
        debug!(
            "Properties loader '{}' serving {} keys for cache '{}'",
            self.name,
            self.values.len(),
            cache.name()
        );
        Ok(())
    }

    fn load(&self, key: &String) -> Result<Option<String>> {
        Ok(self.lookup(key))
    }

    fn load_with(&self, key: &String, argument: &LoadArgument) -> Result<Option<String>> {
        let value = self.lookup(key);
        Ok(match argument_text(argument) {
            Some(prefix) => value.map(|v| format!("{prefix}{v}")),
            None => value,
        })
    }

    fn clone_for(&self, target: &Cache<String, String>) -> Result<Box<dyn KeyedLoader<String, String>>> {
        Ok(Box::new(PropertiesLoader::new(
            format!("properties:{}", target.name()),
            self.values.clone(),
        )))
    }
}

/// Factory registered under `"properties"` by the binary.
#[derive(Debug, Clone, Default)]
pub struct PropertiesLoaderFactory;

impl LoaderFactory<String, String> for PropertiesLoaderFactory {
    fn create_loader(
        &self,
        environment: &Map<String, Value>,
    ) -> Result<Box<dyn KeyedLoader<String, String>>> {
        let values = environment
            .iter()
            .map(|(k, v)| {
                let text = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), text)
            })
            .collect();
        Ok(Box::new(PropertiesLoader::new("properties", values)))
    }

    fn create_loader_for(
        &self,
        cache: &Cache<String, String>,
        properties: &Properties,
    ) -> Result<Box<dyn KeyedLoader<String, String>>> {
        let values = properties
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Ok(Box::new(PropertiesLoader::new(
            format!("properties:{}", cache.name()),
            values,
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheSettings;
    use std::collections::HashSet;

    fn loader() -> PropertiesLoader {
        let values = [("a", "1"), ("b", "2")]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        PropertiesLoader::new("test", values)
    }

    #[test]
    fn test_load_known_and_unknown() {
        let loader = loader();
        assert_eq!(loader.load(&"a".to_string()).unwrap(), Some("1".into()));
        assert_eq!(loader.load(&"zz".to_string()).unwrap(), None);
        assert_eq!(loader.load_count(), 2);
    }

    #[test]
    fn test_argument_prefixes_value() {
        let loader = loader();
        let owned = "v".to_string();
        assert_eq!(
            loader.load_with(&"b".to_string(), &owned).unwrap(),
            Some("v2".into())
        );
        assert_eq!(
            loader.load_with(&"b".to_string(), &"w").unwrap(),
            Some("w2".into())
        );
        assert_eq!(
            loader.load_with(&"b".to_string(), &7u8).unwrap(),
            Some("2".into())
        );
    }

    #[test]
    fn test_batch_omits_unknown_keys() {
        let keys: HashSet<String> = ["a", "missing"].iter().map(|s| s.to_string()).collect();
        let batch = loader().load_all(&keys).unwrap();
        assert_eq!(batch.values.len(), 1);
        assert!(batch.failures.is_empty());
    }

    #[test]
    fn test_clones_count_independently() {
        let template = loader();
        let cache: Cache<String, String> = Cache::standalone(CacheSettings::named("target"));
        let copy = template.clone_for(&cache).unwrap();

        copy.load(&"a".to_string()).unwrap();
        copy.load(&"b".to_string()).unwrap();

        assert_eq!(template.load_count(), 0);
        assert_eq!(copy.name(), "properties:target");
    }

    #[test]
    fn test_factory_paths() {
        let cache: Cache<String, String> = Cache::standalone(CacheSettings::named("native"));
        let factory = PropertiesLoaderFactory;

        let props = Properties::parse("k=v", None).unwrap();
        let native = factory.create_loader_for(&cache, &props).unwrap();
        assert_eq!(native.load(&"k".to_string()).unwrap(), Some("v".into()));

        let mut env = Map::new();
        env.insert("n".into(), Value::from(3));
        let neutral = factory.create_loader(&env).unwrap();
        assert_eq!(neutral.load(&"n".to_string()).unwrap(), Some("3".into()));
    }
}
