use std::collections::HashMap;
use std::rc::Rc;

use log::debug;
use serde_json::Value;

use crate::class::{LocalFuture, Output};
use crate::error::Fault;
use crate::page::Page;

/// A module addressed by `@name` action targets.
pub trait Module {
    fn invoke(&self, page: &mut Page, fcn: &str, args: &[Value]) -> Result<Output, Fault>;
}

/// Loads modules on first use. Loading may suspend the action processor.
pub trait ModuleResolver {
    fn resolve_and_import(&self, name: &str) -> LocalFuture<Result<Rc<dyn Module>, Fault>>;
}

/// Resolver over a fixed set of in-process modules.
#[derive(Default)]
pub struct StaticModules {
    modules: HashMap<String, Rc<dyn Module>>,
}

impl StaticModules {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: &str, module: Rc<dyn Module>) {
        self.modules.insert(name.to_string(), module);
    }
}

impl ModuleResolver for StaticModules {
    fn resolve_and_import(&self, name: &str) -> LocalFuture<Result<Rc<dyn Module>, Fault>> {
        let result = self.modules.get(name).cloned().ok_or_else(|| Fault::Module {
            name: name.to_string(),
            reason: "not registered".to_string(),
        });
        Box::pin(async move { result })
    }
}

/// Per-session cache in front of a resolver.
pub struct ModuleCache {
    resolver: Rc<dyn ModuleResolver>,
    loaded: HashMap<String, Rc<dyn Module>>,
}

impl ModuleCache {
    pub fn new(resolver: Rc<dyn ModuleResolver>) -> Self {
        Self {
            resolver,
            loaded: HashMap::new(),
        }
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub async fn get_or_load(&mut self, name: &str) -> Result<Rc<dyn Module>, Fault> {
        if let Some(module) = self.loaded.get(name) {
            return Ok(Rc::clone(module));
        }
        debug!("[Proc] importing module '{name}'");
        let module = self.resolver.resolve_and_import(name).await?;
        self.loaded.insert(name.to_string(), Rc::clone(&module));
        Ok(module)
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;

    struct Echo;

    impl Module for Echo {
        fn invoke(&self, _page: &mut Page, fcn: &str, _args: &[Value]) -> Result<Output, Fault> {
            Ok(Output::Value(Value::String(fcn.to_string())))
        }
    }

    struct Counting {
        inner: StaticModules,
        calls: Cell<usize>,
    }

    impl ModuleResolver for Counting {
        fn resolve_and_import(&self, name: &str) -> LocalFuture<Result<Rc<dyn Module>, Fault>> {
            self.calls.set(self.calls.get() + 1);
            self.inner.resolve_and_import(name)
        }
    }

    #[tokio::test]
    async fn test_modules_are_imported_once() {
        let mut inner = StaticModules::new();
        inner.register("echo", Rc::new(Echo));
        let resolver = Rc::new(Counting {
            inner,
            calls: Cell::new(0),
        });
        let mut cache = ModuleCache::new(resolver.clone());

        cache.get_or_load("echo").await.unwrap();
        cache.get_or_load("echo").await.unwrap();
        assert_eq!(resolver.calls.get(), 1);
        assert!(cache.is_loaded("echo"));

        assert!(matches!(
            cache.get_or_load("charts").await,
            Err(Fault::Module { name, .. }) if name == "charts"
        ));
    }
}
