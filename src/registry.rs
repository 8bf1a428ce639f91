//! Engine registry: discovery of descriptor adapters, static registration and
//! the runtime enabled/disabled switch for each engine.
use crate::config::UpstreamConfig;
use crate::engines::{DeclarativeEngine, Engine, EngineDescriptor};
use crate::error::{BridgeError, Result};
use crate::search::DispatchError;
use crate::walker::descriptor_files;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

struct Slot {
    engine: Arc<dyn Engine>,
    enabled: AtomicBool,
}

/// Outcome of scanning one descriptor directory.
#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub loaded: Vec<String>,
    pub skipped: Vec<(PathBuf, String)>,
}

/// Registered engines in registration order.
///
/// Flags are atomics so enable/disable only needs a shared reference; the
/// set of engines itself is fixed once the registry is shared.
#[derive(Default)]
pub struct Registry {
    slots: Vec<Slot>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from every valid descriptor in `dir`.
    pub fn discover(dir: &Path, upstream: &UpstreamConfig) -> Result<Self> {
        let mut registry = Self::new();
        registry.load_dir(dir, upstream)?;
        Ok(registry)
    }

    /// Load descriptors from `dir`. A descriptor that fails to load or
    /// collides with an existing name is skipped and logged; only a missing
    /// directory is an error.
    pub fn load_dir(&mut self, dir: &Path, upstream: &UpstreamConfig) -> Result<DiscoveryReport> {
        if !dir.is_dir() {
            return Err(BridgeError::EnginesDirMissing(dir.to_path_buf()));
        }

        let mut report = DiscoveryReport::default();
        for path in descriptor_files(dir) {
            let loaded = DeclarativeEngine::load(&path, upstream)
                .map_err(|e| BridgeError::Descriptor {
                    path: path.clone(),
                    source: Box::new(e),
                })
                .and_then(|engine| self.register(Arc::new(engine)));

            match loaded {
                Ok(name) => {
                    log::debug!("Loaded engine '{}' from {:?}", name, path);
                    report.loaded.push(name);
                }
                Err(e) => {
                    log::warn!("Skipping engine descriptor {:?}: {}", path, e);
                    report.skipped.push((path, e.to_string()));
                }
            }
        }

        log::info!(
            "Discovered {} engines in {:?} ({} skipped)",
            report.loaded.len(),
            dir,
            report.skipped.len()
        );
        Ok(report)
    }

    /// Add a statically linked engine, enabled. Names must be unique.
    pub fn register(&mut self, engine: Arc<dyn Engine>) -> Result<String> {
        let name = engine.name().to_string();
        if self.index.contains_key(&name) {
            return Err(BridgeError::DuplicateEngine(name));
        }
        self.index.insert(name.clone(), self.slots.len());
        self.slots.push(Slot {
            engine,
            enabled: AtomicBool::new(true),
        });
        Ok(name)
    }

    fn slot(&self, name: &str) -> Option<&Slot> {
        self.index.get(name).map(|&i| &self.slots[i])
    }

    fn describe(slot: &Slot) -> EngineDescriptor {
        EngineDescriptor::from_engine(slot.engine.as_ref(), slot.enabled.load(Ordering::SeqCst))
    }

    pub fn get(&self, name: &str) -> Option<EngineDescriptor> {
        self.slot(name).map(Self::describe)
    }

    pub fn engine(&self, name: &str) -> Option<Arc<dyn Engine>> {
        self.slot(name).map(|slot| slot.engine.clone())
    }

    pub fn is_enabled(&self, name: &str) -> Option<bool> {
        self.slot(name).map(|slot| slot.enabled.load(Ordering::SeqCst))
    }

    pub fn list(&self) -> Vec<EngineDescriptor> {
        self.slots.iter().map(Self::describe).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.slots
            .iter()
            .map(|slot| slot.engine.name().to_string())
            .collect()
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> std::result::Result<(), DispatchError> {
        let slot = self
            .slot(name)
            .ok_or_else(|| DispatchError::EngineNotFound(name.to_string()))?;
        let previous = slot.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            log::info!(
                "Engine '{}' {}",
                name,
                if enabled { "enabled" } else { "disabled" }
            );
        }
        Ok(())
    }

    pub fn enable(&self, name: &str) -> std::result::Result<(), DispatchError> {
        self.set_enabled(name, true)
    }

    pub fn disable(&self, name: &str) -> std::result::Result<(), DispatchError> {
        self.set_enabled(name, false)
    }

    pub fn enabled_adapters(&self) -> Vec<EngineDescriptor> {
        self.slots
            .iter()
            .filter(|slot| slot.enabled.load(Ordering::SeqCst))
            .map(Self::describe)
            .collect()
    }

    /// Snapshot of the currently enabled engines, in registration order.
    pub fn enabled_engines(&self) -> Vec<Arc<dyn Engine>> {
        self.slots
            .iter()
            .filter(|slot| slot.enabled.load(Ordering::SeqCst))
            .map(|slot| slot.engine.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
