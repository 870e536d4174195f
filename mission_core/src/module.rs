//! # Module Interface & Registry
//!
//! Swappable per-hole tool behaviour, grounded on `original_source/modules/base_module.py`
//! (`BaseModule`/`ModuleContext`/`ModuleResult`/`NullModule`) and `modules/registry.py`
//! (`ModuleRegistry`). The Python registry is process-wide (a module-level singleton);
//! per SPEC_FULL.md's Design Note this is replaced with an instance-owned map built
//! once by the orchestrator at startup, since nothing here needs process-wide sharing.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

use crate::pose::Pose;
use crate::services::{CanBus, FilterService};
use crate::vision::VisionGate;
use std::collections::HashMap;
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("module failed: {0}")]
    Failed(String),
}

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// Everything a module needs to act at a single hole. Borrowed collaborators rather
/// than owned: modules do not outlive a single `execute`/`initialize` call, and the
/// orchestrator retains ownership of the CAN bus, filter, and vision gate throughout
/// the mission (spec.md §3's "collaborators borrow references for the duration of a
/// single operation").
pub struct ModuleContext<'a> {
    pub hole_pose: Pose,
    pub robot_pose: Pose,
    pub hole_index: usize,
    pub can: &'a mut dyn CanBus,
    pub filter: &'a mut dyn FilterService,
    pub vision: Option<&'a mut dyn VisionGate>,
    pub module_config: serde_json::Value,
}

/// Outcome of a module's `execute` at one hole.
#[derive(Debug, Clone)]
pub struct ModuleResult {
    pub success: bool,
    pub error: Option<String>,
    pub measurements: Option<serde_json::Value>,
    pub telemetry: Option<serde_json::Value>,
    pub hole_completed: bool,
}

impl ModuleResult {
    pub fn success() -> Self {
        Self {
            success: true,
            error: None,
            measurements: None,
            telemetry: None,
            hole_completed: true,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            measurements: None,
            telemetry: None,
            hole_completed: false,
        }
    }
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// Lifecycle contract every tool module implements: `initialize` once at startup,
/// `verify_ready` before the first hole, optional `calibrate`, `execute` once per
/// hole, and `shutdown` on normal or error exit — which must not fail (spec.md §4.7).
pub trait Module: Send {
    fn module_name(&self) -> &str;

    fn initialize(&mut self, context: &mut ModuleContext) -> Result<(), ModuleError>;

    fn verify_ready(&mut self) -> Result<bool, ModuleError>;

    fn calibrate(&mut self) -> Result<bool, ModuleError>;

    fn execute(&mut self, context: &mut ModuleContext) -> ModuleResult;

    fn shutdown(&mut self);
}

// ---------------------------------------------------------------------------
// NULL MODULE
// ---------------------------------------------------------------------------

/// Always available under the name `"none"`. Returns success without side effects —
/// used to exercise navigation without deploying a tool.
pub struct NullModule;

impl Module for NullModule {
    fn module_name(&self) -> &str {
        "none"
    }

    fn initialize(&mut self, _context: &mut ModuleContext) -> Result<(), ModuleError> {
        Ok(())
    }

    fn verify_ready(&mut self) -> Result<bool, ModuleError> {
        Ok(true)
    }

    fn calibrate(&mut self) -> Result<bool, ModuleError> {
        Ok(true)
    }

    fn execute(&mut self, _context: &mut ModuleContext) -> ModuleResult {
        ModuleResult::success()
    }

    fn shutdown(&mut self) {}
}

// ---------------------------------------------------------------------------
// REGISTRY
// ---------------------------------------------------------------------------

/// Maps module name to a factory closure. Pre-populated with `"none"` → [`NullModule`];
/// additional modules are registered by the orchestrator at startup. Lookup by an
/// unknown name falls back to the null module with a warning, rather than an error
/// (spec.md §4.7).
pub struct ModuleRegistry {
    factories: HashMap<String, Box<dyn Fn() -> Box<dyn Module> + Send + Sync>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            factories: HashMap::new(),
        };
        registry.register("none", || Box::new(NullModule));
        registry
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Module> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Box::new(factory));
    }

    /// Build a fresh module instance by name. Unknown names return the null module
    /// and log a warning, rather than failing mission setup.
    pub fn get(&self, name: &str) -> Box<dyn Module> {
        match self.factories.get(name) {
            Some(factory) => factory(),
            None => {
                log::warn!("unknown module \"{}\", falling back to null module", name);
                Box::new(NullModule)
            }
        }
    }

    pub fn list_modules(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// TESTS
// ---------------------------------------------------------------------------

#[cfg(test)]
mod test {
    use super::*;
    use crate::services::mock::{MockCanBus, MockFilterService};

    fn context<'a>(can: &'a mut dyn CanBus, filter: &'a mut dyn FilterService) -> ModuleContext<'a> {
        ModuleContext {
            hole_pose: Pose::identity("world"),
            robot_pose: Pose::identity("world"),
            hole_index: 0,
            can,
            filter,
            vision: None,
            module_config: serde_json::Value::Null,
        }
    }

    #[test]
    fn null_module_always_succeeds() {
        let mut module = NullModule;
        let (mut can, _) = MockCanBus::new();
        let (mut filter, _) = MockFilterService::new();
        let mut ctx = context(&mut can, &mut filter);

        assert!(module.initialize(&mut ctx).is_ok());
        assert!(module.verify_ready().unwrap());
        assert!(module.calibrate().unwrap());
        let result = module.execute(&mut ctx);
        assert!(result.success);
        assert!(result.hole_completed);
    }

    #[test]
    fn registry_falls_back_to_null_module_for_unknown_names() {
        let registry = ModuleRegistry::new();
        let module = registry.get("xstem-does-not-exist");
        assert_eq!(module.module_name(), "none");
    }

    #[test]
    fn registry_resolves_registered_modules_by_name() {
        let mut registry = ModuleRegistry::new();
        registry.register("echo", || Box::new(NullModule));
        assert!(registry.list_modules().contains(&"echo"));
    }
}
