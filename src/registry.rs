//! Extension registry
//!
//! Holds adapter factories keyed by platform name, lifecycle hooks and custom
//! configuration validators. Built once at startup and handed to the
//! orchestrator.

use crate::adapter::{self, AdapterFactory};
use crate::error::{FantasmaError, FantasmaResult};
use crate::interface::SharingConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Lifecycle points where hooks run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookEvent {
    PreStart,
    PostStart,
    PreStop,
    PostStop,
    OnError,
}

impl HookEvent {
    pub const ALL: [HookEvent; 5] = [
        HookEvent::PreStart,
        HookEvent::PostStart,
        HookEvent::PreStop,
        HookEvent::PostStop,
        HookEvent::OnError,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreStart => "pre_start",
            Self::PostStart => "post_start",
            Self::PreStop => "pre_stop",
            Self::PostStop => "post_stop",
            Self::OnError => "on_error",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookEvent {
    type Err = FantasmaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|event| event.as_str() == s)
            .ok_or_else(|| FantasmaError::UnknownHook(s.to_string()))
    }
}

/// What a hook gets to see
#[derive(Debug, Clone)]
pub struct HookContext {
    pub event: HookEvent,
    /// Session configuration, password redacted
    pub config: Option<SharingConfig>,
    pub error: Option<String>,
}

impl HookContext {
    pub fn new(event: HookEvent, config: Option<&SharingConfig>) -> Self {
        Self {
            event,
            config: config.map(SharingConfig::redacted),
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Hook callback; an `Err` is logged and ignored
pub type HookCallback = Arc<dyn Fn(&HookContext) -> anyhow::Result<()> + Send + Sync>;

/// Wrap a closure as a [`HookCallback`]
pub fn hook<F>(callback: F) -> HookCallback
where
    F: Fn(&HookContext) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(callback)
}

/// Custom validator; `Err` rejects the configuration with its message
pub type ValidatorFn = fn(&SharingConfig) -> Result<(), String>;

#[derive(Default)]
pub struct ExtensionRegistry {
    adapters: HashMap<String, AdapterFactory>,
    hooks: HashMap<HookEvent, Vec<HookCallback>>,
    validators: Vec<(String, ValidatorFn)>,
}

impl ExtensionRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `linux`, `macos`, `windows` and `termux` adapters
    pub fn with_builtin_adapters() -> Self {
        let mut registry = Self::new();
        let builtins: [(&str, AdapterFactory); 4] = [
            ("linux", adapter::linux::create_adapter),
            ("macos", adapter::macos::create_adapter),
            ("windows", adapter::windows::create_adapter),
            ("termux", adapter::termux::create_adapter),
        ];
        for (key, factory) in builtins {
            registry.adapters.insert(key.to_string(), factory);
        }
        registry
    }

    /// Register an adapter factory under `key`
    ///
    /// Re-registering the same factory is a no-op; a different factory under
    /// an existing key is a conflict.
    ///
    /// "Same" means the same function address. Rust does not promise that
    /// addresses are unique or stable: the compiler may merge two functions
    /// with identical bodies (a distinct factory is then taken as a repeat),
    /// and one function may get different addresses in different codegen
    /// units (a repeat is then reported as a conflict). Register each key from
    /// one place, or `unregister_adapter` first to replace a factory.
    pub fn register_adapter(&mut self, key: &str, factory: AdapterFactory) -> FantasmaResult<()> {
        if let Some(existing) = self.adapters.get(key) {
            if *existing as usize == factory as usize {
                debug!("Adapter '{}' already registered", key);
                return Ok(());
            }
            return Err(FantasmaError::RegistrationConflict(key.to_string()));
        }

        info!("Registering adapter: {}", key);
        self.adapters.insert(key.to_string(), factory);
        Ok(())
    }

    pub fn unregister_adapter(&mut self, key: &str) -> bool {
        self.adapters.remove(key).is_some()
    }

    pub fn get_adapter(&self, key: &str) -> Option<AdapterFactory> {
        self.adapters.get(key).copied()
    }

    /// Registered keys, sorted
    pub fn adapter_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.adapters.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn register_hook(&mut self, event: HookEvent, callback: HookCallback) {
        self.hooks.entry(event).or_default().push(callback);
    }

    /// Register a hook by event name (`pre_start`, `post_start`, ...)
    pub fn register_hook_named(&mut self, event: &str, callback: HookCallback) -> FantasmaResult<()> {
        let event: HookEvent = event.parse()?;
        self.register_hook(event, callback);
        Ok(())
    }

    pub fn hook_count(&self, event: HookEvent) -> usize {
        self.hooks.get(&event).map_or(0, Vec::len)
    }

    /// Run every callback for the context's event in registration order
    ///
    /// A callback returning `Err` or panicking is logged and the remaining
    /// callbacks still run.
    pub fn trigger_hook(&self, context: &HookContext) {
        let Some(callbacks) = self.hooks.get(&context.event) else {
            return;
        };

        for (index, callback) in callbacks.iter().enumerate() {
            match panic::catch_unwind(AssertUnwindSafe(|| callback(context))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    error!("Hook {} #{} failed: {:#}", context.event, index, e);
                }
                Err(_) => {
                    error!("Hook {} #{} panicked", context.event, index);
                }
            }
        }
    }

    pub fn register_validator(&mut self, name: &str, validator: ValidatorFn) {
        if self.validators.iter().any(|(n, _)| n == name) {
            warn!("Replacing validator: {}", name);
            self.validators.retain(|(n, _)| n != name);
        }
        self.validators.push((name.to_string(), validator));
    }

    /// Run custom validators; the first rejection wins
    pub fn run_validators(&self, config: &SharingConfig) -> FantasmaResult<()> {
        for (name, validator) in &self.validators {
            validator(config).map_err(|reason| {
                FantasmaError::Validation(format!("{} (validator '{}')", reason, name))
            })?;
        }
        Ok(())
    }
}

impl fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionRegistry")
            .field("adapters", &self.adapter_keys())
            .field(
                "hooks",
                &HookEvent::ALL
                    .iter()
                    .map(|e| (e.as_str(), self.hook_count(*e)))
                    .collect::<Vec<_>>(),
            )
            .field(
                "validators",
                &self.validators.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}
