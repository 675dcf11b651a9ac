//! Memory release action
//!
//! Provides the action that hands free heap pages back to the operating
//! system, and the resolvers that locate it once at plugin start.

use crate::core::error::{CleanerError, Result};
use crate::core::trigger::TriggerAction;
use std::sync::Arc;

/// Release free memory to the OS
///
/// Calls `malloc_trim(0)` so the glibc allocator returns the free pages it
/// keeps for reuse. Returns whether any memory was actually released.
#[cfg(all(target_os = "linux", target_env = "gnu"))]
pub fn release_memory() -> bool {
    // SAFETY: malloc_trim only walks the allocator's own free lists.
    unsafe { libc::malloc_trim(0) == 1 }
}

/// Whether this platform has a memory release primitive
pub fn release_supported() -> bool {
    cfg!(all(target_os = "linux", target_env = "gnu"))
}

/// The production release action backed by `malloc_trim`
#[cfg(all(target_os = "linux", target_env = "gnu"))]
#[derive(Debug, Default)]
pub struct MallocTrim;

#[cfg(all(target_os = "linux", target_env = "gnu"))]
impl TriggerAction for MallocTrim {
    fn invoke(&self) -> Result<()> {
        let released = release_memory();
        tracing::debug!(released, "malloc_trim finished");
        Ok(())
    }

    fn name(&self) -> &str {
        "malloc_trim"
    }
}

/// Locates the release action at plugin start
///
/// Resolution happens exactly once. A failure is a startup precondition
/// violation and leaves the plugin inert.
pub trait ActionResolver: Send + Sync {
    /// Find the release action
    fn resolve(&self) -> Result<Arc<dyn TriggerAction>>;
}

/// Resolver for the allocator's trim primitive
#[derive(Debug, Default, Clone, Copy)]
pub struct MallocTrimResolver;

impl ActionResolver for MallocTrimResolver {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    fn resolve(&self) -> Result<Arc<dyn TriggerAction>> {
        Ok(Arc::new(MallocTrim))
    }

    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    fn resolve(&self) -> Result<Arc<dyn TriggerAction>> {
        Err(CleanerError::StartupResolutionFailure(
            "malloc_trim is not available on this platform".to_string(),
        ))
    }
}

/// Resolver around an action that is already known
///
/// Used by hosts that look the action up themselves, and by tests.
#[derive(Clone, Default)]
pub struct StaticResolver {
    action: Option<Arc<dyn TriggerAction>>,
}

impl StaticResolver {
    /// Resolver that always yields `action`
    pub fn new(action: Arc<dyn TriggerAction>) -> Self {
        Self {
            action: Some(action),
        }
    }

    /// Resolver that never finds anything
    pub fn missing() -> Self {
        Self { action: None }
    }
}

impl ActionResolver for StaticResolver {
    fn resolve(&self) -> Result<Arc<dyn TriggerAction>> {
        self.action.clone().ok_or_else(|| {
            CleanerError::StartupResolutionFailure("no release action registered".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malloc_trim_resolver_matches_platform() {
        let resolved = MallocTrimResolver.resolve();
        if release_supported() {
            let action = resolved.unwrap();
            assert_eq!(action.name(), "malloc_trim");
            assert!(action.invoke().is_ok());
        } else {
            assert!(matches!(
                resolved,
                Err(CleanerError::StartupResolutionFailure(_))
            ));
        }
    }

    #[test]
    fn test_static_resolver() {
        let action: Arc<dyn TriggerAction> = Arc::new(|| -> Result<()> { Ok(()) });
        let resolver = StaticResolver::new(action);
        assert!(resolver.resolve().is_ok());

        let err = StaticResolver::missing().resolve().err().unwrap();
        assert!(err.is_fatal());
        assert_eq!(err.error_type(), "StartupResolutionFailure");
    }
}
