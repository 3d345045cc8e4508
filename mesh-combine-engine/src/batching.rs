//! Host batching settings
//!
//! The host's own static batching fights with combined meshes, so the
//! combiner can switch it off through this interface.

use tracing::info;

/// Read and write the host's draw call batching switches
pub trait BatchingPolicyProvider {
    fn static_batching(&self) -> bool;
    fn set_static_batching(&mut self, enabled: bool);
    fn dynamic_batching(&self) -> bool;
    fn set_dynamic_batching(&mut self, enabled: bool);
}

/// Batching switches held in memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InMemoryBatchingPolicy {
    pub static_batching: bool,
    pub dynamic_batching: bool,
}

impl BatchingPolicyProvider for InMemoryBatchingPolicy {
    fn static_batching(&self) -> bool {
        self.static_batching
    }

    fn set_static_batching(&mut self, enabled: bool) {
        self.static_batching = enabled;
    }

    fn dynamic_batching(&self) -> bool {
        self.dynamic_batching
    }

    fn set_dynamic_batching(&mut self, enabled: bool) {
        self.dynamic_batching = enabled;
    }
}

/// Turn off static batching if it is on
///
/// Returns a notice describing the change, or `None` when nothing changed.
/// Dynamic batching is left alone.
pub fn resolve_batching_conflicts(provider: &mut dyn BatchingPolicyProvider) -> Option<String> {
    if !provider.static_batching() {
        return None;
    }
    provider.set_static_batching(false);
    let notice = "static batching disabled, it conflicts with combined meshes".to_string();
    info!("{}", notice);
    Some(notice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_turns_static_batching_off() {
        let mut policy = InMemoryBatchingPolicy {
            static_batching: true,
            dynamic_batching: true,
        };
        assert!(resolve_batching_conflicts(&mut policy).is_some());
        assert!(!policy.static_batching);
        assert!(policy.dynamic_batching);
        assert!(resolve_batching_conflicts(&mut policy).is_none());
    }
}
