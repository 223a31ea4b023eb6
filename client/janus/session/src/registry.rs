//! Plugin handle registry.

use dashmap::DashMap;
use std::sync::Arc;

use crate::plugin::Plugin;

/// Maps gateway-assigned handle ids to attached plugin instances.
///
/// Exactly one plugin owns a given handle id at a time; attach always
/// allocates a fresh id gateway-side, so overwrites are not expected.
#[derive(Default)]
pub struct HandleRegistry {
    handles: DashMap<u64, Arc<dyn Plugin>>,
}

impl HandleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle_id` to `plugin`.
    pub(crate) fn register(&self, handle_id: u64, plugin: Arc<dyn Plugin>) {
        drop(self.handles.insert(handle_id, plugin));
    }

    /// Release the binding for `handle_id`, returning the plugin it held.
    pub(crate) fn unregister(&self, handle_id: u64) -> Option<Arc<dyn Plugin>> {
        self.handles.remove(&handle_id).map(|(_, plugin)| plugin)
    }

    /// The plugin bound to `handle_id`, if any.
    pub fn lookup(&self, handle_id: u64) -> Option<Arc<dyn Plugin>> {
        self.handles
            .get(&handle_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Number of bound handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// True when no handle is bound.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{AttachPayload, PluginContext};
    use async_trait::async_trait;
    use janus_wire::InboundFrame;
    use serde_json::Value;

    struct NullPlugin;

    #[async_trait]
    impl Plugin for NullPlugin {
        fn attach_payload(&self) -> AttachPayload {
            AttachPayload {
                plugin: "janus.plugin.null".to_owned(),
                opaque_id: "null".to_owned(),
            }
        }
        fn handle_id(&self) -> Option<u64> {
            None
        }
        fn attached(&self, _context: PluginContext) {}
        async fn on_message(&self, _data: Value, _frame: InboundFrame) {}
        fn webrtc_state(&self, _up: bool, _reason: Option<&str>) {}
        fn media_state(&self, _medium: &str, _receiving: bool) {}
        fn slow_link(&self, _uplink: bool, _nacks: u32) {}
        fn detach(&self) {}
    }

    #[test]
    fn bind_lookup_release() {
        let registry = HandleRegistry::new();
        assert!(registry.is_empty());

        registry.register(7, Arc::new(NullPlugin));
        assert_eq!(registry.len(), 1);
        assert!(registry.lookup(7).is_some());
        assert!(registry.lookup(8).is_none());

        assert!(registry.unregister(7).is_some());
        assert!(registry.lookup(7).is_none());
        assert!(registry.unregister(7).is_none());
    }
}
