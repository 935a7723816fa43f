//! Pool of reusable streaming render nodes.
//!
//! Streaming elements are expensive platform objects, so they are allocated
//! per resource, handed to groups, and assigned to individual sounds, then
//! reclaimed in the reverse order. Bookkeeping invariants:
//!
//! - the total node count for a resource never exceeds the configured cap;
//! - a node is never assigned to two sounds simultaneously;
//! - a slot whose owner is cleared stays allocated to its group and is
//!   available for reassignment.

use crate::error::{EngineError, Result};
use crate::ids::{GroupId, ResourceId, SoundId};
use bridge_traits::device::{OutputDevice, RenderMode, RenderNode};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A pooled render node, shared between the pool's slot table and the sound
/// currently driving it.
pub type SharedRenderNode = Arc<Mutex<Box<dyn RenderNode>>>;

struct PoolSlot {
    node: SharedRenderNode,
    owner: Option<SoundId>,
}

#[derive(Default)]
struct PoolEntry {
    unallocated: Vec<SharedRenderNode>,
    allocated: HashMap<GroupId, Vec<PoolSlot>>,
}

impl PoolEntry {
    fn total(&self) -> usize {
        self.unallocated.len() + self.allocated.values().map(Vec::len).sum::<usize>()
    }
}

/// Allocates, tracks, and reclaims streaming nodes per resource, group, and
/// sound.
pub struct NodePool {
    device: Arc<dyn OutputDevice>,
    max_per_resource: usize,
    entries: Mutex<HashMap<ResourceId, PoolEntry>>,
}

impl NodePool {
    pub fn new(device: Arc<dyn OutputDevice>, max_per_resource: usize) -> Self {
        Self {
            device,
            max_per_resource,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn create_node(&self, resource: &ResourceId, current_total: usize) -> Result<SharedRenderNode> {
        if current_total >= self.max_per_resource {
            return Err(EngineError::Capacity {
                resource: resource.to_string(),
                max: self.max_per_resource,
            });
        }
        let node = self.device.create_render_node(RenderMode::Streaming)?;
        Ok(Arc::new(Mutex::new(node)))
    }

    /// Create a bare node for `resource`, not yet owned by any group.
    pub fn allocate_for_resource(&self, resource: &ResourceId) -> Result<()> {
        let mut entries = self.entries.lock();
        let total = entries.get(resource).map(PoolEntry::total).unwrap_or(0);
        let node = self.create_node(resource, total)?;
        entries.entry(resource.clone()).or_default().unallocated.push(node);
        Ok(())
    }

    /// Hand a node to `group`: a free one from the unallocated pool when
    /// available, a freshly created one otherwise. The slot starts with no
    /// owning sound.
    pub fn allocate_for_group(&self, resource: &ResourceId, group: &GroupId) -> Result<()> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(resource.clone()).or_default();
        let node = match entry.unallocated.pop() {
            Some(node) => node,
            None => {
                let total = entry.total();
                self.create_node(resource, total)?
            }
        };
        entry
            .allocated
            .entry(group.clone())
            .or_default()
            .push(PoolSlot { node, owner: None });
        Ok(())
    }

    /// Assign the first unowned slot in `group` to `sound` and return its
    /// node. Requires a prior [`allocate_for_group`](Self::allocate_for_group).
    pub fn allocate_for_sound(
        &self,
        resource: &ResourceId,
        group: &GroupId,
        sound: SoundId,
    ) -> Result<SharedRenderNode> {
        let mut entries = self.entries.lock();
        let slot = entries
            .get_mut(resource)
            .and_then(|entry| entry.allocated.get_mut(group))
            .and_then(|slots| slots.iter_mut().find(|s| s.owner.is_none()))
            .ok_or_else(|| {
                EngineError::PoolUsage(format!(
                    "no free node for resource {} in group {}; allocate_for_group first",
                    resource, group
                ))
            })?;
        slot.owner = Some(sound);
        Ok(Arc::clone(&slot.node))
    }

    /// Return every node held by `group` to the unallocated pool and drop the
    /// group bucket. A no-op for unknown groups.
    pub fn release_for_group(&self, resource: &ResourceId, group: &GroupId) {
        let mut entries = self.entries.lock();
        if let Some(entry) = entries.get_mut(resource) {
            if let Some(slots) = entry.allocated.remove(group) {
                for slot in slots {
                    entry.unallocated.push(slot.node);
                }
            }
        }
    }

    /// Clear the owner of `sound`'s slot, keeping the node allocated to its
    /// group for reassignment.
    pub fn release_for_sound(&self, resource: &ResourceId, group: &GroupId, sound: SoundId) {
        let mut entries = self.entries.lock();
        if let Some(slots) = entries
            .get_mut(resource)
            .and_then(|entry| entry.allocated.get_mut(group))
        {
            if let Some(slot) = slots.iter_mut().find(|s| s.owner == Some(sound)) {
                slot.owner = None;
            }
        }
    }

    /// Whether `group` holds at least one unowned node for `resource`.
    pub fn has_free(&self, resource: &ResourceId, group: &GroupId) -> bool {
        self.entries
            .lock()
            .get(resource)
            .and_then(|entry| entry.allocated.get(group))
            .map(|slots| slots.iter().any(|s| s.owner.is_none()))
            .unwrap_or(false)
    }

    /// Reclaim every unowned group slot back into the shared unallocated
    /// pool, then trim each unallocated pool to the configured cap.
    pub fn clean_up(&self) {
        let mut entries = self.entries.lock();
        for (resource, entry) in entries.iter_mut() {
            for slots in entry.allocated.values_mut() {
                let mut kept = Vec::with_capacity(slots.len());
                for slot in slots.drain(..) {
                    if slot.owner.is_none() {
                        entry.unallocated.push(slot.node);
                    } else {
                        kept.push(slot);
                    }
                }
                *slots = kept;
            }
            entry.allocated.retain(|_, slots| !slots.is_empty());
            if entry.unallocated.len() > self.max_per_resource {
                debug!(resource = %resource, "trimming unallocated nodes");
                entry.unallocated.truncate(self.max_per_resource);
            }
        }
        entries.retain(|_, entry| entry.total() > 0);
    }

    /// Stop and drop every node. The pool remains usable afterwards but
    /// engine teardown is the only caller.
    pub fn dispose(&self) {
        let mut entries = self.entries.lock();
        for entry in entries.values_mut() {
            for node in &entry.unallocated {
                let _ = node.lock().stop();
            }
            for slots in entry.allocated.values() {
                for slot in slots {
                    let _ = slot.node.lock().stop();
                }
            }
        }
        entries.clear();
    }

    /// Total nodes currently tracked for `resource`.
    pub fn node_count(&self, resource: &ResourceId) -> usize {
        self.entries
            .lock()
            .get(resource)
            .map(PoolEntry::total)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for NodePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.lock();
        f.debug_struct("NodePool")
            .field("resources", &entries.len())
            .field("max_per_resource", &self.max_per_resource)
            .finish()
    }
}
