/// Arena reclamation.
///
/// Mark-and-sweep over the node store: every top-level unit in the arena
/// is a root; everything it can reach (including through `ref` edges and
/// type contents) survives. Swept slots release their attached type and
/// are recycled through the arena free list, so live ids remain stable.
///
/// Collection is collaborative, not concurrent: callers must not hold
/// transient node ids across a `gc()` call unless they are reachable from
/// a root.

use std::time::Instant;

use crate::tree::{Arena, NodeId};
use crate::walk;

#[derive(Debug, Default, Clone)]
pub struct GcStats {
    pub roots: usize,
    pub live: usize,
    pub freed: usize,
    pub freed_types: usize,
    pub pause_us: u64,
}

impl Arena {
    /// Collect unreachable nodes and types. Returns collection counters.
    pub fn gc(&mut self) -> GcStats {
        let start = Instant::now();
        let base = self.new_generation();

        let roots: Vec<NodeId> = (0..self.nodes.len() as u32)
            .map(NodeId)
            .filter(|&n| self.is_live(n) && self.kind(n).is_top_level())
            .collect();

        for &root in &roots {
            walk::mark_deep(self, root, base);
        }

        let mut freed = 0;
        for idx in 0..self.nodes.len() {
            let dead = match &self.nodes[idx] {
                Some(node) => node.generation < base,
                None => false,
            };
            if dead {
                let node = self.nodes[idx].take().unwrap();
                if let Some(ty) = node.ty {
                    self.types.release(ty);
                }
                self.free.push(idx as u32);
                freed += 1;
            }
        }

        let freed_types = self.types.sweep();

        let stats = GcStats {
            roots: roots.len(),
            live: self.live_count(),
            freed,
            freed_types,
            pause_us: start.elapsed().as_micros() as u64,
        };
        log::debug!(
            "gc: {} roots, {} live, {} freed, {} types freed in {} us",
            stats.roots,
            stats.live,
            stats.freed,
            stats.freed_types,
            stats.pause_us
        );
        stats
    }
}
