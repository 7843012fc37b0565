//! Per-node block cache and trigger evaluation (spec §4.5).
//!
//! A `Dataset` owns one in-progress `BlockBuilder` per distinct
//! `BlockKey` a transformation is accumulating into. Advancing the
//! watermark finalizes (and returns) every builder whose bounds have
//! fully passed it — the only `TriggerSpec` this engine implements is
//! `AfterWatermark` (see `query_core::trigger`).

use std::collections::HashMap;
use std::sync::Arc;

use query_core::{Allocator, Block, BlockBuilder, BlockKey, Bounds, Tags, Time, TriggerSpec};

pub struct Dataset {
    alloc: Arc<Allocator>,
    #[allow(dead_code)] // kept for when additional TriggerSpec variants are added
    trigger: TriggerSpec,
    builders: HashMap<BlockKey, BlockBuilder>,
    watermark: Time,
}

impl Dataset {
    pub fn new(alloc: Arc<Allocator>, trigger: TriggerSpec) -> Self {
        Self {
            alloc,
            trigger,
            builders: HashMap::new(),
            watermark: query_core::MIN_TIME,
        }
    }

    pub fn watermark(&self) -> Time {
        self.watermark
    }

    /// Returns the builder for `(bounds, tags)`, creating an empty one
    /// (no columns yet) on first use.
    pub fn builder_for(&mut self, bounds: Bounds, tags: Tags) -> &mut BlockBuilder {
        self.builders
            .entry(BlockKey { bounds, tags: tags.clone() })
            .or_insert_with(|| BlockBuilder::new(bounds, tags, self.alloc.clone()))
    }

    pub fn remove_builder(&mut self, key: &BlockKey) -> Option<BlockBuilder> {
        self.builders.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &BlockKey> {
        self.builders.keys()
    }

    /// Advances the watermark and finalizes every builder whose bounds
    /// have fully elapsed (`bounds.stop <= mark`), per the half-open
    /// `Bounds` convention in `query_core::time`.
    pub fn advance_watermark(&mut self, mark: Time) -> Vec<Block> {
        self.watermark = mark;
        let ready: Vec<BlockKey> = self
            .builders
            .keys()
            .filter(|k| k.bounds.stop <= mark)
            .cloned()
            .collect();
        ready
            .into_iter()
            .filter_map(|k| self.builders.remove(&k))
            .map(BlockBuilder::block)
            .collect()
    }

    /// Finalizes everything still buffered, regardless of watermark —
    /// called when the upstream source signals completion.
    pub fn drain_all(&mut self) -> Vec<Block> {
        std::mem::take(&mut self.builders)
            .into_values()
            .map(BlockBuilder::block)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use query_core::{ColMeta, Time as T};

    #[test]
    fn advance_watermark_finalizes_elapsed_keys_only() {
        let mut ds = Dataset::new(Arc::new(Allocator::unlimited()), TriggerSpec::AfterWatermark);
        let b1 = ds.builder_for(Bounds::new(T(0), T(10)), Tags::new());
        b1.add_col(ColMeta::time("_time"));
        let b2 = ds.builder_for(Bounds::new(T(10), T(20)), Tags::new());
        b2.add_col(ColMeta::time("_time"));

        let finalized = ds.advance_watermark(T(10));
        assert_eq!(finalized.len(), 1);
        assert_eq!(ds.keys().count(), 1);
    }
}
