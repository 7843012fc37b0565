//! Trigger specifications (spec §3, §4.5).
//!
//! A `TriggerSpec` describes when a `Dataset`'s block builder for a given
//! key should be finalized and emitted. The default fires once the
//! watermark passes the block's stop time; window transformations may
//! request a spec tied to their own bounds (currently the same rule,
//! since a window's per-key bounds already encode the window's stop
//! time — see DESIGN.md).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TriggerSpec {
    #[default]
    AfterWatermark,
}
