//! Lock-free, content-swappable storage for one post-processed impulse
//! response buffer per channel.
//!
//! Every stage in the engine is handed two of these sets — the "active"
//! and "back" half of the impulse-response double buffer — and keeps
//! its own cheap [`Arc`] clone of each channel's handle for the lifetime
//! of a configuration. Publishing new IR content is a single
//! [`arc_swap::ArcSwap::store`] per channel: existing readers that already
//! loaded the previous [`Arc<Vec<f32>>`] keep using it to completion, so
//! there is never a torn read, and no lock is ever taken on the audio
//! thread. This is the same pattern the companion demo binary uses to
//! hot-swap a synthesis graph without blocking the realtime callback.

use arc_swap::ArcSwap;
use std::sync::Arc;

/// One channel's worth of swappable impulse-response content.
pub type IrHandle = Arc<ArcSwap<Vec<f32>>>;

/// One full buffer slot: one [`IrHandle`] per channel.
pub type IrChannelSet = Vec<IrHandle>;

/// Builds a fresh, silent [`IrChannelSet`] of `len` samples per channel.
/// Used both for the two slots an [`crate::engine::Engine`] is
/// initialized with (silent until the IR-update worker fills one in) and,
/// by extension, as the shape every later published buffer must match.
pub fn silent_ir_channel_set(num_channels: usize, len: usize) -> IrChannelSet {
    (0..num_channels)
        .map(|_| Arc::new(ArcSwap::from_pointee(vec![0.0f32; len])))
        .collect()
}

/// Clones the `Arc<ArcSwap<_>>` handles (not the underlying audio data) so
/// a new owner — typically another [`crate::stage::Stage`] — can read the
/// same swappable storage.
pub fn clone_handles(set: &IrChannelSet) -> IrChannelSet {
    set.iter().cloned().collect()
}
