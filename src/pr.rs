//! Memory barriers and spin-wait hints.
//!
//! This crate only ever needs [`fence_acquire`] (to pair with a hazard
//! pointer publish in `hazard::LocalHazards::protect`) and [`stall`] (the
//! CPU pause hint `Backoff` spins on). Everything else the teacher's
//! `pr` module offered - the per-width `u8_ops`/`u16_ops`/.../`ptr_ops`
//! atomic-op submodules and the other fence flavors - had no caller in
//! this port and is dropped.

use core::sync::atomic::{fence, Ordering};

/// Acquire fence - prevents reordering of reads before this fence.
#[inline(always)]
pub fn fence_acquire() {
    fence(Ordering::Acquire);
}

/// CPU stall/pause hint for spin loops.
#[inline(always)]
pub fn stall() {
    core::hint::spin_loop();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stall() {
        stall();
    }

    #[test]
    fn test_fence_acquire() {
        fence_acquire();
    }
}
