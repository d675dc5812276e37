//! Fatal-path error taxonomy.
//!
//! Every container in this crate reports ordinary failures (empty pop,
//! duplicate insert, missing key) as `bool`/`Option<T>` per the crate's
//! external interface - there is nothing to propagate, so there is no
//! `Result` wrapper for those paths. [`CdsError`] exists only for the
//! *fatal* category: a programming defect (double free, a torn tagged
//! pointer observed mid-CAS) that the source treats as undefined behavior
//! and this port treats as a documented, logged panic.

/// Fatal, non-recoverable conditions.
///
/// These are never constructed in the course of normal operation. They
/// exist so [`fatal`] has something named to log before panicking, rather
/// than a bare `panic!("...")` whose message is the only record of why the
/// process went down.
#[derive(thiserror::Error, Debug)]
pub enum CdsError {
    /// A CAS loop observed a tagged pointer whose pointer and counter
    /// halves were not written atomically - the wide-atomic invariant from
    /// spec §4.1 was violated.
    #[error("torn tagged pointer observed in {container}")]
    TornTaggedPointer {
        /// Name of the container that detected the defect.
        container: &'static str,
    },

    /// A node was retired for reclamation twice, or reclaimed while still
    /// protected by a live hazard pointer.
    #[error("double free or use-after-reclaim detected in {container}")]
    DoubleFree {
        /// Name of the container that detected the defect.
        container: &'static str,
    },
}

/// Log `err` at `tracing::error!` and then panic with it.
///
/// This is the crate's single chokepoint for the "Invariant violation"
/// category from spec §7 ("containers may trap in debug builds"):
/// callers hit this instead of a bare `panic!` so the reason is observable
/// (via `tracing`) before the process terminates.
#[cold]
#[track_caller]
pub fn fatal(err: CdsError) -> ! {
    tracing::error!(error = %err, "fatal concurrent-data-structures invariant violation");
    panic!("{err}");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_name_the_container() {
        let err = CdsError::DoubleFree { container: "TreiberStack" };
        assert_eq!(err.to_string(), "double free or use-after-reclaim detected in TreiberStack");
    }

    #[test]
    #[should_panic(expected = "torn tagged pointer")]
    fn fatal_panics() {
        fatal(CdsError::TornTaggedPointer { container: "MsQueue" });
    }
}
