//! Opt-in profiling events.
//!
//! With the `profiling` feature, [`event`] logs a `tracing` debug record
//! under one of the `runlen.profile.*` targets. The tags named in
//! `RUNLEN_PROFILE_TAGS` (comma separated, `*` or `all` for everything)
//! choose which subsystems report. Without the feature every call here is
//! a no-op.

use std::time::Instant;

/// Microseconds since `started_at`, saturating at `u64::MAX`.
#[inline]
pub fn elapsed_us(started_at: Instant) -> u64 {
    u64::try_from(started_at.elapsed().as_micros()).unwrap_or(u64::MAX)
}

#[cfg(feature = "profiling")]
mod filter {
    use std::collections::BTreeSet;
    use std::sync::{OnceLock, RwLock};

    const ENV_VAR: &str = "RUNLEN_PROFILE_TAGS";

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(super) enum EnabledTags {
        All,
        Only(BTreeSet<String>),
    }

    impl EnabledTags {
        pub(super) fn parse<'a>(tokens: impl IntoIterator<Item = &'a str>) -> Self {
            let mut only = BTreeSet::new();
            for token in tokens.into_iter().flat_map(|raw| raw.split(',')) {
                let token = token.trim().to_ascii_lowercase();
                match token.as_str() {
                    "" => {}
                    "*" | "all" => return Self::All,
                    _ => {
                        only.insert(token);
                    }
                }
            }

            if only.is_empty() { Self::All } else { Self::Only(only) }
        }

        pub(super) fn admits(&self, stack: &[&str]) -> bool {
            match self {
                Self::All => true,
                Self::Only(only) => stack
                    .iter()
                    .any(|tag| only.contains(&tag.to_ascii_lowercase())),
            }
        }
    }

    fn cell() -> &'static RwLock<EnabledTags> {
        static CELL: OnceLock<RwLock<EnabledTags>> = OnceLock::new();
        CELL.get_or_init(|| {
            let raw = std::env::var(ENV_VAR).unwrap_or_default();
            RwLock::new(EnabledTags::parse([raw.as_str()]))
        })
    }

    pub(super) fn replace(tags: EnabledTags) {
        *cell().write().unwrap_or_else(|poisoned| poisoned.into_inner()) = tags;
    }

    pub(super) fn admits(stack: &[&str]) -> bool {
        cell()
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .admits(stack)
    }
}

/// Replaces the enabled tag set. An empty slice enables every tag.
pub fn set_enabled_tags(tags: &[&str]) {
    #[cfg(feature = "profiling")]
    filter::replace(filter::EnabledTags::parse(tags.iter().copied()));

    #[cfg(not(feature = "profiling"))]
    let _ = tags;
}

/// True when some tag of `tag_stack` is enabled. Always false without
/// the `profiling` feature.
pub fn is_tag_stack_enabled(tag_stack: &[&str]) -> bool {
    #[cfg(feature = "profiling")]
    {
        filter::admits(tag_stack)
    }

    #[cfg(not(feature = "profiling"))]
    {
        let _ = tag_stack;
        false
    }
}

#[cfg(feature = "profiling")]
macro_rules! profile_record {
    (@emit $target:expr, ($($field:tt)+)) => {
        tracing::debug!(target: $target, $($field)+)
    };
    (@unknown $other:ident, ($($field:tt)+)) => {
        tracing::debug!(target: "runlen.profile", profile_target = $other, $($field)+)
    };
    ($target:expr, [$($known:path),+ $(,)?], $fields:tt) => {
        match $target {
            $(
                $known => profile_record!(@emit $known, $fields),
            )+
            other => profile_record!(@unknown other, $fields),
        }
    };
}

/// Logs one profiling event when its tag stack is enabled.
#[inline]
pub fn event(
    target: &'static str,
    tag_stack: &[&str],
    op: &'static str,
    result: &'static str,
    elapsed_us: u64,
    message: &'static str,
) {
    #[cfg(feature = "profiling")]
    {
        use crate::telemetry::tags;

        if !filter::admits(tag_stack) {
            return;
        }
        profile_record!(
            target,
            [
                tags::PROFILE_MMAP,
                tags::PROFILE_PARTITION,
                tags::PROFILE_BUFFER,
                tags::PROFILE_WORKER,
                tags::PROFILE_EMITTER,
                tags::PROFILE_PIPELINE,
            ],
            (op, result, elapsed_us, tags = ?tag_stack, "{message}")
        );
    }

    #[cfg(not(feature = "profiling"))]
    let _ = (target, tag_stack, op, result, elapsed_us, message);
}
