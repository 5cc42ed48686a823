//! Per-request option flags and the scheduling priority derived from them.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

/// Independent option flags for one fetch.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct FetchOptions(u16);

impl FetchOptions {
    pub const NONE: FetchOptions = FetchOptions(0);
    /// Queue behind default-priority work.
    pub const LOW_PRIORITY: FetchOptions = FetchOptions(1 << 0);
    /// Deliver partial decodes (`finished = false`) as bytes arrive.
    pub const PROGRESSIVE: FetchOptions = FetchOptions(1 << 1);
    /// Ask the transport to bypass caches.
    pub const IGNORE_CACHE: FetchOptions = FetchOptions(1 << 2);
    /// Accepted for compatibility; fetches always run to completion unless cancelled.
    pub const CONTINUE_IN_BACKGROUND: FetchOptions = FetchOptions(1 << 3);
    /// Let the transport store and send cookies.
    pub const HANDLE_COOKIES: FetchOptions = FetchOptions(1 << 4);
    /// Accept invalid TLS certificates.
    pub const ALLOW_INSECURE_TRANSPORT: FetchOptions = FetchOptions(1 << 5);
    /// Jump ahead of default and low priority work.
    pub const HIGH_PRIORITY: FetchOptions = FetchOptions(1 << 6);
    /// Ask the decoder to shrink very large images.
    pub const SCALE_DOWN_LARGE_RESULT: FetchOptions = FetchOptions(1 << 7);

    /// Flags that change the request or its result, and therefore the operation key.
    const SHAPING: FetchOptions = FetchOptions(
        Self::IGNORE_CACHE.0
            | Self::HANDLE_COOKIES.0
            | Self::ALLOW_INSECURE_TRANSPORT.0
            | Self::SCALE_DOWN_LARGE_RESULT.0,
    );

    const NAMES: [(FetchOptions, &'static str); 8] = [
        (Self::LOW_PRIORITY, "LOW_PRIORITY"),
        (Self::PROGRESSIVE, "PROGRESSIVE"),
        (Self::IGNORE_CACHE, "IGNORE_CACHE"),
        (Self::CONTINUE_IN_BACKGROUND, "CONTINUE_IN_BACKGROUND"),
        (Self::HANDLE_COOKIES, "HANDLE_COOKIES"),
        (Self::ALLOW_INSECURE_TRANSPORT, "ALLOW_INSECURE_TRANSPORT"),
        (Self::HIGH_PRIORITY, "HIGH_PRIORITY"),
        (Self::SCALE_DOWN_LARGE_RESULT, "SCALE_DOWN_LARGE_RESULT"),
    ];

    pub fn contains(self, other: FetchOptions) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: FetchOptions) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: FetchOptions) {
        self.0 &= !other.0;
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Only the request-shaping flags (see [`crate::request::OperationKey`]).
    pub fn shaping(self) -> FetchOptions {
        FetchOptions(self.0 & Self::SHAPING.0)
    }

    /// Scheduling priority. `HIGH_PRIORITY` wins if both priority flags are set.
    pub fn priority(self) -> Priority {
        if self.contains(Self::HIGH_PRIORITY) {
            Priority::High
        } else if self.contains(Self::LOW_PRIORITY) {
            Priority::Low
        } else {
            Priority::Normal
        }
    }
}

impl BitOr for FetchOptions {
    type Output = FetchOptions;

    fn bitor(self, rhs: FetchOptions) -> FetchOptions {
        FetchOptions(self.0 | rhs.0)
    }
}

impl BitOrAssign for FetchOptions {
    fn bitor_assign(&mut self, rhs: FetchOptions) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for FetchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "{}", names.join(" | "))
    }
}

/// Queue band a pending operation sits in. Bands drain High, then Normal, then Low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn high_priority_wins_over_low() {
        assert_eq!(FetchOptions::NONE.priority(), Priority::Normal);
        assert_eq!(FetchOptions::LOW_PRIORITY.priority(), Priority::Low);
        assert_eq!(
            (FetchOptions::LOW_PRIORITY | FetchOptions::HIGH_PRIORITY).priority(),
            Priority::High
        );
    }

    #[test]
    fn shaping_drops_scheduling_and_delivery_flags() {
        let opts = FetchOptions::HIGH_PRIORITY
            | FetchOptions::PROGRESSIVE
            | FetchOptions::CONTINUE_IN_BACKGROUND
            | FetchOptions::HANDLE_COOKIES;
        assert_eq!(opts.shaping(), FetchOptions::HANDLE_COOKIES);
    }

    #[test]
    fn insert_remove_contains() {
        let mut opts = FetchOptions::NONE;
        opts.insert(FetchOptions::PROGRESSIVE);
        opts |= FetchOptions::IGNORE_CACHE;
        assert!(opts.contains(FetchOptions::PROGRESSIVE | FetchOptions::IGNORE_CACHE));
        opts.remove(FetchOptions::PROGRESSIVE);
        assert!(!opts.contains(FetchOptions::PROGRESSIVE));
        assert_eq!(format!("{:?}", opts), "IGNORE_CACHE");
    }
}
