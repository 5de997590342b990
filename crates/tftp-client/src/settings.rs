//! Applies a DHCP `siaddr` (next-server) option to the working target URI.
//!
//! Follows an "only update on change" idiom: a lease renewal that repeats
//! the same `siaddr` should not force an in-flight transfer to reopen.

use std::net::Ipv4Addr;

pub struct SettingsApplicator {
    current: Option<Ipv4Addr>,
}

impl SettingsApplicator {
    pub fn new() -> Self {
        Self { current: None }
    }

    /// Returns `Some(new working URI)` only when `siaddr` differs from the
    /// address already reflected in the working URI; returns `None` when
    /// nothing changed, so the caller need not re-open an in-flight
    /// transfer on every lease renewal.
    pub fn apply_next_server(&mut self, siaddr: Ipv4Addr) -> Option<String> {
        if self.current == Some(siaddr) {
            return None;
        }
        self.current = Some(siaddr);
        Some(format!("tftp://{siaddr}/"))
    }
}

impl Default for SettingsApplicator {
    fn default() -> Self {
        Self::new()
    }
}
