//! Process-wide setup.
//!
//! Nothing in the resolver strictly requires calling [`initialize`] first.
//! Doing so, however, reads the system configuration once and keeps it for
//! all channels opened without servers of their own until the matching
//! [`shutdown`]. Calls nest: the state is only dropped when every call to
//! `initialize` has been matched by a call to `shutdown`.

use super::conf::ResolvConf;
use parking_lot::{const_mutex, Mutex};
use std::sync::Arc;
use std::{fmt, ops};
use tracing::debug;

//------------ InitFlags -----------------------------------------------------

/// What to set up when initializing the library.
#[derive(Clone, Copy, Eq, PartialEq)]
pub struct InitFlags(u32);

impl InitFlags {
    /// Only count the call.
    pub const NONE: Self = InitFlags(0);

    /// Load and cache the system configuration.
    pub const SYSTEM_CONF: Self = InitFlags(1);

    /// Everything.
    pub const ALL: Self = InitFlags(1);

    /// Returns whether all flags in `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl Default for InitFlags {
    fn default() -> Self {
        InitFlags::ALL
    }
}

impl ops::BitOr for InitFlags {
    type Output = Self;

    fn bitor(self, other: Self) -> Self {
        InitFlags(self.0 | other.0)
    }
}

impl fmt::Debug for InitFlags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "InitFlags({:#x})", self.0)
    }
}

//------------ Library State -------------------------------------------------

struct State {
    /// The number of unmatched calls to `initialize`.
    refs: usize,

    /// The cached system configuration.
    conf: Option<Arc<ResolvConf>>,
}

static STATE: Mutex<State> = const_mutex(State {
    refs: 0,
    conf: None,
});

/// Initializes the library.
///
/// May be called any number of times. Each call needs to be matched with a
/// call to [`shutdown`].
pub fn initialize(flags: InitFlags) {
    let mut state = STATE.lock();
    state.refs += 1;
    if flags.contains(InitFlags::SYSTEM_CONF) && state.conf.is_none() {
        debug!("loading system resolver configuration");
        state.conf = Some(Arc::new(ResolvConf::system()));
    }
}

/// Undoes one call to [`initialize`].
///
/// Calling this more often than `initialize` does nothing.
pub fn shutdown() {
    let mut state = STATE.lock();
    match state.refs {
        0 => {}
        1 => {
            state.refs = 0;
            state.conf = None;
            debug!("library shut down");
        }
        _ => state.refs -= 1,
    }
}

/// Returns whether the library is currently initialized.
pub fn is_initialized() -> bool {
    STATE.lock().refs > 0
}

/// Returns whether the library can be used from multiple threads.
///
/// Channels can always be moved between threads and a
/// [`ThreadedChannel`][super::thread::ThreadedChannel] can be shared.
pub fn threadsafety() -> bool {
    true
}

/// Returns the system configuration.
///
/// This is the cached configuration if the library was initialized with
/// it and a freshly loaded one otherwise.
pub(crate) fn system_conf() -> Arc<ResolvConf> {
    if let Some(conf) = STATE.lock().conf.clone() {
        return conf;
    }
    Arc::new(ResolvConf::system())
}

//============ Testing ======================================================

#[cfg(test)]
mod test {
    use super::*;

    // All of this touches global state, so it needs to be a single test.
    #[test]
    fn lifecycle() {
        assert!(threadsafety());
        assert!(!system_conf().servers.is_empty());

        shutdown();
        assert!(!is_initialized());

        initialize(InitFlags::ALL);
        initialize(InitFlags::NONE);
        assert!(is_initialized());
        let conf = system_conf();
        assert!(Arc::ptr_eq(&conf, &system_conf()));

        shutdown();
        assert!(is_initialized());
        shutdown();
        assert!(!is_initialized());
        assert!(!Arc::ptr_eq(&conf, &system_conf()));
        shutdown();
        assert!(!is_initialized());
    }
}
