//! Entry points for `-finstrument-functions`.
//!
//! Code compiled with `-finstrument-functions` calls
//! `__cyg_profile_func_enter` and `__cyg_profile_func_exit` around every
//! function. Linking this crate with the `cyg-profile` feature provides
//! both symbols; they forward to whichever journal was passed to
//! [`install`]. Until then the hooks do nothing.

use std::ffi::c_void;
use std::sync::OnceLock;

use crate::error::{JournalError, Result};
use crate::event_journal::EventJournal;

static INSTALLED: OnceLock<&'static EventJournal> = OnceLock::new();

/// Routes the instrumentation hooks to `journal`.
///
/// A journal can be installed once per process.
///
/// # Examples
///
/// ```
/// # use cycle_journal::{hooks, EventJournal};
/// let journal: &'static EventJournal = Box::leak(Box::new(EventJournal::new()));
/// hooks::install(journal).unwrap();
/// ```
pub fn install(journal: &'static EventJournal) -> Result<()> {
    INSTALLED
        .set(journal)
        .map_err(|_| JournalError::AlreadyInstalled)
}

/// The journal the hooks currently forward to.
pub fn installed() -> Option<&'static EventJournal> {
    INSTALLED.get().copied()
}

#[no_mangle]
pub extern "C" fn __cyg_profile_func_enter(this_fn: *mut c_void, _call_site: *mut c_void) {
    if let Some(journal) = INSTALLED.get() {
        journal.call_begin(this_fn as usize);
    }
}

#[no_mangle]
pub extern "C" fn __cyg_profile_func_exit(this_fn: *mut c_void, _call_site: *mut c_void) {
    if let Some(journal) = INSTALLED.get() {
        journal.call_end(this_fn as usize);
    }
}
