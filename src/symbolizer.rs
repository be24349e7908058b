use parking_lot::Mutex;
use std::collections::HashMap;

/// Address-to-symbol resolution for flushed traces.
///
/// The journal records raw function addresses. At flush time each one is
/// handed to an [`AddressResolver`], which reports whatever the platform
/// knows about it. Resolution is best effort: a missing field is rendered
/// as [`UNKNOWN`] and never aborts a flush.

/// Placeholder rendered for a module or symbol the resolver could not name.
pub const UNKNOWN: &str = "??";

/// What a resolver knows about one address.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolution {
    /// Path of the loaded object containing the address.
    pub module: Option<String>,
    /// Nearest symbol at or below the address.
    pub symbol: Option<String>,
    /// Address of that symbol.
    pub base: Option<usize>,
}

impl Resolution {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn new(module: impl Into<String>, symbol: impl Into<String>, base: usize) -> Self {
        Self {
            module: Some(module.into()),
            symbol: Some(symbol.into()),
            base: Some(base),
        }
    }

    /// True when neither a module nor a symbol was found.
    pub fn is_unresolved(&self) -> bool {
        self.module.is_none() && self.symbol.is_none()
    }

    pub fn module_or_unknown(&self) -> &str {
        self.module.as_deref().unwrap_or(UNKNOWN)
    }

    pub fn symbol_or_unknown(&self) -> &str {
        self.symbol.as_deref().unwrap_or(UNKNOWN)
    }
}

/// A best-effort address-to-symbol service.
///
/// # Usage
///
/// ```
/// # use cycle_journal::symbolizer::{AddressResolver, Resolution};
/// // A resolver that knows a single function
/// struct OneSymbol;
///
/// impl AddressResolver for OneSymbol {
///     fn resolve(&self, address: usize) -> Resolution {
///         if (0x1000..0x1100).contains(&address) {
///             Resolution::new("app", "main", 0x1000)
///         } else {
///             Resolution::unknown()
///         }
///     }
/// }
/// ```
pub trait AddressResolver {
    fn resolve(&self, address: usize) -> Resolution;
}

impl<R: AddressResolver + ?Sized> AddressResolver for &R {
    fn resolve(&self, address: usize) -> Resolution {
        (**self).resolve(address)
    }
}

/// Resolver that knows nothing; every field renders as a placeholder.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullResolver;

impl AddressResolver for NullResolver {
    fn resolve(&self, _address: usize) -> Resolution {
        Resolution::unknown()
    }
}

/// Resolves addresses against whatever the dynamic loader has mapped,
/// using `dladdr(3)`.
///
/// Only exported symbols are visible. An address inside a stripped region
/// still reports its module with an unknown symbol.
#[derive(Debug, Default, Clone, Copy)]
pub struct DlAddrResolver;

#[cfg(unix)]
impl AddressResolver for DlAddrResolver {
    fn resolve(&self, address: usize) -> Resolution {
        use std::ffi::CStr;

        let mut info: libc::Dl_info = unsafe { std::mem::zeroed() };
        // dladdr only reads the address value; it never dereferences it.
        let found = unsafe { libc::dladdr(address as *const libc::c_void, &mut info) };
        if found == 0 {
            return Resolution::unknown();
        }

        let to_string = |ptr: *const libc::c_char| {
            (!ptr.is_null())
                .then(|| unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
        };

        Resolution {
            module: to_string(info.dli_fname),
            symbol: to_string(info.dli_sname),
            base: (!info.dli_saddr.is_null()).then_some(info.dli_saddr as usize),
        }
    }
}

#[cfg(not(unix))]
impl AddressResolver for DlAddrResolver {
    fn resolve(&self, _address: usize) -> Resolution {
        Resolution::unknown()
    }
}

/// Memoizes another resolver.
///
/// Instrumented traces hit the same few hundred functions over and over, so
/// a flush of a full journal resolves each address once.
pub struct CachingResolver<R> {
    inner: R,
    cache: Mutex<HashMap<usize, Resolution>>,
}

impl<R: AddressResolver> CachingResolver<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Number of distinct addresses resolved so far.
    pub fn cached(&self) -> usize {
        self.cache.lock().len()
    }
}

impl<R: AddressResolver> AddressResolver for CachingResolver<R> {
    fn resolve(&self, address: usize) -> Resolution {
        if let Some(hit) = self.cache.lock().get(&address) {
            return hit.clone();
        }
        let resolved = self.inner.resolve(address);
        self.cache.lock().insert(address, resolved.clone());
        resolved
    }
}

/// Signed distance from a symbol's base to an address.
///
/// Returns `('+', address - base)` when the address is at or after the
/// base, `('-', base - address)` otherwise. A resolver may report a base
/// slightly above the address before the first symbol of a stripped region.
/// A missing base is treated as zero.
pub fn symbol_offset(address: usize, base: Option<usize>) -> (char, usize) {
    let base = base.unwrap_or(0);
    if address >= base {
        ('+', address - base)
    } else {
        ('-', base - address)
    }
}
