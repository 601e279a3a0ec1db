//! Scoped ownership of vendor handles.
//!
//! Every handle returned by the SDK is wrapped in a [`Handle`] as soon as it
//! is received. Dropping the guard releases the vendor reference, so early
//! returns through `?` cannot leak. Handles that must outlive the current
//! scope are either moved (the connection's server handle) or duplicated with
//! [`Handle::share`] (the configuration handle cached on a domain record).

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{Result, SdkResultExt};
use crate::sdk::{RawHandle, Sdk, SdkResult};

/// Owning guard over one vendor handle reference.
pub struct Handle {
    sdk: Arc<dyn Sdk>,
    raw: RawHandle,
}

impl Handle {
    /// Take ownership of a handle freshly returned by the SDK.
    pub fn new(sdk: Arc<dyn Sdk>, raw: RawHandle) -> Self {
        Self { sdk, raw }
    }

    /// Guard over the null handle; dropping it makes no vendor call.
    pub fn null(sdk: Arc<dyn Sdk>) -> Self {
        Self::new(sdk, RawHandle::INVALID)
    }

    /// Wrap the outcome of a handle-returning vendor call.
    #[track_caller]
    pub fn acquire(sdk: &Arc<dyn Sdk>, result: SdkResult<RawHandle>) -> Result<Self> {
        let raw = result.or_vendor_err(sdk.as_ref())?;
        Ok(Self::new(Arc::clone(sdk), raw))
    }

    pub fn raw(&self) -> RawHandle {
        self.raw
    }

    pub fn is_valid(&self) -> bool {
        !self.raw.is_invalid()
    }

    /// Take an additional vendor reference and return it as a separate guard.
    pub fn share(&self) -> Result<Handle> {
        if self.is_valid() {
            self.sdk.handle_add_ref(self.raw).or_vendor_err(self.sdk.as_ref())?;
        }
        Ok(Self::new(Arc::clone(&self.sdk), self.raw))
    }

    /// Give up ownership without releasing. The caller must free the handle.
    pub fn into_raw(mut self) -> RawHandle {
        std::mem::replace(&mut self.raw, RawHandle::INVALID)
    }

    /// Release now. Safe to call repeatedly; later calls are no-ops.
    pub fn release(&mut self) {
        if self.raw.is_invalid() {
            return;
        }
        let raw = std::mem::replace(&mut self.raw, RawHandle::INVALID);
        if let Err(code) = self.sdk.handle_free(raw) {
            debug!(handle = %raw, code = %format!("{:#x}", code), "Failed to free vendor handle");
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.raw).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSdk;

    fn server(sdk: &Arc<MockSdk>) -> Handle {
        let dyn_sdk: Arc<dyn Sdk> = sdk.clone();
        Handle::acquire(&dyn_sdk, sdk.server_create()).unwrap()
    }

    #[test]
    fn test_drop_releases_handle() {
        let sdk = Arc::new(MockSdk::new());
        {
            let handle = server(&sdk);
            assert!(handle.is_valid());
            assert_eq!(sdk.outstanding_handles(), 1);
        }
        assert_eq!(sdk.outstanding_handles(), 0);
        assert_eq!(sdk.invalid_frees(), 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let sdk = Arc::new(MockSdk::new());
        let mut handle = server(&sdk);
        handle.release();
        handle.release();
        drop(handle);
        assert_eq!(sdk.outstanding_handles(), 0);
        assert_eq!(sdk.invalid_frees(), 0);
    }

    #[test]
    fn test_null_handle_makes_no_call() {
        let sdk = Arc::new(MockSdk::new());
        let handle = Handle::null(sdk.clone());
        assert!(!handle.is_valid());
        drop(handle);
        assert_eq!(sdk.invalid_frees(), 0);
    }

    #[test]
    fn test_share_keeps_object_alive() {
        let sdk = Arc::new(MockSdk::new());
        let first = server(&sdk);
        let second = first.share().unwrap();
        assert_eq!(first.raw(), second.raw());

        drop(first);
        assert_eq!(sdk.outstanding_handles(), 1);
        drop(second);
        assert_eq!(sdk.outstanding_handles(), 0);
    }

    #[test]
    fn test_into_raw_transfers_ownership() {
        let sdk = Arc::new(MockSdk::new());
        let raw = server(&sdk).into_raw();
        assert_eq!(sdk.outstanding_handles(), 1);
        sdk.handle_free(raw).unwrap();
        assert_eq!(sdk.outstanding_handles(), 0);
    }

    #[test]
    fn test_acquire_failure_reports_vendor_error() {
        let sdk = Arc::new(MockSdk::new());
        sdk.fail_call("server_create", crate::sdk::consts::PRL_ERR_OUT_OF_MEMORY);
        let dyn_sdk: Arc<dyn Sdk> = sdk.clone();
        let err = Handle::acquire(&dyn_sdk, sdk.server_create()).unwrap_err();
        assert_eq!(err.result_code(), Some(crate::sdk::consts::PRL_ERR_OUT_OF_MEMORY));
        assert_eq!(sdk.outstanding_handles(), 0);
    }
}
