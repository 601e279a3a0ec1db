//! Error types for the Parallels adapter.

use thiserror::Error;

use crate::job::{Fault, FaultInfo};
use crate::sdk::{ResultCode, Sdk, SdkResult};

/// Errors that can occur while talking to the vendor SDK or assembling domains.
#[derive(Error, Debug)]
pub enum PrlError {
    /// A vendor call (connect, job submission, wait or a field getter) failed.
    #[error("{0}")]
    VendorCallFailed(FaultInfo),

    /// A job completed with a nonzero return code.
    #[error("{info}")]
    JobFailed {
        ret_code: ResultCode,
        info: FaultInfo,
    },

    /// The vendor returned a classification code with no known mapping.
    #[error("Unknown {kind}: {code:X}")]
    UnrecognizedEnum { kind: &'static str, code: u32 },

    /// No vendor domain matches the UUID.
    #[error("no domain with matching uuid '{0}'")]
    NotFound(String),

    /// Local resource exhaustion during assembly.
    #[error("Allocation failed: {0}")]
    AllocationFailed(String),

    /// Malformed text returned by the vendor (UUID, MAC, CPU mask).
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The host capability query failed.
    #[error("Host query failed: {0}")]
    HostQuery(String),
}

impl PrlError {
    pub fn unrecognized(kind: &'static str, code: u32) -> Self {
        Self::UnrecognizedEnum { kind, code }
    }

    /// Vendor result code behind the error, if any.
    pub fn result_code(&self) -> Option<ResultCode> {
        match self {
            Self::VendorCallFailed(info) => Some(info.code),
            Self::JobFailed { ret_code, .. } => Some(*ret_code),
            _ => None,
        }
    }
}

impl From<Fault> for PrlError {
    fn from(fault: Fault) -> Self {
        match fault {
            Fault::Call(info) => Self::VendorCallFailed(info),
            Fault::Job(info) => Self::JobFailed {
                ret_code: info.code,
                info,
            },
            Fault::JobEvent { ret_code, info } => Self::JobFailed { ret_code, info },
        }
    }
}

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, PrlError>;

/// Converts a failed vendor call into [`PrlError::VendorCallFailed`],
/// logging the short and long descriptions at the call site.
pub trait SdkResultExt<T> {
    fn or_vendor_err(self, sdk: &dyn Sdk) -> Result<T>;
}

impl<T> SdkResultExt<T> for SdkResult<T> {
    #[track_caller]
    fn or_vendor_err(self, sdk: &dyn Sdk) -> Result<T> {
        let caller = std::panic::Location::caller();
        self.map_err(|code| {
            let info = FaultInfo::describe(sdk, code);
            tracing::error!(
                code = %format!("{:#x}", code),
                at = %caller,
                "{}",
                info
            );
            PrlError::VendorCallFailed(info)
        })
    }
}
