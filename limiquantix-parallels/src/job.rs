//! Asynchronous job execution and fault decoding.
//!
//! A vendor operation is submitted as a job, waited on under the connection's
//! timeout, and then either yields a result handle or a [`Fault`]. Failed jobs
//! may carry an error event with a better description than their return code;
//! that lookup is best-effort and falls back to describing the return code.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

use crate::error::Result;
use crate::handle::Handle;
use crate::sdk::consts::{PRL_ERR_INVALID_HANDLE, PRL_ERR_SUCCESS, PRL_ERR_TIMEOUT};
use crate::sdk::{RawHandle, ResultCode, Sdk, SdkResult};

/// Short and long description of a vendor failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultInfo {
    pub code: ResultCode,
    pub short: String,
    pub long: String,
}

impl FaultInfo {
    /// Describe a result code through the primary channel.
    pub fn describe(sdk: &dyn Sdk, code: ResultCode) -> Self {
        Self {
            code,
            short: sdk.result_description(code, true),
            long: sdk.result_description(code, false),
        }
    }

    /// Describe a failure through the job's error event.
    fn from_event(sdk: &dyn Sdk, event: RawHandle) -> SdkResult<Self> {
        Ok(Self {
            code: sdk.event_err_code(event)?,
            short: sdk.event_err_string(event, true)?,
            long: sdk.event_err_string(event, false)?,
        })
    }
}

impl fmt::Display for FaultInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.short.is_empty(), self.long.is_empty()) {
            (false, false) => write!(f, "{} {}", self.short, self.long),
            (false, true) => write!(f, "{}", self.short),
            (true, false) => write!(f, "{}", self.long),
            (true, true) => write!(f, "vendor error {:#x}", self.code),
        }
    }
}

/// Failure outcome of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Submission, wait, return-code or result retrieval failed.
    Call(FaultInfo),
    /// Nonzero return code, described by the code itself.
    Job(FaultInfo),
    /// Nonzero return code, described by the job's error event.
    JobEvent { ret_code: ResultCode, info: FaultInfo },
}

impl Fault {
    pub fn info(&self) -> &FaultInfo {
        match self {
            Self::Call(info) | Self::Job(info) => info,
            Self::JobEvent { info, .. } => info,
        }
    }

    /// The wait timed out; the vendor-side operation may still complete.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Call(info) if info.code == PRL_ERR_TIMEOUT)
    }

    /// The job ran and reported failure.
    pub fn is_job_failure(&self) -> bool {
        !matches!(self, Self::Call(_))
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.info(), f)
    }
}

/// Runs vendor jobs under a fixed timeout.
#[derive(Clone)]
pub struct JobRunner {
    sdk: Arc<dyn Sdk>,
    timeout: Option<Duration>,
}

impl JobRunner {
    /// `timeout` of `None` waits indefinitely.
    pub fn new(sdk: Arc<dyn Sdk>, timeout: Option<Duration>) -> Self {
        Self { sdk, timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Submit a job and wait for its result handle.
    ///
    /// The job handle is released before returning on every path. A returned
    /// result handle is owned by the caller.
    pub fn run<F>(&self, submit: F) -> std::result::Result<Handle, Fault>
    where
        F: FnOnce(&dyn Sdk) -> SdkResult<RawHandle>,
    {
        let sdk = self.sdk.as_ref();

        let job = match submit(sdk) {
            Ok(raw) => Handle::new(Arc::clone(&self.sdk), raw),
            Err(code) => return Err(self.call_fault("submit", code)),
        };

        if let Err(code) = sdk.job_wait(job.raw(), self.timeout) {
            return Err(self.call_fault("wait", code));
        }

        let ret_code = sdk
            .job_ret_code(job.raw())
            .map_err(|code| self.call_fault("ret_code", code))?;

        if ret_code != PRL_ERR_SUCCESS {
            return Err(self.job_fault(&job, ret_code));
        }

        match sdk.job_result(job.raw()) {
            Ok(raw) if raw.is_invalid() => {
                Err(self.call_fault("result", PRL_ERR_INVALID_HANDLE))
            }
            Ok(raw) => Ok(Handle::new(Arc::clone(&self.sdk), raw)),
            Err(code) => Err(self.call_fault("result", code)),
        }
    }

    /// Run a job whose result is not needed.
    pub fn wait<F>(&self, submit: F) -> std::result::Result<(), Fault>
    where
        F: FnOnce(&dyn Sdk) -> SdkResult<RawHandle>,
    {
        self.run(submit).map(drop)
    }

    /// Run a job and take ownership of the first parameter of its result.
    pub fn first_param<F>(&self, submit: F) -> Result<Handle>
    where
        F: FnOnce(&dyn Sdk) -> SdkResult<RawHandle>,
    {
        let result = self.run(submit)?;
        Handle::acquire(&self.sdk, self.sdk.result_param_by_index(result.raw(), 0))
    }

    fn call_fault(&self, step: &'static str, code: ResultCode) -> Fault {
        let info = FaultInfo::describe(self.sdk.as_ref(), code);
        if code == PRL_ERR_TIMEOUT {
            warn!(step, timeout = ?self.timeout, "Vendor job timed out: {}", info);
        } else {
            error!(step, code = %format!("{:#x}", code), "Vendor job call failed: {}", info);
        }
        Fault::Call(info)
    }

    fn job_fault(&self, job: &Handle, ret_code: ResultCode) -> Fault {
        let sdk = self.sdk.as_ref();

        let event = match Handle::acquire(&self.sdk, sdk.job_error(job.raw())) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "No error event for failed job, reporting return code");
                return self.primary_job_fault(ret_code);
            }
        };

        match FaultInfo::from_event(sdk, event.raw()) {
            Ok(info) => {
                error!(ret_code = %format!("{:#x}", ret_code), "Vendor job failed: {}", info);
                Fault::JobEvent { ret_code, info }
            }
            Err(code) => {
                warn!(
                    code = %format!("{:#x}", code),
                    "Error event unreadable, reporting return code"
                );
                self.primary_job_fault(ret_code)
            }
        }
    }

    fn primary_job_fault(&self, ret_code: ResultCode) -> Fault {
        let info = FaultInfo::describe(self.sdk.as_ref(), ret_code);
        error!(ret_code = %format!("{:#x}", ret_code), "Vendor job failed: {}", info);
        Fault::Job(info)
    }
}

impl fmt::Debug for JobRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRunner")
            .field("timeout", &self.timeout)
            .finish()
    }
}
