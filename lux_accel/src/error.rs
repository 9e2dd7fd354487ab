// Structured error taxonomy for the accelerator. Construction failures propagate out via
// these variants; intersection itself never fails (a miss is `Option`, not an error).

use std::fmt;

/// Everything that can go wrong building or driving the accelerator.
#[derive(Debug)]
pub enum AccelError {
    /// Unknown `accelerator.type`, unknown sampler type, or an invalid tree parameter.
    Configuration { message: String },
    /// Pathological centroid distribution, recursion beyond the depth limit, or a `NB_BINS`
    /// miss during BVH/QBVH/MQBVH construction.
    Build { message: String },
    /// A device buffer allocation failed, or a single buffer would exceed the device's
    /// advertised per-allocation limit.
    Device {
        message: String,
        requested_bytes: u64,
        device_limit_bytes: u64,
    },
    /// A kernel compile, enqueue, or readback failed; the dispatcher halts and marks itself
    /// failed when this occurs.
    Kernel {
        kernel_name: String,
        device_error_code: i32,
        message: String,
    },
}

impl fmt::Display for AccelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccelError::Configuration { message } => {
                write!(f, "configuration error: {}", message)
            }
            AccelError::Build { message } => write!(f, "build error: {}", message),
            AccelError::Device {
                message,
                requested_bytes,
                device_limit_bytes,
            } => write!(
                f,
                "device error: {} (requested {} bytes, device limit {} bytes)",
                message, requested_bytes, device_limit_bytes
            ),
            AccelError::Kernel {
                kernel_name,
                device_error_code,
                message,
            } => write!(
                f,
                "kernel error in '{}' (device code {}): {}",
                kernel_name, device_error_code, message
            ),
        }
    }
}

impl std::error::Error for AccelError {}

impl AccelError {
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        AccelError::Configuration {
            message: message.into(),
        }
    }

    pub fn build<S: Into<String>>(message: S) -> Self {
        AccelError::Build {
            message: message.into(),
        }
    }

    pub fn device<S: Into<String>>(
        message: S,
        requested_bytes: u64,
        device_limit_bytes: u64,
    ) -> Self {
        AccelError::Device {
            message: message.into(),
            requested_bytes,
            device_limit_bytes,
        }
    }

    pub fn kernel<S: Into<String>, M: Into<String>>(
        kernel_name: S,
        device_error_code: i32,
        message: M,
    ) -> Self {
        AccelError::Kernel {
            kernel_name: kernel_name.into(),
            device_error_code,
            message: message.into(),
        }
    }
}

pub type AccelResult<T> = Result<T, AccelError>;
