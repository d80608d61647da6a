//! OpenCL GPU backend.
//!
//! Drives an external per-record digest kernel. The kernel source is read
//! from disk and compiled once at construction; every batch then becomes a
//! single NDRange launch with one work-item per record.
//!
//! # Kernel contract
//!
//! ```text
//! __kernel void <name>(__global const uchar *msgs,    // count * stride bytes
//!                      __global const uint  *lens,    // count byte lengths
//!                      const uint msg_stride,         // stride in 32-bit words
//!                      __global uint *digests)        // count * word_count words
//! ```
//!
//! The kernel reads each 4-byte group of its slot as a big-endian word and
//! writes the digest in native word order (SHA-512 as high/low halves).
//!
//! Only available with the `opencl` feature:
//! ```bash
//! cargo build --features linedigest-core/opencl
//! ```

use crate::backend::{BackendInfo, DigestBackend, DispatchOutput};
use crate::batch::Batch;
use crate::digest::{Algorithm, Digest};
use crate::error::BackendError;

use opencl3::command_queue::{CommandQueue, CL_QUEUE_PROFILING_ENABLE};
use opencl3::context::Context;
use opencl3::device::{
    get_all_devices, Device, CL_DEVICE_TYPE_ALL, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_GPU,
};
use opencl3::event::Event;
use opencl3::kernel::{ExecuteKernel, Kernel};
use opencl3::memory::{Buffer, CL_MEM_READ_ONLY, CL_MEM_WRITE_ONLY};
use opencl3::platform::Platform;
use opencl3::program::Program;
use opencl3::types::{cl_device_type, cl_uint, CL_BLOCKING};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::ptr;
use std::time::Duration;
use tracing::{debug, info};

const BACKEND: &str = "opencl";

/// Where to find the digest kernel and how to build it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenClConfig {
    /// Path to the kernel source file.
    #[serde(default = "default_kernel_path")]
    pub kernel_path: PathBuf,
    /// Kernel entry point.
    #[serde(default = "default_kernel_name")]
    pub kernel_name: String,
    /// Extra compiler flags, e.g. "-I /opt/hashcat/OpenCL".
    #[serde(default)]
    pub build_options: String,
}

fn default_kernel_path() -> PathBuf {
    PathBuf::from("sha256_wrapper.cl")
}

fn default_kernel_name() -> String {
    "sha256_wrapper".into()
}

impl Default for OpenClConfig {
    fn default() -> Self {
        Self {
            kernel_path: default_kernel_path(),
            kernel_name: default_kernel_name(),
            build_options: String::new(),
        }
    }
}

/// OpenCL device, context, queue and compiled kernel.
pub struct OpenClBackend {
    algorithm: Algorithm,
    _device: Device,
    context: Context,
    queue: CommandQueue,
    kernel: Kernel,
    device_name: String,
}

// SAFETY: OpenCL 1.2+ guarantees thread safety for context, command queue,
// kernel and memory objects. The backend is only driven from one thread at
// a time through `&mut self`.
unsafe impl Send for OpenClBackend {}

impl std::fmt::Debug for OpenClBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenClBackend")
            .field("algorithm", &self.algorithm)
            .field("device_name", &self.device_name)
            .finish_non_exhaustive()
    }
}

/// Pick the first GPU, falling back to a CPU device, then to anything.
fn select_device() -> Result<Device, BackendError> {
    let preference: [cl_device_type; 3] =
        [CL_DEVICE_TYPE_GPU, CL_DEVICE_TYPE_CPU, CL_DEVICE_TYPE_ALL];
    for device_type in preference {
        if let Some(id) = get_all_devices(device_type)
            .ok()
            .and_then(|ids| ids.first().copied())
        {
            return Ok(Device::new(id));
        }
    }
    Err(BackendError::Unavailable(
        "no OpenCL devices found on any platform".into(),
    ))
}

fn exec_err(op: &str, e: impl std::fmt::Display) -> BackendError {
    BackendError::execution(BACKEND, format!("{op}: {e}"))
}

impl OpenClBackend {
    /// Select a device, create a profiling queue and compile the kernel.
    pub fn new(algorithm: Algorithm, config: &OpenClConfig) -> Result<Self, BackendError> {
        let device = select_device()?;
        let device_name = device.name().unwrap_or_default().trim().to_string();
        let platform_name = device
            .platform()
            .ok()
            .and_then(|id| Platform::new(id).name().ok())
            .unwrap_or_default();
        info!("[OpenCL] Platform: {}", platform_name.trim());
        info!("[OpenCL] Device  : {}", device_name);

        let context = Context::from_device(&device)
            .map_err(|e| BackendError::setup(BACKEND, format!("create context: {e}")))?;

        // OpenCL 1.2 entry point; 2.0 queue properties are not available everywhere.
        #[allow(deprecated)]
        let queue = CommandQueue::create_default(&context, CL_QUEUE_PROFILING_ENABLE)
            .map_err(|e| BackendError::setup(BACKEND, format!("create command queue: {e}")))?;

        let source = std::fs::read_to_string(&config.kernel_path).map_err(|e| {
            BackendError::setup(
                BACKEND,
                format!("read kernel source '{}': {e}", config.kernel_path.display()),
            )
        })?;

        let program =
            Program::create_and_build_from_source(&context, &source, &config.build_options)
                .map_err(|log| {
                    BackendError::setup(BACKEND, format!("build failed:\n{log}"))
                })?;

        let kernel = Kernel::create(&program, &config.kernel_name).map_err(|e| {
            BackendError::setup(BACKEND, format!("create kernel '{}': {e}", config.kernel_name))
        })?;

        info!(
            "[OpenCL] compiled '{}' from {}",
            config.kernel_name,
            config.kernel_path.display()
        );

        Ok(Self {
            algorithm,
            _device: device,
            context,
            queue,
            kernel,
            device_name,
        })
    }

    /// Elapsed device time of a completed event from the profiling counters.
    fn event_elapsed(event: &Event) -> Option<Duration> {
        let start = event.profiling_command_start().ok()?;
        let end = event.profiling_command_end().ok()?;
        Some(Duration::from_nanos(end.saturating_sub(start)))
    }
}

impl DigestBackend for OpenClBackend {
    fn info(&self) -> BackendInfo {
        BackendInfo {
            kind: BACKEND,
            device: self.device_name.clone(),
            algorithm: self.algorithm,
        }
    }

    fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    fn dispatch(&mut self, batch: &Batch) -> Result<DispatchOutput, BackendError> {
        let count = batch.len();
        let words = self.algorithm.word_count();

        // Device buffers live for this batch only and are released on drop.
        let mut msgs_buf = unsafe {
            Buffer::<u8>::create(
                &self.context,
                CL_MEM_READ_ONLY,
                batch.size_bytes(),
                ptr::null_mut(),
            )
            .map_err(|e| exec_err("create msgs buffer", e))?
        };
        let mut lens_buf = unsafe {
            Buffer::<cl_uint>::create(&self.context, CL_MEM_READ_ONLY, count, ptr::null_mut())
                .map_err(|e| exec_err("create lens buffer", e))?
        };
        let out_buf = unsafe {
            Buffer::<cl_uint>::create(
                &self.context,
                CL_MEM_WRITE_ONLY,
                count * words,
                ptr::null_mut(),
            )
            .map_err(|e| exec_err("create digests buffer", e))?
        };

        let write_msgs = unsafe {
            self.queue
                .enqueue_write_buffer(&mut msgs_buf, CL_BLOCKING, 0, batch.buffer(), &[])
                .map_err(|e| exec_err("upload msgs", e))?
        };
        write_msgs.wait().map_err(|e| exec_err("upload msgs", e))?;

        let write_lens = unsafe {
            self.queue
                .enqueue_write_buffer(&mut lens_buf, CL_BLOCKING, 0, batch.lengths(), &[])
                .map_err(|e| exec_err("upload lens", e))?
        };
        write_lens.wait().map_err(|e| exec_err("upload lens", e))?;

        let msg_stride: cl_uint = batch.stride_words();
        let kernel_event = unsafe {
            ExecuteKernel::new(&self.kernel)
                .set_arg(&msgs_buf)
                .set_arg(&lens_buf)
                .set_arg(&msg_stride)
                .set_arg(&out_buf)
                .set_global_work_size(count)
                .enqueue_nd_range(&self.queue)
                .map_err(|e| exec_err("enqueue kernel", e))?
        };
        kernel_event.wait().map_err(|e| exec_err("wait for kernel", e))?;
        self.queue.finish().map_err(|e| exec_err("finish queue", e))?;
        let elapsed = Self::event_elapsed(&kernel_event);

        let mut host: Vec<cl_uint> = vec![0; count * words];
        let read_event = unsafe {
            self.queue
                .enqueue_read_buffer(&out_buf, CL_BLOCKING, 0, &mut host, &[])
                .map_err(|e| exec_err("read digests", e))?
        };
        read_event.wait().map_err(|e| exec_err("read digests", e))?;

        let digests = host
            .chunks_exact(words)
            .map(|w| Digest::from_words(self.algorithm, w))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| exec_err("read digests", "short digest buffer"))?;

        debug!(
            "[OpenCL] {} records, msg_stride={} words, kernel {:?}",
            count, msg_stride, elapsed
        );

        Ok(DispatchOutput { digests, elapsed })
    }
}
