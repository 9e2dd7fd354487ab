// Abstraction over a GPU-like compute device. The accelerator never talks to a concrete
// API directly; it only needs enough surface to allocate buffers, compile a kernel from
// source with preprocessor symbols, bind arguments positionally, and enqueue work over a
// ray count. `mock` provides an in-process implementation used by tests and by any caller
// without a real device.

pub mod mock;

use crate::error::{AccelError, AccelResult};

use bitflags::bitflags;

bitflags! {
    /// Mirrors the read/write/out-of-core hints a real compute API exposes per buffer.
    pub struct BufferFlags: u32 {
        const READ_ONLY = 0b0001;
        const WRITE_ONLY = 0b0010;
        const READ_WRITE = 0b0100;
        /// Hint that the buffer may be paged out rather than pinned, for buffers the
        /// kernel streams through once (ray/hit buffers) rather than random-accesses.
        const OUT_OF_CORE = 0b1000;
    }
}

pub type BufferId = u64;
pub type ProgramId = u64;
pub type KernelId = u64;
pub type EventId = u64;

/// One (global_range, work_group_size) launch descriptor.
#[derive(Clone, Copy, Debug)]
pub struct LaunchRange {
    pub global_range: usize,
    pub work_group_size: usize,
}

/// The capability surface the dispatcher and kernel modules require of a compute device.
/// A real binding (OpenCL, CUDA, a remote RPC device) implements this directly; `mock`
/// implements it entirely in host memory for tests.
pub trait Device: Send + Sync {
    fn max_mem_alloc_size(&self) -> u64;

    fn alloc_buffer(
        &self,
        flags: BufferFlags,
        host_ptr: Option<&[u8]>,
        size: u64,
        label: &str,
    ) -> AccelResult<BufferId>;
    fn free_buffer(&self, id: BufferId);

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8], blocking: bool) -> AccelResult<()>;
    fn read_buffer(&self, id: BufferId, offset: u64, data: &mut [u8], blocking: bool) -> AccelResult<()>;

    /// Compiles `source` with the given `-D NAME=VALUE` style preprocessor symbols.
    fn compile(&self, source: &str, defines: &[(String, String)]) -> AccelResult<ProgramId>;
    fn kernel(&self, program: ProgramId, name: &str) -> AccelResult<KernelId>;
    fn max_work_group_size(&self, kernel: KernelId) -> AccelResult<usize>;
    fn local_mem_size(&self) -> u64;

    fn set_arg_buffer(&self, kernel: KernelId, index: u32, buffer: BufferId) -> AccelResult<()>;
    fn set_arg_u32(&self, kernel: KernelId, index: u32, value: u32) -> AccelResult<()>;

    /// Enqueues `kernel` over `range`, returning a completion event. Non-blocking: the
    /// call returns once the device has accepted the command, not once it has run.
    fn enqueue_range(&self, kernel: KernelId, range: LaunchRange) -> AccelResult<EventId>;
    /// Blocks the calling thread until `event` completes.
    fn wait(&self, event: EventId) -> AccelResult<()>;
}

/// A move-only handle to a device buffer. Frees the buffer on drop, so a `Vec<BufferHandle>`
/// popped and dropped from the back releases buffers in reverse allocation order.
pub struct BufferHandle<'d> {
    device: &'d dyn Device,
    id: BufferId,
    size: u64,
    label: String,
}

impl<'d> BufferHandle<'d> {
    pub fn alloc(
        device: &'d dyn Device,
        flags: BufferFlags,
        host_ptr: Option<&[u8]>,
        size: u64,
        label: &str,
    ) -> AccelResult<Self> {
        if size > device.max_mem_alloc_size() {
            return Err(AccelError::device(
                format!("buffer '{}' exceeds device allocation limit", label),
                size,
                device.max_mem_alloc_size(),
            ));
        }
        let id = device.alloc_buffer(flags, host_ptr, size, label)?;
        Ok(BufferHandle {
            device,
            id,
            size,
            label: label.to_string(),
        })
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn write(&self, offset: u64, data: &[u8], blocking: bool) -> AccelResult<()> {
        self.device.write_buffer(self.id, offset, data, blocking)
    }

    pub fn read(&self, offset: u64, data: &mut [u8], blocking: bool) -> AccelResult<()> {
        self.device.read_buffer(self.id, offset, data, blocking)
    }
}

impl<'d> Drop for BufferHandle<'d> {
    fn drop(&mut self) {
        self.device.free_buffer(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockDevice;
    use super::*;

    #[test]
    fn buffer_handle_frees_on_drop() {
        let device = MockDevice::new();
        {
            let _h = BufferHandle::alloc(&device, BufferFlags::READ_WRITE, None, 64, "scratch").unwrap();
            assert_eq!(device.live_buffer_count(), 1);
        }
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn oversized_allocation_is_device_error() {
        let device = MockDevice::new();
        let limit = device.max_mem_alloc_size();
        let err = BufferHandle::alloc(&device, BufferFlags::READ_WRITE, None, limit + 1, "too-big").unwrap_err();
        assert!(matches!(err, AccelError::Device { .. }));
    }
}
