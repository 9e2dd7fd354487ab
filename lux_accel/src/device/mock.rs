// An in-process stand-in for a real compute device. It honors the `Device` contract
// (allocation limits, argument binding, event ordering) so the dispatcher and buffer
// lifecycle can be exercised without a GPU, but it does not interpret kernel source —
// `enqueue_range` completes immediately once the command is recorded, matching the way
// the real protocol is non-blocking but not reproducing device-side traversal arithmetic.
// Kernel source stays "data" to this device, per the subsystem's device abstraction.

use super::{BufferFlags, BufferId, Device, EventId, KernelId, LaunchRange, ProgramId};
use crate::error::{AccelError, AccelResult};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

struct MockBuffer {
    data: Vec<u8>,
    label: String,
}

/// A host-memory device with a configurable allocation ceiling and local-memory size,
/// so tests can exercise the `Device` buffer-limit and stack-size error paths.
pub struct MockDevice {
    max_mem_alloc_size: u64,
    local_mem_size: u64,
    next_id: AtomicU64,
    buffers: Mutex<HashMap<BufferId, MockBuffer>>,
    programs: Mutex<HashMap<ProgramId, String>>,
    kernels: Mutex<HashMap<KernelId, (ProgramId, String)>>,
}

impl MockDevice {
    pub fn new() -> Self {
        MockDevice::with_limits(256 * 1024 * 1024, 32 * 1024)
    }

    pub fn with_limits(max_mem_alloc_size: u64, local_mem_size: u64) -> Self {
        MockDevice {
            max_mem_alloc_size,
            local_mem_size,
            next_id: AtomicU64::new(1),
            buffers: Mutex::new(HashMap::new()),
            programs: Mutex::new(HashMap::new()),
            kernels: Mutex::new(HashMap::new()),
        }
    }

    fn alloc_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn live_buffer_count(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        MockDevice::new()
    }
}

impl Device for MockDevice {
    fn max_mem_alloc_size(&self) -> u64 {
        self.max_mem_alloc_size
    }

    fn alloc_buffer(
        &self,
        _flags: BufferFlags,
        host_ptr: Option<&[u8]>,
        size: u64,
        label: &str,
    ) -> AccelResult<BufferId> {
        if size > self.max_mem_alloc_size {
            return Err(AccelError::device(
                format!("buffer '{}' exceeds mock device allocation limit", label),
                size,
                self.max_mem_alloc_size,
            ));
        }
        let mut data = vec![0u8; size as usize];
        if let Some(src) = host_ptr {
            data[..src.len().min(data.len())].copy_from_slice(&src[..src.len().min(data.len())]);
        }
        let id = self.alloc_id();
        self.buffers.lock().unwrap().insert(
            id,
            MockBuffer {
                data,
                label: label.to_string(),
            },
        );
        Ok(id)
    }

    fn free_buffer(&self, id: BufferId) {
        self.buffers.lock().unwrap().remove(&id);
    }

    fn write_buffer(&self, id: BufferId, offset: u64, data: &[u8], _blocking: bool) -> AccelResult<()> {
        let mut buffers = self.buffers.lock().unwrap();
        let buffer = buffers
            .get_mut(&id)
            .ok_or_else(|| AccelError::device("write to unknown buffer", data.len() as u64, 0))?;
        let start = offset as usize;
        buffer.data[start..start + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read_buffer(&self, id: BufferId, offset: u64, data: &mut [u8], _blocking: bool) -> AccelResult<()> {
        let buffers = self.buffers.lock().unwrap();
        let buffer = buffers
            .get(&id)
            .ok_or_else(|| AccelError::device("read from unknown buffer", data.len() as u64, 0))?;
        let start = offset as usize;
        data.copy_from_slice(&buffer.data[start..start + data.len()]);
        Ok(())
    }

    fn compile(&self, source: &str, _defines: &[(String, String)]) -> AccelResult<ProgramId> {
        let id = self.alloc_id();
        self.programs.lock().unwrap().insert(id, source.to_string());
        Ok(id)
    }

    fn kernel(&self, program: ProgramId, name: &str) -> AccelResult<KernelId> {
        if !self.programs.lock().unwrap().contains_key(&program) {
            return Err(AccelError::kernel(name, -1, "unknown program"));
        }
        let id = self.alloc_id();
        self.kernels.lock().unwrap().insert(id, (program, name.to_string()));
        Ok(id)
    }

    fn max_work_group_size(&self, _kernel: KernelId) -> AccelResult<usize> {
        Ok(256)
    }

    fn local_mem_size(&self) -> u64 {
        self.local_mem_size
    }

    fn set_arg_buffer(&self, kernel: KernelId, _index: u32, _buffer: BufferId) -> AccelResult<()> {
        if !self.kernels.lock().unwrap().contains_key(&kernel) {
            return Err(AccelError::kernel("<unknown>", -1, "set_arg on unknown kernel"));
        }
        Ok(())
    }

    fn set_arg_u32(&self, kernel: KernelId, _index: u32, _value: u32) -> AccelResult<()> {
        if !self.kernels.lock().unwrap().contains_key(&kernel) {
            return Err(AccelError::kernel("<unknown>", -1, "set_arg on unknown kernel"));
        }
        Ok(())
    }

    fn enqueue_range(&self, kernel: KernelId, _range: LaunchRange) -> AccelResult<EventId> {
        if !self.kernels.lock().unwrap().contains_key(&kernel) {
            return Err(AccelError::kernel("<unknown>", -1, "enqueue on unknown kernel"));
        }
        // Completes synchronously; `wait` on the returned event is therefore always
        // immediate. Real devices would return before the kernel has run.
        Ok(self.alloc_id())
    }

    fn wait(&self, _event: EventId) -> AccelResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_then_read_round_trips() {
        let device = MockDevice::new();
        let id = device
            .alloc_buffer(BufferFlags::READ_WRITE, None, 16, "test")
            .unwrap();
        device.write_buffer(id, 0, &[1, 2, 3, 4], true).unwrap();
        let mut out = [0u8; 4];
        device.read_buffer(id, 0, &mut out, true).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn kernel_lookup_on_unknown_program_fails() {
        let device = MockDevice::new();
        let err = device.kernel(999, "Bvh_Intersect").unwrap_err();
        assert!(matches!(err, AccelError::Kernel { .. }));
    }
}
