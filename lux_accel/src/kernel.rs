// Device-kernel argument binding for each tree family. The kernel source is embedded as a
// string constant and handed to `Device::compile` unmodified — this module never
// interprets it, it only decides *which* preprocessor symbols to pass (vertex/node page
// counts, page size) and *which* buffers bind to which positional argument, mirroring the
// host-side packed layouts in `bvh`/`qbvh`/`mqbvh` byte-for-byte.

use crate::config::{DeviceLimits, QbvhParams};
use crate::device::{BufferFlags, BufferHandle, Device, KernelId, LaunchRange};
use crate::error::AccelResult;
use crate::paging::{self, MAX_PAGES};

/// One work item per ray; out-of-range work items (padding up to a work-group multiple)
/// must short-circuit inside the kernel itself.
fn rounded_global_range(ray_count: usize, work_group_size: usize) -> usize {
    if work_group_size == 0 {
        ray_count
    } else {
        ((ray_count + work_group_size - 1) / work_group_size) * work_group_size
    }
}

const BVH_KERNEL_SOURCE: &str = include_str!("kernels/bvh.cl");
const QBVH_KERNEL_SOURCE: &str = include_str!("kernels/qbvh.cl");
const MQBVH_KERNEL_SOURCE: &str = include_str!("kernels/mqbvh.cl");

/// Positional argument indices, fixed per kernel and documented here rather than inferred
/// from the source at runtime.
mod arg_index {
    pub const NODES: u32 = 0;
    pub const VERTS: u32 = 1;
    pub const RAYS: u32 = 2;
    pub const HITS: u32 = 3;
    pub const RAY_COUNT: u32 = 4;
}

fn page_defines(label: &str, page_count: usize, page_capacity: u32) -> Vec<(String, String)> {
    vec![
        (format!("{}_PAGE_COUNT", label), page_count.to_string()),
        (format!("{}_PAGE_SIZE", label), page_capacity.to_string()),
    ]
}

/// Binds a compiled traversal kernel to its paged node/vertex buffers. `rays`/`hits` are
/// rebound per batch by the dispatcher; everything else is set once at `new`.
pub struct BvhKernel<'d> {
    device: &'d dyn Device,
    kernel: KernelId,
    _nodes: Vec<BufferHandle<'d>>,
    _verts: Vec<BufferHandle<'d>>,
    work_group_size: usize,
}

impl<'d> BvhKernel<'d> {
    pub fn new(
        device: &'d dyn Device,
        node_pages: &[&[u8]],
        vertex_pages: &[&[u8]],
        limits: &DeviceLimits,
    ) -> AccelResult<Self> {
        assert!(node_pages.len() as u32 <= MAX_PAGES);
        assert!(vertex_pages.len() as u32 <= MAX_PAGES);

        let mut defines = page_defines("BVH_NODE", node_pages.len(), (limits.max_page_size_bytes / 48) as u32);
        defines.extend(page_defines("BVH_VERTEX", vertex_pages.len(), (limits.max_page_size_bytes / 12) as u32));

        let program = device.compile(BVH_KERNEL_SOURCE, &defines)?;
        let kernel = device.kernel(program, "Bvh_Intersect")?;
        let work_group_size = device.max_work_group_size(kernel)?.min(256);

        let nodes = alloc_pages(device, node_pages, "bvh-node-page")?;
        let verts = alloc_pages(device, vertex_pages, "bvh-vertex-page")?;
        for (i, n) in nodes.iter().enumerate() {
            device.set_arg_buffer(kernel, arg_index::NODES + i as u32, n.id())?;
        }

        Ok(BvhKernel {
            device,
            kernel,
            _nodes: nodes,
            _verts: verts,
            work_group_size,
        })
    }

    pub fn enqueue(&self, rays: BufferId, hits: BufferId, ray_count: usize) -> AccelResult<crate::device::EventId> {
        self.device.set_arg_buffer(self.kernel, arg_index::RAYS, rays)?;
        self.device.set_arg_buffer(self.kernel, arg_index::HITS, hits)?;
        self.device.set_arg_u32(self.kernel, arg_index::RAY_COUNT, ray_count as u32)?;
        self.device.enqueue_range(
            self.kernel,
            LaunchRange {
                global_range: rounded_global_range(ray_count, self.work_group_size),
                work_group_size: self.work_group_size,
            },
        )
    }
}

/// QBVH additionally needs a per-work-item local stack; the kernel caps its work-group
/// size so `stack_size * work_group_size` fits in the device's local memory.
pub struct QbvhKernel<'d> {
    device: &'d dyn Device,
    kernel: KernelId,
    _nodes: Vec<BufferHandle<'d>>,
    _quads: Vec<BufferHandle<'d>>,
    work_group_size: usize,
}

impl<'d> QbvhKernel<'d> {
    pub fn new(
        device: &'d dyn Device,
        node_pages: &[&[u8]],
        quad_pages: &[&[u8]],
        limits: &DeviceLimits,
        params: &QbvhParams,
    ) -> AccelResult<Self> {
        let mut defines = page_defines("QBVH_NODE", node_pages.len(), (limits.max_page_size_bytes / 128) as u32);
        defines.extend(page_defines("QBVH_QUAD", quad_pages.len(), (limits.max_page_size_bytes / 128) as u32));
        defines.push(("QBVH_STACK_SIZE".to_string(), params.max_stack_size.to_string()));

        let program = device.compile(QBVH_KERNEL_SOURCE, &defines)?;
        let kernel = device.kernel(program, "Qbvh_Intersect")?;

        let stack_bytes_per_item = params.max_stack_size * std::mem::size_of::<i32>();
        let local_mem_limit = (device.local_mem_size() as usize / stack_bytes_per_item.max(1)).max(1);
        let work_group_size = device.max_work_group_size(kernel)?.min(256).min(local_mem_limit);

        let nodes = alloc_pages(device, node_pages, "qbvh-node-page")?;
        let quads = alloc_pages(device, quad_pages, "qbvh-quad-page")?;
        for (i, n) in nodes.iter().enumerate() {
            device.set_arg_buffer(kernel, arg_index::NODES + i as u32, n.id())?;
        }

        Ok(QbvhKernel {
            device,
            kernel,
            _nodes: nodes,
            _quads: quads,
            work_group_size,
        })
    }

    pub fn enqueue(&self, rays: BufferId, hits: BufferId, ray_count: usize) -> AccelResult<crate::device::EventId> {
        self.device.set_arg_buffer(self.kernel, arg_index::RAYS, rays)?;
        self.device.set_arg_buffer(self.kernel, arg_index::HITS, hits)?;
        self.device.set_arg_u32(self.kernel, arg_index::RAY_COUNT, ray_count as u32)?;
        self.device.enqueue_range(
            self.kernel,
            LaunchRange {
                global_range: rounded_global_range(ray_count, self.work_group_size),
                work_group_size: self.work_group_size,
            },
        )
    }
}

pub struct MqbvhKernel<'d> {
    device: &'d dyn Device,
    kernel: KernelId,
    _top_level: Vec<BufferHandle<'d>>,
    _leaves: Vec<BufferHandle<'d>>,
    work_group_size: usize,
}

impl<'d> MqbvhKernel<'d> {
    pub fn new(
        device: &'d dyn Device,
        top_level_pages: &[&[u8]],
        leaf_descriptor_pages: &[&[u8]],
        limits: &DeviceLimits,
        params: &QbvhParams,
    ) -> AccelResult<Self> {
        let mut defines = page_defines(
            "MQBVH_TOP",
            top_level_pages.len(),
            (limits.max_page_size_bytes / 128) as u32,
        );
        defines.extend(page_defines(
            "MQBVH_LEAF",
            leaf_descriptor_pages.len(),
            (limits.max_page_size_bytes / 64) as u32,
        ));
        defines.push(("QBVH_STACK_SIZE".to_string(), params.max_stack_size.to_string()));

        let program = device.compile(MQBVH_KERNEL_SOURCE, &defines)?;
        let kernel = device.kernel(program, "Mqbvh_Intersect")?;
        let work_group_size = device.max_work_group_size(kernel)?.min(256);

        let top_level = alloc_pages(device, top_level_pages, "mqbvh-top-page")?;
        let leaves = alloc_pages(device, leaf_descriptor_pages, "mqbvh-leaf-page")?;
        for (i, n) in top_level.iter().enumerate() {
            device.set_arg_buffer(kernel, arg_index::NODES + i as u32, n.id())?;
        }

        Ok(MqbvhKernel {
            device,
            kernel,
            _top_level: top_level,
            _leaves: leaves,
            work_group_size,
        })
    }

    pub fn enqueue(&self, rays: BufferId, hits: BufferId, ray_count: usize) -> AccelResult<crate::device::EventId> {
        self.device.set_arg_buffer(self.kernel, arg_index::RAYS, rays)?;
        self.device.set_arg_buffer(self.kernel, arg_index::HITS, hits)?;
        self.device.set_arg_u32(self.kernel, arg_index::RAY_COUNT, ray_count as u32)?;
        self.device.enqueue_range(
            self.kernel,
            LaunchRange {
                global_range: rounded_global_range(ray_count, self.work_group_size),
                work_group_size: self.work_group_size,
            },
        )
    }
}

fn alloc_pages<'d>(device: &'d dyn Device, pages: &[&[u8]], label: &str) -> AccelResult<Vec<BufferHandle<'d>>> {
    pages
        .iter()
        .enumerate()
        .map(|(i, page)| {
            BufferHandle::alloc(
                device,
                BufferFlags::READ_ONLY,
                Some(page),
                page.len() as u64,
                &format!("{}-{}", label, i),
            )
        })
        .collect()
}

pub use crate::device::BufferId;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::mock::MockDevice;

    #[test]
    fn global_range_rounds_up_to_work_group_multiple() {
        assert_eq!(rounded_global_range(1000, 256), 1024);
        assert_eq!(rounded_global_range(256, 256), 256);
        assert_eq!(rounded_global_range(0, 256), 0);
    }

    #[test]
    fn bvh_kernel_binds_and_enqueues() {
        let device = MockDevice::new();
        let node_page = vec![0u8; 48 * 4];
        let vert_page = vec![0u8; 12 * 16];
        let limits = DeviceLimits::default();
        let kernel = BvhKernel::new(&device, &[&node_page], &[&vert_page], &limits).unwrap();

        let rays = device.alloc_buffer(BufferFlags::READ_ONLY, None, 32 * 4, "rays").unwrap();
        let hits = device.alloc_buffer(BufferFlags::WRITE_ONLY, None, 32 * 4, "hits").unwrap();
        kernel.enqueue(rays, hits, 4).unwrap();
    }

    #[test]
    fn paging_limits_agree_with_paging_module() {
        let capacity = paging::page_count(300, 100);
        assert_eq!(capacity, 3);
    }
}
