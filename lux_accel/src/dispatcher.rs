// Bounded ray-buffer queue serviced by a single background worker, pipelining up to three
// in-flight device submissions so host/device transfer of batch N overlaps traversal of
// batch N-1. Completion order matches push order because the worker enqueues a clutch of
// batches before waiting on any of them, and waits on its own clutch strictly in the order
// it was enqueued.

use crate::error::AccelResult;
use crate::geometry::{Ray, RayHit};

use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Once};
use std::thread::JoinHandle;
use std::time::Duration;

/// At most this many ray buffers are enqueued to the device before the worker starts
/// waiting on any of them, per the external triple-buffering contract.
const MAX_IN_FLIGHT: usize = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Anything that can run a batch of rays against a device asynchronously: `enqueue` is
/// non-blocking and returns once the device accepts the command, `wait` blocks until the
/// corresponding hits are ready. A host-side tree (`Bvh`/`Qbvh`/`Mqbvh`) or a kernel +
/// device-buffer round trip both fit this shape.
pub trait BatchIntersector: Send + Sync + 'static {
    type Pending: Send;
    fn enqueue(&self, rays: &[Ray]) -> AccelResult<Self::Pending>;
    fn wait(&self, pending: Self::Pending) -> Vec<RayHit>;
}

pub struct RayBatch {
    pub id: u64,
    pub rays: Vec<Ray>,
}

pub struct HitBatch {
    pub id: u64,
    pub hits: Vec<RayHit>,
}

/// A host-side `BatchIntersector` that intersects every ray in a batch immediately and
/// reports it as already complete — useful as the in-process default and for testing the
/// dispatcher's queueing behavior without a device.
pub struct SyncHostIntersector<F: Fn(&Ray) -> RayHit + Send + Sync + 'static> {
    intersect_one: F,
}

impl<F: Fn(&Ray) -> RayHit + Send + Sync + 'static> SyncHostIntersector<F> {
    pub fn new(intersect_one: F) -> Self {
        SyncHostIntersector { intersect_one }
    }
}

impl<F: Fn(&Ray) -> RayHit + Send + Sync + 'static> BatchIntersector for SyncHostIntersector<F> {
    type Pending = Vec<RayHit>;

    fn enqueue(&self, rays: &[Ray]) -> AccelResult<Vec<RayHit>> {
        Ok(rays.iter().map(|r| (self.intersect_one)(r)).collect())
    }

    fn wait(&self, pending: Vec<RayHit>) -> Vec<RayHit> {
        pending
    }
}

pub struct Dispatcher<B: BatchIntersector> {
    push_tx: Option<Sender<RayBatch>>,
    done_rx: Receiver<HitBatch>,
    interrupted: Arc<AtomicBool>,
    failed: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    _marker: std::marker::PhantomData<B>,
}

impl<B: BatchIntersector> Dispatcher<B> {
    /// Spawns the worker thread and requests the highest OS priority it can get
    /// (best-effort; a permission failure is logged once and otherwise ignored).
    pub fn start(intersector: Arc<B>, queue_capacity: usize) -> Self {
        let (push_tx, push_rx) = bounded::<RayBatch>(queue_capacity);
        let (done_tx, done_rx) = bounded::<HitBatch>(queue_capacity);
        let interrupted = Arc::new(AtomicBool::new(false));
        let failed = Arc::new(AtomicBool::new(false));

        let worker_interrupted = interrupted.clone();
        let worker_failed = failed.clone();
        let worker = std::thread::spawn(move || {
            request_high_priority();
            worker_loop(&intersector, &push_rx, &done_tx, &worker_interrupted, &worker_failed);
        });

        Dispatcher {
            push_tx: Some(push_tx),
            done_rx,
            interrupted,
            failed,
            worker: Some(worker),
            _marker: std::marker::PhantomData,
        }
    }

    /// Queues a ray buffer; blocks if the queue is full.
    pub fn push(&self, batch: RayBatch) -> bool {
        match &self.push_tx {
            Some(tx) => tx.send(batch).is_ok(),
            None => false,
        }
    }

    /// Blocks for the next completed buffer, in push order.
    pub fn recv_done(&self) -> Option<HitBatch> {
        self.done_rx.recv().ok()
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Signals the worker to stop pulling new buffers once its current pipeline drains.
    /// In-flight device work finishes; cancelling a submitted kernel is not supported.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
    }

    /// Joins the worker thread. Call after `interrupt` (or once producers are done and the
    /// queue has been allowed to drain) to shut down cleanly.
    pub fn stop(mut self) {
        self.interrupt();
        self.push_tx.take();
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

fn worker_loop<B: BatchIntersector>(
    intersector: &Arc<B>,
    rx: &Receiver<RayBatch>,
    tx: &Sender<HitBatch>,
    interrupted: &AtomicBool,
    failed: &AtomicBool,
) {
    loop {
        let first = match rx.recv_timeout(POLL_INTERVAL) {
            Ok(batch) => batch,
            Err(RecvTimeoutError::Timeout) => {
                if interrupted.load(Ordering::Acquire) {
                    return;
                }
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => return,
        };

        let mut ids = Vec::with_capacity(MAX_IN_FLIGHT);
        let mut pendings = Vec::with_capacity(MAX_IN_FLIGHT);

        match intersector.enqueue(&first.rays) {
            Ok(pending) => {
                ids.push(first.id);
                pendings.push(pending);
            }
            Err(_) => {
                failed.store(true, Ordering::Release);
                return;
            }
        }

        // Opportunistically pull up to two more without blocking, so their device upload
        // overlaps the wait on the first buffer below.
        while pendings.len() < MAX_IN_FLIGHT {
            match rx.try_recv() {
                Ok(next) => match intersector.enqueue(&next.rays) {
                    Ok(pending) => {
                        ids.push(next.id);
                        pendings.push(pending);
                    }
                    Err(_) => {
                        failed.store(true, Ordering::Release);
                        return;
                    }
                },
                Err(_) => break,
            }
        }

        for (id, pending) in ids.into_iter().zip(pendings.into_iter()) {
            let hits = intersector.wait(pending);
            if tx.send(HitBatch { id, hits }).is_err() {
                return;
            }
        }
    }
}

#[cfg(unix)]
fn request_high_priority() {
    static LOGGED: Once = Once::new();
    let result = unsafe { libc::setpriority(libc::PRIO_PROCESS, 0, -20) };
    if result != 0 {
        LOGGED.call_once(|| {
            log::warn!("failed to raise dispatcher thread priority (requires elevated permission); continuing at default priority");
        });
    }
}

#[cfg(not(unix))]
fn request_high_priority() {
    log::debug!("thread-priority request is not implemented on this platform");
}

#[cfg(test)]
mod tests {
    use super::*;
    use pmath::vector::Vec3;

    fn identity_intersector() -> Arc<SyncHostIntersector<impl Fn(&Ray) -> RayHit + Send + Sync + 'static>> {
        Arc::new(SyncHostIntersector::new(|ray: &Ray| {
            if ray.org.x < 0.0 {
                RayHit::miss()
            } else {
                RayHit {
                    t: ray.org.x,
                    b1: 0.0,
                    b2: 0.0,
                    mesh_index: 0,
                    triangle_index: 0,
                }
            }
        }))
    }

    fn ray_at(x: f64) -> Ray {
        pmath::ray::Ray::new(Vec3 { x, y: 0.0, z: 0.0 }, Vec3 { x: 0.0, y: 0.0, z: -1.0 }, 0.0)
    }

    #[test]
    fn completes_buffers_in_push_order() {
        let dispatcher = Dispatcher::start(identity_intersector(), 8);
        for id in 0..10u64 {
            assert!(dispatcher.push(RayBatch { id, rays: vec![ray_at(id as f64)] }));
        }
        for expected_id in 0..10u64 {
            let done = dispatcher.recv_done().unwrap();
            assert_eq!(done.id, expected_id);
        }
        dispatcher.stop();
    }

    #[test]
    fn buffer_of_identical_rays_all_agree_with_single_ray_result() {
        let dispatcher = Dispatcher::start(identity_intersector(), 4);
        let single = ray_at(3.0);
        let expected = RayHit {
            t: 3.0,
            b1: 0.0,
            b2: 0.0,
            mesh_index: 0,
            triangle_index: 0,
        };
        dispatcher.push(RayBatch {
            id: 0,
            rays: vec![single; 1024],
        });
        let done = dispatcher.recv_done().unwrap();
        assert_eq!(done.hits.len(), 1024);
        for hit in done.hits {
            assert!((hit.t - expected.t).abs() < 1e-9);
        }
        dispatcher.stop();
    }

    #[test]
    fn interrupt_then_stop_joins_cleanly() {
        let dispatcher = Dispatcher::start(identity_intersector(), 4);
        dispatcher.push(RayBatch { id: 0, rays: vec![ray_at(1.0)] });
        let _ = dispatcher.recv_done();
        dispatcher.interrupt();
        dispatcher.stop();
    }
}
