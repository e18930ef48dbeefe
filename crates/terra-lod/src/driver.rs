//! Per-frame job processing against the external generator and mesher.
//!
//! The quadtree never talks to the generator or the mesher directly. The frame
//! owner pops a bounded number of [`GeomGenJob`]s, runs them through a
//! [`VoxelGenerator`] and a [`GeomMesher`], bakes every non-empty mesh chunk
//! into its own pool slot and hands the slots back via
//! [`VisTree::apply_geoms`]. Only this thread ever mutates the tree or the pool.

use std::ops::AddAssign;

use terra_config::StreamingConfig;

use crate::bounds::BoundsRect;
use crate::geom_pool::{GeomParams, GeomPool, GeomSlot, SlotIndex};
use crate::job::{ApplyOutcome, GeomGenJob};
use crate::node::NUM_GEOMS;
use crate::vis_tree::VisTree;

/// Produces the voxel volume under a node's bounds (plus a one-voxel border).
pub trait VoxelGenerator {
    type Volume;

    fn generate(&mut self, bounds: &BoundsRect, level: u8) -> Self::Volume;
}

/// One chunk of mesher output, borrowing the mesher's vertex staging buffer.
///
/// The borrow guarantees a chunk is baked before the next
/// [`GeomMesher::meshify`] call overwrites the buffer.
#[derive(Debug)]
pub struct MeshChunk<'a> {
    pub vertices: &'a [u8],
    pub num_quads: u32,
    pub params: GeomParams,
    /// No more output for the current volume after this chunk.
    pub volume_done: bool,
}

/// Turns a voxel volume into quads, one staging buffer at a time.
pub trait GeomMesher<V> {
    /// Begin meshing `volume` for `job`.
    fn start_volume(&mut self, volume: &V, job: &GeomGenJob);

    /// Produce the next chunk; called until a chunk reports `volume_done`.
    fn meshify(&mut self) -> MeshChunk<'_>;
}

/// Uploads a mesh chunk into a slot's render resource.
pub trait GeomBaker<M> {
    fn bake(&mut self, slot: &mut GeomSlot<M>, chunk: &MeshChunk<'_>);
}

impl<M, F> GeomBaker<M> for F
where
    F: FnMut(&mut GeomSlot<M>, &MeshChunk<'_>),
{
    fn bake(&mut self, slot: &mut GeomSlot<M>, chunk: &MeshChunk<'_>) {
        self(slot, chunk)
    }
}

/// What one call to [`FrameDriver::process_jobs`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Jobs generated and meshed this frame.
    pub processed: usize,
    /// Jobs dropped without work because their node changed since queueing.
    pub skipped_stale: usize,
    pub installed: usize,
    /// Results that arrived for a node that went stale in between.
    pub stale_completions: usize,
    /// Jobs cancelled because the pool ran dry; retried next frame.
    pub pool_exhausted: usize,
    /// Mesh chunks beyond what a node can reference.
    pub pieces_dropped: usize,
    pub quads: u64,
}

impl AddAssign for FrameReport {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.skipped_stale += rhs.skipped_stale;
        self.installed += rhs.installed;
        self.stale_completions += rhs.stale_completions;
        self.pool_exhausted += rhs.pool_exhausted;
        self.pieces_dropped += rhs.pieces_dropped;
        self.quads += rhs.quads;
    }
}

/// Drains the job queue within a per-frame budget.
pub struct FrameDriver<G, Me, B> {
    generator: G,
    mesher: Me,
    baker: B,
    jobs_per_frame: usize,
}

impl<G, Me, B> FrameDriver<G, Me, B> {
    /// # Panics
    ///
    /// Panics if `jobs_per_frame` is zero.
    pub fn new(generator: G, mesher: Me, baker: B, jobs_per_frame: usize) -> Self {
        assert!(jobs_per_frame > 0, "job budget must allow at least one job");
        Self {
            generator,
            mesher,
            baker,
            jobs_per_frame,
        }
    }

    pub fn from_config(config: &StreamingConfig, generator: G, mesher: Me, baker: B) -> Self {
        Self::new(generator, mesher, baker, config.jobs_per_frame)
    }

    pub fn jobs_per_frame(&self) -> usize {
        self.jobs_per_frame
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    pub fn mesher(&self) -> &Me {
        &self.mesher
    }

    pub fn baker(&self) -> &B {
        &self.baker
    }

    /// Process up to `jobs_per_frame` live jobs from the tree's queue.
    pub fn process_jobs<M>(&mut self, tree: &mut VisTree, pool: &mut GeomPool<M>) -> FrameReport
    where
        G: VoxelGenerator,
        Me: GeomMesher<G::Volume>,
        B: GeomBaker<M>,
    {
        let mut report = FrameReport::default();

        while report.processed < self.jobs_per_frame {
            let Some(job) = tree.pop_job() else {
                break;
            };
            if !tree.is_job_live(&job) {
                report.skipped_stale += 1;
                continue;
            }
            report.processed += 1;

            let Some(slots) = self.run_job(&job, pool, &mut report) else {
                tree.cancel_job(&job);
                report.pool_exhausted += 1;
                tracing::debug!(node = %job.node, "geometry pool exhausted, job retried next frame");
                break;
            };

            match tree.apply_geoms(pool, &job, &slots) {
                Ok(ApplyOutcome::Installed) => report.installed += 1,
                Ok(ApplyOutcome::Stale) => report.stale_completions += 1,
                Err(err) => tracing::warn!(node = %job.node, %err, "failed to apply geometry"),
            }
        }

        if report.processed > 0 || report.skipped_stale > 0 {
            tracing::trace!(
                processed = report.processed,
                skipped = report.skipped_stale,
                remaining = tree.job_count(),
                "frame jobs done"
            );
        }
        report
    }

    /// Generate, mesh and bake one job. `None` if the pool ran out midway;
    /// any slots taken for the job are released again.
    fn run_job<M>(
        &mut self,
        job: &GeomGenJob,
        pool: &mut GeomPool<M>,
        report: &mut FrameReport,
    ) -> Option<Vec<SlotIndex>>
    where
        G: VoxelGenerator,
        Me: GeomMesher<G::Volume>,
        B: GeomBaker<M>,
    {
        let volume = self.generator.generate(&job.bounds, job.level);
        self.mesher.start_volume(&volume, job);

        let mut slots = Vec::with_capacity(NUM_GEOMS);
        let mut dropped = 0;
        loop {
            let chunk = self.mesher.meshify();
            if chunk.num_quads > 0 {
                if slots.len() == NUM_GEOMS {
                    dropped += 1;
                } else {
                    let Ok(slot) = pool.allocate() else {
                        for slot in slots {
                            pool.release(slot);
                        }
                        return None;
                    };
                    if let Ok(geom) = pool.at_mut(slot) {
                        geom.num_quads = chunk.num_quads;
                        geom.params = chunk.params;
                        self.baker.bake(geom, &chunk);
                    }
                    report.quads += u64::from(chunk.num_quads);
                    slots.push(slot);
                }
            }
            if chunk.volume_done {
                break;
            }
        }

        if dropped > 0 {
            tracing::warn!(node = %job.node, dropped, "mesher produced more chunks than a node holds");
            report.pieces_dropped += dropped;
        }
        Some(slots)
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec2;

    use super::*;
    use crate::metric::ScreenErrorMetric;
    use crate::vis_tree::TreeSettings;

    /// Generator whose "volume" is just the list of quad counts the mesher should emit.
    struct ScriptedGenerator {
        pieces: Vec<u32>,
        calls: usize,
    }

    impl VoxelGenerator for ScriptedGenerator {
        type Volume = Vec<u32>;

        fn generate(&mut self, _bounds: &BoundsRect, _level: u8) -> Vec<u32> {
            self.calls += 1;
            self.pieces.clone()
        }
    }

    #[derive(Default)]
    struct ScriptedMesher {
        queue: Vec<u32>,
        staging: Vec<u8>,
    }

    impl GeomMesher<Vec<u32>> for ScriptedMesher {
        fn start_volume(&mut self, volume: &Vec<u32>, _job: &GeomGenJob) {
            self.queue = volume.iter().rev().copied().collect();
        }

        fn meshify(&mut self) -> MeshChunk<'_> {
            let num_quads = self.queue.pop().unwrap_or(0);
            self.staging.clear();
            self.staging.resize(num_quads as usize * 16, 0xAB);
            MeshChunk {
                vertices: &self.staging,
                num_quads,
                params: GeomParams::default(),
                volume_done: self.queue.is_empty(),
            }
        }
    }

    /// Copies staged vertices into the slot's CPU-side buffer.
    struct VecBaker;

    impl GeomBaker<Vec<u8>> for VecBaker {
        fn bake(&mut self, slot: &mut GeomSlot<Vec<u8>>, chunk: &MeshChunk<'_>) {
            slot.mesh.clear();
            slot.mesh.extend_from_slice(chunk.vertices);
        }
    }

    fn setup(
        pieces: Vec<u32>,
        pool_slots: usize,
        jobs_per_frame: usize,
    ) -> (
        VisTree,
        GeomPool<Vec<u8>>,
        FrameDriver<ScriptedGenerator, ScriptedMesher, VecBaker>,
    ) {
        let tree = VisTree::new(TreeSettings {
            num_levels: 2,
            chunk_size: 8,
            max_nodes: 64,
            metric: ScreenErrorMetric::with_constant(100.0, 10.0),
        });
        let pool = GeomPool::new(pool_slots, |_| Vec::new());
        let driver = FrameDriver::new(
            ScriptedGenerator { pieces, calls: 0 },
            ScriptedMesher::default(),
            VecBaker,
            jobs_per_frame,
        );
        (tree, pool, driver)
    }

    #[test]
    fn test_budget_limits_jobs_per_frame() {
        let (mut tree, mut pool, mut driver) = setup(vec![4], 64, 2);
        tree.traverse(&mut pool, Vec2::ZERO);
        let queued = tree.job_count();
        assert!(queued > 2, "scenario should queue more jobs than the budget");

        let report = driver.process_jobs(&mut tree, &mut pool);
        assert_eq!(report.processed, 2);
        assert_eq!(report.installed, 2);
        assert_eq!(tree.job_count(), queued - 2);
        assert_eq!(driver.generator().calls, 2);
    }

    #[test]
    fn test_reports_accumulate() {
        let (mut tree, mut pool, mut driver) = setup(vec![4], 64, 2);
        tree.traverse(&mut pool, Vec2::ZERO);
        let mut totals = FrameReport::default();
        totals += driver.process_jobs(&mut tree, &mut pool);
        totals += driver.process_jobs(&mut tree, &mut pool);
        assert_eq!(totals.installed, 4);
        assert_eq!(totals.quads, 16);
    }

    #[test]
    fn test_chunks_baked_into_distinct_slots() {
        let (mut tree, mut pool, mut driver) = setup(vec![3, 0, 5], 64, 1);
        tree.traverse(&mut pool, Vec2::ZERO);
        let job = *tree.pending_jobs().last().unwrap();

        let report = driver.process_jobs(&mut tree, &mut pool);
        assert_eq!(report.installed, 1);
        assert_eq!(report.quads, 8);

        let slots: Vec<_> = tree.node(job.node).slots().collect();
        assert_eq!(slots.len(), 2);
        assert_eq!(pool.at(slots[0]).unwrap().num_quads, 3);
        assert_eq!(pool.at(slots[1]).unwrap().mesh.len(), 5 * 16);
    }

    #[test]
    fn test_stale_jobs_skipped_without_generating() {
        let (mut tree, mut pool, mut driver) = setup(vec![1], 64, 4);
        tree.traverse(&mut pool, Vec2::ZERO);
        let queued = tree.job_count();
        let root = tree.root();
        tree.merge(&mut pool, root);

        let report = driver.process_jobs(&mut tree, &mut pool);
        assert_eq!(report.processed, 0);
        assert_eq!(report.skipped_stale, queued);
        assert_eq!(driver.generator().calls, 0);
        assert_eq!(pool.in_use_count(), 0);
    }

    #[test]
    fn test_pool_exhaustion_cancels_and_requeues() {
        let (mut tree, mut pool, mut driver) = setup(vec![2, 2], 3, 8);
        tree.traverse(&mut pool, Vec2::ZERO);

        let report = driver.process_jobs(&mut tree, &mut pool);
        assert_eq!(report.installed, 1);
        assert_eq!(report.pool_exhausted, 1);
        assert_eq!(pool.in_use_count(), 2, "partial slots must be released");

        // The cancelled node is queued again on the next traversal.
        let stats = tree.traverse(&mut pool, Vec2::ZERO);
        assert_eq!(stats.jobs_queued, 1);
    }

    #[test]
    fn test_excess_chunks_dropped() {
        let (mut tree, mut pool, mut driver) = setup(vec![1, 1, 1, 1, 1], 64, 1);
        tree.traverse(&mut pool, Vec2::ZERO);
        let report = driver.process_jobs(&mut tree, &mut pool);
        assert_eq!(report.pieces_dropped, 2);
        assert_eq!(pool.in_use_count(), NUM_GEOMS);
    }

    #[test]
    fn test_empty_volume_confirms_node_empty() {
        let (mut tree, mut pool, mut driver) = setup(vec![0], 64, 1);
        tree.traverse(&mut pool, Vec2::ZERO);
        let job = *tree.pending_jobs().last().unwrap();
        driver.process_jobs(&mut tree, &mut pool);
        assert!(tree.node(job.node).is_confirmed_empty());
        assert_eq!(pool.in_use_count(), 0);
    }
}
