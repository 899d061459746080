//! Data-parallel CPU rendition of every pass.
//!
//! Each function runs one rayon task per element of the matching kernel and calls the same
//! `pathtracer_shared` routines, so results can be compared with the GPU buffers and the
//! properties of the pipeline can be checked without an adapter.

use std::sync::atomic::{AtomicU32, Ordering};

use log::{debug, info, trace};
use pathtracer_shared::glam::{Vec3, Vec4};
use pathtracer_shared::karras::{build_node, leaf_bounds};
use pathtracer_shared::lines::{box_lines, node_level};
use pathtracer_shared::morton::triangle_morton_code;
use pathtracer_shared::radix::{count_slot, digit, scan_block, slice_count, SCAN_BLOCK};
use pathtracer_shared::reduce::{reduce_bounds_block, reduce_points_block};
use pathtracer_shared::trace::{accumulate, trace_pixel, TraversalStats};
use pathtracer_shared::{Aabb, BvhNode, CameraUniform, PathTracerConfig};
use rayon::prelude::*;

use crate::config::RenderConfig;
use crate::debug::{BvhLines, DebugStats};
use crate::error::{RenderError, Result};
use crate::reduce::level_plan;
use crate::renderer::ProgressiveState;
use crate::scene::Scene;

/// Bounds of every point in `positions`, folded `block_size` points per task and level.
pub fn reduce_bounds(positions: &[f32], block_size: u32) -> Aabb {
    let point_count = (positions.len() / 3) as u32;
    let mut partial: Vec<Aabb> = Vec::new();

    for (level, params) in level_plan(point_count, block_size).iter().enumerate() {
        partial = if level == 0 {
            (0..params.output_len)
                .into_par_iter()
                .map(|block| reduce_points_block(positions, params.input_len, block, params.block_size))
                .collect()
        } else {
            (0..params.output_len)
                .into_par_iter()
                .map(|block| reduce_bounds_block(&partial, params.input_len, block, params.block_size))
                .collect()
        };
    }

    partial.first().copied().unwrap_or(Aabb::EMPTY)
}

pub fn morton_codes(positions: &[f32], indices: &[u32], scene_bounds: &Aabb) -> Vec<u32> {
    let triangle_count = (indices.len() / 3) as u32;
    (0..triangle_count)
        .into_par_iter()
        .map(|triangle| triangle_morton_code(positions, indices, scene_bounds, triangle))
        .collect()
}

/// In-place exclusive prefix sum: per-block Blelloch scans, the block totals scanned
/// recursively, then added back to every block after the first.
pub fn exclusive_scan(data: &mut [u32]) {
    let sums: Vec<u32> = data
        .par_chunks_mut(SCAN_BLOCK)
        .map(|chunk| {
            let mut pref = [0u32; SCAN_BLOCK];
            pref[..chunk.len()].copy_from_slice(chunk);
            let total = scan_block(&mut pref);
            chunk.copy_from_slice(&pref[..chunk.len()]);
            total
        })
        .collect();

    if sums.len() > 1 {
        let mut sums = sums;
        exclusive_scan(&mut sums);
        data.par_chunks_mut(SCAN_BLOCK)
            .zip(sums.par_iter())
            .skip(1)
            .for_each(|(chunk, &offset)| chunk.iter_mut().for_each(|v| *v = v.wrapping_add(offset)));
    }
}

/// Stable ascending sort of `keys`, returning the sorted keys and the original index of each.
///
/// Eight 4-bit digit passes of count, scan and scatter over W-key slices.
pub fn radix_sort(keys: &[u32]) -> (Vec<u32>, Vec<u32>) {
    let len = keys.len() as u32;
    let mut keys_in = keys.to_vec();
    let mut ids_in: Vec<u32> = (0..len).collect();
    if len <= 1 {
        return (keys_in, ids_in);
    }

    let slices = slice_count(len);
    let width = PathTracerConfig::SORT_WORKGROUP_SIZE as usize;

    for pass in 0..PathTracerConfig::RADIX_PASSES {
        let table: Vec<AtomicU32> = (0..PathTracerConfig::RADIX * slices).map(|_| AtomicU32::new(0)).collect();
        keys_in.par_iter().enumerate().for_each(|(i, &key)| {
            let slot = count_slot(digit(key, pass), i as u32 / PathTracerConfig::SORT_WORKGROUP_SIZE, slices);
            table[slot].fetch_add(1, Ordering::Relaxed);
        });
        let mut offsets: Vec<u32> = table.into_iter().map(AtomicU32::into_inner).collect();
        exclusive_scan(&mut offsets);

        let placements: Vec<(usize, u32, u32)> = (0..slices)
            .into_par_iter()
            .flat_map_iter(|slice| {
                let mut next: Vec<u32> = (0..PathTracerConfig::RADIX)
                    .map(|d| offsets[count_slot(d, slice, slices)])
                    .collect();
                let start = slice as usize * width;
                let end = keys_in.len().min(start + width);
                (start..end)
                    .map(|i| {
                        let d = digit(keys_in[i], pass) as usize;
                        let position = next[d] as usize;
                        next[d] += 1;
                        (position, keys_in[i], ids_in[i])
                    })
                    .collect::<Vec<_>>()
            })
            .collect();

        let mut keys_out = vec![0u32; keys_in.len()];
        let mut ids_out = vec![0u32; ids_in.len()];
        for (position, key, id) in placements {
            keys_out[position] = key;
            ids_out[position] = id;
        }
        keys_in = keys_out;
        ids_in = ids_out;
    }

    (keys_in, ids_in)
}

/// Internal nodes of the radix tree over `sorted_codes`, parents linked.
pub fn build_nodes(sorted_codes: &[u32], sorted_ids: &[u32]) -> Vec<BvhNode> {
    let leaves = sorted_codes.len() as u32;
    if leaves < 2 {
        return Vec::new();
    }

    let mut nodes: Vec<BvhNode> = (0..leaves - 1)
        .into_par_iter()
        .map(|node| build_node(sorted_codes, sorted_ids, leaves, node))
        .collect();

    let links: Vec<(usize, u32)> = nodes
        .iter()
        .enumerate()
        .flat_map(|(index, node)| {
            let left = (!node.left_leaf()).then_some((node.left as usize, index as u32));
            let right = (!node.right_leaf()).then_some((node.right as usize, index as u32));
            left.into_iter().chain(right)
        })
        .collect();
    for (child, parent) in links {
        nodes[child].parent = parent;
    }
    nodes
}

/// Node box stored as raw f32 bits so concurrent walks can publish it.
struct SharedBounds([AtomicU32; 6]);

impl SharedBounds {
    fn new() -> Self {
        Self(std::array::from_fn(|_| AtomicU32::new(0)))
    }

    fn store(&self, aabb: &Aabb) {
        let values = aabb.min.iter().chain(aabb.max.iter());
        for (slot, value) in self.0.iter().zip(values) {
            slot.store(value.to_bits(), Ordering::Relaxed);
        }
    }

    fn load(&self) -> Aabb {
        let v: [f32; 6] = std::array::from_fn(|i| f32::from_bits(self.0[i].load(Ordering::Relaxed)));
        Aabb::new([v[0], v[1], v[2]], [v[3], v[4], v[5]])
    }
}

/// Bottom-up node bounds with the first-arrival-yields protocol of the refit kernel.
pub fn refit_bounds(nodes: &[BvhNode], positions: &[f32], indices: &[u32]) -> Vec<Aabb> {
    let bounds: Vec<SharedBounds> = nodes.iter().map(|_| SharedBounds::new()).collect();
    let arrivals: Vec<AtomicU32> = nodes.iter().map(|_| AtomicU32::new(0)).collect();

    let child = |is_leaf: bool, index: u32| {
        if is_leaf {
            leaf_bounds(positions, indices, index)
        } else {
            bounds[index as usize].load()
        }
    };
    let merged = |node: &BvhNode| child(node.left_leaf(), node.left).union(&child(node.right_leaf(), node.right));

    (0..nodes.len()).into_par_iter().for_each(|start| {
        let node = &nodes[start];
        if !node.is_leaf_parent() {
            return;
        }
        bounds[start].store(&merged(node));

        let mut current = start;
        while current != 0 {
            let parent = nodes[current].parent as usize;
            let parent_node = &nodes[parent];
            if !parent_node.left_leaf() && !parent_node.right_leaf() {
                // the sibling subtree is not finished yet; its walk completes the parent
                if arrivals[parent].fetch_add(1, Ordering::AcqRel) == 0 {
                    return;
                }
            }
            bounds[parent].store(&merged(parent_node));
            current = parent;
        }
    });

    bounds.iter().map(SharedBounds::load).collect()
}

/// Every intermediate of one LBVH build
#[derive(Clone, Debug, Default)]
pub struct CpuBvh {
    pub scene_bounds: Aabb,
    pub codes: Vec<u32>,
    pub sorted_codes: Vec<u32>,
    pub sorted_ids: Vec<u32>,
    pub nodes: Vec<BvhNode>,
    pub node_bounds: Vec<Aabb>,
}

impl CpuBvh {
    pub fn build(scene: &Scene, block_size: u32) -> Self {
        let scene_bounds = reduce_bounds(&scene.positions, block_size);
        let codes = morton_codes(&scene.positions, &scene.indices, &scene_bounds);
        let (sorted_codes, sorted_ids) = radix_sort(&codes);
        let nodes = build_nodes(&sorted_codes, &sorted_ids);
        let node_bounds = refit_bounds(&nodes, &scene.positions, &scene.indices);
        debug!(
            "CPU LBVH: {} triangles, {} internal nodes",
            codes.len(),
            nodes.len()
        );

        Self {
            scene_bounds,
            codes,
            sorted_codes,
            sorted_ids,
            nodes,
            node_bounds,
        }
    }

    /// Same layout the line kernel writes: 24 vertices and a depth per internal node.
    pub fn lines(&self) -> BvhLines {
        let (vertices, levels) = (0..self.nodes.len())
            .into_par_iter()
            .map(|index| {
                let level = node_level(&self.nodes, index as u32);
                (box_lines(&self.node_bounds[index]), level)
            })
            .fold(
                || (Vec::new(), Vec::new()),
                |(mut vertices, mut levels): (Vec<Vec4>, Vec<u32>), (lines, level)| {
                    vertices.extend_from_slice(&lines);
                    levels.extend(std::iter::repeat(level).take(lines.len()));
                    (vertices, levels)
                },
            )
            .reduce(
                || (Vec::new(), Vec::new()),
                |(mut vertices, mut levels), (more_vertices, more_levels)| {
                    vertices.extend(more_vertices);
                    levels.extend(more_levels);
                    (vertices, levels)
                },
            );
        BvhLines { vertices, levels }
    }
}

/// Progressive renderer running the whole pipeline on the CPU thread pool
///
/// Mirrors [`crate::Renderer`]: `set_scene` rebuilds the tree on the next `render`, a camera
/// change or resize restarts accumulation at frame 1.
pub struct CpuRenderer {
    config: RenderConfig,
    scene: Scene,
    bvh: CpuBvh,
    cumulative: Vec<Vec4>,
    display: Vec<Vec4>,
    depth: Vec<f32>,
    progressive: ProgressiveState,
    stats: DebugStats,
    geometry_dirty: bool,
}

impl CpuRenderer {
    pub fn new(config: RenderConfig) -> Self {
        let pixels = config.pixel_count();
        Self {
            config,
            scene: Scene::default(),
            bvh: CpuBvh::default(),
            cumulative: vec![Vec4::ZERO; pixels],
            display: vec![Vec4::ZERO; pixels],
            depth: vec![PathTracerConfig::INFINITY; pixels],
            progressive: ProgressiveState::default(),
            stats: DebugStats::default(),
            geometry_dirty: false,
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn set_scene(&mut self, scene: &Scene) -> Result<()> {
        scene.validate()?;
        self.scene = scene.clone();
        self.geometry_dirty = true;
        self.progressive.trigger_reset();
        info!(
            "CPU scene set: {} vertices, {} triangles",
            scene.vertex_count(),
            scene.triangle_count()
        );
        Ok(())
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.config = self.config.clone().with_size(width, height);
        let pixels = self.config.pixel_count();
        self.cumulative = vec![Vec4::ZERO; pixels];
        self.display = vec![Vec4::ZERO; pixels];
        self.depth = vec![PathTracerConfig::INFINITY; pixels];
        self.progressive.trigger_reset();
    }

    /// Adds one frame to the accumulation and returns its 1-based frame number.
    pub fn render(&mut self, camera: &CameraUniform) -> u32 {
        if self.geometry_dirty {
            self.bvh = CpuBvh::build(&self.scene, self.config.reduce_block_size);
            self.geometry_dirty = false;
        }

        let (frame, reset) = self.progressive.advance(camera);
        if reset {
            debug!("Accumulation reset");
            self.cumulative.par_iter_mut().for_each(|sum| *sum = Vec4::ZERO);
        }

        let view = self.scene.view(&self.bvh.nodes, &self.bvh.node_bounds);
        let (width, height) = (self.config.width, self.config.height);
        let bounces = self.config.bounces;
        let debug = self.config.debug;

        let (max_checks, total_checks, max_stack_depth) = self
            .cumulative
            .par_iter_mut()
            .zip(self.display.par_iter_mut())
            .zip(self.depth.par_iter_mut())
            .enumerate()
            .map(|(pixel, ((sum, shown), depth))| {
                let x = pixel as u32 % width;
                let y = pixel as u32 / width;
                let mut stats = TraversalStats::default();
                let sample = if debug {
                    trace_pixel::<true>(&view, camera, x, y, width, height, frame, bounces, &mut stats)
                } else {
                    trace_pixel::<false>(&view, camera, x, y, width, height, frame, bounces, &mut stats)
                };
                let (total, mean) = accumulate(*sum, sample.radiance, frame);
                *sum = total;
                *shown = mean;
                *depth = sample.depth;
                (stats.checks, stats.checks as u64, stats.max_stack_depth)
            })
            .reduce(
                || (0, 0, 0),
                |a, b| (a.0.max(b.0), a.1 + b.1, a.2.max(b.2)),
            );

        if debug {
            let counters = [max_checks, total_checks as u32, max_stack_depth];
            self.stats = DebugStats::from_counters(&counters, self.config.pixel_count());
            trace!("CPU frame {}: {:?}", frame, self.stats);
        }
        frame
    }

    pub fn frame(&self) -> u32 {
        self.progressive.frame()
    }

    pub fn bvh(&self) -> &CpuBvh {
        &self.bvh
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    /// Mean radiance per pixel after the current frame.
    pub fn read_radiance(&self) -> Vec<Vec4> {
        self.display.clone()
    }

    /// Primary hit depth per pixel of the last frame, laid out like [`crate::Renderer::read_depth`].
    pub fn read_depth(&self) -> Vec<f32> {
        self.depth.clone()
    }

    /// 8 bit RGBA quantized like the output storage texture.
    pub fn read_image(&self) -> Result<image::RgbaImage> {
        let pixels: Vec<u8> = self
            .display
            .iter()
            .flat_map(|color| color.to_array())
            .map(|c| (c.clamp(0.0, 1.0) * 255.0 + 0.5) as u8)
            .collect();
        image::RgbaImage::from_raw(self.config.width, self.config.height, pixels).ok_or_else(|| {
            RenderError::Image(image::ImageError::Parameter(image::error::ParameterError::from_kind(
                image::error::ParameterErrorKind::DimensionMismatch,
            )))
        })
    }

    pub fn debug_stats(&self) -> Result<DebugStats> {
        if !self.config.debug {
            return Err(RenderError::DebugDisabled);
        }
        Ok(self.stats)
    }

    pub fn bvh_lines(&self) -> Result<BvhLines> {
        if !self.config.debug {
            return Err(RenderError::DebugDisabled);
        }
        Ok(self.bvh.lines())
    }

    /// Primary hit point of pixel `(x, y)` and the object it belongs to.
    pub fn primary_hit(&self, camera: &CameraUniform, x: u32, y: u32) -> Option<(Vec3, u32)> {
        let view = self.scene.view(&self.bvh.nodes, &self.bvh.node_bounds);
        let ray = camera.primary_ray(x, y, self.config.width, self.config.height);
        let hit = view.intersect::<false>(&ray, &mut TraversalStats::default());
        hit.is_hit()
            .then(|| (hit.point, self.scene.triangle_to_object[hit.triangle as usize]))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::scene::SceneBuilder;
    use pathtracer_shared::glam::vec3;
    use pathtracer_shared::rng::Rng;
    use pathtracer_shared::Material;

    fn random_keys(len: usize, seed: u32, modulus: u32) -> Vec<u32> {
        let mut rng = Rng::new(seed);
        (0..len).map(|_| rng.next_u32() % modulus).collect()
    }

    fn assert_sorted(keys: &[u32]) {
        let (sorted, ids) = radix_sort(keys);
        assert_eq!(sorted.len(), keys.len());
        assert!(sorted.windows(2).all(|w| w[0] <= w[1]));
        for (i, &id) in ids.iter().enumerate() {
            assert_eq!(keys[id as usize], sorted[i]);
        }
        for i in 1..ids.len() {
            if sorted[i - 1] == sorted[i] {
                assert!(ids[i - 1] < ids[i], "equal keys out of input order at {}", i);
            }
        }
    }

    #[test]
    fn test_radix_sort_random_and_duplicates() {
        for &len in &[2usize, 3, 127, 128, 129, 1000, 5000, 40_000] {
            assert_sorted(&random_keys(len, len as u32, u32::MAX));
            assert_sorted(&random_keys(len, 7 + len as u32, 7));
        }
        assert_sorted(&[5, 5, 5, 5]);
        assert_sorted(&[u32::MAX, 0, u32::MAX, 1]);
    }

    #[test]
    fn test_radix_sort_empty_and_single() {
        assert_eq!(radix_sort(&[]), (vec![], vec![]));
        assert_eq!(radix_sort(&[42]), (vec![42], vec![0]));
    }

    #[test]
    fn test_exclusive_scan_multi_level() {
        for &len in &[1usize, 255, 256, 257, 70_000] {
            let values = random_keys(len, 3, 10);
            let mut scanned = values.clone();
            exclusive_scan(&mut scanned);
            let mut acc = 0;
            for (i, &v) in values.iter().enumerate() {
                assert_eq!(scanned[i], acc, "len {} index {}", len, i);
                acc += v;
            }
        }
    }

    #[test]
    fn test_reduction_independent_of_block_size() {
        let mut rng = Rng::new(11);
        let positions: Vec<f32> = (0..3 * 10_001).map(|_| rng.next_f32() * 20.0 - 10.0).collect();
        let expected = positions
            .chunks_exact(3)
            .fold(Aabb::EMPTY, |acc, p| acc.grow(vec3(p[0], p[1], p[2])));

        for block_size in [2, 3, 16, 128, 1000, 20_000] {
            assert_eq!(reduce_bounds(&positions, block_size), expected, "block size {}", block_size);
        }
        assert_eq!(reduce_bounds(&positions[..3], 128), Aabb::from_point(vec3(positions[0], positions[1], positions[2])));
    }

    fn assert_tree_invariants(nodes: &[BvhNode], leaves: usize) {
        assert_eq!(nodes.len(), leaves - 1);
        let mut leaf_seen = vec![0; leaves];
        let mut parents = vec![0; nodes.len()];
        for (index, node) in nodes.iter().enumerate() {
            for (is_leaf, child) in [(node.left_leaf(), node.left), (node.right_leaf(), node.right)] {
                if is_leaf {
                    leaf_seen[child as usize] += 1;
                } else {
                    parents[child as usize] += 1;
                    assert_eq!(nodes[child as usize].parent, index as u32);
                }
            }
        }
        assert!(leaf_seen.iter().all(|&c| c == 1));
        assert_eq!(parents[0], 0);
        assert!(parents[1..].iter().all(|&c| c == 1));
        assert_eq!(nodes[0].parent, BvhNode::NO_PARENT);
        for index in 0..nodes.len() as u32 {
            assert!(node_level(nodes, index) < leaves as u32);
        }
    }

    #[test]
    fn test_bvh_invariants_cornell_box() {
        let scene = Scene::cornell_box();
        let bvh = CpuBvh::build(&scene, 16);
        assert_tree_invariants(&bvh.nodes, scene.triangle_count() as usize);
        assert_eq!(bvh.scene_bounds, scene.bounds());
    }

    #[test]
    fn test_bvh_invariants_duplicate_codes() {
        let codes = vec![0xABCD; 300];
        let ids: Vec<u32> = (0..300).collect();
        assert_tree_invariants(&build_nodes(&codes, &ids), 300);

        let (sorted, ids) = radix_sort(&random_keys(1000, 5, 4));
        assert_tree_invariants(&build_nodes(&sorted, &ids), 1000);

        assert!(build_nodes(&[1], &[0]).is_empty());
        assert!(build_nodes(&[], &[]).is_empty());
    }

    #[test]
    fn test_bounds_contain_children() {
        let scene = Scene::cornell_box();
        let bvh = CpuBvh::build(&scene, PathTracerConfig::REDUCE_BLOCK_SIZE);

        let mut stack = vec![0usize];
        while let Some(index) = stack.pop() {
            let node = bvh.nodes[index];
            let outer = bvh.node_bounds[index];
            assert!(outer.is_valid());
            for (is_leaf, child) in [(node.left_leaf(), node.left), (node.right_leaf(), node.right)] {
                if is_leaf {
                    assert!(outer.contains(&leaf_bounds(&scene.positions, &scene.indices, child)));
                } else {
                    assert!(outer.contains(&bvh.node_bounds[child as usize]));
                    stack.push(child as usize);
                }
            }
        }
        assert!(bvh.scene_bounds.contains(&bvh.node_bounds[0]));
    }

    #[test]
    fn test_trace_is_deterministic() {
        let scene = Scene::cornell_box();
        let camera = scene.camera.unwrap_or_default();
        let config = RenderConfig::default().with_size(24, 16).with_bounces(3);

        let mut first = CpuRenderer::new(config.clone());
        let mut second = CpuRenderer::new(config);
        first.set_scene(&scene).unwrap();
        second.set_scene(&scene).unwrap();
        for _ in 0..3 {
            first.render(&camera);
            second.render(&camera);
        }

        let bits = |r: &CpuRenderer| -> Vec<u32> {
            r.read_radiance().iter().flat_map(|c| c.to_array()).map(f32::to_bits).collect()
        };
        assert_eq!(bits(&first), bits(&second));
    }

    #[test]
    fn test_progressive_convergence_and_reset() {
        let mut builder = SceneBuilder::new();
        builder.add_triangle(
            vec3(-1.0, -1.0, 0.0),
            vec3(1.0, -1.0, 0.0),
            vec3(0.0, 1.0, 0.0),
            Material::emissive([0.5; 3], 2.0),
        );
        let scene = builder.build();
        let camera = CameraUniform::look_at(vec3(0.0, 0.0, 3.0), Vec3::ZERO, Vec3::Y, 60.0, 0.1, 100.0);
        let mut renderer = CpuRenderer::new(RenderConfig::default().with_size(16, 16).with_bounces(0));
        renderer.set_scene(&scene).unwrap();

        assert_eq!(renderer.render(&camera), 1);
        let single = renderer.read_radiance();
        for _ in 1..100 {
            renderer.render(&camera);
        }
        assert_eq!(renderer.frame(), 100);
        let averaged = renderer.read_radiance();
        for (a, b) in single.iter().zip(&averaged) {
            assert!((*a - *b).abs().max_element() < 1e-5);
        }
        assert!(single.iter().any(|c| c.x > 0.99));
        assert!(single.iter().any(|c| c.x == 0.0));

        let moved = CameraUniform::look_at(vec3(0.0, 0.0, 4.0), Vec3::ZERO, Vec3::Y, 60.0, 0.1, 100.0);
        assert_eq!(renderer.render(&moved), 1);
        assert_eq!(renderer.render(&moved), 2);
    }

    #[test]
    fn test_emissive_sphere_falloff() {
        let mut builder = SceneBuilder::new();
        let plane = builder.add_quad(vec3(-4.0, 0.0, -4.0), vec3(0.0, 0.0, 8.0), vec3(8.0, 0.0, 0.0), Material::diffuse([0.8; 3]));
        let light = vec3(-2.0, 0.8, 0.0);
        builder.add_uv_sphere(light, 0.5, 12, 24, Material::emissive([1.0; 3], 5.0));
        let scene = builder.build();

        let camera = CameraUniform::look_at(vec3(0.0, 7.0, 3.0), Vec3::ZERO, Vec3::Y, 60.0, 0.1, 100.0);
        let config = RenderConfig::default().with_size(48, 48).with_bounces(2);
        let mut renderer = CpuRenderer::new(config);
        renderer.set_scene(&scene).unwrap();
        for _ in 0..32 {
            renderer.render(&camera);
        }
        let radiance = renderer.read_radiance();

        let (mut near, mut far) = (Vec::new(), Vec::new());
        for y in 0..48 {
            for x in 0..48 {
                let Some((point, object)) = renderer.primary_hit(&camera, x, y) else {
                    continue;
                };
                if object != plane {
                    continue;
                }
                let distance = (point - vec3(light.x, 0.0, light.z)).length();
                let value = radiance[(y * 48 + x) as usize].truncate().length();
                if distance < 1.5 {
                    near.push(value);
                } else if distance > 4.0 {
                    far.push(value);
                }
            }
        }

        assert!(!near.is_empty() && !far.is_empty());
        let mean = |v: &[f32]| v.iter().sum::<f32>() / v.len() as f32;
        assert!(mean(&near) > mean(&far), "near {} far {}", mean(&near), mean(&far));
    }

    #[test]
    fn test_debug_gated_entry_points() {
        let scene = Scene::cornell_box();
        let camera = scene.camera.unwrap_or_default();

        let mut plain = CpuRenderer::new(RenderConfig::default().with_size(8, 8));
        plain.set_scene(&scene).unwrap();
        plain.render(&camera);
        assert!(matches!(plain.debug_stats(), Err(RenderError::DebugDisabled)));
        assert!(matches!(plain.bvh_lines(), Err(RenderError::DebugDisabled)));

        let mut debug = CpuRenderer::new(RenderConfig::default().with_size(8, 8).with_debug(true));
        debug.set_scene(&scene).unwrap();
        debug.render(&camera);
        let stats = debug.debug_stats().unwrap();
        assert!(stats.max_checks > 0);
        assert!(stats.total_checks >= stats.max_checks);
        assert!(stats.max_stack_depth >= 1);

        let lines = debug.bvh_lines().unwrap();
        assert_eq!(lines.node_count(), debug.bvh().nodes.len());
        assert_eq!(lines.levels.len(), lines.vertices.len());
    }

    #[test]
    fn test_resize_restarts_accumulation() {
        let scene = Scene::cornell_box();
        let camera = scene.camera.unwrap_or_default();
        let mut renderer = CpuRenderer::new(RenderConfig::default().with_size(8, 8));
        renderer.set_scene(&scene).unwrap();
        renderer.render(&camera);
        assert_eq!(renderer.render(&camera), 2);

        renderer.resize(12, 6);
        assert_eq!(renderer.render(&camera), 1);
        let image = renderer.read_image().unwrap();
        assert_eq!(image.dimensions(), (12, 6));
    }

    #[test]
    fn test_depth_matches_primary_hit_and_resizes() {
        let scene = Scene::cornell_box();
        let camera = scene.camera.unwrap_or_default();
        let mut renderer = CpuRenderer::new(RenderConfig::default().with_size(8, 8));
        renderer.set_scene(&scene).unwrap();
        renderer.render(&camera);

        let depth = renderer.read_depth();
        assert_eq!(depth.len(), 64);
        for (pixel, &d) in depth.iter().enumerate() {
            let (x, y) = (pixel as u32 % 8, pixel as u32 / 8);
            match renderer.primary_hit(&camera, x, y) {
                Some((point, _)) => assert!((d - camera.depth(point)).abs() < 1e-4),
                None => assert_eq!(d, PathTracerConfig::INFINITY),
            }
        }
        assert!(depth.iter().any(|&d| d < PathTracerConfig::INFINITY));

        renderer.resize(6, 4);
        assert!(renderer.read_depth().iter().all(|&d| d == PathTracerConfig::INFINITY));
        renderer.render(&camera);
        assert_eq!(renderer.read_depth().len(), 24);
    }

    #[test]
    fn test_line_levels_select_tree_depths() {
        let scene = Scene::cornell_box();
        let mut renderer = CpuRenderer::new(RenderConfig::default().with_size(4, 4).with_debug(true));
        renderer.set_scene(&scene).unwrap();
        renderer.render(&scene.camera.unwrap_or_default());

        let nodes = &renderer.bvh().nodes;
        let depths: Vec<u32> = (0..nodes.len() as u32).map(|i| node_level(nodes, i)).collect();
        let lines = renderer.bvh_lines().unwrap();
        assert_eq!(lines.max_level(), depths.iter().copied().max().unwrap());

        for level in 0..=lines.max_level() + 1 {
            let at = depths.iter().filter(|&&d| d == level).count();
            let up_to = depths.iter().filter(|&&d| d <= level).count();
            assert_eq!(lines.segments(level, false).len(), 12 * at, "level {}", level);
            assert_eq!(lines.segments(level, true).len(), 12 * up_to, "level {} with parents", level);
        }
        assert_eq!(lines.segments(0, false).len(), 12);
    }
}
