//! Eight-pass 4-bit LSD radix sort of the Morton codes, carrying the triangle ids.

use log::debug;
use pathtracer_shared::radix::{slice_count, ScanLevels};
use pathtracer_shared::{div_ceil, PathTracerConfig, ScanParams, SortParams};

use crate::buffers::StorageBuffer;
use crate::compute::{workgroups, Binding, ComputeKernel};

struct ScanLevel {
    params: ScanParams,
    scan: wgpu::BindGroup,
    /// Present when the level has a following sums level to fold back in.
    add_sums: Option<wgpu::BindGroup>,
}

/// Lengths of every scan level over a count table for `len` keys.
pub fn scan_plan(len: u32) -> Vec<u32> {
    if len == 0 {
        return Vec::new();
    }
    ScanLevels::new(PathTracerConfig::RADIX * slice_count(len)).collect()
}

/// Sort resources for one scene size.
///
/// Keys enter in `keys_a` and, after an even number of passes, the sorted keys and their
/// original indices are back in `keys_a` and `ids_a`. The `b` pair is scratch.
pub struct RadixSorter {
    count_kernel: ComputeKernel,
    scan_kernel: ComputeKernel,
    add_sums_kernel: ComputeKernel,
    scatter_kernel: ComputeKernel,
    pub keys_a: StorageBuffer<u32>,
    pub ids_a: StorageBuffer<u32>,
    keys_b: StorageBuffer<u32>,
    ids_b: StorageBuffer<u32>,
    /// Level 0 is the `[digit][slice]` count table, the rest its recursive block sums.
    counts: Vec<StorageBuffer<u32>>,
    unused_sums: StorageBuffer<u32>,
    count_groups: [Option<wgpu::BindGroup>; 2],
    scatter_groups: [Option<wgpu::BindGroup>; 2],
    levels: Vec<ScanLevel>,
    len: u32,
}

impl RadixSorter {
    pub fn new(device: &wgpu::Device, module: &wgpu::ShaderModule) -> Self {
        let count_kernel =
            ComputeKernel::new::<SortParams>(device, module, "radix_count_cs", &[Binding::READ, Binding::WRITE]);
        let scan_kernel =
            ComputeKernel::new::<ScanParams>(device, module, "radix_scan_cs", &[Binding::WRITE, Binding::WRITE]);
        let add_sums_kernel =
            ComputeKernel::new::<ScanParams>(device, module, "radix_add_sums_cs", &[Binding::WRITE, Binding::READ]);
        let scatter_kernel = ComputeKernel::new::<SortParams>(
            device,
            module,
            "radix_scatter_cs",
            &[Binding::READ, Binding::READ, Binding::WRITE, Binding::WRITE, Binding::WRITE],
        );

        Self {
            count_kernel,
            scan_kernel,
            add_sums_kernel,
            scatter_kernel,
            keys_a: StorageBuffer::new(device, "Morton Codes Buffer", 1),
            ids_a: StorageBuffer::new(device, "Sorted Ids Buffer", 1),
            keys_b: StorageBuffer::new(device, "Sort Scratch Keys Buffer", 1),
            ids_b: StorageBuffer::new(device, "Sort Scratch Ids Buffer", 1),
            counts: Vec::new(),
            unused_sums: StorageBuffer::new(device, "Scan Unused Sums Buffer", 1),
            count_groups: [None, None],
            scatter_groups: [None, None],
            levels: Vec::new(),
            len: 0,
        }
    }

    /// Sizes every buffer for `len` keys and rebuilds the bind groups.
    ///
    /// `ids_a` is seeded with the identity so a skipped sort (one key) still reads back the
    /// original order.
    pub fn prepare(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, len: u32) {
        self.len = len;
        let n = len as usize;
        self.keys_a.ensure_capacity(device, n);
        self.keys_b.ensure_capacity(device, n);
        self.ids_b.ensure_capacity(device, n);
        let identity: Vec<u32> = (0..len).collect();
        self.ids_a.write(device, queue, &identity);

        let plan = scan_plan(len);
        debug!("Radix sort of {} keys, scan levels {:?}", len, plan);

        self.counts = plan
            .iter()
            .enumerate()
            .map(|(level, &level_len)| {
                let label = if level == 0 { "Radix Count Table" } else { "Radix Block Sums" };
                let mut buffer = StorageBuffer::new(device, label, level_len as usize);
                buffer.ensure_capacity(device, level_len as usize);
                buffer
            })
            .collect();

        self.levels = (0..self.counts.len())
            .map(|level| {
                let data = &self.counts[level];
                let sums = self.counts.get(level + 1);
                let scan = self
                    .scan_kernel
                    .bind_group(device, &[data.binding(), sums.unwrap_or(&self.unused_sums).binding()]);
                let add_sums = sums.map(|sums| self.add_sums_kernel.bind_group(device, &[data.binding(), sums.binding()]));
                ScanLevel {
                    params: ScanParams {
                        len: data.len() as u32,
                        write_sums: sums.is_some() as u32,
                        _padding: [0; 2],
                    },
                    scan,
                    add_sums,
                }
            })
            .collect();

        let Some(table) = self.counts.first() else {
            self.count_groups = [None, None];
            self.scatter_groups = [None, None];
            return;
        };

        self.count_groups = [
            Some(self.count_kernel.bind_group(device, &[self.keys_a.binding(), table.binding()])),
            Some(self.count_kernel.bind_group(device, &[self.keys_b.binding(), table.binding()])),
        ];
        self.scatter_groups = [
            Some(self.scatter_kernel.bind_group(
                device,
                &[
                    self.keys_a.binding(),
                    self.ids_a.binding(),
                    self.keys_b.binding(),
                    self.ids_b.binding(),
                    table.binding(),
                ],
            )),
            Some(self.scatter_kernel.bind_group(
                device,
                &[
                    self.keys_b.binding(),
                    self.ids_b.binding(),
                    self.keys_a.binding(),
                    self.ids_a.binding(),
                    table.binding(),
                ],
            )),
        ];
    }

    /// Records all digit passes. Nothing is recorded for fewer than two keys.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        if self.len <= 1 {
            return;
        }
        let (Some(table), [Some(count_even), Some(count_odd)], [Some(scatter_even), Some(scatter_odd)]) =
            (self.counts.first(), &self.count_groups, &self.scatter_groups)
        else {
            return;
        };

        // Scatter leaves the table zeroed for the next pass; only the first needs a clear.
        table.clear(encoder);

        let slices = slice_count(self.len);
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Radix Sort Pass"),
        });

        for pass_index in 0..PathTracerConfig::RADIX_PASSES {
            let params = SortParams {
                len: self.len,
                pass_index,
                slices,
                _padding: 0,
            };
            let (count_group, scatter_group) = if pass_index % 2 == 0 {
                (count_even, scatter_even)
            } else {
                (count_odd, scatter_odd)
            };

            self.count_kernel.dispatch(&mut pass, count_group, &params, (slices, 1));

            for level in &self.levels {
                let blocks = div_ceil(level.params.len, PathTracerConfig::SCAN_BLOCK_SIZE);
                self.scan_kernel.dispatch(&mut pass, &level.scan, &level.params, (blocks, 1));
            }
            for level in self.levels.iter().rev() {
                if let Some(add_sums) = &level.add_sums {
                    let blocks = div_ceil(level.params.len, PathTracerConfig::SCAN_BLOCK_SIZE);
                    self.add_sums_kernel.dispatch(&mut pass, add_sums, &level.params, (blocks - 1, 1));
                }
            }

            let groups = workgroups(slices, PathTracerConfig::SORT_WORKGROUP_SIZE);
            self.scatter_kernel.dispatch(&mut pass, scatter_group, &params, groups);
        }
    }

    pub fn len(&self) -> u32 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_scan_plan_depth() {
        assert!(scan_plan(0).is_empty());
        // 16 digits x 1 slice fits one block.
        assert_eq!(scan_plan(100), vec![16]);
        // 16 x 8192 slices = 131072 entries -> 512 block sums -> 2.
        assert_eq!(scan_plan(1 << 20), vec![131072, 512, 2]);
    }
}
