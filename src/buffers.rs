use std::marker::PhantomData;

use bytemuck::Pod;
use futures::channel::oneshot;
use log::debug;
use wgpu::util::DeviceExt;

use crate::error::{RenderError, Result};

/// Typed storage buffer that tracks its live length separately from its capacity.
///
/// wgpu rejects zero-sized bindings, so the allocation always holds at least one element.
/// Kernels receive the live length through push constants and never read `capacity`.
pub struct StorageBuffer<T> {
    buffer: wgpu::Buffer,
    label: &'static str,
    usage: wgpu::BufferUsages,
    capacity: usize,
    len: usize,
    _marker: PhantomData<T>,
}

impl<T: Pod> StorageBuffer<T> {
    pub const DEFAULT_USAGE: wgpu::BufferUsages = wgpu::BufferUsages::STORAGE
        .union(wgpu::BufferUsages::COPY_DST)
        .union(wgpu::BufferUsages::COPY_SRC);

    fn element_size() -> u64 {
        std::mem::size_of::<T>() as u64
    }

    /// Uninitialized buffer sized for `capacity` elements.
    pub fn new(device: &wgpu::Device, label: &'static str, capacity: usize) -> Self {
        Self::with_usage(device, label, capacity, Self::DEFAULT_USAGE)
    }

    pub fn with_usage(device: &wgpu::Device, label: &'static str, capacity: usize, usage: wgpu::BufferUsages) -> Self {
        let capacity = capacity.max(1);
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: capacity as u64 * Self::element_size(),
            usage,
            mapped_at_creation: false,
        });

        Self {
            buffer,
            label,
            usage,
            capacity,
            len: 0,
            _marker: PhantomData,
        }
    }

    /// Buffer initialized with `data`; an empty slice still allocates one zeroed element.
    pub fn from_slice(device: &wgpu::Device, label: &'static str, data: &[T]) -> Self {
        if data.is_empty() {
            let mut buffer = Self::new(device, label, 1);
            buffer.len = 0;
            return buffer;
        }

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::cast_slice(data),
            usage: Self::DEFAULT_USAGE,
        });

        Self {
            buffer,
            label,
            usage: Self::DEFAULT_USAGE,
            capacity: data.len(),
            len: data.len(),
            _marker: PhantomData,
        }
    }

    /// Grows the allocation to hold `len` elements, doubling the capacity.
    ///
    /// Returns true when the underlying buffer was replaced and bind groups must be rebuilt.
    /// Contents are not preserved across a resize.
    pub fn ensure_capacity(&mut self, device: &wgpu::Device, len: usize) -> bool {
        self.len = len;
        if len <= self.capacity {
            return false;
        }

        let mut capacity = self.capacity.max(1);
        while capacity < len {
            capacity *= 2;
        }
        self.buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label),
            size: capacity as u64 * Self::element_size(),
            usage: self.usage,
            mapped_at_creation: false,
        });
        self.capacity = capacity;

        debug!(
            "Resized {}: {} elements ({:.2} MB)",
            self.label,
            capacity,
            self.size_bytes() as f64 / (1024.0 * 1024.0)
        );
        true
    }

    /// Uploads `data`, resizing first if needed. Returns true on resize.
    pub fn write(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, data: &[T]) -> bool {
        let resized = self.ensure_capacity(device, data.len());
        if !data.is_empty() {
            queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        }
        resized
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn binding(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn size_bytes(&self) -> u64 {
        self.capacity as u64 * Self::element_size()
    }

    /// Byte size of the live elements.
    pub fn live_bytes(&self) -> u64 {
        self.len as u64 * Self::element_size()
    }

    /// Zeroes the whole allocation inside `encoder`.
    pub fn clear(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.buffer, 0, None);
    }

    /// Copies the live elements back to the host.
    pub fn read(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<Vec<T>> {
        read_buffer(device, queue, &self.buffer, self.len)
    }
}

/// Copies the first `len` elements of `source` into a staging buffer and waits for the map.
pub fn read_buffer<T: Pod>(device: &wgpu::Device, queue: &wgpu::Queue, source: &wgpu::Buffer, len: usize) -> Result<Vec<T>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    let size = (len * std::mem::size_of::<T>()) as u64;

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Readback Staging Buffer"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("Readback Encoder"),
    });
    encoder.copy_buffer_to_buffer(source, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    map_staging(device, &staging)
}

/// Maps a MAP_READ buffer, blocking on `device.poll` until the callback fires.
pub fn map_staging<T: Pod>(device: &wgpu::Device, staging: &wgpu::Buffer) -> Result<Vec<T>> {
    let slice = staging.slice(..);
    let (sender, receiver) = oneshot::channel();
    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });
    device.poll(wgpu::Maintain::Wait);

    pollster::block_on(receiver).map_err(|_| RenderError::MapChannelClosed)??;

    let data = {
        let mapped = slice.get_mapped_range();
        bytemuck::cast_slice::<u8, T>(&mapped).to_vec()
    };
    staging.unmap();
    Ok(data)
}
