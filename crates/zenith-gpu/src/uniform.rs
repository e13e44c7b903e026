//! Uniform buffers holding a single value.

use crate::descriptors::write_uniform_buffer;
use crate::error::{GpuError, Result};
use crate::memory::{GpuAllocator, GpuBuffer};
use ash::vk;
use bytemuck::Pod;
use gpu_allocator::MemoryLocation;
use std::marker::PhantomData;

/// Host-visible uniform buffer sized for one `T`.
///
/// `T` has to match the shader block's std140 layout.
pub struct UniformBlock<T: Pod> {
    buffer: GpuBuffer,
    _value: PhantomData<T>,
}

impl<T: Pod> UniformBlock<T> {
    pub fn new(allocator: &mut GpuAllocator, name: &str) -> Result<Self> {
        let buffer = allocator.create_buffer(
            Self::block_size()?,
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
            name,
        )?;

        Ok(Self {
            buffer,
            _value: PhantomData,
        })
    }

    /// Create a block and write its first value.
    pub fn with_value(allocator: &mut GpuAllocator, value: &T, name: &str) -> Result<Self> {
        let mut block = Self::new(allocator, name)?;
        if let Err(e) = block.upload(value) {
            block.free(allocator)?;
            return Err(e);
        }
        Ok(block)
    }

    /// Size of the buffer in bytes.
    pub fn block_size() -> Result<u64> {
        match std::mem::size_of::<T>() {
            0 => Err(GpuError::InvalidState(
                "Uniform block type has no data".to_string(),
            )),
            size => Ok(size as u64),
        }
    }

    /// Overwrite the buffer with `value`.
    ///
    /// Frames still in flight see the new value too.
    pub fn upload(&mut self, value: &T) -> Result<()> {
        self.buffer.write(std::slice::from_ref(value))
    }

    pub const fn buffer(&self) -> vk::Buffer {
        self.buffer.buffer
    }

    /// Point `binding` of `set` at this block.
    ///
    /// # Safety
    /// The device and set must be valid.
    pub unsafe fn write_descriptor(
        &self,
        device: &ash::Device,
        set: vk::DescriptorSet,
        binding: u32,
    ) {
        unsafe {
            write_uniform_buffer(device, set, binding, self.buffer.buffer, 0, self.buffer.size);
        }
    }

    pub fn free(mut self, allocator: &mut GpuAllocator) -> Result<()> {
        allocator.free_buffer(&mut self.buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(C)]
    #[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
    struct Transform {
        matrix: [[f32; 4]; 4],
        time: f32,
        enabled: u32,
        _pad: [f32; 2],
    }

    fn unmapped_block<T: Pod>() -> UniformBlock<T> {
        UniformBlock {
            buffer: GpuBuffer {
                buffer: vk::Buffer::null(),
                allocation: None,
                size: UniformBlock::<T>::block_size().unwrap(),
            },
            _value: PhantomData,
        }
    }

    #[test]
    fn block_is_sized_for_its_value() {
        assert_eq!(UniformBlock::<Transform>::block_size().unwrap(), 80);
        assert_eq!(UniformBlock::<[f32; 4]>::block_size().unwrap(), 16);
    }

    #[test]
    fn zero_sized_block_is_rejected() {
        assert!(matches!(
            UniformBlock::<()>::block_size(),
            Err(GpuError::InvalidState(_))
        ));
    }

    #[test]
    fn upload_needs_mapped_memory() {
        let mut block = unmapped_block::<Transform>();
        let value = Transform {
            matrix: [[0.0; 4]; 4],
            time: 1.0,
            enabled: 1,
            _pad: [0.0; 2],
        };

        assert!(matches!(
            block.upload(&value),
            Err(GpuError::InvalidState(msg)) if msg.contains("not mapped")
        ));
    }
}
