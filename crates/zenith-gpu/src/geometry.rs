//! Vertex input layouts, vertex buffers and index buffers.

use crate::error::{GpuError, Result};
use crate::memory::{GpuAllocator, GpuBuffer};
use ash::vk;
use bytemuck::Pod;
use std::collections::BTreeSet;

/// Shader input type of one vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Vector2,
    Vector3,
    Vector4,
    /// RGBA color as four floats.
    Color,
    Float,
    Int,
    Uint,
    /// 32-bit boolean.
    Bool,
    Mat3,
    Mat4,
}

impl InputFormat {
    /// Size in bytes.
    pub const fn size(self) -> u32 {
        match self {
            Self::Float | Self::Int | Self::Uint | Self::Bool => 4,
            Self::Vector2 => 8,
            Self::Vector3 => 12,
            Self::Vector4 | Self::Color => 16,
            Self::Mat3 => 36,
            Self::Mat4 => 64,
        }
    }

    /// Format of each shader location the input occupies.
    pub const fn vk_format(self) -> vk::Format {
        match self {
            Self::Float => vk::Format::R32_SFLOAT,
            Self::Int => vk::Format::R32_SINT,
            Self::Uint | Self::Bool => vk::Format::R32_UINT,
            Self::Vector2 => vk::Format::R32G32_SFLOAT,
            Self::Vector3 | Self::Mat3 => vk::Format::R32G32B32_SFLOAT,
            Self::Vector4 | Self::Color | Self::Mat4 => vk::Format::R32G32B32A32_SFLOAT,
        }
    }

    /// Matrices take one location per column.
    pub const fn locations(self) -> u32 {
        match self {
            Self::Mat3 => 3,
            Self::Mat4 => 4,
            _ => 1,
        }
    }
}

/// Layout of one interleaved vertex buffer.
///
/// Items are packed in the order they are added, without padding.
#[derive(Debug, Clone, Default)]
pub struct InputDescriptor {
    binding: u32,
    items: Vec<(u32, InputFormat)>,
}

impl InputDescriptor {
    /// Empty layout on binding 0.
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_binding(mut self, binding: u32) -> Self {
        self.binding = binding;
        self
    }

    /// Append an attribute at shader `location`.
    pub fn item(mut self, location: u32, format: InputFormat) -> Self {
        self.items.push((location, format));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> u32 {
        self.items.iter().map(|(_, format)| format.size()).sum()
    }

    pub fn binding_description(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription::default()
            .binding(self.binding)
            .stride(self.stride())
            .input_rate(vk::VertexInputRate::VERTEX)
    }

    /// One description per shader location, with running offsets.
    ///
    /// Fails when two items claim the same location.
    pub fn attribute_descriptions(&self) -> Result<Vec<vk::VertexInputAttributeDescription>> {
        let mut used = BTreeSet::new();
        let mut attributes = Vec::new();
        let mut offset = 0;

        for &(location, format) in &self.items {
            let column_size = format.size() / format.locations();
            for column in 0..format.locations() {
                let column_location = location + column;
                if !used.insert(column_location) {
                    return Err(GpuError::PipelineCreation(format!(
                        "Vertex input location {column_location} is used twice"
                    )));
                }
                attributes.push(
                    vk::VertexInputAttributeDescription::default()
                        .location(column_location)
                        .binding(self.binding)
                        .format(format.vk_format())
                        .offset(offset + column * column_size),
                );
            }
            offset += format.size();
        }

        Ok(attributes)
    }
}

/// Element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U32,
    U16,
    /// Needs `VK_EXT_index_type_uint8` enabled on the device.
    U8,
}

impl IndexType {
    pub const fn vk_index_type(self) -> vk::IndexType {
        match self {
            Self::U32 => vk::IndexType::UINT32,
            Self::U16 => vk::IndexType::UINT16,
            Self::U8 => vk::IndexType::UINT8_EXT,
        }
    }

    pub const fn size(self) -> u64 {
        match self {
            Self::U32 => 4,
            Self::U16 => 2,
            Self::U8 => 1,
        }
    }
}

/// Integer types usable as indices.
pub trait IndexElement: Pod {
    const INDEX_TYPE: IndexType;
}

impl IndexElement for u32 {
    const INDEX_TYPE: IndexType = IndexType::U32;
}

impl IndexElement for u16 {
    const INDEX_TYPE: IndexType = IndexType::U16;
}

impl IndexElement for u8 {
    const INDEX_TYPE: IndexType = IndexType::U8;
}

/// Index buffer with its element type and count.
pub struct IndexBuffer {
    pub buffer: GpuBuffer,
    pub index_type: IndexType,
    pub count: u32,
}

/// Upload vertices into a host-visible vertex buffer.
pub fn upload_vertices<T: Pod>(
    allocator: &mut GpuAllocator,
    vertices: &[T],
    name: &str,
) -> Result<GpuBuffer> {
    allocator.upload_buffer(vertices, vk::BufferUsageFlags::VERTEX_BUFFER, name)
}

/// Upload indices into a host-visible index buffer.
pub fn upload_indices<T: IndexElement>(
    allocator: &mut GpuAllocator,
    indices: &[T],
    name: &str,
) -> Result<IndexBuffer> {
    let count = u32::try_from(indices.len())
        .map_err(|_| GpuError::InvalidState(format!("Too many indices for {name}")))?;
    let buffer = allocator.upload_buffer(indices, vk::BufferUsageFlags::INDEX_BUFFER, name)?;

    Ok(IndexBuffer {
        buffer,
        index_type: T::INDEX_TYPE,
        count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interleaved_offsets_accumulate() {
        let descriptor = InputDescriptor::new()
            .item(0, InputFormat::Vector3)
            .item(1, InputFormat::Vector4)
            .item(2, InputFormat::Vector2);

        assert_eq!(descriptor.stride(), 36);

        let binding = descriptor.binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 36);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        let attributes = descriptor.attribute_descriptions().unwrap();
        let layout: Vec<_> = attributes
            .iter()
            .map(|a| (a.location, a.offset, a.format))
            .collect();
        assert_eq!(
            layout,
            vec![
                (0, 0, vk::Format::R32G32B32_SFLOAT),
                (1, 12, vk::Format::R32G32B32A32_SFLOAT),
                (2, 28, vk::Format::R32G32_SFLOAT),
            ]
        );
    }

    #[test]
    fn matrices_span_consecutive_locations() {
        let descriptor = InputDescriptor::new()
            .item(0, InputFormat::Float)
            .item(1, InputFormat::Mat4);

        let attributes = descriptor.attribute_descriptions().unwrap();
        assert_eq!(attributes.len(), 5);

        let columns: Vec<_> = attributes[1..].iter().map(|a| (a.location, a.offset)).collect();
        assert_eq!(columns, vec![(1, 4), (2, 20), (3, 36), (4, 52)]);
        assert_eq!(descriptor.stride(), 68);
    }

    #[test]
    fn overlapping_locations_are_rejected() {
        let descriptor = InputDescriptor::new()
            .item(0, InputFormat::Mat3)
            .item(2, InputFormat::Vector2);

        assert!(matches!(
            descriptor.attribute_descriptions(),
            Err(GpuError::PipelineCreation(msg)) if msg.contains("location 2")
        ));
    }

    #[test]
    fn scalar_formats() {
        assert_eq!(InputFormat::Bool.vk_format(), vk::Format::R32_UINT);
        assert_eq!(InputFormat::Int.vk_format(), vk::Format::R32_SINT);
        assert_eq!(InputFormat::Color.size(), InputFormat::Vector4.size());
        assert_eq!(InputFormat::Mat3.locations(), 3);
    }

    #[test]
    fn custom_binding_propagates() {
        let descriptor = InputDescriptor::new()
            .with_binding(2)
            .item(0, InputFormat::Vector2);

        assert_eq!(descriptor.binding_description().binding, 2);
        assert_eq!(descriptor.attribute_descriptions().unwrap()[0].binding, 2);
        assert!(!descriptor.is_empty());
        assert!(InputDescriptor::new().is_empty());
    }

    #[test]
    fn index_types_follow_element_type() {
        assert_eq!(<u32 as IndexElement>::INDEX_TYPE, IndexType::U32);
        assert_eq!(<u16 as IndexElement>::INDEX_TYPE, IndexType::U16);
        assert_eq!(<u8 as IndexElement>::INDEX_TYPE, IndexType::U8);

        assert_eq!(IndexType::U32.vk_index_type(), vk::IndexType::UINT32);
        assert_eq!(IndexType::U16.vk_index_type(), vk::IndexType::UINT16);
        assert_eq!(IndexType::U8.vk_index_type(), vk::IndexType::UINT8_EXT);
        assert_eq!(IndexType::U16.size(), 2);
    }
}
