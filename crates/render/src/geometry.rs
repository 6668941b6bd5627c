use crate::device::{BufferId, Device, DeviceError};
use lumen_common::Mesh;

/// Attribute slot fed with vertex positions.
pub const POSITION_SLOT: u32 = 0;
/// Attribute slot fed with per-vertex colors.
pub const COLOR_SLOT: u32 = 1;

/// Element type of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AttributeType {
    #[default]
    Float32,
}

impl AttributeType {
    pub fn size(self) -> u64 {
        match self {
            AttributeType::Float32 => 4,
        }
    }
}

/// Layout of one attribute inside its buffer.
///
/// A stride of 0 means tightly packed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub slot: u32,
    pub components: u8,
    pub kind: AttributeType,
    pub normalized: bool,
    pub stride: u64,
    pub offset: u64,
}

impl VertexAttribute {
    /// Tightly packed, non-normalized floats.
    pub fn float32(slot: u32, components: u8) -> Self {
        Self {
            slot,
            components,
            kind: AttributeType::Float32,
            normalized: false,
            stride: 0,
            offset: 0,
        }
    }

    pub fn with_stride(mut self, stride: u64) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Bytes occupied by one element of this attribute.
    pub fn element_size(&self) -> u64 {
        self.kind.size() * u64::from(self.components)
    }

    pub fn effective_stride(&self) -> u64 {
        if self.stride == 0 {
            self.element_size()
        } else {
            self.stride
        }
    }

    pub fn validate(&self) -> Result<(), GeometryError> {
        if !(1..=4).contains(&self.components) {
            return Err(GeometryError::InvalidComponents {
                slot: self.slot,
                components: self.components,
            });
        }
        if self.stride != 0 && self.stride < self.element_size() {
            return Err(GeometryError::InvalidStride {
                slot: self.slot,
                stride: self.stride,
                element: self.element_size(),
            });
        }
        Ok(())
    }

    /// Bytes a buffer must hold for `count` vertices of this attribute, or
    /// `None` when the layout addresses past `u64::MAX`.
    pub fn required_bytes(&self, count: u32) -> Option<u64> {
        if count == 0 {
            return Some(0);
        }
        self.effective_stride()
            .checked_mul(u64::from(count - 1))?
            .checked_add(self.offset)?
            .checked_add(self.element_size())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GeometryError {
    #[error("attribute slot {slot}: component count {components} is outside 1..=4")]
    InvalidComponents { slot: u32, components: u8 },
    #[error("attribute slot {slot}: stride {stride} is smaller than one {element}-byte element")]
    InvalidStride { slot: u32, stride: u64, element: u64 },
    #[error("attribute slot {0} is supplied more than once")]
    DuplicateSlot(u32),
    #[error("attribute slot {slot}: {have} floats cannot cover {vertices} vertices")]
    ShortArray { slot: u32, have: usize, vertices: u32 },
    #[error("attribute slot {slot}: offset and stride overflow for {vertices} vertices")]
    LayoutOverflow { slot: u32, vertices: u32 },
    #[error("geometry needs at least one attribute array")]
    NoAttributes,
    #[error(transparent)]
    Device(#[from] DeviceError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Binding {
    buffer: BufferId,
    attribute: VertexAttribute,
}

/// Vertex arrays uploaded once and bound for every draw.
///
/// The buffers are owned by the session and released through
/// [`GeometryBuffer::release`]; the device is never asked to rewrite them.
#[derive(Debug)]
pub struct GeometryBuffer {
    vertex_count: u32,
    bindings: Vec<Binding>,
}

impl GeometryBuffer {
    /// Upload a mesh: positions to [`POSITION_SLOT`], colors (if any) to
    /// [`COLOR_SLOT`].
    pub fn upload<D: Device + ?Sized>(device: &mut D, mesh: &Mesh) -> Result<Self, GeometryError> {
        let mut arrays = vec![(VertexAttribute::float32(POSITION_SLOT, 3), mesh.position_data())];
        if let Some(colors) = mesh.color_data() {
            arrays.push((VertexAttribute::float32(COLOR_SLOT, 3), colors));
        }
        Self::from_arrays(device, mesh.vertex_count(), &arrays)
    }

    /// Upload raw attribute arrays. Every layout is checked before the first
    /// buffer is created; if an upload fails, the buffers created so far are
    /// deleted again.
    pub fn from_arrays<D: Device + ?Sized>(
        device: &mut D,
        vertex_count: u32,
        arrays: &[(VertexAttribute, &[f32])],
    ) -> Result<Self, GeometryError> {
        if arrays.is_empty() {
            return Err(GeometryError::NoAttributes);
        }
        let mut seen = Vec::with_capacity(arrays.len());
        for (attribute, data) in arrays {
            attribute.validate()?;
            if seen.contains(&attribute.slot) {
                return Err(GeometryError::DuplicateSlot(attribute.slot));
            }
            seen.push(attribute.slot);
            let have = std::mem::size_of_val(*data) as u64;
            let needed = attribute
                .required_bytes(vertex_count)
                .ok_or(GeometryError::LayoutOverflow {
                    slot: attribute.slot,
                    vertices: vertex_count,
                })?;
            if have < needed {
                return Err(GeometryError::ShortArray {
                    slot: attribute.slot,
                    have: data.len(),
                    vertices: vertex_count,
                });
            }
        }

        let mut bindings = Vec::with_capacity(arrays.len());
        for (attribute, data) in arrays {
            let label = format!("vertex slot {}", attribute.slot);
            match device.create_vertex_buffer(&label, data) {
                Ok(buffer) => bindings.push(Binding {
                    buffer,
                    attribute: *attribute,
                }),
                Err(err) => {
                    for b in &bindings {
                        if let Err(e) = device.delete_buffer(b.buffer) {
                            tracing::warn!("failed to delete {} after upload error: {e}", b.buffer);
                        }
                    }
                    return Err(err.into());
                }
            }
        }
        tracing::debug!(vertices = vertex_count, attributes = bindings.len(), "uploaded geometry");

        Ok(Self {
            vertex_count,
            bindings,
        })
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    /// Slots this geometry feeds, in upload order.
    pub fn slots(&self) -> Vec<u32> {
        self.bindings.iter().map(|b| b.attribute.slot).collect()
    }

    pub fn attribute(&self, slot: u32) -> Option<VertexAttribute> {
        self.bindings
            .iter()
            .find(|b| b.attribute.slot == slot)
            .map(|b| b.attribute)
    }

    /// Enable one slot and point it at its buffer. Returns `false` when this
    /// geometry has nothing for the slot.
    pub fn bind<D: Device + ?Sized>(&self, device: &mut D, slot: u32) -> Result<bool, DeviceError> {
        let Some(b) = self.bindings.iter().find(|b| b.attribute.slot == slot) else {
            return Ok(false);
        };
        device.enable_attribute(slot)?;
        device.attribute_pointer(b.buffer, &b.attribute)?;
        Ok(true)
    }

    /// Bind every slot. The returned guard disables them again when dropped,
    /// including when a later binding fails.
    pub fn bind_all<'d, D: Device + ?Sized>(&self, device: &'d mut D) -> Result<BoundAttributes<'d, D>, DeviceError> {
        let mut guard = BoundAttributes {
            device,
            slots: Vec::with_capacity(self.bindings.len()),
        };
        for b in &self.bindings {
            guard.device.enable_attribute(b.attribute.slot)?;
            guard.slots.push(b.attribute.slot);
            guard.device.attribute_pointer(b.buffer, &b.attribute)?;
        }
        Ok(guard)
    }

    /// Delete the device buffers. Every buffer is attempted; the first error
    /// is returned.
    pub fn release<D: Device + ?Sized>(self, device: &mut D) -> Result<(), DeviceError> {
        let mut first = None;
        for b in self.bindings {
            if let Err(e) = device.delete_buffer(b.buffer) {
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

/// Attribute slots enabled for the duration of a draw.
pub struct BoundAttributes<'d, D: Device + ?Sized> {
    device: &'d mut D,
    slots: Vec<u32>,
}

impl<D: Device + ?Sized> BoundAttributes<'_, D> {
    /// The device, for calls made while the attributes stay bound.
    pub fn device(&mut self) -> &mut D {
        self.device
    }

    pub fn slots(&self) -> &[u32] {
        &self.slots
    }
}

impl<D: Device + ?Sized> Drop for BoundAttributes<'_, D> {
    fn drop(&mut self) {
        for slot in self.slots.drain(..).rev() {
            self.device.disable_attribute(slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::{DeviceCall, HeadlessDevice};

    #[test]
    fn required_bytes_accounts_for_stride_and_offset() {
        let tight = VertexAttribute::float32(0, 3);
        assert_eq!(tight.required_bytes(3), Some(36));
        let interleaved = VertexAttribute::float32(1, 3).with_stride(24).with_offset(12);
        assert_eq!(interleaved.required_bytes(3), Some(12 + 24 * 2 + 12));
        assert_eq!(interleaved.required_bytes(0), Some(0));
    }

    #[test]
    fn overflowing_layouts_are_rejected_before_upload() {
        let mut device = HeadlessDevice::new();
        let data = [0.0f32; 9];
        for attribute in [
            VertexAttribute::float32(0, 3).with_stride(u64::MAX / 2),
            VertexAttribute::float32(0, 3).with_offset(u64::MAX),
        ] {
            assert!(attribute.validate().is_ok());
            assert_eq!(attribute.required_bytes(3), None);
            let err = GeometryBuffer::from_arrays(&mut device, 3, &[(attribute, &data[..])]).unwrap_err();
            assert_eq!(err, GeometryError::LayoutOverflow { slot: 0, vertices: 3 });
        }
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert!(matches!(
            VertexAttribute::float32(0, 5).validate(),
            Err(GeometryError::InvalidComponents { components: 5, .. })
        ));
        assert!(matches!(
            VertexAttribute::float32(0, 3).with_stride(8).validate(),
            Err(GeometryError::InvalidStride { .. })
        ));
    }

    #[test]
    fn mesh_upload_creates_one_buffer_per_array() {
        let mut device = HeadlessDevice::new();
        let geometry = GeometryBuffer::upload(&mut device, &Mesh::cube()).unwrap();
        assert_eq!(geometry.vertex_count(), 36);
        assert_eq!(geometry.slots(), vec![POSITION_SLOT, COLOR_SLOT]);
        assert_eq!(device.live_buffers(), 2);

        geometry.release(&mut device).unwrap();
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn positions_only_mesh_binds_one_slot() {
        let mut device = HeadlessDevice::new();
        let mesh = Mesh::from_positions(vec![[0.0; 3]; 3]).unwrap();
        let geometry = GeometryBuffer::upload(&mut device, &mesh).unwrap();
        assert_eq!(geometry.slots(), vec![POSITION_SLOT]);
        assert!(geometry.attribute(COLOR_SLOT).is_none());
        assert!(!geometry.bind(&mut device, COLOR_SLOT).unwrap());
    }

    #[test]
    fn bind_enables_then_points_the_slot() {
        let mut device = HeadlessDevice::new();
        let geometry = GeometryBuffer::upload(&mut device, &Mesh::triangle()).unwrap();
        device.take_calls();

        assert!(geometry.bind(&mut device, POSITION_SLOT).unwrap());
        let calls = device.take_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], DeviceCall::EnableAttribute { slot: POSITION_SLOT });
        assert!(matches!(
            calls[1],
            DeviceCall::AttributePointer { slot: POSITION_SLOT, .. }
        ));
        assert_eq!(device.enabled_attributes(), vec![POSITION_SLOT]);
    }

    #[test]
    fn duplicate_slot_is_rejected_before_upload() {
        let mut device = HeadlessDevice::new();
        let data = [0.0f32; 9];
        let err = GeometryBuffer::from_arrays(
            &mut device,
            3,
            &[
                (VertexAttribute::float32(0, 3), &data[..]),
                (VertexAttribute::float32(0, 3), &data[..]),
            ],
        )
        .unwrap_err();
        assert_eq!(err, GeometryError::DuplicateSlot(0));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn short_array_is_rejected() {
        let mut device = HeadlessDevice::new();
        let data = [0.0f32; 8];
        let err = GeometryBuffer::from_arrays(&mut device, 3, &[(VertexAttribute::float32(0, 3), &data[..])])
            .unwrap_err();
        assert!(matches!(err, GeometryError::ShortArray { have: 8, .. }));
    }

    #[test]
    fn failed_upload_releases_earlier_buffers() {
        let mut device = HeadlessDevice::new().with_buffer_limit(1);
        let err = GeometryBuffer::upload(&mut device, &Mesh::triangle()).unwrap_err();
        assert!(matches!(err, GeometryError::Device(DeviceError::Allocation { .. })));
        assert_eq!(device.live_buffers(), 0);
    }

    #[test]
    fn guard_disables_slots_on_drop() {
        let mut device = HeadlessDevice::new();
        let geometry = GeometryBuffer::upload(&mut device, &Mesh::triangle()).unwrap();
        {
            let mut bound = geometry.bind_all(&mut device).unwrap();
            assert_eq!(bound.slots(), &[POSITION_SLOT, COLOR_SLOT]);
            assert_eq!(bound.device().enabled_attributes(), vec![0, 1]);
        }
        assert!(device.enabled_attributes().is_empty());
        let disabled: Vec<u32> = device
            .calls()
            .iter()
            .filter_map(|c| match c {
                DeviceCall::DisableAttribute { slot } => Some(*slot),
                _ => None,
            })
            .collect();
        assert_eq!(disabled, vec![1, 0]);
    }
}
