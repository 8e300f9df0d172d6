//! Instance transforms for batched drawing.
//!
//! Scattered objects (trees, buildings, lights, random objects) end up as
//! [`Instance`]s in a spatial grid leaf. Each leaf uploads its instances as
//! [`InstanceRaw`] so one draw call renders the whole batch.

use cgmath::{One, Rotation3, SquareMatrix};

/// Per-instance transformation: position, rotation (as quaternion), and scale.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    pub position: cgmath::Vector3<f32>,
    pub rotation: cgmath::Quaternion<f32>,
    pub scale: cgmath::Vector3<f32>,
}

impl Instance {
    /// Identity transform.
    pub fn new() -> Self {
        Self {
            position: cgmath::Vector3::new(0.0, 0.0, 0.0),
            rotation: cgmath::Quaternion::one(),
            scale: cgmath::Vector3::new(1.0, 1.0, 1.0),
        }
    }

    /// An upright object at `position`, turned `heading` about the up (z)
    /// axis.
    pub fn placed(
        position: cgmath::Vector3<f32>,
        heading: cgmath::Rad<f32>,
        scale: cgmath::Vector3<f32>,
    ) -> Self {
        Self {
            position,
            rotation: cgmath::Quaternion::from_angle_z(heading),
            scale,
        }
    }

    pub fn to_matrix(&self) -> cgmath::Matrix4<f32> {
        cgmath::Matrix4::from_translation(self.position)
            * cgmath::Matrix4::from(self.rotation)
            * cgmath::Matrix4::from_nonuniform_scale(self.scale.x, self.scale.y, self.scale.z)
    }

    pub fn to_raw(&self) -> InstanceRaw {
        let model = self.to_matrix();
        InstanceRaw {
            model: model.into(),
            normal: cgmath::Matrix3::from(self.rotation).into(),
            handedness: model.determinant().signum(),
        }
    }
}

impl Default for Instance {
    fn default() -> Self {
        Self::new()
    }
}

/// The instance as stored in the GPU instance buffer.
#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    model: [[f32; 4]; 4],
    normal: [[f32; 3]; 3],
    handedness: f32,
}

impl InstanceRaw {
    /// Instance-rate layout: the model matrix as four vec4s at locations
    /// 5..=8, the normal matrix as three vec3s at 9..=11, handedness at 12.
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        const ATTRIBUTES: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
            5 => Float32x4,
            6 => Float32x4,
            7 => Float32x4,
            8 => Float32x4,
            9 => Float32x3,
            10 => Float32x3,
            11 => Float32x3,
            12 => Float32,
        ];
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<InstanceRaw>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Instance,
            attributes: &ATTRIBUTES,
        }
    }

    pub fn model(&self) -> [[f32; 4]; 4] {
        self.model
    }
}
