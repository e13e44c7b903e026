//! Device suitability scoring.
//!
//! A score of `0.0` disqualifies a device; anything above competes, higher
//! wins. The policy is pluggable through [`DeviceScorer`], which closures
//! implement too.

use crate::capabilities::{DeviceClass, PhysicalDeviceDescriptor, REQUIRED_DEVICE_EXTENSIONS};

pub const DISCRETE_GPU_SCORE: f32 = 1000.0;
pub const INTEGRATED_GPU_SCORE: f32 = 500.0;
pub const OTHER_DEVICE_SCORE: f32 = 100.0;
pub const ANISOTROPY_BONUS: f32 = 200.0;
pub const RAY_TRACING_BONUS: f32 = 500.0;
pub const GEOMETRY_SHADER_BONUS: f32 = 300.0;

/// Strategy mapping a device to a suitability score.
pub trait DeviceScorer {
    /// Score a candidate. Must be pure for a fixed descriptor.
    fn score(&self, candidate: &PhysicalDeviceDescriptor) -> f32;
}

impl<F> DeviceScorer for F
where
    F: Fn(&PhysicalDeviceDescriptor) -> f32,
{
    fn score(&self, candidate: &PhysicalDeviceDescriptor) -> f32 {
        self(candidate)
    }
}

/// The stock scoring policy.
#[derive(Debug, Clone, Copy)]
pub struct DefaultScorer {
    /// Device extensions a candidate must have to qualify.
    pub required_extensions: &'static [&'static str],
}

/// Default policy requiring [`REQUIRED_DEVICE_EXTENSIONS`].
pub const DEFAULT_SCORER: DefaultScorer = DefaultScorer {
    required_extensions: REQUIRED_DEVICE_EXTENSIONS,
};

impl Default for DefaultScorer {
    fn default() -> Self {
        DEFAULT_SCORER
    }
}

impl DefaultScorer {
    /// Whether the candidate passes the hard requirements.
    pub fn qualifies(&self, candidate: &PhysicalDeviceDescriptor) -> bool {
        candidate.supports_extensions(self.required_extensions)
            && candidate.supports_swapchain()
            && candidate.has_required_queues()
    }
}

impl DeviceScorer for DefaultScorer {
    fn score(&self, candidate: &PhysicalDeviceDescriptor) -> f32 {
        if !self.qualifies(candidate) {
            return 0.0;
        }

        let mut score = match candidate.device_class() {
            DeviceClass::Discrete => DISCRETE_GPU_SCORE,
            DeviceClass::Integrated => INTEGRATED_GPU_SCORE,
            DeviceClass::Other => OTHER_DEVICE_SCORE,
        };

        score += candidate.max_image_dimension_2d as f32;

        if candidate.supports_anisotropy() {
            score += ANISOTROPY_BONUS;
        }

        if candidate.supports_ray_tracing() {
            score += RAY_TRACING_BONUS;
        }

        if candidate.supports_geometry_shader() {
            score += GEOMETRY_SHADER_BONUS;
        }

        score
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capabilities::RAY_TRACING_PIPELINE_EXTENSION;
    use crate::testing::FakeDevice;
    use ash::vk;

    #[test]
    fn scenario_device_a() {
        let a = FakeDevice::discrete("A")
            .max_image_dimension(4096)
            .anisotropy(true)
            .geometry_shader(true)
            .descriptor(1);
        assert_eq!(DEFAULT_SCORER.score(&a), 5596.0);
    }

    #[test]
    fn scenario_device_b() {
        let b = FakeDevice::integrated("B")
            .max_image_dimension(8192)
            .ray_tracing(true)
            .descriptor(2);
        assert_eq!(DEFAULT_SCORER.score(&b), 9192.0);
    }

    #[test]
    fn other_classes_get_base_100() {
        let cpu = FakeDevice::discrete("llvmpipe")
            .device_type(vk::PhysicalDeviceType::CPU)
            .max_image_dimension(0)
            .descriptor(1);
        assert_eq!(DEFAULT_SCORER.score(&cpu), OTHER_DEVICE_SCORE);

        let virt = FakeDevice::discrete("virtio")
            .device_type(vk::PhysicalDeviceType::VIRTUAL_GPU)
            .max_image_dimension(0)
            .descriptor(2);
        assert_eq!(DEFAULT_SCORER.score(&virt), OTHER_DEVICE_SCORE);
    }

    #[test]
    fn ray_tracing_adds_exactly_500() {
        let base = FakeDevice::discrete("base").max_image_dimension(16384);
        let without = base.clone().descriptor(1);
        let with = base.ray_tracing(true).descriptor(1);

        let delta = DEFAULT_SCORER.score(&with) - DEFAULT_SCORER.score(&without);
        assert_eq!(delta, RAY_TRACING_BONUS);
    }

    #[test]
    fn ray_tracing_bonus_needs_extension_and_feature() {
        let base = FakeDevice::discrete("base").max_image_dimension(1024);
        let plain = DEFAULT_SCORER.score(&base.clone().descriptor(1));

        let extension_only = base.clone().extension(RAY_TRACING_PIPELINE_EXTENSION).descriptor(1);
        assert_eq!(DEFAULT_SCORER.score(&extension_only), plain);

        let feature_only = base.ray_tracing_feature_without_extension().descriptor(1);
        assert_eq!(DEFAULT_SCORER.score(&feature_only), plain);
    }

    #[test]
    fn missing_swapchain_disqualifies() {
        let device = FakeDevice::discrete("no swapchain")
            .without_extension(crate::capabilities::SWAPCHAIN_EXTENSION)
            .anisotropy(true)
            .descriptor(1);
        assert_eq!(DEFAULT_SCORER.score(&device), 0.0);
    }

    #[test]
    fn missing_required_queue_disqualifies() {
        let device = FakeDevice::discrete("graphics only")
            .queue_families(vec![vk::QueueFlags::GRAPHICS])
            .descriptor(1);
        assert_eq!(DEFAULT_SCORER.score(&device), 0.0);
    }

    #[test]
    fn custom_required_extensions_are_enforced() {
        let scorer = DefaultScorer {
            required_extensions: &["VK_KHR_swapchain", "VK_EXT_mesh_shader"],
        };
        let device = FakeDevice::discrete("no mesh").descriptor(1);
        assert_eq!(scorer.score(&device), 0.0);

        let device = FakeDevice::discrete("mesh")
            .extension("VK_EXT_mesh_shader")
            .max_image_dimension(0)
            .descriptor(1);
        assert_eq!(scorer.score(&device), DISCRETE_GPU_SCORE);
    }

    #[test]
    fn closures_are_scorers() {
        let prefer_integrated = |d: &PhysicalDeviceDescriptor| match d.device_class() {
            DeviceClass::Integrated => 10.0,
            _ => 1.0,
        };
        let device = FakeDevice::integrated("igpu").descriptor(1);
        assert_eq!(prefer_integrated.score(&device), 10.0);
    }

    #[test]
    fn scoring_is_deterministic() {
        let device = FakeDevice::discrete("same")
            .max_image_dimension(8192)
            .geometry_shader(true)
            .descriptor(1);
        assert_eq!(DEFAULT_SCORER.score(&device), DEFAULT_SCORER.score(&device));
    }
}
