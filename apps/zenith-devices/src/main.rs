//! Zenith device report.
//!
//! Enumerates every physical device, scores it with the default policy and
//! logs the ranking. No logical device is created.

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use zenith_gpu::capabilities::{instance_extensions, instance_layers};
use zenith_gpu::{
    enumerate_devices, rank_devices, select_best_device, AshBackend, GpuError, InstanceConfig,
    VulkanInstance, DEFAULT_SCORER,
};

fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = InstanceConfig::new("zenith-devices").with_validation(false);
    let instance = VulkanInstance::headless(&config).context("Failed to create Vulkan instance")?;
    let backend = AshBackend::new(&instance);

    let extensions = instance_extensions(&backend)?;
    let layers = instance_layers(&backend)?;
    info!(
        "Loader reports {} instance extensions and {} layers",
        extensions.len(),
        layers.len()
    );
    tracing::debug!("Instance extensions: {extensions:?}");
    tracing::debug!("Instance layers: {layers:?}");

    let devices = enumerate_devices(&backend).context("Failed to enumerate devices")?;

    for (index, device) in rank_devices(&devices, &DEFAULT_SCORER).iter().enumerate() {
        if device.is_disqualified() {
            info!("[{index}] {} - disqualified", device.descriptor.summary());
        } else {
            info!("[{index}] {} - score {}", device.descriptor.summary(), device.score);
        }
    }

    match select_best_device(&devices, &DEFAULT_SCORER) {
        Ok(_) => {}
        Err(GpuError::NoSuitableDevice) => warn!("No device meets the requirements"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
