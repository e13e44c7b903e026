//! Physical device selection.

use crate::capabilities::PhysicalDeviceDescriptor;
use crate::error::{GpuError, Result};
use crate::scoring::DeviceScorer;

/// A candidate together with the score it received.
#[derive(Debug, Clone, Copy)]
pub struct RankedDevice<'a> {
    pub descriptor: &'a PhysicalDeviceDescriptor,
    pub score: f32,
}

impl RankedDevice<'_> {
    /// Whether the scorer disqualified this device.
    pub fn is_disqualified(&self) -> bool {
        self.score.is_nan() || self.score <= 0.0
    }
}

/// Score every candidate, keeping enumeration order.
pub fn rank_devices<'a, S: DeviceScorer + ?Sized>(
    candidates: &'a [PhysicalDeviceDescriptor],
    scorer: &S,
) -> Vec<RankedDevice<'a>> {
    candidates
        .iter()
        .map(|descriptor| RankedDevice {
            descriptor,
            score: scorer.score(descriptor),
        })
        .collect()
}

/// Pick the highest scoring candidate.
///
/// Only a strictly higher score replaces the current best, so the first
/// enumerated device wins ties. Fails with [`GpuError::NoSuitableDevice`] when
/// there are no candidates or every one scored zero.
pub fn select_best_device<'a, S: DeviceScorer + ?Sized>(
    candidates: &'a [PhysicalDeviceDescriptor],
    scorer: &S,
) -> Result<&'a PhysicalDeviceDescriptor> {
    let mut best: Option<RankedDevice<'a>> = None;

    for ranked in rank_devices(candidates, scorer) {
        tracing::debug!(
            "Device candidate {}: score {}",
            ranked.descriptor.device_name,
            ranked.score
        );

        if ranked.is_disqualified() {
            continue;
        }
        if best.map_or(true, |b| ranked.score > b.score) {
            best = Some(ranked);
        }
    }

    let best = best.ok_or(GpuError::NoSuitableDevice)?;
    tracing::info!(
        "Selected GPU: {} (score {})",
        best.descriptor.summary(),
        best.score
    );
    Ok(best.descriptor)
}
