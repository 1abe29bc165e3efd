// ============================================================
// Layer 5 — Device and Precision Selection
// ============================================================
// Maps the user's device preference onto a wgpu device:
//
//   auto           → best available adapter
//                    (discrete GPU, then integrated GPU, then CPU)
//   gpu            → first discrete GPU
//   integrated-gpu → first integrated GPU
//   cpu            → wgpu CPU adapter
//
// Mixed precision (f16 training) is only honoured when an
// accelerator was explicitly requested.

use burn::backend::wgpu::WgpuDevice;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DevicePreference {
    #[default]
    Auto,
    Gpu,
    IntegratedGpu,
    Cpu,
}

impl DevicePreference {
    pub fn to_device(self) -> WgpuDevice {
        match self {
            DevicePreference::Auto          => WgpuDevice::default(),
            DevicePreference::Gpu           => WgpuDevice::DiscreteGpu(0),
            DevicePreference::IntegratedGpu => WgpuDevice::IntegratedGpu(0),
            DevicePreference::Cpu           => WgpuDevice::Cpu,
        }
    }

    /// True only for an explicitly selected accelerator
    pub fn is_accelerator(self) -> bool {
        matches!(self, DevicePreference::Gpu | DevicePreference::IntegratedGpu)
    }
}

/// Numeric precision the training backend runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precision {
    Full,
    Half,
}

/// Resolve the requested mixed-precision flag against the device
pub fn resolve_precision(preference: DevicePreference, mixed_precision: bool) -> Precision {
    match (mixed_precision, preference.is_accelerator()) {
        (true, true) => Precision::Half,
        (true, false) => {
            tracing::info!(
                "Mixed precision requested but no accelerator selected ({:?}), training in f32",
                preference
            );
            Precision::Full
        }
        (false, _) => Precision::Full,
    }
}
