use candle_core::Device;
use strum_macros::{AsRefStr, EnumString};

/// Where a candle model runs. GPU variants only work when the crate is
/// built with the matching `cuda` or `metal` feature.
#[derive(AsRefStr, EnumString, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[strum(serialize_all = "lowercase")]
pub enum ComputeDevice {
    #[default]
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    pub fn to_candle_device(self) -> anyhow::Result<Device> {
        let device = match self {
            Self::Cpu => Device::Cpu,
            Self::Cuda => Device::new_cuda(0)?,
            Self::Metal => Device::new_metal(0)?,
        };
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn parse_device_names() {
        assert_eq!(ComputeDevice::from_str("cpu").unwrap(), ComputeDevice::Cpu);
        assert_eq!(ComputeDevice::from_str("metal").unwrap(), ComputeDevice::Metal);
        assert_eq!(ComputeDevice::Cuda.as_ref(), "cuda");
        assert!(ComputeDevice::from_str("tpu").is_err());
    }

    #[test]
    fn cpu_is_always_available() {
        assert!(ComputeDevice::Cpu.to_candle_device().unwrap().is_cpu());
    }
}
