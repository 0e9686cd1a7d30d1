// Physical device selection
//
// Hardware queries are gathered into a read-only DeviceCandidate snapshot
// first, then judged by a pure predicate. The first suitable candidate in
// enumeration order wins; there is no scoring.

use super::surface::{Surface, SwapchainSupport};
use crate::config::DeviceConfig;
use crate::error::InitError;
use ash::extensions::khr;
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::CStr;
use std::fmt;

/// Graphics and present queue family indices. A family may fill both roles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Distinct families to create queues on
    pub fn unique_families(&self) -> BTreeSet<u32> {
        self.graphics.into_iter().chain(self.present).collect()
    }

    /// Both indices, once complete
    pub fn resolved(&self) -> Option<(u32, u32)> {
        Some((self.graphics?, self.present?))
    }
}

/// One queue family as seen by the selector
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub present_support: bool,
}

/// Everything the selector knows about one physical device
#[derive(Debug, Clone)]
pub struct DeviceCandidate {
    pub handle: vk::PhysicalDevice,
    pub name: String,
    pub device_type: vk::PhysicalDeviceType,
    pub features: vk::PhysicalDeviceFeatures,
    pub queue_families: Vec<QueueFamilyInfo>,
    pub extensions: BTreeSet<String>,
    pub swapchain_support: SwapchainSupport,
}

impl DeviceCandidate {
    /// Scan every family; a later match overrides an earlier one
    pub fn queue_family_indices(&self) -> QueueFamilyIndices {
        let mut indices = QueueFamilyIndices::default();

        for (index, family) in self.queue_families.iter().enumerate() {
            let index = index as u32;
            if family.flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(index);
            }
            if family.present_support {
                indices.present = Some(index);
            }
        }

        indices
    }

    pub fn missing_extensions<'a>(&self, required: &'a [String]) -> Vec<&'a str> {
        required
            .iter()
            .filter(|ext| !self.extensions.contains(*ext))
            .map(String::as_str)
            .collect()
    }
}

/// What a device must offer. Discrete type and geometry shaders are policy
/// toggles; the swapchain extension is always required.
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    pub discrete_gpu: bool,
    pub geometry_shader: bool,
    pub extensions: Vec<String>,
}

impl Default for DeviceRequirements {
    fn default() -> Self {
        Self::from_config(&DeviceConfig::default())
    }
}

impl DeviceRequirements {
    pub fn from_config(config: &DeviceConfig) -> Self {
        let mut extensions = vec![swapchain_extension_name()];
        for ext in &config.extra_extensions {
            if !extensions.contains(ext) {
                extensions.push(ext.clone());
            }
        }

        Self {
            discrete_gpu: config.require_discrete_gpu,
            geometry_shader: config.require_geometry_shader,
            extensions,
        }
    }
}

fn swapchain_extension_name() -> String {
    khr::Swapchain::name().to_string_lossy().into_owned()
}

/// Why a candidate was passed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotDiscrete(vk::PhysicalDeviceType),
    NoGeometryShader,
    IncompleteQueueFamilies(QueueFamilyIndices),
    MissingExtensions(Vec<String>),
    InadequateSwapchainSupport,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::NotDiscrete(ty) => write!(f, "not a discrete GPU ({:?})", ty),
            Rejection::NoGeometryShader => f.write_str("no geometry shader support"),
            Rejection::IncompleteQueueFamilies(indices) => write!(
                f,
                "missing queue families (graphics: {:?}, present: {:?})",
                indices.graphics, indices.present
            ),
            Rejection::MissingExtensions(exts) => write!(f, "missing extensions {:?}", exts),
            Rejection::InadequateSwapchainSupport => f.write_str("no surface formats or present modes"),
        }
    }
}

/// Check a candidate against the requirements, in a fixed order.
/// Returns the complete queue family indices on success.
pub fn check_device(
    candidate: &DeviceCandidate,
    requirements: &DeviceRequirements,
) -> Result<QueueFamilyIndices, Rejection> {
    if requirements.discrete_gpu && candidate.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
        return Err(Rejection::NotDiscrete(candidate.device_type));
    }

    if requirements.geometry_shader && candidate.features.geometry_shader != vk::TRUE {
        return Err(Rejection::NoGeometryShader);
    }

    let indices = candidate.queue_family_indices();
    if !indices.is_complete() {
        return Err(Rejection::IncompleteQueueFamilies(indices));
    }

    let missing = candidate.missing_extensions(&requirements.extensions);
    if !missing.is_empty() {
        return Err(Rejection::MissingExtensions(
            missing.into_iter().map(str::to_owned).collect(),
        ));
    }

    if !candidate.swapchain_support.is_adequate() {
        return Err(Rejection::InadequateSwapchainSupport);
    }

    Ok(indices)
}

pub fn is_device_suitable(candidate: &DeviceCandidate, requirements: &DeviceRequirements) -> bool {
    check_device(candidate, requirements).is_ok()
}

/// The chosen device and its resolved queue families
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub candidate: DeviceCandidate,
    pub graphics_family: u32,
    pub present_family: u32,
}

impl SelectedDevice {
    pub fn handle(&self) -> vk::PhysicalDevice {
        self.candidate.handle
    }

    pub fn queue_families(&self) -> QueueFamilyIndices {
        QueueFamilyIndices {
            graphics: Some(self.graphics_family),
            present: Some(self.present_family),
        }
    }
}

/// Where candidates come from: the driver, or a stand-in under test
pub trait PhysicalDeviceSource {
    fn enumerate(&self) -> Result<Vec<vk::PhysicalDevice>, InitError>;

    fn snapshot(&self, device: vk::PhysicalDevice) -> Result<DeviceCandidate, InitError>;
}

/// Pick the first suitable device in enumeration order
pub fn select_device(
    source: &dyn PhysicalDeviceSource,
    requirements: &DeviceRequirements,
) -> Result<SelectedDevice, InitError> {
    let devices = source.enumerate()?;
    if devices.is_empty() {
        return Err(InitError::NoPhysicalDevice);
    }

    log::debug!("Found {} physical device(s)", devices.len());

    for device in devices {
        let candidate = match source.snapshot(device) {
            Ok(candidate) => candidate,
            Err(e) => {
                log::warn!("Skipping physical device {:?}: {}", device, e);
                continue;
            }
        };

        match check_device(&candidate, requirements) {
            Ok(indices) => {
                let Some((graphics_family, present_family)) = indices.resolved() else {
                    continue;
                };
                log::info!(
                    "Selected GPU: {} (graphics family {}, present family {})",
                    candidate.name,
                    graphics_family,
                    present_family
                );
                return Ok(SelectedDevice {
                    candidate,
                    graphics_family,
                    present_family,
                });
            }
            Err(reason) => {
                log::debug!("Rejected GPU {}: {}", candidate.name, reason);
            }
        }
    }

    Err(InitError::NoSuitableDevice)
}

/// Queries a real driver for candidates presenting to `surface`
pub struct VulkanDeviceSource<'a> {
    pub instance: &'a ash::Instance,
    pub surface: &'a Surface,
}

impl PhysicalDeviceSource for VulkanDeviceSource<'_> {
    fn enumerate(&self) -> Result<Vec<vk::PhysicalDevice>, InitError> {
        unsafe { self.instance.enumerate_physical_devices() }.map_err(InitError::DeviceQuery)
    }

    fn snapshot(&self, device: vk::PhysicalDevice) -> Result<DeviceCandidate, InitError> {
        let properties = unsafe { self.instance.get_physical_device_properties(device) };
        let features = unsafe { self.instance.get_physical_device_features(device) };
        let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let family_properties =
            unsafe { self.instance.get_physical_device_queue_family_properties(device) };
        let queue_families = family_properties
            .iter()
            .enumerate()
            .map(|(index, props)| {
                Ok(QueueFamilyInfo {
                    flags: props.queue_flags,
                    present_support: self.surface.supports_present(device, index as u32)?,
                })
            })
            .collect::<Result<Vec<_>, vk::Result>>()
            .map_err(InitError::DeviceQuery)?;

        let extensions = unsafe { self.instance.enumerate_device_extension_properties(device) }
            .map_err(InitError::DeviceQuery)?
            .iter()
            .map(|ext| {
                unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
                    .to_string_lossy()
                    .into_owned()
            })
            .collect();

        let swapchain_support = self
            .surface
            .query_support(device)
            .map_err(InitError::DeviceQuery)?;

        Ok(DeviceCandidate {
            handle: device,
            name,
            device_type: properties.device_type,
            features,
            queue_families,
            extensions,
            swapchain_support,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use ash::vk::Handle;
    use std::cell::Cell;

    pub(crate) fn good_candidate(raw: u64) -> DeviceCandidate {
        DeviceCandidate {
            handle: vk::PhysicalDevice::from_raw(raw),
            name: format!("Test GPU {}", raw),
            device_type: vk::PhysicalDeviceType::DISCRETE_GPU,
            features: vk::PhysicalDeviceFeatures {
                geometry_shader: vk::TRUE,
                ..Default::default()
            },
            queue_families: vec![QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER,
                present_support: true,
            }],
            extensions: [swapchain_extension_name()].into_iter().collect(),
            swapchain_support: SwapchainSupport {
                capabilities: vk::SurfaceCapabilitiesKHR::default(),
                formats: vec![vk::SurfaceFormatKHR {
                    format: vk::Format::B8G8R8A8_SRGB,
                    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
                }],
                present_modes: vec![vk::PresentModeKHR::FIFO],
            },
        }
    }

    struct FakeSource {
        candidates: Vec<DeviceCandidate>,
        snapshots: Cell<usize>,
    }

    impl FakeSource {
        fn new(candidates: Vec<DeviceCandidate>) -> Self {
            Self {
                candidates,
                snapshots: Cell::new(0),
            }
        }
    }

    impl PhysicalDeviceSource for FakeSource {
        fn enumerate(&self) -> Result<Vec<vk::PhysicalDevice>, InitError> {
            Ok(self.candidates.iter().map(|c| c.handle).collect())
        }

        fn snapshot(&self, device: vk::PhysicalDevice) -> Result<DeviceCandidate, InitError> {
            self.snapshots.set(self.snapshots.get() + 1);
            self.candidates
                .iter()
                .find(|c| c.handle == device)
                .cloned()
                .ok_or(InitError::DeviceQuery(vk::Result::ERROR_INITIALIZATION_FAILED))
        }
    }

    #[test]
    fn single_capable_device_is_selected() {
        let source = FakeSource::new(vec![good_candidate(1)]);
        let selected = select_device(&source, &DeviceRequirements::default()).unwrap();

        assert_eq!(selected.handle(), vk::PhysicalDevice::from_raw(1));
        assert_eq!(selected.graphics_family, 0);
        assert_eq!(selected.present_family, 0);
    }

    #[test]
    fn no_devices_fails_fast() {
        let source = FakeSource::new(vec![]);
        let err = select_device(&source, &DeviceRequirements::default()).unwrap_err();
        assert!(matches!(err, InitError::NoPhysicalDevice));
    }

    #[test]
    fn no_match_is_no_suitable_device() {
        let mut integrated = good_candidate(1);
        integrated.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        let source = FakeSource::new(vec![integrated]);

        let err = select_device(&source, &DeviceRequirements::default()).unwrap_err();
        assert!(matches!(err, InitError::NoSuitableDevice));
    }

    #[test]
    fn first_suitable_device_wins() {
        let mut cpu = good_candidate(1);
        cpu.device_type = vk::PhysicalDeviceType::CPU;
        let source = FakeSource::new(vec![cpu, good_candidate(2), good_candidate(3)]);

        let selected = select_device(&source, &DeviceRequirements::default()).unwrap();
        assert_eq!(selected.handle(), vk::PhysicalDevice::from_raw(2));
        // Candidate 3 is never looked at
        assert_eq!(source.snapshots.get(), 2);
    }

    #[test]
    fn unqueryable_device_is_skipped() {
        struct Flaky;
        impl PhysicalDeviceSource for Flaky {
            fn enumerate(&self) -> Result<Vec<vk::PhysicalDevice>, InitError> {
                Ok(vec![vk::PhysicalDevice::from_raw(7), vk::PhysicalDevice::from_raw(8)])
            }
            fn snapshot(&self, device: vk::PhysicalDevice) -> Result<DeviceCandidate, InitError> {
                if device == vk::PhysicalDevice::from_raw(7) {
                    Err(InitError::DeviceQuery(vk::Result::ERROR_DEVICE_LOST))
                } else {
                    Ok(good_candidate(8))
                }
            }
        }

        let selected = select_device(&Flaky, &DeviceRequirements::default()).unwrap();
        assert_eq!(selected.handle(), vk::PhysicalDevice::from_raw(8));
    }

    #[test]
    fn suitability_is_deterministic() {
        let requirements = DeviceRequirements::default();
        let mut candidates = vec![good_candidate(1)];
        let mut no_present = good_candidate(2);
        no_present.queue_families[0].present_support = false;
        candidates.push(no_present);

        for candidate in &candidates {
            assert_eq!(
                is_device_suitable(candidate, &requirements),
                is_device_suitable(candidate, &requirements)
            );
        }
    }

    #[test]
    fn each_requirement_rejects() {
        let requirements = DeviceRequirements::default();

        let mut c = good_candidate(1);
        c.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        assert_eq!(
            check_device(&c, &requirements),
            Err(Rejection::NotDiscrete(vk::PhysicalDeviceType::INTEGRATED_GPU))
        );

        let mut c = good_candidate(1);
        c.features.geometry_shader = vk::FALSE;
        assert_eq!(check_device(&c, &requirements), Err(Rejection::NoGeometryShader));

        let mut c = good_candidate(1);
        c.queue_families[0].flags = vk::QueueFlags::COMPUTE;
        assert!(matches!(
            check_device(&c, &requirements),
            Err(Rejection::IncompleteQueueFamilies(_))
        ));

        let mut c = good_candidate(1);
        c.extensions.clear();
        assert_eq!(
            check_device(&c, &requirements),
            Err(Rejection::MissingExtensions(vec!["VK_KHR_swapchain".to_string()]))
        );

        let mut c = good_candidate(1);
        c.swapchain_support.present_modes.clear();
        assert_eq!(
            check_device(&c, &requirements),
            Err(Rejection::InadequateSwapchainSupport)
        );
    }

    #[test]
    fn policy_requirements_can_be_relaxed() {
        let config = DeviceConfig {
            require_discrete_gpu: false,
            require_geometry_shader: false,
            extra_extensions: Vec::new(),
        };
        let requirements = DeviceRequirements::from_config(&config);

        let mut c = good_candidate(1);
        c.device_type = vk::PhysicalDeviceType::INTEGRATED_GPU;
        c.features.geometry_shader = vk::FALSE;
        assert!(is_device_suitable(&c, &requirements));
    }

    #[test]
    fn extra_extensions_are_required_once() {
        let config = DeviceConfig {
            extra_extensions: vec!["VK_KHR_swapchain".to_string(), "VK_EXT_foo".to_string()],
            ..Default::default()
        };
        let requirements = DeviceRequirements::from_config(&config);
        assert_eq!(requirements.extensions, vec!["VK_KHR_swapchain", "VK_EXT_foo"]);

        let c = good_candidate(1);
        assert_eq!(c.missing_extensions(&requirements.extensions), vec!["VK_EXT_foo"]);
    }

    #[test]
    fn split_graphics_and_present_families() {
        let mut c = good_candidate(1);
        c.queue_families = vec![
            QueueFamilyInfo {
                flags: vk::QueueFlags::GRAPHICS,
                present_support: false,
            },
            QueueFamilyInfo {
                flags: vk::QueueFlags::TRANSFER,
                present_support: true,
            },
        ];

        let indices = c.queue_family_indices();
        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(indices.unique_families().len(), 2);
    }

    #[test]
    fn later_family_overrides_earlier() {
        let mut c = good_candidate(1);
        c.queue_families.push(QueueFamilyInfo {
            flags: vk::QueueFlags::GRAPHICS,
            present_support: true,
        });

        let indices = c.queue_family_indices();
        assert_eq!(indices.graphics, Some(1));
        assert_eq!(indices.present, Some(1));
    }

    #[test]
    fn shared_family_deduplicates() {
        let indices = QueueFamilyIndices {
            graphics: Some(2),
            present: Some(2),
        };
        assert!(indices.is_complete());
        assert_eq!(indices.unique_families().into_iter().collect::<Vec<_>>(), vec![2]);
    }

    #[test]
    fn incomplete_indices() {
        let indices = QueueFamilyIndices {
            graphics: Some(0),
            present: None,
        };
        assert!(!indices.is_complete());
        assert_eq!(indices.resolved(), None);
    }
}
