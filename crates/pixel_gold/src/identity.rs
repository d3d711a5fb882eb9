//! Rendering identity keys.
//!
//! Screenshots are grouped into comparable baselines by the hardware and
//! software configuration that produced them. This module turns the
//! browser's device introspection data into that configuration key set.

use crate::driver_version::strip_driver_revision;
use crate::error::GoldError;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::collections::btree_map::Iter;

/// Id advertised by the browser for both vendor and device when the
/// software renderer is active.
pub const SOFTWARE_RENDERER_ID: u32 = 0xffff;

/// Value used for any key whose source data is missing or empty.
pub const NONE_SENTINEL: &str = "None";

/// Driver workarounds that imply multisampling is unavailable.
const MSAA_DISABLING_WORKAROUNDS: [&str; 2] = [
    "disable_chromium_framebuffer_multisample",
    "disable_multisample_render_to_texture",
];

pub const KEY_VENDOR_ID: &str = "vendor_id";
pub const KEY_DEVICE_ID: &str = "device_id";
pub const KEY_VENDOR_STRING: &str = "vendor_string";
pub const KEY_DEVICE_STRING: &str = "device_string";
pub const KEY_MSAA: &str = "msaa";
pub const KEY_MODEL_NAME: &str = "model_name";
pub const KEY_OS: &str = "os";
pub const KEY_OS_VERSION: &str = "os_version";
pub const KEY_OS_VERSION_DETAIL: &str = "os_version_detail_string";
pub const KEY_DRIVER_VERSION: &str = "driver_version";
pub const KEY_DRIVER_VENDOR: &str = "driver_vendor";
pub const KEY_COMBINED_HARDWARE: &str = "combined_hardware_identifier";
pub const KEY_IGNORE: &str = "ignore";

/// One GPU as reported by the browser's system info.
///
/// Field names follow the browser's camelCase JSON so raw introspection
/// output can be deserialized directly. Zero ids mean "not reported".
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GpuDevice {
    #[serde(deserialize_with = "id_from_number")]
    pub vendor_id: u32,
    #[serde(deserialize_with = "id_from_number")]
    pub device_id: u32,
    pub vendor_string: String,
    pub device_string: String,
    pub driver_vendor: String,
    pub driver_version: String,
}

/// GPU section of the browser's system info.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GpuInfo {
    /// Reported devices; the first one is the active GPU.
    pub devices: Vec<GpuDevice>,
    pub driver_bug_workarounds: Vec<String>,
}

/// System information reported by the browser under test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemInfo {
    pub gpu: Option<GpuInfo>,
    pub model_name: String,
}

/// Operating system description of the machine running the browser.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlatformInfo {
    pub os_name: String,
    pub os_version_name: String,
    pub os_version_detail: String,
}

/// Browsers report ids as JSON numbers, which may carry a fractional part.
fn id_from_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    let value = f64::deserialize(deserializer)?;
    Ok(value as u32)
}

/// Hardware parameters extracted once per browser session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageParameters {
    pub vendor_id: Option<u32>,
    pub device_id: Option<u32>,
    pub vendor_string: Option<String>,
    pub device_string: Option<String>,
    pub msaa: bool,
    pub model_name: Option<String>,
    /// Already normalised by [`strip_driver_revision`].
    pub driver_version: Option<String>,
    pub driver_vendor: Option<String>,
}

impl ImageParameters {
    /// Extracts image parameters from the browser's system info.
    ///
    /// Numeric ids win over vendor/device strings. If neither is complete and
    /// the GPU process was disabled, the software renderer's reserved ids are
    /// used.
    ///
    /// # Errors
    ///
    /// Returns [`GoldError::MissingGpuInfo`] if no GPU device was reported and
    /// [`GoldError::IncompleteDeviceInfo`] if the device cannot be identified.
    pub fn from_system_info(
        info: &SystemInfo,
        gpu_process_disabled: bool,
    ) -> Result<Self, GoldError> {
        let gpu = info.gpu.as_ref().ok_or(GoldError::MissingGpuInfo)?;
        let device = gpu.devices.first().ok_or(GoldError::MissingGpuInfo)?;

        let mut params = Self::default();
        if device.vendor_id != 0 && device.device_id != 0 {
            params.vendor_id = Some(device.vendor_id);
            params.device_id = Some(device.device_id);
        } else if !device.vendor_string.is_empty() && !device.device_string.is_empty() {
            params.vendor_string = Some(device.vendor_string.clone());
            params.device_string = Some(device.device_string.clone());
        } else if gpu_process_disabled {
            params.vendor_id = Some(SOFTWARE_RENDERER_ID);
            params.device_id = Some(SOFTWARE_RENDERER_ID);
        } else {
            return Err(GoldError::IncompleteDeviceInfo);
        }

        params.msaa = !gpu
            .driver_bug_workarounds
            .iter()
            .any(|workaround| MSAA_DISABLING_WORKAROUNDS.contains(&workaround.as_str()));
        params.model_name = non_empty(&info.model_name);
        params.driver_vendor = non_empty(&device.driver_vendor);
        params.driver_version = non_empty(&strip_driver_revision(
            &device.driver_vendor,
            &device.driver_version,
        ));
        Ok(params)
    }

    /// Coarse identifier grouping vendor id, device id and device string.
    #[must_use]
    pub fn combined_hardware_identifier(&self) -> String {
        format!(
            "vendor_id:{}, device_id:{}, device_string:{}",
            hex_or_none(self.vendor_id),
            hex_or_none(self.device_id),
            str_or_none(self.device_string.as_deref()),
        )
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_owned())
}

fn hex_or_none(id: Option<u32>) -> String {
    id.map_or_else(|| NONE_SENTINEL.to_owned(), |id| format!("{id:#x}"))
}

fn str_or_none(value: Option<&str>) -> String {
    match value {
        Some(text) if !text.is_empty() => text.to_owned(),
        _ => NONE_SENTINEL.to_owned(),
    }
}

/// The string key set a screenshot is grouped by on the comparison service.
///
/// Every value is a non-empty string; missing data is spelled `"None"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RenderingIdentity {
    keys: BTreeMap<String, String>,
}

impl RenderingIdentity {
    /// Builds the key set for one test.
    ///
    /// `grace_period_active` adds an `ignore` marker so the service does not
    /// flag untriaged images of a still-stabilising test as regressions.
    #[must_use]
    pub fn build(
        params: &ImageParameters,
        platform: &PlatformInfo,
        grace_period_active: bool,
    ) -> Self {
        let mut keys = BTreeMap::new();
        let mut put = |key: &str, value: String| {
            keys.insert(key.to_owned(), value);
        };
        put(KEY_VENDOR_ID, hex_or_none(params.vendor_id));
        put(KEY_DEVICE_ID, hex_or_none(params.device_id));
        put(KEY_VENDOR_STRING, str_or_none(params.vendor_string.as_deref()));
        put(KEY_DEVICE_STRING, str_or_none(params.device_string.as_deref()));
        put(KEY_MSAA, String::from(if params.msaa { "True" } else { "False" }));
        put(KEY_MODEL_NAME, str_or_none(params.model_name.as_deref()));
        put(KEY_OS, str_or_none(Some(platform.os_name.as_str())));
        put(KEY_OS_VERSION, str_or_none(Some(platform.os_version_name.as_str())));
        put(
            KEY_OS_VERSION_DETAIL,
            str_or_none(Some(platform.os_version_detail.as_str())),
        );
        put(KEY_DRIVER_VERSION, str_or_none(params.driver_version.as_deref()));
        put(KEY_DRIVER_VENDOR, str_or_none(params.driver_vendor.as_deref()));
        put(KEY_COMBINED_HARDWARE, params.combined_hardware_identifier());
        if grace_period_active {
            put(KEY_IGNORE, "1".to_owned());
        }
        Self { keys }
    }

    #[inline]
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.keys.get(key).map(String::as_str)
    }

    #[inline]
    pub fn iter(&self) -> Iter<'_, String, String> {
        self.keys.iter()
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Whether the grace-period `ignore` marker is present.
    #[inline]
    #[must_use]
    pub fn is_ignored(&self) -> bool {
        self.keys.contains_key(KEY_IGNORE)
    }

    /// Stable single-line encoding, usable as a lookup key.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

impl<'identity> IntoIterator for &'identity RenderingIdentity {
    type Item = (&'identity String, &'identity String);
    type IntoIter = Iter<'identity, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}

/// Per-browser cache of [`ImageParameters`].
///
/// Owned by whoever drives the browser session. The parameters are computed on
/// first use and kept until [`IdentityCache::reset`] is called, typically
/// because the browser was restarted with different arguments.
#[derive(Debug, Default)]
pub struct IdentityCache {
    params: Option<ImageParameters>,
}

impl IdentityCache {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { params: None }
    }

    /// Returns the cached parameters, computing them on first use.
    ///
    /// Once computed, later calls return the same value regardless of the
    /// arguments until the cache is reset.
    ///
    /// # Errors
    ///
    /// Propagates [`ImageParameters::from_system_info`] errors; nothing is
    /// cached in that case.
    pub fn image_parameters(
        &mut self,
        info: &SystemInfo,
        gpu_process_disabled: bool,
    ) -> Result<&ImageParameters, GoldError> {
        let params = match self.params.take() {
            Some(params) => params,
            None => ImageParameters::from_system_info(info, gpu_process_disabled)?,
        };
        Ok(self.params.insert(params))
    }

    /// Builds the identity for one test from the cached parameters.
    ///
    /// # Errors
    ///
    /// Propagates [`ImageParameters::from_system_info`] errors.
    pub fn identity(
        &mut self,
        info: &SystemInfo,
        platform: &PlatformInfo,
        gpu_process_disabled: bool,
        grace_period_active: bool,
    ) -> Result<RenderingIdentity, GoldError> {
        let params = self.image_parameters(info, gpu_process_disabled)?;
        Ok(RenderingIdentity::build(params, platform, grace_period_active))
    }

    #[inline]
    #[must_use]
    pub const fn is_cached(&self) -> bool {
        self.params.is_some()
    }

    /// Drops the cached parameters.
    #[inline]
    pub fn reset(&mut self) {
        self.params = None;
    }
}
