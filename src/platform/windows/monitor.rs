//! DXGI monitor enumeration.
//!
//! Walks every adapter's attached outputs and distills each one into a
//! `MonitorDescriptor`: desktop rect, rotation, and the HDR readings
//! from `IDXGIOutput6::GetDesc1` when the driver exposes them.

use anyhow::Context;
use windows::Win32::Foundation::POINT;
use windows::Win32::Graphics::Dxgi::Common::{
    DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020, DXGI_COLOR_SPACE_RGB_STUDIO_G2084_NONE_P2020,
    DXGI_MODE_ROTATION, DXGI_MODE_ROTATION_ROTATE90, DXGI_MODE_ROTATION_ROTATE180,
    DXGI_MODE_ROTATION_ROTATE270,
};
use windows::Win32::Graphics::Dxgi::{
    CreateDXGIFactory1, DXGI_ERROR_NOT_FOUND, DXGI_OUTPUT_DESC, IDXGIAdapter, IDXGIFactory1,
    IDXGIOutput, IDXGIOutput6,
};
use windows::Win32::Graphics::Gdi::{HMONITOR, MONITOR_DEFAULTTOPRIMARY, MonitorFromPoint};
use windows::core::Interface;

use crate::error::{CaptureError, CaptureResult};
use crate::monitor::{ColorSpace, DisplayRotation, MonitorDescriptor, MonitorKey};

/// The DXGI objects a duplication session is opened against.
pub(crate) struct ResolvedOutput {
    pub adapter: IDXGIAdapter,
    pub output: IDXGIOutput,
}

pub(crate) fn enumerate_descriptors() -> CaptureResult<Vec<MonitorDescriptor>> {
    let primary = primary_hmonitor();
    let mut descriptors = Vec::new();
    for (adapter_luid, _adapter, output, desc) in attached_outputs()? {
        let descriptor = describe_output(adapter_luid, &output, &desc, primary);
        // Outputs mid-topology-change can briefly report an empty rect.
        if descriptor.width == 0 || descriptor.height == 0 {
            continue;
        }
        descriptors.push(descriptor);
    }
    Ok(descriptors)
}

/// Find the live DXGI objects for a previously enumerated monitor.
pub(crate) fn resolve_output(key: MonitorKey) -> CaptureResult<ResolvedOutput> {
    for (adapter_luid, adapter, output, desc) in attached_outputs()? {
        let name = utf16z_to_string(&desc.DeviceName);
        if MonitorKey::from_device_name(adapter_luid, &name) == key {
            return Ok(ResolvedOutput { adapter, output });
        }
    }
    Err(CaptureError::MonitorLost)
}

fn attached_outputs() -> CaptureResult<Vec<(u64, IDXGIAdapter, IDXGIOutput, DXGI_OUTPUT_DESC)>> {
    let factory: IDXGIFactory1 = unsafe { CreateDXGIFactory1() }
        .context("CreateDXGIFactory1 failed")
        .map_err(CaptureError::Platform)?;

    let mut outputs = Vec::new();
    let mut adapter_idx = 0u32;
    loop {
        let adapter1 = match unsafe { factory.EnumAdapters1(adapter_idx) } {
            Ok(adapter) => adapter,
            Err(error) if error.code() == DXGI_ERROR_NOT_FOUND => break,
            Err(error) => {
                return Err(CaptureError::Platform(
                    anyhow::Error::from(error)
                        .context(format!("EnumAdapters1({adapter_idx}) failed")),
                ));
            }
        };
        let adapter_desc = unsafe { adapter1.GetDesc1() }
            .context("IDXGIAdapter1::GetDesc1 failed")
            .map_err(CaptureError::Platform)?;
        let adapter_luid = luid_to_u64(adapter_desc.AdapterLuid);

        let adapter: IDXGIAdapter = adapter1
            .cast()
            .context("failed to cast IDXGIAdapter1 to IDXGIAdapter")
            .map_err(CaptureError::Platform)?;

        let mut output_idx = 0u32;
        loop {
            let output = match unsafe { adapter.EnumOutputs(output_idx) } {
                Ok(output) => output,
                Err(error) if error.code() == DXGI_ERROR_NOT_FOUND => break,
                Err(error) => {
                    return Err(CaptureError::Platform(anyhow::Error::from(error).context(
                        format!("EnumOutputs({output_idx}) on adapter {adapter_idx} failed"),
                    )));
                }
            };

            let desc = unsafe { output.GetDesc() }
                .context("IDXGIOutput::GetDesc failed")
                .map_err(CaptureError::Platform)?;
            if desc.AttachedToDesktop.as_bool() {
                outputs.push((adapter_luid, adapter.clone(), output, desc));
            }

            output_idx += 1;
        }

        adapter_idx += 1;
    }

    Ok(outputs)
}

fn describe_output(
    adapter_luid: u64,
    output: &IDXGIOutput,
    desc: &DXGI_OUTPUT_DESC,
    primary: HMONITOR,
) -> MonitorDescriptor {
    let name = utf16z_to_string(&desc.DeviceName);
    let rect = desc.DesktopCoordinates;
    let width = rect.right.saturating_sub(rect.left).max(0) as u32;
    let height = rect.bottom.saturating_sub(rect.top).max(0) as u32;
    let rotation = rotation_from_dxgi(desc.Rotation);
    let (native_width, native_height) = rotation.native_size(width, height);

    let mut color_space = ColorSpace::Srgb;
    let mut max_luminance_nits = None;
    let mut min_luminance_nits = None;
    let mut max_frame_luminance_nits = None;
    // GetDesc1 needs IDXGIOutput6 (Windows 10 1703+); older systems
    // stay SDR with no luminance readings.
    if let Ok(output6) = output.cast::<IDXGIOutput6>() {
        if let Ok(desc1) = unsafe { output6.GetDesc1() } {
            if matches!(
                desc1.ColorSpace,
                DXGI_COLOR_SPACE_RGB_FULL_G2084_NONE_P2020
                    | DXGI_COLOR_SPACE_RGB_STUDIO_G2084_NONE_P2020
            ) {
                color_space = ColorSpace::Hdr10Pq;
            }
            max_luminance_nits = reported_nits(desc1.MaxLuminance);
            min_luminance_nits = reported_nits(desc1.MinLuminance);
            max_frame_luminance_nits = reported_nits(desc1.MaxFullFrameLuminance);
        }
    }

    MonitorDescriptor {
        key: MonitorKey::from_device_name(adapter_luid, &name),
        name,
        x: rect.left,
        y: rect.top,
        width,
        height,
        native_width,
        native_height,
        rotation,
        is_primary: desc.Monitor == primary,
        color_space,
        max_luminance_nits,
        min_luminance_nits,
        max_frame_luminance_nits,
    }
}

fn rotation_from_dxgi(rotation: DXGI_MODE_ROTATION) -> DisplayRotation {
    match rotation {
        DXGI_MODE_ROTATION_ROTATE90 => DisplayRotation::Rotate90,
        DXGI_MODE_ROTATION_ROTATE180 => DisplayRotation::Rotate180,
        DXGI_MODE_ROTATION_ROTATE270 => DisplayRotation::Rotate270,
        // IDENTITY and UNSPECIFIED both read as unrotated.
        _ => DisplayRotation::Identity,
    }
}

fn reported_nits(value: f32) -> Option<f32> {
    (value.is_finite() && value > 0.0).then_some(value)
}

fn primary_hmonitor() -> HMONITOR {
    unsafe { MonitorFromPoint(POINT { x: 0, y: 0 }, MONITOR_DEFAULTTOPRIMARY) }
}

fn luid_to_u64(luid: windows::Win32::Foundation::LUID) -> u64 {
    (u64::from(luid.HighPart as u32) << 32) | u64::from(luid.LowPart)
}

fn utf16z_to_string(input: &[u16]) -> String {
    let len = input.iter().position(|&ch| ch == 0).unwrap_or(input.len());
    String::from_utf16_lossy(&input[..len])
}
