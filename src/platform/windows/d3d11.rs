use anyhow::{Context, Result};
use windows::Win32::Graphics::Direct3D::{
    D3D_DRIVER_TYPE_HARDWARE, D3D_DRIVER_TYPE_UNKNOWN, D3D_FEATURE_LEVEL_11_0,
};
use windows::Win32::Graphics::Direct3D11::{
    D3D11_CREATE_DEVICE_BGRA_SUPPORT, D3D11_CREATE_DEVICE_SINGLETHREADED, D3D11_SDK_VERSION,
    D3D11CreateDevice, ID3D11Device, ID3D11DeviceContext,
};
use windows::Win32::Graphics::Dxgi::IDXGIAdapter;

/// Create a D3D11 device on the given adapter.
///
/// The device is created with `D3D11_CREATE_DEVICE_SINGLETHREADED`:
/// capture calls are serialized by the caller, so the driver's internal
/// locking is pure overhead.
pub(crate) fn create_device_for_adapter(
    adapter: &IDXGIAdapter,
) -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    create_device(Some(adapter))
}

/// Create a D3D11 device on the default hardware adapter. Used as the
/// duplication availability probe during auto backend selection.
pub(crate) fn create_device_default() -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    create_device(None)
}

fn create_device(adapter: Option<&IDXGIAdapter>) -> Result<(ID3D11Device, ID3D11DeviceContext)> {
    let mut device: Option<ID3D11Device> = None;
    let mut context: Option<ID3D11DeviceContext> = None;
    let feature_levels = [D3D_FEATURE_LEVEL_11_0];

    unsafe {
        D3D11CreateDevice(
            adapter,
            if adapter.is_some() {
                D3D_DRIVER_TYPE_UNKNOWN
            } else {
                D3D_DRIVER_TYPE_HARDWARE
            },
            None,
            D3D11_CREATE_DEVICE_BGRA_SUPPORT | D3D11_CREATE_DEVICE_SINGLETHREADED,
            Some(&feature_levels),
            D3D11_SDK_VERSION,
            Some(&mut device),
            None,
            Some(&mut context),
        )
    }
    .context("D3D11CreateDevice failed")?;

    let device = device.context("D3D11CreateDevice did not return a device")?;
    let context = context.context("D3D11CreateDevice did not return a device context")?;
    Ok((device, context))
}
