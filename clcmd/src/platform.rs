use crate::{
    error::Check,
    handle::{Handle, PlatformId},
    Device, DeviceInfo, Result,
};
use cl3::{
    device::get_device_ids,
    platform::{
        get_platform_ids, get_platform_info, CL_PLATFORM_EXTENSIONS, CL_PLATFORM_NAME,
        CL_PLATFORM_PROFILE, CL_PLATFORM_VENDOR, CL_PLATFORM_VERSION,
    },
    types::{cl_device_type, cl_int, cl_platform_id, cl_platform_info},
};

const CL_DEVICE_NOT_FOUND: cl_int = -1;
const CL_PLATFORM_NOT_FOUND_KHR: cl_int = -1001;

/// OpenCL 平台。平台 id 不计引用。
pub struct Platform(Handle<PlatformId>);

#[derive(Clone, Debug)]
pub struct PlatformInfo {
    pub profile: String,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub extensions: String,
    pub devices: Vec<DeviceInfo>,
}

impl Platform {
    /// 列出所有平台。系统中没有安装驱动时返回空表。
    pub fn all() -> Result<Vec<Self>> {
        match get_platform_ids() {
            Ok(ids) => Ok(ids
                .into_iter()
                .map(|raw| Self(unsafe { Handle::from_raw(raw) }))
                .collect()),
            Err(CL_PLATFORM_NOT_FOUND_KHR) => Ok(Vec::new()),
            Err(code) => Err(code).check("clGetPlatformIDs"),
        }
    }

    #[inline]
    pub fn id(&self) -> cl_platform_id {
        self.0.raw()
    }

    /// 列出平台上指定类型的设备。
    pub fn devices(&self, ty: cl_device_type) -> Result<Vec<Device>> {
        match get_device_ids(self.id(), ty) {
            Ok(ids) => Ok(ids.into_iter().map(Device::new).collect()),
            Err(CL_DEVICE_NOT_FOUND) => Ok(Vec::new()),
            Err(code) => Err(code).check("clGetDeviceIDs"),
        }
    }

    fn string(&self, param: cl_platform_info) -> Result<String> {
        let s: String = get_platform_info(self.id(), param)
            .check("clGetPlatformInfo")?
            .into();
        Ok(s.trim_end_matches('\0').to_string())
    }

    #[inline]
    pub fn name(&self) -> Result<String> {
        self.string(CL_PLATFORM_NAME)
    }

    /// 平台属性以及平台上所有设备的属性。
    pub fn info(&self, ty: cl_device_type) -> Result<PlatformInfo> {
        Ok(PlatformInfo {
            profile: self.string(CL_PLATFORM_PROFILE)?,
            name: self.string(CL_PLATFORM_NAME)?,
            vendor: self.string(CL_PLATFORM_VENDOR)?,
            version: self.string(CL_PLATFORM_VERSION)?,
            extensions: self.string(CL_PLATFORM_EXTENSIONS)?,
            devices: self
                .devices(ty)?
                .iter()
                .map(Device::info)
                .collect::<Result<_>>()?,
        })
    }
}

#[test]
fn test_enumerate() {
    use cl3::device::CL_DEVICE_TYPE_ALL;

    let Ok(platforms) = Platform::all() else {
        return;
    };
    for platform in platforms {
        let info = platform.info(CL_DEVICE_TYPE_ALL).unwrap();
        println!("{} {} ({} devices)", info.vendor, info.name, info.devices.len());
        assert_eq!(info.name, platform.name().unwrap());
    }
}
