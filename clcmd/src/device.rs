use crate::{
    error::Check,
    handle::{DeviceId, Handle},
    Result,
};
use cl3::{
    device::{
        get_device_info, CL_DEVICE_EXTENSIONS, CL_DEVICE_GLOBAL_MEM_SIZE, CL_DEVICE_LOCAL_MEM_SIZE,
        CL_DEVICE_MAX_COMPUTE_UNITS, CL_DEVICE_MAX_WORK_GROUP_SIZE, CL_DEVICE_NAME,
        CL_DEVICE_PROFILE, CL_DEVICE_TYPE, CL_DEVICE_VENDOR, CL_DEVICE_VERSION, CL_DRIVER_VERSION,
    },
    types::{cl_device_id, cl_device_info, cl_device_type, cl_uint, cl_ulong},
};

/// 计算设备。设备 id 由平台持有，句柄的复制与释放都不改变驱动计数。
pub struct Device(Handle<DeviceId>);

impl Clone for Device {
    #[inline]
    fn clone(&self) -> Self {
        Self(unsafe { Handle::from_raw(self.0.raw()) })
    }
}

#[derive(Clone, Debug)]
pub struct DeviceInfo {
    pub profile: String,
    pub name: String,
    pub vendor: String,
    pub version: String,
    pub driver: String,
    pub extensions: String,
    pub ty: cl_device_type,
    pub compute_units: u32,
    pub max_work_group_size: usize,
    pub global_mem_size: u64,
    pub local_mem_size: u64,
}

impl Device {
    #[inline]
    pub(crate) fn new(raw: cl_device_id) -> Self {
        Self(unsafe { Handle::from_raw(raw) })
    }

    #[inline]
    pub fn id(&self) -> cl_device_id {
        self.0.raw()
    }

    #[inline]
    fn query(&self, param: cl_device_info) -> Result<cl3::info_type::InfoType> {
        get_device_info(self.id(), param).check("clGetDeviceInfo")
    }

    fn string(&self, param: cl_device_info) -> Result<String> {
        let s: String = self.query(param)?.into();
        Ok(s.trim_end_matches('\0').to_string())
    }

    #[inline]
    pub fn name(&self) -> Result<String> {
        self.string(CL_DEVICE_NAME)
    }

    pub fn info(&self) -> Result<DeviceInfo> {
        Ok(DeviceInfo {
            profile: self.string(CL_DEVICE_PROFILE)?,
            name: self.string(CL_DEVICE_NAME)?,
            vendor: self.string(CL_DEVICE_VENDOR)?,
            version: self.string(CL_DEVICE_VERSION)?,
            driver: self.string(CL_DRIVER_VERSION)?,
            extensions: self.string(CL_DEVICE_EXTENSIONS)?,
            ty: cl_ulong::from(self.query(CL_DEVICE_TYPE)?) as _,
            compute_units: cl_uint::from(self.query(CL_DEVICE_MAX_COMPUTE_UNITS)?),
            max_work_group_size: usize::from(self.query(CL_DEVICE_MAX_WORK_GROUP_SIZE)?),
            global_mem_size: cl_ulong::from(self.query(CL_DEVICE_GLOBAL_MEM_SIZE)?),
            local_mem_size: cl_ulong::from(self.query(CL_DEVICE_LOCAL_MEM_SIZE)?),
        })
    }
}

#[test]
fn test_info() {
    use crate::Platform;
    use cl3::device::CL_DEVICE_TYPE_ALL;

    for platform in Platform::all().unwrap_or_default() {
        for device in platform.devices(CL_DEVICE_TYPE_ALL).unwrap_or_default() {
            let info = device.info().unwrap();
            println!(
                "{} ({}) compute units = {} max work group = {}",
                info.name, info.version, info.compute_units, info.max_work_group_size
            );
            assert!(!info.name.is_empty());
            assert!(info.compute_units > 0);
            assert_eq!(device.clone().id(), device.id());
        }
    }
}
