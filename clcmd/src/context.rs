use crate::{
    error::{functions::invalid_argument, Check},
    handle::{ContextId, Handle},
    Platform, Result,
};
use cl3::{
    context::{create_context, CL_CONTEXT_PLATFORM},
    types::{cl_context, cl_context_properties, cl_device_id},
};
use log::info;
use std::ptr::{null, null_mut};

/// 设备集合上的上下文。
///
/// 设备与属性在创建前收集，创建后再添加不影响已创建的上下文，直到下一次 [`Context::create`]。
pub struct Context {
    handle: Handle<ContextId>,
    devices: Vec<cl_device_id>,
    properties: Vec<(cl_context_properties, cl_context_properties)>,
}

impl Default for Context {
    #[inline]
    fn default() -> Self {
        Self {
            handle: Handle::null(),
            devices: Vec::new(),
            properties: Vec::new(),
        }
    }
}

impl Context {
    /// 绑定到 `platform` 的空上下文。
    pub fn new(platform: &Platform) -> Self {
        let mut ans = Self::default();
        ans.add_property(
            CL_CONTEXT_PLATFORM as cl_context_properties,
            platform.id() as cl_context_properties,
        );
        ans
    }

    #[inline]
    pub fn add_property(&mut self, name: cl_context_properties, value: cl_context_properties) {
        self.properties.push((name, value))
    }

    /// 添加设备，已存在的设备被忽略。返回是否实际添加。
    pub fn add_device(&mut self, device: cl_device_id) -> bool {
        if self.devices.contains(&device) {
            false
        } else {
            self.devices.push(device);
            true
        }
    }

    #[inline]
    pub fn devices(&self) -> &[cl_device_id] {
        &self.devices
    }

    #[inline]
    pub fn is_created(&self) -> bool {
        !self.handle.is_null()
    }

    /// 用当前的设备与属性创建上下文，先释放已创建的上下文。
    pub fn create(&mut self) -> Result<()> {
        if self.devices.is_empty() {
            return Err(invalid_argument("context has no device"));
        }
        let properties = if self.properties.is_empty() {
            Vec::new()
        } else {
            self.properties
                .iter()
                .flat_map(|&(k, v)| [k, v])
                .chain([0])
                .collect()
        };
        let props = if properties.is_empty() {
            null()
        } else {
            properties.as_ptr()
        };

        self.handle.release()?;
        let raw = create_context(&self.devices, props, None, null_mut())
            .check("clCreateContext")?;
        unsafe { self.handle.assign(raw) }?;
        info!("context created on {} device(s)", self.devices.len());
        Ok(())
    }

    /// 上下文 id，尚未创建时先创建。
    pub fn id(&mut self) -> Result<cl_context> {
        if !self.is_created() {
            self.create()?
        }
        Ok(self.handle.raw())
    }

    /// 已创建的上下文 id，未创建时为空。
    #[inline]
    pub fn raw(&self) -> cl_context {
        self.handle.raw()
    }
}

#[cfg(test)]
mod test {
    use super::Context;
    use crate::{error::ErrorKind, Platform};
    use cl3::device::CL_DEVICE_TYPE_ALL;

    #[test]
    fn test_dedup() {
        let mut ctx = Context::default();
        let a = 0x10usize as cl3::types::cl_device_id;
        let b = 0x20usize as cl3::types::cl_device_id;
        assert!(ctx.add_device(a));
        assert!(ctx.add_device(b));
        assert!(!ctx.add_device(a));
        assert_eq!(ctx.devices(), [a, b]);
        assert!(!ctx.is_created());
    }

    #[test]
    fn test_empty() {
        let mut ctx = Context::default();
        let e = ctx.create().unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);
        assert!(ctx.id().is_err());
    }

    #[test]
    fn test_create() {
        for platform in Platform::all().unwrap_or_default() {
            let devices = platform.devices(CL_DEVICE_TYPE_ALL).unwrap_or_default();
            let Some(device) = devices.first() else {
                continue;
            };
            let mut ctx = Context::new(&platform);
            ctx.add_device(device.id());
            let id = ctx.id().unwrap();
            assert!(!id.is_null());
            assert_eq!(ctx.id().unwrap(), id);
            ctx.create().unwrap();
            assert!(ctx.is_created());
        }
    }
}
