use crate::{
    error::{functions::invalid_argument, Check, Error},
    handle::{Handle, MemId},
    Context, Result,
};
use cl3::{
    memory::{
        create_buffer, get_mem_object_info, CL_MEM_FLAGS, CL_MEM_MAP_COUNT, CL_MEM_READ_ONLY,
        CL_MEM_READ_WRITE, CL_MEM_REFERENCE_COUNT, CL_MEM_SIZE, CL_MEM_WRITE_ONLY,
    },
    types::{cl_context, cl_mem, cl_mem_flags, cl_uint, cl_ulong},
};
use log::debug;
use std::{ffi::c_void, ptr::null_mut, str::FromStr};

/// 设备对缓冲区的访问方式。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl AccessMode {
    pub const fn flags(self) -> cl_mem_flags {
        match self {
            Self::ReadOnly => CL_MEM_READ_ONLY as _,
            Self::WriteOnly => CL_MEM_WRITE_ONLY as _,
            Self::ReadWrite => CL_MEM_READ_WRITE as _,
        }
    }

    pub fn from_flags(flags: cl_mem_flags) -> Option<Self> {
        const MASK: cl_mem_flags = (CL_MEM_READ_ONLY | CL_MEM_WRITE_ONLY | CL_MEM_READ_WRITE) as _;
        [Self::ReadOnly, Self::WriteOnly, Self::ReadWrite]
            .into_iter()
            .find(|mode| flags & MASK == mode.flags())
    }
}

impl FromStr for AccessMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "ro" => Ok(Self::ReadOnly),
            "wo" => Ok(Self::WriteOnly),
            "rw" => Ok(Self::ReadWrite),
            _ => Err(invalid_argument(format!("unknown access mode \"{s}\""))),
        }
    }
}

/// 设备存储区。
///
/// 大小与标志在创建前设定；再次创建会先释放已有的存储。映射计数与引用计数是最近一次查询时驱动报告的值。
#[derive(Debug)]
pub struct Buffer {
    handle: Handle<MemId>,
    context: cl_context,
    flags: cl_mem_flags,
    size: usize,
    host_ptr: *mut c_void,
    map_count: u32,
    ref_count: u32,
}

impl Buffer {
    /// 在 `context` 上准备一个尚未分配的缓冲区。
    pub fn new(context: &mut Context, mode: AccessMode) -> Result<Self> {
        Ok(Self {
            handle: Handle::null(),
            context: context.id()?,
            flags: mode.flags(),
            size: 0,
            host_ptr: null_mut(),
            map_count: 0,
            ref_count: 0,
        })
    }

    /// 分配 `size` 字节。
    pub fn with_size(context: &mut Context, mode: AccessMode, size: usize) -> Result<Self> {
        let mut ans = Self::new(context, mode)?;
        ans.set_size(size);
        ans.create()?;
        Ok(ans)
    }

    #[inline]
    pub fn set_size(&mut self, size: usize) {
        self.size = size
    }

    #[inline]
    pub fn set_flags(&mut self, flags: cl_mem_flags) {
        self.flags = flags
    }

    /// 设置创建时使用的主机指针，需配合相应的标志位。
    ///
    /// # Safety
    ///
    /// 驱动可能在缓冲区存活期间访问 `ptr` 指向的 `size` 字节。
    #[inline]
    pub unsafe fn set_host_ptr(&mut self, ptr: *mut c_void) {
        self.host_ptr = ptr
    }

    pub fn create(&mut self) -> Result<()> {
        self.handle.release()?;
        let raw = unsafe { create_buffer(self.context, self.flags, self.size, self.host_ptr) }
            .check("clCreateBuffer")?;
        unsafe { self.handle.assign(raw) }?;
        debug!("buffer of {} bytes created", self.size);
        self.query_info()
    }

    /// 从驱动刷新大小、标志与计数。
    pub fn query_info(&mut self) -> Result<()> {
        let raw = self.raw();
        let query = |param| get_mem_object_info(raw, param).check("clGetMemObjectInfo");
        self.size = query(CL_MEM_SIZE)?.into();
        self.flags = cl_ulong::from(query(CL_MEM_FLAGS)?) as _;
        self.map_count = cl_uint::from(query(CL_MEM_MAP_COUNT)?);
        self.ref_count = cl_uint::from(query(CL_MEM_REFERENCE_COUNT)?);
        Ok(())
    }

    /// 立即释放存储，返回驱动报告的错误。
    #[inline]
    pub fn release(&mut self) -> Result<()> {
        self.handle.release()
    }

    #[inline]
    pub fn raw(&self) -> cl_mem {
        self.handle.raw()
    }

    #[inline]
    pub fn is_created(&self) -> bool {
        !self.handle.is_null()
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    #[inline]
    pub fn flags(&self) -> cl_mem_flags {
        self.flags
    }

    #[inline]
    pub fn mode(&self) -> Option<AccessMode> {
        AccessMode::from_flags(self.flags)
    }

    #[inline]
    pub fn host_ptr(&self) -> *mut c_void {
        self.host_ptr
    }

    #[inline]
    pub fn map_count(&self) -> u32 {
        self.map_count
    }

    #[inline]
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    #[inline]
    pub fn context(&self) -> cl_context {
        self.context
    }
}
