use crate::{
    error::{functions::invalid_argument, Check},
    handle::{Handle, KernelId},
    Buffer, Element, Program, Result,
};
use cl3::{
    kernel::{
        create_kernel, get_kernel_info, get_kernel_work_group_info, set_kernel_arg,
        CL_KERNEL_COMPILE_WORK_GROUP_SIZE, CL_KERNEL_FUNCTION_NAME, CL_KERNEL_LOCAL_MEM_SIZE,
        CL_KERNEL_NUM_ARGS,
        CL_KERNEL_WORK_GROUP_SIZE,
    },
    types::{cl_context, cl_device_id, cl_kernel, cl_mem, cl_program, cl_uint, cl_ulong},
};
use log::debug;
use std::{
    ffi::{c_void, CString},
    mem::size_of,
    ptr::null,
    slice::from_raw_parts,
};

/// 1 到 3 维的发射形状。
///
/// 维数只由 [`LaunchShape::new`] 推出，不会超过 3。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct LaunchShape {
    dims: u32,
    offset: [usize; 3],
    global: [usize; 3],
    local: [usize; 3],
}

impl LaunchShape {
    /// 由全局与局部尺寸构造。超出 3 维的部分被截断，维数是全局尺寸开头非零项的个数。
    pub fn new(global: &[usize], local: &[usize]) -> Self {
        let mut ans = Self::default();
        for (dst, &src) in ans.global.iter_mut().zip(global) {
            *dst = src
        }
        for (dst, &src) in ans.local.iter_mut().zip(local) {
            *dst = src
        }
        ans.dims = ans.global.iter().take_while(|&&n| n != 0).count() as _;
        ans
    }

    /// 设置全局偏移，超出 3 维的部分被截断。
    pub fn with_offset(mut self, offset: &[usize]) -> Self {
        for (dst, &src) in self.offset.iter_mut().zip(offset) {
            *dst = src
        }
        self
    }

    #[inline]
    pub fn dims(&self) -> u32 {
        self.dims
    }

    /// 局部尺寸全为 0 时返回 [`None`]，由驱动决定。
    pub fn local_size(&self) -> Option<&[usize]> {
        let local = &self.local[..self.dims as usize];
        if local.iter().all(|&n| n == 0) {
            None
        } else {
            Some(local)
        }
    }

    #[inline]
    pub fn global_size(&self) -> &[usize] {
        &self.global[..self.dims as usize]
    }

    #[inline]
    pub fn global_offset(&self) -> &[usize] {
        &self.offset[..self.dims as usize]
    }
}

/// 核函数参数。
#[derive(Clone, Copy, Debug)]
pub enum KernelArg<'a> {
    /// 设备缓冲区。
    Buffer(&'a Buffer),
    /// 按字节复制的值。
    Value(&'a [u8]),
    /// 指定字节数的局部存储，没有值。
    Local(usize),
}

impl<'a> KernelArg<'a> {
    #[inline]
    pub fn scalar<T: Element>(value: &'a T) -> Self {
        Self::Value(unsafe { from_raw_parts((value as *const T).cast(), size_of::<T>()) })
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct WorkGroupInfo {
    pub work_group_size: usize,
    pub compile_work_group_size: [usize; 3],
    pub local_mem_size: u64,
}

/// 程序中的一个入口函数及其发射形状。
#[derive(Debug)]
pub struct Kernel {
    handle: Handle<KernelId>,
    name: String,
    num_args: u32,
    context: cl_context,
    program: cl_program,
    shape: LaunchShape,
}

impl Kernel {
    pub fn new(program: &Program, name: &str) -> Result<Self> {
        let c_name = CString::new(name).map_err(|_| invalid_argument("kernel name contains NUL"))?;
        let raw = create_kernel(program.raw(), &c_name).check("clCreateKernel")?;
        Self::from_handle(program, unsafe { Handle::from_raw(raw) })
    }

    /// 包装 `program` 中已创建的核函数，名字与参数个数从驱动读出。
    pub(crate) fn from_handle(program: &Program, handle: Handle<KernelId>) -> Result<Self> {
        let query = |param| get_kernel_info(handle.raw(), param).check("clGetKernelInfo");
        let name: String = query(CL_KERNEL_FUNCTION_NAME)?.into();
        let name = name.trim_end_matches('\0').to_string();
        let num_args: cl_uint = query(CL_KERNEL_NUM_ARGS)?.into();
        debug!("kernel {name} created with {num_args} argument(s)");
        Ok(Self {
            handle,
            name,
            num_args,
            context: program.context(),
            program: program.raw(),
            shape: LaunchShape::default(),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn num_args(&self) -> u32 {
        self.num_args
    }

    #[inline]
    pub fn shape(&self) -> &LaunchShape {
        &self.shape
    }

    #[inline]
    pub fn set_shape(&mut self, shape: LaunchShape) {
        self.shape = shape
    }

    #[inline]
    pub fn release(&mut self) -> Result<()> {
        self.handle.release()
    }

    #[inline]
    pub fn raw(&self) -> cl_kernel {
        self.handle.raw()
    }

    #[inline]
    pub fn context(&self) -> cl_context {
        self.context
    }

    #[inline]
    pub fn program(&self) -> cl_program {
        self.program
    }

    /// 绑定第 `index` 个参数。绑定立即生效，同一位置以最后一次绑定为准；下标由驱动检查。
    pub fn set_arg(&self, index: u32, arg: KernelArg) -> Result<()> {
        let mem: cl_mem;
        let (size, value) = match arg {
            KernelArg::Buffer(buffer) => {
                mem = buffer.raw();
                (size_of::<cl_mem>(), (&mem as *const cl_mem).cast::<c_void>())
            }
            KernelArg::Value(bytes) => (bytes.len(), bytes.as_ptr().cast()),
            KernelArg::Local(size) => (size, null()),
        };
        unsafe { set_kernel_arg(self.raw(), index as cl_uint, size, value) }
            .check("clSetKernelArg")
    }

    pub fn work_group_info(&self, device: cl_device_id) -> Result<WorkGroupInfo> {
        let query = |param| {
            get_kernel_work_group_info(self.raw(), device, param)
                .check("clGetKernelWorkGroupInfo")
        };
        let compile: Vec<usize> = query(CL_KERNEL_COMPILE_WORK_GROUP_SIZE)?.into();
        let mut compile_work_group_size = [0; 3];
        for (dst, src) in compile_work_group_size.iter_mut().zip(compile) {
            *dst = src
        }
        Ok(WorkGroupInfo {
            work_group_size: query(CL_KERNEL_WORK_GROUP_SIZE)?.into(),
            compile_work_group_size,
            local_mem_size: cl_ulong::from(query(CL_KERNEL_LOCAL_MEM_SIZE)?),
        })
    }
}

#[cfg(test)]
mod test {
    use super::{KernelArg, LaunchShape};

    #[test]
    fn test_dims() {
        let shape = LaunchShape::new(&[64, 8], &[16, 1]);
        assert_eq!(shape.dims(), 2);
        assert_eq!(shape.global_size(), [64, 8]);
        assert_eq!(shape.local_size(), Some(&[16, 1][..]));

        let shape = LaunchShape::new(&[1024, 0, 7], &[]);
        assert_eq!(shape.dims(), 1);
        assert_eq!(shape.local_size(), None);

        let shape = LaunchShape::new(&[2, 3, 4, 5], &[1, 1, 1, 1]);
        assert_eq!(shape.dims(), 3);
        assert_eq!(shape.global_size(), [2, 3, 4]);
        assert_eq!(shape.local_size(), Some(&[1, 1, 1][..]));

        let shape = LaunchShape::new(&[], &[]);
        assert_eq!(shape.dims(), 0);
        assert!(shape.global_size().is_empty());
    }

    #[test]
    fn test_offset() {
        let shape = LaunchShape::new(&[8, 8], &[]).with_offset(&[1, 2, 3, 4]);
        assert_eq!(shape.global_offset(), [1, 2]);
        assert_eq!(shape.global_size(), [8, 8]);
        assert_eq!(LaunchShape::default().with_offset(&[5]).global_offset(), [0usize; 0]);
    }

    #[test]
    fn test_scalar_bytes() {
        let v = 0x0102_0304u32;
        let KernelArg::Value(bytes) = KernelArg::scalar(&v) else {
            panic!()
        };
        assert_eq!(bytes, v.to_ne_bytes());
    }
}
