use crate::{
    error::{
        functions::{file_access, invalid_argument},
        Check,
    },
    handle::{Handle, KernelId, ProgramId},
    Context, Kernel, Result,
};
use cl3::{
    kernel::create_kernels_in_program,
    program::{
        build_program, create_program_with_binary, create_program_with_source,
        get_program_build_info, get_program_info, CL_BUILD_ERROR, CL_BUILD_IN_PROGRESS,
        CL_BUILD_SUCCESS, CL_PROGRAM_BINARIES, CL_PROGRAM_BUILD_LOG, CL_PROGRAM_BUILD_OPTIONS,
        CL_PROGRAM_BUILD_STATUS, CL_PROGRAM_DEVICES,
    },
    types::{cl_context, cl_device_id, cl_int, cl_program},
};
use log::{debug, info};
use std::{ffi::CString, fmt, fs, path::Path, ptr::null_mut};

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum BuildStatus {
    None,
    Success,
    Error,
    InProgress,
}

impl BuildStatus {
    pub fn from_raw(raw: cl_int) -> Self {
        match raw {
            x if x == CL_BUILD_SUCCESS as cl_int => Self::Success,
            x if x == CL_BUILD_ERROR as cl_int => Self::Error,
            x if x == CL_BUILD_IN_PROGRESS as cl_int => Self::InProgress,
            _ => Self::None,
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "BUILD NONE",
            Self::Success => "BUILD SUCCESS",
            Self::Error => "BUILD ERROR",
            Self::InProgress => "BUILD IN PROGRESS",
        })
    }
}

/// 一个设备上的构建结果。
#[derive(Clone, Debug)]
pub struct BuildInfo {
    pub device: cl_device_id,
    pub status: BuildStatus,
    pub options: String,
    pub log: String,
}

/// 程序对象的生命周期阶段。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ProgramState {
    Empty,
    Added,
    Created,
    Built,
}

/// 由源码或按设备对齐的二进制组成的程序。
///
/// 添加源码或二进制不接触驱动；[`Program::create`] 生成驱动程序对象，[`Program::build`] 编译它。
/// 编译失败不是错误，结果记录在每个设备的 [`BuildInfo`] 中。
pub struct Program {
    handle: Handle<ProgramId>,
    context: cl_context,
    context_devices: Vec<cl_device_id>,
    sources: Vec<String>,
    binary_devices: Vec<cl_device_id>,
    binaries: Vec<Vec<u8>>,
    options: String,
    builds: Vec<BuildInfo>,
}

impl Program {
    /// 在 `context` 上创建空程序，上下文尚未创建时先创建。
    pub fn new(context: &mut Context) -> Result<Self> {
        Ok(Self {
            handle: Handle::null(),
            context: context.id()?,
            context_devices: context.devices().to_vec(),
            sources: Vec::new(),
            binary_devices: Vec::new(),
            binaries: Vec::new(),
            options: String::new(),
            builds: Vec::new(),
        })
    }

    #[inline]
    pub fn add_source(&mut self, text: impl Into<String>) {
        self.sources.push(text.into())
    }

    pub fn add_source_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| file_access(path, e))?;
        debug!("source added from {}", path.display());
        self.add_source(text);
        Ok(())
    }

    /// 为 `device` 添加二进制，同一设备的旧二进制被替换。
    pub fn add_binary(&mut self, device: cl_device_id, binary: Vec<u8>) {
        match self.binary_devices.iter().position(|&d| d == device) {
            Some(i) => self.binaries[i] = binary,
            None => {
                self.binary_devices.push(device);
                self.binaries.push(binary);
            }
        }
    }

    pub fn add_binary_file(&mut self, device: cl_device_id, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let binary = fs::read(path).map_err(|e| file_access(path, e))?;
        self.add_binary(device, binary);
        Ok(())
    }

    #[inline]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    pub fn binaries(&self) -> impl Iterator<Item = (cl_device_id, &[u8])> {
        self.binary_devices
            .iter()
            .copied()
            .zip(self.binaries.iter().map(Vec::as_slice))
    }

    pub fn state(&self) -> ProgramState {
        if !self.builds.is_empty() {
            ProgramState::Built
        } else if !self.handle.is_null() {
            ProgramState::Created
        } else if !self.sources.is_empty() || !self.binaries.is_empty() {
            ProgramState::Added
        } else {
            ProgramState::Empty
        }
    }

    /// 生成驱动程序对象，先释放已有的。有二进制时用二进制，否则按添加顺序拼接源码。
    pub fn create(&mut self) -> Result<()> {
        self.handle.release()?;
        self.builds.clear();

        let raw = if !self.binaries.is_empty() {
            let binaries = self.binaries.iter().map(Vec::as_slice).collect::<Vec<_>>();
            unsafe { create_program_with_binary(self.context, &self.binary_devices, &binaries) }
                .check("clCreateProgramWithBinary")?
        } else if !self.sources.is_empty() {
            let sources = self.sources.iter().map(String::as_str).collect::<Vec<_>>();
            create_program_with_source(self.context, &sources)
                .check("clCreateProgramWithSource")?
        } else {
            return Err(invalid_argument("program has neither source nor binary"));
        };
        unsafe { self.handle.assign(raw) }
    }

    /// 为 `devices`（缺省为上下文的全部设备）编译程序，返回每个设备的结果。
    ///
    /// 尚未创建时先创建。编译失败体现在结果中而不是返回错误，只有驱动查询失败才返回错误。
    pub fn build(
        &mut self,
        devices: Option<&[cl_device_id]>,
        options: Option<&str>,
    ) -> Result<&[BuildInfo]> {
        if self.handle.is_null() {
            self.create()?
        }
        if let Some(options) = options {
            self.options = options.into();
        }
        let options = CString::new(self.options.as_str())
            .map_err(|_| invalid_argument("build options contain NUL"))?;
        let devices = devices.map_or_else(|| self.context_devices.clone(), <[_]>::to_vec);

        let program = self.handle.raw();
        if let Err(code) = build_program(program, &devices, &options, None, null_mut()) {
            debug!("clBuildProgram returned {code}")
        }

        self.builds = devices
            .iter()
            .map(|&device| query_build(program, device))
            .collect::<Result<_>>()?;
        for build in &self.builds {
            info!("{}: {}", build.status, self.options);
        }
        Ok(&self.builds)
    }

    #[inline]
    pub fn builds(&self) -> &[BuildInfo] {
        &self.builds
    }

    /// 是否已为至少一个设备编译，且全部成功。
    pub fn is_built(&self) -> bool {
        !self.builds.is_empty() && self.builds.iter().all(|b| b.status == BuildStatus::Success)
    }

    /// 所有编译失败设备的日志，没有失败时为 [`None`]。
    pub fn error_log(&self) -> Option<String> {
        let logs = self
            .builds
            .iter()
            .filter(|b| b.status == BuildStatus::Error)
            .map(|b| b.log.as_str())
            .collect::<Vec<_>>();
        if logs.is_empty() {
            None
        } else {
            Some(logs.join("\n"))
        }
    }

    #[inline]
    pub fn kernel(&self, name: &str) -> Result<Kernel> {
        Kernel::new(self, name)
    }

    /// 创建程序中的全部核函数。
    pub fn kernels(&self) -> Result<Vec<Kernel>> {
        let handles = create_kernels_in_program(self.raw())
            .check("clCreateKernelsInProgram")?
            .into_iter()
            .map(|raw| unsafe { Handle::<KernelId>::from_raw(raw) })
            .collect::<Vec<_>>();
        handles
            .into_iter()
            .map(|handle| Kernel::from_handle(self, handle))
            .collect()
    }

    /// 从驱动读出编译产物，按程序的设备顺序与设备配对。未编译成功的设备对应空的二进制。
    ///
    /// 结果可以交给 [`Program::add_binary`] 重新创建同样的程序。
    pub fn built_binaries(&self) -> Result<Vec<(cl_device_id, Vec<u8>)>> {
        let program = self.raw();
        let query = |param| get_program_info(program, param).check("clGetProgramInfo");
        let devices: Vec<isize> = query(CL_PROGRAM_DEVICES)?.into();
        let binaries: Vec<Vec<u8>> = query(CL_PROGRAM_BINARIES)?.into();
        debug!("{} binaries read back", binaries.len());
        Ok(devices
            .into_iter()
            .map(|device| device as cl_device_id)
            .zip(binaries)
            .collect())
    }

    #[inline]
    pub fn raw(&self) -> cl_program {
        self.handle.raw()
    }

    #[inline]
    pub fn context(&self) -> cl_context {
        self.context
    }

    #[inline]
    pub fn devices(&self) -> &[cl_device_id] {
        &self.context_devices
    }
}

fn query_build(program: cl_program, device: cl_device_id) -> Result<BuildInfo> {
    let query = |param| {
        get_program_build_info(program, device, param).check("clGetProgramBuildInfo")
    };
    let text = |param| -> Result<String> {
        let s: String = query(param)?.into();
        Ok(s.trim_end_matches('\0').to_string())
    };
    Ok(BuildInfo {
        device,
        status: BuildStatus::from_raw(query(CL_PROGRAM_BUILD_STATUS)?.into()),
        options: text(CL_PROGRAM_BUILD_OPTIONS)?,
        log: text(CL_PROGRAM_BUILD_LOG)?,
    })
}
