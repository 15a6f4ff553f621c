//! 一次性运行：编译一个源文件，按参数描述准备缓冲区，发射一个核函数并取回结果。

use crate::{
    error::{
        functions::{build_failed, invalid_argument},
        Error,
    },
    AccessMode, ArgBinding, Config, HostData, Result, Session,
};
use common::DataLayout;
use log::info;
use std::{path::PathBuf, str::FromStr};

/// 参数的传递方式。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ArgMode {
    /// 设备缓冲区。
    Buffer(AccessMode),
    /// 局部存储，只有大小。
    Local,
    /// 按值传递的常量。
    Constant,
}

impl ArgMode {
    /// 运行前是否需要上传主机数据。
    #[inline]
    pub fn uploads(self) -> bool {
        matches!(
            self,
            Self::Buffer(AccessMode::ReadOnly | AccessMode::ReadWrite)
        )
    }
}

impl FromStr for ArgMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "l" => Ok(Self::Local),
            "t" => Ok(Self::Constant),
            _ => s.parse().map(Self::Buffer),
        }
    }
}

/// 一个核函数参数。
#[derive(Clone, Debug)]
pub struct ArgSpec {
    pub mode: ArgMode,
    pub layout: DataLayout,
    /// 缓冲区或局部存储的字节数。
    pub size: usize,
    /// 上传的数据或常量的值。
    pub data: Vec<u8>,
    /// 非空时运行结束后以此名字返回参数内容。
    pub field: Option<String>,
}

#[derive(Clone, Debug)]
pub struct RunSpec {
    pub path: PathBuf,
    pub name: String,
    pub platform: usize,
    pub devices: Vec<usize>,
    pub global: Vec<usize>,
    pub local: Vec<usize>,
    pub options: Option<String>,
    pub args: Vec<ArgSpec>,
}

/// 运行 `spec` 描述的核函数，在第一个设备的队列上执行，返回所有具名参数的内容。
///
/// 局部存储与常量参数原样返回输入数据；编译失败时返回携带编译日志的 [`ErrorKind::BuildFailed`](crate::ErrorKind::BuildFailed)。
pub fn run(spec: &RunSpec, config: Config) -> Result<Vec<(String, HostData)>> {
    let mut session = Session::new(config);
    session.initialize(spec.platform, &spec.devices)?;
    session.add_source(&spec.path)?;
    session.build(spec.options.as_deref())?;
    let program = session.program()?;
    if !program.is_built() {
        return Err(build_failed(program.error_log().unwrap_or_default()));
    }

    let mut buffers = Vec::with_capacity(spec.args.len());
    for (i, arg) in spec.args.iter().enumerate() {
        let ArgMode::Buffer(mode) = arg.mode else {
            buffers.push(None);
            continue;
        };
        if arg.data.len() > arg.size {
            return Err(invalid_argument(format!(
                "argument {i} carries {} bytes for a {} byte buffer",
                arg.data.len(),
                arg.size
            )));
        }
        let id = session.create_buffer(mode, arg.size)?;
        if arg.mode.uploads() && !arg.data.is_empty() {
            session.set_buffer(0, id, &arg.data)?;
        }
        buffers.push(Some(id));
    }

    let kernel = session.create_kernel(&spec.global, &spec.local, &spec.name)?;
    for (i, (arg, buffer)) in spec.args.iter().zip(&buffers).enumerate() {
        let binding = match (*buffer, arg.mode) {
            (Some(id), _) => ArgBinding::Buffer(id),
            (None, ArgMode::Local) => ArgBinding::Local(arg.size),
            (None, _) => ArgBinding::Value(&arg.data),
        };
        session.set_kernel_arg(kernel, i as _, binding)?;
    }
    drop(session.execute_kernel(0, kernel)?);
    info!("{} launched with {:?}", spec.name, spec.global);

    let mut outputs = Vec::new();
    for (arg, buffer) in spec.args.iter().zip(buffers) {
        let Some(field) = arg.field.as_ref().filter(|f| !f.is_empty()) else {
            continue;
        };
        let data = match buffer {
            Some(id) => session.get_buffer(0, id, arg.size / arg.layout.nbytes(), arg.layout)?,
            None => HostData::from_bytes(arg.layout, arg.data.clone())?,
        };
        outputs.push((field.clone(), data));
    }
    Ok(outputs)
}
