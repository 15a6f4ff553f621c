use crate::{
    error::functions::invalid_argument, AccessMode, ArgBinding, HostData, PlatformInfo, Result,
    Session,
};
use common::DataLayout;
use log::error;
use std::path::PathBuf;

/// 会话命令。
///
/// 号码都是从 0 开始的下标；缓冲区号为负表示不绑定缓冲区。
#[derive(Clone, Debug)]
pub enum Command {
    Enumerate,
    Initialize {
        platform: usize,
        devices: Vec<usize>,
    },
    AddSource {
        path: PathBuf,
    },
    AddBinary {
        device: usize,
        path: PathBuf,
    },
    Build {
        options: Option<String>,
    },
    CreateBuffer {
        mode: String,
        size: usize,
    },
    DestroyBuffer {
        buffer: usize,
    },
    SetBuffer {
        queue: usize,
        buffer: usize,
        data: HostData,
    },
    GetBuffer {
        queue: usize,
        buffer: usize,
        len: usize,
        ty: String,
    },
    CopyBuffer {
        queue: usize,
        dst: usize,
        src: usize,
        size: usize,
        dst_offset: usize,
        src_offset: usize,
    },
    CreateKernel {
        local: Vec<u32>,
        global: Vec<u32>,
        name: String,
    },
    DestroyKernel {
        kernel: usize,
    },
    /// 缓冲区号非负时绑定缓冲区；否则 `data` 非空时按值绑定，为空时绑定 `size` 字节的局部存储。
    SetKernelArgs {
        kernel: usize,
        index: u32,
        buffer: i64,
        data: Option<HostData>,
        size: usize,
    },
    ExecuteKernel {
        queue: usize,
        kernel: usize,
    },
    WaitQueue {
        queue: usize,
    },
    FlushQueue {
        queue: usize,
    },
    Cleanup,
}

#[derive(Clone, Debug)]
pub enum Reply {
    Platforms(Vec<PlatformInfo>),
    Flag(bool),
    /// 新资源的号码，失败时为 -1。
    Id(i64),
    Build {
        ok: bool,
        log: String,
    },
    Data(Option<HostData>),
    Done,
}

impl Session {
    /// 执行一条命令。错误在这里记入日志并折算为失败的回复，不再向外传播。
    pub fn execute(&mut self, command: Command) -> Reply {
        match command {
            Command::Enumerate => {
                let platforms = Self::enumerate(self.config().device_type);
                Reply::Platforms(report(platforms).unwrap_or_default())
            }
            Command::Initialize { platform, devices } => {
                flag(self.initialize(platform, &devices))
            }
            Command::AddSource { path } => flag(self.add_source(path)),
            Command::AddBinary { device, path } => flag(self.add_binary(device, path)),
            Command::Build { options } => match self.build(options.as_deref()).map(drop) {
                Ok(()) => {
                    let program = self.program().ok();
                    Reply::Build {
                        ok: program.is_some_and(|p| p.is_built()),
                        log: program.and_then(|p| p.error_log()).unwrap_or_default(),
                    }
                }
                Err(e) => {
                    error!("{e}");
                    Reply::Build {
                        ok: false,
                        log: e.to_string(),
                    }
                }
            },
            Command::CreateBuffer { mode, size } => id(mode
                .parse::<AccessMode>()
                .and_then(|mode| self.create_buffer(mode, size))),
            Command::DestroyBuffer { buffer } => flag(self.destroy_buffer(buffer)),
            Command::SetBuffer {
                queue,
                buffer,
                data,
            } => flag(self.set_buffer(queue, buffer, data.as_bytes())),
            Command::GetBuffer {
                queue,
                buffer,
                len,
                ty,
            } => Reply::Data(report(
                DataLayout::from_name(&ty)
                    .ok_or_else(|| invalid_argument(format!("unknown element type \"{ty}\"")))
                    .and_then(|layout| self.get_buffer(queue, buffer, len, layout)),
            )),
            Command::CopyBuffer {
                queue,
                dst,
                src,
                size,
                dst_offset,
                src_offset,
            } => flag(
                self.copy_buffer(queue, dst, src, size, dst_offset, src_offset)
                    .map(drop),
            ),
            Command::CreateKernel {
                local,
                global,
                name,
            } => {
                let widen = |dims: &[u32]| dims.iter().map(|&n| n as usize).collect::<Vec<_>>();
                id(self.create_kernel(&widen(&global), &widen(&local), &name))
            }
            Command::DestroyKernel { kernel } => flag(self.destroy_kernel(kernel)),
            Command::SetKernelArgs {
                kernel,
                index,
                buffer,
                data,
                size,
            } => {
                let arg = match (usize::try_from(buffer), &data) {
                    (Ok(id), _) => ArgBinding::Buffer(id),
                    (Err(_), Some(data)) if !data.is_empty() => ArgBinding::Value(data.as_bytes()),
                    (Err(_), _) => ArgBinding::Local(size),
                };
                flag(self.set_kernel_arg(kernel, index, arg))
            }
            Command::ExecuteKernel { queue, kernel } => {
                flag(self.execute_kernel(queue, kernel).map(drop))
            }
            Command::WaitQueue { queue } => flag(self.wait_queue(queue)),
            Command::FlushQueue { queue } => flag(self.flush_queue(queue)),
            Command::Cleanup => {
                self.cleanup();
                Reply::Done
            }
        }
    }
}

fn report<T>(result: Result<T>) -> Option<T> {
    result.map_err(|e| error!("{e}")).ok()
}

#[inline]
fn flag(result: Result<()>) -> Reply {
    Reply::Flag(report(result).is_some())
}

#[inline]
fn id(result: Result<usize>) -> Reply {
    Reply::Id(report(result).map_or(-1, |id| id as i64))
}

#[cfg(test)]
mod test {
    use super::{Command, Reply};
    use crate::{HostData, Platform, Session};
    use cl3::device::CL_DEVICE_TYPE_ALL;
    use common::types;

    fn open() -> Option<Session> {
        let platform = Platform::all()
            .ok()?
            .iter()
            .position(|p| p.devices(CL_DEVICE_TYPE_ALL).is_ok_and(|d| !d.is_empty()))?;
        let mut session = Session::default();
        let reply = session.execute(Command::Initialize {
            platform,
            devices: vec![0],
        });
        assert!(matches!(reply, Reply::Flag(true)));
        Some(session)
    }

    #[test]
    fn test_before_initialize() {
        let mut session = Session::default();
        let reply = session.execute(Command::CreateBuffer {
            mode: "rw".into(),
            size: 64,
        });
        assert!(matches!(reply, Reply::Id(-1)));
        let reply = session.execute(Command::DestroyBuffer { buffer: 0 });
        assert!(matches!(reply, Reply::Flag(true)));
        let reply = session.execute(Command::WaitQueue { queue: 0 });
        assert!(matches!(reply, Reply::Flag(false)));
        let reply = session.execute(Command::GetBuffer {
            queue: 0,
            buffer: 0,
            len: 4,
            ty: "single".into(),
        });
        assert!(matches!(reply, Reply::Data(None)));
        let reply = session.execute(Command::Build { options: None });
        assert!(matches!(reply, Reply::Build { ok: false, .. }));
        assert!(matches!(session.execute(Command::Cleanup), Reply::Done));
    }

    #[test]
    fn test_scenario() {
        let Some(mut session) = open() else {
            return;
        };
        let create = |session: &mut Session, mode: &str| match session.execute(Command::CreateBuffer {
            mode: mode.into(),
            size: 1024,
        }) {
            Reply::Id(id) => id,
            reply => panic!("{reply:?}"),
        };

        assert_eq!(create(&mut session, "rw"), 0);
        assert_eq!(create(&mut session, "ro"), 1);
        assert!(matches!(
            session.execute(Command::DestroyBuffer { buffer: 0 }),
            Reply::Flag(true)
        ));
        assert_eq!(create(&mut session, "wo"), 0);
        assert_eq!(create(&mut session, "rw"), 2);
        assert_eq!(create(&mut session, "xx"), -1);

        let data = HostData::from_slice(&[1.0f32, 2., 3., 4.]);
        assert!(matches!(
            session.execute(Command::SetBuffer {
                queue: 0,
                buffer: 2,
                data: data.clone(),
            }),
            Reply::Flag(true)
        ));
        let Reply::Data(Some(out)) = session.execute(Command::GetBuffer {
            queue: 0,
            buffer: 2,
            len: 4,
            ty: "single".into(),
        }) else {
            panic!()
        };
        assert_eq!(out, data);
        assert_eq!(out.layout(), types::F32);

        let reply = session.execute(Command::GetBuffer {
            queue: 0,
            buffer: 2,
            len: 4,
            ty: "quad".into(),
        });
        assert!(matches!(reply, Reply::Data(None)));
        for len in [usize::MAX, 257] {
            let reply = session.execute(Command::GetBuffer {
                queue: 0,
                buffer: 2,
                len,
                ty: "single".into(),
            });
            assert!(matches!(reply, Reply::Data(None)));
        }

        assert!(matches!(session.execute(Command::Cleanup), Reply::Done));
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_kernel_commands() {
        let Some(mut session) = open() else {
            return;
        };
        let path = std::env::temp_dir().join(format!("clcmd-scale-{}.cl", std::process::id()));
        std::fs::write(
            &path,
            "__kernel void scale(__global float *x, float k) { x[get_global_id(0)] *= k; }",
        )
        .unwrap();
        assert!(matches!(
            session.execute(Command::AddSource { path: path.clone() }),
            Reply::Flag(true)
        ));
        std::fs::remove_file(&path).unwrap();

        let Reply::Build { ok: true, log } = session.execute(Command::Build { options: None }) else {
            panic!()
        };
        assert!(log.is_empty());

        let Reply::Id(buffer) = session.execute(Command::CreateBuffer {
            mode: "rw".into(),
            size: 16,
        }) else {
            panic!()
        };
        session.execute(Command::SetBuffer {
            queue: 0,
            buffer: buffer as _,
            data: HostData::from_slice(&[1.0f32, 2., 3., 4.]),
        });
        let Reply::Id(kernel) = session.execute(Command::CreateKernel {
            local: vec![],
            global: vec![4],
            name: "scale".into(),
        }) else {
            panic!()
        };
        assert_eq!(kernel, 0);

        for (index, buffer, data) in [
            (0, buffer, None),
            (1, -1, Some(HostData::from_slice(&[0.5f32]))),
        ] {
            let reply = session.execute(Command::SetKernelArgs {
                kernel: kernel as _,
                index,
                buffer,
                data,
                size: 0,
            });
            assert!(matches!(reply, Reply::Flag(true)));
        }
        for command in [
            Command::ExecuteKernel {
                queue: 0,
                kernel: kernel as _,
            },
            Command::FlushQueue { queue: 0 },
            Command::WaitQueue { queue: 0 },
        ] {
            assert!(matches!(session.execute(command), Reply::Flag(true)));
        }

        let Reply::Data(Some(out)) = session.execute(Command::GetBuffer {
            queue: 0,
            buffer: buffer as _,
            len: 4,
            ty: "single".into(),
        }) else {
            panic!()
        };
        assert_eq!(out.to_vec::<f32>().unwrap(), [0.5, 1., 1.5, 2.]);

        assert!(matches!(
            session.execute(Command::DestroyKernel { kernel: 0 }),
            Reply::Flag(true)
        ));
        assert!(matches!(
            session.execute(Command::ExecuteKernel { queue: 0, kernel: 0 }),
            Reply::Flag(false)
        ));
    }
}
