use crate::{
    error::functions::{invalid_argument, invalid_handle, not_initialized},
    AccessMode, Buffer, BuildInfo, CommandQueue, Context, Device, Event, HostData, Kernel,
    KernelArg, LaunchShape, Platform, PlatformInfo, Program, QueueProperties, Result,
};
use cl3::{device::CL_DEVICE_TYPE_ALL, types::cl_device_type};
use common::{DataLayout, Registry};
use log::{debug, info};
use std::path::Path;

/// 会话配置。
#[derive(Clone, Debug)]
pub struct Config {
    /// 新建队列的属性。
    pub queue_properties: QueueProperties,
    /// 构建时未指定选项则使用此选项。
    pub build_options: String,
    /// 初始化时按此类型筛选设备，设备下标基于筛选结果。
    pub device_type: cl_device_type,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_properties: QueueProperties::default(),
            build_options: String::new(),
            device_type: CL_DEVICE_TYPE_ALL as _,
        }
    }
}

/// 核函数参数的来源。
#[derive(Clone, Copy, Debug)]
pub enum ArgBinding<'a> {
    /// 会话中的缓冲区号。
    Buffer(usize),
    Value(&'a [u8]),
    Local(usize),
}

/// 一个平台上的全部资源。
///
/// 队列号即初始化时设备列表中的位置；缓冲区号与核函数号由各自的资源表分配，销毁后回收。
/// 所有资源都由会话持有，[`Session::cleanup`] 或析构时按核函数、队列、缓冲区、程序、上下文、平台的顺序释放。
pub struct Session {
    config: Config,
    platform: Option<Platform>,
    devices: Vec<Device>,
    context: Option<Context>,
    program: Option<Program>,
    queues: Registry<CommandQueue>,
    buffers: Registry<Buffer>,
    kernels: Registry<Kernel>,
}

impl Default for Session {
    #[inline]
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Session {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            platform: None,
            devices: Vec::new(),
            context: None,
            program: None,
            queues: Registry::new(),
            buffers: Registry::new(),
            kernels: Registry::new(),
        }
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.context.is_some()
    }

    /// 列出所有平台及其设备。
    pub fn enumerate(device_type: cl_device_type) -> Result<Vec<PlatformInfo>> {
        Platform::all()?
            .iter()
            .map(|p| p.info(device_type))
            .collect()
    }

    /// 连接第 `platform` 个平台，在 `devices` 指定的设备上建立上下文、程序，并为每一项建立一个队列。
    ///
    /// 已有会话先被清理。任何一步失败时会话保持未初始化。
    pub fn initialize(&mut self, platform: usize, devices: &[usize]) -> Result<()> {
        if self.is_initialized() {
            info!("reinitializing, previous session is cleaned up");
            self.cleanup()
        }
        if devices.is_empty() {
            return Err(invalid_argument("no device selected"));
        }

        let platform = Platform::all()?
            .into_iter()
            .nth(platform)
            .ok_or_else(|| invalid_argument(format!("platform {platform} not found")))?;
        info!("connecting platform {}", platform.name()?);

        let available = platform.devices(self.config.device_type)?;
        let selected = devices
            .iter()
            .map(|&i| {
                available
                    .get(i)
                    .cloned()
                    .ok_or_else(|| invalid_argument(format!("device {i} not found")))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut context = Context::new(&platform);
        for device in &selected {
            context.add_device(device.id());
        }
        context.create()?;
        let program = Program::new(&mut context)?;

        let mut queues = Registry::new();
        for device in &selected {
            info!("queue {} on {}", queues.len(), device.name()?);
            queues.allocate(CommandQueue::new(
                &mut context,
                device.id(),
                self.config.queue_properties,
            )?);
        }

        self.platform = Some(platform);
        self.devices = selected;
        self.context = Some(context);
        self.program = Some(program);
        self.queues = queues;
        Ok(())
    }

    fn program_mut(&mut self) -> Result<&mut Program> {
        self.program
            .as_mut()
            .ok_or_else(|| not_initialized("no program"))
    }

    #[inline]
    pub fn program(&self) -> Result<&Program> {
        self.program.as_ref().ok_or_else(|| not_initialized("no program"))
    }

    pub fn add_source(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.program_mut()?.add_source_file(path)
    }

    pub fn add_source_text(&mut self, text: impl Into<String>) -> Result<()> {
        self.program_mut()?.add_source(text);
        Ok(())
    }

    /// 为初始化时第 `device` 项设备添加二进制程序。
    pub fn add_binary(&mut self, device: usize, path: impl AsRef<Path>) -> Result<()> {
        let device = self
            .devices
            .get(device)
            .map(Device::id)
            .ok_or_else(|| invalid_argument(format!("device {device} not in session")))?;
        self.program_mut()?.add_binary_file(device, path)
    }

    /// 用已添加的源码或二进制重新生成并编译程序。编译失败体现在返回的结果中。
    pub fn build(&mut self, options: Option<&str>) -> Result<&[BuildInfo]> {
        let options = options.map_or_else(|| self.config.build_options.clone(), str::to_string);
        let program = self
            .program
            .as_mut()
            .ok_or_else(|| not_initialized("no program"))?;
        program.create()?;
        program.build(None, Some(options.as_str()))
    }

    fn context_mut(&mut self) -> Result<&mut Context> {
        self.context
            .as_mut()
            .ok_or_else(|| not_initialized("no context"))
    }

    pub fn create_buffer(&mut self, mode: AccessMode, size: usize) -> Result<usize> {
        let buffer = Buffer::with_size(self.context_mut()?, mode, size)?;
        let id = self.buffers.allocate(buffer);
        debug!("buffer {id} allocated ({size} bytes, {mode:?})");
        Ok(id)
    }

    /// 释放缓冲区。号码不存在时什么都不做，释放失败时返回错误。
    pub fn destroy_buffer(&mut self, id: usize) -> Result<()> {
        match self.buffers.remove(id) {
            Some(mut buffer) => {
                debug!("buffer {id} recycled");
                buffer.release()
            }
            None => Ok(()),
        }
    }

    pub fn buffer(&self, id: usize) -> Result<&Buffer> {
        self.buffers
            .get(id)
            .ok_or_else(|| invalid_handle(format!("buffer {id}")))
    }

    pub fn queue(&self, id: usize) -> Result<&CommandQueue> {
        if !self.is_initialized() {
            return Err(not_initialized("no queue"));
        }
        self.queues
            .get(id)
            .ok_or_else(|| invalid_handle(format!("queue {id}")))
    }

    pub fn kernel(&self, id: usize) -> Result<&Kernel> {
        self.kernels
            .get(id)
            .ok_or_else(|| invalid_handle(format!("kernel {id}")))
    }

    /// 阻塞写入 `data` 到缓冲区起始处，并等待队列完成。
    pub fn set_buffer(&self, queue: usize, buffer: usize, data: &[u8]) -> Result<()> {
        let queue = self.queue(queue)?;
        queue.write(self.buffer(buffer)?, data, 0, &[])?;
        queue.finish()
    }

    /// 阻塞读取缓冲区起始处的 `len` 个元素，并等待队列完成。
    pub fn get_buffer(
        &self,
        queue: usize,
        buffer: usize,
        len: usize,
        layout: DataLayout,
    ) -> Result<HostData> {
        let queue = self.queue(queue)?;
        let buffer = self.buffer(buffer)?;
        let mut data = HostData::zeroed(layout, len)?;
        if data.as_bytes().len() > buffer.size() {
            return Err(invalid_argument(format!(
                "{len} elements of {layout} exceed the {} byte buffer",
                buffer.size()
            )));
        }
        queue.read(data.as_bytes_mut(), buffer, 0, &[])?;
        queue.finish()?;
        Ok(data)
    }

    /// 在设备上复制，不等待完成。
    pub fn copy_buffer(
        &self,
        queue: usize,
        dst: usize,
        src: usize,
        size: usize,
        dst_offset: usize,
        src_offset: usize,
    ) -> Result<Event> {
        self.queue(queue)?.enqueue_copy(
            self.buffer(dst)?,
            self.buffer(src)?,
            size,
            dst_offset,
            src_offset,
            &[],
        )
    }

    /// 从已编译的程序创建核函数。全局尺寸开头的非零项决定维数。
    pub fn create_kernel(&mut self, global: &[usize], local: &[usize], name: &str) -> Result<usize> {
        let mut kernel = self.program()?.kernel(name)?;
        kernel.set_shape(LaunchShape::new(global, local));
        let id = self.kernels.allocate(kernel);
        debug!("kernel {id} allocated ({name})");
        Ok(id)
    }

    pub fn destroy_kernel(&mut self, id: usize) -> Result<()> {
        match self.kernels.remove(id) {
            Some(mut kernel) => {
                debug!("kernel {id} recycled");
                kernel.release()
            }
            None => Ok(()),
        }
    }

    pub fn set_kernel_arg(&self, kernel: usize, index: u32, arg: ArgBinding) -> Result<()> {
        let arg = match arg {
            ArgBinding::Buffer(id) => KernelArg::Buffer(self.buffer(id)?),
            ArgBinding::Value(bytes) => KernelArg::Value(bytes),
            ArgBinding::Local(size) => KernelArg::Local(size),
        };
        self.kernel(kernel)?.set_arg(index, arg)
    }

    /// 按核函数的发射形状入队，不等待完成。
    pub fn execute_kernel(&self, queue: usize, kernel: usize) -> Result<Event> {
        self.queue(queue)?.enqueue_kernel(self.kernel(kernel)?, &[])
    }

    pub fn wait_queue(&self, queue: usize) -> Result<()> {
        self.queue(queue)?.finish()
    }

    pub fn flush_queue(&self, queue: usize) -> Result<()> {
        self.queue(queue)?.flush()
    }

    /// 释放全部资源，会话回到未初始化状态。
    pub fn cleanup(&mut self) {
        let (kernels, queues, buffers) = (self.kernels.len(), self.queues.len(), self.buffers.len());
        self.kernels.clear();
        self.queues.clear();
        self.buffers.clear();
        self.program = None;
        self.context = None;
        self.devices.clear();
        if self.platform.take().is_some() {
            info!("cleaned up {kernels} kernel(s), {queues} queue(s), {buffers} buffer(s)")
        }
    }
}

impl Drop for Session {
    #[inline]
    fn drop(&mut self) {
        self.cleanup()
    }
}

#[cfg(test)]
mod test {
    use super::{ArgBinding, Config, Session};
    use crate::{
        error::ErrorKind, AccessMode, BuildStatus, Event, ExecStatus, Platform, QueueProperties,
    };
    use cl3::device::CL_DEVICE_TYPE_ALL;
    use common::types;
    use rand::Rng;
    use std::{env, fs, process};

    const FILL: &str = r#"
__kernel void fill(__global int *dst, int value) {
    dst[get_global_id(0)] = value;
}
"#;

    fn open() -> Option<Session> {
        let platform = Platform::all()
            .ok()?
            .iter()
            .position(|p| p.devices(CL_DEVICE_TYPE_ALL).is_ok_and(|d| !d.is_empty()))?;
        let mut session = Session::default();
        session.initialize(platform, &[0]).unwrap();
        Some(session)
    }

    #[test]
    fn test_not_initialized() {
        let mut session = Session::default();
        assert!(!session.is_initialized());
        fn kind<T>(r: crate::Result<T>) -> ErrorKind {
            r.map(drop).unwrap_err().kind
        }

        assert_eq!(kind(session.create_buffer(AccessMode::ReadWrite, 16)), ErrorKind::NotInitialized);
        assert_eq!(kind(session.queue(0)), ErrorKind::NotInitialized);
        assert_eq!(kind(session.build(None)), ErrorKind::NotInitialized);
        assert_eq!(kind(session.add_source("kernel.cl")), ErrorKind::NotInitialized);
        assert_eq!(kind(session.set_buffer(0, 0, &[1, 2])), ErrorKind::NotInitialized);
        assert_eq!(kind(session.buffer(0)), ErrorKind::InvalidHandle);
        assert_eq!(kind(session.initialize(0, &[])), ErrorKind::InvalidArgument);
        session.destroy_buffer(3).unwrap();
        session.destroy_kernel(0).unwrap();
        session.cleanup();
        session.cleanup();
    }

    #[test]
    fn test_bad_platform() {
        let Ok(platforms) = Platform::all() else {
            return;
        };
        let mut session = Session::default();
        let e = session.initialize(platforms.len(), &[0]).unwrap_err();
        assert_eq!(e.kind, ErrorKind::InvalidArgument);
        assert!(!session.is_initialized());
    }

    #[test]
    fn test_buffer_ids() {
        let Some(mut session) = open() else {
            return;
        };
        let ids = (0..3)
            .map(|_| session.create_buffer(AccessMode::ReadWrite, 64).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(ids, [0, 1, 2]);
        session.destroy_buffer(0).unwrap();
        assert_eq!(session.create_buffer(AccessMode::ReadOnly, 64).unwrap(), 0);
        session.destroy_buffer(1).unwrap();
        session.destroy_buffer(1).unwrap();
        assert_eq!(session.buffer(1).unwrap_err().kind, ErrorKind::InvalidHandle);
        assert_eq!(session.buffer(2).unwrap().size(), 64);
        assert_eq!(session.queue(1).unwrap_err().kind, ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_round_trip() {
        let Some(mut session) = open() else {
            return;
        };
        let mut rng = rand::thread_rng();
        const N: usize = 37;
        for (name, layout) in types::NAMES {
            let bytes = (0..N * layout.nbytes()).map(|_| rng.gen()).collect::<Vec<u8>>();
            let buffer = session.create_buffer(AccessMode::ReadWrite, bytes.len()).unwrap();
            session.set_buffer(0, buffer, &bytes).unwrap();
            let data = session.get_buffer(0, buffer, N, layout).unwrap();
            assert_eq!(data.layout(), layout, "{name}");
            assert_eq!(data.as_bytes(), bytes, "{name}");
            session.destroy_buffer(buffer).unwrap();
        }
    }

    #[test]
    fn test_last_binding_wins() {
        let Some(mut session) = open() else {
            return;
        };
        session.add_source_text(FILL).unwrap();
        let builds = session.build(None).unwrap();
        assert!(builds.iter().all(|b| b.status == BuildStatus::Success));

        const N: usize = 16;
        let zeros = vec![0u8; N * 4];
        let a = session.create_buffer(AccessMode::ReadWrite, zeros.len()).unwrap();
        let b = session.create_buffer(AccessMode::ReadWrite, zeros.len()).unwrap();
        session.set_buffer(0, a, &zeros).unwrap();
        session.set_buffer(0, b, &zeros).unwrap();

        let kernel = session.create_kernel(&[N], &[0], "fill").unwrap();
        assert_eq!(session.kernel(kernel).unwrap().num_args(), 2);
        session.set_kernel_arg(kernel, 0, ArgBinding::Buffer(a)).unwrap();
        session.set_kernel_arg(kernel, 0, ArgBinding::Buffer(b)).unwrap();
        session
            .set_kernel_arg(kernel, 1, ArgBinding::Value(&7i32.to_ne_bytes()))
            .unwrap();
        drop(session.execute_kernel(0, kernel).unwrap());
        session.wait_queue(0).unwrap();

        let a = session.get_buffer(0, a, N, types::I32).unwrap();
        let b = session.get_buffer(0, b, N, types::I32).unwrap();
        assert_eq!(a.to_vec::<i32>().unwrap(), [0; N]);
        assert_eq!(b.to_vec::<i32>().unwrap(), [7; N]);

        let device = session.queue(0).unwrap().device();
        let info = session.kernel(kernel).unwrap().work_group_info(device).unwrap();
        assert!(info.work_group_size > 0);

        let e = session.set_kernel_arg(kernel, 9, ArgBinding::Local(4)).unwrap_err();
        assert_eq!(e.kind, ErrorKind::Driver);
        session.destroy_kernel(kernel).unwrap();
        assert_eq!(session.kernel(kernel).unwrap_err().kind, ErrorKind::InvalidHandle);
    }

    #[test]
    fn test_ordered_copies() {
        let Some(mut session) = open() else {
            return;
        };
        let mut rng = rand::thread_rng();
        let data = (0..4096).map(|_| rng.gen()).collect::<Vec<u8>>();
        let [a, b, c] = [0; 3].map(|_| {
            session
                .create_buffer(AccessMode::ReadWrite, data.len())
                .unwrap()
        });
        session.set_buffer(0, a, &data).unwrap();
        drop(session.copy_buffer(0, b, a, data.len(), 0, 0).unwrap());
        drop(session.copy_buffer(0, c, b, data.len(), 0, 0).unwrap());
        session.flush_queue(0).unwrap();
        session.wait_queue(0).unwrap();
        let out = session.get_buffer(0, c, data.len(), types::U8).unwrap();
        assert_eq!(out.as_bytes(), data);
    }

    #[test]
    fn test_events() {
        let Some(platform) = Platform::all()
            .ok()
            .and_then(|p| p.iter().position(|p| p.devices(CL_DEVICE_TYPE_ALL).is_ok_and(|d| !d.is_empty())))
        else {
            return;
        };
        let mut session = Session::new(Config {
            queue_properties: QueueProperties::default().profiling(true),
            ..Default::default()
        });
        session.initialize(platform, &[0]).unwrap();

        let src = session.create_buffer(AccessMode::ReadOnly, 1 << 20).unwrap();
        let dst = session.create_buffer(AccessMode::WriteOnly, 1 << 20).unwrap();
        let copy = session.copy_buffer(0, dst, src, 1 << 20, 0, 0).unwrap();
        assert!(!copy.is_empty());

        let queue = session.queue(0).unwrap();
        let marker = queue.enqueue_marker(&[copy.try_clone().unwrap()]).unwrap();
        queue.enqueue_wait(&[Event::empty()]).unwrap();
        queue.flush().unwrap();
        Event::wait_all(&[copy.try_clone().unwrap(), marker]).unwrap();
        copy.wait().unwrap();

        assert_eq!(copy.status().unwrap(), ExecStatus::Complete);
        assert!(copy.ref_count().unwrap() >= 1);
        let profile = copy.profile().unwrap();
        assert!(profile.queued <= profile.submit);
        assert!(profile.start <= profile.end);
        println!("copy 1 MiB: {:?}", profile.duration());
    }

    #[test]
    fn test_failed_build() {
        let Some(mut session) = open() else {
            return;
        };
        session.add_source_text("__kernel void broken( {").unwrap();
        let builds = session.build(None).unwrap();
        assert!(!builds.is_empty());
        assert!(builds.iter().all(|b| b.status == BuildStatus::Error));
        let log = session.program().unwrap().error_log().unwrap();
        println!("{log}");
        assert!(!log.is_empty());
        assert!(session.create_kernel(&[1], &[], "broken").is_err());
    }

    #[test]
    fn test_source_file() {
        let Some(mut session) = open() else {
            return;
        };
        let path = env::temp_dir().join(format!("clcmd-fill-{}.cl", process::id()));
        fs::write(&path, FILL).unwrap();
        session.add_source(&path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(session.build(Some("-cl-fast-relaxed-math")).unwrap()[0].status == BuildStatus::Success);
        assert_eq!(
            session.add_source(&path).unwrap_err().kind,
            ErrorKind::FileAccess
        );
    }

    #[test]
    fn test_binary_reload() {
        let Some(mut session) = open() else {
            return;
        };
        session.add_source_text(FILL).unwrap();
        session.build(None).unwrap();
        let program = session.program().unwrap();
        let kernels = program
            .kernels()
            .unwrap()
            .iter()
            .map(|k| (k.name().to_string(), k.num_args()))
            .collect::<Vec<_>>();
        assert_eq!(kernels, [("fill".to_string(), 2)]);

        let binaries = program.built_binaries().unwrap();
        assert_eq!(binaries.len(), 1);
        let (device, binary) = &binaries[0];
        assert_eq!(*device, program.devices()[0]);
        assert!(!binary.is_empty());

        let path = env::temp_dir().join(format!("clcmd-fill-{}.bin", process::id()));
        fs::write(&path, binary).unwrap();
        session.add_binary(0, &path).unwrap();
        fs::remove_file(&path).unwrap();
        assert!(session.build(None).unwrap()[0].status == BuildStatus::Success);
        assert_eq!(session.program().unwrap().binaries().count(), 1);

        const N: usize = 8;
        let buffer = session.create_buffer(AccessMode::WriteOnly, N * 4).unwrap();
        let kernel = session.create_kernel(&[N], &[], "fill").unwrap();
        session.set_kernel_arg(kernel, 0, ArgBinding::Buffer(buffer)).unwrap();
        session
            .set_kernel_arg(kernel, 1, ArgBinding::Value(&(-3i32).to_ne_bytes()))
            .unwrap();
        drop(session.execute_kernel(0, kernel).unwrap());
        session.wait_queue(0).unwrap();
        let out = session.get_buffer(0, buffer, N, types::I32).unwrap();
        assert_eq!(out.to_vec::<i32>().unwrap(), [-3; N]);
    }
}
