//! OpenCL 资源的生命周期管理与命令会话。
//!
//! 驱动对象由 [`Handle`] 持有引用，析构时释放；缓冲区、核函数与队列放在 [`Registry`] 中按号码访问；
//! [`Session`] 持有一个平台上的全部资源，[`Command`] 是会话对外的命令面。

#![deny(warnings)]

mod buffer;
mod command;
mod context;
mod data;
mod device;
mod error;
mod event;
mod handle;
mod kernel;
mod platform;
mod program;
mod queue;
mod session;

pub mod oneshot;

pub use buffer::{AccessMode, Buffer};
pub use command::{Command, Reply};
pub use common::{types, DataClass, DataLayout, Registry};
pub use context::Context;
pub use data::{Element, HostData};
pub use device::{Device, DeviceInfo};
pub use error::{Error, ErrorKind, Result};
pub use event::{Event, ExecStatus, Profile};
pub use handle::{
    ContextId, DeviceId, EventId, Handle, KernelId, Kind, MemId, PlatformId, ProgramId, QueueId,
};
pub use kernel::{Kernel, KernelArg, LaunchShape, WorkGroupInfo};
pub use platform::{Platform, PlatformInfo};
pub use program::{BuildInfo, BuildStatus, Program, ProgramState};
pub use queue::{CommandQueue, QueueProperties};
pub use session::{ArgBinding, Config, Session};

pub extern crate cl3;
