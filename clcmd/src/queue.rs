use crate::{
    error::Check,
    handle::{Handle, QueueId},
    Buffer, Context, Event, Kernel, Result,
};
use cl3::{
    command_queue::{
        create_command_queue, enqueue_barrier_with_wait_list, enqueue_copy_buffer,
        enqueue_marker_with_wait_list, enqueue_nd_range_kernel, enqueue_read_buffer,
        enqueue_write_buffer, finish, flush, CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE,
        CL_QUEUE_PROFILING_ENABLE,
    },
    types::{
        cl_bool, cl_command_queue, cl_command_queue_properties, cl_context, cl_device_id,
        cl_event, cl_uint, CL_BLOCKING, CL_NON_BLOCKING,
    },
};
use log::debug;
use std::{ffi::c_void, ptr::null};

/// 队列属性位。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct QueueProperties(cl_command_queue_properties);

impl QueueProperties {
    #[inline]
    pub const fn new(bits: cl_command_queue_properties) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> cl_command_queue_properties {
        self.0
    }

    #[inline]
    pub const fn out_of_order(self, enable: bool) -> Self {
        self.with(CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE as _, enable)
    }

    #[inline]
    pub const fn profiling(self, enable: bool) -> Self {
        self.with(CL_QUEUE_PROFILING_ENABLE as _, enable)
    }

    #[inline]
    pub const fn is_out_of_order(self) -> bool {
        self.0 & CL_QUEUE_OUT_OF_ORDER_EXEC_MODE_ENABLE as cl_command_queue_properties != 0
    }

    #[inline]
    pub const fn is_profiling(self) -> bool {
        self.0 & CL_QUEUE_PROFILING_ENABLE as cl_command_queue_properties != 0
    }

    const fn with(self, bit: cl_command_queue_properties, enable: bool) -> Self {
        Self(if enable { self.0 | bit } else { self.0 & !bit })
    }
}

/// 绑定到一个（上下文，设备）对的命令队列。
///
/// 入队操作返回拥有完成 id 的 [`Event`]；入队失败返回错误，队列仍可继续使用。
/// 未开启乱序执行时，同一队列上的命令按提交顺序执行。
#[derive(Debug)]
pub struct CommandQueue {
    handle: Handle<QueueId>,
    context: cl_context,
    device: cl_device_id,
    properties: QueueProperties,
}

/// 过滤掉空事件后的等待列表。
fn wait_list(events: &[Event]) -> Vec<cl_event> {
    events
        .iter()
        .filter(|e| !e.is_empty())
        .map(Event::raw)
        .collect()
}

#[inline]
fn list_ptr(list: &[cl_event]) -> *const cl_event {
    if list.is_empty() {
        null()
    } else {
        list.as_ptr()
    }
}

#[inline]
const fn blocking_flag(blocking: bool) -> cl_bool {
    if blocking {
        CL_BLOCKING as _
    } else {
        CL_NON_BLOCKING as _
    }
}

impl CommandQueue {
    #[allow(deprecated)]
    pub fn new(
        context: &mut Context,
        device: cl_device_id,
        properties: QueueProperties,
    ) -> Result<Self> {
        let context = context.id()?;
        let raw = unsafe { create_command_queue(context, device, properties.bits()) }
            .check("clCreateCommandQueue")?;
        Ok(Self {
            handle: unsafe { Handle::from_raw(raw) },
            context,
            device,
            properties,
        })
    }

    #[inline]
    pub fn raw(&self) -> cl_command_queue {
        self.handle.raw()
    }

    #[inline]
    pub fn context(&self) -> cl_context {
        self.context
    }

    #[inline]
    pub fn device(&self) -> cl_device_id {
        self.device
    }

    #[inline]
    pub fn properties(&self) -> QueueProperties {
        self.properties
    }

    /// 从 `src` 的 `offset` 处读取 `size` 字节到 `dst`。
    ///
    /// # Safety
    ///
    /// `dst` 必须可写 `size` 字节；非阻塞读取时，`dst` 要保持有效直到返回的事件完成。
    pub unsafe fn enqueue_read(
        &self,
        dst: *mut c_void,
        src: &Buffer,
        size: usize,
        offset: usize,
        blocking: bool,
        wait: &[Event],
    ) -> Result<Event> {
        let list = wait_list(wait);
        let raw = enqueue_read_buffer(
            self.raw(),
            src.raw(),
            blocking_flag(blocking),
            offset,
            size,
            dst,
            list.len() as cl_uint,
            list_ptr(&list),
        )
        .check("clEnqueueReadBuffer")?;
        Ok(Event::from_raw(raw))
    }

    /// 把 `src` 的 `size` 字节写入 `dst` 的 `offset` 处。
    ///
    /// # Safety
    ///
    /// `src` 必须可读 `size` 字节；非阻塞写入时，`src` 要保持有效直到返回的事件完成。
    pub unsafe fn enqueue_write(
        &self,
        dst: &Buffer,
        src: *const c_void,
        size: usize,
        offset: usize,
        blocking: bool,
        wait: &[Event],
    ) -> Result<Event> {
        let list = wait_list(wait);
        let raw = enqueue_write_buffer(
            self.raw(),
            dst.raw(),
            blocking_flag(blocking),
            offset,
            size,
            src,
            list.len() as cl_uint,
            list_ptr(&list),
        )
        .check("clEnqueueWriteBuffer")?;
        Ok(Event::from_raw(raw))
    }

    /// 阻塞读取，填满 `dst`。
    pub fn read(&self, dst: &mut [u8], src: &Buffer, offset: usize, wait: &[Event]) -> Result<()> {
        unsafe { self.enqueue_read(dst.as_mut_ptr().cast(), src, dst.len(), offset, true, wait) }
            .map(drop)
    }

    /// 阻塞写入 `src` 的全部字节。
    pub fn write(&self, dst: &Buffer, src: &[u8], offset: usize, wait: &[Event]) -> Result<()> {
        unsafe { self.enqueue_write(dst, src.as_ptr().cast(), src.len(), offset, true, wait) }
            .map(drop)
    }

    /// 在设备上复制 `size` 字节。
    pub fn enqueue_copy(
        &self,
        dst: &Buffer,
        src: &Buffer,
        size: usize,
        dst_offset: usize,
        src_offset: usize,
        wait: &[Event],
    ) -> Result<Event> {
        let list = wait_list(wait);
        let raw = unsafe {
            enqueue_copy_buffer(
                self.raw(),
                src.raw(),
                dst.raw(),
                src_offset,
                dst_offset,
                size,
                list.len() as cl_uint,
                list_ptr(&list),
            )
        }
        .check("clEnqueueCopyBuffer")?;
        debug!("copy {size} bytes enqueued");
        Ok(unsafe { Event::from_raw(raw) })
    }

    /// 按核函数当前的发射形状入队。局部尺寸全为 0 时交给驱动决定。
    pub fn enqueue_kernel(&self, kernel: &Kernel, wait: &[Event]) -> Result<Event> {
        let shape = kernel.shape();
        let list = wait_list(wait);
        let local = shape.local_size().map_or(null(), <[usize]>::as_ptr);
        let raw = unsafe {
            enqueue_nd_range_kernel(
                self.raw(),
                kernel.raw(),
                shape.dims(),
                shape.global_offset().as_ptr(),
                shape.global_size().as_ptr(),
                local,
                list.len() as cl_uint,
                list_ptr(&list),
            )
        }
        .check("clEnqueueNDRangeKernel")?;
        debug!("kernel {} enqueued with {:?}", kernel.name(), shape.global_size());
        Ok(unsafe { Event::from_raw(raw) })
    }

    /// 后续命令等待 `events` 全部完成；列表为空时等待此前提交的全部命令。
    pub fn enqueue_wait(&self, events: &[Event]) -> Result<()> {
        let list = wait_list(events);
        unsafe { enqueue_barrier_with_wait_list(self.raw(), list.len() as cl_uint, list_ptr(&list)) }
            .check("clEnqueueBarrierWithWaitList")
            .map(|raw| drop(unsafe { Event::from_raw(raw) }))
    }

    /// 入队一个标记，它在 `wait`（为空时为此前全部命令）完成后完成。
    pub fn enqueue_marker(&self, wait: &[Event]) -> Result<Event> {
        let list = wait_list(wait);
        let raw = unsafe {
            enqueue_marker_with_wait_list(self.raw(), list.len() as cl_uint, list_ptr(&list))
        }
        .check("clEnqueueMarkerWithWaitList")?;
        Ok(unsafe { Event::from_raw(raw) })
    }

    #[inline]
    pub fn flush(&self) -> Result<()> {
        flush(self.raw()).check("clFlush")
    }

    /// 阻塞直到队列中的命令全部完成。
    #[inline]
    pub fn finish(&self) -> Result<()> {
        finish(self.raw()).check("clFinish")
    }
}
