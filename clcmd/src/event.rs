use crate::{
    error::{functions::invalid_handle, Check},
    handle::{EventId, Handle},
    Result,
};
use cl3::{
    event::{
        get_event_info, get_event_profiling_info, wait_for_events, CL_COMPLETE,
        CL_EVENT_COMMAND_EXECUTION_STATUS, CL_EVENT_COMMAND_TYPE, CL_EVENT_REFERENCE_COUNT,
        CL_PROFILING_COMMAND_END, CL_PROFILING_COMMAND_QUEUED, CL_PROFILING_COMMAND_START,
        CL_PROFILING_COMMAND_SUBMIT, CL_QUEUED, CL_RUNNING, CL_SUBMITTED,
    },
    info_type::InfoType,
    types::{cl_event, cl_event_info, cl_int, cl_profiling_info, cl_uint, cl_ulong},
};
use std::time::Duration;

/// 命令的执行状态。
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ExecStatus {
    Queued,
    Submitted,
    Running,
    Complete,
    /// 命令异常终止，携带驱动给出的负值错误码。
    Error(cl_int),
}

impl ExecStatus {
    pub fn from_raw(raw: cl_int) -> Self {
        match raw {
            x if x == CL_COMPLETE as cl_int => Self::Complete,
            x if x == CL_RUNNING as cl_int => Self::Running,
            x if x == CL_SUBMITTED as cl_int => Self::Submitted,
            x if x == CL_QUEUED as cl_int => Self::Queued,
            x => Self::Error(x),
        }
    }
}

/// 命令各阶段的设备时间戳，单位纳秒。
#[derive(Clone, Copy, PartialEq, Eq, Default, Debug)]
pub struct Profile {
    pub queued: u64,
    pub submit: u64,
    pub start: u64,
    pub end: u64,
}

impl Profile {
    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_nanos(self.end.saturating_sub(self.start))
    }
}

/// 命令完成的凭证，可以为空。
///
/// 入队操作返回的事件拥有驱动给出的 id；不需要时直接丢弃即可。
#[derive(Default, Debug)]
pub struct Event(Handle<EventId>);

impl Event {
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    /// 增加 `raw` 的引用计数并持有，调用者仍需释放自己的引用。
    #[inline]
    pub fn retain(raw: cl_event) -> Result<Self> {
        Handle::acquire(raw).map(Self)
    }

    /// 接管驱动刚返回的 id。
    ///
    /// # Safety
    ///
    /// `raw` 必须是有效事件 id 或空值，且调用者把它的引用转交给事件。
    #[inline]
    pub unsafe fn from_raw(raw: cl_event) -> Self {
        Self(Handle::from_raw(raw))
    }

    #[inline]
    pub fn raw(&self) -> cl_event {
        self.0.raw()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }

    #[inline]
    pub fn try_clone(&self) -> Result<Self> {
        self.0.try_clone().map(Self)
    }

    /// 阻塞直到命令完成。空事件立即返回。
    pub fn wait(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            wait_for_events(&[self.raw()]).check("clWaitForEvents")
        }
    }

    /// 阻塞直到所有非空事件完成。
    pub fn wait_all(events: &[Event]) -> Result<()> {
        let raw = events
            .iter()
            .filter(|e| !e.is_empty())
            .map(Event::raw)
            .collect::<Vec<_>>();
        if raw.is_empty() {
            Ok(())
        } else {
            wait_for_events(&raw).check("clWaitForEvents")
        }
    }

    fn info(&self, param: cl_event_info) -> Result<InfoType> {
        if self.is_empty() {
            return Err(invalid_handle("empty event"));
        }
        get_event_info(self.raw(), param).check("clGetEventInfo")
    }

    fn timestamp(&self, param: cl_profiling_info) -> Result<u64> {
        if self.is_empty() {
            return Err(invalid_handle("empty event"));
        }
        let t: cl_ulong = get_event_profiling_info(self.raw(), param)
            .check("clGetEventProfilingInfo")?
            .into();
        Ok(t)
    }

    pub fn status(&self) -> Result<ExecStatus> {
        let raw: cl_int = self.info(CL_EVENT_COMMAND_EXECUTION_STATUS)?.into();
        Ok(ExecStatus::from_raw(raw))
    }

    pub fn ref_count(&self) -> Result<u32> {
        Ok(cl_uint::from(self.info(CL_EVENT_REFERENCE_COUNT)?))
    }

    pub fn command_type(&self) -> Result<u32> {
        Ok(cl_uint::from(self.info(CL_EVENT_COMMAND_TYPE)?))
    }

    /// 读取剖析时间戳，所在队列需要开启剖析。
    pub fn profile(&self) -> Result<Profile> {
        Ok(Profile {
            queued: self.timestamp(CL_PROFILING_COMMAND_QUEUED)?,
            submit: self.timestamp(CL_PROFILING_COMMAND_SUBMIT)?,
            start: self.timestamp(CL_PROFILING_COMMAND_START)?,
            end: self.timestamp(CL_PROFILING_COMMAND_END)?,
        })
    }
}

#[cfg(test)]
mod test {
    use super::{Event, ExecStatus, Profile};
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn test_empty() {
        let event = Event::empty();
        assert!(event.is_empty());
        event.wait().unwrap();
        Event::wait_all(&[Event::empty(), Event::empty()]).unwrap();
        assert_eq!(event.status().unwrap_err().kind, ErrorKind::InvalidHandle);
        assert_eq!(event.profile().unwrap_err().kind, ErrorKind::InvalidHandle);
        assert!(event.try_clone().unwrap().is_empty());
    }

    #[test]
    fn test_status() {
        assert_eq!(ExecStatus::from_raw(0), ExecStatus::Complete);
        assert_eq!(ExecStatus::from_raw(3), ExecStatus::Queued);
        assert_eq!(ExecStatus::from_raw(-5), ExecStatus::Error(-5));
    }

    #[test]
    fn test_duration() {
        let p = Profile {
            queued: 10,
            submit: 20,
            start: 100,
            end: 1_100,
        };
        assert_eq!(p.duration(), Duration::from_micros(1));
    }
}
