use crate::{error::Check, Result};
use cl3::types::{
    cl_command_queue, cl_context, cl_device_id, cl_event, cl_kernel, cl_mem, cl_platform_id,
    cl_program,
};
use log::warn;
use std::{fmt, marker::PhantomData, mem::replace, ptr::null_mut};

/// 驱动对象的种类。
///
/// 每个种类约定自己的原始 id 类型以及增减驱动引用计数的方式。
pub trait Kind {
    /// 驱动返回的原始 id。
    type Raw: Copy + PartialEq + fmt::Debug;
    const NAME: &'static str;

    fn null() -> Self::Raw;
    fn retain(raw: Self::Raw) -> Result<()>;
    fn release(raw: Self::Raw) -> Result<()>;
}

macro_rules! kind {
    ($name:ident: $raw:ty, $module:ident::$retain:ident $retain_call:literal, $release:ident $release_call:literal) => {
        pub enum $name {}

        impl Kind for $name {
            type Raw = $raw;
            const NAME: &'static str = stringify!($raw);

            #[inline]
            fn null() -> $raw {
                null_mut()
            }
            #[inline]
            fn retain(raw: $raw) -> Result<()> {
                unsafe { cl3::$module::$retain(raw) }.check($retain_call)
            }
            #[inline]
            fn release(raw: $raw) -> Result<()> {
                unsafe { cl3::$module::$release(raw) }.check($release_call)
            }
        }
    };
    ($name:ident: $raw:ty) => {
        pub enum $name {}

        impl Kind for $name {
            type Raw = $raw;
            const NAME: &'static str = stringify!($raw);

            #[inline]
            fn null() -> $raw {
                null_mut()
            }
            #[inline]
            fn retain(_: $raw) -> Result<()> {
                Ok(())
            }
            #[inline]
            fn release(_: $raw) -> Result<()> {
                Ok(())
            }
        }
    };
}

kind!(PlatformId: cl_platform_id);
kind!(DeviceId  : cl_device_id  );
kind!(ContextId : cl_context      , context::retain_context        "clRetainContext"     , release_context        "clReleaseContext"     );
kind!(QueueId   : cl_command_queue, command_queue::retain_command_queue "clRetainCommandQueue", release_command_queue "clReleaseCommandQueue");
kind!(MemId     : cl_mem          , memory::retain_mem_object      "clRetainMemObject"   , release_mem_object     "clReleaseMemObject"   );
kind!(ProgramId : cl_program      , program::retain_program        "clRetainProgram"     , release_program        "clReleaseProgram"     );
kind!(KernelId  : cl_kernel       , kernel::retain_kernel          "clRetainKernel"      , release_kernel         "clReleaseKernel"      );
kind!(EventId   : cl_event        , event::retain_event            "clRetainEvent"       , release_event          "clReleaseEvent"       );

/// 独占一个驱动引用的句柄。
///
/// 句柄不可复制，只能移动；需要共享时用 [`Handle::try_clone`] 或 [`Handle::share_from`] 显式增加引用。
/// 析构时释放持有的 id，析构中的释放失败只能记入日志。
pub struct Handle<K: Kind> {
    raw: K::Raw,
    _kind: PhantomData<K>,
}

impl<K: Kind> Handle<K> {
    #[inline]
    pub fn null() -> Self {
        Self {
            raw: K::null(),
            _kind: PhantomData,
        }
    }

    /// 增加 `raw` 的引用计数并持有它，调用者保留自己的引用。
    pub fn acquire(raw: K::Raw) -> Result<Self> {
        if raw != K::null() {
            K::retain(raw)?
        }
        Ok(Self {
            raw,
            _kind: PhantomData,
        })
    }

    /// 接管 `raw` 上已有的一个引用，不增加计数。
    ///
    /// # Safety
    ///
    /// `raw` 必须是有效 id 或空值，且调用者转移了一个引用给句柄。
    #[inline]
    pub unsafe fn from_raw(raw: K::Raw) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    /// 接管 `raw`，不增加它的计数，然后释放原先的 id。
    /// 原 id 释放失败时 `raw` 仍由句柄持有。
    ///
    /// # Safety
    ///
    /// 同 [`Handle::from_raw`]。
    pub unsafe fn assign(&mut self, raw: K::Raw) -> Result<()> {
        let old = replace(&mut self.raw, raw);
        if old != K::null() {
            K::release(old)?
        }
        Ok(())
    }

    /// 释放当前 id，然后与 `other` 共享它的 id。
    pub fn share_from(&mut self, other: &Self) -> Result<()> {
        self.release()?;
        if !other.is_null() {
            K::retain(other.raw)?
        }
        self.raw = other.raw;
        Ok(())
    }

    #[inline]
    pub fn try_clone(&self) -> Result<Self> {
        Self::acquire(self.raw)
    }

    /// 释放持有的引用并置空。释放失败时句柄同样置空，不会再次尝试释放。
    pub fn release(&mut self) -> Result<()> {
        let raw = replace(&mut self.raw, K::null());
        if raw != K::null() {
            K::release(raw)?
        }
        Ok(())
    }

    #[inline]
    pub fn raw(&self) -> K::Raw {
        self.raw
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw == K::null()
    }

    /// 放弃所有权，返回 id，调用者负责释放。
    #[inline]
    pub fn into_raw(self) -> K::Raw {
        let raw = self.raw;
        std::mem::forget(self);
        raw
    }
}

impl<K: Kind> Default for Handle<K> {
    #[inline]
    fn default() -> Self {
        Self::null()
    }
}

impl<K: Kind> Drop for Handle<K> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("failed to release {}: {e}", K::NAME)
        }
    }
}

impl<K: Kind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({:?})", K::NAME, self.raw)
    }
}

#[cfg(test)]
mod test {
    use super::{Handle, Kind};
    use crate::{error::functions::driver, Result};
    use std::{cell::RefCell, collections::HashMap};

    const BROKEN: usize = 0xdead;

    thread_local! {
        static COUNTS: RefCell<HashMap<usize, isize>> = RefCell::new(HashMap::new());
    }

    fn count(raw: usize) -> isize {
        COUNTS.with(|c| c.borrow().get(&raw).copied().unwrap_or(0))
    }

    fn bump(raw: usize, delta: isize) {
        COUNTS.with(|c| *c.borrow_mut().entry(raw).or_default() += delta)
    }

    enum Mock {}

    impl Kind for Mock {
        type Raw = usize;
        const NAME: &'static str = "mock";

        fn null() -> usize {
            0
        }
        fn retain(raw: usize) -> Result<()> {
            bump(raw, 1);
            Ok(())
        }
        fn release(raw: usize) -> Result<()> {
            if raw == BROKEN {
                return Err(driver(-38, "clReleaseMock"));
            }
            bump(raw, -1);
            Ok(())
        }
    }

    #[test]
    fn test_acquire_and_drop() {
        bump(1, 1);
        {
            let h = Handle::<Mock>::acquire(1).unwrap();
            assert_eq!(h.raw(), 1);
            assert_eq!(count(1), 2);
        }
        assert_eq!(count(1), 1);

        let h = Handle::<Mock>::acquire(0).unwrap();
        assert!(h.is_null());
        assert_eq!(count(0), 0);
    }

    #[test]
    fn test_from_raw_takes_over() {
        bump(2, 1);
        let mut h = unsafe { Handle::<Mock>::from_raw(2) };
        assert_eq!(count(2), 1);

        bump(3, 1);
        unsafe { h.assign(3) }.unwrap();
        assert_eq!((count(2), count(3)), (0, 1));

        drop(h);
        assert_eq!(count(3), 0);
    }

    #[test]
    fn test_share() {
        bump(4, 1);
        bump(5, 1);
        let a = unsafe { Handle::<Mock>::from_raw(4) };
        let mut b = unsafe { Handle::<Mock>::from_raw(5) };
        b.share_from(&a).unwrap();
        assert_eq!((count(4), count(5)), (2, 0));

        let c = b.try_clone().unwrap();
        assert_eq!(count(4), 3);
        drop((a, b, c));
        assert_eq!(count(4), 0);
    }

    #[test]
    fn test_release_failure() {
        let mut h = unsafe { Handle::<Mock>::from_raw(BROKEN) };
        let e = h.release().unwrap_err();
        assert_eq!((e.code, e.info.as_str()), (-38, "clReleaseMock"));
        assert!(h.is_null());
        // 析构失败只记日志
        drop(unsafe { Handle::<Mock>::from_raw(BROKEN) });
    }

    #[test]
    fn test_assign_after_failed_release() {
        bump(7, 1);
        let mut h = unsafe { Handle::<Mock>::from_raw(BROKEN) };
        let e = unsafe { h.assign(7) }.unwrap_err();
        assert_eq!(e.info, "clReleaseMock");
        assert_eq!(h.raw(), 7);
        drop(h);
        assert_eq!(count(7), 0);
    }

    #[test]
    fn test_into_raw() {
        bump(6, 1);
        let h = unsafe { Handle::<Mock>::from_raw(6) };
        assert_eq!(h.into_raw(), 6);
        assert_eq!(count(6), 1);
        assert_eq!(format!("{:?}", Handle::<Mock>::null()), "mock(0)");
    }
}
