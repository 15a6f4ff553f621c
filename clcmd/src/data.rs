use crate::{error::functions::invalid_argument, Result};
use common::{types, DataLayout};
use half::f16;
use std::{mem::size_of_val, slice::from_raw_parts};

/// 可以按字节在主机与设备之间搬运的标量。
pub trait Element: Copy + 'static {
    const LAYOUT: DataLayout;
}

macro_rules! element {
    ($($ty:ty => $layout:ident)+) => {
        $(
            impl Element for $ty {
                const LAYOUT: DataLayout = types::$layout;
            }
        )+
    };
}

element! {
    i8  => I8
    i16 => I16
    i32 => I32
    i64 => I64
    u8  => U8
    u16 => U16
    u32 => U32
    u64 => U64
    f16 => F16
    f32 => F32
    f64 => F64
}

/// 带元素类型的主机数据块。
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct HostData {
    layout: DataLayout,
    bytes: Vec<u8>,
}

impl HostData {
    /// 用字节构造，字节数必须是元素大小的整数倍。
    pub fn from_bytes(layout: DataLayout, bytes: Vec<u8>) -> Result<Self> {
        if bytes.len() % layout.nbytes() != 0 {
            return Err(invalid_argument(format!(
                "{} bytes is not a whole number of {layout}",
                bytes.len()
            )));
        }
        Ok(Self { layout, bytes })
    }

    /// `len` 个全零元素，字节数溢出时返回错误。
    pub fn zeroed(layout: DataLayout, len: usize) -> Result<Self> {
        let size = len
            .checked_mul(layout.nbytes())
            .ok_or_else(|| invalid_argument(format!("{len} elements of {layout} overflow")))?;
        Ok(Self {
            layout,
            bytes: vec![0; size],
        })
    }

    pub fn from_slice<T: Element>(data: &[T]) -> Self {
        let bytes = unsafe { from_raw_parts(data.as_ptr().cast::<u8>(), size_of_val(data)) };
        Self {
            layout: T::LAYOUT,
            bytes: bytes.to_vec(),
        }
    }

    /// 按 `T` 解释数据，元素类型不符时返回 [`None`]。
    pub fn to_vec<T: Element>(&self) -> Option<Vec<T>> {
        if T::LAYOUT != self.layout {
            return None;
        }
        Some(
            self.bytes
                .chunks_exact(self.layout.nbytes())
                .map(|chunk| unsafe { chunk.as_ptr().cast::<T>().read_unaligned() })
                .collect(),
        )
    }

    #[inline]
    pub fn layout(&self) -> DataLayout {
        self.layout
    }

    /// 元素个数。
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len() / self.layout.nbytes()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    #[inline]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
