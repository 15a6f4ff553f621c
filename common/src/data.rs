use std::fmt;

/// 元素的数值类别。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u8)]
pub enum DataClass {
    Bool,
    Signed,
    Unsigned,
    Float,
}

/// 主机与设备之间传输的标量元素布局。
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(C)]
pub struct DataLayout {
    class: DataClass,
    nbytes: u8,
}

impl DataLayout {
    #[inline]
    pub const fn new(class: DataClass, nbytes: usize) -> Self {
        assert!(nbytes.is_power_of_two() && nbytes <= 8);
        Self {
            class,
            nbytes: nbytes as _,
        }
    }

    #[inline]
    pub const fn class(&self) -> DataClass {
        self.class
    }

    #[inline]
    pub const fn nbytes(&self) -> usize {
        self.nbytes as _
    }

    #[inline]
    pub const fn nbits(&self) -> usize {
        self.nbytes() * u8::BITS as usize
    }

    #[inline]
    pub const fn signed(&self) -> bool {
        matches!(self.class, DataClass::Signed | DataClass::Float)
    }

    /// 按类型名查找布局，接受 [`types::NAMES`] 中的所有名字。
    pub fn from_name(name: &str) -> Option<Self> {
        types::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|&(_, layout)| layout)
    }

    /// 布局的规范名字。
    pub fn name(&self) -> &'static str {
        types::NAMES
            .iter()
            .find(|(_, layout)| layout == self)
            .map_or("unknown", |&(n, _)| n)
    }
}

impl fmt::Display for DataLayout {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub mod types {
    use super::{DataClass, DataLayout};

    macro_rules! layout {
        ($name:ident $class:ident($bytes:expr)) => {
            pub const $name: DataLayout = DataLayout::new(DataClass::$class, $bytes);
        };
    }

    layout!(BOOL Bool    (1));
    layout!(I8   Signed  (1));
    layout!(I16  Signed  (2));
    layout!(I32  Signed  (4));
    layout!(I64  Signed  (8));
    layout!(U8   Unsigned(1));
    layout!(U16  Unsigned(2));
    layout!(U32  Unsigned(4));
    layout!(U64  Unsigned(8));
    layout!(F16  Float   (2));
    layout!(F32  Float   (4));
    layout!(F64  Float   (8));

    /// 类型名表。同一布局出现多次时，第一个名字是规范名字。
    pub const NAMES: [(&str, DataLayout); 13] = [
        ("logical", BOOL),
        ("int8", I8),
        ("int16", I16),
        ("int32", I32),
        ("int64", I64),
        ("uint8", U8),
        ("char", U8),
        ("uint16", U16),
        ("uint32", U32),
        ("uint64", U64),
        ("half", F16),
        ("single", F32),
        ("double", F64),
    ];
}

#[test]
fn test_names() {
    use types::*;

    assert_eq!(DataLayout::from_name("single"), Some(F32));
    assert_eq!(DataLayout::from_name("char"), Some(U8));
    assert_eq!(DataLayout::from_name("float"), None);
    assert_eq!(U8.name(), "uint8");
    assert_eq!(BOOL.to_string(), "logical");
    for (name, layout) in NAMES {
        assert_eq!(DataLayout::from_name(name), Some(layout));
    }
}

#[test]
fn test_sizes() {
    use types::*;

    assert_eq!(BOOL.nbytes(), 1);
    assert_eq!(F16.nbits(), 16);
    assert_eq!(I64.nbytes(), 8);
    assert!(I32.signed());
    assert!(F64.signed());
    assert!(!U16.signed());
    assert_ne!(I16, U16);
}
