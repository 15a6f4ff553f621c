use cl3::types::cl_int;
use std::{fmt, io, path::Path};

pub const ERR_FILE_NOT_FOUND: cl_int = 1000;
pub const ERR_COULD_NOT_OPEN_FILE: cl_int = 1001;
pub const ERR_INVALID_HANDLE: cl_int = 1002;
pub const ERR_INVALID_ARGUMENT: cl_int = 1003;
pub const ERR_NOT_INITIALIZED: cl_int = 1004;
pub const ERR_BUILD_FAILED: cl_int = 1005;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ErrorKind {
    Driver,
    InvalidHandle,
    FileAccess,
    InvalidArgument,
    NotInitialized,
    BuildFailed,
}

#[derive(Clone, Debug)]
pub struct Error {
    pub kind: ErrorKind,
    pub code: cl_int,
    pub info: String,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// 错误码对应的说明文字。驱动错误取驱动提供的文字。
    pub fn message(&self) -> String {
        match self.kind {
            ErrorKind::Driver => cl3::error_codes::error_text(self.code).to_string(),
            ErrorKind::InvalidHandle => "invalid handle".into(),
            ErrorKind::FileAccess if self.code == ERR_FILE_NOT_FOUND => "file not found".into(),
            ErrorKind::FileAccess => "could not open file".into(),
            ErrorKind::InvalidArgument => "invalid argument".into(),
            ErrorKind::NotInitialized => "session not initialized".into(),
            ErrorKind::BuildFailed => "program build failed".into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Error {}: {}", self.code, self.message())?;
        if !self.info.is_empty() {
            write!(f, " ({})", self.info)?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

pub(crate) mod functions {
    use super::{Error, ErrorKind::*, *};

    macro_rules! builder {
        ($ty:ident: $name:ident $kind:expr, $code:expr) => {
            #[inline]
            pub fn $name(info: impl Into<String>) -> $ty {
                $ty {
                    kind: $kind,
                    code: $code,
                    info: info.into(),
                }
            }
        };
    }

    builder!(Error: invalid_handle   InvalidHandle,   ERR_INVALID_HANDLE  );
    builder!(Error: invalid_argument InvalidArgument, ERR_INVALID_ARGUMENT);
    builder!(Error: not_initialized  NotInitialized,  ERR_NOT_INITIALIZED );
    builder!(Error: build_failed     BuildFailed,     ERR_BUILD_FAILED    );

    /// 驱动调用失败，`call` 是失败的驱动函数名。
    #[inline]
    pub fn driver(code: cl_int, call: &str) -> Error {
        Error {
            kind: Driver,
            code,
            info: call.into(),
        }
    }

    pub fn file_access(path: &Path, e: io::Error) -> Error {
        let code = match e.kind() {
            io::ErrorKind::NotFound => ERR_FILE_NOT_FOUND,
            _ => ERR_COULD_NOT_OPEN_FILE,
        };
        Error {
            kind: FileAccess,
            code,
            info: format!("{}: {e}", path.display()),
        }
    }
}

/// 把驱动调用的返回值转换为携带调用名的 [`Error`]。
pub(crate) trait Check<T> {
    fn check(self, call: &str) -> Result<T>;
}

impl<T> Check<T> for std::result::Result<T, cl_int> {
    #[inline]
    fn check(self, call: &str) -> Result<T> {
        self.map_err(|code| functions::driver(code, call))
    }
}
