use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug)]
pub enum Error {
    /// Window, surface, adapter or device could not be created.
    BackendInit(String),
    /// Shader module or pipeline failed validation. Holds the validation log.
    ShaderCompile(String),
    /// The swap chain could not hand out a frame.
    Surface(wgpu::SurfaceError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendInit(msg) => write!(f, "failed to initialize render backend: {}", msg),
            Error::ShaderCompile(log) => write!(f, "failed to build shader program: {}", log),
            Error::Surface(err) => write!(f, "failed to acquire frame: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Surface(err) => Some(err),
            _ => None,
        }
    }
}

impl From<wgpu::SurfaceError> for Error {
    fn from(err: wgpu::SurfaceError) -> Self {
        Error::Surface(err)
    }
}

impl From<wgpu::CreateSurfaceError> for Error {
    fn from(err: wgpu::CreateSurfaceError) -> Self {
        Error::BackendInit(err.to_string())
    }
}

impl From<wgpu::RequestDeviceError> for Error {
    fn from(err: wgpu::RequestDeviceError) -> Self {
        Error::BackendInit(err.to_string())
    }
}

impl From<winit::error::OsError> for Error {
    fn from(err: winit::error::OsError) -> Self {
        Error::BackendInit(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_compile_keeps_log() {
        let err = Error::ShaderCompile("unknown identifier `colour`".to_string());
        assert!(err.to_string().contains("unknown identifier `colour`"));
    }

    #[test]
    fn surface_error_has_source() {
        let err: Error = wgpu::SurfaceError::Timeout.into();
        assert!(std::error::Error::source(&err).is_some());
    }
}
