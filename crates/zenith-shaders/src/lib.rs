//! Shader loading for Zenith.
//!
//! SPIR-V arrives either precompiled (raw bytes, e.g. from `include_bytes!`)
//! or, with the `glsl` feature, compiled from GLSL source at runtime with
//! shaderc. Both paths end in a `Vec<u32>` of SPIR-V words.

use thiserror::Error;

/// First word of every SPIR-V module.
pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Shader-related errors.
#[derive(Error, Debug)]
pub enum ShaderError {
    /// Byte length is not a multiple of the SPIR-V word size.
    #[error("SPIR-V bytecode length {0} is not a multiple of 4")]
    Misaligned(usize),

    /// The module does not start with the SPIR-V magic number.
    #[error("Invalid SPIR-V magic number: {0:#010x}")]
    InvalidMagic(u32),

    /// Empty shader input.
    #[error("Shader is empty")]
    Empty,

    /// GLSL compiler could not be initialized.
    #[error("Failed to initialize shader compiler")]
    CompilerUnavailable,

    /// GLSL compile error, verbatim from the compiler.
    #[error("Failed to compile {name}: {message}")]
    Compilation { name: String, message: String },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, ShaderError>;

/// Programmable pipeline stage a shader is written for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
    Compute,
}

impl ShaderStage {
    /// Conventional GLSL file extension for this stage.
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Vertex => "vert",
            Self::Fragment => "frag",
            Self::Compute => "comp",
        }
    }
}

/// Convert SPIR-V bytes into little-endian words and check the header.
pub fn spirv_from_bytes(bytes: &[u8]) -> Result<Vec<u32>> {
    if bytes.is_empty() {
        return Err(ShaderError::Empty);
    }
    if bytes.len() % 4 != 0 {
        return Err(ShaderError::Misaligned(bytes.len()));
    }

    let words: Vec<u32> = bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();

    validate_spirv(&words)?;
    Ok(words)
}

/// Check that a word stream looks like a SPIR-V module.
pub fn validate_spirv(words: &[u32]) -> Result<()> {
    match words.first() {
        None => Err(ShaderError::Empty),
        Some(&SPIRV_MAGIC) => Ok(()),
        Some(&other) => Err(ShaderError::InvalidMagic(other)),
    }
}

#[cfg(feature = "glsl")]
pub use glsl::GlslCompiler;

#[cfg(feature = "glsl")]
mod glsl {
    use super::{Result, ShaderError, ShaderStage};
    use shaderc::{Compiler, ShaderKind};

    impl From<ShaderStage> for ShaderKind {
        fn from(stage: ShaderStage) -> Self {
            match stage {
                ShaderStage::Vertex => Self::Vertex,
                ShaderStage::Fragment => Self::Fragment,
                ShaderStage::Compute => Self::Compute,
            }
        }
    }

    /// GLSL to SPIR-V front end targeting Vulkan 1.2 / SPIR-V 1.5.
    pub struct GlslCompiler {
        compiler: Compiler,
    }

    impl GlslCompiler {
        /// Create a compiler instance.
        pub fn new() -> Result<Self> {
            let compiler = Compiler::new().ok_or(ShaderError::CompilerUnavailable)?;
            Ok(Self { compiler })
        }

        /// Compile GLSL source for the given stage.
        ///
        /// `name` is only used in diagnostics.
        pub fn compile(&self, source: &str, stage: ShaderStage, name: &str) -> Result<Vec<u32>> {
            let mut options =
                shaderc::CompileOptions::new().ok_or(ShaderError::CompilerUnavailable)?;
            options.set_target_env(
                shaderc::TargetEnv::Vulkan,
                shaderc::EnvVersion::Vulkan1_2 as u32,
            );
            options.set_target_spirv(shaderc::SpirvVersion::V1_5);

            let artifact = self
                .compiler
                .compile_into_spirv(source, stage.into(), name, "main", Some(&options))
                .map_err(|e| ShaderError::Compilation {
                    name: name.to_string(),
                    message: e.to_string(),
                })?;

            if artifact.get_num_warnings() > 0 {
                tracing::warn!("{name}: {}", artifact.get_warning_messages());
            }

            Ok(artifact.as_binary().to_vec())
        }
    }
}
