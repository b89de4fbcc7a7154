//! C ABI model of a target platform.
//!
//! Derived entirely from the triple: pointer width from the architecture, the
//! integer data model from the operating system (LLP64 on Windows, LP64 or
//! ILP32 elsewhere) and the handful of per-architecture alignment quirks that
//! change struct layout.

use serde::{Deserialize, Serialize};
use target_lexicon::{PointerWidth, Triple};

use crate::error::{Result, TargetError};
use crate::triple::TargetPlatform;

/// Size and alignment of a scalar C type, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScalarLayout {
    pub size: u64,
    pub align: u64,
}

impl ScalarLayout {
    const fn new(size: u64, align: u64) -> Self {
        Self { size, align }
    }
}

/// Scalar C types whose layout depends on the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CScalar {
    Bool,
    Char,
    Short,
    Int,
    Long,
    LongLong,
    Int128,
    Float,
    Double,
    LongDouble,
    WChar,
    Char16,
    Char32,
    Pointer,
}

/// C ABI facts for one target platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PlatformModel {
    /// The platform this model describes.
    pub platform: TargetPlatform,
    /// Architecture name.
    pub arch: String,
    /// Operating system name.
    pub os: String,
    /// Data model name (`LP64`, `LLP64`, `ILP32`).
    pub data_model: String,
    /// Macros the compiler predefines for this target.
    pub defines: Vec<String>,
    pub pointer: ScalarLayout,
    pub short: ScalarLayout,
    pub int: ScalarLayout,
    pub long: ScalarLayout,
    pub long_long: ScalarLayout,
    pub float: ScalarLayout,
    pub double: ScalarLayout,
    pub long_double: ScalarLayout,
    pub wchar: ScalarLayout,
    /// Layout of an enum whose values fit in `int`.
    pub enum_default: ScalarLayout,
}

impl PlatformModel {
    /// Derive the model for a platform.
    pub fn for_platform(platform: &TargetPlatform) -> Result<Self> {
        let triple = platform.triple()?;
        Self::from_triple(platform, &triple)
    }

    fn from_triple(platform: &TargetPlatform, triple: &Triple) -> Result<Self> {
        let pointer_bytes = match triple.pointer_width() {
            Ok(PointerWidth::U16) => 2,
            Ok(PointerWidth::U32) => 4,
            Ok(PointerWidth::U64) => 8,
            Err(()) => {
                return Err(TargetError::Unsupported {
                    triple: platform.to_string(),
                    detail: "unknown pointer width".to_string(),
                })
            }
        };

        let arch = triple.architecture.to_string();
        let os = triple.operating_system.to_string();
        let is_windows = os == "windows";
        let is_apple = ["darwin", "macos", "ios", "tvos", "watchos"]
            .iter()
            .any(|p| os.starts_with(p));
        let is_x86_32 = matches!(arch.as_str(), "i386" | "i586" | "i686" | "x86");

        let (long, data_model) = if is_windows {
            (ScalarLayout::new(4, 4), "LLP64")
        } else if pointer_bytes == 8 {
            (ScalarLayout::new(8, 8), "LP64")
        } else {
            (ScalarLayout::new(4, 4), "ILP32")
        };

        // i386 System V caps 8-byte scalars at 4-byte alignment inside records.
        let eight_byte_align = if is_x86_32 && !is_windows { 4 } else { 8 };

        let long_double = if is_windows || (is_apple && arch == "aarch64") {
            ScalarLayout::new(8, 8)
        } else if is_x86_32 {
            ScalarLayout::new(12, 4)
        } else if pointer_bytes == 8 {
            ScalarLayout::new(16, 16)
        } else {
            ScalarLayout::new(8, eight_byte_align)
        };

        let wchar = if is_windows {
            ScalarLayout::new(2, 2)
        } else {
            ScalarLayout::new(4, 4)
        };

        Ok(Self {
            platform: platform.clone(),
            defines: predefined_macros(&arch, &os, is_windows, is_apple, pointer_bytes),
            arch,
            os,
            data_model: data_model.to_string(),
            pointer: ScalarLayout::new(pointer_bytes, pointer_bytes),
            short: ScalarLayout::new(2, 2),
            int: ScalarLayout::new(4, 4),
            long,
            long_long: ScalarLayout::new(8, eight_byte_align),
            float: ScalarLayout::new(4, 4),
            double: ScalarLayout::new(8, eight_byte_align),
            long_double,
            wchar,
            enum_default: ScalarLayout::new(4, 4),
        })
    }

    /// Layout of a scalar type on this platform.
    pub fn scalar(&self, scalar: CScalar) -> ScalarLayout {
        match scalar {
            CScalar::Bool | CScalar::Char => ScalarLayout::new(1, 1),
            CScalar::Short | CScalar::Char16 => self.short,
            CScalar::Int | CScalar::Char32 => self.int,
            CScalar::Long => self.long,
            CScalar::LongLong => self.long_long,
            CScalar::Int128 => ScalarLayout::new(16, 16),
            CScalar::Float => self.float,
            CScalar::Double => self.double,
            CScalar::LongDouble => self.long_double,
            CScalar::WChar => self.wchar,
            CScalar::Pointer => self.pointer,
        }
    }

    /// Pointer width in bytes.
    pub fn pointer_size(&self) -> u64 {
        self.pointer.size
    }

    /// Serialize the model to pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn predefined_macros(
    arch: &str,
    os: &str,
    is_windows: bool,
    is_apple: bool,
    pointer_bytes: u64,
) -> Vec<String> {
    let mut defines = Vec::new();
    if is_windows {
        defines.push("_WIN32".to_string());
        if pointer_bytes == 8 {
            defines.push("_WIN64".to_string());
        }
    } else if is_apple {
        defines.push("__APPLE__".to_string());
        defines.push("__MACH__".to_string());
    } else if os == "linux" {
        defines.push("__linux__".to_string());
    }
    match arch {
        "x86_64" => defines.push("__x86_64__".to_string()),
        "aarch64" => defines.push("__aarch64__".to_string()),
        "i386" | "i586" | "i686" => defines.push("__i386__".to_string()),
        a if a.starts_with("arm") || a.starts_with("thumb") => defines.push("__arm__".to_string()),
        _ => {}
    }
    if pointer_bytes == 8 && !is_windows {
        defines.push("__LP64__".to_string());
    }
    defines
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(triple: &str) -> PlatformModel {
        PlatformModel::for_platform(&TargetPlatform::parse(triple).unwrap()).unwrap()
    }

    #[test]
    fn linux_x86_64_is_lp64() {
        let m = model("x86_64-unknown-linux-gnu");
        assert_eq!(m.data_model, "LP64");
        assert_eq!(m.pointer_size(), 8);
        assert_eq!(m.scalar(CScalar::Long).size, 8);
        assert_eq!(m.scalar(CScalar::LongDouble), ScalarLayout { size: 16, align: 16 });
        assert!(m.defines.contains(&"__linux__".to_string()));
        assert!(m.defines.contains(&"__x86_64__".to_string()));
    }

    #[test]
    fn windows_is_llp64() {
        let m = model("x86_64-pc-windows-msvc");
        assert_eq!(m.data_model, "LLP64");
        assert_eq!(m.scalar(CScalar::Long).size, 4);
        assert_eq!(m.scalar(CScalar::WChar).size, 2);
        assert!(m.defines.contains(&"_WIN64".to_string()));
    }

    #[test]
    fn arm32_has_four_byte_pointers() {
        let m = model("armv7-unknown-linux-gnueabihf");
        assert_eq!(m.data_model, "ILP32");
        assert_eq!(m.scalar(CScalar::Pointer), ScalarLayout { size: 4, align: 4 });
        assert_eq!(m.scalar(CScalar::Double).align, 8);
        assert!(m.defines.contains(&"__arm__".to_string()));
    }

    #[test]
    fn i686_linux_caps_eight_byte_alignment() {
        let m = model("i686-unknown-linux-gnu");
        assert_eq!(m.scalar(CScalar::LongLong), ScalarLayout { size: 8, align: 4 });
        assert_eq!(m.scalar(CScalar::LongDouble).size, 12);
    }

    #[test]
    fn apple_silicon_long_double_is_double() {
        let m = model("aarch64-apple-darwin");
        assert_eq!(m.scalar(CScalar::LongDouble).size, 8);
        assert!(m.defines.contains(&"__APPLE__".to_string()));
    }

    #[test]
    fn toml_output_is_kebab_case() {
        let text = model("x86_64-unknown-linux-gnu").to_toml().unwrap();
        assert!(text.contains("data-model = \"LP64\""));
        assert!(text.contains("[long-double]"));
    }
}
