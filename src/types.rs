//! Types (§3 "Type"): the small set of primitive types this language's
//! surface syntax can name.

/// Base type tags. Matches the identifiers the parser recognizes as
/// type annotations (`i8`, `i64`, `bool`, ...).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Type {
    I8,
    I16,
    I32,
    I64,
    I128,
    ISize,
    F32,
    F64,
    Bool,
    Void,
    /// Not yet resolved, or resolution failed (§7: lowering keeps going
    /// after an undefined reference rather than aborting).
    Unknown,
}

impl Type {
    /// Recognize a type annotation's identifier text. Only signed
    /// integers, floats, and `bool` are nameable from source.
    pub fn from_name(name: &str) -> Option<Type> {
        Some(match name {
            "i8" => Type::I8,
            "i16" => Type::I16,
            "i32" => Type::I32,
            "i64" => Type::I64,
            "i128" => Type::I128,
            "isize" => Type::ISize,
            "f32" => Type::F32,
            "f64" => Type::F64,
            "bool" => Type::Bool,
            _ => return None,
        })
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::I8 | Type::I16 | Type::I32 | Type::I64 | Type::I128 | Type::ISize
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Type::I8 => "i8",
            Type::I16 => "i16",
            Type::I32 => "i32",
            Type::I64 => "i64",
            Type::I128 => "i128",
            Type::ISize => "isize",
            Type::F32 => "f32",
            Type::F64 => "f64",
            Type::Bool => "bool",
            Type::Void => "void",
            Type::Unknown => "<unknown>",
        }
    }
}
