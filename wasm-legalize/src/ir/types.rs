///
/// Value Types, Signatures and Names
///
/// This module defines the primitive vocabulary shared by every part of the
/// IR: the four numeric value types, function signatures, constant literals,
/// and the `Name` handle used to identify functions, types, exports and
/// globals.
///
/// Design decisions:
/// - `Name` wraps an `Arc<str>` so clones are cheap and modules are `Send + Sync`
///   for the function-parallel walker
/// - Float literals are stored by bit pattern, so `Literal` equality is exact
///   (NaN payloads and signed zeros compare bitwise)
/// - A missing result type is `None`, not a dedicated `none` value type
///

use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use smallvec::SmallVec;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(Arc<str>);

impl Name {
    pub fn new(s: impl AsRef<str>) -> Self {
        Self(Arc::from(s.as_ref()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives `prefix$name`, the naming scheme used for generated entities.
    pub fn prefixed(&self, prefix: &str) -> Name {
        Name::new(format!("{}${}", prefix, self.0))
    }
}

impl fmt::Debug for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Deref for Name {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Name {
    fn from(s: &str) -> Self {
        Name::new(s)
    }
}

impl From<String> for Name {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

impl Borrow<str> for Name {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        &*self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        &*self.0 == *other
    }
}

impl Serialize for Name {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Name {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Name::from(s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValType {
    I32,
    I64,
    F32,
    F64,
}

impl ValType {
    pub fn as_str(self) -> &'static str {
        match self {
            ValType::I32 => "i32",
            ValType::I64 => "i64",
            ValType::F32 => "f32",
            ValType::F64 => "f64",
        }
    }
}

impl fmt::Display for ValType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub type ParamList = SmallVec<[ValType; 4]>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Signature {
    #[serde(default)]
    pub params: ParamList,
    #[serde(default)]
    pub result: Option<ValType>,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = ValType>, result: Option<ValType>) -> Self {
        Self {
            params: params.into_iter().collect(),
            result,
        }
    }

    pub fn types(&self) -> impl Iterator<Item = ValType> + '_ {
        self.params.iter().copied().chain(self.result)
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("(")?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", p)?;
        }
        f.write_str(") -> ")?;
        match self.result {
            Some(ty) => write!(f, "{}", ty),
            None => f.write_str("none"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Literal {
    I32(i32),
    I64(i64),
    /// Raw IEEE-754 single-precision bits.
    F32(u32),
    /// Raw IEEE-754 double-precision bits.
    F64(u64),
}

impl Literal {
    pub fn f32(v: f32) -> Self {
        Literal::F32(v.to_bits())
    }

    pub fn f64(v: f64) -> Self {
        Literal::F64(v.to_bits())
    }

    pub fn zero(ty: ValType) -> Self {
        match ty {
            ValType::I32 => Literal::I32(0),
            ValType::I64 => Literal::I64(0),
            ValType::F32 => Literal::F32(0),
            ValType::F64 => Literal::F64(0),
        }
    }

    pub fn ty(&self) -> ValType {
        match self {
            Literal::I32(_) => ValType::I32,
            Literal::I64(_) => ValType::I64,
            Literal::F32(_) => ValType::F32,
            Literal::F64(_) => ValType::F64,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match *self {
            Literal::I32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Literal::I64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match *self {
            Literal::F32(bits) => Some(f32::from_bits(bits)),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Literal::F64(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }
}

impl fmt::Debug for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Literal::I32(v) => write!(f, "i32.const {}", v),
            Literal::I64(v) => write!(f, "i64.const {}", v),
            Literal::F32(bits) => write!(f, "f32.const {:?}", f32::from_bits(bits)),
            Literal::F64(bits) => write!(f, "f64.const {:?}", f64::from_bits(bits)),
        }
    }
}
