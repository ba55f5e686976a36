//! Typed configuration values.

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Declared type of a configuration key
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigDataType {
    /// 32-bit signed integer
    Int32 = 1,
    /// 64-bit signed integer
    Int64 = 2,
    /// 32-bit float
    Float = 3,
    /// UTF-8 string
    String = 4,
    /// Callback
    FunctionPtr = 5,
}

/// Type-erased callback stored under a function-pointer key
///
/// The store never calls it; the owner of the key downcasts it back to its
/// concrete callback type. Two refs are equal when they point at the same
/// allocation.
#[derive(Clone)]
pub struct CallbackRef(Arc<dyn Any + Send + Sync>);

impl CallbackRef {
    /// Wrap a callback object
    pub fn new<T: Any + Send + Sync>(callback: T) -> Self {
        Self(Arc::new(callback))
    }

    /// Borrow as the concrete callback type
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl PartialEq for CallbackRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl fmt::Debug for CallbackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallbackRef({:p})", self.addr())
    }
}

/// A configuration value tagged with its type
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// 32-bit signed integer
    Int32(i32),
    /// 64-bit signed integer
    Int64(i64),
    /// 32-bit float
    Float(f32),
    /// UTF-8 string
    String(String),
    /// Callback
    FunctionPtr(CallbackRef),
}

impl ConfigValue {
    /// Type tag of this value
    pub fn data_type(&self) -> ConfigDataType {
        match self {
            ConfigValue::Int32(_) => ConfigDataType::Int32,
            ConfigValue::Int64(_) => ConfigDataType::Int64,
            ConfigValue::Float(_) => ConfigDataType::Float,
            ConfigValue::String(_) => ConfigDataType::String,
            ConfigValue::FunctionPtr(_) => ConfigDataType::FunctionPtr,
        }
    }

    /// Numeric view used for range checks
    pub(crate) fn as_f64(&self) -> Option<f64> {
        match self {
            ConfigValue::Int32(v) => Some(*v as f64),
            ConfigValue::Int64(v) => Some(*v as f64),
            ConfigValue::Float(v) => Some(*v as f64),
            _ => None,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Int32(v) => write!(f, "{}", v),
            ConfigValue::Int64(v) => write!(f, "{}", v),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::String(v) => write!(f, "{:?}", v),
            ConfigValue::FunctionPtr(cb) => write!(f, "{:?}", cb),
        }
    }
}

impl From<i32> for ConfigValue {
    fn from(v: i32) -> Self {
        ConfigValue::Int32(v)
    }
}

impl From<i64> for ConfigValue {
    fn from(v: i64) -> Self {
        ConfigValue::Int64(v)
    }
}

impl From<f32> for ConfigValue {
    fn from(v: f32) -> Self {
        ConfigValue::Float(v)
    }
}

impl From<&str> for ConfigValue {
    fn from(v: &str) -> Self {
        ConfigValue::String(v.to_string())
    }
}

impl From<String> for ConfigValue {
    fn from(v: String) -> Self {
        ConfigValue::String(v)
    }
}

impl From<CallbackRef> for ConfigValue {
    fn from(v: CallbackRef) -> Self {
        ConfigValue::FunctionPtr(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_tags() {
        assert_eq!(ConfigValue::from(1i32).data_type(), ConfigDataType::Int32);
        assert_eq!(ConfigValue::from(1i64).data_type(), ConfigDataType::Int64);
        assert_eq!(ConfigValue::from(1.5f32).data_type(), ConfigDataType::Float);
        assert_eq!(ConfigValue::from("x").data_type(), ConfigDataType::String);
        assert_eq!(
            ConfigValue::from(CallbackRef::new(0u8)).data_type(),
            ConfigDataType::FunctionPtr
        );
    }

    #[test]
    fn test_callback_ref_identity() {
        struct Hook(u32);
        let a = CallbackRef::new(Hook(1));
        let b = a.clone();
        let c = CallbackRef::new(Hook(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.downcast_ref::<Hook>().map(|h| h.0), Some(1));
        assert!(a.downcast_ref::<u32>().is_none());
    }
}
