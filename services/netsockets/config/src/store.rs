//! Scoped override storage and lookup.

use crate::{
    CallbackRef, ConfigDataType, ConfigError, ConfigKey, ConfigScope, ConfigValue, ScopeChain,
    ScopeTarget,
};
use dashmap::DashMap;
use tracing::debug;

/// How a lookup was satisfied
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigStatus {
    /// Found at the requested scope
    Ok,
    /// Found at a broader scope, or fell back to the compiled default
    OkInherited,
}

/// Result of a successful lookup
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// The value
    pub value: ConfigValue,
    /// Exact or inherited
    pub status: ConfigStatus,
    /// Scope the value was found at (Global for compiled defaults)
    pub scope: ConfigScope,
}

/// Description of a key, for enumerating tunables
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigKeyInfo {
    /// The key
    pub key: ConfigKey,
    /// Stable name
    pub name: &'static str,
    /// Declared type
    pub data_type: ConfigDataType,
    /// Narrowest scope the key may be set at
    pub scope: ConfigScope,
    /// Next key in id order
    pub next: Option<ConfigKey>,
}

/// Typed, scoped configuration overrides
///
/// One store holds overrides for any number of listen sockets and
/// connections; defaults live with the key and are never copied per object.
#[derive(Debug, Default)]
pub struct ConfigStore {
    overrides: DashMap<(ConfigKey, ScopeTarget), ConfigValue>,
}

impl ConfigStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            overrides: DashMap::new(),
        }
    }

    /// Override `key` on `target`
    ///
    /// Nothing is stored unless the type, scope and range all check out.
    pub fn set(
        &self,
        key: ConfigKey,
        target: ScopeTarget,
        value: ConfigValue,
    ) -> Result<(), ConfigError> {
        if value.data_type() != key.data_type() {
            return Err(ConfigError::TypeMismatch {
                key,
                expected: key.data_type(),
                actual: value.data_type(),
            });
        }

        if target.scope() > key.scope() {
            return Err(ConfigError::BadScopeObject(format!(
                "{} cannot be set below {:?} scope (target {})",
                key,
                key.scope(),
                target
            )));
        }

        if let (Some((min, max)), Some(v)) = (key.range(), value.as_f64()) {
            if !(min..=max).contains(&v) {
                return Err(ConfigError::BadValue(format!(
                    "{} = {} outside [{}, {}]",
                    key, value, min, max
                )));
            }
        }

        debug!("config set key={} target={} value={}", key, target, value);
        self.overrides.insert((key, target), value);
        Ok(())
    }

    /// Remove an override so `target` inherits again; true if one existed
    pub fn unset(&self, key: ConfigKey, target: ScopeTarget) -> bool {
        let removed = self.overrides.remove(&(key, target)).is_some();
        if removed {
            debug!("config unset key={} target={}", key, target);
        }
        removed
    }

    /// Resolve `key` through `chain`, narrowest first
    pub fn get(&self, key: ConfigKey, chain: &ScopeChain) -> Result<Resolved, ConfigError> {
        for (depth, target) in chain.iter().enumerate() {
            if let Some(value) = self.overrides.get(&(key, *target)) {
                return Ok(Resolved {
                    value: value.clone(),
                    status: if depth == 0 {
                        ConfigStatus::Ok
                    } else {
                        ConfigStatus::OkInherited
                    },
                    scope: target.scope(),
                });
            }
        }

        let value = key
            .default_value()
            .ok_or_else(|| ConfigError::BadValue(format!("{} has no value", key)))?;
        let status = if chain.requested() == ScopeTarget::Global {
            ConfigStatus::Ok
        } else {
            ConfigStatus::OkInherited
        };
        Ok(Resolved {
            value,
            status,
            scope: ConfigScope::Global,
        })
    }

    /// Resolve a key given its raw numeric id
    pub fn get_by_id(&self, id: i32, chain: &ScopeChain) -> Result<Resolved, ConfigError> {
        self.get(ConfigKey::try_from(id)?, chain)
    }

    /// Resolve an int32 key
    pub fn get_i32(
        &self,
        key: ConfigKey,
        chain: &ScopeChain,
    ) -> Result<(i32, ConfigStatus), ConfigError> {
        let resolved = self.get_typed(key, chain, ConfigDataType::Int32)?;
        match resolved.value {
            ConfigValue::Int32(v) => Ok((v, resolved.status)),
            other => Err(mismatch(key, other.data_type())),
        }
    }

    /// Resolve an int64 key
    pub fn get_i64(
        &self,
        key: ConfigKey,
        chain: &ScopeChain,
    ) -> Result<(i64, ConfigStatus), ConfigError> {
        let resolved = self.get_typed(key, chain, ConfigDataType::Int64)?;
        match resolved.value {
            ConfigValue::Int64(v) => Ok((v, resolved.status)),
            other => Err(mismatch(key, other.data_type())),
        }
    }

    /// Resolve a float key
    pub fn get_f32(
        &self,
        key: ConfigKey,
        chain: &ScopeChain,
    ) -> Result<(f32, ConfigStatus), ConfigError> {
        let resolved = self.get_typed(key, chain, ConfigDataType::Float)?;
        match resolved.value {
            ConfigValue::Float(v) => Ok((v, resolved.status)),
            other => Err(mismatch(key, other.data_type())),
        }
    }

    /// Resolve a string key
    pub fn get_string(
        &self,
        key: ConfigKey,
        chain: &ScopeChain,
    ) -> Result<(String, ConfigStatus), ConfigError> {
        let resolved = self.get_typed(key, chain, ConfigDataType::String)?;
        match resolved.value {
            ConfigValue::String(v) => Ok((v, resolved.status)),
            other => Err(mismatch(key, other.data_type())),
        }
    }

    /// Copy a string key into `buf` with a NUL terminator
    ///
    /// Returns the bytes written including the terminator. A short buffer
    /// fails with `BufferTooSmall` and reports the size needed.
    pub fn get_string_into(
        &self,
        key: ConfigKey,
        chain: &ScopeChain,
        buf: &mut [u8],
    ) -> Result<(usize, ConfigStatus), ConfigError> {
        let (value, status) = self.get_string(key, chain)?;
        let needed = value.len() + 1;
        if buf.len() < needed {
            return Err(ConfigError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        buf[..value.len()].copy_from_slice(value.as_bytes());
        buf[value.len()] = 0;
        Ok((needed, status))
    }

    /// Resolve a callback key; `None` when no callback is configured
    pub fn get_callback(
        &self,
        key: ConfigKey,
        chain: &ScopeChain,
    ) -> Result<Option<CallbackRef>, ConfigError> {
        if key.data_type() != ConfigDataType::FunctionPtr {
            return Err(ConfigError::TypeMismatch {
                key,
                expected: key.data_type(),
                actual: ConfigDataType::FunctionPtr,
            });
        }
        for target in chain.iter() {
            if let Some(value) = self.overrides.get(&(key, *target)) {
                if let ConfigValue::FunctionPtr(cb) = value.value() {
                    return Ok(Some(cb.clone()));
                }
            }
        }
        Ok(None)
    }

    /// Describe a key
    pub fn describe(&self, key: ConfigKey) -> ConfigKeyInfo {
        ConfigKeyInfo {
            key,
            name: key.name(),
            data_type: key.data_type(),
            scope: key.scope(),
            next: key.next(),
        }
    }

    /// Drop every override attached to `target`; returns how many were removed
    pub fn clear_object(&self, target: ScopeTarget) -> usize {
        let before = self.overrides.len();
        self.overrides.retain(|(_, t), _| *t != target);
        let removed = before - self.overrides.len();
        if removed > 0 {
            debug!("config cleared {} overrides for {}", removed, target);
        }
        removed
    }

    /// Number of stored overrides
    pub fn override_count(&self) -> usize {
        self.overrides.len()
    }

    fn get_typed(
        &self,
        key: ConfigKey,
        chain: &ScopeChain,
        requested: ConfigDataType,
    ) -> Result<Resolved, ConfigError> {
        if key.data_type() != requested {
            return Err(ConfigError::TypeMismatch {
                key,
                expected: key.data_type(),
                actual: requested,
            });
        }
        self.get(key, chain)
    }
}

fn mismatch(key: ConfigKey, actual: ConfigDataType) -> ConfigError {
    ConfigError::TypeMismatch {
        key,
        expected: key.data_type(),
        actual,
    }
}
