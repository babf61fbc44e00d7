//! Typed parameter entries and the shared store that owns them.
//!
//! The store is passed explicitly to whoever needs it. Entries are only ever
//! touched inside the store's lock, through [`ParameterStore::with_entry`] and
//! [`ParameterStore::for_each`].

use alloc::{string::String, vec::Vec};
use core::{cell::RefCell, fmt};

use embassy_sync::blocking_mutex::{raw::CriticalSectionRawMutex, Mutex};

/// Kind of value held by a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterType {
    Scalar,
    Integer,
    Boolean,
    String,
    Vector,
}

impl fmt::Display for ParameterType {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let name = match self {
            ParameterType::Scalar => "scalar",
            ParameterType::Integer => "integer",
            ParameterType::Boolean => "boolean",
            ParameterType::String => "string",
            ParameterType::Vector => "vector",
        };
        f.write_str(name)
    }
}

/// Value of a parameter. The kind of an entry is fixed when it is declared.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Scalar(f32),
    Integer(i32),
    Boolean(bool),
    String(String),
    Vector(Vec<f32>),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterType {
        match self {
            ParameterValue::Scalar(_) => ParameterType::Scalar,
            ParameterValue::Integer(_) => ParameterType::Integer,
            ParameterValue::Boolean(_) => ParameterType::Boolean,
            ParameterValue::String(_) => ParameterType::String,
            ParameterValue::Vector(_) => ParameterType::Vector,
        }
    }
}

impl fmt::Display for ParameterValue {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            ParameterValue::Scalar(v) => write!(f, "{v}"),
            ParameterValue::Integer(v) => write!(f, "{v}"),
            ParameterValue::Boolean(v) => write!(f, "{v}"),
            ParameterValue::String(v) => write!(f, "\"{v}\""),
            ParameterValue::Vector(values) => {
                f.write_str("[")?;
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

/// A named entry of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    value: ParameterValue,
    changed: bool,
}

impl Parameter {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    pub fn kind(&self) -> ParameterType {
        self.value.kind()
    }

    /// Replace the value, keeping the declared kind.
    ///
    /// Returns the entry's kind when `value` is of another kind.
    pub fn set(
        &mut self,
        value: ParameterValue,
    ) -> Result<(), ParameterType> {
        if value.kind() != self.kind() {
            return Err(self.kind());
        }
        self.value = value;
        self.changed = true;
        Ok(())
    }
}

impl fmt::Display for Parameter {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}

/// Errors raised while declaring parameters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("parameter {0} already declared")]
    Duplicate(String),
    /// Empty names, or names the shell could not address.
    #[error("invalid parameter name {0:?}")]
    InvalidName(String),
}

/// Lookup and iteration over a parameter store.
///
/// Callbacks run with the store locked and must not call back into it.
pub trait ParameterStore {
    /// Run `f` on the entry called `name`; `None` when there is no such entry.
    fn with_entry<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Parameter) -> R,
    ) -> Option<R>;

    /// Visit every entry in declaration order.
    fn for_each(
        &self,
        f: impl FnMut(&Parameter),
    );
}

/// Mutex-guarded parameter store, shareable between threads.
///
/// Concurrent writes to the same entry are last-writer-wins.
pub struct SharedParameters {
    entries: Mutex<CriticalSectionRawMutex, RefCell<Vec<Parameter>>>,
}

impl SharedParameters {
    pub const fn new() -> Self {
        Self {
            entries: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Add a new entry at the end of the store.
    pub fn declare(
        &self,
        name: &str,
        value: ParameterValue,
    ) -> Result<(), StoreError> {
        if name.is_empty() || name.chars().any(char::is_whitespace) {
            return Err(StoreError::InvalidName(name.into()));
        }
        self.entries.lock(|entries| {
            let mut entries = entries.borrow_mut();
            if entries.iter().any(|p| p.name == name) {
                return Err(StoreError::Duplicate(name.into()));
            }
            entries.push(Parameter {
                name: name.into(),
                value,
                changed: false,
            });
            Ok(())
        })
    }

    /// Copy of the current value of `name`.
    pub fn get(
        &self,
        name: &str,
    ) -> Option<ParameterValue> {
        self.with_entry(name, |p| p.value.clone())
    }

    /// Report whether `name` changed since the last call, clearing the flag.
    ///
    /// Unknown names report no change.
    pub fn take_changed(
        &self,
        name: &str,
    ) -> bool {
        self.with_entry(name, |p| core::mem::take(&mut p.changed))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.lock(|entries| entries.borrow().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SharedParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore for SharedParameters {
    fn with_entry<R>(
        &self,
        name: &str,
        f: impl FnOnce(&mut Parameter) -> R,
    ) -> Option<R> {
        self.entries.lock(|entries| {
            entries
                .borrow_mut()
                .iter_mut()
                .find(|p| p.name == name)
                .map(f)
        })
    }

    fn for_each(
        &self,
        mut f: impl FnMut(&Parameter),
    ) {
        self.entries.lock(|entries| entries.borrow().iter().for_each(|p| f(p)));
    }
}
