//! Shell access to the parameter store.
//!
//! Only scalar entries can be written from the shell. Every failure leaves the
//! store untouched.

use alloc::{string::String, vec::Vec};
use core::fmt;

use super::store::{Parameter, ParameterStore, ParameterType, ParameterValue};

/// User-facing failures of `parameter_set`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("usage: parameter_set name value")]
    Usage,
    #[error("parameter doesn't exist")]
    NotFound,
    #[error("unsupported type {0}")]
    UnsupportedType(ParameterType),
    #[error("invalid value {0:?}")]
    InvalidValue(String),
}

/// Write one `<name>: <value>` line per entry, in store order.
///
/// Entries are copied out first so the sink is never written with the store
/// locked.
pub fn list_parameters<S, W>(
    store: &S,
    out: &mut W,
) -> fmt::Result
where
    S: ParameterStore,
    W: fmt::Write,
{
    let mut entries: Vec<Parameter> = Vec::new();
    store.for_each(|p| entries.push(p.clone()));
    entries.iter().try_for_each(|p| writeln!(out, "{p}"))
}

/// Overwrite a scalar parameter from its textual value.
///
/// `args` must be exactly `[name, value]`; anything else is a usage error and
/// no lookup is made. The entry is classified under the store lock, the value
/// is parsed with the lock released, and the write takes the lock again.
pub fn set_parameter<S: ParameterStore>(
    store: &S,
    args: &[&str],
) -> Result<(), GatewayError> {
    let &[name, raw] = args else {
        return Err(GatewayError::Usage);
    };

    let kind = store
        .with_entry(name, |entry| entry.kind())
        .ok_or(GatewayError::NotFound)?;
    match kind {
        ParameterType::Scalar => {}
        ParameterType::Integer
        | ParameterType::Boolean
        | ParameterType::String
        | ParameterType::Vector => return Err(GatewayError::UnsupportedType(kind)),
    }

    let value = parse_scalar(raw)?;
    store
        .with_entry(name, |entry| entry.set(ParameterValue::Scalar(value)))
        .ok_or(GatewayError::NotFound)?
        .map_err(GatewayError::UnsupportedType)?;

    tracing::info!(parameter = name, value = raw, "parameter updated from shell");
    Ok(())
}

fn parse_scalar(raw: &str) -> Result<f32, GatewayError> {
    raw.trim()
        .parse::<f32>()
        .map_err(|_| GatewayError::InvalidValue(raw.into()))
}
