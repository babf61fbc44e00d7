//! Live parameter access for the debug shell.
//!
//! - `store`: typed parameter entries and the mutex-guarded shared store
//! - `gateway`: the `parameter_list` / `parameter_set` operations

pub mod gateway;
pub mod store;

pub use gateway::{list_parameters, set_parameter, GatewayError};
pub use store::{
    Parameter, ParameterStore, ParameterType, ParameterValue, SharedParameters, StoreError,
};
