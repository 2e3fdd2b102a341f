pub mod error;
pub mod types;
pub mod value;

pub use error::{CastError, OdmError, PersistError, Result, StoreResult};
pub use types::{Attributes, DataType, Field, RawDocument};
pub use value::Value;
