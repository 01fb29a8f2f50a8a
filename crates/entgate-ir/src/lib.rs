//! Entgate IR - query and mutation intermediate representation.
//!
//! These types describe reads and writes independently of any particular
//! persistence backend. The core builds them; backends execute them.

pub mod read;
pub mod row;
pub mod value;
pub mod write;

pub use read::{FilterExpr, Projection, ReadQuery};
pub use row::Row;
pub use value::Value;
pub use write::{WriteOp, WriteStatement};
