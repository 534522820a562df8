pub mod amm;
pub mod games;
pub mod ladder;

#[cfg(any(test, feature = "mocks"))]
pub mod mocks;


mod error;
mod layer;
mod policy;
pub mod state;

pub use error::Error;
pub use layer::Layer;
pub use policy::{ForfeitPolicy, Policy, RpsTiePolicy};
pub use state::{Changeset, Memory, PreconditionFailed, State, Status, Store};
