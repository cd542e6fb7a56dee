//! Domain model (ids, states, payload blobs, outcomes, errors).

pub mod data;
pub mod errors;
pub mod extras;
pub mod ids;
pub mod outcome;
pub mod state;

pub use data::Data;
pub use errors::{
    BuildError, ErrorKind, MergeError, RegistryError, StoreError, WeftError, WorkerError,
};
pub use extras::RuntimeExtras;
pub use ids::{ParseWorkIdError, WorkId};
pub use outcome::{WorkResult, WorkResultKind};
pub use state::WorkState;
