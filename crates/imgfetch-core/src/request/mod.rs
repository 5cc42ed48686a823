//! What callers submit: URL, option flags and callbacks.

mod descriptor;
mod key;
mod options;

pub use descriptor::{
    Completion, CompletionCallback, FetchProgress, FetchedImage, ProgressCallback,
    RequestDescriptor,
};
pub use key::OperationKey;
pub use options::{FetchOptions, Priority};
