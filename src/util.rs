pub mod error;
pub(crate) mod retry;
pub mod text;
