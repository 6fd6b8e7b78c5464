pub mod arena;
pub mod global;
pub mod null;
pub mod pools;

/// Long enough to defeat any small-string optimisation.
pub const SAMPLE: &str = "just a non-SSO string";
