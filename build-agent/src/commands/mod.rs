pub mod build;
pub mod cancel;
pub mod listen;
pub mod status;
pub mod submit;
