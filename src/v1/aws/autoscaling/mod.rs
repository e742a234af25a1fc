pub mod lifecycle_hook;

pub const ERR_CODE_VALIDATION_ERROR: &str = "ValidationError";
