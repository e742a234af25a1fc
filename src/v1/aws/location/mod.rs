pub mod map;

pub const ERR_CODE_RESOURCE_NOT_FOUND: &str = "ResourceNotFoundException";
