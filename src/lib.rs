pub mod v1;

pub mod prelude {
    pub use crate::v1::aws::{
        autoscaling::{lifecycle_hook::*, *},
        location::{map::*, *},
        *,
    };
    pub use crate::v1::cloud::*;
    pub use crate::v1::config::*;
    pub use crate::v1::datastore::*;
    pub use crate::v1::identity::*;
    pub use crate::v1::manager::*;
    pub use crate::v1::resource::*;
    pub use crate::v1::retry::*;
    pub use crate::v1::storage::{file::*, memory::*};
    pub use crate::v1::tags::{IgnoreTags, TagPolicy, Tags};
}
