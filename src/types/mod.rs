mod collection;
mod context;
mod error;
mod resource;
mod rule;
mod value;

pub use collection::RuleCollection;
pub use context::Context;
pub use error::RuleError;
pub use resource::{FileResource, ResourceStamp};
pub use rule::{Rule, TagAttributes, TagMap};
pub use value::Value;
