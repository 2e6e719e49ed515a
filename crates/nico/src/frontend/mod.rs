pub mod context;
pub mod driver;

pub use context::{FrontendContext, ModuleContext, Request, Status};
pub use driver::{compile, CodeFile};
