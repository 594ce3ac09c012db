pub mod descriptor;
pub mod lifecycle;
pub mod report;
pub mod request;
pub mod response;
pub mod scenario;

pub use descriptor::*;
pub use lifecycle::*;
pub use report::*;
pub use request::*;
pub use response::*;
pub use scenario::*;
