pub mod driver;
pub mod mock;
pub mod session;

pub use driver::{CdpDriver, CdpLauncher, DriverError, DriverFactory, DriverResult, PageDriver};
pub use mock::{MockBehavior, MockDriver, MockDriverFactory};
pub use session::{BrowserSession, SessionError, SessionResult};
