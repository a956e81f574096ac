// Device connection: links, the adb transport and the session state machine

pub mod adb;
pub mod link;
pub mod reconnect;
pub mod session;
pub mod status;

pub use adb::{AdbCliLink, AdbCliProvider, AdbDevice};
pub use link::{
    DeviceLink, DeviceLinkProvider, DeviceWatcher, ExitSender, LinkError, OutputStream,
    ShellInput, ShellProcess,
};
pub use reconnect::ReconnectionStrategy;
pub use session::{DeviceSession, SendReport, SessionError};
pub use status::{SessionPhase, SessionView};
