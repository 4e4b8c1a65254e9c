mod useragent;
pub use useragent::{Command, Input, InputSender, UserAgent, UserAgentBuilder, UserAgentHandle};
mod session;
pub use session::{InvitePhase, Session};
mod reconnect;
pub use reconnect::MAX_RECONNECT_ATTEMPTS;
#[cfg(test)]
mod tests;
