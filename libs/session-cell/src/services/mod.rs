pub mod clock;
pub mod driver;
pub mod ticks;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use driver::{spawn_session_timer, SessionTimerHandle};
pub use ticks::{IntervalTicks, TickSource};
pub use timer::SessionTimer;
